//! Connector service end to end over an in-memory store and a mock engine.

use std::sync::Arc;
use std::time::Duration;

use conduit_domain::{
    CreateConnector, DomainError, DomainServices, IdentityResolver, ModelTask,
    RegistryWorkflowHandler, StaticIdentityLookup, UpdateConnector,
};
use conduit_pipeline::{
    CheckWorkflowParam, DeleteWorkflowParam, Dispatcher, FixedClock, MockWorkflowClient,
    WorkflowHandler, WorkflowKind,
};
use conduit_registry::{
    CatalogFamily, ConnectorFamily, ConnectorRegistry, FamilyKind, MASK_SENTINEL,
};
use conduit_store::{Repository, SqliteRepository};
use conduit_types::{
    ConnectorState, ConnectorType, HEADER_OWNER_ID, Owner, RequestMetadata, View,
};
use serde_json::json;
use uuid::Uuid;

const DESTINATIONS: &str = r#"
[[definitions]]
uid = "a1000000-0000-4000-8000-000000000001"
id = "destination-http"
title = "HTTP"
docker_repository = "conduit/destination-http"
docker_image_tag = "0.1.0"

[definitions.spec.connection_specification]
required = ["url"]

[definitions.spec.connection_specification.properties.url]
type = "string"

[definitions.spec.connection_specification.properties.api_key]
type = "string"
credential_field = true
"#;

struct Harness {
    services: DomainServices,
    repository: Arc<dyn Repository>,
    registry: Arc<ConnectorRegistry>,
    client: Arc<MockWorkflowClient>,
    clock: Arc<FixedClock>,
    owner: Owner,
}

fn harness() -> Harness {
    let family = CatalogFamily::from_toml(FamilyKind::Destination, DESTINATIONS).unwrap();
    let families: Vec<Arc<dyn ConnectorFamily>> = vec![Arc::new(family)];
    let registry = Arc::new(ConnectorRegistry::build(families).unwrap());
    let repository: Arc<dyn Repository> = Arc::new(SqliteRepository::open_in_memory().unwrap());
    let client = Arc::new(MockWorkflowClient::new());
    let clock = Arc::new(FixedClock::new(1_000));
    let dispatcher =
        Dispatcher::new(client.clone(), "connector-backend").with_clock(clock.clone());

    let owner = Owner {
        uid: Uuid::parse_str("0b7d2f4e-3c1a-4e5f-9a8b-7c6d5e4f3a2b").unwrap(),
        id: "o1".into(),
    };
    let identity = IdentityResolver::new(
        Arc::new(StaticIdentityLookup::new().with_user(owner.clone())),
        Duration::from_secs(5),
    );

    Harness {
        services: DomainServices::new(repository.clone(), registry.clone(), dispatcher, identity),
        repository,
        registry,
        client,
        clock,
        owner,
    }
}

fn create_request(id: &str) -> CreateConnector {
    CreateConnector {
        id: id.into(),
        connector_definition: "connector-definitions/destination-http".into(),
        description: String::new(),
        configuration: json!({"url": "http://sink.local", "api_key": "s3cret"}),
    }
}

#[tokio::test]
async fn create_get_delete_roundtrip() {
    let h = harness();
    let svc = h.services.connectors();

    let owner = h
        .services
        .identity()
        .resolve(&RequestMetadata::new().with(HEADER_OWNER_ID, "o1"))
        .await
        .unwrap();
    assert_eq!(owner, h.owner);

    let created = svc
        .create(&owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap();
    assert_eq!(created.state, ConnectorState::Disconnected);
    assert_eq!(
        created.configuration,
        Some(json!({"url": "http://sink.local", "api_key": MASK_SENTINEL}))
    );

    let got = svc
        .get(&owner, ConnectorType::Destination, "connectors/c1", View::Full)
        .await
        .unwrap();
    assert_eq!(got.configuration, created.configuration);
    assert_eq!(got.uid, created.uid);

    // Another type is another scope.
    let err = svc
        .get(&owner, ConnectorType::Source, "connectors/c1", View::Full)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));

    let run = svc
        .delete(&owner, ConnectorType::Destination, "connectors/c1")
        .await
        .unwrap();
    assert_eq!(
        run.workflow_id,
        format!("connectors/{}.1000.delete", created.uid)
    );
    let sub = h.client.last().unwrap();
    assert_eq!(sub.kind, WorkflowKind::Delete);

    let err = svc
        .delete(&owner, ConnectorType::Destination, "connectors/c1")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::NotFound(_)));
}

#[tokio::test]
async fn duplicate_create_is_already_exists() {
    let h = harness();
    let svc = h.services.connectors();
    svc.create(&h.owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap();
    let err = svc
        .create(&h.owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));
}

#[tokio::test]
async fn create_rejects_unknown_definition_and_bad_id() {
    let h = harness();
    let svc = h.services.connectors();

    let mut req = create_request("c1");
    req.connector_definition = "connector-definitions/destination-nope".into();
    assert!(matches!(
        svc.create(&h.owner, ConnectorType::Destination, req).await,
        Err(DomainError::NotFound(_))
    ));

    assert!(matches!(
        svc.create(&h.owner, ConnectorType::Destination, create_request("Bad_Id"))
            .await,
        Err(DomainError::InvalidArgument(_))
    ));
}

#[tokio::test]
async fn list_walks_pages_newest_first() {
    let h = harness();
    let svc = h.services.connectors();
    for id in ["c1", "c2", "c3"] {
        svc.create(&h.owner, ConnectorType::Destination, create_request(id))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(2)).await;
    }

    let mut token = String::new();
    let mut seen = Vec::new();
    for call in 0..3 {
        let page = svc
            .list(&h.owner, ConnectorType::Destination, 1, &token, View::Basic)
            .await
            .unwrap();
        assert_eq!(page.total_size, 3);
        assert_eq!(page.items.len(), 1);
        assert!(page.items[0].configuration.is_none());
        seen.push(page.items[0].id.clone());
        if call == 2 {
            assert!(page.next_page_token.is_empty());
        } else {
            assert!(!page.next_page_token.is_empty());
        }
        token = page.next_page_token;
    }
    assert_eq!(seen, vec!["c3", "c2", "c1"]);
}

#[tokio::test]
async fn list_rejects_forged_token() {
    let h = harness();
    let err = h
        .services
        .connectors()
        .list(&h.owner, ConnectorType::Destination, 1, "forged", View::Basic)
        .await
        .unwrap_err();
    assert_eq!(err.code(), conduit_domain::ErrorCode::InvalidArgument);
}

#[tokio::test]
async fn update_keeps_masked_secret_and_accepts_new_one() {
    let h = harness();
    let svc = h.services.connectors();
    let created = svc
        .create(&h.owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap();

    // Echo back the masked document with a changed url.
    let mut echoed = created.configuration.clone().unwrap();
    echoed["url"] = json!("http://other.local");
    svc.update(
        &h.owner,
        ConnectorType::Destination,
        "connectors/c1",
        UpdateConnector {
            description: Some("primary sink".into()),
            configuration: Some(echoed),
        },
    )
    .await
    .unwrap();

    let owner = h.owner.permalink();
    let stored = h
        .repository
        .get_connector_by_id("c1", &owner, ConnectorType::Destination, View::Full)
        .unwrap();
    assert_eq!(stored.description, "primary sink");
    assert_eq!(
        stored.configuration,
        Some(json!({"url": "http://other.local", "api_key": "s3cret"}))
    );

    svc.update(
        &h.owner,
        ConnectorType::Destination,
        "connectors/c1",
        UpdateConnector {
            description: None,
            configuration: Some(json!({"api_key": "rotated"})),
        },
    )
    .await
    .unwrap();
    let stored = h
        .repository
        .get_connector_by_id("c1", &owner, ConnectorType::Destination, View::Full)
        .unwrap();
    assert_eq!(stored.configuration.unwrap()["api_key"], "rotated");

    let err = svc
        .update(
            &h.owner,
            ConnectorType::Destination,
            "connectors/c1",
            UpdateConnector::default(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::InvalidArgument(_)));
}

#[tokio::test]
async fn rename_moves_the_natural_key() {
    let h = harness();
    let svc = h.services.connectors();
    let created = svc
        .create(&h.owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap();
    svc.create(&h.owner, ConnectorType::Destination, create_request("taken"))
        .await
        .unwrap();

    let err = svc
        .rename(&h.owner, ConnectorType::Destination, "connectors/c1", "taken")
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::AlreadyExists(_)));

    let renamed = svc
        .rename(&h.owner, ConnectorType::Destination, "connectors/c1", "c1-new")
        .await
        .unwrap();
    assert_eq!(renamed.uid, created.uid);
    assert!(
        svc.get(&h.owner, ConnectorType::Destination, "connectors/c1", View::Basic)
            .await
            .is_err()
    );
    let looked_up = svc
        .lookup(
            &h.owner,
            ConnectorType::Destination,
            &created.permalink(),
            View::Basic,
        )
        .await
        .unwrap();
    assert_eq!(looked_up.id, "c1-new");
}

#[tokio::test]
async fn connect_check_then_write() {
    let h = harness();
    let svc = h.services.connectors();
    let created = svc
        .create(&h.owner, ConnectorType::Destination, create_request("c1"))
        .await
        .unwrap();

    let data = json!({"classification_outputs": [{"category": "cat", "score": 0.9}]});
    let err = svc
        .write(&h.owner, "connectors/c1", ModelTask::Classification, &data)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::FailedPrecondition(_)));

    let (_, run) = svc
        .connect(&h.owner, ConnectorType::Destination, "connectors/c1")
        .await
        .unwrap();
    let sub = h.client.last().unwrap();
    assert_eq!(sub.kind, WorkflowKind::Check);
    let param: CheckWorkflowParam = serde_json::from_value(sub.payload).unwrap();
    assert_eq!(param.container_name, run.workflow_id);
    assert_eq!(param.image_name, "conduit/destination-http:0.1.0");

    // What the engine would run for that submission.
    let handler = RegistryWorkflowHandler::new(h.repository.clone(), h.registry.clone());
    let out = handler.check(param).await.unwrap();
    assert_eq!(out, json!({"state": "CONNECTED"}));

    let first = svc
        .write(&h.owner, "connectors/c1", ModelTask::Classification, &data)
        .await
        .unwrap();
    h.clock.set(2_000);
    let second = svc
        .write(&h.owner, "connectors/c1", ModelTask::Classification, &data)
        .await
        .unwrap();
    assert_ne!(first.workflow_id, second.workflow_id);
    assert_eq!(
        second.workflow_id,
        format!("{}.2000.write", created.permalink())
    );
    assert_eq!(h.client.of_kind(WorkflowKind::Write).len(), 2);

    let disconnected = svc
        .disconnect(&h.owner, ConnectorType::Destination, "connectors/c1")
        .await
        .unwrap();
    assert_eq!(disconnected.state, ConnectorState::Disconnected);
}

#[tokio::test]
async fn test_reports_precheck_state_without_storing_it() {
    let h = harness();
    let svc = h.services.connectors();
    let mut req = create_request("c1");
    req.configuration = json!({"api_key": "s3cret"});
    svc.create(&h.owner, ConnectorType::Destination, req)
        .await
        .unwrap();

    let state = svc
        .test(&h.owner, ConnectorType::Destination, "connectors/c1")
        .await
        .unwrap();
    assert_eq!(state, ConnectorState::Error);

    let stored = svc
        .get(&h.owner, ConnectorType::Destination, "connectors/c1", View::Basic)
        .await
        .unwrap();
    assert_eq!(stored.state, ConnectorState::Disconnected);
}

#[tokio::test]
async fn delete_handler_accepts_container() {
    let h = harness();
    let handler = RegistryWorkflowHandler::new(h.repository.clone(), h.registry.clone());
    let out = handler
        .delete(DeleteWorkflowParam {
            container_name: "connectors/x.1.delete".into(),
        })
        .await
        .unwrap();
    assert!(out.is_null());
}

#[tokio::test]
async fn definitions_seed_and_read() {
    let h = harness();
    let defs = h.services.definitions();
    assert_eq!(defs.seed().await.unwrap(), 1);
    // Seeding twice is harmless.
    assert_eq!(defs.seed().await.unwrap(), 1);

    let page = defs
        .list(ConnectorType::Destination, 0, "", View::Basic)
        .await
        .unwrap();
    assert_eq!(page.total_size, 1);
    assert!(page.items[0].spec.is_none());
    assert!(page.next_page_token.is_empty());

    let full = defs
        .get(
            ConnectorType::Destination,
            "connector-definitions/destination-http",
            View::Full,
        )
        .await
        .unwrap();
    assert!(full.spec.is_some());

    let by_uid = defs.lookup(&full.permalink(), View::Basic).await.unwrap();
    assert_eq!(by_uid.id, "destination-http");

    let err = defs
        .lookup("connector-definitions/not-a-uid", View::Basic)
        .await
        .unwrap_err();
    assert!(matches!(err, DomainError::MalformedPermalink(_)));
}
