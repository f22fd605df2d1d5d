//! Keyset pagination stays stable while rows are inserted and deleted.

use chrono::{DateTime, TimeZone, Utc};
use conduit_store::{Repository, SqliteRepository, StoreError, decode_page_token};
use conduit_types::{Connector, ConnectorDefinition, ConnectorType, View};
use serde_json::json;
use uuid::Uuid;

const OWNER: &str = "users/2d1f6c4a-0000-4000-8000-00000000000a";

fn at(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
}

fn definition() -> ConnectorDefinition {
    ConnectorDefinition {
        uid: Uuid::new_v4(),
        id: "destination-http".to_string(),
        title: "HTTP".to_string(),
        connector_type: ConnectorType::Destination,
        docker_repository: "conduit/destination-http".to_string(),
        docker_image_tag: "0.1.0".to_string(),
        documentation_url: String::new(),
        spec: None,
        create_time: at(0),
        update_time: at(0),
    }
}

fn insert(repo: &SqliteRepository, id: &str, secs: i64) -> Connector {
    let mut c = Connector::new(id, OWNER, &definition(), json!({}));
    c.create_time = at(secs);
    c.update_time = at(secs);
    repo.create_connector(&c).unwrap();
    c
}

fn walk(repo: &SqliteRepository, page_size: u32) -> Vec<String> {
    let mut token = String::new();
    let mut ids = Vec::new();
    loop {
        let page = repo
            .list_connectors(OWNER, ConnectorType::Destination, page_size, &token, View::Basic)
            .unwrap();
        ids.extend(page.items.into_iter().map(|c| c.id));
        if page.next_page_token.is_empty() {
            return ids;
        }
        token = page.next_page_token;
    }
}

#[test]
fn concatenated_pages_cover_scope_once_in_order() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    for i in 0..23 {
        insert(&repo, &format!("c{i:02}"), i);
    }
    for page_size in [1, 2, 5, 10, 23, 50] {
        let ids = walk(&repo, page_size);
        let expected: Vec<String> = (0..23).rev().map(|i| format!("c{i:02}")).collect();
        assert_eq!(ids, expected, "page_size={page_size}");
    }
}

#[test]
fn insert_between_fetches_does_not_duplicate_or_skip() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    for i in 10..16 {
        insert(&repo, &format!("c{i}"), i);
    }

    let first = repo
        .list_connectors(OWNER, ConnectorType::Destination, 3, "", View::Basic)
        .unwrap();
    let first_ids: Vec<_> = first.items.iter().map(|c| c.id.clone()).collect();
    assert_eq!(first_ids, vec!["c15", "c14", "c13"]);

    // A newer row lands before the cursor; an older one after it.
    insert(&repo, "newer", 100);
    insert(&repo, "older", 1);

    let mut token = first.next_page_token;
    let mut rest = Vec::new();
    while !token.is_empty() {
        let page = repo
            .list_connectors(OWNER, ConnectorType::Destination, 3, &token, View::Basic)
            .unwrap();
        assert_eq!(page.total_size, 8);
        rest.extend(page.items.into_iter().map(|c| c.id));
        token = page.next_page_token;
    }
    assert_eq!(rest, vec!["c12", "c11", "c10", "older"]);
}

#[test]
fn delete_of_cursor_row_keeps_position() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    for i in 0..4 {
        insert(&repo, &format!("c{i}"), i);
    }
    let first = repo
        .list_connectors(OWNER, ConnectorType::Destination, 2, "", View::Basic)
        .unwrap();
    // Remove the row the cursor points at.
    repo.delete_connector("c2", OWNER, ConnectorType::Destination)
        .unwrap();

    let second = repo
        .list_connectors(
            OWNER,
            ConnectorType::Destination,
            2,
            &first.next_page_token,
            View::Basic,
        )
        .unwrap();
    let ids: Vec<_> = second.items.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["c1", "c0"]);
    assert!(second.next_page_token.is_empty());
}

#[test]
fn next_token_encodes_last_row() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    insert(&repo, "a", 1);
    let b = insert(&repo, "b", 2);
    let page = repo
        .list_connectors(OWNER, ConnectorType::Destination, 1, "", View::Basic)
        .unwrap();
    let token = decode_page_token(&page.next_page_token).unwrap();
    assert_eq!(token.uid, b.uid);
    assert_eq!(token.create_time, b.create_time);
}

#[test]
fn malformed_token_is_invalid_argument() {
    let repo = SqliteRepository::open_in_memory().unwrap();
    let err = repo
        .list_definitions(ConnectorType::Source, 10, "not-a-token", View::Basic)
        .unwrap_err();
    assert!(matches!(err, StoreError::InvalidPageToken(_)));
}
