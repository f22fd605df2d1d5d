//! SQLite repository.

use std::path::Path;

use chrono::{DateTime, Utc};
use conduit_types::{
    Connector, ConnectorDefinition, ConnectorState, ConnectorType, ConnectorUpdate, View,
    timestamp_now,
};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, Row, params, params_from_iter};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, StoreError};
use crate::pagination::{PageToken, clamp_page_size, decode_page_token, encode_page_token};
use crate::repository::{ListResult, Repository};

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

/// Current schema version.
const SCHEMA_VERSION: i32 = 1;

const DEFINITION_COLUMNS: &str = "uid, id, title, connector_type, docker_repository, \
     docker_image_tag, documentation_url, spec, create_time, update_time";
const DEFINITION_COLUMNS_BASIC: &str = "uid, id, title, connector_type, docker_repository, \
     docker_image_tag, documentation_url, NULL AS spec, create_time, update_time";

const CONNECTOR_COLUMNS: &str = "uid, id, owner, connector_definition_uid, connector_type, \
     description, configuration, state, tombstone, create_time, update_time";
const CONNECTOR_COLUMNS_BASIC: &str = "uid, id, owner, connector_definition_uid, connector_type, \
     description, NULL AS configuration, state, tombstone, create_time, update_time";

/// Fixed-width timestamp text, so that string order equals time order.
///
/// Nanosecond width matches the page-token cursor, so a decoded cursor
/// seeks from exactly the position it encodes.
fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string()
}

fn parse_ts(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StoreError::InvalidData(format!("timestamp '{s}': {e}")))
}

fn parse_uid(s: &str) -> Result<Uuid> {
    Uuid::parse_str(s).map_err(|e| StoreError::InvalidData(format!("uid '{s}': {e}")))
}

fn parse_type(s: &str) -> Result<ConnectorType> {
    ConnectorType::parse(s)
        .ok_or_else(|| StoreError::InvalidData(format!("connector type '{s}'")))
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository
// ─────────────────────────────────────────────────────────────────────────────

/// Repository backed by SQLite.
///
/// Uses WAL mode; the connection is shared behind a mutex and each call
/// holds it for the duration of its statements.
pub struct SqliteRepository {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteRepository").finish_non_exhaustive()
    }
}

impl SqliteRepository {
    /// Open or create a repository at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.initialize()?;

        info!("Connector store opened at {:?}", path);
        Ok(repo)
    }

    /// Create an in-memory repository (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let repo = Self {
            conn: Mutex::new(conn),
        };
        repo.initialize()?;
        debug!("In-memory connector store created");
        Ok(repo)
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let current_version: i32 = conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;
        if current_version >= SCHEMA_VERSION {
            debug!("Schema up to date (version {})", current_version);
            return Ok(());
        }

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS connector_definitions (
                uid TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                title TEXT NOT NULL DEFAULT '',
                connector_type TEXT NOT NULL,
                docker_repository TEXT NOT NULL,
                docker_image_tag TEXT NOT NULL,
                documentation_url TEXT NOT NULL DEFAULT '',
                spec TEXT,
                create_time TEXT NOT NULL,
                update_time TEXT NOT NULL,
                UNIQUE (id, connector_type)
            );

            CREATE INDEX IF NOT EXISTS idx_definitions_page
                ON connector_definitions(connector_type, create_time DESC, uid DESC);

            CREATE TABLE IF NOT EXISTS connectors (
                uid TEXT PRIMARY KEY,
                id TEXT NOT NULL,
                owner TEXT NOT NULL,
                connector_definition_uid TEXT NOT NULL,
                connector_type TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                configuration TEXT NOT NULL DEFAULT '{}',
                state TEXT NOT NULL,
                tombstone INTEGER NOT NULL DEFAULT 0,
                create_time TEXT NOT NULL,
                update_time TEXT NOT NULL,
                UNIQUE (id, owner, connector_type)
            );

            CREATE INDEX IF NOT EXISTS idx_connectors_page
                ON connectors(owner, connector_type, create_time DESC, uid DESC);
            "#,
        )?;
        conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;

        info!("Schema created (version {})", SCHEMA_VERSION);
        Ok(())
    }

    fn row_to_definition(row: &Row<'_>) -> Result<ConnectorDefinition> {
        let uid: String = row.get(0)?;
        let connector_type: String = row.get(3)?;
        let spec: Option<String> = row.get(7)?;
        let create_time: String = row.get(8)?;
        let update_time: String = row.get(9)?;

        Ok(ConnectorDefinition {
            uid: parse_uid(&uid)?,
            id: row.get(1)?,
            title: row.get(2)?,
            connector_type: parse_type(&connector_type)?,
            docker_repository: row.get(4)?,
            docker_image_tag: row.get(5)?,
            documentation_url: row.get(6)?,
            spec: spec.map(|s| serde_json::from_str(&s)).transpose()?,
            create_time: parse_ts(&create_time)?,
            update_time: parse_ts(&update_time)?,
        })
    }

    fn row_to_connector(row: &Row<'_>) -> Result<Connector> {
        let uid: String = row.get(0)?;
        let definition_uid: String = row.get(3)?;
        let connector_type: String = row.get(4)?;
        let configuration: Option<String> = row.get(6)?;
        let state: String = row.get(7)?;
        let tombstone: i64 = row.get(8)?;
        let create_time: String = row.get(9)?;
        let update_time: String = row.get(10)?;

        Ok(Connector {
            uid: parse_uid(&uid)?,
            id: row.get(1)?,
            owner: row.get(2)?,
            connector_definition_uid: parse_uid(&definition_uid)?,
            connector_type: parse_type(&connector_type)?,
            description: row.get(5)?,
            configuration: configuration
                .map(|s| serde_json::from_str(&s))
                .transpose()?,
            state: ConnectorState::parse(&state)
                .ok_or_else(|| StoreError::InvalidData(format!("connector state '{state}'")))?,
            tombstone: tombstone != 0,
            create_time: parse_ts(&create_time)?,
            update_time: parse_ts(&update_time)?,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Keyset pagination
// ─────────────────────────────────────────────────────────────────────────────

/// Row filter: `column = ?` terms joined by `AND`.
struct Scope {
    clause: String,
    params: Vec<SqlValue>,
}

impl Scope {
    fn new(terms: &[(&str, String)]) -> Self {
        let clause = terms
            .iter()
            .map(|(col, _)| format!("{col} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ");
        let params = terms
            .iter()
            .map(|(_, v)| SqlValue::Text(v.clone()))
            .collect();
        Self { clause, params }
    }
}

/// Shared list algorithm for both collections.
///
/// Rows are ordered `(create_time DESC, uid DESC)`; a token seeks strictly
/// past the encoded position. The next token is empty when the page came
/// back short or ends on the oldest row of the scope.
#[allow(clippy::too_many_arguments)]
fn list_page<T>(
    conn: &Connection,
    table: &str,
    columns: &str,
    scope: &Scope,
    page_size: u32,
    page_token: &str,
    map_row: fn(&Row<'_>) -> Result<T>,
    position: fn(&T) -> (DateTime<Utc>, Uuid),
) -> Result<ListResult<T>> {
    let cursor = if page_token.is_empty() {
        None
    } else {
        Some(decode_page_token(page_token)?)
    };
    let limit = clamp_page_size(page_size);

    let total_size: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {}", scope.clause),
        params_from_iter(scope.params.iter()),
        |row| row.get(0),
    )?;

    let mut sql = format!("SELECT {columns} FROM {table} WHERE {}", scope.clause);
    let mut values = scope.params.clone();
    if let Some(cursor) = &cursor {
        sql.push_str(" AND (create_time, uid) < (?, ?)");
        values.push(SqlValue::Text(format_ts(&cursor.create_time)));
        values.push(SqlValue::Text(cursor.uid.to_string()));
    }
    sql.push_str(" ORDER BY create_time DESC, uid DESC LIMIT ?");
    values.push(SqlValue::Integer(i64::from(limit)));

    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    let mut items = Vec::new();
    while let Some(row) = rows.next()? {
        items.push(map_row(row)?);
    }

    let next_page_token = match items.last() {
        Some(last) if items.len() == limit as usize => {
            let (create_time, uid) = position(last);
            let oldest: String = conn.query_row(
                &format!(
                    "SELECT uid FROM {table} WHERE {} ORDER BY create_time ASC, uid ASC LIMIT 1",
                    scope.clause
                ),
                params_from_iter(scope.params.iter()),
                |row| row.get(0),
            )?;
            if oldest == uid.to_string() {
                String::new()
            } else {
                encode_page_token(&PageToken { create_time, uid })
            }
        }
        _ => String::new(),
    };

    Ok(ListResult {
        items,
        total_size: u64::try_from(total_size).unwrap_or_default(),
        next_page_token,
    })
}

fn query_one<T>(
    conn: &Connection,
    sql: &str,
    values: &[SqlValue],
    map_row: fn(&Row<'_>) -> Result<T>,
    what: impl FnOnce() -> String,
) -> Result<T> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows = stmt.query(params_from_iter(values.iter()))?;
    match rows.next()? {
        Some(row) => map_row(row),
        None => Err(StoreError::NotFound(what())),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Repository impl
// ─────────────────────────────────────────────────────────────────────────────

impl Repository for SqliteRepository {
    fn upsert_definition(&self, definition: &ConnectorDefinition) -> Result<()> {
        let conn = self.conn.lock();
        let spec = definition
            .spec
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        conn.execute(
            r#"
            INSERT INTO connector_definitions
                (uid, id, title, connector_type, docker_repository, docker_image_tag,
                 documentation_url, spec, create_time, update_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(uid) DO UPDATE SET
                id = excluded.id,
                title = excluded.title,
                connector_type = excluded.connector_type,
                docker_repository = excluded.docker_repository,
                docker_image_tag = excluded.docker_image_tag,
                documentation_url = excluded.documentation_url,
                spec = excluded.spec,
                update_time = excluded.update_time
            "#,
            params![
                definition.uid.to_string(),
                definition.id,
                definition.title,
                definition.connector_type.as_str(),
                definition.docker_repository,
                definition.docker_image_tag,
                definition.documentation_url,
                spec,
                format_ts(&definition.create_time),
                format_ts(&definition.update_time),
            ],
        )?;

        debug!(uid = %definition.uid, id = %definition.id, "Upserted connector definition");
        Ok(())
    }

    fn list_definitions(
        &self,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<ConnectorDefinition>> {
        let conn = self.conn.lock();
        let scope = Scope::new(&[("connector_type", connector_type.as_str().to_string())]);
        let columns = if view.is_basic() {
            DEFINITION_COLUMNS_BASIC
        } else {
            DEFINITION_COLUMNS
        };
        list_page(
            &conn,
            "connector_definitions",
            columns,
            &scope,
            page_size,
            page_token,
            Self::row_to_definition,
            |d| (d.create_time, d.uid),
        )
    }

    fn get_definition_by_id(
        &self,
        id: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<ConnectorDefinition> {
        let conn = self.conn.lock();
        let columns = if view.is_basic() {
            DEFINITION_COLUMNS_BASIC
        } else {
            DEFINITION_COLUMNS
        };
        query_one(
            &conn,
            &format!(
                "SELECT {columns} FROM connector_definitions WHERE id = ? AND connector_type = ?"
            ),
            &[
                SqlValue::Text(id.to_string()),
                SqlValue::Text(connector_type.as_str().to_string()),
            ],
            Self::row_to_definition,
            || format!("connector definition '{id}'"),
        )
    }

    fn get_definition_by_uid(&self, uid: Uuid, view: View) -> Result<ConnectorDefinition> {
        let conn = self.conn.lock();
        let columns = if view.is_basic() {
            DEFINITION_COLUMNS_BASIC
        } else {
            DEFINITION_COLUMNS
        };
        query_one(
            &conn,
            &format!("SELECT {columns} FROM connector_definitions WHERE uid = ?"),
            &[SqlValue::Text(uid.to_string())],
            Self::row_to_definition,
            || format!("connector definition '{uid}'"),
        )
    }

    fn create_connector(&self, connector: &Connector) -> Result<()> {
        let conn = self.conn.lock();
        let configuration = serde_json::to_string(
            connector
                .configuration
                .as_ref()
                .unwrap_or(&serde_json::Value::Object(Default::default())),
        )?;

        conn.execute(
            r#"
            INSERT INTO connectors
                (uid, id, owner, connector_definition_uid, connector_type, description,
                 configuration, state, tombstone, create_time, update_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                connector.uid.to_string(),
                connector.id,
                connector.owner,
                connector.connector_definition_uid.to_string(),
                connector.connector_type.as_str(),
                connector.description,
                configuration,
                connector.state.as_str(),
                connector.tombstone as i64,
                format_ts(&connector.create_time),
                format_ts(&connector.update_time),
            ],
        )?;

        debug!(uid = %connector.uid, id = %connector.id, owner = %connector.owner, "Inserted connector");
        Ok(())
    }

    fn list_connectors(
        &self,
        owner: &str,
        connector_type: ConnectorType,
        page_size: u32,
        page_token: &str,
        view: View,
    ) -> Result<ListResult<Connector>> {
        let conn = self.conn.lock();
        let scope = Scope::new(&[
            ("owner", owner.to_string()),
            ("connector_type", connector_type.as_str().to_string()),
        ]);
        let columns = if view.is_basic() {
            CONNECTOR_COLUMNS_BASIC
        } else {
            CONNECTOR_COLUMNS
        };
        list_page(
            &conn,
            "connectors",
            columns,
            &scope,
            page_size,
            page_token,
            Self::row_to_connector,
            |c| (c.create_time, c.uid),
        )
    }

    fn get_connector_by_id(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<Connector> {
        let conn = self.conn.lock();
        let columns = if view.is_basic() {
            CONNECTOR_COLUMNS_BASIC
        } else {
            CONNECTOR_COLUMNS
        };
        query_one(
            &conn,
            &format!(
                "SELECT {columns} FROM connectors WHERE id = ? AND owner = ? AND connector_type = ?"
            ),
            &[
                SqlValue::Text(id.to_string()),
                SqlValue::Text(owner.to_string()),
                SqlValue::Text(connector_type.as_str().to_string()),
            ],
            Self::row_to_connector,
            || format!("connector '{id}'"),
        )
    }

    fn get_connector_by_uid(
        &self,
        uid: Uuid,
        owner: &str,
        connector_type: ConnectorType,
        view: View,
    ) -> Result<Connector> {
        let conn = self.conn.lock();
        let columns = if view.is_basic() {
            CONNECTOR_COLUMNS_BASIC
        } else {
            CONNECTOR_COLUMNS
        };
        query_one(
            &conn,
            &format!(
                "SELECT {columns} FROM connectors WHERE uid = ? AND owner = ? AND connector_type = ?"
            ),
            &[
                SqlValue::Text(uid.to_string()),
                SqlValue::Text(owner.to_string()),
                SqlValue::Text(connector_type.as_str().to_string()),
            ],
            Self::row_to_connector,
            || format!("connector '{uid}'"),
        )
    }

    fn lookup_connector(&self, uid: Uuid, owner: &str, view: View) -> Result<Connector> {
        let conn = self.conn.lock();
        let columns = if view.is_basic() {
            CONNECTOR_COLUMNS_BASIC
        } else {
            CONNECTOR_COLUMNS
        };
        query_one(
            &conn,
            &format!("SELECT {columns} FROM connectors WHERE uid = ? AND owner = ?"),
            &[
                SqlValue::Text(uid.to_string()),
                SqlValue::Text(owner.to_string()),
            ],
            Self::row_to_connector,
            || format!("connector '{uid}'"),
        )
    }

    fn update_connector(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        update: &ConnectorUpdate,
    ) -> Result<()> {
        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<SqlValue> = Vec::new();

        if let Some(description) = &update.description {
            sets.push("description = ?");
            values.push(SqlValue::Text(description.clone()));
        }
        if let Some(configuration) = &update.configuration {
            sets.push("configuration = ?");
            values.push(SqlValue::Text(serde_json::to_string(configuration)?));
        }
        if let Some(state) = update.state {
            sets.push("state = ?");
            values.push(SqlValue::Text(state.as_str().to_string()));
        }
        if let Some(tombstone) = update.tombstone {
            sets.push("tombstone = ?");
            values.push(SqlValue::Integer(tombstone as i64));
        }
        sets.push("update_time = ?");
        values.push(SqlValue::Text(format_ts(&timestamp_now())));

        values.push(SqlValue::Text(id.to_string()));
        values.push(SqlValue::Text(owner.to_string()));
        values.push(SqlValue::Text(connector_type.as_str().to_string()));

        let conn = self.conn.lock();
        let rows = conn.execute(
            &format!(
                "UPDATE connectors SET {} WHERE id = ? AND owner = ? AND connector_type = ?",
                sets.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;

        debug!(id, owner, rows, "Updated connector");
        Ok(())
    }

    fn rename_connector(
        &self,
        id: &str,
        owner: &str,
        connector_type: ConnectorType,
        new_id: &str,
    ) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            r#"
            UPDATE connectors SET id = ?1, update_time = ?2
            WHERE id = ?3 AND owner = ?4 AND connector_type = ?5
            "#,
            params![
                new_id,
                format_ts(&timestamp_now()),
                id,
                owner,
                connector_type.as_str()
            ],
        )?;

        debug!(id, new_id, owner, rows, "Renamed connector");
        Ok(())
    }

    fn delete_connector(&self, id: &str, owner: &str, connector_type: ConnectorType) -> Result<()> {
        let conn = self.conn.lock();
        let rows = conn.execute(
            "DELETE FROM connectors WHERE id = ?1 AND owner = ?2 AND connector_type = ?3",
            params![id, owner, connector_type.as_str()],
        )?;

        if rows == 0 {
            return Err(StoreError::NotFound(format!("connector '{id}'")));
        }

        debug!(id, owner, "Deleted connector");
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
