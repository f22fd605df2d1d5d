//! Connector and connector-definition storage for Conduit.
//!
//! Both collections are listed with keyset pagination: rows are ordered by
//! `(create_time DESC, uid DESC)` and a page token carries the
//! `(create_time, uid)` of the last row returned, so following tokens never
//! skips or repeats rows when other rows are inserted or deleted between
//! page fetches.
//!
//! - [`pagination`]: page-size clamping and the page-token codec.
//! - [`repository`]: the [`Repository`] trait and list result type.
//! - [`sqlite`]: the SQLite implementation.

pub mod error;
pub mod pagination;
pub mod repository;
pub mod sqlite;

pub use error::{Result, StoreError};
pub use pagination::{
    DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE, PageToken, clamp_page_size, decode_page_token,
    encode_page_token,
};
pub use repository::{ListResult, Repository};
pub use sqlite::SqliteRepository;
