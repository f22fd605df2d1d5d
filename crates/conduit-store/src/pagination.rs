//! Page-size clamping and page-token encoding.
//!
//! A token is the URL-safe, unpadded base64 of `v1|<rfc3339 nanos>|<uid>`.
//! Decoding accepts only the exact canonical form an encoder would produce,
//! so hand-built or truncated tokens fail instead of seeking to a wrong row.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, SecondsFormat, Utc};
use uuid::Uuid;

use crate::error::{Result, StoreError};

/// Page size used when the caller asks for zero rows.
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Largest page a caller can request.
pub const MAX_PAGE_SIZE: u32 = 100;

const TOKEN_VERSION: &str = "v1";

/// Clamp a requested page size: 0 becomes the default, anything above the
/// maximum becomes the maximum.
pub fn clamp_page_size(requested: u32) -> u32 {
    match requested {
        0 => DEFAULT_PAGE_SIZE,
        n if n > MAX_PAGE_SIZE => MAX_PAGE_SIZE,
        n => n,
    }
}

/// Position of the last row of a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageToken {
    pub create_time: DateTime<Utc>,
    pub uid: Uuid,
}

/// Encode a cursor position.
pub fn encode_page_token(token: &PageToken) -> String {
    let raw = format!(
        "{TOKEN_VERSION}|{}|{}",
        token.create_time.to_rfc3339_opts(SecondsFormat::Nanos, true),
        token.uid.hyphenated()
    );
    URL_SAFE_NO_PAD.encode(raw)
}

/// Decode a page token.
pub fn decode_page_token(token: &str) -> Result<PageToken> {
    let invalid = |reason: &str| StoreError::InvalidPageToken(reason.to_string());

    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| invalid("not base64"))?;
    let raw = String::from_utf8(bytes).map_err(|_| invalid("not utf-8"))?;

    let mut parts = raw.split('|');
    let (Some(version), Some(ts), Some(uid), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(invalid("wrong number of fields"));
    };
    if version != TOKEN_VERSION {
        return Err(invalid("unsupported version"));
    }

    let create_time = DateTime::parse_from_rfc3339(ts)
        .map_err(|_| invalid("bad timestamp"))?
        .with_timezone(&Utc);
    let uid = Uuid::parse_str(uid).map_err(|_| invalid("bad uid"))?;

    let decoded = PageToken { create_time, uid };
    if encode_page_token(&decoded) != token {
        return Err(invalid("not in canonical form"));
    }
    Ok(decoded)
}
