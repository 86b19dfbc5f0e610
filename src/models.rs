use chrono::{NaiveDateTime, Timelike};

/// Timestamp layout used for display and for the persisted `created_at` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A single code → URL mapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShortLink {
    pub code: String,
    /// Human-readable short URL. Rebuilt whenever the listener port changes.
    pub short_url: String,
    pub original_url: String,
    pub created_at: NaiveDateTime,
}

impl ShortLink {
    pub fn created_at_display(&self) -> String {
        self.created_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

/// Render the short URL for `code` under `base_url` (no trailing slash).
pub fn short_url(base_url: &str, code: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), code)
}

/// Current local time truncated to whole seconds, so it survives a trip
/// through [`TIMESTAMP_FORMAT`] unchanged.
pub fn now() -> NaiveDateTime {
    let now = chrono::Local::now().naive_local();
    now.with_nanosecond(0).unwrap_or(now)
}
