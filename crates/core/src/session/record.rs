//! Persisted session rows.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_rusqlite::rusqlite::types::Value as SqlValue;

use crate::db::Row;

/// Member id recorded for guest sessions.
pub const GUEST_MEMBER_ID: i64 = 0;

/// One client's active browsing session, as stored in `sessions`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub member_id: i64,
    pub expires: DateTime<Utc>,
    pub last_click: DateTime<Utc>,
    pub location: String,
    pub ip_address: String,
    pub hostname: String,
    pub user_agent: Option<String>,
    pub display_on_whos_online: bool,
    pub is_bot: bool,
    pub bot_name: Option<String>,
    pub is_admin: bool,
}

impl SessionRecord {
    /// Column order used for inserts; matches [`values`](Self::values).
    pub const COLUMNS: [&'static str; 12] = [
        "id",
        "memberId",
        "expires",
        "lastClick",
        "location",
        "ipAddress",
        "hostname",
        "userAgent",
        "displayOnWhosOnline",
        "isBot",
        "botName",
        "isAdmin",
    ];

    /// Columns rewritten on every request. `id` and `expires` stay fixed.
    pub const UPDATE_COLUMNS: [&'static str; 10] = [
        "memberId",
        "lastClick",
        "location",
        "ipAddress",
        "hostname",
        "userAgent",
        "displayOnWhosOnline",
        "isBot",
        "botName",
        "isAdmin",
    ];

    /// Parse a cached row. Rows missing `id`, `expires` or `lastClick` are
    /// rejected.
    pub fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.text("id")?.to_string(),
            member_id: row.integer("memberId").unwrap_or(GUEST_MEMBER_ID),
            expires: DateTime::from_timestamp_millis(row.integer("expires")?)?,
            last_click: DateTime::from_timestamp_millis(row.integer("lastClick")?)?,
            location: row.text("location").unwrap_or_default().to_string(),
            ip_address: row.text("ipAddress").unwrap_or_default().to_string(),
            hostname: row.text("hostname").unwrap_or_default().to_string(),
            user_agent: row.text("userAgent").map(String::from),
            display_on_whos_online: row.flag("displayOnWhosOnline"),
            is_bot: row.flag("isBot"),
            bot_name: row.text("botName").map(String::from),
            is_admin: row.flag("isAdmin"),
        })
    }

    /// Find the session with `id` among cached rows.
    pub fn find(rows: &[Row], id: &str) -> Option<Self> {
        let row = rows.iter().find(|row| row.text("id") == Some(id))?;
        let record = Self::from_row(row);
        if record.is_none() {
            tracing::warn!(session_id = %id, "skipping malformed session row");
        }
        record
    }

    pub fn is_guest(&self) -> bool {
        self.member_id == GUEST_MEMBER_ID
    }

    /// Expired once `expires` is at or before `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    /// Bind values in [`COLUMNS`](Self::COLUMNS) order.
    pub fn values(&self) -> Vec<SqlValue> {
        let mut values = vec![SqlValue::Text(self.id.clone()), self.member_id.into(), self.expires.timestamp_millis().into()];
        values.extend(self.update_values().into_iter().skip(1));
        values
    }

    /// Bind values in [`UPDATE_COLUMNS`](Self::UPDATE_COLUMNS) order.
    pub fn update_values(&self) -> Vec<SqlValue> {
        vec![
            self.member_id.into(),
            self.last_click.timestamp_millis().into(),
            self.location.clone().into(),
            self.ip_address.clone().into(),
            self.hostname.clone().into(),
            self.user_agent.clone().into(),
            self.display_on_whos_online.into(),
            self.is_bot.into(),
            self.bot_name.clone().into(),
            self.is_admin.into(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn record() -> SessionRecord {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        SessionRecord {
            id: "abc".into(),
            member_id: 4,
            expires: now + Duration::minutes(30),
            last_click: now,
            location: "/forums/1".into(),
            ip_address: "1.2.3.4".into(),
            hostname: "board.example".into(),
            user_agent: Some("Firefox".into()),
            display_on_whos_online: true,
            is_bot: false,
            bot_name: None,
            is_admin: false,
        }
    }

    fn as_row(record: &SessionRecord) -> Row {
        SessionRecord::COLUMNS
            .iter()
            .map(|c| c.to_string())
            .zip(record.values())
            .collect()
    }

    #[test]
    fn test_values_align_with_columns() {
        let record = record();
        assert_eq!(record.values().len(), SessionRecord::COLUMNS.len());
        assert_eq!(record.update_values().len(), SessionRecord::UPDATE_COLUMNS.len());
    }

    #[test]
    fn test_row_round_trip_preserves_fields() {
        let record = record();
        let parsed = SessionRecord::from_row(&as_row(&record)).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn test_find_by_id() {
        let mut other = record();
        other.id = "xyz".into();
        let rows = vec![as_row(&record()), as_row(&other)];
        assert_eq!(SessionRecord::find(&rows, "xyz").unwrap().id, "xyz");
        assert!(SessionRecord::find(&rows, "missing").is_none());
    }

    #[test]
    fn test_malformed_row_rejected() {
        let row: Row = [("id".to_string(), SqlValue::Text("abc".into()))].into_iter().collect();
        assert!(SessionRecord::from_row(&row).is_none());
    }

    #[test]
    fn test_expiry_is_inclusive() {
        let record = record();
        assert!(record.is_expired(record.expires));
        assert!(!record.is_expired(record.expires - Duration::seconds(1)));
    }
}
