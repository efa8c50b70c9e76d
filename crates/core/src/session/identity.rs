//! Member identity resolution from cached rows.

use serde::Serialize;

use super::record::{GUEST_MEMBER_ID, SessionRecord};
use crate::db::Row;

/// Persistent credential binding a browser to a member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceToken {
    pub id: i64,
    pub member_id: i64,
    pub token: String,
}

impl DeviceToken {
    fn from_row(row: &Row) -> Option<Self> {
        Some(Self {
            id: row.integer("id")?,
            member_id: row.integer("memberId")?,
            token: row.text("token")?.to_string(),
        })
    }

    /// Find the device row carrying `token`. Empty tokens never match.
    pub fn find(rows: &[Row], token: &str) -> Option<Self> {
        if token.is_empty() {
            return None;
        }
        rows.iter()
            .find(|row| row.text("token") == Some(token))
            .and_then(Self::from_row)
    }
}

/// Who a session belongs to, as far as the session layer cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemberIdentity {
    pub id: i64,
    pub is_admin: bool,
    pub display_on_whos_online: bool,
}

impl MemberIdentity {
    pub fn guest() -> Self {
        Self { id: GUEST_MEMBER_ID, is_admin: false, display_on_whos_online: false }
    }

    pub fn is_guest(&self) -> bool {
        self.id == GUEST_MEMBER_ID
    }

    /// Resolve `member_id` against the cached members and groups.
    ///
    /// Admin status comes from the member's primary group. Returns `None` if
    /// the member row is gone.
    pub fn resolve(members: &[Row], groups: &[Row], member_id: i64) -> Option<Self> {
        let member = members.iter().find(|row| row.integer("id") == Some(member_id))?;
        let group_id = member.integer("primaryGroupId");
        let is_admin = group_id
            .and_then(|gid| groups.iter().find(|row| row.integer("id") == Some(gid)))
            .is_some_and(|group| group.flag("isAdmin"));

        Some(Self {
            id: member_id,
            is_admin,
            display_on_whos_online: member.flag("displayOnWhosOnline"),
        })
    }

    /// Identity as last recorded on a session row.
    pub fn from_record(record: &SessionRecord) -> Self {
        Self {
            id: record.member_id,
            is_admin: record.is_admin,
            display_on_whos_online: record.display_on_whos_online,
        }
    }
}
