//! Per-request session lifecycle.
//!
//! Every request passes through [`SessionLifecycle::handle`], which reaps
//! expired sessions, resolves the caller's identity from the device-token
//! cookie, and then creates, updates or destroys the session row. All reads go
//! through the cache; writes hit the database and refresh the `sessions`
//! target afterwards. Database failures here are logged and swallowed so the
//! request itself always proceeds.

pub mod bots;
pub mod cookies;
pub mod identity;
pub mod lifecycle;
pub mod record;

use std::net::IpAddr;

use serde::Serialize;

pub use bots::BotDetector;
pub use cookies::CookieDirective;
pub use identity::{DeviceToken, MemberIdentity};
pub use lifecycle::SessionLifecycle;
pub use record::{GUEST_MEMBER_ID, SessionRecord};

/// What the session layer needs to know about an incoming HTTP request.
#[derive(Debug, Clone, Default)]
pub struct SessionRequest {
    /// Value of the session cookie, if the client sent one.
    pub session_cookie: Option<String>,
    /// Value of the device-token cookie, if the client sent one.
    pub auth_token: Option<String>,
    pub path: String,
    pub ip_address: String,
    pub hostname: String,
    pub user_agent: Option<String>,
}

impl SessionRequest {
    /// Background requests never create or update sessions.
    pub fn is_background(&self) -> bool {
        self.path.contains("/ajax")
    }

    /// Client address with loopback and IPv4-mapped IPv6 forms folded to IPv4.
    pub fn client_ip(&self) -> String {
        let raw = self.ip_address.trim();
        match raw.parse::<IpAddr>() {
            Ok(IpAddr::V6(v6)) if v6.is_loopback() => "127.0.0.1".to_string(),
            Ok(IpAddr::V6(v6)) => v6.to_ipv4_mapped().map_or_else(|| v6.to_string(), |v4| v4.to_string()),
            Ok(IpAddr::V4(v4)) => v4.to_string(),
            Err(_) => raw.to_string(),
        }
    }
}

/// Where a request's session ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionState {
    /// No row exists for the request (background request without a session).
    NoSession,
    GuestSession,
    MemberSession,
    /// The session was destroyed; the caller must clear cookies and redirect.
    Destroyed,
}

/// Result of running the lifecycle for one request.
#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub state: SessionState,
    pub session_id: String,
    pub member: MemberIdentity,
    /// The session row as written (or as found, for background requests).
    pub record: Option<SessionRecord>,
    /// Cookies to set or clear on the response.
    pub cookies: Vec<CookieDirective>,
    pub redirect: Option<String>,
}

impl SessionOutcome {
    pub(crate) fn none(session_id: &str) -> Self {
        Self {
            state: SessionState::NoSession,
            session_id: session_id.to_string(),
            member: MemberIdentity::guest(),
            record: None,
            cookies: Vec::new(),
            redirect: None,
        }
    }

    pub(crate) fn active(member: MemberIdentity, record: SessionRecord) -> Self {
        let state = if member.is_guest() { SessionState::GuestSession } else { SessionState::MemberSession };
        Self {
            state,
            session_id: record.id.clone(),
            member,
            record: Some(record),
            cookies: Vec::new(),
            redirect: None,
        }
    }

    pub fn is_member(&self) -> bool {
        self.state == SessionState::MemberSession
    }

    pub fn must_redirect(&self) -> bool {
        self.redirect.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(path: &str, ip: &str) -> SessionRequest {
        SessionRequest { path: path.into(), ip_address: ip.into(), ..Default::default() }
    }

    #[test]
    fn test_background_detection() {
        assert!(request("/ajax/notifications", "").is_background());
        assert!(request("/forum/ajax/poll", "").is_background());
        assert!(!request("/forums/3", "").is_background());
    }

    #[test]
    fn test_client_ip_canonicalization() {
        assert_eq!(request("/", "::1").client_ip(), "127.0.0.1");
        assert_eq!(request("/", "::ffff:10.0.0.5").client_ip(), "10.0.0.5");
        assert_eq!(request("/", " 192.168.1.20 ").client_ip(), "192.168.1.20");
        assert_eq!(request("/", "2001:db8::1").client_ip(), "2001:db8::1");
        assert_eq!(request("/", "unknown").client_ip(), "unknown");
    }
}
