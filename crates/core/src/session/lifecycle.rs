//! Request-scoped session state machine over the cached `sessions` rows.

use std::sync::Arc;

use chrono::{DateTime, SubsecRound, TimeDelta, Utc};
use uuid::Uuid;

use super::{
    BotDetector, CookieDirective, DeviceToken, MemberIdentity, SessionOutcome, SessionRecord, SessionRequest,
    SessionState,
};
use crate::Error;
use crate::Target;
use crate::cache::{CacheProvider, Rows};
use crate::config::{CookieConfig, MAX_DURATION_MINUTES, SessionConfig};
use crate::db::{Database, Statement};

/// Account targets read together so one request sees a single generation.
const ACCOUNT_VIEW: [(&str, Target); 4] = [
    ("devices", Target::MemberDevices),
    ("sessions", Target::Sessions),
    ("members", Target::Members),
    ("groups", Target::Groups),
];

struct AccountView {
    devices: Rows,
    sessions: Rows,
    members: Rows,
    groups: Rows,
}

impl AccountView {
    fn load(cache: &dyn CacheProvider) -> Self {
        let mut view = cache.get_all(&ACCOUNT_VIEW);
        let mut take = |alias: &str| view.remove(alias).unwrap_or_default();
        Self { devices: take("devices"), sessions: take("sessions"), members: take("members"), groups: take("groups") }
    }

    fn member(&self, member_id: i64) -> Option<MemberIdentity> {
        MemberIdentity::resolve(&self.members, &self.groups, member_id)
    }
}

/// Drives create/update/destroy of session rows for each request.
pub struct SessionLifecycle {
    cache: Arc<dyn CacheProvider>,
    db: Database,
    config: SessionConfig,
    lifetime: TimeDelta,
    cookies: CookieConfig,
    bots: BotDetector,
}

impl SessionLifecycle {
    /// # Errors
    ///
    /// Returns `Error::Configuration` if the session duration is outside
    /// `1..=MAX_DURATION_MINUTES` or a bot pattern fails to compile.
    pub fn new(
        cache: Arc<dyn CacheProvider>, db: Database, config: SessionConfig, cookies: CookieConfig,
    ) -> Result<Self, Error> {
        let lifetime = Some(config.duration_minutes)
            .filter(|minutes| (1..=MAX_DURATION_MINUTES).contains(minutes))
            .and_then(|_| config.duration())
            .ok_or_else(|| {
                Error::Configuration(format!(
                    "session duration must be between 1 and {MAX_DURATION_MINUTES} minutes, got {}",
                    config.duration_minutes
                ))
            })?;
        let bots = BotDetector::new(&config.bots)?;
        Ok(Self { cache, db, config, lifetime, cookies, bots })
    }

    /// Run the lifecycle for one request.
    ///
    /// Never fails: database errors are logged and the request proceeds with
    /// whatever state could be determined.
    #[tracing::instrument(skip_all, fields(path = %request.path))]
    pub async fn handle(&self, request: &SessionRequest) -> SessionOutcome {
        let now = now();
        self.collect_garbage_at(now).await;

        let (session_id, issued) = session_id(request);
        let view = AccountView::load(self.cache.as_ref());
        let existing = SessionRecord::find(&view.sessions, &session_id);

        let mut outcome = match request.auth_token.as_deref().filter(|t| !t.is_empty()) {
            Some(token) => self.authenticated(request, &session_id, token, existing, &view, now).await,
            None => self.anonymous(request, &session_id, existing, now).await,
        };

        if issued && outcome.record.is_some() {
            outcome.cookies.push(self.session_cookie(&session_id));
        }
        outcome
    }

    /// Promote the request's session to `member_id`.
    ///
    /// Creates the row if the request has none. When `device_token` is given
    /// the outcome carries a directive setting the device-token cookie.
    ///
    /// # Errors
    ///
    /// Returns `Error::NotFound` if the member is not in the cache.
    pub async fn sign_in(
        &self, request: &SessionRequest, member_id: i64, device_token: Option<&str>,
    ) -> Result<SessionOutcome, Error> {
        let view = AccountView::load(self.cache.as_ref());
        let member = view.member(member_id).ok_or_else(|| Error::NotFound(format!("member {member_id}")))?;

        let now = now();
        let (session_id, issued) = session_id(request);
        let mut outcome = match SessionRecord::find(&view.sessions, &session_id) {
            Some(record) => self.update(request, record, &member, now).await,
            None => self.create(request, &session_id, &member, now).await,
        };

        if issued && outcome.record.is_some() {
            outcome.cookies.push(self.session_cookie(&session_id));
        }
        if let Some(token) = device_token {
            outcome.cookies.push(CookieDirective::set(
                &self.cookies,
                &self.cookies.auth_token_name,
                token,
                self.cookies.max_age_seconds,
            ));
        }

        tracing::info!(member_id, session_id = %session_id, "member signed in");
        Ok(outcome)
    }

    /// Destroy the request's session, if any, and clear both cookies.
    pub async fn sign_out(&self, request: &SessionRequest) -> SessionOutcome {
        match request.session_cookie.as_deref().filter(|id| !id.is_empty()) {
            Some(id) => self.destroy(id).await,
            None => self.destroyed(String::new()),
        }
    }

    /// Delete every expired session. Returns the number of rows removed.
    pub async fn collect_garbage(&self) -> usize {
        self.collect_garbage_at(now()).await
    }

    async fn collect_garbage_at(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now.timestamp_millis();
        let expired: Vec<String> = self
            .cache
            .get(Target::Sessions)
            .iter()
            .filter(|row| row.integer("expires").is_some_and(|expires| expires <= cutoff))
            .filter_map(|row| row.text("id").map(String::from))
            .collect();

        if expired.is_empty() {
            return 0;
        }

        let mut builder = self.db.statement();
        let statement = builder
            .delete_from(Target::Sessions)
            .only_where()
            .in_values("id", expired)
            .map(|b| b.build());

        let removed = self.persist(statement, "collect_garbage").await.unwrap_or(0);
        if removed > 0 {
            tracing::debug!(rows = removed, "removed expired sessions");
        }
        removed
    }

    async fn authenticated(
        &self, request: &SessionRequest, session_id: &str, token: &str, existing: Option<SessionRecord>,
        view: &AccountView, now: DateTime<Utc>,
    ) -> SessionOutcome {
        let member = DeviceToken::find(&view.devices, token).and_then(|device| view.member(device.member_id));
        let Some(member) = member else {
            tracing::info!(session_id = %session_id, "device token did not resolve to a member");
            return self.destroy(session_id).await;
        };

        match existing {
            Some(record) if !record.is_guest() && record.member_id != member.id => {
                tracing::warn!(
                    session_id = %session_id,
                    member_id = member.id,
                    owner = record.member_id,
                    "session belongs to another member"
                );
                self.destroy(session_id).await
            }
            Some(record) if !self.is_continuous(&record, request) => self.destroy(session_id).await,
            Some(record) => self.update(request, record, &member, now).await,
            None => self.create(request, session_id, &member, now).await,
        }
    }

    async fn anonymous(
        &self, request: &SessionRequest, session_id: &str, existing: Option<SessionRecord>, now: DateTime<Utc>,
    ) -> SessionOutcome {
        match existing {
            Some(record) if !self.is_continuous(&record, request) => self.destroy(session_id).await,
            Some(record) => {
                let member = MemberIdentity::from_record(&record);
                self.update(request, record, &member, now).await
            }
            None => self.create(request, session_id, &MemberIdentity::guest(), now).await,
        }
    }

    fn is_continuous(&self, record: &SessionRecord, request: &SessionRequest) -> bool {
        if !self.config.verify_continuity {
            return true;
        }
        let same_ip = record.ip_address == request.client_ip();
        let same_agent = record.user_agent == request.user_agent;
        if !(same_ip && same_agent) {
            tracing::warn!(session_id = %record.id, same_ip, same_agent, "session continuity check failed");
        }
        same_ip && same_agent
    }

    async fn create(
        &self, request: &SessionRequest, session_id: &str, member: &MemberIdentity, now: DateTime<Utc>,
    ) -> SessionOutcome {
        if request.is_background() {
            return SessionOutcome::none(session_id);
        }

        let Some(expires) = now.checked_add_signed(self.lifetime) else {
            tracing::error!(session_id = %session_id, "session expiry out of range; not created");
            return SessionOutcome::none(session_id);
        };

        let record = self.record_for(request, session_id.to_string(), member, now, expires);
        let mut builder = self.db.statement();
        let statement = builder
            .insert_into(Target::Sessions, &SessionRecord::COLUMNS, record.values())
            .map(|b| b.build());

        self.persist(statement, "create").await;
        SessionOutcome::active(member.clone(), record)
    }

    async fn update(
        &self, request: &SessionRequest, record: SessionRecord, member: &MemberIdentity, now: DateTime<Utc>,
    ) -> SessionOutcome {
        if request.is_background() {
            let member = MemberIdentity::from_record(&record);
            return SessionOutcome::active(member, record);
        }

        let updated = self.record_for(request, record.id, member, now, record.expires);
        let mut builder = self.db.statement();
        let statement = builder
            .update(Target::Sessions)
            .set(&SessionRecord::UPDATE_COLUMNS, updated.update_values())
            .map(|b| b.where_clause("id = ?", [updated.id.clone()]).build());

        self.persist(statement, "update").await;
        SessionOutcome::active(member.clone(), updated)
    }

    async fn destroy(&self, session_id: &str) -> SessionOutcome {
        let statement = self
            .db
            .statement()
            .delete_from(Target::Sessions)
            .where_clause("id = ?", [session_id.to_string()])
            .build();

        self.persist(Ok(statement), "destroy").await;
        self.destroyed(session_id.to_string())
    }

    fn destroyed(&self, session_id: String) -> SessionOutcome {
        SessionOutcome {
            state: SessionState::Destroyed,
            session_id,
            member: MemberIdentity::guest(),
            record: None,
            cookies: vec![
                CookieDirective::removal(&self.cookies, &self.cookies.session_name),
                CookieDirective::removal(&self.cookies, &self.cookies.auth_token_name),
            ],
            redirect: Some("/".to_string()),
        }
    }

    fn record_for(
        &self, request: &SessionRequest, id: String, member: &MemberIdentity, now: DateTime<Utc>,
        expires: DateTime<Utc>,
    ) -> SessionRecord {
        let bot_name = self.bots.detect(request.user_agent.as_deref()).map(String::from);
        SessionRecord {
            id,
            member_id: member.id,
            expires,
            last_click: now,
            location: request.path.clone(),
            ip_address: request.client_ip(),
            hostname: request.hostname.clone(),
            user_agent: request.user_agent.clone(),
            display_on_whos_online: member.display_on_whos_online,
            is_bot: bot_name.is_some(),
            bot_name,
            is_admin: member.is_admin,
        }
    }

    fn session_cookie(&self, session_id: &str) -> CookieDirective {
        CookieDirective::set(
            &self.cookies,
            &self.cookies.session_name,
            session_id,
            self.lifetime.num_seconds(),
        )
    }

    /// Execute a session write; on success refresh the `sessions` target.
    ///
    /// Failures of either step are logged and swallowed.
    async fn persist(&self, statement: Result<Statement, Error>, action: &'static str) -> Option<usize> {
        let result = match statement {
            Ok(statement) => self.db.execute(statement).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(rows) => {
                tracing::debug!(action, rows, "session write applied");
                if let Err(e) = self.cache.update(Target::Sessions).await {
                    tracing::error!(action, error = %e, "failed to refresh sessions after write");
                }
                Some(rows)
            }
            Err(e) => {
                tracing::error!(action, error = %e, "session write failed");
                None
            }
        }
    }
}

/// Current time at the millisecond precision sessions are stored with.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

fn session_id(request: &SessionRequest) -> (String, bool) {
    match request.session_cookie.as_deref().filter(|id| !id.is_empty()) {
        Some(id) => (id.to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}
