//! Communication session lifecycle: `OPEN -> CLOSED`.
//!
//! The behavior store is authoritative. A read-through cache in the TTL store
//! remembers each known session's state (`open`, or its close time) so message
//! admission rarely touches the store.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::communication::{CommunicationMessage, CommunicationSession, OpenSession, Participants};
use crate::error::SessionError;
use crate::guard::keys;
use crate::store::{BehaviorStore, Page, SessionUpdate, StoreError, TtlStore};
use crate::validate::Validate;

type Result<T> = std::result::Result<T, SessionError>;

/// Lifetime of a cached session state.
pub const SESSION_CACHE_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// How long a closed session keeps admitting in-flight messages.
pub const CLOSE_GRACE: Duration = Duration::from_secs(5 * 60);

const OPEN: &str = "open";
const CLOSED: &str = "closed";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_cache_ttl", with = "humantime_serde")]
    pub cache_ttl: Duration,

    #[serde(default = "default_close_grace", with = "humantime_serde")]
    pub close_grace: Duration,

    /// Messages fetched per page when closing a session.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
}

fn default_cache_ttl() -> Duration {
    SESSION_CACHE_TTL
}

fn default_close_grace() -> Duration {
    CLOSE_GRACE
}

fn default_page_size() -> u32 {
    100
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cache_ttl: default_cache_ttl(),
            close_grace: default_close_grace(),
            page_size: default_page_size(),
        }
    }
}

/// Cached view of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CachedState {
    Open,
    Closed(Option<DateTime<Utc>>),
}

impl CachedState {
    fn of(session: &CommunicationSession) -> Self {
        if session.closed {
            CachedState::Closed(session.end_time)
        } else {
            CachedState::Open
        }
    }

    fn encode(&self) -> String {
        match self {
            CachedState::Open => OPEN.to_string(),
            CachedState::Closed(Some(end)) => end.to_rfc3339(),
            CachedState::Closed(None) => CLOSED.to_string(),
        }
    }

    /// Whether a message arriving at `now` may join. A closed session
    /// without a close time admits nothing.
    fn admits(&self, now: DateTime<Utc>, grace: chrono::Duration) -> bool {
        match self {
            CachedState::Open => true,
            CachedState::Closed(Some(end)) => now - *end <= grace,
            CachedState::Closed(None) => false,
        }
    }

    fn decode(value: &str) -> Option<Self> {
        match value {
            OPEN => Some(CachedState::Open),
            CLOSED => Some(CachedState::Closed(None)),
            other => DateTime::parse_from_rfc3339(other)
                .ok()
                .map(|end| CachedState::Closed(Some(end.with_timezone(&Utc)))),
        }
    }
}

/// Opens, closes and admits messages into communication sessions.
pub struct SessionManager {
    store: Arc<dyn BehaviorStore>,
    ttl: Arc<dyn TtlStore>,
    config: SessionConfig,
}

impl SessionManager {
    pub fn new(store: Arc<dyn BehaviorStore>, ttl: Arc<dyn TtlStore>) -> Self {
        Self::with_config(store, ttl, SessionConfig::default())
    }

    pub fn with_config(
        store: Arc<dyn BehaviorStore>,
        ttl: Arc<dyn TtlStore>,
        config: SessionConfig,
    ) -> Self {
        Self { store, ttl, config }
    }

    fn grace(&self) -> chrono::Duration {
        chrono::Duration::from_std(self.config.close_grace).unwrap_or(chrono::Duration::MAX)
    }

    async fn cache(&self, session_id: &str, state: CachedState) -> std::result::Result<(), StoreError> {
        self.ttl
            .set(&keys::session(session_id), &state.encode(), self.config.cache_ttl)
            .await
    }

    /// Open a session. Only students and teachers may open one.
    ///
    /// Re-opening an id that already exists returns the stored session
    /// unchanged.
    #[instrument(skip(self, request), fields(user_id = request.user_id, user_type = %request.user_type))]
    pub async fn open(&self, request: OpenSession) -> Result<CommunicationSession> {
        if !request.user_type.is_human() {
            return Err(SessionError::ForbiddenOpener(request.user_type));
        }
        request.validate()?;

        let session_id = match request.session_id.filter(|id| !id.is_empty()) {
            Some(id) => {
                if let Some(existing) = self.store.get_communication_session(&id).await? {
                    debug!(session_id = %id, "session already open");
                    return Ok(existing);
                }
                id
            }
            None => Uuid::now_v7().to_string(),
        };

        let session = CommunicationSession {
            session_id,
            user_id: request.user_id,
            user_type: request.user_type,
            school_id: request.school_id,
            course_id: request.course_id,
            classroom_id: request.classroom_id,
            session_type: request.session_type,
            target_id: request.target_id,
            closed: false,
            participants: Participants::new(),
            start_time: Utc::now(),
            end_time: None,
        };

        self.store
            .save_communication(vec![session.clone()], Vec::new())
            .await?;
        self.cache(&session.session_id, CachedState::Open).await?;

        info!(session_id = %session.session_id, "session opened");
        Ok(session)
    }

    /// Close a session, computing its participants from every message posted.
    ///
    /// Closing an already closed session returns it unchanged and refreshes
    /// its cached state. The cached state is removed before the store is
    /// updated, so an interrupted close leaves admission reading the store.
    #[instrument(skip(self))]
    pub async fn close(&self, session_id: &str, now: DateTime<Utc>) -> Result<CommunicationSession> {
        let mut session = self
            .store
            .get_communication_session(session_id)
            .await?
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;

        if session.closed {
            debug!("session already closed");
            self.cache(session_id, CachedState::of(&session)).await?;
            return Ok(session);
        }

        let participants = self.participants(session_id).await?;
        let update = SessionUpdate::close(now, participants);
        self.ttl.delete(&keys::session(session_id)).await?;
        if !self
            .store
            .update_communication_session(session_id, update.clone())
            .await?
        {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        update.apply(&mut session);
        if let Err(e) = self.cache(session_id, CachedState::of(&session)).await {
            warn!(error = %e, "closed session not cached, admission will read the store");
        }

        info!(participants = session.participants.values().map(Vec::len).sum::<usize>(), "session closed");
        Ok(session)
    }

    /// User ids of every message author, grouped by user type in first-seen order.
    async fn participants(&self, session_id: &str) -> Result<Participants> {
        let mut participants: BTreeMap<_, Vec<u64>> = Participants::new();
        let mut page = Page::first(self.config.page_size);
        loop {
            let messages = self
                .store
                .get_communication_session_messages(session_id, page)
                .await?;
            for message in &messages {
                let ids = participants.entry(message.user_type).or_default();
                if !ids.contains(&message.user_id) {
                    ids.push(message.user_id);
                }
            }
            if messages.len() < page.size as usize {
                break;
            }
            page = page.next();
        }
        Ok(participants)
    }

    async fn state(&self, session_id: &str) -> Result<Option<CachedState>> {
        if let Some(value) = self.ttl.get(&keys::session(session_id)).await? {
            if let Some(state) = CachedState::decode(&value) {
                return Ok(Some(state));
            }
        }

        match self.store.get_communication_session(session_id).await? {
            Some(session) => {
                let state = CachedState::of(&session);
                if let Err(e) = self.cache(session_id, state).await {
                    warn!(session_id, error = %e, "failed to cache session state");
                }
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    /// Check that a message arriving at `now` may join its session.
    ///
    /// The session must exist. A closed session admits messages until the
    /// close grace period has elapsed since it closed; one with no recorded
    /// close time admits none.
    pub async fn admit(&self, message: &CommunicationMessage, now: DateTime<Utc>) -> Result<()> {
        let session_id = &message.session_id;
        match self.state(session_id).await? {
            None => Err(SessionError::NotFound(session_id.clone())),
            Some(state) if state.admits(now, self.grace()) => Ok(()),
            Some(_) => Err(SessionError::Closed(session_id.clone())),
        }
    }

    /// Validate, admit and persist a single message.
    pub async fn add_message(&self, message: CommunicationMessage, now: DateTime<Utc>) -> Result<()> {
        message.validate()?;
        self.admit(&message, now).await?;
        self.store
            .save_communication(Vec::new(), vec![message])
            .await?;
        Ok(())
    }

    /// Whether a session exists, consulting the cache first.
    pub async fn session_exists(&self, session_id: &str) -> Result<bool> {
        Ok(self.state(session_id).await?.is_some())
    }

    /// The subset of `session_ids` that exist.
    ///
    /// Cached ids are answered from the cache; the rest go to the store in one
    /// bulk lookup.
    pub async fn existing_sessions(&self, session_ids: &[String]) -> Result<HashSet<String>> {
        let mut found = HashSet::new();
        let mut misses = Vec::new();
        for id in session_ids {
            if self.ttl.key_exists(&keys::session(id)).await? {
                found.insert(id.clone());
            } else if !misses.contains(id) {
                misses.push(id.clone());
            }
        }

        if !misses.is_empty() {
            for id in self.store.check_session_ids_exist(&misses).await? {
                if let Some(session) = self.store.get_communication_session(&id).await? {
                    self.cache(&id, CachedState::of(&session)).await?;
                }
                found.insert(id);
            }
        }
        Ok(found)
    }
}
