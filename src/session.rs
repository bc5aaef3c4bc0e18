//! Chat session history with expiry.
//!
//! A [`SessionStore`] is owned by whoever builds the service and passed in;
//! sessions idle for longer than the TTL are dropped on access or by
//! [`SessionStore::purge_expired`].

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::completion::ChatMessage;
use crate::config::SessionConfig;

struct Session {
    messages: VecDeque<ChatMessage>,
    last_active: Instant,
}

pub struct SessionStore {
    ttl: Duration,
    max_turns: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionStore {
    /// `max_turns` counts user/assistant exchanges, not messages.
    pub fn new(ttl: Duration, max_turns: usize) -> Self {
        Self {
            ttl,
            max_turns,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(Duration::from_secs(config.ttl_secs), config.max_turns)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        // Every mutation leaves the map consistent, so a poisoned lock is usable.
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn expired(&self, session: &Session, now: Instant) -> bool {
        now.duration_since(session.last_active) >= self.ttl
    }

    /// Messages recorded for `session_id`, oldest first. Empty for unknown
    /// or expired sessions.
    pub fn history(&self, session_id: &str) -> Vec<ChatMessage> {
        let mut sessions = self.lock();
        let now = Instant::now();
        match sessions.get(session_id) {
            Some(s) if self.expired(s, now) => {
                sessions.remove(session_id);
                Vec::new()
            }
            Some(s) => s.messages.iter().cloned().collect(),
            None => Vec::new(),
        }
    }

    /// Append one exchange and refresh the session's expiry.
    pub fn record(&self, session_id: &str, user: &str, assistant: &str) {
        let mut sessions = self.lock();
        let now = Instant::now();
        let session = sessions
            .entry(session_id.to_string())
            .or_insert_with(|| Session {
                messages: VecDeque::new(),
                last_active: now,
            });
        if self.expired(session, now) {
            session.messages.clear();
        }
        session.messages.push_back(ChatMessage::user(user));
        session.messages.push_back(ChatMessage::assistant(assistant));
        while session.messages.len() > self.max_turns * 2 {
            session.messages.pop_front();
        }
        session.last_active = now;
    }

    pub fn clear(&self, session_id: &str) -> bool {
        self.lock().remove(session_id).is_some()
    }

    /// Drop every expired session. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.lock();
        let now = Instant::now();
        let before = sessions.len();
        sessions.retain(|_, s| now.duration_since(s.last_active) < self.ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            debug!(removed, "purged expired chat sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
