//! Per-sender conversational state.
//!
//! One mutable slot per sender: a sender is in at most one flow at a time.
//! Absence of a record is the initial state. Abandoned sessions are swept
//! on an interval so the map stays bounded.

use chrono::Utc;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Which flow a sender is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    /// Option 1 chosen, waiting for the medicine name
    AwaitingMedicineName,
    /// Option 2 chosen, waiting for the tourism sub-option
    TourismMenu,
}

/// Sub-state within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubState {
    /// A map was offered, waiting for sim/não
    AwaitingMapConfirm,
}

/// Extra-data key: medicine name remembered for the map confirmation.
pub const EXTRA_MEDICINE: &str = "medicine";

/// A sender's conversational state.
#[derive(Debug, Clone)]
pub struct Session {
    pub state: FlowState,
    pub sub_state: Option<SubState>,
    /// Values remembered across turns (e.g. the queried medicine name)
    pub extra: HashMap<String, String>,
    /// Unix millis at creation
    pub created_at: i64,
    /// Unix millis of the last write, drives idle eviction
    pub touched_at: i64,
}

impl Session {
    fn new(state: FlowState, sub_state: Option<SubState>, extra: HashMap<String, String>) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            state,
            sub_state,
            extra,
            created_at: now,
            touched_at: now,
        }
    }
}

/// Thread-safe session store keyed by sender JID.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the sender's session.
    pub fn set(&self, sender: &str, state: FlowState, sub_state: Option<SubState>) {
        self.set_with_extra(sender, state, sub_state, HashMap::new());
    }

    /// Overwrite the sender's session, remembering extra values.
    pub fn set_with_extra(
        &self,
        sender: &str,
        state: FlowState,
        sub_state: Option<SubState>,
        extra: HashMap<String, String>,
    ) {
        self.sessions
            .insert(sender.to_string(), Session::new(state, sub_state, extra));
    }

    /// The sender's session, or `None` when no flow is active.
    pub fn get(&self, sender: &str) -> Option<Session> {
        self.sessions.get(sender).map(|s| s.clone())
    }

    /// Remove the sender's session. Clearing an absent sender is a no-op.
    pub fn clear(&self, sender: &str) {
        self.sessions.remove(sender);
    }

    /// Number of active sessions.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is active.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Drop sessions idle longer than `ttl`. Returns how many were evicted.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let cutoff = Utc::now().timestamp_millis() - ttl.as_millis() as i64;
        let before = self.sessions.len();
        self.sessions.retain(|_, session| session.touched_at >= cutoff);
        before - self.sessions.len()
    }
}

/// Spawn the periodic idle-eviction sweep.
pub fn spawn_sweeper(
    store: Arc<SessionStore>,
    ttl: Duration,
    interval: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await; // first tick is immediate
        loop {
            ticker.tick().await;
            let evicted = store.evict_idle(ttl);
            if evicted > 0 {
                tracing::info!(evicted, "evicted idle sessions");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_without_set_is_none() {
        let store = SessionStore::new();
        assert!(store.get("5581999999999@c.us").is_none());
    }

    #[test]
    fn set_overwrites_existing_session() {
        let store = SessionStore::new();
        store.set("u", FlowState::AwaitingMedicineName, None);
        store.set("u", FlowState::TourismMenu, Some(SubState::AwaitingMapConfirm));

        let session = store.get("u").unwrap();
        assert_eq!(session.state, FlowState::TourismMenu);
        assert_eq!(session.sub_state, Some(SubState::AwaitingMapConfirm));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn extra_values_survive_the_round_trip() {
        let store = SessionStore::new();
        let mut extra = HashMap::new();
        extra.insert(EXTRA_MEDICINE.to_string(), "dipirona".to_string());
        store.set_with_extra("u", FlowState::AwaitingMedicineName, Some(SubState::AwaitingMapConfirm), extra);

        let session = store.get("u").unwrap();
        assert_eq!(session.extra.get(EXTRA_MEDICINE).map(String::as_str), Some("dipirona"));
    }

    #[test]
    fn clear_is_idempotent() {
        let store = SessionStore::new();
        store.set("u", FlowState::TourismMenu, None);
        store.clear("u");
        store.clear("u"); // no-op
        assert!(store.get("u").is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn evict_idle_drops_only_stale_sessions() {
        let store = SessionStore::new();
        store.set("fresh", FlowState::TourismMenu, None);
        store.set("stale", FlowState::AwaitingMedicineName, None);
        if let Some(mut entry) = store.sessions.get_mut("stale") {
            entry.touched_at -= 10_000;
        }

        let evicted = store.evict_idle(Duration::from_secs(5));
        assert_eq!(evicted, 1);
        assert!(store.get("fresh").is_some());
        assert!(store.get("stale").is_none());
    }

    #[test]
    fn evict_idle_with_long_ttl_keeps_everything() {
        let store = SessionStore::new();
        store.set("u", FlowState::TourismMenu, None);
        assert_eq!(store.evict_idle(Duration::from_secs(3600)), 0);
        assert_eq!(store.len(), 1);
    }
}
