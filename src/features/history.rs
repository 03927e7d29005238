use super::{ListeningFeature, LoadHook, SessionOptions, TransitionHook};
use crate::auth::SessionKey;
use crate::data::CollectiveDataStore;
use crate::music::TrackId;
use crate::session::{FeatureId, FeatureSession, Ledger, ListeningSession};
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, error, warn};

pub const HISTORY_FEATURE_ID: FeatureId = "History";

/// Fraction of the playlist kept out of rotation by default.
pub const DEFAULT_HISTORY_PROPORTION: f64 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Capacity {
    /// Fraction of the playlist length, rounded.
    Proportion(f64),
    /// Literal number of tracks.
    Fixed(usize),
}

impl Default for Capacity {
    fn default() -> Self {
        Capacity::Proportion(DEFAULT_HISTORY_PROPORTION)
    }
}

impl Capacity {
    /// Config encoding: below 1 is a fraction, anything else a track count.
    pub fn from_config(raw: f64) -> Self {
        if !raw.is_finite() || raw < 0.0 {
            warn!("Ignoring history capacity {}, using default", raw);
            return Capacity::default();
        }
        if raw < 1.0 {
            Capacity::Proportion(raw)
        } else {
            Capacity::Fixed(raw as usize)
        }
    }

    /// Always leaves at least one track selectable.
    pub fn resolve(self, track_count: usize) -> usize {
        let requested = match self {
            Capacity::Proportion(fraction) => (fraction * track_count as f64).round().max(0.0) as usize,
            Capacity::Fixed(count) => count,
        };
        requested.min(track_count.saturating_sub(1))
    }
}

/// FIFO of recently played tracks plus the probability each held before it was queued.
#[derive(Debug, Clone, Default)]
pub struct HistoryQueue {
    queue: VecDeque<TrackId>,
    set: HashSet<TrackId>,
    capacity: usize,
    stored_probabilities: HashMap<TrackId, f64>,
}

impl HistoryQueue {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
            stored_probabilities: HashMap::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, track_id: &TrackId) -> bool {
        self.set.contains(track_id)
    }

    /// Oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &TrackId> {
        self.queue.iter()
    }

    pub fn stored_probability(&self, track_id: &TrackId) -> Option<f64> {
        self.stored_probabilities.get(track_id).copied()
    }

    fn pop_into(&mut self, ledger: &mut Ledger) {
        let Some(track_id) = self.queue.pop_front() else {
            warn!("Cannot pop from an empty history queue");
            return;
        };
        self.set.remove(&track_id);

        match self.stored_probabilities.remove(&track_id) {
            Some(value) => {
                ledger.set_value(&track_id, value);
                debug!("Released {} from history, restored {:.6}", track_id, value);
            }
            None => error!("History queue had no stored probability for {}", track_id),
        }
    }
}

/// Keeps recently played tracks at probability 0 until they age out of the queue.
#[derive(Debug, Clone, Default)]
pub struct HistoryFeature {
    capacity: Capacity,
}

impl HistoryFeature {
    pub fn new(capacity: Capacity) -> Self {
        Self { capacity }
    }

    /// Queue the current track, evicting the oldest entry when full.
    pub fn push(&self, session: &mut ListeningSession) {
        let Some(current) = session.current_track_id().cloned() else {
            debug!("No current track to push into history");
            return;
        };
        let Some(value) = session.ledger.value(&current) else {
            error!("Current track {} is missing from the ledger", current);
            return;
        };
        let Some(history) = history_queue(&mut session.feature_sessions, &session.key, "push") else {
            return;
        };

        if history.contains(&current) {
            warn!("{} is already in the history queue", current);
            return;
        }
        if history.capacity == 0 {
            return;
        }
        if history.len() >= history.capacity {
            history.pop_into(&mut session.ledger);
        }

        history.queue.push_back(current.clone());
        history.set.insert(current.clone());
        history.stored_probabilities.insert(current.clone(), value);
        session.ledger.set_value(&current, 0.0);
        debug!("Pushed {} into history ({}/{})", current, history.len(), history.capacity);
    }

    /// Release the oldest queued track back into rotation.
    pub fn pop(&self, session: &mut ListeningSession) {
        if let Some(history) = history_queue(&mut session.feature_sessions, &session.key, "pop") {
            history.pop_into(&mut session.ledger);
        }
    }

    // Feedback tiers may have lifted a queued track, put it back to 0.
    // The stored snapshot is left alone so release restores the pre-queue value.
    fn suppress_queued(&self, session: &mut ListeningSession) {
        let Some(history) = history_queue(&mut session.feature_sessions, &session.key, "suppress") else {
            return;
        };
        for track_id in &history.queue {
            if session.ledger.value(track_id).is_some_and(|value| value != 0.0) {
                session.ledger.set_value(track_id, 0.0);
            }
        }
    }
}

fn history_queue<'a>(
    feature_sessions: &'a mut HashMap<FeatureId, FeatureSession>,
    key: &SessionKey,
    operation: &str,
) -> Option<&'a mut HistoryQueue> {
    match feature_sessions.get_mut(HISTORY_FEATURE_ID) {
        Some(FeatureSession::History(history)) => Some(history),
        _ => {
            error!("Session {} has no history queue to {}", key, operation);
            None
        }
    }
}

impl LoadHook for HistoryFeature {
    fn load(&self, session: &mut ListeningSession, _store: &CollectiveDataStore, options: &SessionOptions) {
        let capacity = options
            .history_capacity
            .unwrap_or(self.capacity)
            .resolve(session.tracks().len());

        debug!("History capacity for session {}: {}", session.key, capacity);
        session
            .feature_sessions
            .insert(HISTORY_FEATURE_ID, FeatureSession::History(HistoryQueue::with_capacity(capacity)));
    }
}

impl TransitionHook for HistoryFeature {
    fn next(&self, session: &mut ListeningSession, _store: &CollectiveDataStore) {
        self.push(session);
    }

    fn enjoy(&self, session: &mut ListeningSession, _store: &CollectiveDataStore) {
        self.suppress_queued(session);
    }

    fn dislike(&self, session: &mut ListeningSession, _store: &CollectiveDataStore) {
        self.suppress_queued(session);
    }
}

impl ListeningFeature for HistoryFeature {
    fn id(&self) -> FeatureId {
        HISTORY_FEATURE_ID
    }
}
