// Listening features - pluggable steps the engine runs on every session transition
// Each feature keeps its private per-session state under its own id in the session

pub mod history;       // no-repeat buffer
pub mod satisfaction;  // enjoy/dislike propagation

pub use history::{Capacity, HistoryFeature, HistoryQueue};
pub use satisfaction::{AdjustmentFactorSet, SatisfactionFeature, SatisfactionSessionData};

use crate::data::CollectiveDataStore;
use crate::session::{FeatureId, ListeningSession};

/// Per-session overrides handed to every feature's `load`.
#[derive(Debug, Clone, Default)]
pub struct SessionOptions {
    pub history_capacity: Option<Capacity>,
    pub adjustments: Option<AdjustmentFactorSet>,
}

/// Runs once when a session is created.
pub trait LoadHook {
    fn load(&self, session: &mut ListeningSession, store: &CollectiveDataStore, options: &SessionOptions);
}

/// Transition hooks. Everything defaults to a no-op so a feature only
/// implements what it reacts to.
pub trait TransitionHook {
    fn next(&self, _session: &mut ListeningSession, _store: &CollectiveDataStore) {}

    fn enjoy(&self, _session: &mut ListeningSession, _store: &CollectiveDataStore) {}

    fn dislike(&self, _session: &mut ListeningSession, _store: &CollectiveDataStore) {}
}

pub trait ListeningFeature: LoadHook + TransitionHook + Send + Sync {
    fn id(&self) -> FeatureId;
}
