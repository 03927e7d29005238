// Listening sessions - one per listener, holding the probability ledger
// The ledger's invariants (non-negative, sums to 1) are kept by the engine, not by these types

pub mod store;

pub use store::{SessionHandle, SessionStore};

use crate::auth::SessionKey;
use crate::features::history::HistoryQueue;
use crate::features::satisfaction::SatisfactionSessionData;
use crate::music::{Playlist, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type FeatureId = &'static str;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityEntry {
    pub label: String,
    pub value: f64,
}

/// Track id -> probability, iterated in insertion order so weighted draws are reproducible.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    entries: Vec<(TrackId, ProbabilityEntry)>,
    positions: HashMap<TrackId, usize>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    /// A repeated id keeps its original position and takes the new entry.
    pub fn insert(&mut self, track_id: TrackId, entry: ProbabilityEntry) {
        match self.positions.get(&track_id) {
            Some(&position) => self.entries[position].1 = entry,
            None => {
                self.positions.insert(track_id.clone(), self.entries.len());
                self.entries.push((track_id, entry));
            }
        }
    }

    pub fn entry(&self, track_id: &TrackId) -> Option<&ProbabilityEntry> {
        self.positions
            .get(track_id)
            .map(|&position| &self.entries[position].1)
    }

    pub fn value(&self, track_id: &TrackId) -> Option<f64> {
        self.entry(track_id).map(|entry| entry.value)
    }

    /// Returns false if the track is not in the ledger.
    pub fn set_value(&mut self, track_id: &TrackId, value: f64) -> bool {
        match self.positions.get(track_id) {
            Some(&position) => {
                self.entries[position].1.value = value;
                true
            }
            None => false,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TrackId, &ProbabilityEntry)> {
        self.entries.iter().map(|(id, entry)| (id, entry))
    }

    pub fn values_mut(&mut self) -> impl Iterator<Item = &mut f64> {
        self.entries.iter_mut().map(|(_, entry)| &mut entry.value)
    }

    pub fn total(&self) -> f64 {
        self.entries.iter().map(|(_, entry)| entry.value).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The ledger as handed to callers for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Distribution {
    pub data: Vec<ProbabilityEntry>,
}

impl Distribution {
    pub fn total(&self) -> f64 {
        self.data.iter().map(|entry| entry.value).sum()
    }
}

impl From<&Ledger> for Distribution {
    fn from(ledger: &Ledger) -> Self {
        Self {
            data: ledger.iter().map(|(_, entry)| entry.clone()).collect(),
        }
    }
}

/// Per-feature private state. Only the owning feature looks inside.
#[derive(Debug, Clone)]
pub enum FeatureSession {
    History(HistoryQueue),
    Satisfaction(SatisfactionSessionData),
}

#[derive(Debug)]
pub struct ListeningSession {
    pub key: SessionKey,
    pub playlist: Playlist,
    pub ledger: Ledger,
    pub track_index: HashMap<TrackId, usize>,
    pub feature_sessions: HashMap<FeatureId, FeatureSession>,
    current_track: Option<TrackId>,
}

impl ListeningSession {
    /// Equal odds for every track. An unloaded playlist gets an empty ledger.
    pub fn new(key: SessionKey, playlist: Playlist) -> Self {
        let mut ledger = Ledger::new();
        let mut track_index = HashMap::new();

        if let Some(tracks) = &playlist.tracks {
            let equal_odds = if tracks.is_empty() { 0.0 } else { 1.0 / tracks.len() as f64 };
            for (index, track) in tracks.iter().enumerate() {
                ledger.insert(
                    track.id.clone(),
                    ProbabilityEntry {
                        label: track.display_label(),
                        value: equal_odds,
                    },
                );
                track_index.insert(track.id.clone(), index);
            }
        }

        Self {
            key,
            playlist,
            ledger,
            track_index,
            feature_sessions: HashMap::new(),
            current_track: None,
        }
    }

    pub fn tracks(&self) -> &[Track] {
        self.playlist.tracks.as_deref().unwrap_or(&[])
    }

    pub fn track(&self, track_id: &TrackId) -> Option<&Track> {
        self.track_index
            .get(track_id)
            .and_then(|&index| self.tracks().get(index))
    }

    pub fn current_track_id(&self) -> Option<&TrackId> {
        self.current_track.as_ref()
    }

    pub fn current_track(&self) -> Option<&Track> {
        self.current_track.as_ref().and_then(|id| self.track(id))
    }

    /// Only the selection step moves the current track.
    pub(crate) fn set_current_track(&mut self, track_id: Option<TrackId>) {
        self.current_track = track_id;
    }

    pub fn distribution(&self) -> Distribution {
        Distribution::from(&self.ledger)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_equal_odds() {
        let session = session(numbered_playlist(4));
        assert_eq!(session.ledger.len(), 4);
        for (_, entry) in session.ledger.iter() {
            assert_eq!(entry.value, 0.25);
        }
        assert!((session.ledger.total() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_playlist_has_nothing_selectable() {
        let session = session(playlist(Vec::new()));
        assert!(session.ledger.is_empty());
        assert_eq!(session.ledger.total(), 0.0);
    }

    #[test]
    fn test_unloaded_playlist_has_empty_ledger() {
        let mut unloaded = numbered_playlist(3);
        unloaded.tracks = None;
        let session = session(unloaded);
        assert!(session.ledger.is_empty());
        assert!(session.track_index.is_empty());
    }

    #[test]
    fn test_ledger_keeps_insertion_order() {
        let session = session(numbered_playlist(5));
        let order: Vec<_> = session.ledger.iter().map(|(id, _)| id.as_str().to_string()).collect();
        assert_eq!(order, vec!["t0", "t1", "t2", "t3", "t4"]);
    }

    #[test]
    fn test_track_lookup_by_id() {
        let session = session(numbered_playlist(3));
        let track = session.track(&TrackId::new("t2")).unwrap();
        assert_eq!(track.album.id.as_str(), "al2");
        assert!(session.track(&TrackId::new("missing")).is_none());
    }

    #[test]
    fn test_distribution_labels() {
        let session = session(playlist(vec![track("x", "al", &["a", "b"])]));
        let distribution = session.distribution();
        assert_eq!(distribution.data[0].label, "'Track x' by Artist a, Artist b");
        assert_eq!(distribution.data[0].value, 1.0);
    }

    #[test]
    fn test_set_value_unknown_track() {
        let mut session = session(numbered_playlist(2));
        assert!(!session.ledger.set_value(&TrackId::new("nope"), 0.3));
        assert!(session.ledger.set_value(&TrackId::new("t1"), 0.3));
        assert_eq!(session.ledger.value(&TrackId::new("t1")), Some(0.3));
    }
}
