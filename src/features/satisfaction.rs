// Satisfaction - spreads an enjoy/dislike from the current track to its album,
// its artists, and artists with similar taste

use super::{ListeningFeature, LoadHook, SessionOptions, TransitionHook};
use crate::auth::Credential;
use crate::data::CollectiveDataStore;
use crate::music::{AlbumId, Artist, ArtistId, MusicApi, Track, TrackId};
use crate::session::{FeatureId, FeatureSession, Ledger, ListeningSession};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, warn};

pub const SATISFACTION_FEATURE_ID: FeatureId = "Satisfaction";

/// `(track, current probability) -> new probability`
pub type AdjustmentFn = Arc<dyn Fn(&Track, f64) -> f64 + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feedback {
    Enjoy,
    Dislike,
}

/// How far from the current track a feedback signal travels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    Song,
    Album,
    Artist,
    SimilarArtist,
}

impl Tier {
    /// Application order. Later tiers see the ledger left by earlier ones.
    pub const ORDER: [Tier; 4] = [Tier::Song, Tier::Album, Tier::Artist, Tier::SimilarArtist];
}

#[derive(Clone)]
pub struct Adjustment {
    pub enjoy: AdjustmentFn,
    pub dislike: AdjustmentFn,
}

impl Adjustment {
    pub fn new<E, D>(enjoy: E, dislike: D) -> Self
    where
        E: Fn(&Track, f64) -> f64 + Send + Sync + 'static,
        D: Fn(&Track, f64) -> f64 + Send + Sync + 'static,
    {
        Self {
            enjoy: Arc::new(enjoy),
            dislike: Arc::new(dislike),
        }
    }

    /// Add `delta` on enjoy, take it away on dislike, never dropping below 0.
    pub fn step(delta: f64) -> Self {
        Self::new(
            move |_, probability| probability + delta.max(-probability),
            move |_, probability| probability + (-delta).max(-probability),
        )
    }

    fn for_feedback(&self, feedback: Feedback) -> &AdjustmentFn {
        match feedback {
            Feedback::Enjoy => &self.enjoy,
            Feedback::Dislike => &self.dislike,
        }
    }
}

/// One enjoy/dislike pair per tier.
#[derive(Clone)]
pub struct AdjustmentFactorSet {
    pub song: Adjustment,
    pub album: Adjustment,
    pub artist: Adjustment,
    pub similar_artist: Adjustment,
}

impl AdjustmentFactorSet {
    /// Same step on every tier.
    pub fn uniform(delta: f64) -> Self {
        let step = Adjustment::step(delta);
        Self {
            song: step.clone(),
            album: step.clone(),
            artist: step.clone(),
            similar_artist: step,
        }
    }

    pub fn tier(&self, tier: Tier) -> &Adjustment {
        match tier {
            Tier::Song => &self.song,
            Tier::Album => &self.album,
            Tier::Artist => &self.artist,
            Tier::SimilarArtist => &self.similar_artist,
        }
    }
}

impl fmt::Debug for AdjustmentFactorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdjustmentFactorSet").finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
pub struct SatisfactionSessionData {
    pub adjustments: AdjustmentFactorSet,
    pub album_tracks: HashMap<AlbumId, HashSet<TrackId>>,
    pub artist_tracks: HashMap<ArtistId, HashSet<TrackId>>,
}

impl SatisfactionSessionData {
    pub fn build(tracks: &[Track], adjustments: AdjustmentFactorSet) -> Self {
        let mut album_tracks: HashMap<AlbumId, HashSet<TrackId>> = HashMap::new();
        let mut artist_tracks: HashMap<ArtistId, HashSet<TrackId>> = HashMap::new();

        for track in tracks {
            album_tracks
                .entry(track.album.id.clone())
                .or_default()
                .insert(track.id.clone());
            for artist in &track.artists {
                artist_tracks
                    .entry(artist.id.clone())
                    .or_default()
                    .insert(track.id.clone());
            }
        }

        Self {
            adjustments,
            album_tracks,
            artist_tracks,
        }
    }

    fn same_album(&self, track: &Track) -> HashSet<TrackId> {
        self.album_tracks.get(&track.album.id).cloned().unwrap_or_default()
    }

    fn same_artist(&self, track: &Track) -> HashSet<TrackId> {
        self.tracks_by(track.artists.iter().map(|artist| &artist.id))
    }

    fn similar_artist(&self, track: &Track, store: &CollectiveDataStore) -> HashSet<TrackId> {
        let similar: HashSet<ArtistId> = track
            .artists
            .iter()
            .filter_map(|artist| store.similar_artists(&artist.id))
            .flatten()
            .collect();
        self.tracks_by(similar.iter())
    }

    fn tracks_by<'a>(&self, artists: impl Iterator<Item = &'a ArtistId>) -> HashSet<TrackId> {
        artists
            .filter_map(|artist_id| self.artist_tracks.get(artist_id))
            .flatten()
            .cloned()
            .collect()
    }
}

/// Make sure the store knows the similar artists of every given artist.
///
/// Artists with a non-empty cached set are skipped. A failed lookup is logged
/// and the remaining artists are still resolved. Returns how many lookups
/// succeeded.
pub async fn resolve_similar_artists(
    api: &dyn MusicApi,
    credential: &Credential,
    store: &CollectiveDataStore,
    artists: &[Artist],
) -> usize {
    let mut resolved = 0;

    for artist in artists {
        if store
            .similar_artists(&artist.id)
            .is_some_and(|similar| !similar.is_empty())
        {
            debug!("Similar artists for {} already cached", artist.id);
            continue;
        }

        match api.similar_artists(credential, &artist.id).await {
            Ok(similar) => {
                debug!("Resolved {} similar artists for {}", similar.len(), artist.id);
                store.merge_similar_artists(&artist.id, similar);
                resolved += 1;
            }
            Err(e) => warn!("Similar artist lookup for {} failed, continuing without it: {}", artist.id, e),
        }
    }

    resolved
}

#[derive(Debug, Clone, Default)]
pub struct SatisfactionFeature {
    adjustments: Option<AdjustmentFactorSet>,
}

impl SatisfactionFeature {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every session gets these instead of the `±1/n` default.
    pub fn with_adjustments(adjustments: AdjustmentFactorSet) -> Self {
        Self {
            adjustments: Some(adjustments),
        }
    }

    fn propagate(&self, session: &mut ListeningSession, store: &CollectiveDataStore, feedback: Feedback) {
        let Some(current) = session.current_track().cloned() else {
            error!("Session {} has no current track to {:?}", session.key, feedback);
            return;
        };
        let data = match session.feature_sessions.get(SATISFACTION_FEATURE_ID) {
            Some(FeatureSession::Satisfaction(data)) => data,
            _ => {
                error!("Session {} has no satisfaction data to adjust", session.key);
                return;
            }
        };

        let tracks = session.playlist.tracks.as_deref().unwrap_or(&[]);
        for tier in Tier::ORDER {
            let targets = match tier {
                Tier::Song => HashSet::from([current.id.clone()]),
                Tier::Album => data.same_album(&current),
                Tier::Artist => data.same_artist(&current),
                Tier::SimilarArtist => data.similar_artist(&current, store),
            };
            let adjustment = data.adjustments.tier(tier).for_feedback(feedback);
            let adjusted = adjust(&mut session.ledger, tracks, &session.track_index, &targets, adjustment);
            debug!("{:?} {:?}: adjusted {} tracks", feedback, tier, adjusted);
        }
    }
}

fn adjust(
    ledger: &mut Ledger,
    tracks: &[Track],
    track_index: &HashMap<TrackId, usize>,
    targets: &HashSet<TrackId>,
    adjustment: &AdjustmentFn,
) -> usize {
    let mut adjusted = 0;

    for track_id in targets {
        let Some(track) = track_index.get(track_id).and_then(|&index| tracks.get(index)) else {
            continue;
        };
        let Some(probability) = ledger.value(track_id) else {
            continue;
        };

        let updated = adjustment(track, probability);
        if !updated.is_finite() {
            warn!("Adjustment produced {} for {}, leaving it at {}", updated, track_id, probability);
            continue;
        }
        if updated < 0.0 {
            warn!("Adjustment took {} below zero ({}), clamping", track_id, updated);
        }
        ledger.set_value(track_id, updated.max(0.0));
        adjusted += 1;
    }

    adjusted
}

impl LoadHook for SatisfactionFeature {
    fn load(&self, session: &mut ListeningSession, _store: &CollectiveDataStore, options: &SessionOptions) {
        let track_count = session.tracks().len();
        let equal_odds = if track_count > 0 { 1.0 / track_count as f64 } else { 0.0 };

        let adjustments = options
            .adjustments
            .clone()
            .or_else(|| self.adjustments.clone())
            .unwrap_or_else(|| AdjustmentFactorSet::uniform(equal_odds));

        let data = SatisfactionSessionData::build(session.tracks(), adjustments);
        debug!(
            "Satisfaction indexes for session {}: {} albums, {} artists",
            session.key,
            data.album_tracks.len(),
            data.artist_tracks.len()
        );
        session
            .feature_sessions
            .insert(SATISFACTION_FEATURE_ID, FeatureSession::Satisfaction(data));
    }
}

impl TransitionHook for SatisfactionFeature {
    fn enjoy(&self, session: &mut ListeningSession, store: &CollectiveDataStore) {
        self.propagate(session, store, Feedback::Enjoy);
    }

    fn dislike(&self, session: &mut ListeningSession, store: &CollectiveDataStore) {
        self.propagate(session, store, Feedback::Dislike);
    }
}

impl ListeningFeature for SatisfactionFeature {
    fn id(&self) -> FeatureId {
        SATISFACTION_FEATURE_ID
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::music::test_support::ScriptedMusicApi;
    use crate::session::test_support::*;
    use parking_lot::Mutex;

    const EPSILON: f64 = 1e-12;

    // t0..t3 by "a" (t0, t1 share album "x"), t4 by "b", t5 by "c", t6 by "a" and "d"
    fn catalog() -> Vec<Track> {
        vec![
            track("t0", "x", &["a"]),
            track("t1", "x", &["a"]),
            track("t2", "y", &["a"]),
            track("t3", "z", &["a"]),
            track("t4", "w", &["b"]),
            track("t5", "v", &["c"]),
            track("t6", "u", &["a", "d"]),
            track("t7", "s", &["e"]),
            track("t8", "r", &["f"]),
            track("t9", "q", &["g"]),
        ]
    }

    fn loaded(feature: &SatisfactionFeature, tracks: Vec<Track>) -> ListeningSession {
        let mut session = session(playlist(tracks));
        feature.load(&mut session, &CollectiveDataStore::new(), &SessionOptions::default());
        session
    }

    fn value(session: &ListeningSession, id: &str) -> f64 {
        session.ledger.value(&TrackId::new(id)).unwrap()
    }

    #[test]
    fn test_load_builds_indexes() {
        let session = loaded(&SatisfactionFeature::new(), catalog());
        let data = match session.feature_sessions.get(SATISFACTION_FEATURE_ID) {
            Some(FeatureSession::Satisfaction(data)) => data,
            other => panic!("expected satisfaction data, got {:?}", other),
        };

        assert_eq!(data.album_tracks[&AlbumId::new("x")].len(), 2);
        assert_eq!(data.artist_tracks[&ArtistId::new("a")].len(), 5);
        assert_eq!(data.artist_tracks[&ArtistId::new("d")].len(), 1);
    }

    #[test]
    fn test_default_step_clamps_at_zero() {
        let step = Adjustment::step(0.1);
        let t = track("t", "al", &["ar"]);
        assert!(((step.enjoy)(&t, 0.05) - 0.15).abs() < EPSILON);
        assert!(((step.dislike)(&t, 0.25) - 0.15).abs() < EPSILON);
        assert_eq!((step.dislike)(&t, 0.05), 0.0);
    }

    #[test]
    fn test_enjoy_stacks_tiers() {
        let feature = SatisfactionFeature::new();
        let mut session = loaded(&feature, catalog());
        session.set_current_track(Some(TrackId::new("t0")));

        feature.enjoy(&mut session, &CollectiveDataStore::new());

        // song + album + artist
        assert!((value(&session, "t0") - 0.4).abs() < EPSILON);
        // album + artist
        assert!((value(&session, "t1") - 0.3).abs() < EPSILON);
        // artist only
        assert!((value(&session, "t2") - 0.2).abs() < EPSILON);
        assert!((value(&session, "t6") - 0.2).abs() < EPSILON);
        // unrelated
        assert!((value(&session, "t4") - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_dislike_never_goes_negative() {
        let feature = SatisfactionFeature::new();
        let mut session = loaded(&feature, catalog());
        session.set_current_track(Some(TrackId::new("t0")));

        feature.dislike(&mut session, &CollectiveDataStore::new());

        assert_eq!(value(&session, "t0"), 0.0);
        assert_eq!(value(&session, "t1"), 0.0);
        assert_eq!(value(&session, "t2"), 0.0);
        assert!((value(&session, "t4") - 0.1).abs() < EPSILON);
        assert!(session.ledger.iter().all(|(_, entry)| entry.value >= 0.0));
    }

    #[test]
    fn test_similar_artists_from_store() {
        let feature = SatisfactionFeature::new();
        let mut session = loaded(&feature, catalog());
        session.set_current_track(Some(TrackId::new("t4")));

        let store = CollectiveDataStore::with_default_datasets();
        store.merge_similar_artists(&ArtistId::new("b"), vec![ArtistId::new("c"), ArtistId::new("nobody")]);

        feature.enjoy(&mut session, &store);

        // t4: song + album + artist; t5 by similar artist "c"
        assert!((value(&session, "t4") - 0.4).abs() < EPSILON);
        assert!((value(&session, "t5") - 0.2).abs() < EPSILON);
        assert!((value(&session, "t7") - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_tiers_run_in_order_once_per_track() {
        let calls: Arc<Mutex<Vec<(Tier, TrackId)>>> = Arc::default();
        let recording = |tier: Tier| {
            let calls = Arc::clone(&calls);
            let record = move |track: &Track, probability: f64| {
                calls.lock().push((tier, track.id.clone()));
                probability
            };
            Adjustment::new(record.clone(), record)
        };
        let adjustments = AdjustmentFactorSet {
            song: recording(Tier::Song),
            album: recording(Tier::Album),
            artist: recording(Tier::Artist),
            similar_artist: recording(Tier::SimilarArtist),
        };

        let feature = SatisfactionFeature::with_adjustments(adjustments);
        let mut session = loaded(&feature, catalog());
        session.set_current_track(Some(TrackId::new("t0")));
        let store = CollectiveDataStore::with_default_datasets();
        store.merge_similar_artists(&ArtistId::new("a"), vec![ArtistId::new("b")]);

        feature.dislike(&mut session, &store);

        let calls = calls.lock();
        let tiers: Vec<Tier> = calls.iter().map(|(tier, _)| *tier).collect();
        let mut sorted = tiers.clone();
        sorted.sort_by_key(|tier| Tier::ORDER.iter().position(|t| t == tier));
        assert_eq!(tiers, sorted);

        let count = |tier: Tier| tiers.iter().filter(|t| **t == tier).count();
        assert_eq!(count(Tier::Song), 1);
        assert_eq!(count(Tier::Album), 2);
        assert_eq!(count(Tier::Artist), 5);
        assert_eq!(count(Tier::SimilarArtist), 1);
    }

    #[test]
    fn test_session_options_override_adjustments() {
        let feature = SatisfactionFeature::new();
        let mut session = session(playlist(catalog()));
        let options = SessionOptions {
            adjustments: Some(AdjustmentFactorSet::uniform(0.0)),
            ..Default::default()
        };
        feature.load(&mut session, &CollectiveDataStore::new(), &options);
        session.set_current_track(Some(TrackId::new("t0")));

        feature.enjoy(&mut session, &CollectiveDataStore::new());

        assert!(session.ledger.iter().all(|(_, entry)| (entry.value - 0.1).abs() < EPSILON));
    }

    #[test]
    fn test_negative_custom_adjustment_is_clamped() {
        let sink = Adjustment::new(|_, _| -1.0, |_, _| f64::NAN);
        let adjustments = AdjustmentFactorSet {
            song: sink.clone(),
            album: sink.clone(),
            artist: sink.clone(),
            similar_artist: sink,
        };
        let feature = SatisfactionFeature::with_adjustments(adjustments);
        let mut session = loaded(&feature, catalog());
        session.set_current_track(Some(TrackId::new("t0")));

        feature.enjoy(&mut session, &CollectiveDataStore::new());
        assert_eq!(value(&session, "t0"), 0.0);

        feature.dislike(&mut session, &CollectiveDataStore::new());
        assert!((value(&session, "t4") - 0.1).abs() < EPSILON);
    }

    #[test]
    fn test_no_current_track_is_noop() {
        let feature = SatisfactionFeature::new();
        let mut session = loaded(&feature, catalog());

        feature.enjoy(&mut session, &CollectiveDataStore::new());

        assert!(session.ledger.iter().all(|(_, entry)| (entry.value - 0.1).abs() < EPSILON));
    }

    #[tokio::test]
    async fn test_resolve_caches_and_tolerates_failures() {
        let api = ScriptedMusicApi::new()
            .respond("a", &["b", "c"])
            .fail("d")
            .respond("e", &["f"]);
        let store = CollectiveDataStore::with_default_datasets();
        let credential = Credential::new("token");
        let artists: Vec<Artist> = ["a", "d", "e"]
            .iter()
            .map(|id| Artist {
                id: ArtistId::new(*id),
                name: id.to_string(),
            })
            .collect();

        let resolved = resolve_similar_artists(&api, &credential, &store, &artists).await;

        assert_eq!(resolved, 2);
        assert_eq!(api.calls(), 3);
        assert_eq!(store.similar_artists(&ArtistId::new("a")).unwrap().len(), 2);
        assert!(store.similar_artists(&ArtistId::new("d")).is_none());
        assert_eq!(store.similar_artists(&ArtistId::new("e")).unwrap().len(), 1);

        // cached artists skip the catalog, the failed one is retried
        resolve_similar_artists(&api, &credential, &store, &artists).await;
        assert_eq!(api.calls(), 4);
    }
}
