// Shuffle engine - owns the sessions, runs the feature pipeline, draws the next track
// Every transition: features in registration order -> normalize -> (select | report distribution)

pub mod selection;

use crate::auth::Credential;
use crate::config::Config;
use crate::data::CollectiveDataStore;
use crate::error::ShuffleError;
use crate::features::satisfaction::{resolve_similar_artists, Feedback};
use crate::features::{Capacity, HistoryFeature, ListeningFeature, SatisfactionFeature, SessionOptions};
use crate::music::{MusicApi, Playlist, Track};
use crate::session::{Distribution, ListeningSession, SessionHandle, SessionStore};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub struct ShuffleEngineBuilder {
    music_api: Arc<dyn MusicApi>,
    store: Option<Arc<CollectiveDataStore>>,
    history_capacity: Capacity,
    satisfaction: bool,
    extra_features: Vec<Box<dyn ListeningFeature>>,
    seed: Option<u64>,
}

impl ShuffleEngineBuilder {
    pub fn new(music_api: Arc<dyn MusicApi>) -> Self {
        Self {
            music_api,
            store: None,
            history_capacity: Capacity::default(),
            satisfaction: true,
            extra_features: Vec::new(),
            seed: None,
        }
    }

    pub fn history_capacity(mut self, capacity: Capacity) -> Self {
        self.history_capacity = capacity;
        self
    }

    pub fn satisfaction(mut self, enabled: bool) -> Self {
        self.satisfaction = enabled;
        self
    }

    /// Runs after the built-in features.
    pub fn feature(mut self, feature: Box<dyn ListeningFeature>) -> Self {
        self.extra_features.push(feature);
        self
    }

    /// Share a store between engines. Defaults to a fresh store with the
    /// built-in datasets registered.
    pub fn collective_store(mut self, store: Arc<CollectiveDataStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> ShuffleEngine {
        // Satisfaction first so history can re-zero anything feedback lifted
        let mut features: Vec<Box<dyn ListeningFeature>> = Vec::new();
        if self.satisfaction {
            features.push(Box::new(SatisfactionFeature::new()));
        }
        features.push(Box::new(HistoryFeature::new(self.history_capacity)));
        features.extend(self.extra_features);

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        ShuffleEngine {
            sessions: SessionStore::new(),
            features,
            resolve_similar: self.satisfaction,
            store: self
                .store
                .unwrap_or_else(|| Arc::new(CollectiveDataStore::with_default_datasets())),
            music_api: self.music_api,
            rng: Mutex::new(rng),
        }
    }
}

pub struct ShuffleEngine {
    sessions: SessionStore,
    features: Vec<Box<dyn ListeningFeature>>,
    resolve_similar: bool,
    store: Arc<CollectiveDataStore>,
    music_api: Arc<dyn MusicApi>,
    rng: Mutex<StdRng>,
}

impl ShuffleEngine {
    pub fn builder(music_api: Arc<dyn MusicApi>) -> ShuffleEngineBuilder {
        ShuffleEngineBuilder::new(music_api)
    }

    pub fn from_config(config: &Config, music_api: Arc<dyn MusicApi>) -> Self {
        let mut builder = Self::builder(music_api)
            .history_capacity(Capacity::from_config(config.history.capacity))
            .satisfaction(config.satisfaction.enabled);
        if let Some(seed) = config.rng_seed {
            builder = builder.seed(seed);
        }
        builder.build()
    }

    pub fn collective_store(&self) -> &CollectiveDataStore {
        &self.store
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn create_session(&self, credential: &Credential, playlist: Playlist) {
        self.create_session_with(credential, playlist, &SessionOptions::default());
    }

    /// Replaces any session the credential already had.
    pub fn create_session_with(&self, credential: &Credential, playlist: Playlist, options: &SessionOptions) {
        if !playlist.is_loaded() {
            warn!("Playlist '{}' has no tracks loaded yet, session starts empty", playlist.name);
        }

        let mut session = ListeningSession::new(credential.session_key(), playlist);
        for feature in &self.features {
            feature.load(&mut session, &self.store, options);
        }

        info!(
            "Created session {} for '{}' ({} tracks)",
            session.key,
            session.playlist.name,
            session.ledger.len()
        );
        self.sessions.insert(session);
    }

    pub fn get_session(&self, credential: &Credential) -> Option<SessionHandle> {
        self.sessions.get(&credential.session_key())
    }

    /// Returns whether a session was removed. Deleting twice is fine.
    pub fn delete_session(&self, credential: &Credential) -> bool {
        let key = credential.session_key();
        let removed = self.sessions.remove(&key);
        if removed {
            info!("Deleted session {}", key);
        }
        removed
    }

    /// Advance to the next track. `Ok(None)` means nothing is selectable.
    pub async fn next(&self, credential: &Credential) -> Result<Option<Track>, ShuffleError> {
        let handle = self.session_handle(credential)?;
        let mut session = handle.lock().await;

        for feature in &self.features {
            feature.next(&mut session, &self.store);
        }
        if !selection::normalize(&mut session.ledger) {
            warn!("Session {} has no probability left to select from", session.key);
        }

        let draw: f64 = self.rng.lock().gen();
        let Some(selected) = selection::select(&session.ledger, draw).cloned() else {
            warn!("Session {}: draw {:.6} matched no track", session.key, draw);
            return Ok(None);
        };

        debug!("Session {}: draw {:.6} selected {}", session.key, draw, selected);
        let track = session.track(&selected).cloned();
        session.set_current_track(Some(selected));
        Ok(track)
    }

    /// Same as [`next`](Self::next); skipping carries no extra penalty.
    pub async fn skip(&self, credential: &Credential) -> Result<Option<Track>, ShuffleError> {
        self.next(credential).await
    }

    pub async fn enjoy(&self, credential: &Credential) -> Result<Distribution, ShuffleError> {
        self.feedback(credential, Feedback::Enjoy).await
    }

    pub async fn dislike(&self, credential: &Credential) -> Result<Distribution, ShuffleError> {
        self.feedback(credential, Feedback::Dislike).await
    }

    pub async fn distribution(&self, credential: &Credential) -> Option<Distribution> {
        let handle = self.get_session(credential)?;
        let session = handle.lock().await;
        Some(session.distribution())
    }

    pub async fn current_track(&self, credential: &Credential) -> Option<Track> {
        let handle = self.get_session(credential)?;
        let session = handle.lock().await;
        session.current_track().cloned()
    }

    async fn feedback(&self, credential: &Credential, feedback: Feedback) -> Result<Distribution, ShuffleError> {
        let handle = self.session_handle(credential)?;
        let mut session = handle.lock().await;

        let artists = session
            .current_track()
            .ok_or(ShuffleError::NoActiveTrack)?
            .artists
            .clone();

        // The only await in the pipeline, the session stays locked through it
        if self.resolve_similar {
            resolve_similar_artists(self.music_api.as_ref(), credential, &self.store, &artists).await;
        }

        for feature in &self.features {
            match feedback {
                Feedback::Enjoy => feature.enjoy(&mut session, &self.store),
                Feedback::Dislike => feature.dislike(&mut session, &self.store),
            }
        }
        if !selection::normalize(&mut session.ledger) {
            warn!("Session {} has no probability left after {:?}", session.key, feedback);
        }

        Ok(session.distribution())
    }

    fn session_handle(&self, credential: &Credential) -> Result<SessionHandle, ShuffleError> {
        self.get_session(credential).ok_or(ShuffleError::NoSession)
    }
}
