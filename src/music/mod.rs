// Music catalog types and the catalog collaborator
// Tracks are immutable once a playlist is loaded into a session

use crate::auth::Credential;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

string_id!(TrackId);
string_id!(AlbumId);
string_id!(ArtistId);
string_id!(PlaylistId);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    pub id: AlbumId,
    pub name: String,
    #[serde(default)]
    pub image: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    pub album: Album,
    pub artists: Vec<Artist>,
    pub duration_ms: u64,
    /// Playable media reference. `None` means the player has to skip this one.
    #[serde(default)]
    pub media_url: Option<String>,
}

impl Track {
    pub fn is_playable(&self) -> bool {
        self.media_url.is_some()
    }

    /// `'<name>' by <artist1>, <artist2>` - the label shown next to a probability.
    pub fn display_label(&self) -> String {
        let artists = self
            .artists
            .iter()
            .map(|artist| artist.name.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        format!("'{}' by {}", self.name, artists)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Playlist {
    pub id: PlaylistId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub owner: String,
    /// `None` until every page of the playlist has been fetched.
    #[serde(default)]
    pub tracks: Option<Vec<Track>>,
}

impl Playlist {
    pub fn len(&self) -> usize {
        self.tracks.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_loaded(&self) -> bool {
        self.tracks.is_some()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum MusicApiError {
    #[error("catalog returned {code}: {message}")]
    Status { code: u16, message: String },

    #[error("catalog request failed: {0}")]
    Transport(String),

    #[error("unexpected catalog response: {0}")]
    Decode(String),

    #[error("no music catalog configured")]
    Unavailable,
}

/// The slice of the music catalog the shuffle engine consumes.
///
/// Implementations validate the catalog's payload before returning, so
/// everything past this boundary works with typed ids.
#[async_trait]
pub trait MusicApi: Send + Sync {
    async fn similar_artists(
        &self,
        credential: &Credential,
        artist_id: &ArtistId,
    ) -> Result<Vec<ArtistId>, MusicApiError>;
}

/// Used when no catalog is wired up. Every lookup fails, which the
/// satisfaction feature tolerates.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineMusicApi;

#[async_trait]
impl MusicApi for OfflineMusicApi {
    async fn similar_artists(
        &self,
        _credential: &Credential,
        _artist_id: &ArtistId,
    ) -> Result<Vec<ArtistId>, MusicApiError> {
        Err(MusicApiError::Unavailable)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Canned similar-artist answers, with a call counter.
    #[derive(Default)]
    pub struct ScriptedMusicApi {
        responses: HashMap<ArtistId, Result<Vec<ArtistId>, u16>>,
        calls: AtomicUsize,
    }

    impl ScriptedMusicApi {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(mut self, artist: &str, similar: &[&str]) -> Self {
            let similar = similar.iter().map(|id| ArtistId::new(*id)).collect();
            self.responses.insert(ArtistId::new(artist), Ok(similar));
            self
        }

        pub fn fail(mut self, artist: &str) -> Self {
            self.responses.insert(ArtistId::new(artist), Err(503));
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MusicApi for ScriptedMusicApi {
        async fn similar_artists(
            &self,
            _credential: &Credential,
            artist_id: &ArtistId,
        ) -> Result<Vec<ArtistId>, MusicApiError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.responses.get(artist_id) {
                Some(Ok(similar)) => Ok(similar.clone()),
                Some(Err(code)) => Err(MusicApiError::Status {
                    code: *code,
                    message: "service unavailable".to_string(),
                }),
                None => Err(MusicApiError::Status {
                    code: 404,
                    message: "non existing id".to_string(),
                }),
            }
        }
    }
}
