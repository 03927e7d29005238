// mshuffle Library - smart shuffle for streaming playlists
// Every listener gets a probability per track; features reshape it as they listen

pub mod auth;      // credentials -> session keys
pub mod config;    // settings and preferences
pub mod data;      // collective data shared across all listeners
pub mod engine;    // session lifecycle + weighted selection
pub mod error;     // errors callers can act on
pub mod features;  // history, satisfaction
pub mod music;     // catalog types and the catalog trait
pub mod session;   // per-listener probability ledger
#[cfg(feature = "spotify")]
pub mod spotify;   // related-artist lookups (when needed)

// Export the stuff callers actually use
pub use auth::{Credential, SessionKey};
pub use config::Config;
pub use data::CollectiveDataStore;
pub use engine::{ShuffleEngine, ShuffleEngineBuilder};
pub use error::ShuffleError;
pub use features::{Capacity, SessionOptions};
pub use music::{MusicApi, MusicApiError, OfflineMusicApi, Playlist, Track};
pub use session::{Distribution, ProbabilityEntry};
