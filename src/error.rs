// Errors surfaced to whoever drives the engine (transport layer, CLI)

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShuffleError {
    #[error("no listening session for this credential, load a playlist first")]
    NoSession,

    #[error("no active track")]
    NoActiveTrack,
}
