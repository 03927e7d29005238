// Spotify integration - related-artist lookups against the Web API
// Login/refresh lives outside the engine; we only get handed a valid access token

use crate::auth::Credential;
use crate::config::SpotifyConfig;
use crate::music::{ArtistId, MusicApi, MusicApiError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub struct SpotifyClient {
    http: reqwest::Client,
    api_base_url: String,
}

#[derive(Debug, Deserialize)]
struct RelatedArtistsResponse {
    #[serde(default)]
    artists: Vec<SpotifyArtist>,
}

#[derive(Debug, Deserialize)]
struct SpotifyArtist {
    id: String,
    #[allow(dead_code)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct SpotifyErrorBody {
    error: SpotifyErrorDetail,
}

#[derive(Debug, Deserialize)]
struct SpotifyErrorDetail {
    message: String,
}

impl SpotifyClient {
    pub fn new(config: &SpotifyConfig) -> Result<Self, MusicApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| MusicApiError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl MusicApi for SpotifyClient {
    async fn similar_artists(
        &self,
        credential: &Credential,
        artist_id: &ArtistId,
    ) -> Result<Vec<ArtistId>, MusicApiError> {
        let url = format!("{}/artists/{}/related-artists", self.api_base_url, artist_id);
        debug!("GET {}", url);

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, credential.bearer_header())
            .send()
            .await
            .map_err(|e| MusicApiError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Spotify wraps errors as {"error": {"status": .., "message": ..}}
            let message = match response.json::<SpotifyErrorBody>().await {
                Ok(body) => body.error.message,
                Err(_) => status.canonical_reason().unwrap_or("unknown error").to_string(),
            };
            return Err(MusicApiError::Status {
                code: status.as_u16(),
                message,
            });
        }

        let body: RelatedArtistsResponse = response
            .json()
            .await
            .map_err(|e| MusicApiError::Decode(e.to_string()))?;

        Ok(body
            .artists
            .into_iter()
            .filter(|artist| !artist.id.is_empty())
            .map(|artist| ArtistId(artist.id))
            .collect())
    }
}
