use crate::domain::model::LyricsMatch;
use crate::domain::ports::LyricsSource;
use crate::utils::error::{ResilienceError, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize)]
struct LyricsResponse {
    lyrics: Option<String>,
}

/// Lyrics search over a `GET {endpoint}/{artist}/{title}` JSON API.
#[derive(Debug, Clone)]
pub struct HttpLyricsSource {
    client: Client,
    endpoint: Url,
}

impl HttpLyricsSource {
    pub fn new(endpoint: &str, timeout: Duration, user_agent: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint).map_err(|e| ResilienceError::InvalidConfigValueError {
            field: "source.endpoint".to_string(),
            value: endpoint.to_string(),
            reason: format!("Invalid URL format: {}", e),
        })?;

        if endpoint.cannot_be_a_base() {
            return Err(ResilienceError::InvalidConfigValueError {
                field: "source.endpoint".to_string(),
                value: endpoint.to_string(),
                reason: "URL cannot be used as a base".to_string(),
            });
        }

        // 每個請求自帶逾時，確保比斷路器的恢復時間短
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(user_agent)
            .build()?;

        Ok(Self { client, endpoint })
    }

    fn search_url(&self, title: &str, artist: &str) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push(artist).push(title);
        }
        url
    }
}

#[async_trait]
impl LyricsSource for HttpLyricsSource {
    async fn search(&self, title: &str, artist: &str) -> Result<Option<LyricsMatch>> {
        let url = self.search_url(title, artist);
        tracing::debug!("Requesting lyrics from: {}", url);

        let response = self.client.get(url).send().await?;
        let status = response.status();
        tracing::debug!("Lyrics API response status: {}", status);

        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ResilienceError::UpstreamError {
                status: status.as_u16(),
                message,
            });
        }

        let body: LyricsResponse = response.json().await?;
        Ok(body
            .lyrics
            .filter(|text| !text.trim().is_empty())
            .map(|lyrics| LyricsMatch {
                lyrics,
                title: Some(title.to_string()),
                artist: Some(artist.to_string()),
            }))
    }
}
