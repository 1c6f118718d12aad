//! HTTP implementation of RobotBackend against the robot's REST API.

use crate::backend::RobotBackend;
use crate::error::EnvError;
use crate::types::{
    CommandReply, DockCommand, GotoCommand, MapId, MapPayload, MarkerRecord, MarkerSet,
    PoseEnvelope, SaveMarkersRequest,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Connection settings for the robot's web API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Base URL every endpoint path is appended to
    pub base_url: String,

    /// Per-request timeout in milliseconds
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000/api".to_string(),
            timeout_ms: 5_000,
        }
    }
}

/// Production backend talking JSON over HTTP.
pub struct HttpBackend {
    client: reqwest::Client,
    config: HttpConfig,
}

impl HttpBackend {
    /// Creates a backend with its own connection pool.
    pub fn new(config: HttpConfig) -> Result<Self, EnvError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| EnvError::transport(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Base URL plus `segments`, each percent-encoded as one path segment.
    fn endpoint(&self, segments: &[&str]) -> Result<reqwest::Url, EnvError> {
        let base = &self.config.base_url;
        let mut url = reqwest::Url::parse(base)
            .map_err(|e| EnvError::transport(format!("invalid base URL {}: {}", base, e)))?;
        url.path_segments_mut()
            .map_err(|_| EnvError::transport(format!("base URL {} cannot take a path", base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn map_error(&self, err: reqwest::Error) -> EnvError {
        if err.is_timeout() {
            EnvError::Timeout(self.config.timeout_ms)
        } else if err.is_connect() {
            EnvError::unreachable(&self.config.base_url)
        } else if err.is_decode() {
            EnvError::serialization(err)
        } else {
            EnvError::transport(err.to_string())
        }
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, EnvError> {
        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(EnvError::NotFound(response.url().path().to_string()));
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(EnvError::Status {
                code: status.as_u16(),
                message,
            });
        }
        response.json::<T>().await.map_err(|e| self.map_error(e))
    }

    async fn get_json<T: DeserializeOwned>(&self, segments: &[&str]) -> Result<T, EnvError> {
        let url = self.endpoint(segments)?;
        tracing::debug!("GET {}", url);
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.read_json(response).await
    }

    async fn post_json<B: Serialize + Sync, T: DeserializeOwned>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<T, EnvError> {
        let url = self.endpoint(segments)?;
        tracing::debug!("POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| self.map_error(e))?;
        self.read_json(response).await
    }
}

#[async_trait]
impl RobotBackend for HttpBackend {
    async fn fetch_map(&self, map_id: &MapId) -> Result<MapPayload, EnvError> {
        self.get_json(&["maps", map_id.as_str()]).await
    }

    async fn fetch_pose(&self) -> Result<PoseEnvelope, EnvError> {
        self.get_json(&["maps", "position"]).await
    }

    async fn load_markers(&self, map_id: &MapId) -> Result<Vec<MarkerRecord>, EnvError> {
        let set: MarkerSet = self.get_json(&["load-markers", map_id.as_str()]).await?;
        Ok(set.markers)
    }

    async fn save_markers(&self, request: SaveMarkersRequest) -> Result<(), EnvError> {
        let _: serde_json::Value = self.post_json(&["save-markers"], &request).await?;
        Ok(())
    }

    async fn goto(&self, command: GotoCommand) -> Result<CommandReply, EnvError> {
        let reply: CommandReply = self.post_json(&["base", "maps"], &command).await?;
        if let Some(err) = &reply.error {
            tracing::error!("Robot rejected goto: {}", err);
        }
        Ok(reply)
    }

    async fn dock(&self) -> Result<CommandReply, EnvError> {
        let reply: CommandReply = self.post_json(&["base"], &DockCommand::default()).await?;
        if let Some(err) = &reply.error {
            tracing::error!("Robot rejected dock: {}", err);
        }
        Ok(reply)
    }
}
