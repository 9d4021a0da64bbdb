//! # HTTP Adapters
//!
//! Backend access over `reqwest`:
//!
//! - [`HttpConstantsSource`]: `GET {base}/constants`, a flat JSON object of
//!   named coefficients
//! - [`HttpRoomStore`]: `PUT {base}/salas/{id}` with a [`RoomRecord`] body
//!
//! ## Example
//!
//! ```rust,no_run
//! use clima_core::constants::ConstantsRegistry;
//! use clima_core::http::{HttpConfig, HttpConstantsSource};
//!
//! # async fn demo() -> clima_core::errors::CalcResult<()> {
//! let config = HttpConfig::new("http://localhost:8000/api");
//! let registry = ConstantsRegistry::new();
//! registry.load_from(&HttpConstantsSource::new(&config)?).await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::constants::{ConstantsSource, SystemConstants};
use crate::errors::{CalcError, CalcResult};
use crate::record::{PersistenceSink, RoomRecord};

/// User agent sent with every request
pub const USER_AGENT: &str = concat!("clima_core/", env!("CARGO_PKG_VERSION"));

/// Backend location and request timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        HttpConfig {
            base_url: "http://localhost:8000".to_string(),
            timeout_secs: 10,
        }
    }
}

impl HttpConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpConfig {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `base_url` with `segments` appended, each one percent-encoded.
    pub fn endpoint(&self, segments: &[&str]) -> CalcResult<Url> {
        let invalid = |reason: String| CalcError::invalid_input("base_url", self.base_url.clone(), reason);

        let mut url = Url::parse(&self.base_url).map_err(|e| invalid(e.to_string()))?;
        url.path_segments_mut()
            .map_err(|_| invalid("URL cannot have a path".to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn client(&self) -> CalcResult<Client> {
        Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout())
            .build()
            .map_err(|e| CalcError::network(self.base_url.clone(), format!("failed to create HTTP client: {}", e)))
    }
}

// ============================================================================
// Constants
// ============================================================================

/// Loads the constants table from the backend.
#[derive(Debug, Clone)]
pub struct HttpConstantsSource {
    client: Client,
    url: Url,
}

impl HttpConstantsSource {
    pub fn new(config: &HttpConfig) -> CalcResult<Self> {
        Ok(HttpConstantsSource {
            client: config.client()?,
            url: config.endpoint(&["constants"])?,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[async_trait]
impl ConstantsSource for HttpConstantsSource {
    async fn fetch(&self) -> CalcResult<SystemConstants> {
        let url = self.url.as_str();
        debug!(url, "fetching system constants");

        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| CalcError::network(url, e.to_string()))?;

        if !response.status().is_success() {
            return Err(CalcError::network(url, format!("backend returned {}", response.status())));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| CalcError::serialization(format!("invalid constants payload from {}: {}", url, e)))?;

        let constants = SystemConstants::from_json(&body)?;
        info!(url, count = constants.len(), "system constants fetched");
        Ok(constants)
    }
}

// ============================================================================
// Room records
// ============================================================================

/// Writes room records into the backend's room resource.
#[derive(Debug, Clone)]
pub struct HttpRoomStore {
    client: Client,
    config: HttpConfig,
}

impl HttpRoomStore {
    pub fn new(config: &HttpConfig) -> CalcResult<Self> {
        Ok(HttpRoomStore {
            client: config.client()?,
            config: config.clone(),
        })
    }

    pub fn room_url(&self, room_id: &str) -> CalcResult<Url> {
        self.config.endpoint(&["salas", room_id])
    }
}

#[async_trait]
impl PersistenceSink for HttpRoomStore {
    async fn save(&self, record: &RoomRecord) -> CalcResult<()> {
        let room_id = record.room_id.as_str();
        let url = self.room_url(room_id)?;

        let response = self
            .client
            .put(url.clone())
            .json(record)
            .send()
            .await
            .map_err(|e| CalcError::persistence_failure(room_id, format!("PUT {}: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(CalcError::persistence_failure(
                room_id,
                format!("PUT {} returned {}", url, response.status()),
            ));
        }

        debug!(room = room_id, %url, "room record stored");
        Ok(())
    }
}
