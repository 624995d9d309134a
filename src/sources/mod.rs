// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Source module - upstream adapters and payload normalization

mod air_quality;
mod bridge;
mod normalize;
mod open_meteo;
mod simulator;

pub use air_quality::AirQualityAdapter;
pub use bridge::BridgeAdapter;
pub use normalize::normalize;
pub use open_meteo::OpenMeteoAdapter;
pub use simulator::SimulatorAdapter;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reading::Channel;

/// Transport-level failure of a poll. Parse problems are not fetch errors:
/// a malformed but well-formed-JSON payload normalizes to an all-absent
/// reading instead of failing the poll.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection refused, DNS failure, TLS failure, etc.
    #[error("request failed: {0}")]
    Transport(String),

    /// The adapter's timeout elapsed before a response arrived
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Upstream answered with a non-2xx status
    #[error("upstream returned HTTP {0}")]
    Status(u16),

    /// Response body was not valid JSON at all
    #[error("response body was not JSON: {0}")]
    Body(String),
}

impl FetchError {
    pub(crate) fn from_reqwest(err: reqwest::Error, timeout: Duration) -> Self {
        if err.is_timeout() {
            FetchError::Timeout(timeout)
        } else if let Some(status) = err.status() {
            FetchError::Status(status.as_u16())
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

/// Which upstream shape a source speaks. Drives payload normalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Open-Meteo forecast API, `current` weather block
    OpenMeteo,
    /// Open-Meteo air-quality API, `current` block
    AirQuality,
    /// ThingSpeak-style hardware bridge channel feed (field1..field5)
    Bridge,
    /// Built-in demo generator, no network
    Simulator,
}

/// Identifies one upstream data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDescriptor {
    /// Unique source name, used in logs and normalized readings
    pub name: String,
    /// Payload shape spoken by this source
    pub kind: SourceKind,
    /// How often the scheduler polls this source
    pub interval: Duration,
    /// Priority rank; the lowest rank acts as the local reading, higher
    /// ranks contribute baselines
    pub priority: u8,
    /// Channels this source can supply
    pub capabilities: Vec<Channel>,
}

/// Raw response from one poll, before normalization.
#[derive(Debug, Clone)]
pub struct RawPayload {
    /// Decoded JSON body
    pub body: serde_json::Value,
    /// Timestamp reported by the source itself, when it reports one
    pub source_ts: Option<DateTime<Utc>>,
    /// When the response arrived locally
    pub received_at: DateTime<Utc>,
}

/// One upstream data source: a single transport and a single response shape.
///
/// Implementations must bound their own latency with a timeout; a hung
/// adapter must not stall the rest of the pipeline.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Static description of this source.
    fn descriptor(&self) -> &SourceDescriptor;

    /// Fetch the latest payload. Only transport failures are errors.
    async fn poll(&self) -> Result<RawPayload, FetchError>;
}

/// Shared helper for the HTTP adapters: GET a URL and decode the JSON body.
pub(crate) async fn get_json(
    client: &reqwest::Client,
    url: &str,
    timeout: Duration,
) -> Result<serde_json::Value, FetchError> {
    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| FetchError::from_reqwest(e, timeout))?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    response
        .json::<serde_json::Value>()
        .await
        .map_err(|e| FetchError::Body(e.to_string()))
}

/// Build a reqwest client with the mandatory per-source timeout applied to
/// every request it issues.
pub(crate) fn build_client(timeout: Duration) -> anyhow::Result<reqwest::Client> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}
