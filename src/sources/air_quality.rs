// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Open-Meteo air-quality adapter

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{build_client, get_json, FetchError, RawPayload, SourceAdapter, SourceDescriptor, SourceKind};
use crate::reading::Channel;

const DEFAULT_BASE_URL: &str = "https://air-quality-api.open-meteo.com/v1/air-quality";

/// Polls the Open-Meteo air-quality API for the current PM2.5 mass
/// concentration at a fixed coordinate.
pub struct AirQualityAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl AirQualityAdapter {
    pub fn new(
        name: &str,
        latitude: f64,
        longitude: f64,
        interval: Duration,
        priority: u8,
        timeout: Duration,
        base_url: Option<&str>,
    ) -> anyhow::Result<Self> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base}?latitude={latitude}&longitude={longitude}&current=pm2_5");

        Ok(Self {
            descriptor: SourceDescriptor {
                name: name.to_string(),
                kind: SourceKind::AirQuality,
                interval,
                priority,
                capabilities: vec![Channel::Pm25],
            },
            client: build_client(timeout)?,
            url,
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for AirQualityAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn poll(&self) -> Result<RawPayload, FetchError> {
        let body = get_json(&self.client, &self.url, self.timeout).await?;

        Ok(RawPayload {
            body,
            source_ts: None,
            received_at: Utc::now(),
        })
    }
}
