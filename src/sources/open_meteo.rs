// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Open-Meteo current-weather adapter

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use super::{build_client, get_json, FetchError, RawPayload, SourceAdapter, SourceDescriptor, SourceKind};
use crate::reading::Channel;

const DEFAULT_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";

/// Polls the Open-Meteo forecast API for the current weather block at a
/// fixed coordinate. Regional data, so it usually serves as a baseline
/// rather than the local reading.
pub struct OpenMeteoAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl OpenMeteoAdapter {
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
        let url = format!(
            "{base}?latitude={latitude}&longitude={longitude}\
             &current=temperature_2m,relative_humidity_2m,surface_pressure,wind_speed_10m\
             &timezone=auto"
        );

        Ok(Self {
            descriptor: SourceDescriptor {
                name: name.to_string(),
                kind: SourceKind::OpenMeteo,
                interval,
                priority,
                capabilities: vec![
                    Channel::Temperature,
                    Channel::Humidity,
                    Channel::Pressure,
                    Channel::WindSpeed,
                ],
            },
            client: build_client(timeout)?,
            url,
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for OpenMeteoAdapter {
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
