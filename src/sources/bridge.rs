// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Hardware-bridge adapter - ThingSpeak-style channel feed

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{build_client, get_json, FetchError, RawPayload, SourceAdapter, SourceDescriptor, SourceKind};
use crate::reading::Channel;

const DEFAULT_BASE_URL: &str = "https://api.thingspeak.com";

/// Polls a ThingSpeak-style channel feed published by the hardware bridge.
///
/// Field mapping: field1 = temperature, field2 = humidity, field3 = pressure,
/// field4 = wind speed, field5 = PM2.5. The feed's `created_at` is carried
/// through as the source timestamp so latency reflects the device, not the
/// proxy.
pub struct BridgeAdapter {
    descriptor: SourceDescriptor,
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl BridgeAdapter {
    pub fn new(
        name: &str,
        channel_id: &str,
        interval: Duration,
        priority: u8,
        timeout: Duration,
        base_url: Option<&str>,
    ) -> anyhow::Result<Self> {
        let base = base_url.unwrap_or(DEFAULT_BASE_URL);
        let url = format!("{base}/channels/{channel_id}/feeds/last.json");

        Ok(Self {
            descriptor: SourceDescriptor {
                name: name.to_string(),
                kind: SourceKind::Bridge,
                interval,
                priority,
                capabilities: vec![
                    Channel::Temperature,
                    Channel::Humidity,
                    Channel::Pressure,
                    Channel::WindSpeed,
                    Channel::Pm25,
                ],
            },
            client: build_client(timeout)?,
            url,
            timeout,
        })
    }
}

#[async_trait]
impl SourceAdapter for BridgeAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn poll(&self) -> Result<RawPayload, FetchError> {
        let body = get_json(&self.client, &self.url, self.timeout).await?;

        // ISO-8601 created_at from the feed, when present
        let source_ts = body
            .get("created_at")
            .and_then(|v| v.as_str())
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Ok(RawPayload {
            body,
            source_ts,
            received_at: Utc::now(),
        })
    }
}
