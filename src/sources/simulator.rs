// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Simulated source for demo mode and testing

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use rand::prelude::*;
use serde_json::json;

use super::{FetchError, RawPayload, SourceAdapter, SourceDescriptor, SourceKind};
use crate::reading::Channel;

/// Generates realistic environmental telemetry without any hardware or
/// network: slow sinusoidal trends with per-poll sensor noise, plus the
/// mode-specific rain/pH/motion channels of the hardware bridge.
pub struct SimulatorAdapter {
    descriptor: SourceDescriptor,
    state: Mutex<SimState>,
}

struct SimState {
    rng: rand::rngs::StdRng,
    time: f64,
    drift: f64,
}

impl SimulatorAdapter {
    pub fn new(name: &str, interval: Duration, priority: u8) -> Self {
        Self {
            descriptor: SourceDescriptor {
                name: name.to_string(),
                kind: SourceKind::Simulator,
                interval,
                priority,
                capabilities: vec![
                    Channel::Temperature,
                    Channel::Humidity,
                    Channel::GasPpm,
                    Channel::RainLevel,
                    Channel::Ph,
                    Channel::Motion,
                ],
            },
            state: Mutex::new(SimState {
                rng: rand::rngs::StdRng::from_entropy(),
                time: 0.0,
                drift: 0.0,
            }),
        }
    }
}

#[async_trait]
impl SourceAdapter for SimulatorAdapter {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    async fn poll(&self) -> Result<RawPayload, FetchError> {
        let mut state = self.state.lock();
        state.time += 1.0;
        state.drift += state.rng.gen_range(-0.01..0.01);

        let t = state.time;
        let drift = state.drift;

        let temperature = 24.0 + (t / 10.0).sin() * 2.0 + drift + state.rng.gen_range(-0.25..0.25);
        let humidity = 45.0 + (t / 20.0).sin() * 5.0 + state.rng.gen_range(-0.5..0.5);
        let gas_ppm = 12.0 + (t / 15.0).cos() * 3.0 + state.rng.gen_range(-1.0..1.0);
        let rain_level = (3.0 + (t / 30.0).sin() * 4.0 + state.rng.gen_range(-1.0..1.0)).max(0.0);
        let ph = 7.0 + (t / 40.0).sin() * 0.3 + state.rng.gen_range(-0.05..0.05);
        let motion = state.rng.gen::<f64>() < 0.03;

        let body = json!({
            "temperature": temperature,
            "humidity": humidity,
            "gas_ppm": gas_ppm,
            "rain_level": rain_level,
            "ph": ph,
            "motion": motion,
        });

        Ok(RawPayload {
            body,
            source_ts: None,
            received_at: Utc::now(),
        })
    }
}
