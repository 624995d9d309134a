// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Fusion filter - cross-source blending and per-channel exponential smoothing

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::FusionConfig;
use crate::reading::{Channel, PartialReading, Reading};

/// Smoothing state for one channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelState {
    /// Last fused value
    pub value: f64,
    /// Smoothing coefficient, 0 < α ≤ 1
    pub alpha: f64,
    /// False until the channel receives its first real sample
    pub initialized: bool,
}

/// Per-channel smoothing state for one pipeline.
///
/// The filter is two-stage, in a fixed order: when a baseline reading is
/// available for a channel that the local source also reported, the raw
/// value fed to the EMA is first a weighted blend of local and baseline
/// (local is the proximate sensor and gets the larger weight); temporal
/// smoothing then runs on that blended value.
#[derive(Debug, Clone)]
pub struct FusionState {
    channels: BTreeMap<Channel, ChannelState>,
    local_weight: f64,
}

impl FusionState {
    /// Build fresh state from validated fusion settings.
    pub fn new(config: &FusionConfig) -> Self {
        let mut channels = BTreeMap::new();
        for channel in Channel::ALL {
            let alpha = config
                .channel_alpha
                .get(&channel)
                .copied()
                .unwrap_or(config.default_alpha);
            channels.insert(
                channel,
                ChannelState {
                    value: 0.0,
                    alpha,
                    initialized: false,
                },
            );
        }

        Self {
            channels,
            local_weight: config.local_weight,
        }
    }

    /// Fold one normalized poll into the state and produce the fused reading.
    ///
    /// Per channel:
    /// - absent in `incoming` → the previous fused value carries forward
    ///   unchanged (no decay);
    /// - first-ever sample → fused value equals the raw value;
    /// - otherwise → `prev * (1 - α) + raw * α`, where `raw` is the
    ///   local/baseline blend when both are present.
    pub fn fuse(&mut self, incoming: &PartialReading, baseline: Option<&PartialReading>) -> Reading {
        let mut reading = Reading::new(incoming.timestamp);

        for channel in Channel::ALL {
            let state = self
                .channels
                .get_mut(&channel)
                .expect("all channels are seeded at construction");

            let local = incoming.get(channel);
            let Some(local) = local else {
                // Carry-forward: the last fused value stays current
                if state.initialized {
                    reading.insert(channel, state.value);
                }
                continue;
            };

            let raw = match baseline.and_then(|b| b.get(channel)) {
                Some(base) => local * self.local_weight + base * (1.0 - self.local_weight),
                None => local,
            };

            if state.initialized {
                state.value = state.value * (1.0 - state.alpha) + raw * state.alpha;
            } else {
                state.value = raw;
                state.initialized = true;
            }

            reading.insert(channel, state.value);
        }

        reading
    }

    /// Last fused value for a channel, if the channel ever got a sample.
    pub fn value(&self, channel: Channel) -> Option<f64> {
        self.channels
            .get(&channel)
            .filter(|s| s.initialized)
            .map(|s| s.value)
    }
}
