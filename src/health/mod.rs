// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Link-health classification from packet timing

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Readings older than this are no data at all
const DISCONNECT_LATENCY_SECS: i64 = 10;
/// Readings older than this are stale
const STALE_LATENCY_SECS: i64 = 5;
/// Readings fresher than this get full base confidence
const FRESH_LATENCY_SECS: i64 = 2;
/// Arrival-rate window
const RATE_WINDOW_SECS: i64 = 60;

/// Outcome of one completed poll cycle, as seen by the health monitor.
#[derive(Debug, Clone)]
pub enum PollOutcome {
    /// The adapter fetched and the payload normalized
    Success {
        /// Timestamp the reading claims for itself
        reading_ts: DateTime<Utc>,
    },
    /// The adapter failed at the transport level
    Failure {
        /// Human-readable cause, for logs
        error: String,
    },
}

/// Connection state derived from reading recency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HealthState {
    /// Fresh data is flowing
    Connected,
    /// Data is arriving but noticeably behind real time
    Stale,
    /// No usable data; consumers should show "no data", not a stale value
    Disconnected,
}

/// Current link health: state, confidence and last packet time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Connection state
    pub state: HealthState,
    /// Confidence in the link, 0–100
    pub confidence: u8,
    /// Arrival time of the last successful poll
    pub last_packet: Option<DateTime<Utc>>,
}

impl HealthStatus {
    /// Initial status: disconnected until the first successful poll.
    pub fn disconnected() -> Self {
        Self {
            state: HealthState::Disconnected,
            confidence: 0,
            last_packet: None,
        }
    }
}

/// Classifies link health from poll outcomes and arrival timing.
///
/// Pure with respect to its inputs: the caller supplies `now`, so the
/// monitor is unit-testable without network access or sleeps.
#[derive(Debug, Clone)]
pub struct HealthMonitor {
    arrivals: VecDeque<DateTime<Utc>>,
    expected_rate: f64,
    status: HealthStatus,
}

impl HealthMonitor {
    /// New monitor expecting `expected_rate` packets per minute when healthy.
    pub fn new(expected_rate: f64) -> Self {
        Self {
            arrivals: VecDeque::new(),
            expected_rate: expected_rate.max(1.0),
            status: HealthStatus::disconnected(),
        }
    }

    /// Fold one poll outcome into the monitor and return the new status.
    pub fn observe(&mut self, outcome: &PollOutcome, now: DateTime<Utc>) -> HealthStatus {
        match outcome {
            PollOutcome::Failure { .. } => {
                // Immediate, regardless of prior arrival history
                self.status.state = HealthState::Disconnected;
                self.status.confidence = 0;
            }
            PollOutcome::Success { reading_ts } => {
                self.arrivals.push_back(now);
                let cutoff = now - Duration::seconds(RATE_WINDOW_SECS);
                while self.arrivals.front().is_some_and(|&t| t < cutoff) {
                    self.arrivals.pop_front();
                }

                let packets_per_minute = self.arrivals.len() as f64;
                let latency = (now - *reading_ts).num_milliseconds() as f64 / 1000.0;

                let (state, base) = if latency > DISCONNECT_LATENCY_SECS as f64 {
                    (HealthState::Disconnected, 0.0)
                } else if latency > STALE_LATENCY_SECS as f64 {
                    (HealthState::Stale, 50.0)
                } else if latency > FRESH_LATENCY_SECS as f64 {
                    (HealthState::Connected, 75.0)
                } else {
                    (HealthState::Connected, 100.0)
                };

                let rate_factor = packets_per_minute.min(self.expected_rate) / self.expected_rate;
                self.status.state = state;
                self.status.confidence = (base * rate_factor).round() as u8;
                self.status.last_packet = Some(now);
            }
        }

        self.status.clone()
    }

    /// Current status without folding in a new outcome.
    pub fn status(&self) -> HealthStatus {
        self.status.clone()
    }
}
