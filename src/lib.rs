// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! envfuse - Environmental Telemetry Fusion Engine
//!
//! Polls live environmental data sources on independent schedules,
//! normalizes their payloads into canonical readings, blends local sensor
//! data with external baselines through per-channel exponential smoothing,
//! keeps a bounded time-ordered history, classifies link health from packet
//! timing, and raises threshold-based alerts.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      envfuse Pipeline                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │  ┌─────────┐   ┌────────────┐   ┌────────┐   ┌───────────┐  │
//! │  │ Source  │ → │ Normalizer │ → │ Fusion │ → │  History  │  │
//! │  │ Adapter │   │            │   │ Filter │   │  Buffer   │  │
//! │  └─────────┘   └────────────┘   └────────┘   └───────────┘  │
//! │       ↓                              ↓             ↓        │
//! │  ┌───────────────┐            ┌──────────────────────────┐  │
//! │  │ Health Monitor│            │       Alert Engine       │  │
//! │  └───────────────┘            └──────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Consumers read the latest reading, the history snapshot, health status
//! and the alert list through a [`pipeline::PipelineHandle`]; they never
//! drive the pipeline themselves.

#![warn(missing_docs)]
#![allow(dead_code)]

pub mod alerts;
pub mod config;
pub mod fusion;
pub mod health;
pub mod history;
pub mod pipeline;
pub mod reading;
pub mod sources;

// Re-exports for convenience
pub use alerts::{Alert, AlertEngine, Severity};
pub use config::{Config, ConfigError, Profile};
pub use fusion::FusionState;
pub use health::{HealthMonitor, HealthState, HealthStatus, PollOutcome};
pub use history::HistoryBuffer;
pub use pipeline::{Pipeline, PipelineHandle};
pub use reading::{Channel, PartialReading, Reading};
pub use sources::{FetchError, SourceAdapter, SourceDescriptor, SourceKind};

/// envfuse version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// envfuse name
pub const NAME: &str = "envfuse";
