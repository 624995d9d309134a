// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Pipeline scheduler - per-source timers driving the fusion engine

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alerts::{Alert, AlertEngine};
use crate::config::{Config, Profile};
use crate::fusion::FusionState;
use crate::health::{HealthMonitor, HealthStatus, PollOutcome};
use crate::history::HistoryBuffer;
use crate::reading::{Channel, PartialReading, Reading};
use crate::sources::{
    normalize, AirQualityAdapter, BridgeAdapter, FetchError, OpenMeteoAdapter, RawPayload,
    SimulatorAdapter, SourceAdapter, SourceDescriptor, SourceKind,
};

/// Queue depth between poll tasks and the state task
const EVENT_QUEUE_DEPTH: usize = 64;

/// Everything a poll task hands to the state task.
struct PollEvent {
    descriptor: SourceDescriptor,
    outcome: Result<RawPayload, FetchError>,
}

/// Pipeline-owned state. Written exclusively by the state task; the handle
/// only ever takes read locks, so consumers never observe in-progress
/// mutation.
struct EngineState {
    fusion: FusionState,
    history: HistoryBuffer,
    health: HealthMonitor,
    alerts: Vec<Alert>,
    /// Last successful partial per baseline source, keyed by name
    baselines: HashMap<String, (u8, PartialReading)>,
    /// True after the primary source's most recent poll failed
    primary_failed: bool,
}

/// Read-only view of the pipeline for UI collaborators. Cheap to clone.
#[derive(Clone)]
pub struct PipelineHandle {
    state: Arc<RwLock<EngineState>>,
}

impl PipelineHandle {
    /// Most recent fused reading, if any poll has completed.
    pub fn latest(&self) -> Option<Reading> {
        self.state.read().history.latest().cloned()
    }

    /// Ordered snapshot of the history buffer, bounded to its capacity.
    pub fn history(&self) -> Vec<Reading> {
        self.state.read().history.snapshot()
    }

    /// Current link health.
    pub fn health(&self) -> HealthStatus {
        self.state.read().health.status()
    }

    /// Alerts from the latest evaluation cycle.
    pub fn alerts(&self) -> Vec<Alert> {
        self.state.read().alerts.clone()
    }
}

/// Owns the per-source timers and drives each completed poll through
/// normalize → fuse → history → health → alerts, in that order.
///
/// Polls for different sources run concurrently, but all state updates
/// funnel through a single mpsc consumer, so append ordering and the
/// carry-forward rule hold without further locking.
pub struct Pipeline {
    config: Arc<Config>,
    adapters: Vec<Arc<dyn SourceAdapter>>,
    state: Arc<RwLock<EngineState>>,
    shutdown_tx: broadcast::Sender<()>,
    tasks: Vec<JoinHandle<()>>,
    running: bool,
}

impl Pipeline {
    /// Build a pipeline from configuration, constructing one adapter per
    /// configured source. Fails fast on invalid configuration.
    pub fn new(config: Config) -> Result<Self> {
        let adapters = build_adapters(&config)?;
        Self::with_adapters(config, adapters)
    }

    /// Build a pipeline around caller-supplied adapters. Used by tests and
    /// by embedders with custom transports.
    pub fn with_adapters(config: Config, adapters: Vec<Arc<dyn SourceAdapter>>) -> Result<Self> {
        config.validate()?;

        let state = EngineState {
            fusion: FusionState::new(&config.fusion),
            history: HistoryBuffer::new(config.history.capacity),
            health: HealthMonitor::new(config.health.expected_rate_per_min),
            alerts: Vec::new(),
            baselines: HashMap::new(),
            primary_failed: false,
        };

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config: Arc::new(config),
            adapters,
            state: Arc::new(RwLock::new(state)),
            shutdown_tx,
            tasks: Vec::new(),
            running: false,
        })
    }

    /// Read-only handle for consumers.
    pub fn handle(&self) -> PipelineHandle {
        PipelineHandle {
            state: Arc::clone(&self.state),
        }
    }

    /// Spawn the per-source timers and the state task.
    pub fn start(&mut self) -> Result<()> {
        if self.running {
            return Ok(());
        }
        info!(sources = self.adapters.len(), "starting pipeline");

        let (event_tx, event_rx) = mpsc::channel::<PollEvent>(EVENT_QUEUE_DEPTH);
        let primary_rank = self
            .adapters
            .iter()
            .map(|a| a.descriptor().priority)
            .min()
            .unwrap_or(0);

        // State task: the single writer
        let state = Arc::clone(&self.state);
        let config = Arc::clone(&self.config);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        self.tasks.push(tokio::spawn(async move {
            let engine = AlertEngine::new(config.alerts.rules.clone(), config.alerts.compound.clone());
            let mut event_rx = event_rx;
            loop {
                tokio::select! {
                    // Shutdown wins over queued events: nothing is applied
                    // after stop() is signalled
                    biased;
                    _ = shutdown_rx.recv() => break,
                    event = event_rx.recv() => match event {
                        Some(event) => apply_event(&state, &engine, &config, primary_rank, event),
                        None => break,
                    },
                }
            }
            debug!("state task stopped");
        }));

        // One timer per source
        for adapter in &self.adapters {
            let adapter = Arc::clone(adapter);
            let event_tx = event_tx.clone();
            let mut shutdown_rx = self.shutdown_tx.subscribe();
            self.tasks.push(tokio::spawn(async move {
                let descriptor = adapter.descriptor().clone();
                let mut ticker = interval(descriptor.interval);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

                loop {
                    tokio::select! {
                        _ = shutdown_rx.recv() => break,
                        _ = ticker.tick() => {
                            debug!(source = %descriptor.name, "polling");
                            let outcome = adapter.poll().await;
                            let event = PollEvent { descriptor: descriptor.clone(), outcome };
                            if event_tx.send(event).await.is_err() {
                                break;
                            }
                        }
                    }
                }
                debug!(source = %descriptor.name, "poll task stopped");
            }));
        }

        self.running = true;
        Ok(())
    }

    /// Stop all timers and the state task. In-flight fetches are abandoned:
    /// a result arriving after this returns is never applied.
    pub async fn stop(&mut self) {
        if !self.running {
            return;
        }
        info!("stopping pipeline");

        let _ = self.shutdown_tx.send(());
        for task in self.tasks.drain(..) {
            let _ = task.await;
        }
        self.running = false;
    }
}

fn build_adapters(config: &Config) -> Result<Vec<Arc<dyn SourceAdapter>>> {
    let mut adapters: Vec<Arc<dyn SourceAdapter>> = Vec::new();

    for source in &config.sources {
        let interval = Duration::from_secs(source.poll_interval_secs);
        let timeout = Duration::from_secs(source.timeout_secs);

        let adapter: Arc<dyn SourceAdapter> = match source.kind {
            SourceKind::Simulator => {
                Arc::new(SimulatorAdapter::new(&source.name, interval, source.priority))
            }
            SourceKind::OpenMeteo => Arc::new(OpenMeteoAdapter::new(
                &source.name,
                source.latitude.unwrap_or_default(),
                source.longitude.unwrap_or_default(),
                interval,
                source.priority,
                timeout,
                source.base_url.as_deref(),
            )?),
            SourceKind::AirQuality => Arc::new(AirQualityAdapter::new(
                &source.name,
                source.latitude.unwrap_or_default(),
                source.longitude.unwrap_or_default(),
                interval,
                source.priority,
                timeout,
                source.base_url.as_deref(),
            )?),
            SourceKind::Bridge => Arc::new(BridgeAdapter::new(
                &source.name,
                source.channel_id.as_deref().unwrap_or_default(),
                interval,
                source.priority,
                timeout,
                source.base_url.as_deref(),
            )?),
        };

        adapters.push(adapter);
    }

    Ok(adapters)
}

/// Apply one poll outcome. Runs only on the state task.
fn apply_event(
    state: &Arc<RwLock<EngineState>>,
    engine: &AlertEngine,
    config: &Config,
    primary_rank: u8,
    event: PollEvent,
) {
    let now = Utc::now();
    let is_primary = event.descriptor.priority == primary_rank;
    let mut st = state.write();

    match event.outcome {
        Err(err) => {
            warn!(source = %event.descriptor.name, error = %err, "poll failed");
            if is_primary {
                // Fusion state and history stay untouched: the last fused
                // value persists as the displayed value
                st.primary_failed = true;
                st.health.observe(
                    &PollOutcome::Failure {
                        error: err.to_string(),
                    },
                    now,
                );
            }
        }
        Ok(payload) => {
            let partial = normalize(&event.descriptor, &payload);
            let reading_ts = payload.source_ts.unwrap_or(payload.received_at);

            if is_primary {
                st.primary_failed = false;
                apply_local(&mut st, engine, config, partial, reading_ts, now, true);
            } else {
                st.baselines.insert(
                    event.descriptor.name.clone(),
                    (event.descriptor.priority, partial.clone()),
                );

                // Promoted baseline keeps the data flowing while the
                // primary is down, but does not drive link health
                if config.health.fallback_enabled && st.primary_failed {
                    debug!(source = %event.descriptor.name, "primary down, applying fallback reading");
                    apply_local(&mut st, engine, config, partial, reading_ts, now, false);
                }
            }
        }
    }
}

fn apply_local(
    st: &mut EngineState,
    engine: &AlertEngine,
    config: &Config,
    partial: PartialReading,
    reading_ts: DateTime<Utc>,
    now: DateTime<Utc>,
    drives_health: bool,
) {
    let baseline = if config.profile == Profile::Pro {
        composite_baseline(&st.baselines, &partial.source)
    } else {
        None
    };

    let previous = st.history.snapshot();
    let mut reading = st.fusion.fuse(&partial, baseline.as_ref());

    // A source-reported timestamp can lag a wall-clock stamp already in the
    // buffer (fallback promotion stamps with receive time); clamp so the
    // history stays timestamp-non-decreasing
    if let Some(last_ts) = st.history.latest().map(|r| r.timestamp) {
        if reading.timestamp < last_ts {
            reading.timestamp = last_ts;
        }
    }
    st.history.append(reading.clone());

    if drives_health {
        st.health.observe(&PollOutcome::Success { reading_ts }, now);
    }

    st.alerts = engine.evaluate(&reading, &previous);
}

/// Merge the stored baseline partials into one reference reading. Lower
/// priority rank wins per channel; the source currently acting as local is
/// excluded so a promoted fallback never blends with itself.
fn composite_baseline(
    baselines: &HashMap<String, (u8, PartialReading)>,
    local_source: &str,
) -> Option<PartialReading> {
    let mut entries: Vec<&(u8, PartialReading)> = baselines
        .iter()
        .filter(|(name, _)| name.as_str() != local_source)
        .map(|(_, entry)| entry)
        .collect();
    if entries.is_empty() {
        return None;
    }
    entries.sort_by_key(|(rank, _)| *rank);

    let mut merged = PartialReading::new("baseline", entries[0].1.timestamp);
    for (_, partial) in entries {
        for channel in Channel::ALL {
            if merged.get(channel).is_none() {
                if let Some(value) = partial.get(channel) {
                    merged.insert(channel, value);
                }
            }
        }
    }

    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use serde_json::json;

    use super::*;
    use crate::health::HealthState;

    /// Test adapter with a controllable poll delay and scripted outcomes.
    struct FakeAdapter {
        descriptor: SourceDescriptor,
        delay: Duration,
        temperature: f64,
        /// Polls that succeed before the adapter starts failing;
        /// usize::MAX means it never fails
        succeed_for: usize,
        polls: AtomicUsize,
    }

    impl FakeAdapter {
        fn new(name: &str, priority: u8, interval: Duration, temperature: f64) -> Self {
            Self {
                descriptor: SourceDescriptor {
                    name: name.to_string(),
                    kind: SourceKind::Simulator,
                    interval,
                    priority,
                    capabilities: vec![Channel::Temperature],
                },
                delay: Duration::ZERO,
                temperature,
                succeed_for: usize::MAX,
                polls: AtomicUsize::new(0),
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn failing_after(mut self, successes: usize) -> Self {
            self.succeed_for = successes;
            self
        }
    }

    #[async_trait]
    impl SourceAdapter for FakeAdapter {
        fn descriptor(&self) -> &SourceDescriptor {
            &self.descriptor
        }

        async fn poll(&self) -> Result<RawPayload, FetchError> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }

            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            if n >= self.succeed_for {
                return Err(FetchError::Transport("connection refused".to_string()));
            }

            Ok(RawPayload {
                body: json!({ "temperature": self.temperature }),
                source_ts: None,
                received_at: Utc::now(),
            })
        }
    }

    fn test_config() -> Config {
        let mut config = Config::default();
        config.sources = vec![crate::config::SourceConfig::simulator("fake", 1, 0)];
        config
    }

    #[tokio::test]
    async fn pipeline_fills_history_and_reports_connected() {
        let adapter = Arc::new(FakeAdapter::new(
            "fake",
            0,
            Duration::from_millis(20),
            25.0,
        ));
        let mut pipeline = Pipeline::with_adapters(test_config(), vec![adapter]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await;

        let history = handle.history();
        assert!(!history.is_empty());
        assert!(history.len() <= 50);
        assert!(history
            .windows(2)
            .all(|w| w[0].timestamp <= w[1].timestamp));
        assert_eq!(
            handle.latest().unwrap().get(Channel::Temperature),
            Some(25.0)
        );
        assert_eq!(handle.health().state, HealthState::Connected);
        assert!(handle.health().confidence > 0);
    }

    #[tokio::test]
    async fn hot_reading_raises_high_severity_alert() {
        let adapter = Arc::new(FakeAdapter::new(
            "fake",
            0,
            Duration::from_millis(20),
            41.0,
        ));
        let mut pipeline = Pipeline::with_adapters(test_config(), vec![adapter]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;
        pipeline.stop().await;

        let alerts = handle.alerts();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].metric, Channel::Temperature);
        assert_eq!(alerts[0].severity, crate::alerts::Severity::High);
    }

    #[tokio::test]
    async fn failure_disconnects_but_keeps_last_reading() {
        let adapter = Arc::new(
            FakeAdapter::new("fake", 0, Duration::from_millis(20), 25.0).failing_after(3),
        );
        let mut pipeline = Pipeline::with_adapters(test_config(), vec![adapter]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await;

        assert_eq!(handle.health().state, HealthState::Disconnected);
        assert_eq!(handle.health().confidence, 0);
        // Last fused value survives the outage
        assert_eq!(
            handle.latest().unwrap().get(Channel::Temperature),
            Some(25.0)
        );
        assert_eq!(handle.history().len(), 3);
    }

    #[tokio::test]
    async fn late_result_after_shutdown_is_discarded() {
        let adapter = Arc::new(
            FakeAdapter::new("fake", 0, Duration::from_millis(10), 25.0)
                .with_delay(Duration::from_millis(400)),
        );
        let mut pipeline = Pipeline::with_adapters(test_config(), vec![adapter]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        // stop() waits for the in-flight poll to unwind; its result must
        // not reach the state
        pipeline.stop().await;
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(handle.history().is_empty());
        assert_eq!(handle.health().state, HealthState::Disconnected);
        assert!(handle.health().last_packet.is_none());
        assert!(handle.alerts().is_empty());
    }

    #[tokio::test]
    async fn baseline_pulls_fused_value_toward_blend() {
        let local = Arc::new(FakeAdapter::new(
            "local",
            0,
            Duration::from_millis(40),
            25.0,
        ));
        let baseline = Arc::new(FakeAdapter::new(
            "regional",
            1,
            Duration::from_millis(10),
            20.0,
        ));

        let mut config = test_config();
        config.sources = vec![
            crate::config::SourceConfig::simulator("local", 1, 0),
            crate::config::SourceConfig::simulator("regional", 1, 1),
        ];

        let mut pipeline = Pipeline::with_adapters(config, vec![local, baseline]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        pipeline.stop().await;

        // Blended raw is 25*0.8 + 20*0.2 = 24; the EMA converges toward it
        let temp = handle.latest().unwrap().get(Channel::Temperature).unwrap();
        assert!(temp < 24.9, "expected blend to pull below 24.9, got {temp}");
        assert!(temp >= 23.9, "expected blend to stay near 24, got {temp}");
    }

    #[tokio::test]
    async fn fallback_source_feeds_history_while_primary_down() {
        let primary = Arc::new(
            FakeAdapter::new("primary", 0, Duration::from_millis(20), 25.0).failing_after(0),
        );
        let fallback = Arc::new(FakeAdapter::new(
            "secondary",
            1,
            Duration::from_millis(20),
            18.0,
        ));

        let mut config = test_config();
        config.sources = vec![
            crate::config::SourceConfig::simulator("primary", 1, 0),
            crate::config::SourceConfig::simulator("secondary", 1, 1),
        ];

        let mut pipeline = Pipeline::with_adapters(config, vec![primary, fallback]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        pipeline.stop().await;

        // Data keeps flowing from the fallback, but the link stays reported
        // as down
        assert_eq!(handle.health().state, HealthState::Disconnected);
        let latest = handle.latest().expect("fallback should populate history");
        assert_eq!(latest.get(Channel::Temperature), Some(18.0));
    }

    #[test]
    fn recovered_primary_cannot_rewind_history_timestamps() {
        let config = test_config();
        let engine = AlertEngine::new(config.alerts.rules.clone(), config.alerts.compound.clone());
        let mut st = EngineState {
            fusion: FusionState::new(&config.fusion),
            history: HistoryBuffer::new(config.history.capacity),
            health: HealthMonitor::new(config.health.expected_rate_per_min),
            alerts: Vec::new(),
            baselines: HashMap::new(),
            primary_failed: true,
        };

        // Promoted fallback reading is stamped with receive time
        let now = Utc::now();
        let mut fallback = PartialReading::new("secondary", now);
        fallback.insert(Channel::Temperature, 18.0);
        apply_local(&mut st, &engine, &config, fallback, now, now, false);

        // The primary recovers reporting a device timestamp 3s in the past,
        // normal latency for a bridged feed
        let device_ts = now - chrono::Duration::seconds(3);
        let mut primary = PartialReading::new("primary", device_ts);
        primary.insert(Channel::Temperature, 25.0);
        apply_local(&mut st, &engine, &config, primary, device_ts, now, true);

        let snap = st.history.snapshot();
        assert_eq!(snap.len(), 2);
        assert!(
            snap.windows(2).all(|w| w[0].timestamp <= w[1].timestamp),
            "history must stay timestamp-non-decreasing across the crossover"
        );
        // The clamped stamp never rewinds past the buffer tail
        assert_eq!(snap[1].timestamp, now);
    }

    #[tokio::test]
    async fn lite_profile_caps_history_at_twenty() {
        let adapter = Arc::new(FakeAdapter::new(
            "fake",
            0,
            Duration::from_millis(5),
            25.0,
        ));
        let mut config = Config::lite();
        config.sources = vec![crate::config::SourceConfig::simulator("fake", 1, 0)];

        let mut pipeline = Pipeline::with_adapters(config, vec![adapter]).unwrap();
        let handle = pipeline.handle();

        pipeline.start().unwrap();
        tokio::time::sleep(Duration::from_millis(400)).await;
        pipeline.stop().await;

        assert!(handle.history().len() <= 20);
        assert!(!handle.history().is_empty());
    }
}
