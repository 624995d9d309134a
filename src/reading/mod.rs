// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Canonical reading types shared by every stage of the pipeline

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single named measured quantity.
///
/// Channels are the canonical vocabulary of the engine: adapters map their
/// source-specific field names onto these before anything else sees the data.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    /// Air temperature in °C
    Temperature,
    /// Relative humidity in %
    Humidity,
    /// PM2.5 mass concentration in µg/m³
    Pm25,
    /// Gas concentration in ppm (MQ-series analog sensors)
    GasPpm,
    /// Surface pressure in hPa
    Pressure,
    /// Wind speed in m/s
    WindSpeed,
    /// Rain intensity in % of sensor range
    RainLevel,
    /// Water pH
    Ph,
    /// Motion detection flag, 0.0 or 1.0
    Motion,
}

impl Channel {
    /// Every channel the engine tracks, in canonical order.
    pub const ALL: [Channel; 9] = [
        Channel::Temperature,
        Channel::Humidity,
        Channel::Pm25,
        Channel::GasPpm,
        Channel::Pressure,
        Channel::WindSpeed,
        Channel::RainLevel,
        Channel::Ph,
        Channel::Motion,
    ];

    /// Measurement unit, for presentation only.
    pub fn unit(&self) -> &'static str {
        match self {
            Channel::Temperature => "°C",
            Channel::Humidity => "%",
            Channel::Pm25 => "µg/m³",
            Channel::GasPpm => "ppm",
            Channel::Pressure => "hPa",
            Channel::WindSpeed => "m/s",
            Channel::RainLevel => "%",
            Channel::Ph => "pH",
            Channel::Motion => "",
        }
    }

    /// True for channels carrying a boolean flag encoded as 0.0/1.0.
    pub fn is_flag(&self) -> bool {
        matches!(self, Channel::Motion)
    }

    /// Decimal places used when a value is rounded for display.
    /// Stored state is never rounded.
    pub fn display_decimals(&self) -> usize {
        match self {
            Channel::Temperature | Channel::Humidity | Channel::Ph => 1,
            Channel::Pressure | Channel::WindSpeed => 1,
            Channel::Pm25 | Channel::GasPpm | Channel::RainLevel | Channel::Motion => 0,
        }
    }
}

/// One timestamped snapshot of all tracked channels.
///
/// A channel absent from the map means "not reported" — it is never coerced
/// to zero inside the engine. Defaulting, if any, happens at the UI boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reading {
    /// When the reading was produced
    pub timestamp: DateTime<Utc>,
    /// Finite channel values; absent keys are absent measurements
    pub channels: BTreeMap<Channel, f64>,
}

impl Reading {
    /// Empty reading at the given timestamp.
    pub fn new(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            channels: BTreeMap::new(),
        }
    }

    /// Value of a channel, or `None` when the channel was not reported.
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.channels.get(&channel).copied()
    }

    /// Insert a channel value. Non-finite values are dropped so the map only
    /// ever holds real measurements.
    pub fn insert(&mut self, channel: Channel, value: f64) {
        if value.is_finite() {
            self.channels.insert(channel, value);
        }
    }

    /// True when no channel carries a value.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Display-rounded value for a channel, presentation layer only.
    pub fn display(&self, channel: Channel) -> Option<String> {
        self.get(channel)
            .map(|v| format!("{:.*}", channel.display_decimals(), v))
    }
}

/// A source's contribution for one poll: the subset of channels it reported,
/// already mapped to canonical names and units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialReading {
    /// Name of the source that produced this reading
    pub source: String,
    /// Timestamp reported by the source, or receive time if it reports none
    pub timestamp: DateTime<Utc>,
    /// Reported channel values; missing fields stay missing
    pub channels: BTreeMap<Channel, f64>,
}

impl PartialReading {
    /// Empty partial reading for a source.
    pub fn new(source: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: source.to_string(),
            timestamp,
            channels: BTreeMap::new(),
        }
    }

    /// Value of a channel, or `None` when the source did not report it.
    pub fn get(&self, channel: Channel) -> Option<f64> {
        self.channels.get(&channel).copied()
    }

    /// Insert a channel value, dropping non-finite input.
    pub fn insert(&mut self, channel: Channel, value: f64) {
        if value.is_finite() {
            self.channels.insert(channel, value);
        }
    }

    /// True when the payload yielded no usable channels.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_finite_values_are_dropped() {
        let mut reading = Reading::new(Utc::now());
        reading.insert(Channel::Temperature, f64::NAN);
        reading.insert(Channel::Humidity, f64::INFINITY);
        reading.insert(Channel::Pm25, 12.5);

        assert_eq!(reading.get(Channel::Temperature), None);
        assert_eq!(reading.get(Channel::Humidity), None);
        assert_eq!(reading.get(Channel::Pm25), Some(12.5));
    }

    #[test]
    fn display_rounds_without_touching_stored_value() {
        let mut reading = Reading::new(Utc::now());
        reading.insert(Channel::Temperature, 24.5678);

        assert_eq!(reading.display(Channel::Temperature).unwrap(), "24.6");
        assert_eq!(reading.get(Channel::Temperature), Some(24.5678));
    }
}
