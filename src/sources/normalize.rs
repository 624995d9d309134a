// Copyright (c) 2026 envfuse contributors
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/envfuse/envfuse

//! Payload normalization - source-specific fields to canonical channels

use tracing::debug;

use super::{RawPayload, SourceDescriptor, SourceKind};
use crate::reading::{Channel, PartialReading};

const KMH_TO_MS: f64 = 1.0 / 3.6;

/// Map a source-specific payload onto the canonical channel vocabulary.
///
/// Fields absent from the payload stay absent — they are never defaulted
/// here, so "sensor reported zero" and "sensor did not report" remain
/// distinguishable downstream. A payload of the wrong shape yields an
/// all-absent reading (ParseError semantics, non-fatal).
pub fn normalize(descriptor: &SourceDescriptor, payload: &RawPayload) -> PartialReading {
    let timestamp = payload.source_ts.unwrap_or(payload.received_at);
    let mut partial = PartialReading::new(&descriptor.name, timestamp);

    match descriptor.kind {
        SourceKind::OpenMeteo => {
            let current = &payload.body["current"];
            set(&mut partial, Channel::Temperature, num(&current["temperature_2m"]));
            set(&mut partial, Channel::Humidity, num(&current["relative_humidity_2m"]));
            set(&mut partial, Channel::Pressure, num(&current["surface_pressure"]));
            // Open-Meteo reports wind in km/h
            set(
                &mut partial,
                Channel::WindSpeed,
                num(&current["wind_speed_10m"]).map(|v| v * KMH_TO_MS),
            );
        }
        SourceKind::AirQuality => {
            set(&mut partial, Channel::Pm25, num(&payload.body["current"]["pm2_5"]));
        }
        SourceKind::Bridge => {
            // ThingSpeak feeds return field values as strings
            set(&mut partial, Channel::Temperature, num(&payload.body["field1"]));
            set(&mut partial, Channel::Humidity, num(&payload.body["field2"]));
            set(&mut partial, Channel::Pressure, num(&payload.body["field3"]));
            set(
                &mut partial,
                Channel::WindSpeed,
                num(&payload.body["field4"]).map(|v| v * KMH_TO_MS),
            );
            set(&mut partial, Channel::Pm25, num(&payload.body["field5"]));
        }
        SourceKind::Simulator => {
            set(&mut partial, Channel::Temperature, num(&payload.body["temperature"]));
            set(&mut partial, Channel::Humidity, num(&payload.body["humidity"]));
            set(&mut partial, Channel::GasPpm, num(&payload.body["gas_ppm"]));
            set(&mut partial, Channel::RainLevel, num(&payload.body["rain_level"]));
            set(&mut partial, Channel::Ph, num(&payload.body["ph"]));
            set(
                &mut partial,
                Channel::Motion,
                payload.body["motion"].as_bool().map(|b| if b { 1.0 } else { 0.0 }),
            );
        }
    }

    if partial.is_empty() {
        debug!(source = %descriptor.name, "payload yielded no recognizable channels");
    }

    partial
}

/// Extract a number from a JSON value, accepting numeric strings the way
/// feed APIs emit them.
fn num(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(n) => n.as_f64(),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn set(partial: &mut PartialReading, channel: Channel, value: Option<f64>) {
    if let Some(v) = value {
        partial.insert(channel, v);
    }
}
