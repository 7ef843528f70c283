// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Glucose samples, units and trends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// mg/dL per mmol/L of glucose.
pub const MG_DL_PER_MMOL_L: f64 = 18.01559;

/// Supported glucose concentration units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum GlucoseUnit {
    #[serde(rename = "mg/dL")]
    MilligramsPerDeciliter,
    #[serde(rename = "mmol/L")]
    MillimolesPerLiter,
}

impl GlucoseUnit {
    /// Map a wire unit string; anything else is unsupported.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.to_ascii_lowercase().as_str() {
            "mg/dl" => Some(GlucoseUnit::MilligramsPerDeciliter),
            "mmol/l" => Some(GlucoseUnit::MillimolesPerLiter),
            _ => None,
        }
    }

    /// Convert `value` expressed in `self` into `target`.
    pub fn convert(self, value: f64, target: GlucoseUnit) -> f64 {
        match (self, target) {
            (GlucoseUnit::MillimolesPerLiter, GlucoseUnit::MilligramsPerDeciliter) => {
                value * MG_DL_PER_MMOL_L
            }
            (GlucoseUnit::MilligramsPerDeciliter, GlucoseUnit::MillimolesPerLiter) => {
                value / MG_DL_PER_MMOL_L
            }
            _ => value,
        }
    }
}

/// A glucose concentration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GlucoseQuantity {
    pub value: f64,
    pub unit: GlucoseUnit,
}

impl GlucoseQuantity {
    pub fn new(value: f64, unit: GlucoseUnit) -> Self {
        Self { value, unit }
    }

    pub fn value_in(&self, unit: GlucoseUnit) -> f64 {
        self.unit.convert(self.value, unit)
    }

    /// `self - other`, expressed in `self`'s unit.
    pub fn minus(&self, other: &GlucoseQuantity) -> GlucoseQuantity {
        GlucoseQuantity::new(self.value - other.value_in(self.unit), self.unit)
    }
}

/// Display trend arrow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "camelCase")]
pub enum GlucoseTrend {
    UpUpUp,
    UpUp,
    Up,
    Flat,
    Down,
    DownDown,
    DownDownDown,
}

impl GlucoseTrend {
    /// Map the remote seven-way trend category onto the display trend.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw {
            "constant" => Some(GlucoseTrend::Flat),
            "slowFall" => Some(GlucoseTrend::Down),
            "slowRise" => Some(GlucoseTrend::Up),
            "moderateFall" => Some(GlucoseTrend::DownDown),
            "moderateRise" => Some(GlucoseTrend::UpUp),
            "rapidFall" => Some(GlucoseTrend::DownDownDown),
            "rapidRise" => Some(GlucoseTrend::UpUpUp),
            _ => None,
        }
    }
}

/// A cached glucose reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GlucoseSample {
    pub sync_identifier: String,
    pub start_date: DateTime<Utc>,
    pub quantity: GlucoseQuantity,
    pub trend: Option<GlucoseTrend>,
    /// Rate of change in `quantity.unit` per minute.
    pub trend_rate: Option<f64>,
    pub provenance: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unit_from_wire() {
        assert_eq!(
            GlucoseUnit::from_wire("mg/dL"),
            Some(GlucoseUnit::MilligramsPerDeciliter)
        );
        assert_eq!(
            GlucoseUnit::from_wire("mmol/L"),
            Some(GlucoseUnit::MillimolesPerLiter)
        );
        assert_eq!(GlucoseUnit::from_wire("g/L"), None);
    }

    #[test]
    fn test_minus_normalizes_units() {
        let latest = GlucoseQuantity::new(100.0, GlucoseUnit::MilligramsPerDeciliter);
        let previous = GlucoseQuantity::new(5.0, GlucoseUnit::MillimolesPerLiter);
        let delta = latest.minus(&previous);
        assert_eq!(delta.unit, GlucoseUnit::MilligramsPerDeciliter);
        assert!((delta.value - (100.0 - 5.0 * MG_DL_PER_MMOL_L)).abs() < 1e-9);
    }

    #[test]
    fn test_trend_mapping_is_one_to_one() {
        let wire = [
            "constant",
            "slowFall",
            "slowRise",
            "moderateFall",
            "moderateRise",
            "rapidFall",
            "rapidRise",
        ];
        let mapped: Vec<GlucoseTrend> = wire
            .iter()
            .map(|w| GlucoseTrend::from_wire(w).unwrap())
            .collect();
        for (i, a) in mapped.iter().enumerate() {
            for b in &mapped[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert_eq!(GlucoseTrend::from_wire("sideways"), None);
    }
}
