// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Presentation snapshot derived per followee.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

use crate::models::{GlucoseQuantity, GlucoseSample, TimedValue};

/// Current basal delivery as last reported by the pump.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct BasalDeliveryState {
    pub date: DateTime<Utc>,
    /// Actual rate in U/hr
    pub rate: f64,
    /// Scheduled rate in U/hr
    pub scheduled_rate: f64,
    pub is_suspended: bool,
}

impl BasalDeliveryState {
    pub fn is_temp_basal(&self) -> bool {
        self.rate != self.scheduled_rate && !self.is_suspended
    }
}

/// Everything a UI needs to render one followee.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PresentationSnapshot {
    /// Last successful remote refresh; `None` if never refreshed.
    pub last_refresh_at: Option<DateTime<Utc>>,
    pub is_loading: bool,
    pub latest_glucose: Option<GlucoseSample>,
    pub glucose_delta: Option<GlucoseQuantity>,
    pub active_insulin: Option<TimedValue>,
    pub active_carbs: Option<TimedValue>,
    pub basal_state: Option<BasalDeliveryState>,
    pub last_bolus_at: Option<DateTime<Utc>>,
    pub last_carb_at: Option<DateTime<Utc>>,
}

/// How recent a piece of data is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
#[serde(rename_all = "snake_case")]
pub enum Freshness {
    Fresh,
    Aging,
    Stale,
}

impl Freshness {
    /// Oldest age still classed as `self`; stale data has no bound.
    fn max_age(self) -> Option<Duration> {
        match self {
            Freshness::Fresh => Some(Duration::minutes(6)),
            Freshness::Aging => Some(Duration::minutes(16)),
            Freshness::Stale => None,
        }
    }

    pub fn from_age(age: Option<Duration>) -> Self {
        let Some(age) = age else {
            return Freshness::Stale;
        };
        [Freshness::Fresh, Freshness::Aging]
            .into_iter()
            .find(|f| f.max_age().is_some_and(|max| age <= max))
            .unwrap_or(Freshness::Stale)
    }

    /// Freshness of something last seen at `date`, evaluated at `now`.
    pub fn since(date: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        Self::from_age(date.map(|d| now.signed_duration_since(d)))
    }
}
