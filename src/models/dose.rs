// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Insulin dose model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of insulin delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DoseType {
    Bolus,
    TempBasal,
    Basal,
    Suspend,
}

/// Unit of a dose `value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum DoseUnit {
    Units,
    UnitsPerHour,
}

/// A cached insulin dose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEntry {
    pub sync_identifier: String,
    pub dose_type: DoseType,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
    /// Programmed amount (U) or rate (U/hr).
    pub value: f64,
    pub unit: DoseUnit,
    /// Actually delivered units, when the pump reported them.
    pub delivered_units: Option<f64>,
    /// The scheduled rate a temporary basal is suppressing.
    pub scheduled_basal_rate: Option<f64>,
    pub automatic: bool,
    pub provenance: String,
}

impl DoseEntry {
    pub fn is_bolus(&self) -> bool {
        self.dose_type == DoseType::Bolus
    }

    /// Best known scheduled basal rate carried by this dose.
    pub fn known_scheduled_rate(&self) -> Option<f64> {
        match self.dose_type {
            DoseType::Basal => Some(self.value),
            _ => self.scheduled_basal_rate,
        }
    }
}
