// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Dosing decision model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A value observed at a point in time (insulin or carbs on board).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct TimedValue {
    pub start_date: DateTime<Utc>,
    pub value: f64,
}

/// Snapshot of the remote dosing algorithm's state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosingDecisionRecord {
    /// When the decision was made, as reported by the remote record.
    pub date: Option<DateTime<Utc>>,
    pub reason: String,
    pub carbs_on_board: Option<TimedValue>,
    pub insulin_on_board: Option<TimedValue>,
}

impl DosingDecisionRecord {
    /// Whether this decision should replace `current` in the single slot.
    ///
    /// Undated decisions only fill an empty slot or replace another undated one.
    pub fn supersedes(&self, current: Option<&DosingDecisionRecord>) -> bool {
        match current {
            None => true,
            Some(current) => match (self.date, current.date) {
                (Some(new), Some(old)) => new > old,
                (Some(_), None) => true,
                (None, Some(_)) => false,
                (None, None) => true,
            },
        }
    }
}
