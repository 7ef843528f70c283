// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Carbohydrate entry model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A cached carbohydrate entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarbEntry {
    pub sync_identifier: String,
    pub sync_version: i64,
    pub start_date: DateTime<Utc>,
    /// Net carbohydrates in grams
    pub grams: f64,
    pub provenance: String,
    pub food_type: Option<String>,
    /// Estimated absorption duration in seconds
    pub absorption_time_secs: Option<f64>,
    pub uuid: Option<String>,
    pub added_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
    pub deleted_at: Option<DateTime<Utc>>,
    pub superseded_at: Option<DateTime<Utc>>,
}
