// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-followee in-memory caches.
//!
//! - `series`: deduplicated, time-ordered stores for glucose, doses and carbs
//! - `decision`: the single latest dosing decision

pub mod decision;
pub mod series;

pub use decision::DosingDecisionSlot;
pub use series::{MergeOutcome, SyncCache, Syncable};

use crate::models::{CarbEntry, DoseEntry, GlucoseSample};
use chrono::{DateTime, Utc};

impl Syncable for GlucoseSample {
    fn sync_identifier(&self) -> &str {
        &self.sync_identifier
    }

    fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }
}

impl Syncable for DoseEntry {
    fn sync_identifier(&self) -> &str {
        &self.sync_identifier
    }

    fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }
}

impl Syncable for CarbEntry {
    fn sync_identifier(&self) -> &str {
        &self.sync_identifier
    }

    fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }
}

/// Glucose store for one followee.
pub type GlucoseCache = SyncCache<GlucoseSample>;
/// Insulin dose store for one followee.
pub type DoseCache = SyncCache<DoseEntry>;
/// Carb entry store for one followee.
pub type CarbCache = SyncCache<CarbEntry>;
