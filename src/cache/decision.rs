// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Single-slot store for the latest dosing decision.

use crate::models::DosingDecisionRecord;

/// Holds at most one dosing decision.
///
/// `set` overwrites unconditionally; callers decide whether a record is newer.
#[derive(Debug, Clone, Default)]
pub struct DosingDecisionSlot {
    current: Option<DosingDecisionRecord>,
}

impl DosingDecisionSlot {
    pub fn get(&self) -> Option<&DosingDecisionRecord> {
        self.current.as_ref()
    }

    pub fn set(&mut self, record: DosingDecisionRecord) {
        self.current = Some(record);
    }
}
