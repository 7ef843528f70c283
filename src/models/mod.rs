// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the followee sync engine.

pub mod carb;
pub mod datum;
pub mod dose;
pub mod dosing_decision;
pub mod glucose;
pub mod identity;
pub mod status;

pub use carb::CarbEntry;
pub use datum::{DatumKind, RawRecord};
pub use dose::{DoseEntry, DoseType, DoseUnit};
pub use dosing_decision::{DosingDecisionRecord, TimedValue};
pub use glucose::{GlucoseQuantity, GlucoseSample, GlucoseTrend, GlucoseUnit};
pub use identity::{InviteRecord, PendingInvite, PermissionedUser, UserIdentity};
pub use status::{BasalDeliveryState, Freshness, PresentationSnapshot};
