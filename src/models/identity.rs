// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Followee identity and invitation models.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Stable identity of a followed account.
///
/// `id` is the join key across the roster, cache storage and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct UserIdentity {
    pub id: String,
    pub display_name: String,
}

impl UserIdentity {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

/// An invitation to follow someone, waiting for acceptance.
///
/// Two invites are equal when they come from the same inviter.
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct PendingInvite {
    pub inviter: UserIdentity,
    pub acceptance_key: String,
}

impl PartialEq for PendingInvite {
    fn eq(&self, other: &Self) -> bool {
        self.inviter == other.inviter
    }
}

/// A user who has shared their data with the caregiver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionedUser {
    pub id: String,
    pub display_name: String,
    pub has_view_permission: bool,
}

/// A pending invitation as reported by the remote API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InviteRecord {
    pub inviter_id: String,
    pub inviter_display_name: String,
    pub acceptance_key: String,
}

impl From<InviteRecord> for PendingInvite {
    fn from(record: InviteRecord) -> Self {
        Self {
            inviter: UserIdentity::new(record.inviter_id, record.inviter_display_name),
            acceptance_key: record.acceptance_key,
        }
    }
}
