// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for UI callers.

use crate::error::{AppError, Result};
use crate::models::{Freshness, PendingInvite, PresentationSnapshot};
use crate::services::Followee;
use crate::AppState;
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// API routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/followees", get(list_followees))
        .route("/api/followees/{id}", get(get_followee))
        .route("/api/refresh", post(refresh))
        .route("/api/invites", get(list_invites))
        .route("/api/invites/{key}/accept", post(accept_invite))
        .route("/api/invites/{key}/reject", post(reject_invite))
}

// ─── Followees ───────────────────────────────────────────────

/// One followee as shown in the list and detail views.
#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct FolloweeSummary {
    pub id: String,
    pub display_name: String,
    pub snapshot: PresentationSnapshot,
    pub refresh_freshness: Freshness,
    pub glucose_freshness: Freshness,
}

impl FolloweeSummary {
    pub fn new(followee: &Followee, now: DateTime<Utc>) -> Self {
        let snapshot = followee.snapshot();
        let glucose_at = snapshot.latest_glucose.as_ref().map(|s| s.start_date);
        Self {
            id: followee.id().to_string(),
            display_name: followee.display_name().to_string(),
            refresh_freshness: Freshness::since(snapshot.last_refresh_at, now),
            glucose_freshness: Freshness::since(glucose_at, now),
            snapshot,
        }
    }
}

/// List all followees, sorted by display name.
async fn list_followees(State(state): State<Arc<AppState>>) -> Json<Vec<FolloweeSummary>> {
    let now = Utc::now();
    let mut summaries: Vec<FolloweeSummary> = state
        .manager
        .followees()
        .iter()
        .map(|f| FolloweeSummary::new(f, now))
        .collect();
    summaries.sort_by(|a, b| {
        a.display_name
            .cmp(&b.display_name)
            .then_with(|| a.id.cmp(&b.id))
    });
    Json(summaries)
}

async fn get_followee(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<FolloweeSummary>> {
    let followee = state
        .manager
        .followee(&id)
        .ok_or_else(|| AppError::NotFound(format!("Followee {} not found", id)))?;
    Ok(Json(FolloweeSummary::new(&followee, Utc::now())))
}

// ─── Refresh ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct RefreshResponse {
    pub followees: usize,
    pub pending_invites: usize,
}

/// Reconcile the roster and invites now.
async fn refresh(State(state): State<Arc<AppState>>) -> Result<Json<RefreshResponse>> {
    state.manager.refresh_roster().await?;
    let pending_invites = state.manager.refresh_pending_invites().await?;
    Ok(Json(RefreshResponse {
        followees: state.manager.followees().len(),
        pending_invites,
    }))
}

// ─── Invites ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct InviteActionResponse {
    pub success: bool,
}

async fn list_invites(State(state): State<Arc<AppState>>) -> Json<Vec<PendingInvite>> {
    let mut invites = state.manager.pending_invites();
    invites.sort_by(|a, b| a.inviter.display_name.cmp(&b.inviter.display_name));
    Json(invites)
}

fn find_invite(state: &AppState, key: &str) -> Result<PendingInvite> {
    state
        .manager
        .pending_invite(key)
        .ok_or_else(|| AppError::NotFound(format!("Invite {} not found", key)))
}

async fn accept_invite(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<InviteActionResponse>> {
    let invite = find_invite(&state, &key)?;
    let success = state.manager.accept_invite(&invite).await;
    Ok(Json(InviteActionResponse { success }))
}

async fn reject_invite(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<Json<InviteActionResponse>> {
    let invite = find_invite(&state, &key)?;
    let success = state.manager.reject_invite(&invite).await;
    Ok(Json(InviteActionResponse { success }))
}
