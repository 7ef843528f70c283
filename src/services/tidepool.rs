// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Tidepool API client for the followee sync engine.
//!
//! Handles:
//! - Listing users who shared their data with the caregiver
//! - Fetching typed data records for a followee over a time window
//! - Listing, accepting and dismissing pending invitations
//! - Session and rate limit error mapping

use crate::error::AppError;
use crate::models::datum::parse_records;
use crate::models::{DatumKind, InviteRecord, PermissionedUser, RawRecord};
use crate::time_utils::format_utc_rfc3339;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

/// Header carrying the Tidepool session token.
const SESSION_TOKEN_HEADER: &str = "X-Tidepool-Session-Token";

/// The remote clinical-data API as seen by the sync engine.
#[async_trait]
pub trait RemoteDataClient: Send + Sync {
    /// Users who granted the caregiver access.
    async fn list_permissioned_users(&self) -> Result<Vec<PermissionedUser>, AppError>;

    /// Records of the given kinds for `followee_id` since `since`.
    async fn list_data(
        &self,
        followee_id: &str,
        since: DateTime<Utc>,
        kinds: &[DatumKind],
    ) -> Result<Vec<RawRecord>, AppError>;

    /// Invitations received and not yet answered.
    async fn list_pending_invites_received(&self) -> Result<Vec<InviteRecord>, AppError>;

    async fn accept_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError>;

    async fn reject_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError>;
}

/// An authenticated Tidepool session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TidepoolSession {
    pub user_id: String,
    pub token: String,
}

/// Supplies the current session, if the caregiver is logged in.
pub trait SessionProvider: Send + Sync {
    fn session(&self) -> Option<TidepoolSession>;
}

/// Session fixed at startup from configuration.
#[derive(Debug, Clone)]
pub struct StaticSession {
    session: Option<TidepoolSession>,
}

impl StaticSession {
    pub fn new(user_id: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            session: Some(TidepoolSession {
                user_id: user_id.into(),
                token: token.into(),
            }),
        }
    }

    /// A provider that never has a session.
    pub fn logged_out() -> Self {
        Self { session: None }
    }
}

impl SessionProvider for StaticSession {
    fn session(&self) -> Option<TidepoolSession> {
        self.session.clone()
    }
}

/// Tidepool API client.
#[derive(Clone)]
pub struct TidepoolClient {
    http: reqwest::Client,
    base_url: String,
    sessions: Arc<dyn SessionProvider>,
}

impl TidepoolClient {
    /// Create a new client against `base_url`.
    pub fn new(base_url: impl Into<String>, sessions: Arc<dyn SessionProvider>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            sessions,
        }
    }

    fn session(&self) -> Result<TidepoolSession, AppError> {
        self.sessions.session().ok_or(AppError::Unauthorized)
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        token: &str,
        query: &[(&str, String)],
    ) -> Result<T, AppError> {
        let response = self
            .http
            .get(url)
            .header(SESSION_TOKEN_HEADER, token)
            .query(query)
            .send()
            .await
            .map_err(|e| AppError::RemoteApi(e.to_string()))?;

        self.check_response_json(response).await
    }

    /// PUT an invitation answer.
    async fn put_invite(&self, action: &str, inviter_id: &str, key: &str) -> Result<(), AppError> {
        let session = self.session()?;
        let url = format!(
            "{}/confirm/{}/invite/{}/{}",
            self.base_url,
            action,
            urlencoding::encode(&session.user_id),
            urlencoding::encode(inviter_id)
        );

        let response = self
            .http
            .put(&url)
            .header(SESSION_TOKEN_HEADER, &session.token)
            .json(&serde_json::json!({ "key": key }))
            .send()
            .await
            .map_err(|e| AppError::RemoteApi(format!("Invite {} request failed: {}", action, e)))?;

        self.check_response(response).await?;
        tracing::info!(inviter_id, action, "Invitation answered");
        Ok(())
    }

    /// Map a non-success status to an error.
    async fn error_for_status(&self, response: reqwest::Response) -> AppError {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        if status.as_u16() == 429 {
            tracing::warn!("Tidepool rate limit hit (429)");
            return AppError::RemoteApi(AppError::REMOTE_RATE_LIMIT.to_string());
        }

        if status.as_u16() == 401 {
            return AppError::RemoteApi(AppError::REMOTE_TOKEN_ERROR.to_string());
        }

        AppError::RemoteApi(format!("HTTP {}: {}", status, body))
    }

    /// Check response status and return error if not successful.
    async fn check_response(&self, response: reqwest::Response) -> Result<(), AppError> {
        if response.status().is_success() {
            return Ok(());
        }
        Err(self.error_for_status(response).await)
    }

    /// Check response and parse JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        if !response.status().is_success() {
            return Err(self.error_for_status(response).await);
        }

        response
            .json()
            .await
            .map_err(|e| AppError::RemoteApi(format!("JSON parse error: {}", e)))
    }
}

#[async_trait]
impl RemoteDataClient for TidepoolClient {
    async fn list_permissioned_users(&self) -> Result<Vec<PermissionedUser>, AppError> {
        let session = self.session()?;
        let url = format!(
            "{}/metadata/users/{}/users",
            self.base_url,
            urlencoding::encode(&session.user_id)
        );
        let users: Vec<TrusteeUser> = self.get_json(&url, &session.token, &[]).await?;

        Ok(users
            .into_iter()
            .filter_map(|user| {
                let has_view_permission = user.has_view_permission();
                let Some(display_name) = user.profile.and_then(|p| p.full_name) else {
                    tracing::debug!(user_id = %user.userid, "Skipping shared user without a profile name");
                    return None;
                };
                Some(PermissionedUser {
                    id: user.userid,
                    display_name,
                    has_view_permission,
                })
            })
            .collect())
    }

    async fn list_data(
        &self,
        followee_id: &str,
        since: DateTime<Utc>,
        kinds: &[DatumKind],
    ) -> Result<Vec<RawRecord>, AppError> {
        let session = self.session()?;
        let url = format!(
            "{}/data/{}",
            self.base_url,
            urlencoding::encode(followee_id)
        );
        let types = kinds
            .iter()
            .map(DatumKind::as_str)
            .collect::<Vec<_>>()
            .join(",");

        let values: Vec<serde_json::Value> = self
            .get_json(
                &url,
                &session.token,
                &[("startDate", format_utc_rfc3339(since)), ("type", types)],
            )
            .await?;

        let total = values.len();
        let records = parse_records(values);
        tracing::debug!(
            followee_id,
            total,
            decoded = records.len(),
            "Fetched followee data"
        );
        Ok(records)
    }

    async fn list_pending_invites_received(&self) -> Result<Vec<InviteRecord>, AppError> {
        let session = self.session()?;
        let url = format!(
            "{}/confirm/invitations/{}",
            self.base_url,
            urlencoding::encode(&session.user_id)
        );

        // The confirm service answers 404 when there is nothing pending.
        let response = self
            .http
            .get(&url)
            .header(SESSION_TOKEN_HEADER, &session.token)
            .send()
            .await
            .map_err(|e| AppError::RemoteApi(e.to_string()))?;
        if response.status().as_u16() == 404 {
            return Ok(Vec::new());
        }
        let invites: Vec<InvitationResponse> = self.check_response_json(response).await?;

        Ok(invites
            .into_iter()
            .filter_map(|invite| {
                let inviter_id = invite
                    .creator_id
                    .or_else(|| invite.creator.as_ref().map(|c| c.userid.clone()))?;
                let inviter_display_name = invite
                    .creator
                    .and_then(|c| c.profile)
                    .and_then(|p| p.full_name)
                    .unwrap_or_else(|| inviter_id.clone());
                Some(InviteRecord {
                    inviter_id,
                    inviter_display_name,
                    acceptance_key: invite.key,
                })
            })
            .collect())
    }

    async fn accept_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError> {
        self.put_invite("accept", inviter_id, key).await
    }

    async fn reject_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError> {
        self.put_invite("dismiss", inviter_id, key).await
    }
}

/// Shared user entry from the metadata service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TrusteeUser {
    userid: String,
    profile: Option<Profile>,
    trustor_permissions: Option<serde_json::Map<String, serde_json::Value>>,
}

impl TrusteeUser {
    fn has_view_permission(&self) -> bool {
        self.trustor_permissions
            .as_ref()
            .is_some_and(|p| p.contains_key("view"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Profile {
    full_name: Option<String>,
}

/// Invitation entry from the confirm service.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct InvitationResponse {
    key: String,
    creator_id: Option<String>,
    creator: Option<InvitationCreator>,
}

#[derive(Debug, Clone, Deserialize)]
struct InvitationCreator {
    userid: String,
    profile: Option<Profile>,
}
