// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Followee roster manager.
//!
//! Reconciles the roster against the remote permission list, keeps the
//! pending-invite set, persists roster membership and fans remote fetches
//! out to every followee.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex};

use crate::config::SyncSettings;
use crate::db::RosterStore;
use crate::error::AppError;
use crate::models::{PendingInvite, UserIdentity};
use crate::services::followee::{Followee, FolloweeEvent};
use crate::services::tidepool::RemoteDataClient;

/// Maximum number of followee fetches in flight at once.
pub const MAX_CONCURRENT_FETCHES: usize = 32;

const NOTIFICATION_CAPACITY: usize = 64;

/// Roster-level change notifications.
#[derive(Debug, Clone, PartialEq)]
pub enum RosterEvent {
    FolloweeAdded { followee_id: String },
    FolloweeRemoved { followee_id: String },
    FolloweeRefreshed { followee_id: String, at: DateTime<Utc> },
    InvitesChanged { count: usize },
}

/// Summary of one `refresh_roster` pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterRefresh {
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub fetched: usize,
    pub failed: usize,
}

/// Owns the roster of followees and the pending invites.
pub struct FolloweeManager {
    client: Arc<dyn RemoteDataClient>,
    store: Arc<dyn RosterStore>,
    settings: SyncSettings,
    roster: DashMap<String, Arc<Followee>>,
    invites: DashMap<String, PendingInvite>,
    /// Serializes roster reconciliation, invite diffs and persistence.
    roster_lock: Mutex<()>,
    events_tx: mpsc::UnboundedSender<FolloweeEvent>,
    notifications: broadcast::Sender<RosterEvent>,
}

impl FolloweeManager {
    /// Load the persisted roster, then start the event loop.
    ///
    /// No network call is made here; the first `refresh_roster` sees the
    /// persisted `last_refresh_at` of every known followee.
    pub async fn start(
        client: Arc<dyn RemoteDataClient>,
        store: Arc<dyn RosterStore>,
        settings: SyncSettings,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);

        let manager = Arc::new(Self {
            client,
            store,
            settings,
            roster: DashMap::new(),
            invites: DashMap::new(),
            roster_lock: Mutex::new(()),
            events_tx,
            notifications,
        });

        match manager.store.load_all().await {
            Ok(records) => {
                for record in records {
                    let followee = Followee::from_record(
                        record,
                        manager.settings.clone(),
                        Some(manager.events_tx.clone()),
                    );
                    followee.spawn_glucose_observer();
                    manager.roster.insert(followee.id().to_string(), followee);
                }
                tracing::info!(count = manager.roster.len(), "Restored persisted roster");
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load persisted roster; starting empty");
            }
        }

        Self::spawn_event_loop(Arc::downgrade(&manager), events_rx);
        manager
    }

    fn spawn_event_loop(
        manager: Weak<Self>,
        mut events_rx: mpsc::UnboundedReceiver<FolloweeEvent>,
    ) {
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                let Some(manager) = manager.upgrade() else {
                    break;
                };
                manager.handle_followee_event(event).await;
            }
            tracing::debug!("Followee event loop stopped");
        });
    }

    async fn handle_followee_event(&self, event: FolloweeEvent) {
        match event {
            FolloweeEvent::Refreshed {
                followee_id,
                instance,
                at,
            } => {
                let _guard = self.roster_lock.lock().await;

                // Skip followees removed (or replaced) since the event was sent.
                let Some(followee) = self.followee(&followee_id) else {
                    return;
                };
                if followee.instance() != instance {
                    return;
                }

                if let Err(e) = self.store.save(&followee.record()).await {
                    tracing::warn!(followee_id = %followee_id, error = %e, "Failed to persist refresh time");
                }
                self.notify(RosterEvent::FolloweeRefreshed { followee_id, at });
            }
        }
    }

    /// Subscribe to roster change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<RosterEvent> {
        self.notifications.subscribe()
    }

    pub fn followee(&self, id: &str) -> Option<Arc<Followee>> {
        self.roster.get(id).map(|f| f.value().clone())
    }

    /// Every followee, in no particular order.
    pub fn followees(&self) -> Vec<Arc<Followee>> {
        self.roster.iter().map(|f| f.value().clone()).collect()
    }

    pub fn pending_invites(&self) -> Vec<PendingInvite> {
        self.invites.iter().map(|i| i.value().clone()).collect()
    }

    pub fn pending_invite(&self, key: &str) -> Option<PendingInvite> {
        self.invites.get(key).map(|i| i.value().clone())
    }

    /// One poll cycle: roster, then invites. Invites are skipped while the
    /// session is missing or rejected since they would fail the same way.
    /// Other failures are logged where they happen and retried next cycle.
    pub async fn poll(&self) {
        if let Err(e) = self.refresh_roster().await {
            if e.is_remote_auth_error() {
                return;
            }
        }
        let _ = self.refresh_pending_invites().await;
    }

    pub async fn refresh_roster(&self) -> Result<RosterRefresh, AppError> {
        self.refresh_roster_at(Utc::now()).await
    }

    /// Reconcile the roster with the remote permission list, then fetch
    /// every followee concurrently.
    pub async fn refresh_roster_at(&self, now: DateTime<Utc>) -> Result<RosterRefresh, AppError> {
        let users = match self.client.list_permissioned_users().await {
            Ok(users) => users,
            Err(AppError::Unauthorized) => {
                tracing::info!("No session; skipping roster refresh");
                return Err(AppError::Unauthorized);
            }
            Err(e) if e.is_remote_auth_error() => {
                tracing::warn!(error = %e, "Tidepool session rejected; a new session token is needed");
                return Err(e);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list permissioned users");
                return Err(e);
            }
        };

        let mut summary = RosterRefresh::default();
        let followees = {
            let _guard = self.roster_lock.lock().await;

            let remote_ids: HashSet<&str> = users.iter().map(|u| u.id.as_str()).collect();
            let revoked: Vec<String> = self
                .roster
                .iter()
                .filter(|f| !remote_ids.contains(f.key().as_str()))
                .map(|f| f.key().clone())
                .collect();

            for id in revoked {
                if let Some((_, followee)) = self.roster.remove(&id) {
                    followee.deactivate();
                }
                if let Err(e) = self.store.delete(&id).await {
                    tracing::warn!(followee_id = %id, error = %e, "Failed to delete roster record");
                }
                tracing::info!(followee_id = %id, "Followee removed");
                self.notify(RosterEvent::FolloweeRemoved {
                    followee_id: id.clone(),
                });
                summary.removed.push(id);
            }

            for user in &users {
                if self.roster.contains_key(&user.id) {
                    continue;
                }
                if !user.has_view_permission {
                    tracing::debug!(user_id = %user.id, "Skipping user without view permission");
                    continue;
                }

                let followee = Followee::new(
                    UserIdentity::new(user.id.clone(), user.display_name.clone()),
                    None,
                    self.settings.clone(),
                    Some(self.events_tx.clone()),
                );
                followee.spawn_glucose_observer();
                self.roster.insert(user.id.clone(), followee.clone());

                // Persist before fetching so the followee survives a crash.
                if let Err(e) = self.store.save(&followee.record()).await {
                    tracing::warn!(followee_id = %user.id, error = %e, "Failed to persist new followee");
                }
                tracing::info!(followee_id = %user.id, "Followee added");
                self.notify(RosterEvent::FolloweeAdded {
                    followee_id: user.id.clone(),
                });
                summary.added.push(user.id.clone());
            }

            self.followees()
        };

        let results: Vec<bool> = stream::iter(followees)
            .map(|followee| {
                let client = self.client.clone();
                async move { followee.fetch_remote_at(client.as_ref(), now).await.is_ok() }
            })
            .buffer_unordered(MAX_CONCURRENT_FETCHES)
            .collect()
            .await;

        summary.fetched = results.iter().filter(|ok| **ok).count();
        summary.failed = results.len() - summary.fetched;

        tracing::info!(
            added = summary.added.len(),
            removed = summary.removed.len(),
            fetched = summary.fetched,
            failed = summary.failed,
            "Roster refresh complete"
        );
        Ok(summary)
    }

    /// Replace the pending-invite set with the remote one. Returns the
    /// number of pending invites.
    pub async fn refresh_pending_invites(&self) -> Result<usize, AppError> {
        let received = match self.client.list_pending_invites_received().await {
            Ok(received) => received,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to list pending invites");
                return Err(e);
            }
        };

        let _guard = self.roster_lock.lock().await;

        let remote_keys: HashSet<&str> = received
            .iter()
            .map(|r| r.acceptance_key.as_str())
            .collect();
        let before = self.invites.len();
        self.invites
            .retain(|key, _| remote_keys.contains(key.as_str()));
        let mut changed = self.invites.len() != before;

        for record in received {
            if self.invites.contains_key(&record.acceptance_key) {
                continue;
            }
            self.invites
                .insert(record.acceptance_key.clone(), PendingInvite::from(record));
            changed = true;
        }

        let count = self.invites.len();
        if changed {
            tracing::info!(count, "Pending invites changed");
            self.notify(RosterEvent::InvitesChanged { count });
        }
        Ok(count)
    }

    /// Accept an invite. Local state is untouched until the next refresh.
    pub async fn accept_invite(&self, invite: &PendingInvite) -> bool {
        let result = self
            .client
            .accept_invite(&invite.inviter.id, &invite.acceptance_key)
            .await;
        log_invite_result("accept", invite, result)
    }

    /// Reject an invite. Local state is untouched until the next refresh.
    pub async fn reject_invite(&self, invite: &PendingInvite) -> bool {
        let result = self
            .client
            .reject_invite(&invite.inviter.id, &invite.acceptance_key)
            .await;
        log_invite_result("reject", invite, result)
    }

    fn notify(&self, event: RosterEvent) {
        // No subscribers is fine.
        let _ = self.notifications.send(event);
    }
}

fn log_invite_result(action: &str, invite: &PendingInvite, result: Result<(), AppError>) -> bool {
    match result {
        Ok(()) => {
            tracing::info!(inviter_id = %invite.inviter.id, action, "Invite answered");
            true
        }
        Err(e) => {
            tracing::warn!(inviter_id = %invite.inviter.id, action, error = %e, "Invite mutation failed");
            false
        }
    }
}
