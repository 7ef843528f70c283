// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use async_trait::async_trait;
use carepartner_sync::config::{Config, SyncSettings};
use carepartner_sync::db::{MemoryRosterStore, RosterStore};
use carepartner_sync::error::AppError;
use carepartner_sync::models::datum::parse_records;
use carepartner_sync::models::{DatumKind, InviteRecord, PermissionedUser, RawRecord};
use carepartner_sync::routes::create_router;
use carepartner_sync::services::{FolloweeManager, RemoteDataClient};
use carepartner_sync::time_utils::format_utc_rfc3339;
use carepartner_sync::AppState;
use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Fixed "now" for deterministic tests.
#[allow(dead_code)]
pub fn test_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 0).unwrap()
}

/// Scripted in-memory remote data service.
#[derive(Default)]
pub struct FakeRemote {
    users: Mutex<Vec<PermissionedUser>>,
    data: Mutex<HashMap<String, Vec<Value>>>,
    failing: Mutex<HashSet<String>>,
    invites: Mutex<Vec<InviteRecord>>,
    data_gates: Mutex<HashMap<String, VecDeque<watch::Receiver<bool>>>>,
    data_requests: Mutex<Vec<(String, DateTime<Utc>)>>,
    answered: Mutex<Vec<(String, String, String)>>,
    invite_listings: AtomicUsize,
    fail_invite_mutations: AtomicBool,
    fail_user_listing: AtomicBool,
    reject_session: AtomicBool,
}

#[allow(dead_code)]
impl FakeRemote {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_users(&self, users: &[(&str, &str, bool)]) {
        *self.users.lock().unwrap() = users
            .iter()
            .map(|(id, name, view)| PermissionedUser {
                id: id.to_string(),
                display_name: name.to_string(),
                has_view_permission: *view,
            })
            .collect();
    }

    pub fn set_data(&self, followee_id: &str, records: Vec<Value>) {
        self.data
            .lock()
            .unwrap()
            .insert(followee_id.to_string(), records);
    }

    pub fn fail_data_for(&self, followee_id: &str) {
        self.failing.lock().unwrap().insert(followee_id.to_string());
    }

    pub fn heal_data_for(&self, followee_id: &str) {
        self.failing.lock().unwrap().remove(followee_id);
    }

    /// Hold the next not-yet-held data request for `followee_id` until
    /// `true` is sent on the returned gate. Requests are recorded in
    /// `data_requests` before they wait, and data is read after release.
    pub fn hold_next_data_request(&self, followee_id: &str) -> watch::Sender<bool> {
        let (tx, rx) = watch::channel(false);
        self.data_gates
            .lock()
            .unwrap()
            .entry(followee_id.to_string())
            .or_default()
            .push_back(rx);
        tx
    }

    pub fn set_invites(&self, invites: &[(&str, &str, &str)]) {
        *self.invites.lock().unwrap() = invites
            .iter()
            .map(|(id, name, key)| InviteRecord {
                inviter_id: id.to_string(),
                inviter_display_name: name.to_string(),
                acceptance_key: key.to_string(),
            })
            .collect();
    }

    pub fn fail_invite_mutations(&self, fail: bool) {
        self.fail_invite_mutations.store(fail, Ordering::SeqCst);
    }

    pub fn fail_user_listing(&self, fail: bool) {
        self.fail_user_listing.store(fail, Ordering::SeqCst);
    }

    /// Answer every read the way the API answers an expired session.
    pub fn reject_session(&self, reject: bool) {
        self.reject_session.store(reject, Ordering::SeqCst);
    }

    pub fn invite_listings(&self) -> usize {
        self.invite_listings.load(Ordering::SeqCst)
    }

    fn check_session(&self) -> Result<(), AppError> {
        if self.reject_session.load(Ordering::SeqCst) {
            return Err(AppError::RemoteApi(AppError::REMOTE_TOKEN_ERROR.to_string()));
        }
        Ok(())
    }

    /// `(followee_id, since)` for every data request, in call order.
    pub fn data_requests(&self) -> Vec<(String, DateTime<Utc>)> {
        self.data_requests.lock().unwrap().clone()
    }

    /// `(action, inviter_id, key)` for every successful invite mutation.
    pub fn answered(&self) -> Vec<(String, String, String)> {
        self.answered.lock().unwrap().clone()
    }

    fn answer(&self, action: &str, inviter_id: &str, key: &str) -> Result<(), AppError> {
        if self.fail_invite_mutations.load(Ordering::SeqCst) {
            return Err(AppError::RemoteApi("HTTP 500: boom".to_string()));
        }
        self.answered.lock().unwrap().push((
            action.to_string(),
            inviter_id.to_string(),
            key.to_string(),
        ));
        Ok(())
    }
}

#[async_trait]
impl RemoteDataClient for FakeRemote {
    async fn list_permissioned_users(&self) -> Result<Vec<PermissionedUser>, AppError> {
        self.check_session()?;
        if self.fail_user_listing.load(Ordering::SeqCst) {
            return Err(AppError::RemoteApi("HTTP 503: unavailable".to_string()));
        }
        Ok(self.users.lock().unwrap().clone())
    }

    async fn list_data(
        &self,
        followee_id: &str,
        since: DateTime<Utc>,
        _kinds: &[DatumKind],
    ) -> Result<Vec<RawRecord>, AppError> {
        self.data_requests
            .lock()
            .unwrap()
            .push((followee_id.to_string(), since));

        let gate = self
            .data_gates
            .lock()
            .unwrap()
            .get_mut(followee_id)
            .and_then(VecDeque::pop_front);
        if let Some(mut gate) = gate {
            let _ = gate.wait_for(|open| *open).await;
        }

        if self.failing.lock().unwrap().contains(followee_id) {
            return Err(AppError::RemoteApi("HTTP 500: boom".to_string()));
        }

        let values = self
            .data
            .lock()
            .unwrap()
            .get(followee_id)
            .cloned()
            .unwrap_or_default();
        Ok(parse_records(values))
    }

    async fn list_pending_invites_received(&self) -> Result<Vec<InviteRecord>, AppError> {
        self.invite_listings.fetch_add(1, Ordering::SeqCst);
        self.check_session()?;
        Ok(self.invites.lock().unwrap().clone())
    }

    async fn accept_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError> {
        self.answer("accept", inviter_id, key)
    }

    async fn reject_invite(&self, inviter_id: &str, key: &str) -> Result<(), AppError> {
        self.answer("reject", inviter_id, key)
    }
}

/// Start a manager over a fake remote and an in-memory store.
#[allow(dead_code)]
pub async fn start_manager(
    remote: Arc<FakeRemote>,
    store: Arc<MemoryRosterStore>,
) -> Arc<FolloweeManager> {
    FolloweeManager::start(remote, store, SyncSettings::default()).await
}

/// Wait until `check` passes, polling the store that the event loop writes.
#[allow(dead_code)]
pub async fn eventually<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..200 {
        if check() {
            return;
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

/// Create a test app over a fake remote.
#[allow(dead_code)]
pub async fn create_test_app(remote: Arc<FakeRemote>) -> (axum::Router, Arc<AppState>) {
    let store: Arc<dyn RosterStore> = Arc::new(MemoryRosterStore::new());
    let config = Config::test_default();
    let manager = FolloweeManager::start(remote, store, config.sync.clone()).await;
    let state = Arc::new(AppState { config, manager });
    (create_router(state.clone()), state)
}

// ─── Record builders ─────────────────────────────────────────

#[allow(dead_code)]
pub fn cbg(id: &str, at: DateTime<Utc>, mg_dl: f64) -> Value {
    json!({
        "type": "cbg",
        "id": id,
        "time": format_utc_rfc3339(at),
        "value": mg_dl,
        "units": "mg/dL",
        "trend": "constant",
    })
}

#[allow(dead_code)]
pub fn bolus(id: &str, at: DateTime<Utc>, units: f64) -> Value {
    json!({
        "type": "bolus",
        "subType": "normal",
        "id": id,
        "time": format_utc_rfc3339(at),
        "normal": units,
    })
}

#[allow(dead_code)]
pub fn scheduled_basal(id: &str, at: DateTime<Utc>, rate: f64) -> Value {
    json!({
        "type": "basal",
        "deliveryType": "scheduled",
        "id": id,
        "time": format_utc_rfc3339(at),
        "rate": rate,
        "duration": 1_800_000,
    })
}

#[allow(dead_code)]
pub fn food(sync_identifier: Option<&str>, at: DateTime<Utc>, grams: f64) -> Value {
    let mut record = json!({
        "type": "food",
        "id": "food-record-id",
        "time": format_utc_rfc3339(at),
        "nutrition": { "carbohydrate": { "net": grams, "units": "grams" } },
        "origin": { "name": "com.example.loop" },
    });
    if let Some(sync_identifier) = sync_identifier {
        record["payload"] = json!({ "syncIdentifier": sync_identifier });
    }
    record
}

#[allow(dead_code)]
pub fn dosing_decision(at: DateTime<Utc>, iob: f64, cob: f64) -> Value {
    json!({
        "type": "dosingDecision",
        "time": format_utc_rfc3339(at),
        "reason": "loop",
        "insulinOnBoard": { "time": format_utc_rfc3339(at), "amount": iob },
        "carbohydratesOnBoard": { "time": format_utc_rfc3339(at), "amount": cob },
    })
}

#[allow(dead_code)]
pub fn pump_status(at: DateTime<Utc>, state: &str, rate: Option<f64>) -> Value {
    let mut delivery = json!({ "state": state });
    if let Some(rate) = rate {
        delivery["dose"] = json!({ "rate": rate });
    }
    json!({
        "type": "pumpStatus",
        "time": format_utc_rfc3339(at),
        "basalDelivery": delivery,
    })
}
