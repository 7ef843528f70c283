// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Followee state machine.
//!
//! A [`Followee`] owns its time-series caches and presentation snapshot.
//! Remote fetches run without holding any lock; results are merged under a
//! short synchronous critical section and the new snapshot is published on a
//! `watch` channel.

use chrono::{DateTime, Duration, Utc};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::cache::{CarbCache, DoseCache, DosingDecisionSlot, GlucoseCache, MergeOutcome};
use crate::config::SyncSettings;
use crate::db::RosterRecord;
use crate::error::AppError;
use crate::models::{
    DatumKind, DosingDecisionRecord, GlucoseSample, PresentationSnapshot, UserIdentity,
};
use crate::services::classifier::{classify_all, ClassifiedBatch};
use crate::services::tidepool::RemoteDataClient;

static NEXT_INSTANCE: AtomicU64 = AtomicU64::new(1);

/// Messages from a followee to its roster manager.
#[derive(Debug, Clone, PartialEq)]
pub enum FolloweeEvent {
    /// A fetch succeeded and `last_refresh_at` moved to `at`.
    Refreshed {
        followee_id: String,
        instance: u64,
        at: DateTime<Utc>,
    },
}

/// Result of one successful fetch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    pub records: usize,
    pub discarded: usize,
    pub glucose: MergeOutcome,
    /// False when the followee left the roster while the fetch was in flight.
    pub applied: bool,
}

/// Number of cached items per series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheCounts {
    pub glucose: usize,
    pub doses: usize,
    pub carbs: usize,
}

struct FolloweeState {
    last_refresh_at: Option<DateTime<Utc>>,
    loading: usize,
    glucose: GlucoseCache,
    doses: DoseCache,
    carbs: CarbCache,
    decision: DosingDecisionSlot,
    snapshot: PresentationSnapshot,
}

/// One followed account and everything cached for it.
pub struct Followee {
    identity: UserIdentity,
    instance: u64,
    settings: SyncSettings,
    active: AtomicBool,
    state: Mutex<FolloweeState>,
    snapshot_tx: watch::Sender<PresentationSnapshot>,
    glucose_changed: watch::Sender<u64>,
    events: Option<mpsc::UnboundedSender<FolloweeEvent>>,
}

impl std::fmt::Debug for Followee {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Followee")
            .field("identity", &self.identity)
            .field("instance", &self.instance)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl Followee {
    /// Create a followee. `events` receives refresh notifications, if given.
    pub fn new(
        identity: UserIdentity,
        last_refresh_at: Option<DateTime<Utc>>,
        settings: SyncSettings,
        events: Option<mpsc::UnboundedSender<FolloweeEvent>>,
    ) -> Arc<Self> {
        let snapshot = PresentationSnapshot {
            last_refresh_at,
            ..Default::default()
        };
        let (snapshot_tx, _) = watch::channel(snapshot.clone());
        let (glucose_changed, _) = watch::channel(0);

        Arc::new(Self {
            identity,
            instance: NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed),
            active: AtomicBool::new(true),
            state: Mutex::new(FolloweeState {
                last_refresh_at,
                loading: 0,
                glucose: GlucoseCache::new(settings.retention),
                doses: DoseCache::new(settings.retention),
                carbs: CarbCache::new(settings.retention),
                decision: DosingDecisionSlot::default(),
                snapshot,
            }),
            settings,
            snapshot_tx,
            glucose_changed,
            events,
        })
    }

    /// Rebuild a followee from its persisted roster record.
    pub fn from_record(
        record: RosterRecord,
        settings: SyncSettings,
        events: Option<mpsc::UnboundedSender<FolloweeEvent>>,
    ) -> Arc<Self> {
        Self::new(
            UserIdentity::new(record.id, record.display_name),
            record.last_refresh_at,
            settings,
            events,
        )
    }

    pub fn id(&self) -> &str {
        &self.identity.id
    }

    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    pub fn identity(&self) -> &UserIdentity {
        &self.identity
    }

    /// Distinguishes this followee from a later one with the same id.
    pub fn instance(&self) -> u64 {
        self.instance
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Detach from the roster; in-flight fetch results will be dropped.
    pub fn deactivate(&self) {
        self.active.store(false, Ordering::Release);
    }

    pub fn last_refresh_at(&self) -> Option<DateTime<Utc>> {
        self.state().last_refresh_at
    }

    pub fn is_loading(&self) -> bool {
        self.state().loading > 0
    }

    /// Current presentation snapshot.
    pub fn snapshot(&self) -> PresentationSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// Receiver that sees every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<PresentationSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn cache_counts(&self) -> CacheCounts {
        let state = self.state();
        CacheCounts {
            glucose: state.glucose.len(),
            doses: state.doses.len(),
            carbs: state.carbs.len(),
        }
    }

    /// Glucose samples with `start_date >= since`, ascending.
    pub fn glucose_since(&self, since: DateTime<Utc>) -> Vec<GlucoseSample> {
        self.state().glucose.query(since).cloned().collect()
    }

    pub fn dosing_decision(&self) -> Option<DosingDecisionRecord> {
        self.state().decision.get().cloned()
    }

    pub fn record(&self) -> RosterRecord {
        RosterRecord {
            id: self.identity.id.clone(),
            display_name: self.identity.display_name.clone(),
            last_refresh_at: self.last_refresh_at(),
        }
    }

    /// Start of the window the next fetch at `now` will request.
    pub fn backfill_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        backfill_start(self.last_refresh_at(), now, &self.settings)
    }

    /// Scheduled basal rate in effect at `at`.
    pub fn scheduled_basal_rate_at(&self, at: DateTime<Utc>) -> f64 {
        scheduled_rate(&self.state().doses, at, &self.settings)
    }

    /// Recompute the glucose fields of the snapshot from the cache.
    pub fn refresh_presentation(&self) {
        self.refresh_presentation_at(Utc::now());
    }

    pub fn refresh_presentation_at(&self, now: DateTime<Utc>) {
        let mut guard = self.state();
        let state = &mut *guard;
        update_glucose_presentation(state, now, &self.settings);
        self.publish(state);
    }

    /// Fetch and merge everything new for this followee.
    pub async fn fetch_remote(
        &self,
        client: &dyn RemoteDataClient,
    ) -> Result<FetchOutcome, AppError> {
        self.fetch_remote_at(client, Utc::now()).await
    }

    pub async fn fetch_remote_at(
        &self,
        client: &dyn RemoteDataClient,
        now: DateTime<Utc>,
    ) -> Result<FetchOutcome, AppError> {
        let _loading = LoadingGuard::new(self);
        let since = self.backfill_start(now);

        let records = match client.list_data(self.id(), since, &DatumKind::ALL).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(
                    followee_id = %self.identity.id,
                    since = %since,
                    error = %e,
                    "Followee fetch failed"
                );
                return Err(e);
            }
        };

        if !self.is_active() {
            tracing::debug!(followee_id = %self.identity.id, "Dropping fetch for removed followee");
            return Ok(FetchOutcome {
                records: records.len(),
                ..Default::default()
            });
        }

        // Advance before merging so an interrupted merge is not refetched.
        self.mark_refreshed(now);

        let batch = classify_all(&records, self.id());
        let discarded = batch.discarded;
        let glucose = self.apply(batch, now);

        tracing::debug!(
            followee_id = %self.identity.id,
            records = records.len(),
            discarded,
            glucose_inserted = glucose.inserted,
            "Followee refreshed"
        );

        Ok(FetchOutcome {
            records: records.len(),
            discarded,
            glucose,
            applied: true,
        })
    }

    /// Merge samples that arrived through some other path.
    ///
    /// The snapshot is recomputed by the glucose observer task, see
    /// [`Followee::spawn_glucose_observer`].
    pub fn add_glucose_samples(&self, samples: Vec<GlucoseSample>) -> MergeOutcome {
        let outcome = self.state().glucose.merge(samples);
        if outcome.changed() {
            self.glucose_changed.send_modify(|generation| *generation += 1);
        }
        outcome
    }

    /// Spawn the task that re-runs `refresh_presentation` after out-of-band
    /// glucose merges. Bursts of changes collapse into one recomputation.
    pub fn spawn_glucose_observer(self: &Arc<Self>) -> JoinHandle<()> {
        let mut changes = self.glucose_changed.subscribe();
        let followee = Arc::downgrade(self);

        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(followee) = followee.upgrade() else {
                    break;
                };
                if !followee.is_active() {
                    break;
                }
                followee.refresh_presentation();
            }
        })
    }

    fn state(&self) -> MutexGuard<'_, FolloweeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &FolloweeState) {
        let mut snapshot = state.snapshot.clone();
        snapshot.is_loading = state.loading > 0;
        snapshot.last_refresh_at = state.last_refresh_at;
        self.snapshot_tx.send_replace(snapshot);
    }

    fn mark_refreshed(&self, now: DateTime<Utc>) {
        let at = {
            let mut state = self.state();
            let at = state.last_refresh_at.map_or(now, |last| last.max(now));
            state.last_refresh_at = Some(at);
            at
        };

        if let Some(events) = &self.events {
            let event = FolloweeEvent::Refreshed {
                followee_id: self.identity.id.clone(),
                instance: self.instance,
                at,
            };
            if events.send(event).is_err() {
                tracing::debug!(followee_id = %self.identity.id, "Roster manager gone");
            }
        }
    }

    fn apply(&self, batch: ClassifiedBatch, now: DateTime<Utc>) -> MergeOutcome {
        let mut guard = self.state();
        let state = &mut *guard;

        // The followee may have been removed while we waited for the lock.
        if !self.is_active() {
            return MergeOutcome::default();
        }

        let glucose = state.glucose.merge(batch.glucose);
        state.doses.merge(batch.doses);
        state.carbs.merge(batch.carbs);

        for decision in batch.dosing_decisions {
            if decision.supersedes(state.decision.get()) {
                state.decision.set(decision);
            }
        }

        let mut statuses = batch.pump_statuses;
        statuses.sort_by_key(|status| status.date);
        for status in statuses {
            let current = state.snapshot.basal_state.map(|basal| basal.date);
            if current.is_some_and(|date| status.date <= date) {
                tracing::debug!(
                    followee_id = %self.identity.id,
                    status_date = %status.date,
                    "Ignoring out-of-order pump status"
                );
                continue;
            }
            let scheduled = scheduled_rate(&state.doses, status.date, &self.settings);
            state.snapshot.basal_state = Some(status.basal_state(scheduled));
        }

        if let Some(decision) = state.decision.get() {
            state.snapshot.active_insulin = decision.insulin_on_board;
            state.snapshot.active_carbs = decision.carbs_on_board;
        }

        let last_bolus = state
            .doses
            .iter()
            .filter(|dose| dose.is_bolus())
            .map(|dose| dose.start_date)
            .max();
        state.snapshot.last_bolus_at = state.snapshot.last_bolus_at.max(last_bolus);

        let last_carb = state.carbs.latest().map(|carb| carb.start_date);
        state.snapshot.last_carb_at = state.snapshot.last_carb_at.max(last_carb);

        state.glucose.prune(now);
        state.doses.prune(now);
        state.carbs.prune(now);

        update_glucose_presentation(state, now, &self.settings);
        self.publish(state);
        glucose
    }
}

/// Holds `is_loading` true until dropped, on every exit path.
struct LoadingGuard<'a> {
    followee: &'a Followee,
}

impl<'a> LoadingGuard<'a> {
    fn new(followee: &'a Followee) -> Self {
        let mut state = followee.state();
        state.loading += 1;
        followee.publish(&state);
        drop(state);
        Self { followee }
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.followee.state();
        state.loading = state.loading.saturating_sub(1);
        self.followee.publish(&state);
    }
}

/// `now - min(now - last_refresh, max_backfill) - safety_margin`.
pub fn backfill_start(
    last_refresh_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    settings: &SyncSettings,
) -> DateTime<Utc> {
    let elapsed = last_refresh_at
        .map(|last| (now - last).max(Duration::zero()))
        .unwrap_or(settings.max_backfill)
        .min(settings.max_backfill);
    now - elapsed - settings.safety_margin
}

/// Latest scheduled rate known from doses at or before `at`.
fn scheduled_rate(doses: &DoseCache, at: DateTime<Utc>, settings: &SyncSettings) -> f64 {
    doses
        .until(at)
        .rev()
        .find_map(|dose| dose.known_scheduled_rate())
        .or(settings.fallback_scheduled_basal_rate)
        .unwrap_or(0.0)
}

fn update_glucose_presentation(state: &mut FolloweeState, now: DateTime<Utc>, settings: &SyncSettings) {
    let (latest, delta) = match state.glucose.latest() {
        Some(latest) if now - latest.start_date <= settings.freshness_threshold => {
            let previous = state
                .glucose
                .query(latest.start_date - settings.delta_lookback)
                .rev()
                .find(|sample| sample.sync_identifier != latest.sync_identifier);
            let delta = previous.map(|previous| latest.quantity.minus(&previous.quantity));
            (Some(latest.clone()), delta)
        }
        _ => (None, None),
    };
    state.snapshot.latest_glucose = latest;
    state.snapshot.glucose_delta = delta;
}
