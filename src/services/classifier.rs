// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Event classifier: turns remote data records into typed domain events.
//!
//! Each rule checks the fields its event cannot do without. A record that
//! fails the check is discarded on its own; classification of a batch
//! never fails as a whole.

use chrono::{DateTime, Duration, Utc};

use crate::models::datum::{
    payload_f64, payload_str, BasalDatum, BolusDatum, CbgDatum, DosingDecisionDatum, FoodDatum,
    Origin, PumpStatusDatum,
};
use crate::models::{
    BasalDeliveryState, CarbEntry, DoseEntry, DoseType, DoseUnit, DosingDecisionRecord,
    GlucoseQuantity, GlucoseSample, GlucoseTrend, GlucoseUnit, RawRecord, TimedValue,
};
use crate::time_utils::parse_json_date;

/// Provenance used when a record does not name its origin.
pub const REMOTE_PROVENANCE: &str = "org.tidepool";

const SYNC_IDENTIFIER_KEY: &str = "syncIdentifier";

/// A classified remote record.
#[derive(Debug, Clone, PartialEq)]
pub enum DomainEvent {
    Glucose(GlucoseSample),
    Dose(DoseEntry),
    Carb(CarbEntry),
    DosingDecision(DosingDecisionRecord),
    PumpStatus(PumpStatusEvent),
}

/// Basal delivery as reported by a pump status record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BasalDelivery {
    Suspended,
    /// Scheduled basal, or transitioning between temporary and scheduled.
    Scheduled,
    Temporary { rate: f64 },
}

impl BasalDelivery {
    /// Actual rate and suspension flag given the currently scheduled rate.
    pub fn resolve(&self, scheduled_rate: f64) -> (f64, bool) {
        match self {
            BasalDelivery::Suspended => (0.0, true),
            BasalDelivery::Scheduled => (scheduled_rate, false),
            BasalDelivery::Temporary { rate } => (*rate, false),
        }
    }
}

/// Pump status; applied straight to the snapshot, never cached.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PumpStatusEvent {
    pub date: DateTime<Utc>,
    pub delivery: BasalDelivery,
}

impl PumpStatusEvent {
    pub fn basal_state(&self, scheduled_rate: f64) -> BasalDeliveryState {
        let (rate, is_suspended) = self.delivery.resolve(scheduled_rate);
        BasalDeliveryState {
            date: self.date,
            rate,
            scheduled_rate,
            is_suspended,
        }
    }
}

/// Classified events from one fetch, split by destination.
#[derive(Debug, Clone, Default)]
pub struct ClassifiedBatch {
    pub glucose: Vec<GlucoseSample>,
    pub doses: Vec<DoseEntry>,
    pub carbs: Vec<CarbEntry>,
    pub dosing_decisions: Vec<DosingDecisionRecord>,
    pub pump_statuses: Vec<PumpStatusEvent>,
    pub discarded: usize,
}

impl ClassifiedBatch {
    pub fn push(&mut self, event: DomainEvent) {
        match event {
            DomainEvent::Glucose(sample) => self.glucose.push(sample),
            DomainEvent::Dose(dose) => self.doses.push(dose),
            DomainEvent::Carb(carb) => self.carbs.push(carb),
            DomainEvent::DosingDecision(decision) => self.dosing_decisions.push(decision),
            DomainEvent::PumpStatus(status) => self.pump_statuses.push(status),
        }
    }
}

/// Classify every record for `followee_id`.
pub fn classify_all(records: &[RawRecord], followee_id: &str) -> ClassifiedBatch {
    let mut batch = ClassifiedBatch::default();
    for record in records {
        match classify(record, followee_id) {
            Some(event) => batch.push(event),
            None => batch.discarded += 1,
        }
    }
    batch
}

/// Classify one record, or `None` to discard it.
pub fn classify(record: &RawRecord, followee_id: &str) -> Option<DomainEvent> {
    let event = match record {
        RawRecord::Cbg(datum) => glucose_sample(datum).map(DomainEvent::Glucose),
        RawRecord::Basal(datum) => basal_dose(datum).map(DomainEvent::Dose),
        RawRecord::Bolus(datum) => bolus_dose(datum).map(DomainEvent::Dose),
        RawRecord::Food(datum) => carb_entry(datum).map(DomainEvent::Carb),
        RawRecord::DosingDecision(datum) => {
            dosing_decision(datum).map(DomainEvent::DosingDecision)
        }
        RawRecord::PumpStatus(datum) => pump_status(datum).map(DomainEvent::PumpStatus),
        RawRecord::Unknown => return None,
    };

    if event.is_none() {
        tracing::debug!(
            followee_id,
            kind = record_kind(record),
            "Discarding record missing required fields"
        );
    }
    event
}

fn record_kind(record: &RawRecord) -> &'static str {
    match record {
        RawRecord::Cbg(_) => "cbg",
        RawRecord::Basal(_) => "basal",
        RawRecord::Bolus(_) => "bolus",
        RawRecord::Food(_) => "food",
        RawRecord::DosingDecision(_) => "dosingDecision",
        RawRecord::PumpStatus(_) => "pumpStatus",
        RawRecord::Unknown => "unknown",
    }
}

fn provenance(origin: Option<&Origin>) -> String {
    origin
        .and_then(|o| o.name.clone())
        .unwrap_or_else(|| REMOTE_PROVENANCE.to_string())
}

/// Payload sync identifier, then record id.
fn dose_sync_identifier(
    payload: Option<&crate::models::datum::Payload>,
    id: Option<&String>,
) -> Option<String> {
    payload_str(payload, SYNC_IDENTIFIER_KEY)
        .map(str::to_string)
        .or_else(|| id.cloned())
}

fn glucose_sample(datum: &CbgDatum) -> Option<GlucoseSample> {
    let unit = GlucoseUnit::from_wire(datum.units.as_deref()?)?;
    let value = datum.value?;
    let date = datum.time?;

    // Glucose falls back one step further than doses: the timestamp itself,
    // as fractional epoch seconds ("1705312800.0").
    let sync_identifier = dose_sync_identifier(datum.payload.as_ref(), datum.id.as_ref())
        .unwrap_or_else(|| format!("{:?}", date.timestamp_millis() as f64 / 1000.0));

    Some(GlucoseSample {
        sync_identifier,
        start_date: date,
        quantity: GlucoseQuantity::new(value, unit),
        trend: datum.trend.as_deref().and_then(GlucoseTrend::from_wire),
        trend_rate: datum.trend_rate,
        provenance: provenance(datum.origin.as_ref()),
    })
}

fn basal_dose(datum: &BasalDatum) -> Option<DoseEntry> {
    let date = datum.time?;
    let delivery_type = datum.delivery_type.as_deref()?;

    let (dose_type, automatic) = match delivery_type {
        "automated" => (DoseType::TempBasal, true),
        "temp" => (DoseType::TempBasal, false),
        "scheduled" => (DoseType::Basal, false),
        "suspend" => (DoseType::Suspend, false),
        _ => return None,
    };

    let rate = match dose_type {
        DoseType::Suspend => datum.rate.unwrap_or(0.0),
        _ => datum.rate?,
    };

    // An out-of-range duration leaves the end date unknown.
    let end_date = datum
        .duration
        .filter(|ms| *ms > 0)
        .and_then(Duration::try_milliseconds)
        .and_then(|duration| date.checked_add_signed(duration));

    let sync_identifier = dose_sync_identifier(datum.payload.as_ref(), datum.id.as_ref())?;

    let scheduled_basal_rate = datum
        .suppressed
        .as_ref()
        .filter(|s| s.delivery_type.as_deref() == Some("scheduled"))
        .and_then(|s| s.rate);

    Some(DoseEntry {
        sync_identifier,
        dose_type,
        start_date: date,
        end_date,
        value: rate,
        unit: DoseUnit::UnitsPerHour,
        delivered_units: payload_f64(datum.payload.as_ref(), "deliveredUnits"),
        scheduled_basal_rate,
        automatic,
        provenance: provenance(datum.origin.as_ref()),
    })
}

fn bolus_dose(datum: &BolusDatum) -> Option<DoseEntry> {
    let automatic = match datum.sub_type.as_deref() {
        Some("automated") => true,
        Some("normal") | None => false,
        Some(_) => return None,
    };
    let date = datum.time?;
    let normal = datum.normal?;
    let programmed_units = datum.expected_normal.unwrap_or(normal);
    let sync_identifier = dose_sync_identifier(datum.payload.as_ref(), datum.id.as_ref())?;

    Some(DoseEntry {
        sync_identifier,
        dose_type: DoseType::Bolus,
        start_date: date,
        end_date: None,
        value: programmed_units,
        unit: DoseUnit::Units,
        delivered_units: payload_f64(datum.payload.as_ref(), "deliveredUnits"),
        scheduled_basal_rate: None,
        automatic,
        provenance: provenance(datum.origin.as_ref()),
    })
}

fn carb_entry(datum: &FoodDatum) -> Option<CarbEntry> {
    let date = datum.time?;
    let nutrition = datum.nutrition.as_ref()?;
    let carbohydrate = nutrition.carbohydrate.as_ref()?;
    if carbohydrate.units.as_deref() != Some("grams") {
        return None;
    }
    let grams = carbohydrate.net?;
    let provenance = datum.origin.as_ref()?.name.clone()?;

    // Carbs never fall back to the record id.
    let payload = datum.payload.as_ref();
    let sync_identifier = payload_str(payload, SYNC_IDENTIFIER_KEY)?.to_string();
    let payload_date = |key: &str| payload_str(payload, key).and_then(parse_json_date);

    Some(CarbEntry {
        sync_identifier,
        sync_version: payload
            .and_then(|p| p.get("syncVersion"))
            .and_then(|v| v.as_i64())
            .unwrap_or(1),
        start_date: date,
        grams,
        provenance,
        food_type: datum.name.clone(),
        absorption_time_secs: nutrition.estimated_absorption_duration,
        uuid: payload_str(payload, "uuid").map(str::to_string),
        added_at: payload_date("addedDate"),
        created_at: payload_date("userCreatedDate"),
        updated_at: payload_date("userUpdatedDate"),
        deleted_at: payload_date("userDeletedDate"),
        superseded_at: payload_date("supercededDate"),
    })
}

fn dosing_decision(datum: &DosingDecisionDatum) -> Option<DosingDecisionRecord> {
    let reason = datum.reason.clone()?;
    let timed = |amount: Option<&crate::models::datum::AmountAt>| {
        let amount = amount?;
        Some(TimedValue {
            start_date: amount.time?,
            value: amount.amount?,
        })
    };

    Some(DosingDecisionRecord {
        date: datum.time,
        reason,
        carbs_on_board: timed(datum.carbohydrates_on_board.as_ref()),
        insulin_on_board: timed(datum.insulin_on_board.as_ref()),
    })
}

fn pump_status(datum: &PumpStatusDatum) -> Option<PumpStatusEvent> {
    let date = datum.time?;
    let basal_delivery = datum.basal_delivery.as_ref()?;

    let delivery = match basal_delivery.state.as_deref()? {
        "suspended" => BasalDelivery::Suspended,
        "scheduled" | "cancelingTemporary" | "initiatingTemporary" | "resuming"
        | "suspending" => BasalDelivery::Scheduled,
        "temporary" => BasalDelivery::Temporary {
            rate: basal_delivery.dose.as_ref()?.rate?,
        },
        _ => return None,
    };

    Some(PumpStatusEvent { date, delivery })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    const FOLLOWEE: &str = "followee-1";

    fn record(value: Value) -> RawRecord {
        RawRecord::from_value(value).expect("record should decode")
    }

    fn classify_json(value: Value) -> Option<DomainEvent> {
        classify(&record(value), FOLLOWEE)
    }

    #[test]
    fn test_glucose_prefers_payload_sync_identifier() {
        let event = classify_json(json!({
            "type": "cbg",
            "id": "remote-id",
            "time": "2024-01-15T10:00:00Z",
            "value": 110,
            "units": "mg/dL",
            "trend": "slowRise",
            "trendRate": 1.5,
            "payload": {"syncIdentifier": "payload-id"}
        }));
        let Some(DomainEvent::Glucose(sample)) = event else {
            panic!("expected glucose, got {:?}", event);
        };
        assert_eq!(sample.sync_identifier, "payload-id");
        assert_eq!(sample.quantity.value, 110.0);
        assert_eq!(sample.trend, Some(GlucoseTrend::Up));
        assert_eq!(sample.trend_rate, Some(1.5));
        assert_eq!(sample.provenance, REMOTE_PROVENANCE);
    }

    #[test]
    fn test_glucose_falls_back_to_id_then_timestamp() {
        let with_id = classify_json(json!({
            "type": "cbg", "id": "remote-id", "time": "2024-01-15T10:00:00Z",
            "value": 5.5, "units": "mmol/L"
        }));
        let Some(DomainEvent::Glucose(sample)) = with_id else {
            panic!("expected glucose");
        };
        assert_eq!(sample.sync_identifier, "remote-id");

        let bare = classify_json(json!({
            "type": "cbg", "time": "2024-01-15T10:00:00Z",
            "value": 5.5, "units": "mmol/L"
        }));
        let Some(DomainEvent::Glucose(sample)) = bare else {
            panic!("expected glucose");
        };
        assert_eq!(sample.sync_identifier, "1705312800.0");

        let fractional = classify_json(json!({
            "type": "cbg", "time": "2024-01-15T10:00:00.250Z",
            "value": 5.5, "units": "mmol/L"
        }));
        let Some(DomainEvent::Glucose(sample)) = fractional else {
            panic!("expected glucose");
        };
        assert_eq!(sample.sync_identifier, "1705312800.25");
    }

    #[test]
    fn test_glucose_with_unknown_unit_is_discarded() {
        let event = classify_json(json!({
            "type": "cbg", "id": "x", "time": "2024-01-15T10:00:00Z",
            "value": 1.1, "units": "g/L"
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_glucose_missing_value_is_discarded() {
        let event = classify_json(json!({
            "type": "cbg", "id": "x", "time": "2024-01-15T10:00:00Z", "units": "mg/dL"
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_bolus_programmed_and_delivered_amounts() {
        let event = classify_json(json!({
            "type": "bolus",
            "subType": "normal",
            "id": "bolus-1",
            "time": "2024-01-15T10:00:00Z",
            "normal": 1.5,
            "expectedNormal": 2.0,
            "payload": {"deliveredUnits": 1.5}
        }));
        let Some(DomainEvent::Dose(dose)) = event else {
            panic!("expected dose");
        };
        assert_eq!(dose.dose_type, DoseType::Bolus);
        assert_eq!(dose.value, 2.0);
        assert_eq!(dose.delivered_units, Some(1.5));
        assert!(!dose.automatic);
        assert_eq!(dose.sync_identifier, "bolus-1");
    }

    #[test]
    fn test_automated_bolus_without_delivered_units() {
        let event = classify_json(json!({
            "type": "bolus",
            "subType": "automated",
            "time": "2024-01-15T10:00:00Z",
            "normal": 0.3,
            "payload": {"syncIdentifier": "auto-1"}
        }));
        let Some(DomainEvent::Dose(dose)) = event else {
            panic!("expected dose");
        };
        assert!(dose.automatic);
        assert_eq!(dose.value, 0.3);
        assert_eq!(dose.delivered_units, None);
    }

    #[test]
    fn test_dose_without_any_identifier_is_discarded() {
        let event = classify_json(json!({
            "type": "bolus", "subType": "normal",
            "time": "2024-01-15T10:00:00Z", "normal": 1.0
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_temp_basal_carries_suppressed_scheduled_rate() {
        let event = classify_json(json!({
            "type": "basal",
            "deliveryType": "automated",
            "id": "basal-1",
            "time": "2024-01-15T10:00:00Z",
            "rate": 0.2,
            "duration": 300000,
            "suppressed": {"type": "basal", "deliveryType": "scheduled", "rate": 0.8}
        }));
        let Some(DomainEvent::Dose(dose)) = event else {
            panic!("expected dose");
        };
        assert_eq!(dose.dose_type, DoseType::TempBasal);
        assert!(dose.automatic);
        assert_eq!(dose.scheduled_basal_rate, Some(0.8));
        assert_eq!(
            dose.end_date,
            Some(dose.start_date + Duration::minutes(5))
        );
    }

    #[test]
    fn test_temp_basal_ignores_non_scheduled_suppressed() {
        let event = classify_json(json!({
            "type": "basal",
            "deliveryType": "automated",
            "id": "basal-2",
            "time": "2024-01-15T10:00:00Z",
            "rate": 0.2,
            "suppressed": {"deliveryType": "temp", "rate": 0.5}
        }));
        let Some(DomainEvent::Dose(dose)) = event else {
            panic!("expected dose");
        };
        assert_eq!(dose.scheduled_basal_rate, None);
        assert_eq!(dose.end_date, None);
    }

    #[test]
    fn test_basal_without_rate_is_discarded() {
        let event = classify_json(json!({
            "type": "basal", "deliveryType": "automated",
            "id": "b", "time": "2024-01-15T10:00:00Z"
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_carb_entry_requires_payload_sync_identifier() {
        let event = classify_json(json!({
            "type": "food",
            "id": "food-1",
            "time": "2024-01-15T10:00:00Z",
            "nutrition": {"carbohydrate": {"net": 30, "units": "grams"}},
            "origin": {"name": "org.loopkit.Loop"}
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_carb_entry_lifecycle_dates_pass_through() {
        let event = classify_json(json!({
            "type": "food",
            "time": "2024-01-15T10:00:00Z",
            "name": "Pizza",
            "nutrition": {
                "carbohydrate": {"net": 45, "units": "grams"},
                "estimatedAbsorptionDuration": 10800
            },
            "origin": {"name": "org.loopkit.Loop"},
            "payload": {
                "syncIdentifier": "carb-1",
                "syncVersion": 2,
                "userCreatedDate": "2024-01-15T10:00:00Z",
                "userUpdatedDate": "2024-01-15T10:05:00.250Z",
                "supercededDate": "2024-01-15T10:06:00Z"
            }
        }));
        let Some(DomainEvent::Carb(carb)) = event else {
            panic!("expected carb entry");
        };
        assert_eq!(carb.sync_identifier, "carb-1");
        assert_eq!(carb.sync_version, 2);
        assert_eq!(carb.grams, 45.0);
        assert_eq!(carb.provenance, "org.loopkit.Loop");
        assert_eq!(carb.food_type.as_deref(), Some("Pizza"));
        assert_eq!(carb.absorption_time_secs, Some(10800.0));
        assert!(carb.created_at.is_some());
        assert_eq!(
            carb.updated_at.map(|d| d.timestamp_subsec_millis()),
            Some(250)
        );
        assert!(carb.deleted_at.is_none());
        assert!(carb.superseded_at.is_some());
    }

    #[test]
    fn test_carb_entry_requires_grams_and_provenance() {
        let wrong_units = classify_json(json!({
            "type": "food", "time": "2024-01-15T10:00:00Z",
            "nutrition": {"carbohydrate": {"net": 30, "units": "exchanges"}},
            "origin": {"name": "org.loopkit.Loop"},
            "payload": {"syncIdentifier": "c"}
        }));
        assert!(wrong_units.is_none());

        let no_origin = classify_json(json!({
            "type": "food", "time": "2024-01-15T10:00:00Z",
            "nutrition": {"carbohydrate": {"net": 30, "units": "grams"}},
            "payload": {"syncIdentifier": "c"}
        }));
        assert!(no_origin.is_none());
    }

    #[test]
    fn test_dosing_decision_requires_reason() {
        let event = classify_json(json!({
            "type": "dosingDecision", "time": "2024-01-15T10:00:00Z"
        }));
        assert!(event.is_none());
    }

    #[test]
    fn test_dosing_decision_on_board_values_need_time_and_amount() {
        let event = classify_json(json!({
            "type": "dosingDecision",
            "time": "2024-01-15T10:00:00Z",
            "reason": "loop",
            "insulinOnBoard": {"time": "2024-01-15T10:00:00Z", "amount": 2.35},
            "carbohydratesOnBoard": {"amount": 12}
        }));
        let Some(DomainEvent::DosingDecision(decision)) = event else {
            panic!("expected dosing decision");
        };
        assert_eq!(decision.reason, "loop");
        assert_eq!(decision.insulin_on_board.map(|v| v.value), Some(2.35));
        assert!(decision.carbs_on_board.is_none());
    }

    fn pump_status_with(state: &str, dose: Value) -> Option<DomainEvent> {
        classify_json(json!({
            "type": "pumpStatus",
            "time": "2024-01-15T10:00:00Z",
            "basalDelivery": {"state": state, "dose": dose}
        }))
    }

    #[test]
    fn test_pump_status_state_mapping() {
        let expect = |state: &str, dose: Value, rate: f64, suspended: bool| {
            let Some(DomainEvent::PumpStatus(status)) = pump_status_with(state, dose) else {
                panic!("expected pump status for {}", state);
            };
            let basal = status.basal_state(0.8);
            assert_eq!(basal.rate, rate, "rate for {}", state);
            assert_eq!(basal.is_suspended, suspended, "suspension for {}", state);
            assert_eq!(basal.scheduled_rate, 0.8);
        };

        expect("suspended", Value::Null, 0.0, true);
        expect("scheduled", Value::Null, 0.8, false);
        expect("cancelingTemporary", Value::Null, 0.8, false);
        expect("initiatingTemporary", Value::Null, 0.8, false);
        expect("resuming", Value::Null, 0.8, false);
        expect("suspending", Value::Null, 0.8, false);
        expect("temporary", json!({"rate": 1.25}), 1.25, false);
    }

    #[test]
    fn test_pump_status_discards() {
        assert!(pump_status_with("temporary", json!({})).is_none());
        assert!(pump_status_with("none", Value::Null).is_none());

        let no_time = classify_json(json!({
            "type": "pumpStatus", "basalDelivery": {"state": "scheduled"}
        }));
        assert!(no_time.is_none());
    }

    #[test]
    fn test_classify_all_counts_discards() {
        let records = vec![
            record(json!({"type": "cbg", "time": "2024-01-15T10:00:00Z", "value": 100, "units": "mg/dL"})),
            record(json!({"type": "smbg", "value": 100})),
            record(json!({"type": "food", "id": "f", "time": "2024-01-15T10:00:00Z"})),
            record(json!({"type": "dosingDecision", "reason": "loop"})),
        ];
        let batch = classify_all(&records, FOLLOWEE);
        assert_eq!(batch.glucose.len(), 1);
        assert_eq!(batch.dosing_decisions.len(), 1);
        assert_eq!(batch.discarded, 2);
    }

    #[test]
    fn test_out_of_range_basal_duration_leaves_end_open() {
        let records = vec![record(json!({
            "type": "basal",
            "deliveryType": "automated",
            "id": "b",
            "time": "2024-01-15T10:00:00Z",
            "rate": 0.5,
            "duration": 9_000_000_000_000_000_000_i64
        }))];
        let batch = classify_all(&records, FOLLOWEE);
        assert_eq!(batch.discarded, 0);
        assert_eq!(batch.doses.len(), 1);
        assert!(batch.doses[0].end_date.is_none());
        assert_eq!(batch.doses[0].start_date.timestamp(), 1_705_312_800);
    }
}
