// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Remote data records as returned by the Tidepool data API.
//!
//! Every field is optional on the wire; the classifier decides which ones
//! a record cannot do without.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Free-form payload attached to a record by the uploading app.
pub type Payload = Map<String, Value>;

/// Record kinds requested from the data API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DatumKind {
    Cbg,
    Basal,
    Bolus,
    Food,
    DosingDecision,
    PumpStatus,
}

impl DatumKind {
    pub const ALL: [DatumKind; 6] = [
        DatumKind::Cbg,
        DatumKind::Basal,
        DatumKind::Bolus,
        DatumKind::Food,
        DatumKind::DosingDecision,
        DatumKind::PumpStatus,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DatumKind::Cbg => "cbg",
            DatumKind::Basal => "basal",
            DatumKind::Bolus => "bolus",
            DatumKind::Food => "food",
            DatumKind::DosingDecision => "dosingDecision",
            DatumKind::PumpStatus => "pumpStatus",
        }
    }
}

/// One remote record, discriminated by its `type` field.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RawRecord {
    Cbg(CbgDatum),
    Basal(BasalDatum),
    Bolus(BolusDatum),
    Food(FoodDatum),
    DosingDecision(DosingDecisionDatum),
    PumpStatus(PumpStatusDatum),
    #[serde(other)]
    Unknown,
}

impl RawRecord {
    /// Decode a single JSON record, dropping it if it cannot be decoded.
    pub fn from_value(value: Value) -> Option<RawRecord> {
        match serde_json::from_value(value) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::debug!(error = %e, "Dropping undecodable data record");
                None
            }
        }
    }
}

/// Decode a batch of records one by one so a bad record never sinks the batch.
pub fn parse_records(values: Vec<Value>) -> Vec<RawRecord> {
    values.into_iter().filter_map(RawRecord::from_value).collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Origin {
    pub name: Option<String>,
}

/// Continuous glucose reading.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CbgDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub value: Option<f64>,
    pub units: Option<String>,
    pub trend: Option<String>,
    pub trend_rate: Option<f64>,
    pub origin: Option<Origin>,
    pub payload: Option<Payload>,
}

/// Basal delivery record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasalDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    /// `automated`, `scheduled`, `temp` or `suspend`
    pub delivery_type: Option<String>,
    pub rate: Option<f64>,
    /// Milliseconds
    pub duration: Option<i64>,
    pub suppressed: Option<SuppressedBasal>,
    pub origin: Option<Origin>,
    pub payload: Option<Payload>,
}

/// The basal a temporary basal replaced.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SuppressedBasal {
    pub delivery_type: Option<String>,
    pub rate: Option<f64>,
}

/// Bolus record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BolusDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    /// `normal` or `automated`
    pub sub_type: Option<String>,
    pub normal: Option<f64>,
    pub expected_normal: Option<f64>,
    pub origin: Option<Origin>,
    pub payload: Option<Payload>,
}

/// Food / carbohydrate record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FoodDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub name: Option<String>,
    pub nutrition: Option<Nutrition>,
    pub origin: Option<Origin>,
    pub payload: Option<Payload>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Nutrition {
    pub carbohydrate: Option<Carbohydrate>,
    /// Seconds
    pub estimated_absorption_duration: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Carbohydrate {
    pub net: Option<f64>,
    pub units: Option<String>,
}

/// Dosing decision record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DosingDecisionDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub reason: Option<String>,
    pub insulin_on_board: Option<AmountAt>,
    pub carbohydrates_on_board: Option<AmountAt>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmountAt {
    pub time: Option<DateTime<Utc>>,
    pub amount: Option<f64>,
}

/// Pump status record.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PumpStatusDatum {
    pub id: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub basal_delivery: Option<BasalDeliveryDatum>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasalDeliveryDatum {
    /// `scheduled`, `suspended`, `temporary`, `cancelingTemporary`,
    /// `initiatingTemporary`, `resuming` or `suspending`
    pub state: Option<String>,
    pub dose: Option<BasalDeliveryDose>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BasalDeliveryDose {
    pub rate: Option<f64>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
}

/// String value from a payload.
pub fn payload_str<'a>(payload: Option<&'a Payload>, key: &str) -> Option<&'a str> {
    payload?.get(key)?.as_str()
}

/// Numeric value from a payload.
pub fn payload_f64(payload: Option<&Payload>, key: &str) -> Option<f64> {
    payload?.get(key)?.as_f64()
}
