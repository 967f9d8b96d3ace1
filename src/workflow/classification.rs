// Classification ingestion - derived fields and the calendar -> MJD converter

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};

use super::errors::WorkflowError;
use super::types::{ClassificationRecord, TransientId, TransientRecord};

/// `NaiveDate::num_days_from_ce` of 1858-11-17, day zero of the Modified Julian Date
const MJD_EPOCH_DAYS_FROM_CE: i64 = 678_576;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Generic type replaced by the supplied sub-type
const GENERIC_SUPERNOVA: &str = "supernova";

/// Default phase relative to maximum light
pub const UNKNOWN_WRT_MAX: &str = "unknown";

/// Validated classification request
#[derive(Debug, Clone, PartialEq)]
pub struct Classify {
    pub transient_id: TransientId,
    pub observation_date: NaiveDateTime,
    /// Survey or instrument the spectrum came from
    pub source: String,
    pub spectral_type: String,
    pub sub_type: Option<String>,
    pub redshift: Option<f64>,
    pub classification_wrt_max: Option<String>,
    pub phase: Option<String>,
    pub peculiar: bool,
}

/// Parse a UT calendar date (`2024-03-01`) or date-time
/// (`2024-03-01T06:00:00`, `2024-03-01 06:00:00.5`). Plain dates are taken
/// at midnight UT.
pub fn parse_observation_date(raw: &str) -> Result<NaiveDateTime, WorkflowError> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Ok(date.and_time(chrono::NaiveTime::MIN));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| WorkflowError::validation(format!("observation date `{raw}` is not a UT calendar date")))
}

/// Convert a UT calendar date-time to Modified Julian Date
pub fn calendar_to_mjd(observed: NaiveDateTime) -> f64 {
    let days = i64::from(observed.date().num_days_from_ce()) - MJD_EPOCH_DAYS_FROM_CE;
    let time = observed.time();
    let seconds = f64::from(time.num_seconds_from_midnight()) + f64::from(time.nanosecond()) / 1e9;
    days as f64 + seconds / SECONDS_PER_DAY
}

/// Classification string stored for a request: the generic supernova tag is
/// replaced by the sub-type, peculiar objects get a `-p` suffix
pub fn derive_classification(spectral_type: &str, sub_type: Option<&str>, peculiar: bool) -> String {
    let spectral_type = spectral_type.trim();
    let sub_type = sub_type.map(str::trim).filter(|s| !s.is_empty());

    let mut classification = match sub_type {
        Some(sub_type) if spectral_type.eq_ignore_ascii_case(GENERIC_SUPERNOVA) => sub_type.to_string(),
        _ => spectral_type.to_string(),
    };
    if peculiar {
        classification.push_str("-p");
    }
    classification
}

/// Blank optional text counts as absent
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|v| !v.is_empty()).map(str::to_string)
}

/// Build the row that replaces the transient's current classification
pub fn build_classification(
    record: &TransientRecord,
    request: &Classify,
    reducer: &str,
) -> ClassificationRecord {
    ClassificationRecord {
        transient_id: record.id,
        name: record.name.clone(),
        ra: record.ra,
        dec: record.dec,
        observation_date: request.observation_date.date(),
        observation_mjd: calendar_to_mjd(request.observation_date),
        survey: request.source.trim().to_string(),
        classification: derive_classification(
            &request.spectral_type,
            request.sub_type.as_deref(),
            request.peculiar,
        ),
        redshift: request.redshift,
        classification_wrt_max: non_blank(request.classification_wrt_max.as_deref())
            .unwrap_or_else(|| UNKNOWN_WRT_MAX.to_string()),
        phase: non_blank(request.phase.as_deref()),
        reducer: reducer.to_string(),
    }
}
