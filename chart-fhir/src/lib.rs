//! FHIR and REST JSON to chart view models.
//!
//! Every projection walks `serde_json::Value` payloads, rejects malformed
//! entries with a [`MalformedRecordError`] and keeps going with the rest of
//! the bundle.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::Value;

use chart_core::{ChartConfig, ChartError, DimensionSeries, MalformedRecordError};

mod allergy;
mod diagnosis;
mod dimensions;
mod observation;

pub use allergy::project_allergies;
pub use diagnosis::{reference_term_code, resolve_diagnoses};
pub use dimensions::merge_dimensions;
pub use observation::{normalize_observations, parse_observation};

/// Parse a JSON document.
pub fn parse_json_str(json: &str) -> Result<Value, ChartError> {
    serde_json::from_str(json).map_err(|err| ChartError::Parse(err.to_string()))
}

/// Entries of a FHIR `Bundle`. A searchset without matches has no `entry`
/// and yields an empty slice.
pub fn bundle_entries(bundle: &Value) -> Result<&[Value], ChartError> {
    let bundle_type = bundle
        .get("resourceType")
        .and_then(Value::as_str)
        .ok_or_else(|| ChartError::MissingData("resourceType".into()))?;

    if bundle_type != "Bundle" {
        return Err(ChartError::Parse(format!(
            "Expected resourceType Bundle, received {bundle_type}"
        )));
    }

    match bundle.get("entry") {
        None | Some(Value::Null) => Ok(&[]),
        Some(Value::Array(entries)) => Ok(entries.as_slice()),
        Some(_) => Err(ChartError::Parse("Bundle.entry is not an array".into())),
    }
}

/// Normalize and merge an Observation bundle into biometrics rows.
pub fn summarize_dimensions(
    bundle: &Value,
    config: &ChartConfig,
) -> Result<DimensionSeries, ChartError> {
    let normalized = normalize_observations(bundle, &config.concepts)?;
    let records = merge_dimensions(
        &normalized.heights,
        &normalized.weights,
        config.join_key,
        config.bmi_decimals,
    );

    tracing::debug!(
        records = records.len(),
        rejected = normalized.rejected.len(),
        "merged biometrics"
    );

    Ok(DimensionSeries {
        records,
        rejected: normalized.rejected,
    })
}

/// Summarize biometrics from a JSON string.
pub fn summarize_dimensions_str(
    bundle_json: &str,
    config: &ChartConfig,
) -> Result<DimensionSeries, ChartError> {
    summarize_dimensions(&parse_json_str(bundle_json)?, config)
}

pub(crate) fn log_rejected(error: &MalformedRecordError) {
    tracing::warn!(
        resource_type = %error.resource_type,
        id = error.id.as_deref().unwrap_or("<no id>"),
        %error,
        "skipping malformed entry"
    );
}

pub(crate) fn resource_id(resource: &Value) -> Option<&str> {
    resource
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
}

pub(crate) fn extract_codeable_text(value: &Value) -> Option<String> {
    if let Some(text) = value.get("text").and_then(Value::as_str) {
        if !text.trim().is_empty() {
            return Some(text.trim().to_string());
        }
    }

    if let Some(codings) = value.get("coding").and_then(Value::as_array) {
        for coding in codings {
            if let Some(display) = coding.get("display").and_then(Value::as_str) {
                if !display.trim().is_empty() {
                    return Some(display.trim().to_string());
                }
            }
        }
    }

    None
}

pub(crate) fn parse_datetime(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Dates in FHIR may be a full dateTime, a date, or a year-month.
pub(crate) fn parse_partial_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Some(dt) = parse_datetime(value) {
        return Some(dt.date_naive());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    NaiveDate::parse_from_str(&format!("{value}-01"), "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bundle_without_entries_is_empty() {
        let bundle = json!({ "resourceType": "Bundle", "type": "searchset", "total": 0 });
        assert!(bundle_entries(&bundle).unwrap().is_empty());
    }

    #[test]
    fn non_bundle_is_rejected() {
        let err = bundle_entries(&json!({ "resourceType": "Patient" })).unwrap_err();
        assert!(matches!(err, ChartError::Parse(_)));
        let err = bundle_entries(&json!({})).unwrap_err();
        assert!(matches!(err, ChartError::MissingData(_)));
    }

    #[test]
    fn partial_dates() {
        assert_eq!(
            parse_partial_date("2019-03-05T10:00:00+02:00"),
            NaiveDate::from_ymd_opt(2019, 3, 5)
        );
        assert_eq!(
            parse_partial_date("2019-03-05"),
            NaiveDate::from_ymd_opt(2019, 3, 5)
        );
        assert_eq!(
            parse_partial_date("2019-03"),
            NaiveDate::from_ymd_opt(2019, 3, 1)
        );
        assert_eq!(parse_partial_date("March"), None);
    }

    #[test]
    fn codeable_text_prefers_text_then_display() {
        assert_eq!(
            extract_codeable_text(&json!({ "text": " Penicillin " })),
            Some("Penicillin".to_string())
        );
        assert_eq!(
            extract_codeable_text(&json!({ "coding": [{ "code": "x" }, { "display": "Eggs" }] })),
            Some("Eggs".to_string())
        );
        assert_eq!(extract_codeable_text(&json!({ "coding": [] })), None);
    }
}
