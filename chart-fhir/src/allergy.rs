use chrono::{DateTime, Utc};
use serde_json::Value;

use chart_core::{AllergyRecord, ChartError, Criticality, MalformedRecordError, Projection};

use crate::{
    bundle_entries, extract_codeable_text, log_rejected, parse_datetime, parse_partial_date,
    resource_id,
};

const ALLERGY: &str = "AllergyIntolerance";

/// Project an `AllergyIntolerance` search bundle into allergy rows.
pub fn project_allergies(bundle: &Value) -> Result<Projection<AllergyRecord>, ChartError> {
    let last_updated = bundle
        .get("meta")
        .and_then(|meta| meta.get("lastUpdated"))
        .and_then(Value::as_str)
        .and_then(parse_datetime);

    let mut projection = Projection::default();

    for entry in bundle_entries(bundle)? {
        let Some(resource) = entry.get("resource") else {
            let error = MalformedRecordError::missing(ALLERGY, None, "resource");
            log_rejected(&error);
            projection.rejected.push(error);
            continue;
        };

        match resource.get("resourceType").and_then(Value::as_str) {
            Some(ALLERGY) => {}
            other => {
                tracing::debug!(resource_type = ?other, "ignoring non-allergy entry");
                continue;
            }
        }

        match project_allergy(resource, last_updated) {
            Ok(record) => projection.records.push(record),
            Err(error) => {
                log_rejected(&error);
                projection.rejected.push(error);
            }
        }
    }

    Ok(projection)
}

fn project_allergy(
    resource: &Value,
    last_updated: Option<DateTime<Utc>>,
) -> Result<AllergyRecord, MalformedRecordError> {
    let id =
        resource_id(resource).ok_or_else(|| MalformedRecordError::missing(ALLERGY, None, "id"))?;

    let allergen_text = resource
        .get("code")
        .and_then(extract_codeable_text)
        .ok_or_else(|| MalformedRecordError::missing(ALLERGY, Some(id), "code.text"))?;

    let recorded_date = {
        let extensions = resource
            .get("extension")
            .and_then(Value::as_array)
            .ok_or_else(|| MalformedRecordError::missing(ALLERGY, Some(id), "extension"))?;
        let raw = extensions
            .iter()
            .find_map(|ext| ext.get("valueDateTime").and_then(Value::as_str))
            .ok_or_else(|| {
                MalformedRecordError::missing(ALLERGY, Some(id), "extension.valueDateTime")
            })?;
        parse_partial_date(raw).ok_or_else(|| {
            MalformedRecordError::invalid(ALLERGY, Some(id), "extension.valueDateTime")
        })?
    };

    Ok(AllergyRecord {
        id: id.to_string(),
        allergen_text,
        criticality: Criticality::from_fhir(resource.get("criticality").and_then(Value::as_str)),
        reaction_manifestations: first_reaction_manifestations(resource),
        note: resource
            .get("note")
            .and_then(Value::as_array)
            .and_then(|notes| notes.first())
            .and_then(|note| note.get("text"))
            .and_then(Value::as_str)
            .map(str::to_string),
        recorded_date: Some(recorded_date),
        last_updated,
    })
}

fn first_reaction_manifestations(resource: &Value) -> Vec<String> {
    resource
        .get("reaction")
        .and_then(Value::as_array)
        .and_then(|reactions| reactions.first())
        .and_then(|reaction| reaction.get("manifestation"))
        .and_then(Value::as_array)
        .map(|manifestations| {
            manifestations
                .iter()
                .filter_map(extract_codeable_text)
                .collect()
        })
        .unwrap_or_default()
}
