use serde_json::Value;

use chart_core::{
    ChartError, DiagnosisCandidate, MalformedRecordError, Projection, REFERENCE_TERM_SOURCE,
};

use crate::log_rejected;

const CONCEPT: &str = "Concept";

/// Map diagnosis search hits to candidates.
///
/// Accepts the bare result array, or an object wrapping it in `results`.
pub fn resolve_diagnoses(response: &Value) -> Result<Projection<DiagnosisCandidate>, ChartError> {
    let results = response
        .as_array()
        .or_else(|| response.get("results").and_then(Value::as_array))
        .ok_or_else(|| ChartError::Parse("diagnosis search did not return a list".into()))?;

    let mut projection = Projection::default();
    for result in results {
        match resolve_diagnosis(result) {
            Ok(candidate) => projection.records.push(candidate),
            Err(error) => {
                log_rejected(&error);
                projection.rejected.push(error);
            }
        }
    }
    Ok(projection)
}

fn resolve_diagnosis(result: &Value) -> Result<DiagnosisCandidate, MalformedRecordError> {
    let concept = result
        .get("concept")
        .ok_or_else(|| MalformedRecordError::missing(CONCEPT, None, "concept"))?;

    let concept_uuid = concept
        .get("uuid")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedRecordError::missing(CONCEPT, None, "concept.uuid"))?;

    let concept_id = match concept.get("id") {
        Some(Value::Number(number)) => number.to_string(),
        Some(Value::String(text)) => text.clone(),
        _ => {
            return Err(MalformedRecordError::missing(
                CONCEPT,
                Some(concept_uuid),
                "concept.id",
            ))
        }
    };

    let preferred_name = concept
        .get("preferredName")
        .and_then(Value::as_str)
        .or_else(|| concept.get("display").and_then(Value::as_str))
        .ok_or_else(|| {
            MalformedRecordError::missing(CONCEPT, Some(concept_uuid), "concept.preferredName")
        })?;

    let mappings = concept
        .get("conceptMappings")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();

    Ok(DiagnosisCandidate {
        concept_id,
        concept_uuid: concept_uuid.to_string(),
        preferred_name: preferred_name.to_string(),
        reference_term_code: reference_term_code(mappings, REFERENCE_TERM_SOURCE),
        primary: false,
        confirmed: false,
    })
}

/// Code of the first mapping whose reference term comes from `source`.
pub fn reference_term_code(mappings: &[Value], source: &str) -> Option<String> {
    mappings.iter().find_map(|mapping| {
        let term = mapping.get("conceptReferenceTerm")?;
        let source_name = term
            .get("conceptSource")
            .and_then(|s| s.get("name"))
            .and_then(Value::as_str)?;
        if source_name != source {
            return None;
        }
        term.get("code").and_then(Value::as_str).map(str::to_string)
    })
}
