use serde_json::Value;

use chart_core::{
    ChartError, Coding, ConceptConfig, MalformedKind, MalformedRecordError,
    NormalizedObservations, Observation,
};

use crate::{bundle_entries, log_rejected, parse_datetime, resource_id};

const OBSERVATION: &str = "Observation";

enum Concept {
    Height,
    Weight,
}

/// Split an Observation bundle into heights and weights.
///
/// Observations coded with neither concept are dropped. One coded with both
/// is rejected rather than counted twice, as is an entry without a resource
/// or without `code.coding`.
pub fn normalize_observations(
    bundle: &Value,
    concepts: &ConceptConfig,
) -> Result<NormalizedObservations, ChartError> {
    let mut normalized = NormalizedObservations::default();

    for entry in bundle_entries(bundle)? {
        let Some(resource) = entry.get("resource") else {
            let error = MalformedRecordError::missing(OBSERVATION, None, "resource");
            log_rejected(&error);
            normalized.rejected.push(error);
            continue;
        };
        if resource.get("resourceType").and_then(Value::as_str) != Some(OBSERVATION) {
            continue;
        }

        let outcome = classify(resource, concepts).and_then(|concept| match concept {
            None => Ok(None),
            Some(concept) => parse_observation(resource).map(|obs| Some((concept, obs))),
        });

        match outcome {
            Ok(None) => {}
            Ok(Some((Concept::Height, obs))) => normalized.heights.push(obs),
            Ok(Some((Concept::Weight, obs))) => normalized.weights.push(obs),
            Err(error) => {
                log_rejected(&error);
                normalized.rejected.push(error);
            }
        }
    }

    Ok(normalized)
}

fn classify(
    resource: &Value,
    concepts: &ConceptConfig,
) -> Result<Option<Concept>, MalformedRecordError> {
    let codes: Vec<&str> = resource
        .get("code")
        .and_then(|code| code.get("coding"))
        .and_then(Value::as_array)
        .ok_or_else(|| {
            MalformedRecordError::missing(OBSERVATION, resource_id(resource), "code.coding")
        })?
        .iter()
        .filter_map(|coding| coding.get("code").and_then(Value::as_str))
        .collect();

    let is_height = codes.iter().any(|code| *code == concepts.height_uuid);
    let is_weight = codes.iter().any(|code| *code == concepts.weight_uuid);

    match (is_height, is_weight) {
        (true, true) => Err(MalformedRecordError {
            resource_type: OBSERVATION.to_string(),
            id: resource_id(resource).map(str::to_string),
            kind: MalformedKind::AmbiguousConcept,
        }),
        (true, false) => Ok(Some(Concept::Height)),
        (false, true) => Ok(Some(Concept::Weight)),
        (false, false) => Ok(None),
    }
}

/// Validate one numeric Observation resource.
pub fn parse_observation(resource: &Value) -> Result<Observation, MalformedRecordError> {
    let id = resource_id(resource)
        .ok_or_else(|| MalformedRecordError::missing(OBSERVATION, None, "id"))?;

    let codings = resource
        .get("code")
        .and_then(|code| code.get("coding"))
        .and_then(Value::as_array)
        .ok_or_else(|| MalformedRecordError::missing(OBSERVATION, Some(id), "code.coding"))?
        .iter()
        .filter_map(|coding| {
            let code = coding.get("code").and_then(Value::as_str)?;
            Some(Coding {
                system: coding
                    .get("system")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                code: code.to_string(),
            })
        })
        .collect();

    let issued_text = resource
        .get("issued")
        .and_then(Value::as_str)
        .ok_or_else(|| MalformedRecordError::missing(OBSERVATION, Some(id), "issued"))?;
    let issued = parse_datetime(issued_text)
        .ok_or_else(|| MalformedRecordError::invalid(OBSERVATION, Some(id), "issued"))?;

    let quantity = resource.get("valueQuantity");
    let value = quantity
        .and_then(|q| q.get("value"))
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            MalformedRecordError::missing(OBSERVATION, Some(id), "valueQuantity.value")
        })?;
    if !value.is_finite() || value <= 0.0 {
        return Err(MalformedRecordError::invalid(
            OBSERVATION,
            Some(id),
            "valueQuantity.value",
        ));
    }

    Ok(Observation {
        id: id.to_string(),
        codings,
        effective_at: resource
            .get("effectiveDateTime")
            .and_then(Value::as_str)
            .and_then(parse_datetime),
        issued,
        value,
        unit: quantity
            .and_then(|q| q.get("unit"))
            .and_then(Value::as_str)
            .map(str::to_string),
        subject_reference: resource
            .get("subject")
            .and_then(|subject| subject.get("reference"))
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chart_core::{DEFAULT_HEIGHT_CONCEPT, DEFAULT_WEIGHT_CONCEPT};
    use serde_json::json;

    fn obs(id: &str, codes: &[&str], issued: &str, value: f64) -> Value {
        json!({
            "resource": {
                "resourceType": "Observation",
                "id": id,
                "code": { "coding": codes.iter().map(|c| json!({ "code": c })).collect::<Vec<_>>() },
                "issued": issued,
                "valueQuantity": { "value": value, "unit": "kg" },
                "subject": { "reference": "Patient/p1" }
            }
        })
    }

    fn bundle(entries: Vec<Value>) -> Value {
        json!({ "resourceType": "Bundle", "entry": entries })
    }

    #[test]
    fn partitions_by_concept_and_drops_others() {
        let bundle = bundle(vec![
            obs("h1", &[DEFAULT_HEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 175.0),
            obs("w1", &["other", DEFAULT_WEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 70.0),
            obs("x1", &["5087AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA"], "2024-01-01T00:00:00Z", 80.0),
        ]);

        let normalized = normalize_observations(&bundle, &ConceptConfig::default()).unwrap();
        assert_eq!(normalized.heights.len(), 1);
        assert_eq!(normalized.heights[0].id, "h1");
        assert_eq!(normalized.weights.len(), 1);
        assert_eq!(normalized.weights[0].id, "w1");
        assert_eq!(
            normalized.weights[0].subject_reference.as_deref(),
            Some("Patient/p1")
        );
        assert!(normalized.rejected.is_empty());
    }

    #[test]
    fn empty_bundle_gives_empty_partitions() {
        let normalized = normalize_observations(
            &json!({ "resourceType": "Bundle", "total": 0 }),
            &ConceptConfig::default(),
        )
        .unwrap();
        assert!(normalized.heights.is_empty());
        assert!(normalized.weights.is_empty());
        assert!(normalized.rejected.is_empty());
    }

    #[test]
    fn observation_coded_twice_is_rejected() {
        let bundle = bundle(vec![obs(
            "both",
            &[DEFAULT_HEIGHT_CONCEPT, DEFAULT_WEIGHT_CONCEPT],
            "2024-01-01T00:00:00Z",
            70.0,
        )]);
        let normalized = normalize_observations(&bundle, &ConceptConfig::default()).unwrap();
        assert!(normalized.heights.is_empty());
        assert!(normalized.weights.is_empty());
        assert_eq!(normalized.rejected[0].kind, MalformedKind::AmbiguousConcept);
        assert_eq!(normalized.rejected[0].id.as_deref(), Some("both"));
    }

    #[test]
    fn entries_without_resource_or_coding_are_reported() {
        let mut uncoded = obs("no-code", &[], "2024-01-01T00:00:00Z", 70.0);
        uncoded["resource"].as_object_mut().unwrap().remove("code");

        let bundle = bundle(vec![
            json!({ "fullUrl": "urn:uuid:orphan" }),
            uncoded,
            obs("w1", &[DEFAULT_WEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 70.0),
        ]);

        let normalized = normalize_observations(&bundle, &ConceptConfig::default()).unwrap();
        assert_eq!(normalized.weights.len(), 1);
        assert_eq!(normalized.rejected.len(), 2);
        assert_eq!(normalized.rejected[0].id, None);
        assert_eq!(
            normalized.rejected[0].kind,
            MalformedKind::MissingField("resource".into())
        );
        assert_eq!(normalized.rejected[1].id.as_deref(), Some("no-code"));
        assert_eq!(
            normalized.rejected[1].kind,
            MalformedKind::MissingField("code.coding".into())
        );
    }

    #[test]
    fn malformed_observations_are_skipped() {
        let mut missing_value = obs("w2", &[DEFAULT_WEIGHT_CONCEPT], "2024-01-02T00:00:00Z", 1.0);
        missing_value["resource"]
            .as_object_mut()
            .unwrap()
            .remove("valueQuantity");

        let bundle = bundle(vec![
            obs("w1", &[DEFAULT_WEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 70.0),
            missing_value,
            obs("w3", &[DEFAULT_WEIGHT_CONCEPT], "yesterday", 71.0),
            obs("h0", &[DEFAULT_HEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 0.0),
        ]);

        let normalized = normalize_observations(&bundle, &ConceptConfig::default()).unwrap();
        assert_eq!(normalized.weights.len(), 1);
        assert!(normalized.heights.is_empty());
        let kinds: Vec<_> = normalized.rejected.iter().map(|e| e.kind.clone()).collect();
        assert_eq!(
            kinds,
            vec![
                MalformedKind::MissingField("valueQuantity.value".into()),
                MalformedKind::InvalidValue("issued".into()),
                MalformedKind::InvalidValue("valueQuantity.value".into()),
            ]
        );
    }

    #[test]
    fn non_positive_weights_are_rejected_like_heights() {
        let bundle = bundle(vec![
            obs("w0", &[DEFAULT_WEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 0.0),
            obs("w-neg", &[DEFAULT_WEIGHT_CONCEPT], "2024-01-02T00:00:00Z", -3.5),
            obs("h1", &[DEFAULT_HEIGHT_CONCEPT], "2024-01-01T00:00:00Z", 175.0),
        ]);

        let normalized = normalize_observations(&bundle, &ConceptConfig::default()).unwrap();
        assert!(normalized.weights.is_empty());
        assert_eq!(normalized.heights.len(), 1);
        let rejected: Vec<_> = normalized
            .rejected
            .iter()
            .map(|e| (e.id.as_deref(), e.kind.clone()))
            .collect();
        assert_eq!(
            rejected,
            vec![
                (Some("w0"), MalformedKind::InvalidValue("valueQuantity.value".into())),
                (Some("w-neg"), MalformedKind::InvalidValue("valueQuantity.value".into())),
            ]
        );
    }
}
