use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chart_client::{
    CancellationToken, ChartClient, ClientError, FetchGateway, GatewayRequest, GatewayResponse,
    Method,
};
use chart_core::{
    AllergyFormState, ChartConfig, ChartError, DiagnosisCandidate, PatientContext, VisitNoteDraft,
    DEFAULT_HEIGHT_CONCEPT, DEFAULT_WEIGHT_CONCEPT,
};
use chrono::{TimeZone, Utc};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

/// Serves canned bodies by path and records every request it sees.
#[derive(Default)]
struct FakeGateway {
    responses: Mutex<HashMap<String, Value>>,
    requests: Mutex<Vec<GatewayRequest>>,
}

impl FakeGateway {
    fn respond(self, path: &str, body: Value) -> Self {
        self.responses.lock().unwrap().insert(path.to_string(), body);
        self
    }

    fn requests(&self) -> Vec<GatewayRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl FetchGateway for FakeGateway {
    async fn fetch(
        &self,
        request: GatewayRequest,
        cancel: &CancellationToken,
    ) -> Result<GatewayResponse, ClientError> {
        cancel.check()?;
        self.requests.lock().unwrap().push(request.clone());
        match self.responses.lock().unwrap().get(&request.path) {
            Some(body) => Ok(GatewayResponse {
                status: 200,
                body: body.clone(),
            }),
            None => Err(ClientError::Status {
                status: 404,
                path: request.path,
                body: String::new(),
            }),
        }
    }
}

fn patient() -> PatientContext {
    PatientContext::new("p-uuid", "100GEJ")
}

fn client(gateway: FakeGateway) -> ChartClient<FakeGateway> {
    ChartClient::new(gateway, ChartConfig::default()).expect("default config is valid")
}

fn observation(id: &str, code: &str, issued: &str, value: f64) -> Value {
    json!({
        "resource": {
            "resourceType": "Observation",
            "id": id,
            "code": { "coding": [{ "code": code }] },
            "issued": issued,
            "valueQuantity": { "value": value }
        }
    })
}

fn penicillin_form() -> AllergyFormState {
    AllergyFormState {
        allergen_type: "DRUG".into(),
        coded_allergen_uuid: "penicillin-uuid".into(),
        severity_uuid: "severe-uuid".into(),
        comment: "seen in ER".into(),
        reaction_uuids: vec!["rash-uuid".into()],
    }
}

#[tokio::test]
async fn dimensions_query_configured_concepts_and_merge() {
    let bundle = json!({
        "resourceType": "Bundle",
        "entry": [
            observation("w", DEFAULT_WEIGHT_CONCEPT, "2024-01-01T00:00:00Z", 70.0),
            observation("h", DEFAULT_HEIGHT_CONCEPT, "2024-01-01T00:00:00Z", 175.0)
        ]
    });
    let client = client(FakeGateway::default().respond("/ws/fhir2/R4/Observation", bundle));

    let series = client
        .dimensions(&patient(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(series.records.len(), 1);
    assert_eq!(series.records[0].bmi, Some(22.86));

    let requests = client.gateway().requests();
    assert_eq!(requests[0].method, Method::Get);
    assert_eq!(
        requests[0].query,
        vec![
            ("subject:Patient".to_string(), "p-uuid".to_string()),
            (
                "code".to_string(),
                format!("{DEFAULT_WEIGHT_CONCEPT},{DEFAULT_HEIGHT_CONCEPT}")
            ),
        ]
    );
}

#[tokio::test]
async fn allergies_are_searched_by_identifier() {
    let bundle = json!({ "resourceType": "Bundle", "total": 0 });
    let client = client(FakeGateway::default().respond("/ws/fhir2/R4/AllergyIntolerance", bundle));

    let projection = client
        .allergies(&patient(), &CancellationToken::new())
        .await
        .unwrap();
    assert!(projection.is_empty());
    assert_eq!(
        client.gateway().requests()[0].query,
        vec![("patient.identifier".to_string(), "100GEJ".to_string())]
    );
}

#[tokio::test]
async fn allergy_writes_hit_collection_and_item_paths() {
    let gateway = FakeGateway::default()
        .respond("/ws/rest/v1/patient/p-uuid/allergy", json!({ "uuid": "al-1" }))
        .respond("/ws/rest/v1/patient/p-uuid/allergy/al-1", Value::Null);
    let client = client(gateway);
    let cancel = CancellationToken::new();
    let form = penicillin_form();

    client.create_allergy("p-uuid", &form, &cancel).await.unwrap();
    client
        .update_allergy("p-uuid", "al-1", &form, &cancel)
        .await
        .unwrap();
    client.delete_allergy("p-uuid", "al-1", &cancel).await.unwrap();

    let requests = client.gateway().requests();
    let expected_body = json!({
        "allergen": {
            "allergenType": "DRUG",
            "codedAllergen": { "uuid": "penicillin-uuid" }
        },
        "severity": { "uuid": "severe-uuid" },
        "comment": "seen in ER",
        "reactions": [{ "reaction": { "uuid": "rash-uuid" } }]
    });

    assert_eq!(requests[0].method, Method::Post);
    assert_eq!(requests[0].path, "/ws/rest/v1/patient/p-uuid/allergy");
    assert_eq!(requests[0].body, Some(expected_body.clone()));
    assert_eq!(requests[1].method, Method::Post);
    assert_eq!(requests[1].path, "/ws/rest/v1/patient/p-uuid/allergy/al-1");
    assert_eq!(requests[1].body, Some(expected_body));
    assert_eq!(requests[2].method, Method::Delete);
    assert_eq!(requests[2].body, None);
}

#[tokio::test]
async fn invalid_form_never_reaches_gateway() {
    let client = client(FakeGateway::default());
    let form = AllergyFormState {
        severity_uuid: String::new(),
        ..penicillin_form()
    };

    let err = client
        .create_allergy("p-uuid", &form, &CancellationToken::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Payload(ChartError::InvalidForm(_))));
    assert!(client.gateway().requests().is_empty());
}

#[tokio::test]
async fn cancelled_token_skips_dispatch() {
    let client = client(FakeGateway::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = client
        .delete_allergy("p-uuid", "al-1", &cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
    assert!(client.gateway().requests().is_empty());
}

#[tokio::test]
async fn blank_diagnosis_term_issues_no_request() {
    let client = client(FakeGateway::default());
    let projection = client
        .search_diagnoses("   ", &CancellationToken::new())
        .await
        .unwrap();
    assert!(projection.is_empty());
    assert!(client.gateway().requests().is_empty());
}

#[tokio::test]
async fn diagnosis_search_resolves_reference_terms() {
    let hits = json!([{
        "concept": {
            "id": 116128,
            "uuid": "116128AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            "preferredName": "Malaria",
            "conceptMappings": [{
                "conceptReferenceTerm": { "code": "B54", "conceptSource": { "name": "ICD-10-WHO" } }
            }]
        }
    }]);
    let client = client(FakeGateway::default().respond("/coreapps/diagnoses/search.action", hits));

    let projection = client
        .search_diagnoses("malaria", &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(
        projection.records[0].reference_term_code.as_deref(),
        Some("B54")
    );
    assert_eq!(
        client.gateway().requests()[0].query,
        vec![("term".to_string(), "malaria".to_string())]
    );
}

#[tokio::test]
async fn lookups_project_rest_results() {
    let gateway = FakeGateway::default()
        .respond(
            "/ws/rest/v1/provider",
            json!({ "results": [
                { "uuid": "prov-1", "person": { "uuid": "person-1", "display": "Dr. Nyambura" } },
                { "display": "no uuid" }
            ]}),
        )
        .respond(
            "/ws/rest/v1/location",
            json!({ "results": [{ "uuid": "loc-1", "display": "Outpatient Clinic" }] }),
        )
        .respond(
            "/ws/rest/v1/concept/162555AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA",
            json!({ "uuid": "162555AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA", "setMembers": [
                { "uuid": "rash-uuid", "display": "Rash" },
                { "uuid": "hives-uuid", "display": "Hives" }
            ]}),
        )
        .respond(
            "/ws/rest/v1/appui/session",
            json!({
                "authenticated": true,
                "user": { "uuid": "user-1", "display": "admin" },
                "currentProvider": { "uuid": "prov-1" },
                "sessionLocation": { "uuid": "loc-1", "display": "Outpatient Clinic" }
            }),
        );
    let client = client(gateway);
    let cancel = CancellationToken::new();

    let providers = client.providers(&cancel).await.unwrap();
    assert_eq!(providers.len(), 1);
    assert_eq!(providers[0].display, "Dr. Nyambura");
    assert_eq!(providers[0].person_uuid.as_deref(), Some("person-1"));

    let locations = client.locations(&cancel).await.unwrap();
    assert_eq!(locations[0].display, "Outpatient Clinic");

    let reactions = client.allergy_reactions(&cancel).await.unwrap();
    let names: Vec<_> = reactions.iter().map(|r| r.display.as_str()).collect();
    assert_eq!(names, vec!["Rash", "Hives"]);

    let session = client.session(&cancel).await.unwrap();
    assert!(session.authenticated);
    assert_eq!(session.provider_uuid.as_deref(), Some("prov-1"));
    assert_eq!(session.location_uuid.as_deref(), Some("loc-1"));
}

#[tokio::test]
async fn visit_note_is_posted_as_encounter() {
    let client = client(FakeGateway::default().respond("/ws/rest/v1/encounter", json!({})));
    let draft = VisitNoteDraft {
        patient_uuid: "p-uuid".into(),
        location_uuid: "loc-1".into(),
        provider_uuid: "prov-1".into(),
        encounter_datetime: Utc.with_ymd_and_hms(2024, 5, 2, 10, 30, 0).unwrap(),
        note: "Fever for three days.".into(),
        diagnoses: vec![DiagnosisCandidate {
            concept_id: "116128".into(),
            concept_uuid: "116128AAAAAAAAAAAAAAAAAAAAAAAAAAAAAA".into(),
            preferred_name: "Malaria".into(),
            reference_term_code: Some("B54".into()),
            primary: true,
            confirmed: false,
        }],
    };

    client
        .save_visit_note(&draft, &CancellationToken::new())
        .await
        .unwrap();

    let request = &client.gateway().requests()[0];
    let body = request.body.as_ref().unwrap();
    assert_eq!(body["patient"], "p-uuid");
    assert_eq!(body["encounterDatetime"], "2024-05-02T10:30:00.000+0000");
    assert_eq!(body["obs"].as_array().unwrap().len(), 2);
    assert_eq!(body["encounterProviders"][0]["provider"], "prov-1");
}

#[tokio::test]
async fn missing_resource_surfaces_status() {
    let client = client(FakeGateway::default());
    let err = client
        .locations(&CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ClientError::Status { status, path, .. } => {
            assert_eq!(status, 404);
            assert_eq!(path, "/ws/rest/v1/location");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn invalid_config_is_rejected_up_front() {
    let config = ChartConfig {
        bmi_decimals: 9,
        ..ChartConfig::default()
    };
    assert!(matches!(
        ChartClient::new(FakeGateway::default(), config),
        Err(ChartError::InvalidConfig(_))
    ));

    let mut config = ChartConfig::default();
    config.concepts.height_uuid = config.concepts.weight_uuid.clone();
    assert!(matches!(
        ChartClient::new(FakeGateway::default(), config),
        Err(ChartError::InvalidConfig(_))
    ));
}
