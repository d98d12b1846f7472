//! JavaScript bridge for the chart projections.

use chart_core::{
    AllergyOverview, BiometricRow, ChartConfig, ChartError, JoinKey, MalformedRecordError,
    Preview,
};
use serde::{Deserialize, Serialize};
use serde_wasm_bindgen::{from_value, to_value};
use wasm_bindgen::prelude::*;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsConcepts {
    #[serde(default)]
    weight_uuid: Option<String>,
    #[serde(default)]
    height_uuid: Option<String>,
}

/// Partial config from JS; unset fields keep their defaults.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsChartConfig {
    #[serde(default)]
    concepts: Option<JsConcepts>,
    #[serde(default)]
    join_key: Option<JoinKey>,
    #[serde(default)]
    bmi_decimals: Option<u8>,
    #[serde(default)]
    biometrics_preview: Option<usize>,
}

impl TryFrom<JsChartConfig> for ChartConfig {
    type Error = ChartError;

    fn try_from(cfg: JsChartConfig) -> Result<Self, Self::Error> {
        let mut base = ChartConfig::default();
        if let Some(concepts) = cfg.concepts {
            if let Some(uuid) = concepts.weight_uuid {
                base.concepts.weight_uuid = uuid;
            }
            if let Some(uuid) = concepts.height_uuid {
                base.concepts.height_uuid = uuid;
            }
        }
        if let Some(join_key) = cfg.join_key {
            base.join_key = join_key;
        }
        if let Some(decimals) = cfg.bmi_decimals {
            base.bmi_decimals = decimals;
        }
        if let Some(preview) = cfg.biometrics_preview {
            base.biometrics_preview = preview;
        }
        base.validate()?;
        Ok(base)
    }
}

#[derive(Serialize)]
struct BiometricsView {
    rows: Vec<BiometricRow>,
    preview: Preview<BiometricRow>,
    rejected: Vec<MalformedRecordError>,
}

#[derive(Serialize)]
struct AllergiesView {
    overview: AllergyOverview,
    rejected: Vec<MalformedRecordError>,
}

fn js_error(context: &str, err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&format!("{context}: {err}"))
}

fn read_json(value: JsValue) -> Result<serde_json::Value, JsValue> {
    #[cfg(target_arch = "wasm32")]
    console_error_panic_hook::set_once();

    from_value::<serde_json::Value>(value)
        .map_err(|err| js_error("could not read JSON input", err))
}

fn read_config(config: Option<JsValue>) -> Result<ChartConfig, JsValue> {
    let Some(js_cfg) = config else {
        return Ok(ChartConfig::default());
    };
    let cfg: JsChartConfig =
        from_value(js_cfg).map_err(|err| js_error("could not read config", err))?;
    ChartConfig::try_from(cfg).map_err(|err| js_error("chart error", err))
}

/// Biometrics rows from an Observation bundle.
#[wasm_bindgen]
pub fn summarize_dimensions(bundle: JsValue, config: Option<JsValue>) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle)?;
    let cfg = read_config(config)?;

    let series = chart_fhir::summarize_dimensions(&bundle, &cfg)
        .map_err(|err| js_error("chart error", err))?;
    let rows: Vec<BiometricRow> = series.records.iter().map(BiometricRow::from).collect();
    let view = BiometricsView {
        preview: Preview::new(&rows, cfg.biometrics_preview, false),
        rows,
        rejected: series.rejected,
    };

    to_value(&view).map_err(|err| js_error("could not serialize biometrics", err))
}

/// Allergy rows, or the empty state, from an AllergyIntolerance bundle.
#[wasm_bindgen]
pub fn project_allergies(bundle: JsValue) -> Result<JsValue, JsValue> {
    let bundle = read_json(bundle)?;
    let projection =
        chart_fhir::project_allergies(&bundle).map_err(|err| js_error("chart error", err))?;
    let view = AllergiesView {
        overview: AllergyOverview::from_records(&projection.records),
        rejected: projection.rejected,
    };

    to_value(&view).map_err(|err| js_error("could not serialize allergies", err))
}

/// Diagnosis candidates from a diagnosis search response.
#[wasm_bindgen]
pub fn resolve_diagnoses(results: JsValue) -> Result<JsValue, JsValue> {
    let results = read_json(results)?;
    let projection =
        chart_fhir::resolve_diagnoses(&results).map_err(|err| js_error("chart error", err))?;

    to_value(&projection).map_err(|err| js_error("could not serialize diagnoses", err))
}
