//! Presentation view models: pagination, previews, widget state and rows.

use serde::{Deserialize, Serialize};

use crate::{
    AllergyRecord, DimensionRecord, DimensionSeries, NormalizedObservations, Projection, EM_DASH,
};

/// Page sizes offered by the chart paginator.
pub const PAGE_SIZES: [usize; 5] = [5, 10, 15, 20, 25];

pub const EMPTY_ALLERGY_MESSAGE: &str = "The patient's allergy history is not documented.";
pub const EMPTY_ALLERGY_ACTION: &str = "Add allergy history";

/// One page of a longer list. `page_number` is 1-based.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page_number: usize,
    pub page_size: usize,
    pub total_items: usize,
    pub total_pages: usize,
}

impl<T: Clone> Page<T> {
    pub fn new(all: &[T], page_number: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(page_size).max(1);
        let page_number = page_number.clamp(1, total_pages);
        let start = (page_number - 1) * page_size;
        let end = (start + page_size).min(total_items);

        Self {
            items: all.get(start..end).map(<[T]>::to_vec).unwrap_or_default(),
            page_number,
            page_size,
            total_items,
            total_pages,
        }
    }
}

impl<T> Page<T> {
    pub fn has_next(&self) -> bool {
        self.page_number < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.page_number > 1
    }

    /// `<items shown so far> / <total>`.
    pub fn label(&self) -> String {
        let shown = (self.page_number - 1) * self.page_size + self.items.len();
        format!("{shown} / {}", self.total_items)
    }
}

/// The first few rows of a card, with a "see all" affordance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preview<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub see_all: bool,
}

impl<T: Clone> Preview<T> {
    /// `expanded` shows every row, as after clicking "see all".
    pub fn new(all: &[T], limit: usize, expanded: bool) -> Self {
        let shown = if expanded { all.len() } else { limit.min(all.len()) };
        Self {
            items: all[..shown].to_vec(),
            total: all.len(),
            see_all: shown < all.len(),
        }
    }
}

impl<T> Preview<T> {
    pub fn label(&self) -> String {
        format!("{} / {}", self.items.len(), self.total)
    }
}

/// Data that can render as an explicit "nothing recorded" state.
pub trait ViewData {
    fn has_data(&self) -> bool;
}

impl<T> ViewData for Vec<T> {
    fn has_data(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> ViewData for Projection<T> {
    fn has_data(&self) -> bool {
        !self.records.is_empty()
    }
}

impl ViewData for DimensionSeries {
    fn has_data(&self) -> bool {
        !self.records.is_empty()
    }
}

impl ViewData for NormalizedObservations {
    fn has_data(&self) -> bool {
        !self.heights.is_empty() || !self.weights.is_empty()
    }
}

/// What a widget shows. `Failed` replaces an indefinite loading skeleton.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "state", content = "data", rename_all = "snake_case")]
pub enum WidgetState<T> {
    #[default]
    Loading,
    Empty,
    Ready(T),
    Failed(String),
}

impl<T: ViewData> WidgetState<T> {
    pub fn from_data(data: T) -> Self {
        if data.has_data() {
            WidgetState::Ready(data)
        } else {
            WidgetState::Empty
        }
    }
}

impl<T> WidgetState<T> {
    pub fn is_loading(&self) -> bool {
        matches!(self, WidgetState::Loading)
    }

    pub fn data(&self) -> Option<&T> {
        match self {
            WidgetState::Ready(data) => Some(data),
            _ => None,
        }
    }
}

/// Row of the biometrics table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BiometricRow {
    pub id: i64,
    pub date: String,
    pub weight: Option<f64>,
    pub height: Option<f64>,
    pub bmi: Option<f64>,
}

impl From<&DimensionRecord> for BiometricRow {
    fn from(record: &DimensionRecord) -> Self {
        Self {
            id: record.id,
            date: record.date.format("%d - %b - %Y").to_string(),
            weight: record.weight,
            height: record.height,
            bmi: record.bmi,
        }
    }
}

impl BiometricRow {
    pub fn cells(&self) -> [String; 4] {
        let cell = |value: Option<f64>| {
            value
                .map(|v| v.to_string())
                .unwrap_or_else(|| EM_DASH.to_string())
        };
        [
            self.date.clone(),
            cell(self.weight),
            cell(self.height),
            cell(self.bmi),
        ]
    }
}

/// Row of the detailed allergies table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllergyRow {
    pub id: String,
    pub allergen: String,
    pub criticality: String,
    /// High criticality rows are emphasised.
    pub highlighted: bool,
    pub manifestations: String,
    pub note: Option<String>,
    pub since: String,
    pub updated: String,
}

impl From<&AllergyRecord> for AllergyRow {
    fn from(record: &AllergyRecord) -> Self {
        Self {
            id: record.id.clone(),
            allergen: record.allergen_text.clone(),
            criticality: record.criticality.display_label().to_string(),
            highlighted: record.criticality.is_high(),
            manifestations: record.manifestation_text(),
            note: record.note.clone(),
            since: record.since_label(),
            updated: record.updated_label(),
        }
    }
}

/// Allergies card content: either rows or the empty state with its call to action.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllergyOverview {
    Empty { message: String, action: String },
    Rows { rows: Vec<AllergyRow> },
}

impl AllergyOverview {
    pub fn from_records(records: &[AllergyRecord]) -> Self {
        if records.is_empty() {
            AllergyOverview::Empty {
                message: EMPTY_ALLERGY_MESSAGE.to_string(),
                action: EMPTY_ALLERGY_ACTION.to_string(),
            }
        } else {
            AllergyOverview::Rows {
                rows: records.iter().map(AllergyRow::from).collect(),
            }
        }
    }
}
