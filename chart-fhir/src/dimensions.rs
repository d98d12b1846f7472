use chrono::{DateTime, Utc};

use chart_core::{DimensionRecord, JoinKey, Observation};

/// Join heights and weights into one record per distinct join key, latest first.
///
/// When several observations of one kind share a key, the first in input
/// order wins; nothing is averaged.
pub fn merge_dimensions(
    heights: &[Observation],
    weights: &[Observation],
    join_key: JoinKey,
    bmi_decimals: u8,
) -> Vec<DimensionRecord> {
    let mut keys: Vec<DateTime<Utc>> = weights
        .iter()
        .chain(heights)
        .map(|obs| join_key.key_for(obs.issued))
        .collect();
    keys.sort_by(|a, b| b.cmp(a));
    keys.dedup();

    keys.into_iter()
        .map(|key| {
            let first_at = |series: &[Observation]| {
                series
                    .iter()
                    .find(|obs| join_key.key_for(obs.issued) == key)
                    .cloned()
            };
            DimensionRecord::new(key, first_at(weights), first_at(heights), bmi_decimals)
        })
        .collect()
}
