use serde::{Deserialize, Serialize};

/// How to choose among variants that share the minimum assignment count.
///
/// Tied variants are always listed in the order the counts were given, which
/// for [`common_types::Variant`] is declaration order.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Serialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TieBreak {
    /// `ties[tie_seed % ties.len()]`, with a fresh random seed per call.
    #[default]
    Random,
    /// `ties[total_assigned % ties.len()]`. Deterministic for given counts.
    Rotation,
}

/// Picks the least assigned entry of `counts`.
///
/// Returns `None` only when `counts` is empty. Must stay in sync with the
/// selection done by the redis assignment script.
pub fn pick_least_assigned<V: Copy>(
    counts: &[(V, i64)],
    tie_break: TieBreak,
    tie_seed: u32,
) -> Option<V> {
    let min = counts.iter().map(|(_, count)| *count).min()?;
    let ties: Vec<V> = counts
        .iter()
        .filter(|(_, count)| *count == min)
        .map(|(variant, _)| *variant)
        .collect();

    let index = match tie_break {
        TieBreak::Random => tie_seed as usize % ties.len(),
        TieBreak::Rotation => {
            let total: i64 = counts.iter().map(|(_, count)| *count).sum();
            total.rem_euclid(ties.len() as i64) as usize
        }
    };

    Some(ties[index])
}
