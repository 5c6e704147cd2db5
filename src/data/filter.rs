use std::collections::{BTreeMap, BTreeSet};

use super::model::{MetadataValue, RecordSet};

// ---------------------------------------------------------------------------
// Filter predicate: which unique values are selected per column
// ---------------------------------------------------------------------------

/// Per-column selection state: maps column_name → set of selected values.
/// If a column is absent it means "no filter" (keep all).
pub type FilterState = BTreeMap<String, BTreeSet<MetadataValue>>;

/// Initialise a [`FilterState`] with all values selected.
pub fn init_filter_state(set: &RecordSet) -> FilterState {
    set.unique_values
        .iter()
        .map(|(col, vals)| (col.clone(), vals.clone()))
        .collect()
}

/// Build a [`FilterState`] from `column=value` selectors. Repeating a column
/// selects several values for it.
pub fn parse_selectors<S: AsRef<str>>(selectors: &[S]) -> Result<FilterState, String> {
    let mut state = FilterState::new();
    for sel in selectors {
        let sel = sel.as_ref();
        let (col, value) = sel
            .split_once('=')
            .ok_or_else(|| format!("selector '{sel}' is not column=value"))?;
        state
            .entry(col.trim().to_string())
            .or_default()
            .insert(MetadataValue::guess(value.trim()));
    }
    Ok(state)
}

/// Return indices of records that pass all active filters.
///
/// A record passes a column filter when:
/// * The column is not present in `filters` → passes (no constraint)
/// * The filter set for that column is empty → nothing selected → fails
/// * The record's value for that column is in the selected set → passes
pub fn filtered_indices(set: &RecordSet, filters: &FilterState) -> Vec<usize> {
    set.records
        .iter()
        .enumerate()
        .filter(|(_, rec)| {
            let metadata = rec.metadata();
            for (col, selected) in filters {
                if selected.is_empty() {
                    return false;
                }
                if let Some(all_vals) = set.unique_values.get(col) {
                    if selected.len() == all_vals.len() && selected.is_superset(all_vals) {
                        continue;
                    }
                }
                let value = metadata.get(col).unwrap_or(&MetadataValue::Null);
                if !selected.contains(value) {
                    return false;
                }
            }
            true
        })
        .map(|(i, _)| i)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::filename::parse;

    fn set() -> RecordSet {
        RecordSet::from_records(
            [
                "SPCM_W1_D1_die1_C1_A_25C_rep1_ch_1_2_0dBm.csv",
                "SPCM_W1_D1_die2_C1_A_25C_rep1_ch_1_2_0dBm.csv",
                "DCIV_W1_D1_die2_C1_A_85C_rep1_ch_1_2_0dBm.csv",
            ]
            .iter()
            .map(|n| parse(n).unwrap())
            .collect(),
        )
    }

    #[test]
    fn selects_by_column_values() {
        let set = set();
        let filters = parse_selectors(&["datatype=SPCM", "die=2"]).unwrap();
        assert_eq!(filtered_indices(&set, &filters), vec![1]);

        let filters = parse_selectors(&["temperature=25", "temperature=85"]).unwrap();
        assert_eq!(filtered_indices(&set, &filters), vec![0, 1, 2]);
    }

    #[test]
    fn full_and_empty_selections() {
        let set = set();
        let mut filters = init_filter_state(&set);
        assert_eq!(filtered_indices(&set, &filters).len(), 3);

        filters.insert("die".into(), BTreeSet::new());
        assert!(filtered_indices(&set, &filters).is_empty());
    }

    #[test]
    fn legacy_records_have_null_subdie() {
        let set = set();
        let filters = parse_selectors(&["subdie=1"]).unwrap();
        assert!(filtered_indices(&set, &filters).is_empty());
        assert!(parse_selectors(&["die"]).is_err());
    }
}
