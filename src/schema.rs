use std::collections::{BTreeSet, HashSet};

use crate::error::MissingColumns;

/// Exact, case-sensitive membership check of `required_columns` in `dataset_columns`.
pub fn validate<D, R, S, T>(dataset_columns: D, required_columns: R) -> Result<(), MissingColumns>
where
    D: IntoIterator<Item = S>,
    R: IntoIterator<Item = T>,
    S: AsRef<str>,
    T: AsRef<str>,
{
    let present: HashSet<String> = dataset_columns
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .collect();
    let missing: BTreeSet<String> = required_columns
        .into_iter()
        .map(|c| c.as_ref().to_string())
        .filter(|c| !present.contains(c))
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(MissingColumns { missing })
    }
}
