use vicsek_core::{SimError, SimResult};

/// Partially orders `values` so that index `k` holds the k-th smallest value
/// (0-indexed), everything before it is `<=` and everything after it is `>=`.
/// Returns that value.
///
/// Runs in expected linear time and never fully sorts. The input is reordered
/// in place.
pub fn quickselect(values: &mut [f64], k: usize) -> SimResult<f64> {
    if values.is_empty() {
        return Err(SimError::EmptyPopulation);
    }
    if k >= values.len() {
        return Err(SimError::invalid(format!(
            "selection index {} out of range for {} values",
            k,
            values.len()
        )));
    }
    let (_, kth, _) = values.select_nth_unstable_by(k, f64::total_cmp);
    Ok(*kth)
}
