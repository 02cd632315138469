//! Quantile grouping of stocks by factor value and per-group return series.

use std::collections::BTreeMap;

pub const LONG_SHORT: &str = "Long_Short";

/// Assign each stock to a quantile group `1..=groups` by factor value.
///
/// Bin edges are the linearly interpolated `i / groups` quantiles; a value
/// falls in the first bin whose upper edge is `>=` the value. Non-finite
/// values are left ungrouped.
pub fn categorize(values: &BTreeMap<String, f64>, groups: usize) -> BTreeMap<String, usize> {
    let mut sorted: Vec<f64> = values.values().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() || groups == 0 {
        return BTreeMap::new();
    }
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let edges: Vec<f64> = (1..groups)
        .map(|i| quantile(&sorted, i as f64 / groups as f64))
        .collect();

    values
        .iter()
        .filter(|(_, v)| v.is_finite())
        .map(|(stock, &v)| {
            let group = edges.iter().position(|&edge| v <= edge).unwrap_or(edges.len()) + 1;
            (stock.clone(), group)
        })
        .collect()
}

/// Equal-weight mean return per group for every date, plus a
/// `Long_Short` column (group 1 minus the highest group) when both exist.
///
/// `returns` maps date → (stock → return). Stocks missing on a date are
/// skipped for that date.
pub fn group_returns(
    returns: &BTreeMap<String, BTreeMap<String, f64>>,
    grouping: &BTreeMap<String, usize>,
) -> BTreeMap<String, BTreeMap<String, f64>> {
    let Some(&top_group) = grouping.values().max() else {
        return BTreeMap::new();
    };

    let mut members: BTreeMap<usize, Vec<&String>> = BTreeMap::new();
    for (stock, group) in grouping {
        members.entry(*group).or_default().push(stock);
    }

    returns
        .iter()
        .map(|(date, row)| {
            let mut columns = BTreeMap::new();

            for (group, stocks) in &members {
                let present: Vec<f64> = stocks.iter().filter_map(|s| row.get(*s).copied()).collect();
                if !present.is_empty() {
                    let mean = present.iter().sum::<f64>() / present.len() as f64;
                    columns.insert(group_column(*group), mean);
                }
            }

            if let (Some(low), Some(high)) = (
                columns.get(&group_column(1)).copied(),
                columns.get(&group_column(top_group)).copied(),
            ) {
                columns.insert(LONG_SHORT.to_string(), low - high);
            }

            (date.clone(), columns)
        })
        .collect()
}

pub fn group_column(group: usize) -> String {
    format!("Group_{}", group)
}

/// Linear-interpolated quantile of sorted data
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    sorted[lower] + (sorted[upper] - sorted[lower]) * (pos - lower as f64)
}
