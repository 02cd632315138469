use chrono::{Datelike, Days, NaiveDate};
use factor_core::{DailyReturn, PerformanceReport};
use std::collections::BTreeMap;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Compute performance statistics from a daily return series.
///
/// Returns are laid on consecutive calendar days from `start_date` when
/// bucketing them into months. An empty series has no statistics.
pub fn calculate_performance(
    daily_returns: &[DailyReturn],
    start_date: NaiveDate,
) -> Option<PerformanceReport> {
    if daily_returns.is_empty() {
        return None;
    }

    let n = daily_returns.len() as f64;
    let total_return: f64 = daily_returns.iter().sum();

    let growth = 1.0 + total_return;
    let annualized_return = if growth > 0.0 {
        growth.powf(TRADING_DAYS_PER_YEAR / n) - 1.0
    } else {
        // Wiped out: no real-valued annualization exists
        -1.0
    };

    let volatility = sample_std(daily_returns) * TRADING_DAYS_PER_YEAR.sqrt();
    let sharpe_ratio = if volatility != 0.0 {
        annualized_return / volatility
    } else {
        0.0
    };

    let report = PerformanceReport {
        total_return,
        annualized_return,
        volatility,
        sharpe_ratio,
        max_drawdown: max_drawdown(daily_returns),
        monthly_returns: monthly_returns(daily_returns, start_date),
    };

    tracing::debug!("Performance over {} days: {}", daily_returns.len(), report.summary());

    Some(report)
}

/// Sample standard deviation (n - 1); zero for fewer than two points
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }

    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);

    variance.sqrt()
}

/// Minimum of cumulative return minus its running maximum (<= 0)
fn max_drawdown(daily_returns: &[f64]) -> f64 {
    let mut cumulative = 0.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for r in daily_returns {
        cumulative += r;
        peak = peak.max(cumulative);
        worst = worst.min(cumulative - peak);
    }

    worst
}

/// Compounded return per calendar month, keyed by month-end date
fn monthly_returns(daily_returns: &[f64], start_date: NaiveDate) -> BTreeMap<String, f64> {
    let mut growth: BTreeMap<NaiveDate, f64> = BTreeMap::new();

    for (offset, r) in daily_returns.iter().enumerate() {
        let Some(date) = start_date.checked_add_days(Days::new(offset as u64)) else {
            break;
        };
        let Some(month_end) = month_end(date) else {
            break;
        };
        *growth.entry(month_end).or_insert(1.0) *= 1.0 + r;
    }

    growth
        .into_iter()
        .map(|(date, g)| (date.format("%Y-%m-%d").to_string(), g - 1.0))
        .collect()
}

fn month_end(date: NaiveDate) -> Option<NaiveDate> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };

    NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()
}
