use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Performance statistics of one backtest run.
///
/// Created once from the daily return series and never modified after it has
/// been saved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceReport {
    pub total_return: f64,
    pub annualized_return: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,

    /// Month-end date (`YYYY-MM-DD`) → compounded return of that month
    pub monthly_returns: BTreeMap<String, f64>,
}

impl PerformanceReport {
    /// One-line summary for logs and terminal output
    pub fn summary(&self) -> String {
        format!(
            "total={:.4}, annualized={:.4}, volatility={:.4}, sharpe={:.4}, max_drawdown={:.4}",
            self.total_return,
            self.annualized_return,
            self.volatility,
            self.sharpe_ratio,
            self.max_drawdown
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_format() {
        let report = PerformanceReport {
            total_return: 0.12346,
            annualized_return: 0.1,
            volatility: 0.2,
            sharpe_ratio: 0.5,
            max_drawdown: -0.05,
            monthly_returns: BTreeMap::new(),
        };

        assert_eq!(
            report.summary(),
            "total=0.1235, annualized=0.1000, volatility=0.2000, sharpe=0.5000, max_drawdown=-0.0500"
        );
    }
}
