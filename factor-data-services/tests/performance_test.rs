/// Performance calculation tests on realistic return series
use chrono::NaiveDate;
use factor_data_services::calculate_performance;

fn start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2018, 1, 1).unwrap()
}

#[test]
fn test_flat_series_has_no_risk() {
    for days in [1, 5, 252, 1000] {
        let report = calculate_performance(&vec![0.0; days], start()).unwrap();
        assert_eq!(report.total_return, 0.0);
        assert_eq!(report.sharpe_ratio, 0.0);
        assert_eq!(report.max_drawdown, 0.0);
    }
}

#[test]
fn test_constant_positive_returns() {
    let report = calculate_performance(&[0.001; 252], start()).unwrap();

    assert!((report.total_return - 0.252).abs() < 1e-9);
    assert!((report.annualized_return - 0.252).abs() < 1e-9);
    assert!(report.volatility.abs() < 1e-12);
    assert_eq!(report.max_drawdown, 0.0);
}

#[test]
fn test_monthly_returns_cover_every_month() {
    // 2018-01-01 + 59 days reaches 2018-03-01
    let report = calculate_performance(&[0.01; 60], start()).unwrap();
    let months: Vec<&String> = report.monthly_returns.keys().collect();

    assert_eq!(months, vec!["2018-01-31", "2018-02-28", "2018-03-31"]);
    let january = 1.01_f64.powi(31) - 1.0;
    assert!((report.monthly_returns["2018-01-31"] - january).abs() < 1e-12);
}

#[test]
fn test_drawdown_is_non_positive() {
    let returns = [0.02, -0.01, -0.03, 0.01, 0.04, -0.02];
    let report = calculate_performance(&returns, start()).unwrap();

    assert!(report.max_drawdown <= 0.0);
    assert!((report.max_drawdown + 0.04).abs() < 1e-12);
}
