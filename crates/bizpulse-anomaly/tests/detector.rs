use bizpulse_anomaly::{
    detect_anomalies, AnomalyDetector, AnomalyError, DetectionOutcome, Method, Severity, Table,
    MAX_DETAILS,
};
use serde_json::json;

/// Deterministic values spread around 100 with a single 50x spike.
fn sales_with_spike(n: usize, spike_at: usize) -> Table {
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            if i == spike_at {
                5000.0
            } else {
                #[allow(clippy::cast_precision_loss)]
                let x = i as f64;
                100.0 + 8.0 * (x * 1.7).sin() + 4.0 * (x * 0.3).cos()
            }
        })
        .map(|v| vec![v])
        .collect();
    Table::from_numeric(&["sales"], &rows)
}

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

fn single(outcome: DetectionOutcome) -> bizpulse_anomaly::AnomalyReport {
    match outcome {
        DetectionOutcome::Single(report) => report,
        DetectionOutcome::Ensemble(_) => panic!("expected a single report"),
    }
}

#[test]
fn extreme_outlier_is_reported_by_every_method() {
    let table = sales_with_spike(60, 37);
    for method in ["isolation_forest", "multivariate", "lof"] {
        let report = single(detect_anomalies(&table, &cols(&["sales"]), method, 0.02).unwrap());
        assert!(
            report.anomaly_details.iter().any(|d| d.index == 37),
            "{method} missed the spike"
        );
        assert_eq!(report.total_records, 60);
    }
}

#[test]
fn isolation_forest_bands_the_spike_as_critical() {
    let table = sales_with_spike(60, 5);
    let report = single(detect_anomalies(&table, &cols(&["sales"]), "isolation_forest", 0.05).unwrap());

    let spike = report.anomaly_details.iter().find(|d| d.index == 5).unwrap();
    assert_eq!(spike.severity, Some(Severity::Critical));
    assert_eq!(report.severity_distribution.total(), report.total_anomalies);
    assert_eq!(report.model_parameters.n_estimators, Some(100));
    assert_eq!(report.model_parameters.max_samples, Some(60));

    let stats = &report.column_statistics["sales"];
    assert_eq!(stats.max_anomaly_value, Some(5000.0));
    assert!(stats.normal_mean.unwrap() < 120.0);
}

#[test]
fn non_forest_methods_carry_no_severity() {
    let table = sales_with_spike(40, 0);
    let report = single(detect_anomalies(&table, &cols(&["sales"]), "lof", 0.05).unwrap());
    assert!(report.anomaly_details.iter().all(|d| d.severity.is_none()));
    assert_eq!(report.severity_distribution.total(), 0);
    assert_eq!(report.model_parameters.n_neighbors, Some(20));
}

#[test]
fn rejects_invalid_parameters() {
    let table = sales_with_spike(30, 0);
    let sales = cols(&["sales"]);

    for contamination in [0.0, 0.51, -0.1, f64::NAN] {
        let err = detect_anomalies(&table, &sales, "isolation_forest", contamination).unwrap_err();
        assert!(matches!(err, AnomalyError::Validation(_)));
    }

    let err = detect_anomalies(&table, &sales, "kmeans", 0.1).unwrap_err();
    assert!(err.to_string().contains("unknown method"));

    let err = detect_anomalies(&table, &cols(&["missing"]), "isolation_forest", 0.1).unwrap_err();
    assert!(matches!(err, AnomalyError::Validation(_)));
}

#[test]
fn requires_minimum_clean_rows() {
    let table = Table::from_json(&json!([
        {"v": 1}, {"v": 2}, {"v": 3}, {"v": null}, {"v": "x"},
        {"v": 4}, {"v": 5}, {"v": 6}, {"v": 7}, {"v": 8}, {"v": 9}
    ]))
    .unwrap();
    let err = detect_anomalies(&table, &cols(&["v"]), "isolation_forest", 0.1).unwrap_err();
    assert!(err.to_string().contains("at least 10"));

    let twelve = sales_with_spike(12, 0);
    let err = detect_anomalies(&twelve, &cols(&["sales"]), "lof", 0.1).unwrap_err();
    assert!(err.to_string().contains("lof needs at least 20"));
}

#[test]
fn ensemble_survives_a_singular_covariance() {
    let rows: Vec<Vec<f64>> = (0..30)
        .map(|i| vec![f64::from(i % 6) + if i == 29 { 40.0 } else { 0.0 }, 3.0])
        .collect();
    let table = Table::from_numeric(&["sales", "flat"], &rows);

    let outcome = AnomalyDetector::default()
        .detect(&table, &cols(&["sales", "flat"]), Method::Ensemble, 0.1)
        .unwrap();
    let DetectionOutcome::Ensemble(ensemble) = outcome else {
        panic!("expected an ensemble report");
    };
    assert!(ensemble.multivariate.is_none());
    assert!(ensemble.multivariate_error.is_some());
    assert!(ensemble.lof.is_some());
    assert_eq!(ensemble.methods_used, vec![Method::IsolationForest, Method::Lof]);

    let json = serde_json::to_value(&*ensemble).unwrap();
    assert!(json["multivariate"].is_null());
    assert_eq!(json["method"], "ensemble");
}

#[test]
fn details_are_capped_but_counts_are_not() {
    let rows: Vec<Vec<f64>> = (0..1000)
        .map(|i| {
            #[allow(clippy::cast_precision_loss)]
            let x = i as f64;
            vec![(x * 12.9898).sin() * 43_758.545_3 % 1.0]
        })
        .collect();
    let table = Table::from_numeric(&["noise"], &rows);
    let report = single(detect_anomalies(&table, &cols(&["noise"]), "isolation_forest", 0.5).unwrap());

    assert!(report.total_anomalies > MAX_DETAILS);
    assert_eq!(report.anomaly_details.len(), MAX_DETAILS);
    let indices: Vec<usize> = report.anomaly_details.iter().map(|d| d.index).collect();
    let mut sorted = indices.clone();
    sorted.sort_unstable();
    assert_eq!(indices, sorted);
}
