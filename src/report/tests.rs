use std::fs;
use std::path::Path;

use super::aggregate::{average, reduce, summarize};
use super::fixtures::report_json;
use super::*;
use crate::store::{MetricStore, open_in_memory};

fn write_report(dir: &Path, name: &str, body: &str) {
    fs::write(dir.join(name), body).expect("report should be written");
}

fn summary(url: &str, form_factor: FormFactor, interactive: f64) -> ReportSummary {
    let body = report_json(url, form_factor, 0.5, interactive, &[]);
    parse_report(body.as_bytes(), Path::new("inline.json")).expect("fixture should parse")
}

#[test]
fn parse_report_extracts_tracked_metrics_and_errors() {
    let body = report_json(
        "https://example.com/",
        FormFactor::Mobile,
        0.87,
        1234.5,
        &["A", "B", "A"],
    );
    let report = parse_report(body.as_bytes(), Path::new("r.json")).unwrap();

    assert_eq!(report.url, "https://example.com/");
    assert_eq!(report.form_factor, FormFactor::Mobile);
    assert_eq!(report.metrics.len(), TRACKED_AUDITS.len() + 1);
    assert_eq!(report.metrics[PERFORMANCE_METRIC], 0.87);
    assert_eq!(report.metrics["interactive"], 1234.5);
    assert_eq!(report.units["interactive"], "millisecond");
    assert!(!report.units.contains_key(PERFORMANCE_METRIC));
    let descriptions: Vec<&str> = report
        .errors
        .iter()
        .map(|error| error.description.as_str())
        .collect();
    assert_eq!(descriptions, vec!["A", "B"]);
}

#[test]
fn parse_report_treats_missing_numeric_value_as_zero() {
    let mut value: serde_json::Value =
        serde_json::from_str(&report_json("u", FormFactor::Desktop, 0.5, 1.0, &[])).unwrap();
    value["audits"]["speed-index"]
        .as_object_mut()
        .unwrap()
        .remove("numericValue");
    value["categories"]["performance"]["score"] = serde_json::Value::Null;

    let report = parse_report(value.to_string().as_bytes(), Path::new("r.json")).unwrap();
    assert_eq!(report.metrics["speed-index"], 0.0);
    assert_eq!(report.metrics[PERFORMANCE_METRIC], 0.0);
}

#[test]
fn parse_report_rejects_reports_missing_an_audit() {
    let mut value: serde_json::Value =
        serde_json::from_str(&report_json("u", FormFactor::Desktop, 0.5, 1.0, &[])).unwrap();
    value["audits"]
        .as_object_mut()
        .unwrap()
        .remove("interactive");

    let err = parse_report(value.to_string().as_bytes(), Path::new("r.json")).unwrap_err();
    assert!(err.to_string().contains("interactive"), "unexpected error: {err}");
}

#[test]
fn load_all_fails_on_a_malformed_report() {
    let dir = tempfile::tempdir().unwrap();
    write_report(
        dir.path(),
        "good.json",
        &report_json("u", FormFactor::Desktop, 0.5, 1.0, &[]),
    );
    write_report(dir.path(), "broken.json", "{ not json");

    let err = load_all(dir.path()).unwrap_err();
    assert!(format!("{err:#}").contains("broken.json"), "unexpected error: {err:#}");
}

#[test]
fn load_all_ignores_temp_and_foreign_files() {
    let dir = tempfile::tempdir().unwrap();
    write_report(
        dir.path(),
        "a_report_desktop_1.json",
        &report_json("u", FormFactor::Desktop, 0.5, 1.0, &[]),
    );
    write_report(dir.path(), "a_report_desktop_2.json.tmp", "{ partial");
    write_report(dir.path(), "notes.txt", "hello");

    let reports = load_all(dir.path()).unwrap();
    assert_eq!(reports.len(), 1);
}

#[test]
fn load_all_fails_on_missing_directory() {
    let dir = tempfile::tempdir().unwrap();
    assert!(load_all(&dir.path().join("missing")).is_err());
}

#[test]
fn discard_site_reports_only_removes_the_matching_identity() {
    let dir = tempfile::tempdir().unwrap();
    write_report(
        dir.path(),
        "x-test_report_mobile_B_1.json",
        &report_json("https://x.test/", FormFactor::Mobile, 0.5, 1.0, &[]),
    );
    write_report(
        dir.path(),
        "x-test_report_desktop_B_2.json",
        &report_json("https://x.test/", FormFactor::Desktop, 0.5, 1.0, &[]),
    );
    // Same slug, different site.
    write_report(
        dir.path(),
        "x-test_report_mobile_B_3.json",
        &report_json("https://x-test/", FormFactor::Mobile, 0.5, 1.0, &[]),
    );
    write_report(
        dir.path(),
        "y-test_report_mobile_B_4.json",
        &report_json("https://y.test/", FormFactor::Mobile, 0.5, 1.0, &[]),
    );

    let removed = discard_site_reports(
        dir.path(),
        "x-test_report_mobile_",
        "https://x.test",
        FormFactor::Mobile,
    )
    .unwrap();
    assert_eq!(removed, 1);
    assert!(!dir.path().join("x-test_report_mobile_B_1.json").exists());
    assert!(dir.path().join("x-test_report_desktop_B_2.json").exists());
    assert!(dir.path().join("x-test_report_mobile_B_3.json").exists());
    assert!(dir.path().join("y-test_report_mobile_B_4.json").exists());
}

#[test]
fn discard_site_reports_skips_files_of_other_sites_without_parsing() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "lighthouse-budget.json", "{ not a report");
    write_report(
        dir.path(),
        "x-test_report_desktop_B_1.json",
        &report_json("https://x.test/", FormFactor::Desktop, 0.5, 1.0, &[]),
    );

    let removed = discard_site_reports(
        dir.path(),
        "x-test_report_desktop_",
        "https://x.test/",
        FormFactor::Desktop,
    )
    .unwrap();
    assert_eq!(removed, 1);
    assert!(dir.path().join("lighthouse-budget.json").exists());
}

#[test]
fn purge_reports_removes_reports_and_temp_files() {
    let dir = tempfile::tempdir().unwrap();
    write_report(dir.path(), "a.json", "{}");
    write_report(dir.path(), "b.json.tmp", "{}");
    write_report(dir.path(), "keep.txt", "");

    assert_eq!(purge_reports(dir.path()).unwrap(), 2);
    assert!(dir.path().join("keep.txt").exists());
    assert_eq!(purge_reports(&dir.path().join("missing")).unwrap(), 0);
}

#[test]
fn average_of_three_trials() {
    let reports = vec![
        summary("x", FormFactor::Mobile, 100.0),
        summary("x", FormFactor::Mobile, 200.0),
        summary("x", FormFactor::Mobile, 300.0),
    ];

    let metrics = average(reduce(&reports), 3).unwrap();
    assert_eq!(metrics.len(), 1);
    assert_eq!(metrics[0].metrics["interactive"], 200.0);
    assert_eq!(metrics[0].metrics[PERFORMANCE_METRIC], 0.5);
    assert_eq!(metrics[0].report_count, 3);
    assert_eq!(metrics[0].units["speed-index"], "millisecond");
}

#[test]
fn average_divides_by_requested_runs_not_reports_found() {
    // One of three requested trials failed and left no report.
    let reports = vec![
        summary("x", FormFactor::Mobile, 100.0),
        summary("x", FormFactor::Mobile, 200.0),
    ];

    let metrics = average(reduce(&reports), 3).unwrap();
    assert_eq!(metrics[0].metrics["interactive"], 100.0);
    assert_ne!(metrics[0].metrics["interactive"], 150.0);
    assert_eq!(metrics[0].run_count, 3);
    assert_eq!(metrics[0].report_count, 2);
}

#[test]
fn average_rounds_to_two_decimals() {
    let reports = vec![
        summary("x", FormFactor::Desktop, 100.0),
        summary("x", FormFactor::Desktop, 100.0),
        summary("x", FormFactor::Desktop, 101.0),
    ];

    let metrics = average(reduce(&reports), 3).unwrap();
    assert_eq!(metrics[0].metrics["interactive"], 100.33);
}

#[test]
fn average_rejects_zero_runs() {
    let reports = vec![summary("x", FormFactor::Desktop, 1.0)];
    assert!(average(reduce(&reports), 0).is_err());
}

#[test]
fn reduce_groups_by_url_and_form_factor_and_unions_errors() {
    let first = report_json("x", FormFactor::Desktop, 0.5, 1.0, &["A"]);
    let second = report_json("x", FormFactor::Desktop, 0.5, 1.0, &["A", "B"]);
    let reports = vec![
        parse_report(first.as_bytes(), Path::new("1.json")).unwrap(),
        parse_report(second.as_bytes(), Path::new("2.json")).unwrap(),
        summary("x", FormFactor::Mobile, 1.0),
        summary("y", FormFactor::Desktop, 1.0),
    ];

    let grouped = reduce(&reports);
    assert_eq!(grouped.len(), 3);
    let desktop = &grouped[&("x".to_string(), FormFactor::Desktop)];
    assert_eq!(desktop.report_count, 2);
    assert_eq!(desktop.sums["interactive"], 2.0);
    let descriptions: Vec<&str> = desktop
        .errors
        .iter()
        .map(|error| error.description.as_str())
        .collect();
    assert_eq!(descriptions, vec!["A", "B"]);
}

#[test]
fn summarize_stores_metrics_and_flags_incomplete_sites() {
    let dir = tempfile::tempdir().unwrap();
    for (name, interactive) in [("a1.json", 100.0), ("a2.json", 300.0)] {
        write_report(
            dir.path(),
            name,
            &report_json("https://a.test/", FormFactor::Desktop, 0.9, interactive, &[]),
        );
    }
    write_report(
        dir.path(),
        "b1.json",
        &report_json("https://b.test/", FormFactor::Desktop, 0.4, 50.0, &["boom"]),
    );

    let store = MetricStore::new(open_in_memory().unwrap());
    let outcome = summarize(dir.path(), 2, &store).unwrap();

    assert_eq!(outcome.metrics.len(), 2);
    assert_eq!(outcome.manifest.report_count, 3);
    assert_eq!(outcome.manifest.site_count, 2);
    assert_eq!(outcome.manifest.reports[0].sha256.len(), 64);
    assert_eq!(outcome.manifest.warnings.len(), 1);
    assert!(outcome.manifest.warnings[0].contains("https://b.test/"));

    let stored = store
        .get("https://a.test/", FormFactor::Desktop)
        .unwrap()
        .expect("metric should be stored");
    assert_eq!(stored.metrics["interactive"], 200.0);
    let stored = store
        .get("https://b.test/", FormFactor::Desktop)
        .unwrap()
        .unwrap();
    assert_eq!(stored.metrics["interactive"], 25.0);
    assert_eq!(stored.errors.len(), 1);
}

#[test]
fn summarize_fails_on_an_empty_directory() {
    let dir = tempfile::tempdir().unwrap();
    let store = MetricStore::new(open_in_memory().unwrap());
    assert!(summarize(dir.path(), 1, &store).is_err());
}
