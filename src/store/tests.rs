use std::collections::BTreeMap;

use super::site_queue::StatusCounts;
use super::*;
use crate::model::{AggregatedSiteMetric, ConsoleError, FormFactor, SiteStatus};

fn queue(max_attempts: u32) -> SiteQueue {
    SiteQueue::new(open_in_memory().expect("in-memory DB should open"), max_attempts)
}

fn metric_store() -> MetricStore {
    MetricStore::new(open_in_memory().expect("in-memory DB should open"))
}

#[test]
fn enqueue_twice_keeps_a_single_item() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.enqueue("a", FormFactor::Desktop).unwrap();

    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "a");
    assert_eq!(pending[0].status, SiteStatus::Pending);
    assert!(!pending[0].has_error);
}

#[test]
fn form_factor_is_part_of_the_identity() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.enqueue("a", FormFactor::Mobile).unwrap();

    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0].form_factor, FormFactor::Desktop);
    assert_eq!(pending[1].form_factor, FormFactor::Mobile);
}

#[test]
fn pending_excludes_finished_items() {
    let queue = queue(1);
    queue.enqueue("done", FormFactor::Desktop).unwrap();
    queue.enqueue("todo", FormFactor::Desktop).unwrap();
    queue.mark_finished("done", FormFactor::Desktop).unwrap();

    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].url, "todo");
}

#[test]
fn re_enqueue_keeps_finished_items_finished() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Mobile).unwrap();
    queue.mark_finished("a", FormFactor::Mobile).unwrap();
    queue.enqueue("a", FormFactor::Mobile).unwrap();

    assert!(queue.pending().unwrap().is_empty());
    let item = queue.get("a", FormFactor::Mobile).unwrap().unwrap();
    assert!(item.finished());
}

#[test]
fn re_enqueue_clears_error_state_and_requeues_errored_items() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.mark_errored("a", FormFactor::Desktop).unwrap();

    let item = queue.get("a", FormFactor::Desktop).unwrap().unwrap();
    assert_eq!(item.status, SiteStatus::ErroredTerminal);
    assert!(item.has_error);
    assert!(queue.pending().unwrap().is_empty());

    queue.enqueue("a", FormFactor::Desktop).unwrap();
    let item = queue.get("a", FormFactor::Desktop).unwrap().unwrap();
    assert_eq!(item.status, SiteStatus::Pending);
    assert!(!item.has_error);
    assert_eq!(item.attempts, 0);
}

#[test]
fn point_updates_on_missing_items_are_no_ops() {
    let queue = queue(1);
    queue.mark_finished("missing", FormFactor::Desktop).unwrap();
    queue.mark_errored("missing", FormFactor::Mobile).unwrap();
    queue.mark_in_flight("missing", FormFactor::Mobile).unwrap();
    queue.requeue("missing", FormFactor::Mobile).unwrap();

    assert!(queue.get("missing", FormFactor::Desktop).unwrap().is_none());
    assert!(queue.pending().unwrap().is_empty());
}

#[test]
fn errored_items_stay_retryable_until_attempts_are_exhausted() {
    let queue = queue(3);
    queue.enqueue("a", FormFactor::Desktop).unwrap();

    queue.mark_errored("a", FormFactor::Desktop).unwrap();
    let item = queue.get("a", FormFactor::Desktop).unwrap().unwrap();
    assert_eq!(item.status, SiteStatus::ErroredRetryable);
    assert_eq!(item.attempts, 1);
    assert_eq!(queue.pending().unwrap().len(), 1);

    queue.mark_errored("a", FormFactor::Desktop).unwrap();
    queue.mark_errored("a", FormFactor::Desktop).unwrap();
    let item = queue.get("a", FormFactor::Desktop).unwrap().unwrap();
    assert_eq!(item.status, SiteStatus::ErroredTerminal);
    assert_eq!(item.attempts, 3);
    assert!(item.finished());
    assert!(queue.pending().unwrap().is_empty());
}

#[test]
fn success_after_a_failed_attempt_keeps_the_error_flag() {
    let queue = queue(2);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.mark_errored("a", FormFactor::Desktop).unwrap();
    queue.mark_finished("a", FormFactor::Desktop).unwrap();

    let item = queue.get("a", FormFactor::Desktop).unwrap().unwrap();
    assert_eq!(item.status, SiteStatus::Finished);
    assert!(item.has_error);
}

#[test]
fn in_flight_items_are_still_pending() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.mark_in_flight("a", FormFactor::Desktop).unwrap();

    let pending = queue.pending().unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].status, SiteStatus::InFlight);
}

#[test]
fn counts_group_items_by_status() {
    let queue = queue(2);
    for url in ["a", "b", "c", "d"] {
        queue.enqueue(url, FormFactor::Desktop).unwrap();
    }
    queue.mark_finished("a", FormFactor::Desktop).unwrap();
    queue.mark_errored("b", FormFactor::Desktop).unwrap();
    queue.mark_in_flight("c", FormFactor::Desktop).unwrap();

    let counts = queue.counts().unwrap();
    assert_eq!(
        counts,
        StatusCounts {
            pending: 1,
            in_flight: 1,
            finished: 1,
            errored_retryable: 1,
            errored_terminal: 0,
            with_errors: 1,
        }
    );
}

#[test]
fn reset_removes_every_item() {
    let queue = queue(1);
    queue.enqueue("a", FormFactor::Desktop).unwrap();
    queue.enqueue("b", FormFactor::Mobile).unwrap();

    assert_eq!(queue.reset().unwrap(), 2);
    assert!(queue.pending().unwrap().is_empty());
}

#[test]
fn metric_upsert_overwrites_by_identity() {
    let store = metric_store();
    let mut metric = AggregatedSiteMetric {
        url: "https://example.com/".to_string(),
        form_factor: FormFactor::Mobile,
        metrics: BTreeMap::from([("interactive".to_string(), 200.0)]),
        units: BTreeMap::from([("interactive".to_string(), "millisecond".to_string())]),
        errors: vec![ConsoleError::new("A")],
        run_count: 3,
        report_count: 3,
    };
    store.upsert(&metric).unwrap();

    metric.metrics.insert("interactive".to_string(), 250.5);
    metric.report_count = 2;
    store.upsert(&metric).unwrap();

    assert_eq!(store.count().unwrap(), 1);
    let loaded = store
        .get("https://example.com/", FormFactor::Mobile)
        .unwrap()
        .expect("metric should exist");
    assert_eq!(loaded, metric);
    assert!(
        store
            .get("https://example.com/", FormFactor::Desktop)
            .unwrap()
            .is_none()
    );
}

#[test]
fn metric_reset_clears_rows() {
    let store = metric_store();
    store
        .upsert(&AggregatedSiteMetric {
            url: "x".to_string(),
            form_factor: FormFactor::Desktop,
            metrics: BTreeMap::new(),
            units: BTreeMap::new(),
            errors: Vec::new(),
            run_count: 1,
            report_count: 1,
        })
        .unwrap();

    assert_eq!(store.list().unwrap().len(), 1);
    store.reset().unwrap();
    assert!(store.list().unwrap().is_empty());
}
