//! End-to-end tests driving the assembled aggregation pipeline.

use std::time::Duration;

use deltacum::{
    identify, AttrValue, Attributes, Buckets, ExpHistogram, MetricId, NumValue, Number, Options,
    Point, StreamId,
};

fn series(name: &str, host: &str) -> StreamId {
    let mut attrs = Attributes::new();
    attrs.insert("host".to_string(), AttrValue::Str(host.to_string()));
    identify(MetricId::new(name, "1"), &attrs)
}

fn int_value(dp: &Number) -> i64 {
    match dp.value {
        NumValue::Int(v) => v,
        NumValue::Double(_) => panic!("expected int point"),
    }
}

#[tokio::test]
async fn test_counter_batches_become_cumulative() {
    let aggr = deltacum::numbers(Options::default());
    let requests = series("http_requests_total", "a");
    let errors = series("http_errors_total", "a");

    let mut batch = vec![
        (requests, Number::int(100, 110, 3)),
        (errors, Number::int(100, 110, 1)),
        (requests, Number::int(100, 120, 4)),
        (requests, Number::int(100, 130, 2)),
        (errors, Number::int(100, 130, 1)),
    ];
    aggr.update(&mut batch).unwrap();

    let values: Vec<i64> = batch.iter().map(|(_, dp)| int_value(dp)).collect();
    assert_eq!(values, vec![3, 1, 7, 9, 2]);
    assert_eq!(aggr.tracked_streams(), 2);
    assert_eq!(aggr.metrics().samples_processed(), 5);

    aggr.shutdown().await;
}

#[tokio::test]
async fn test_bad_stream_does_not_abort_batch() {
    let aggr = deltacum::numbers(Options::default());
    let good = series("good", "a");
    let bad = series("bad", "a");

    aggr.aggregate(bad, &Number::int(200, 210, 5)).unwrap();

    let mut batch = vec![
        (good, Number::int(100, 110, 1)),
        // older series start: dropped
        (bad, Number::int(100, 220, 7)),
        (good, Number::int(100, 120, 1)),
    ];
    let errs = aggr.update(&mut batch).unwrap_err();
    assert_eq!(errs.len(), 1);

    // the good stream still advanced
    assert_eq!(int_value(&batch[2].1), 2);
    // the bad stream's cumulative was not touched
    let next = aggr.aggregate(bad, &Number::int(200, 230, 1)).unwrap();
    assert_eq!(int_value(&next), 6);
    assert_eq!(aggr.metrics().samples_dropped(), 1);

    aggr.shutdown().await;
}

#[tokio::test(start_paused = true)]
async fn test_evicted_stream_restarts_as_new_series() {
    let opts = Options::default()
        .with_max_stale(Duration::from_secs(60))
        .with_sweep_interval(Duration::from_secs(10));
    let aggr = deltacum::numbers(opts);
    let id = series("sporadic", "a");

    let c = aggr.aggregate(id, &Number::int(100, 110, 3)).unwrap();
    assert_eq!(int_value(&c), 3);
    assert_eq!(aggr.tracked_streams(), 1);

    // stream goes idle past max_stale; the sweeper drops it
    tokio::time::advance(Duration::from_secs(120)).await;
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    assert_eq!(aggr.tracked_streams(), 0);
    assert_eq!(aggr.metrics().streams_evicted(), 1);

    // the next sample is treated as a fresh series, not accumulated
    let c = aggr.aggregate(id, &Number::int(100, 500, 9)).unwrap();
    assert_eq!(int_value(&c), 9);

    aggr.shutdown().await;
}

#[tokio::test]
async fn test_exp_histogram_pipeline_accumulates() {
    let aggr = deltacum::exp_histograms(Options::default());
    let id = series("request_size", "a");

    let hist = |time, offset, counts: Vec<u64>, zt: f64, zc: u64| {
        let buckets = Buckets::new(offset, counts);
        ExpHistogram {
            start: 100,
            time,
            scale: 0,
            count: zc + 2 * buckets.total(),
            zero_count: zc,
            zero_threshold: zt,
            sum: Some(10.0),
            min: None,
            max: None,
            positive: buckets.clone(),
            negative: buckets,
        }
    };

    aggr.aggregate(id, &hist(110, -1, vec![1, 2, 3], 0.0, 2))
        .unwrap();
    let merged = aggr
        .aggregate(id, &hist(120, 1, vec![5], 2.0, 1))
        .unwrap();

    // the stored side widened its zero bucket to the incoming threshold:
    // buckets -1 and 0 absorbed on both sides
    assert_eq!(merged.zero_threshold, 2.0);
    assert_eq!(merged.zero_count, 2 + 2 * (1 + 2) + 1);
    assert_eq!(merged.positive.offset(), 1);
    assert_eq!(merged.positive.counts(), &[3 + 5]);
    assert_eq!(merged.sum, Some(20.0));
    assert_eq!(merged.timestamp(), 120);

    // total mass is conserved across widening and merging
    let total = merged.zero_count + merged.positive.total() + merged.negative.total();
    let input_total = (2 + 2 * 6) + (1 + 2 * 5);
    assert_eq!(total, input_total);

    aggr.shutdown().await;
}
