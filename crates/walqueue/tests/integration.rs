//! End-to-end tests driving the queue through its public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use walqueue::{CodecError, Entry, Log, Queue, QueueConfig, RetryPolicy, Sink, SinkError, SinkItem};

/// A payload with a real codec, standing in for an encoded remote-write
/// request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct WriteRequest {
    series: String,
    samples: Vec<(u64, f64)>,
}

impl Entry for WriteRequest {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode(e.to_string()))
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Terminal sink recording everything it delivers.
struct RecordingSink {
    delivered: Arc<Mutex<Vec<WriteRequest>>>,
}

impl Sink<WriteRequest> for RecordingSink {
    async fn handle(&self, item: SinkItem<WriteRequest>) -> Result<(), SinkError> {
        self.delivered.lock().unwrap().push(item.data().clone());
        item.ack();
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn config(dir: &std::path::Path) -> QueueConfig {
    init_tracing();
    QueueConfig::new(dir)
        .with_buf_count(0)
        .with_poll_interval(Duration::from_millis(5))
        .with_trunc_freq(Duration::from_millis(20))
        .with_retry(RetryPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            multiplier: 2.0,
        })
}

fn request(series: &str, at: u64, value: f64) -> WriteRequest {
    WriteRequest {
        series: series.to_string(),
        samples: vec![(at, value)],
    }
}

async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached within timeout");
}

#[tokio::test]
async fn test_typed_payload_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = RecordingSink {
        delivered: Arc::clone(&delivered),
    };
    let queue = Queue::open(config(dir.path()), sink).await.unwrap();

    let requests = vec![
        request("http_requests_total", 100, 3.0),
        request("http_requests_total", 110, 4.0),
        request("queue_depth", 100, 17.0),
    ];
    for req in &requests {
        queue.add(req).await.unwrap();
    }

    wait_until(|| delivered.lock().unwrap().len() == 3).await;
    assert_eq!(*delivered.lock().unwrap(), requests);
    assert_eq!(queue.size(), 0);
    queue.close().await.unwrap();
}

#[tokio::test]
async fn test_restart_preserves_unforwarded_items() {
    let dir = tempfile::tempdir().unwrap();

    // never-acking sink: items are delivered but stay in the log
    struct NeverAck;
    impl Sink<WriteRequest> for NeverAck {
        async fn handle(&self, _item: SinkItem<WriteRequest>) -> Result<(), SinkError> {
            Ok(())
        }
        fn name(&self) -> &str {
            "never-ack"
        }
    }

    {
        let queue = Queue::open(config(dir.path()), NeverAck).await.unwrap();
        queue.add(&request("up", 100, 1.0)).await.unwrap();
        queue.add(&request("up", 110, 1.0)).await.unwrap();
        wait_until({
            let metrics = Arc::clone(queue.metrics());
            move || metrics.forwarded() == 2
        })
        .await;
        queue.close().await.unwrap();
    }

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let queue = Queue::open(
        config(dir.path()),
        RecordingSink {
            delivered: Arc::clone(&delivered),
        },
    )
    .await
    .unwrap();

    wait_until(|| delivered.lock().unwrap().len() == 2).await;
    let redelivered = delivered.lock().unwrap();
    assert_eq!(redelivered[0].samples, vec![(100, 1.0)]);
    assert_eq!(redelivered[1].samples, vec![(110, 1.0)]);
    drop(redelivered);
    queue.close().await.unwrap();
}

#[tokio::test]
async fn test_steady_state_disk_usage_is_bounded() {
    let dir = tempfile::tempdir().unwrap();
    let delivered = Arc::new(Mutex::new(Vec::new()));
    let queue = Queue::open(
        config(dir.path()).with_segment_entries(8),
        RecordingSink {
            delivered: Arc::clone(&delivered),
        },
    )
    .await
    .unwrap();

    for i in 0u64..64 {
        queue.add(&request("series", i, i as f64)).await.unwrap();
    }
    wait_until(|| delivered.lock().unwrap().len() == 64).await;
    wait_until({
        let metrics = Arc::clone(queue.metrics());
        move || metrics.entries_truncated() == 64
    })
    .await;
    queue.close().await.unwrap();

    // a prompt sink keeps the directory near-empty
    let log = Log::open(dir.path(), 8).await.unwrap();
    assert_eq!(log.base(), 64);
    assert_eq!(log.head(), 64);
}

#[tokio::test]
async fn test_flaky_downstream_eventually_delivers_everything() {
    let dir = tempfile::tempdir().unwrap();

    /// Fails every third delivery attempt.
    struct FlakySink {
        delivered: Arc<Mutex<Vec<WriteRequest>>>,
        attempts: std::sync::atomic::AtomicU64,
    }
    impl Sink<WriteRequest> for FlakySink {
        async fn handle(&self, item: SinkItem<WriteRequest>) -> Result<(), SinkError> {
            let n = self
                .attempts
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            if n % 3 == 2 {
                return Err(SinkError::Transport("flaky backend".into()));
            }
            self.delivered.lock().unwrap().push(item.data().clone());
            item.ack();
            Ok(())
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let sink = FlakySink {
        delivered: Arc::clone(&delivered),
        attempts: std::sync::atomic::AtomicU64::new(0),
    };
    let queue = Queue::open(config(dir.path()), sink).await.unwrap();

    for i in 0..30 {
        queue.add(&request("flaky_series", i, 1.0)).await.unwrap();
    }

    wait_until(|| delivered.lock().unwrap().len() == 30).await;
    // in order despite retries
    let seen = delivered.lock().unwrap();
    let times: Vec<u64> = seen.iter().map(|r| r.samples[0].0).collect();
    assert_eq!(times, (0..30).collect::<Vec<u64>>());
    drop(seen);
    assert!(queue.metrics().sink_errors() > 0);
    queue.close().await.unwrap();
}
