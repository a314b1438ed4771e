//! Assembly of the aggregation pipeline: map stack, accumulator, expiry
//! sweeper and metrics, behind one shared handle.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::Options;
use crate::data::{ExpHistogram, Histogram, Number, Point};
use crate::delta::{Accumulator, AggregateError, SyncAggregator};
use crate::expiry::{spawn_sweeper, ExpiringMap};
use crate::identity::StreamId;
use crate::metrics::AggregatorMetrics;
use crate::shutdown::ShutdownSignal;
use crate::streams::{Map, MemoryMap, SyncMap, UpdateErrors};

type PipelineMap<D> = ExpiringMap<SyncMap<MemoryMap<D>>>;

/// A ready-to-use delta-to-cumulative aggregator for one point kind.
///
/// Wires the stream map (synchronized, with time-based expiry), the
/// accumulator and the metrics together, and owns the background sweeper.
/// `aggregate` is serialized internally, so the handle can be shared.
pub struct DeltaToCumulative<D: Point> {
    aggr: SyncAggregator<Accumulator<D, PipelineMap<D>>>,
    map: PipelineMap<D>,
    metrics: Arc<AggregatorMetrics>,
    shutdown: ShutdownSignal,
    sweeper: Option<JoinHandle<()>>,
}

impl<D: Point + Send + Sync + 'static> DeltaToCumulative<D> {
    /// Builds the pipeline and starts the sweeper (unless expiry is
    /// disabled). Must be called within a tokio runtime.
    pub fn new(opts: Options) -> Self {
        let map = ExpiringMap::new(SyncMap::new(MemoryMap::new()), opts.max_stale);
        let metrics = Arc::new(AggregatorMetrics::default());
        let shutdown = ShutdownSignal::new();

        let sweeper = (!opts.max_stale.is_zero()).then(|| {
            spawn_sweeper::<D, _>(
                map.clone(),
                opts.sweep_interval,
                Arc::clone(&metrics),
                shutdown.clone(),
            )
        });

        Self {
            aggr: SyncAggregator::new(Accumulator::new(map.clone())),
            map,
            metrics,
            shutdown,
            sweeper,
        }
    }

    /// Feeds one sample, returning the stream's updated cumulative.
    pub fn aggregate(&self, id: StreamId, dp: &D) -> Result<D, AggregateError> {
        self.metrics.record_processed();
        let result = self.aggr.aggregate(id, dp);
        if result.is_err() {
            self.metrics.record_dropped();
        }
        result
    }

    /// Aggregates a whole batch, rewriting each delta into its cumulative
    /// in place. Per-stream failures are collected; the batch never aborts.
    pub fn update(&self, samples: &mut [(StreamId, D)]) -> Result<(), UpdateErrors> {
        let mut errs = UpdateErrors::default();
        for (id, dp) in samples.iter_mut() {
            match self.aggregate(*id, dp) {
                Ok(next) => next.copy_to(dp),
                Err(err) => errs.push(*id, err),
            }
        }
        errs.into_result()
    }

    /// Number of streams currently tracked.
    pub fn tracked_streams(&self) -> usize {
        self.map.len()
    }

    /// Activity counters.
    pub fn metrics(&self) -> &Arc<AggregatorMetrics> {
        &self.metrics
    }

    /// Stops the sweeper. Aggregation state is in memory only and is
    /// discarded with the handle.
    pub async fn shutdown(mut self) {
        self.shutdown.shutdown();
        if let Some(task) = self.sweeper.take() {
            let _ = task.await;
        }
    }
}

/// Aggregator for counter samples.
pub fn numbers(opts: Options) -> DeltaToCumulative<Number> {
    DeltaToCumulative::new(opts)
}

/// Aggregator for explicit-bounds histogram samples.
pub fn histograms(opts: Options) -> DeltaToCumulative<Histogram> {
    DeltaToCumulative::new(opts)
}

/// Aggregator for exponential histogram samples.
pub fn exp_histograms(opts: Options) -> DeltaToCumulative<ExpHistogram> {
    DeltaToCumulative::new(opts)
}
