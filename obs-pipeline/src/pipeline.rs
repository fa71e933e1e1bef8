//! Top-level assembly: wires the ring buffer, checkpoint, and one `acto` actor per source onto a
//! shared runtime, and exposes the sink-facing API (spec §6).

use crate::{
    checkpoint::Checkpoint,
    ring_buffer::RingBuffer,
    source::{self, SourceMsg},
};
use acto::{ActoCell, ActoRef, ActoRuntime, AcTokio, SupervisionRef};
use obs_types::{data_item::DeviceModel, ids::DataItemId, Observation, PipelineConfig, PipelineError};
use parking_lot::RwLock;
use std::{collections::HashMap, sync::Arc};

/// The assembled pipeline: one shared `AcTokio` runtime, a ring buffer and checkpoint shared
/// across all sources, and a named `acto` actor per source adapter connection.
pub struct Pipeline {
    rt: AcTokio,
    ring: Arc<RingBuffer>,
    checkpoint: Arc<Checkpoint>,
    device_model: Arc<dyn DeviceModel>,
    config: PipelineConfig,
    sources: RwLock<HashMap<String, ActoRef<SourceMsg>>>,
    // Kept alive only so its actor isn't torn down when the handle is dropped; never polled.
    subscribers: RwLock<Vec<SupervisionRef<(), <AcTokio as ActoRuntime>::ActoHandle<anyhow::Result<()>>>>>,
}

impl Pipeline {
    /// Builds a pipeline over `device_model`. Installs a `tracing_subscriber` only if the
    /// process hasn't already installed one of its own (spec §4.12).
    pub fn new(device_model: Arc<dyn DeviceModel>, config: PipelineConfig) -> anyhow::Result<Self> {
        config.validate().map_err(anyhow::Error::msg)?;
        install_default_subscriber();
        let rt = AcTokio::new("obs-pipeline", num_cpus())?;
        Ok(Self {
            rt,
            ring: Arc::new(RingBuffer::new(config.buffer_size as u64)),
            checkpoint: Arc::new(Checkpoint::new()),
            device_model,
            config,
            sources: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
        })
    }

    /// Spawns the actor for a newly-connected adapter source, or returns the existing one if
    /// `name` is already running.
    pub fn add_source(&self, name: impl Into<String>) {
        let name = name.into();
        if self.sources.read().contains_key(&name) {
            return;
        }
        let supervised = source::spawn_source(&self.rt, name.clone(), self.device_model.clone(), self.config.clone(), self.ring.clone(), self.checkpoint.clone());
        self.sources.write().insert(name, supervised.me);
    }

    /// Feeds one already-framed SHDR line (tokenizing, mapping, filtering and sequencing happen
    /// on that source's own strand). A no-op if `source` was never added.
    #[tracing::instrument(skip(self, line), fields(source = %source))]
    pub fn ingest_line(&self, source: &str, line: impl Into<String>) {
        let Some(actor) = self.sources.read().get(source).cloned() else {
            tracing::warn!(source, "ingest_line for unknown source");
            return;
        };
        actor.send(SourceMsg::Line(line.into()));
    }

    /// The latest observation for every data item that has produced one.
    pub fn current(&self) -> HashMap<DataItemId, Arc<Observation>> {
        self.checkpoint.current()
    }

    /// A single historical observation by sequence number.
    pub fn at(&self, sequence: u64) -> Result<Arc<Observation>, PipelineError> {
        self.ring.at(sequence)
    }

    /// An ordered `[from, to]` read, optionally restricted to a set of data items. Stops as soon
    /// as `to` is reached or a sequence falls outside the retained window; callers restart from
    /// the last sequence they actually got back.
    pub fn range(&self, from: u64, to: u64, filter_set: Option<&[DataItemId]>) -> Vec<Arc<Observation>> {
        let observations = self.ring.range(from, to);
        match filter_set {
            Some(ids) => observations.into_iter().filter(|o| ids.contains(&o.data_item.id)).collect(),
            None => observations,
        }
    }

    /// Registers `callback` to be invoked, in sequence order, with every observation delivered
    /// from now on. The callback runs on a dedicated actor on the pipeline's own runtime, not on
    /// the caller's thread.
    pub fn subscribe<F>(&self, callback: F)
    where
        F: FnMut(Arc<Observation>) + Send + 'static,
    {
        let cursor = self.ring.last_sequence();
        let sequence_feed = self.checkpoint.subscribe_sequence();
        let ring = self.ring.clone();
        let supervised = self.rt.spawn_actor("subscriber", move |cell| run_subscriber(cell, ring, sequence_feed, cursor, callback));
        self.subscribers.write().push(supervised);
    }
}

/// No external caller ever sends this actor a message; it only reacts to the sequence feed and
/// to its own supervision channel closing at pipeline shutdown.
async fn run_subscriber<F>(
    mut cell: ActoCell<(), impl ActoRuntime, anyhow::Result<()>>,
    ring: Arc<RingBuffer>,
    mut sequence_feed: obs_futures_util::LatestValueSubscriber<u64>,
    mut cursor: u64,
    mut callback: F,
) -> anyhow::Result<()>
where
    F: FnMut(Arc<Observation>) + Send + 'static,
{
    use futures::StreamExt;
    loop {
        tokio::select! {
            msg = cell.recv() => {
                if msg.has_senders().is_none() {
                    break;
                }
            }
            latest = sequence_feed.next() => {
                let Some(latest) = latest else { break };
                for seq in (cursor + 1)..=latest {
                    if let Ok(obs) = ring.at(seq) {
                        callback(obs);
                        cursor = seq;
                    }
                }
            }
        }
    }
    Ok(())
}

fn install_default_subscriber() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}

fn num_cpus() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use obs_types::data_item::{Category, DataItem};
    use parking_lot::Mutex as PlMutex;

    struct FakeModel(Vec<Arc<DataItem>>);
    impl DeviceModel for FakeModel {
        fn resolve(&self, _device: Option<&str>, data_item: &str) -> Option<Arc<DataItem>> {
            self.0.iter().find(|d| d.id.as_str() == data_item).cloned()
        }
        fn all_data_items(&self) -> Vec<Arc<DataItem>> {
            self.0.clone()
        }
    }

    fn model() -> Arc<dyn DeviceModel> {
        Arc::new(FakeModel(vec![Arc::new(DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION"))]))
    }

    #[tokio::test]
    async fn ingesting_a_line_produces_a_sequenced_observation() {
        let pipeline = Pipeline::new(model(), PipelineConfig::default()).unwrap();
        pipeline.add_source("cnc1");
        pipeline.ingest_line("cnc1", "2021-01-01T00:00:00.000000Z|Xpos|100.5");
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let snapshot = pipeline.current();
        let obs = snapshot.get(&DataItemId::new("Xpos").unwrap()).expect("observation delivered");
        assert_eq!(obs.sequence, Some(1));
    }

    #[tokio::test]
    async fn subscribe_receives_newly_delivered_observations_in_order() {
        let pipeline = Pipeline::new(model(), PipelineConfig::default()).unwrap();
        pipeline.add_source("cnc1");
        let seen = Arc::new(PlMutex::new(Vec::new()));
        let seen2 = seen.clone();
        pipeline.subscribe(move |obs| seen2.lock().push(obs.sequence));
        pipeline.ingest_line("cnc1", "2021-01-01T00:00:00.000000Z|Xpos|1.0");
        pipeline.ingest_line("cnc1", "2021-01-01T00:00:00.100000Z|Xpos|2.0");
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert_eq!(*seen.lock(), vec![Some(1), Some(2)]);
    }
}
