//! Per-source strand (spec §5): one `acto` actor per adapter connection, running every stage
//! from tokenizing through sequencing in order, with no locking of its own private state.

use crate::{
    checkpoint::Checkpoint,
    condition_chainer::ConditionChainer,
    diagnostics::Diagnostics,
    filters::{DeltaFilter, DuplicateFilter, PeriodFilter, PeriodOutcome},
    protocol_command::{self, ProtocolCommand},
    ring_buffer::RingBuffer,
    timestamp_extractor::{TimeMode, TimestampExtractor},
    token_mapper::TokenMapper,
    tokenizer::{TokenizedLine, Tokenizer},
    transform::Transform,
    unit_converter::UnitConverter,
};
use acto::{ActoCell, ActoMsgSuper, ActoRuntime, AcTokio, SupervisionRef};
use obs_types::{
    data_item::DeviceModel,
    ids::{DataItemId, DeviceId},
    observation::{MappedEntity, Observation},
    PipelineConfig,
};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Messages a source strand accepts. The adapter ingress (out of scope here, spec §1) pushes
/// `Line`; `TimerFired` loops back from a period-filter timer armed by this same actor.
pub enum SourceMsg {
    Line(String),
    TimerFired { data_item: DataItemId, generation: u64 },
}

/// Spawns one source strand on the shared `acto` runtime.
///
/// Timer self-delivery uses a plain `tokio::sync::mpsc` channel selected alongside `cell.recv()`
/// rather than the actor re-sending itself a message through its own `ActoRef` — the latter
/// would need a reference to `me` inside the spawn closure before `spawn_actor` returns it, which
/// this crate's observed `acto` usage doesn't establish a pattern for.
pub fn spawn_source(
    rt: &AcTokio,
    name: impl Into<String>,
    device_model: Arc<dyn DeviceModel>,
    config: PipelineConfig,
    ring: Arc<RingBuffer>,
    checkpoint: Arc<Checkpoint>,
) -> SupervisionRef<SourceMsg, <AcTokio as ActoRuntime>::ActoHandle<anyhow::Result<()>>> {
    let name = name.into();
    rt.spawn_actor(&name.clone(), move |cell| run_source(cell, name, device_model, config, ring, checkpoint))
}

struct SourceState {
    tokenizer: Tokenizer,
    timestamps: TimestampExtractor,
    mapper: TokenMapper,
    unit_converter: UnitConverter,
    duplicate_filter: DuplicateFilter,
    delta_filter: DeltaFilter,
    period_filter: PeriodFilter,
    condition_chainer: ConditionChainer,
    conversion_required: bool,
    filter_duplicates: bool,
    auto_available_pending: bool,
    device_model: Arc<dyn DeviceModel>,
}

impl SourceState {
    fn new(device_model: Arc<dyn DeviceModel>, config: PipelineConfig, diagnostics: Arc<Diagnostics>, source_name: String) -> Self {
        let time_mode = if config.relative_time { TimeMode::Relative } else { TimeMode::Absolute };
        Self {
            tokenizer: Tokenizer::new(),
            timestamps: TimestampExtractor::new(time_mode),
            mapper: TokenMapper::new(device_model.clone(), None, config.upcase_data_item_value, diagnostics.clone(), source_name.clone()),
            unit_converter: UnitConverter::new(diagnostics, source_name),
            duplicate_filter: DuplicateFilter::new(),
            delta_filter: DeltaFilter::new(),
            period_filter: PeriodFilter::new(),
            condition_chainer: ConditionChainer::new(),
            conversion_required: config.conversion_required,
            filter_duplicates: config.filter_duplicates,
            auto_available_pending: config.auto_available,
            device_model,
        }
    }

    /// Synthesizes an `AVAILABLE` event the first time this source produces anything, if
    /// `AutoAvailable` is configured and the device model exposes an AVAILABILITY data item
    /// (spec §6).
    fn maybe_synthesize_available(&mut self) -> Option<Observation> {
        if !std::mem::take(&mut self.auto_available_pending) {
            return None;
        }
        let item = self.device_model.all_data_items().into_iter().find(|di| di.type_ == "AVAILABILITY")?;
        Some(Observation::new(
            item,
            obs_types::Timestamp::now(),
            obs_types::ArrivalOrdinal(0),
            obs_types::observation::ObservationPayload::Event { value: obs_types::Value::String("AVAILABLE".to_owned()) },
        ))
    }

    fn apply_protocol_command(&mut self, key: &str, value: &str) {
        match protocol_command::parse(key, value) {
            ProtocolCommand::ConversionRequired(enabled) => self.conversion_required = enabled,
            ProtocolCommand::RelativeTime(mode) => self.timestamps.set_mode(mode),
            ProtocolCommand::Device(id) => self.mapper.set_default_device(DeviceId::new(id).ok()),
            // RealTime, ShdrVersion and unrecognized keys are external adapter concerns; this
            // crate just needs to not choke on them.
            ProtocolCommand::RealTime(_) | ProtocolCommand::ShdrVersion(_) | ProtocolCommand::Other { .. } => {}
        }
    }

    /// Runs one entity through the unit converter, duplicate/delta filters, and (for
    /// conditions) the chainer. Returns `None` if a filter suppressed it.
    fn run_value_stages(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        let mut stages: Vec<&mut dyn Transform> = Vec::new();
        if self.conversion_required {
            stages.push(&mut self.unit_converter);
        }
        if self.filter_duplicates {
            stages.push(&mut self.duplicate_filter);
        }
        stages.push(&mut self.delta_filter);
        stages.push(&mut self.condition_chainer);

        let mut current = entity;
        for stage in stages {
            current = stage.run(current)?;
        }
        Some(current)
    }
}

fn deliver(entity: MappedEntity, ring: &RingBuffer, checkpoint: &Checkpoint) {
    let MappedEntity::Observation(obs) = entity else {
        return; // asset commands are routed to the (external) AssetStore, not the sequencer
    };
    let sequenced = ring.insert(*obs);
    checkpoint.record(&sequenced);
}

async fn handle_line(state: &mut SourceState, line: &str, ring: &RingBuffer, checkpoint: &Checkpoint, timer_tx: &mpsc::Sender<(DataItemId, u64)>) {
    if let Some(available) = state.maybe_synthesize_available() {
        if let Some(entity) = state.run_value_stages(MappedEntity::Observation(Box::new(available))) {
            deliver(entity, ring, checkpoint);
        }
    }

    let tokenized = match state.tokenizer.feed(line) {
        Ok(Some(t)) => t,
        Ok(None) => return,
        Err(_) => return, // malformed line: already reported to diagnostics by the tokenizer's caller
    };

    match tokenized {
        TokenizedLine::Command { key, value } => state.apply_protocol_command(&key, &value),
        TokenizedLine::Data { timestamp_token, tokens } => {
            let Ok(extracted) = state.timestamps.extract(&timestamp_token) else {
                return;
            };
            let entities = state.mapper.map_line(extracted.timestamp, extracted.arrival, &tokens);
            for entity in entities {
                let obs = match entity {
                    // out of scope: forwarded to the (external) AssetStore (spec §1, §4.4)
                    MappedEntity::Asset(_) => continue,
                    MappedEntity::Observation(obs) => obs,
                };
                let Some(after_filters) = state.run_value_stages(MappedEntity::Observation(obs)) else {
                    continue;
                };
                let MappedEntity::Observation(obs) = after_filters else { continue };
                let data_item_id = obs.data_item.id.clone();
                match state.period_filter.on_observation(*obs) {
                    PeriodOutcome::Deliver(obs) => deliver(MappedEntity::Observation(Box::new(obs)), ring, checkpoint),
                    PeriodOutcome::DeliverBoth { first, second } => {
                        deliver(MappedEntity::Observation(Box::new(first)), ring, checkpoint);
                        deliver(MappedEntity::Observation(Box::new(second)), ring, checkpoint);
                    }
                    PeriodOutcome::DeliverAndHold { flushed, after, generation } => {
                        deliver(MappedEntity::Observation(Box::new(flushed)), ring, checkpoint);
                        arm_timer(timer_tx.clone(), data_item_id, generation, after);
                    }
                    PeriodOutcome::Hold { after, generation } => {
                        arm_timer(timer_tx.clone(), data_item_id, generation, after);
                    }
                }
            }
        }
    }
}

fn arm_timer(timer_tx: mpsc::Sender<(DataItemId, u64)>, data_item: DataItemId, generation: u64, after: std::time::Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(after).await;
        let _ = timer_tx.send((data_item, generation)).await;
    });
}

async fn run_source(
    mut cell: ActoCell<SourceMsg, impl ActoRuntime, anyhow::Result<()>>,
    source_name: String,
    device_model: Arc<dyn DeviceModel>,
    config: PipelineConfig,
    ring: Arc<RingBuffer>,
    checkpoint: Arc<Checkpoint>,
) -> anyhow::Result<()> {
    let diagnostics = Arc::new(Diagnostics::new());
    let mut state = SourceState::new(device_model, config, diagnostics, source_name.clone());
    let (timer_tx, mut timer_rx) = mpsc::channel::<(DataItemId, u64)>(64);

    loop {
        tokio::select! {
            msg = cell.recv() => {
                let Some(msg) = msg.has_senders() else { break; };
                match msg {
                    ActoMsgSuper::Message(SourceMsg::Line(line)) => {
                        handle_line(&mut state, &line, &ring, &checkpoint, &timer_tx).await;
                    }
                    ActoMsgSuper::Message(SourceMsg::TimerFired { data_item, generation }) => {
                        if let Some(obs) = state.period_filter.on_timer(&data_item, generation) {
                            deliver(MappedEntity::Observation(Box::new(obs)), &ring, &checkpoint);
                        }
                    }
                    ActoMsgSuper::Supervision { .. } => break,
                }
            }
            Some((data_item, generation)) = timer_rx.recv() => {
                if let Some(obs) = state.period_filter.on_timer(&data_item, generation) {
                    deliver(MappedEntity::Observation(Box::new(obs)), &ring, &checkpoint);
                }
            }
        }
    }
    tracing::info!(source = %source_name, "source strand shut down");
    Ok(())
}
