//! End-to-end coverage of the pipeline assembled as a whole: one SHDR line in, one sequenced
//! observation (or more, or none) out, driven through the real `acto` source strand rather than
//! calling the individual stages directly (those have their own unit tests alongside each
//! module).

use obs_pipeline::{Category, DataItem, DataItemId, DeviceModel, ObservationPayload, Pipeline, PipelineConfig, Value};
use std::sync::Arc;
use std::time::Duration;

struct FakeModel(Vec<Arc<DataItem>>);

impl DeviceModel for FakeModel {
    fn resolve(&self, _device: Option<&str>, data_item: &str) -> Option<Arc<DataItem>> {
        self.0.iter().find(|d| d.id.as_str() == data_item).cloned()
    }

    fn all_data_items(&self) -> Vec<Arc<DataItem>> {
        self.0.clone()
    }
}

fn model(items: Vec<DataItem>) -> Arc<dyn DeviceModel> {
    Arc::new(FakeModel(items.into_iter().map(Arc::new).collect()))
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn scenario_1_basic_sample_delivery() {
    let items = vec![DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION")];
    let pipeline = Pipeline::new(model(items), PipelineConfig::default()).unwrap();
    pipeline.add_source("cnc1");

    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.123Z|Xpos|100.0");
    settle().await;

    let obs = pipeline.at(1).expect("first observation sequenced");
    assert_eq!(obs.data_item.id, DataItemId::new("Xpos").unwrap());
    assert_eq!(obs.value(), Some(&Value::Double(100.0)));
}

#[tokio::test]
async fn scenario_2_duplicate_filter() {
    let items = vec![DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION")];
    let config = PipelineConfig { filter_duplicates: true, ..PipelineConfig::default() };
    let pipeline = Pipeline::new(model(items), config).unwrap();
    pipeline.add_source("cnc1");

    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.123Z|Xpos|100.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.223Z|Xpos|100.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.323Z|Xpos|101.0");
    settle().await;

    assert_eq!(pipeline.at(1).unwrap().value(), Some(&Value::Double(100.0)));
    assert_eq!(pipeline.at(2).unwrap().value(), Some(&Value::Double(101.0)));
    assert!(pipeline.at(3).is_err(), "only two observations should ever have been sequenced");
}

#[tokio::test]
async fn scenario_3_upcase_event() {
    let items = vec![DataItem::new(DataItemId::new("a01c7f30").unwrap(), "a01c7f30", Category::Event, "EXECUTION")];
    let pipeline = Pipeline::new(model(items), PipelineConfig::default()).unwrap();
    pipeline.add_source("cnc1");

    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.123Z|a01c7f30|active");
    settle().await;

    let obs = pipeline.at(1).expect("event sequenced");
    match &obs.payload {
        ObservationPayload::Event { value } => assert_eq!(value, &Value::String("ACTIVE".to_string())),
        other => panic!("expected an event payload, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_4_period_filter_delays_and_coalesces() {
    let items =
        vec![DataItem::new(DataItemId::new("Load").unwrap(), "Load", Category::Sample, "LOAD").with_filter_period(0.1)];
    let pipeline = Pipeline::new(model(items), PipelineConfig::default()).unwrap();
    pipeline.add_source("cnc1");

    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.000Z|Load|1.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.030Z|Load|2.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.060Z|Load|3.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.090Z|Load|4.0");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.120Z|Load|5.0");

    tokio::time::sleep(Duration::from_millis(300)).await;

    assert_eq!(pipeline.at(1).unwrap().value(), Some(&Value::Double(1.0)));
    assert_eq!(pipeline.at(2).unwrap().value(), Some(&Value::Double(4.0)));
    assert_eq!(pipeline.at(3).unwrap().value(), Some(&Value::Double(5.0)));
    assert!(pipeline.at(4).is_err(), "only three observations should ever have been delivered");
}

#[tokio::test]
async fn scenario_5_condition_chain() {
    let items = vec![DataItem::new(DataItemId::new("DCond").unwrap(), "DCond", Category::Condition, "SYSTEM")];
    let pipeline = Pipeline::new(model(items), PipelineConfig::default()).unwrap();
    pipeline.add_source("cnc1");

    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.000Z|DCond|FAULT|A||");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.100Z|DCond|FAULT|B||");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.200Z|DCond|NORMAL|A||");
    pipeline.ingest_line("cnc1", "2021-01-22T12:33:45.300Z|DCond|NORMAL|||");
    settle().await;

    let codes = |obs: &Arc<obs_pipeline::Observation>| -> Vec<String> {
        let ObservationPayload::Condition { head, .. } = &obs.payload else { panic!("expected condition payload") };
        head.iter().map(|n| n.native_code.clone()).filter(|c| !c.is_empty()).collect()
    };

    assert_eq!(codes(&pipeline.at(1).unwrap()), vec!["A"]);
    assert_eq!(codes(&pipeline.at(2).unwrap()), vec!["B", "A"]);
    assert_eq!(codes(&pipeline.at(3).unwrap()), vec!["B"]);
    assert_eq!(codes(&pipeline.at(4).unwrap()), Vec::<String>::new());
}

#[tokio::test]
async fn scenario_6_ring_buffer_wrap() {
    let items = vec![DataItem::new(DataItemId::new("Xpos").unwrap(), "Xpos", Category::Sample, "POSITION")];
    let config = PipelineConfig { buffer_size: 8, ..PipelineConfig::default() };
    let pipeline = Pipeline::new(model(items), config).unwrap();
    pipeline.add_source("cnc1");

    for i in 0..12 {
        pipeline.ingest_line("cnc1", format!("2021-01-22T12:33:{:02}.000Z|Xpos|{i}.0", 45 + i));
    }
    settle().await;

    assert!(pipeline.at(3).is_err(), "sequence 3 should have been evicted by wraparound");
    let seventh = pipeline.at(7).expect("sequence 7 is still retained");
    assert_eq!(seventh.value(), Some(&Value::Double(6.0)));
}
