//! Condition chainer (spec §4.9).

use crate::transform::{Transform, Verdict};
use obs_types::{
    condition::{ConditionLevel, ConditionNode},
    ids::DataItemId,
    observation::ObservationPayload,
    MappedEntity,
};
use std::{collections::HashMap, sync::Arc};

/// Threads each incoming single-node `Condition` observation (as produced by the token mapper)
/// into the running per-data-item chain, following the update rules in spec §4.9.
///
/// Owned per source strand, one chain head per data item; never shared across an `Arc`/`Mutex`
/// (spec §5) — only the *result* (an `Arc<ConditionNode>`) ever crosses a thread boundary, into
/// the checkpoint.
#[derive(Default)]
pub struct ConditionChainer {
    chains: HashMap<DataItemId, Arc<ConditionNode>>,
}

impl ConditionChainer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Transform for ConditionChainer {
    fn guard(&self, entity: &MappedEntity) -> Verdict {
        match entity {
            MappedEntity::Observation(obs) => match obs.payload {
                ObservationPayload::Condition { .. } => Verdict::Run,
                _ => Verdict::Skip,
            },
            MappedEntity::Asset(_) => Verdict::Skip,
        }
    }

    fn apply(&mut self, entity: MappedEntity) -> Option<MappedEntity> {
        let MappedEntity::Observation(mut obs) = entity else {
            return Some(entity);
        };
        let ObservationPayload::Condition { level, head: incoming } = &obs.payload else {
            unreachable!("guard only runs for Condition payloads");
        };
        let level = *level;
        let incoming = incoming.clone();
        let id = obs.data_item.id.clone();
        let existing = self.chains.get(&id).cloned();

        let new_head = match level {
            ConditionLevel::Unavailable => single(ConditionLevel::Unavailable, String::new(), None, None, None),
            ConditionLevel::Normal if incoming.native_code.is_empty() => single(ConditionLevel::Normal, String::new(), None, None, None),
            ConditionLevel::Normal => {
                let remaining = without_code(existing.as_ref(), &incoming.native_code);
                rebuild(remaining).unwrap_or_else(|| single(ConditionLevel::Normal, String::new(), None, None, None))
            }
            ConditionLevel::Warning | ConditionLevel::Fault => {
                let remaining = without_code(existing.as_ref(), &incoming.native_code);
                let new_node = ConditionNode {
                    level,
                    native_code: incoming.native_code.clone(),
                    native_severity: incoming.native_severity.clone(),
                    qualifier: incoming.qualifier.clone(),
                    text: incoming.text.clone(),
                    prev: None,
                };
                prepend(new_node, remaining)
            }
        };

        self.chains.insert(id, new_head.clone());
        obs.payload = ObservationPayload::Condition { level: new_head.level, head: new_head };
        Some(MappedEntity::Observation(obs))
    }
}

fn single(level: ConditionLevel, native_code: String, native_severity: Option<String>, qualifier: Option<String>, text: Option<String>) -> Arc<ConditionNode> {
    Arc::new(ConditionNode { level, native_code, native_severity, qualifier, text, prev: None })
}

/// Flattens the chain head-to-tail into owned, `prev`-less nodes so it can be filtered and
/// relinked without mutating anything a concurrent reader might still hold.
fn collect_nodes(chain: Option<&Arc<ConditionNode>>) -> Vec<ConditionNode> {
    let mut nodes = Vec::new();
    let mut current = chain.cloned();
    while let Some(node) = current {
        current = node.prev.clone();
        nodes.push(ConditionNode { prev: None, ..(*node).clone() });
    }
    nodes
}

fn without_code(chain: Option<&Arc<ConditionNode>>, code: &str) -> Vec<ConditionNode> {
    collect_nodes(chain).into_iter().filter(|n| n.native_code != code).collect()
}

/// Relinks a head-to-tail list of detached nodes back into a persistent chain.
fn rebuild(nodes: Vec<ConditionNode>) -> Option<Arc<ConditionNode>> {
    let mut prev = None;
    for node in nodes.into_iter().rev() {
        prev = Some(Arc::new(ConditionNode { prev, ..node }));
    }
    prev
}

fn prepend(head: ConditionNode, rest: Vec<ConditionNode>) -> Arc<ConditionNode> {
    let mut nodes = vec![head];
    nodes.extend(rest);
    rebuild(nodes).expect("nodes is non-empty: at least the head we just pushed")
}
