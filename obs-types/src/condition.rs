use std::sync::Arc;

/// The severity level of a condition observation (spec §3, §4.9).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ConditionLevel {
    Normal,
    Warning,
    Fault,
    Unavailable,
}

/// One active, non-normal condition for a data item.
///
/// The chain is an immutable, `Arc`-linked persistent cons-list (spec §4.9, §9): updating it
/// never mutates an existing node, it allocates a new head whose `prev` clones the `Arc` to the
/// rest of the list. A reader holding an `Arc<ConditionNode>` therefore always sees a consistent
/// snapshot, even while the chain keeps changing underneath on the source strand.
#[derive(Clone, Debug, PartialEq)]
pub struct ConditionNode {
    pub level: ConditionLevel,
    pub native_code: String,
    pub native_severity: Option<String>,
    pub qualifier: Option<String>,
    pub text: Option<String>,
    pub prev: Option<Arc<ConditionNode>>,
}

impl ConditionNode {
    /// Walks the chain from head to tail, yielding this node first.
    pub fn iter(self: &Arc<Self>) -> ConditionChainIter {
        ConditionChainIter {
            current: Some(self.clone()),
        }
    }

    /// True if `native_code` (non-empty) appears anywhere in the chain starting at `self`.
    pub fn contains_code(self: &Arc<Self>, code: &str) -> bool {
        self.iter().any(|n| n.native_code == code)
    }

    pub fn len(self: &Arc<Self>) -> usize {
        self.iter().count()
    }
}

pub struct ConditionChainIter {
    current: Option<Arc<ConditionNode>>,
}

impl Iterator for ConditionChainIter {
    type Item = Arc<ConditionNode>;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.current.take()?;
        self.current = node.prev.clone();
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(level: ConditionLevel, code: &str, prev: Option<Arc<ConditionNode>>) -> Arc<ConditionNode> {
        Arc::new(ConditionNode {
            level,
            native_code: code.to_string(),
            native_severity: None,
            qualifier: None,
            text: None,
            prev,
        })
    }

    #[test]
    fn chain_iteration_is_head_to_tail() {
        let a = node(ConditionLevel::Fault, "A", None);
        let b = node(ConditionLevel::Fault, "B", Some(a.clone()));
        let codes: Vec<_> = b.iter().map(|n| n.native_code.clone()).collect();
        assert_eq!(codes, vec!["B".to_string(), "A".to_string()]);
    }

    #[test]
    fn older_snapshot_is_unaffected_by_later_updates() {
        let a = node(ConditionLevel::Fault, "A", None);
        let snapshot = a.clone();
        let b = node(ConditionLevel::Fault, "B", Some(a));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(b.len(), 2);
    }
}
