use std::collections::BTreeMap;

/// Per-batch tallies transmitted alongside the wire payload so the server
/// can pre-allocate storage.
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchTally {
    pub nodes: u64,
    pub relations: u64,
    pub label_count: u32,
    pub type_count: u32,
}

/// The session-level aggregate report printed at the end of a run.
///
/// Kept ordered (`BTreeMap`) so the per-label/per-type breakdown prints in
/// a stable, alphabetized order regardless of file argument order.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub nodes_by_label: BTreeMap<String, u64>,
    pub relations_by_type: BTreeMap<String, u64>,
    pub indices_created: u32,
}

impl LoadReport {
    pub fn total_nodes(&self) -> u64 {
        self.nodes_by_label.values().sum()
    }

    pub fn total_relations(&self) -> u64 {
        self.relations_by_type.values().sum()
    }
}
