//! Accumulates encoded node/relationship records into size-bounded
//! batches and flushes them to a [`ServerLink`] as `GRAPH.BULK` commands.
//!
//! # Batch ceiling semantics
//!
//! `--max-token-count` is interpreted here as a cap on the number of
//! distinct server-command arguments a batch may grow to, counted
//! conservatively: introducing a new label or relationship type into a
//! pending batch costs two arguments (the name and its data blob, see
//! [`build_label_header`]); appending another record to an
//! already-present label/type costs nothing extra, since it only grows
//! that label's existing blob argument. A batch that is still empty
//! always accepts the record that triggered the check, so a ceiling of
//! `1` degrades gracefully into "flush after every record" rather than
//! ever failing outright — the worst case the batcher is asked to
//! tolerate, not a value that makes loading impossible.
//!
//! A single record whose own encoded size exceeds
//! [`BatchBuilder::max_record_bytes`] is rejected unconditionally
//! (`LoaderError::OversizedRow`); that limit is independent of
//! `max_token_count` and models a hard wire-protocol ceiling rather than
//! a user-tunable batching knob.
//!
//! # Label/type schema
//!
//! Each label's (resp. relationship type's) on-wire property-name list is
//! fixed once per session via [`BatchBuilder::declare_label_schema`] /
//! [`BatchBuilder::declare_type_schema`], which callers should invoke with
//! the CSV header's declared property columns before appending any row.
//! That keeps the schema stable even when an early row happens to have a
//! null in some column — a sparse first row must not narrow the schema
//! for every later, non-null row of the same label.

use std::collections::HashMap;

use loader_core::{BatchTally, LoadReport, LoaderError, ServerLink, Value};

use crate::typecodec::encode_value;

/// The single-byte phase token carried by every batch: `BEGIN` on the
/// first flush, `END` on the last, `MID` for everything in between (a
/// run with exactly one batch is `BEGIN` *and* `END` at once, so `END`
/// takes priority when both hold).
const PHASE_BEGIN: u8 = 0;
const PHASE_MID: u8 = 1;
const PHASE_END: u8 = 2;

/// Default per-batch argument ceiling. Generous enough that ordinary
/// CSV-sized loads flush only a handful of times.
pub const DEFAULT_MAX_TOKEN_COUNT: u64 = 100_000;

/// Hard per-record byte ceiling, independent of `max_token_count`.
const DEFAULT_MAX_RECORD_BYTES: usize = 512 * 1024 * 1024;

#[derive(Default)]
struct LabelAccumulator {
    records: Vec<u8>,
    count: u64,
}

#[derive(Default)]
struct PendingBatch {
    node_order: Vec<String>,
    node_data: HashMap<String, LabelAccumulator>,
    rel_order: Vec<String>,
    rel_data: HashMap<String, LabelAccumulator>,
    token_cost: u64,
    record_count: u64,
}

impl PendingBatch {
    fn is_empty(&self) -> bool {
        self.record_count == 0
    }
}

pub struct BatchBuilder<L: ServerLink> {
    link: L,
    graph_name: String,
    max_token_count: u64,
    max_record_bytes: usize,
    label_schemas: HashMap<String, Vec<String>>,
    type_schemas: HashMap<String, Vec<String>>,
    current: PendingBatch,
    started: bool,
    report: LoadReport,
}

impl<L: ServerLink> BatchBuilder<L> {
    pub fn new(link: L, graph_name: impl Into<String>, max_token_count: u64) -> Self {
        Self {
            link,
            graph_name: graph_name.into(),
            max_token_count: max_token_count.max(1),
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
            label_schemas: HashMap::new(),
            type_schemas: HashMap::new(),
            current: PendingBatch::default(),
            started: false,
            report: LoadReport::default(),
        }
    }

    /// Overrides the hard per-record byte ceiling; exposed for tests that
    /// want to exercise the `OversizedRow` path without allocating a
    /// half-gigabyte record.
    pub fn with_max_record_bytes(mut self, bytes: usize) -> Self {
        self.max_record_bytes = bytes;
        self
    }

    /// Fixes `label`'s on-wire property schema to exactly `names`, in
    /// order, if it has not already been fixed. Callers should invoke
    /// this with the CSV header's declared property columns *before*
    /// appending any row for that label, so the schema reflects what the
    /// header promises rather than whichever properties the first row
    /// happened to carry (a first row with a null in some column must
    /// not silently narrow the schema for every later row).
    pub fn declare_label_schema(&mut self, label: &str, names: &[String]) {
        self.label_schemas
            .entry(label.to_string())
            .or_insert_with(|| names.to_vec());
    }

    /// The relationship-type equivalent of [`Self::declare_label_schema`].
    pub fn declare_type_schema(&mut self, rel_type: &str, names: &[String]) {
        self.type_schemas
            .entry(rel_type.to_string())
            .or_insert_with(|| names.to_vec());
    }

    /// Appends one node record for `label`. If no schema was fixed via
    /// [`Self::declare_label_schema`], the property set of this first
    /// call for the label fixes it instead, as a fallback for callers
    /// that never saw a header (e.g. tests constructing rows directly).
    pub fn append_node(
        &mut self,
        label: &str,
        properties: &[(String, Value)],
    ) -> Result<(), LoaderError> {
        let schema = self.label_schema(label, properties);
        let record = encode_node_record(&schema, properties)?;
        self.append_record(false, label, record)
    }

    /// Appends one relationship record for `rel_type`, with already
    /// resolved dense `src`/`dest` node indices.
    pub fn append_relation(
        &mut self,
        rel_type: &str,
        src: u64,
        dest: u64,
        properties: &[(String, Value)],
    ) -> Result<(), LoaderError> {
        let schema = self.type_schema(rel_type, properties);
        let record = encode_relation_record(src, dest, &schema, properties)?;
        self.append_record(true, rel_type, record)
    }

    fn label_schema(&mut self, label: &str, properties: &[(String, Value)]) -> Vec<String> {
        self.label_schemas
            .entry(label.to_string())
            .or_insert_with(|| properties.iter().map(|(n, _)| n.clone()).collect())
            .clone()
    }

    fn type_schema(&mut self, rel_type: &str, properties: &[(String, Value)]) -> Vec<String> {
        self.type_schemas
            .entry(rel_type.to_string())
            .or_insert_with(|| properties.iter().map(|(n, _)| n.clone()).collect())
            .clone()
    }

    fn append_record(
        &mut self,
        is_relation: bool,
        key: &str,
        record: Vec<u8>,
    ) -> Result<(), LoaderError> {
        if record.len() > self.max_record_bytes {
            return Err(LoaderError::OversizedRow {
                label: key.to_string(),
                size: record.len(),
            });
        }

        let already_present = if is_relation {
            self.current.rel_data.contains_key(key)
        } else {
            self.current.node_data.contains_key(key)
        };
        let additional_cost = if already_present { 1 } else { 2 };

        if !self.current.is_empty()
            && self.current.token_cost + additional_cost > self.max_token_count
        {
            self.flush()?;
            return self.append_record(is_relation, key, record);
        }

        let (order, data) = if is_relation {
            (&mut self.current.rel_order, &mut self.current.rel_data)
        } else {
            (&mut self.current.node_order, &mut self.current.node_data)
        };
        if !data.contains_key(key) {
            order.push(key.to_string());
            data.insert(key.to_string(), LabelAccumulator::default());
        }
        let acc = data.get_mut(key).expect("just inserted");
        acc.records.extend_from_slice(&record);
        acc.count += 1;
        self.current.token_cost += additional_cost;
        self.current.record_count += 1;
        Ok(())
    }

    /// Flushes any pending records as a non-final `GRAPH.BULK` command.
    /// A no-op if nothing is pending. Called automatically once the
    /// ceiling is reached; callers rarely need to call it directly.
    pub fn flush(&mut self) -> Result<(), LoaderError> {
        if self.current.is_empty() {
            return Ok(());
        }
        self.send_batch(false)
    }

    /// Flushes whatever remains, marks the load as complete on the wire,
    /// and hands back the aggregate [`LoadReport`] along with the
    /// underlying link (so the caller can still issue index-creation
    /// commands over the same connection).
    pub fn finish(mut self) -> Result<(LoadReport, L), LoaderError> {
        self.send_batch(true)?;
        Ok((self.report, self.link))
    }

    fn send_batch(&mut self, is_final: bool) -> Result<(), LoaderError> {
        let tally = BatchTally {
            nodes: self.current.node_data.values().map(|a| a.count).sum(),
            relations: self.current.rel_data.values().map(|a| a.count).sum(),
            label_count: self.current.node_order.len() as u32,
            type_count: self.current.rel_order.len() as u32,
        };

        let phase = if is_final {
            PHASE_END
        } else if !self.started {
            PHASE_BEGIN
        } else {
            PHASE_MID
        };
        let mut args: Vec<Vec<u8>> = vec![
            self.graph_name.as_bytes().to_vec(),
            encode_tally(&tally),
            vec![phase],
        ];

        for label in &self.current.node_order {
            let acc = &self.current.node_data[label];
            let schema = &self.label_schemas[label];
            args.push(label.as_bytes().to_vec());
            let mut blob = build_label_header(label, schema);
            blob.extend_from_slice(&acc.records);
            args.push(blob);
        }
        for rel_type in &self.current.rel_order {
            let acc = &self.current.rel_data[rel_type];
            let schema = &self.type_schemas[rel_type];
            args.push(rel_type.as_bytes().to_vec());
            let mut blob = build_label_header(rel_type, schema);
            blob.extend_from_slice(&acc.records);
            args.push(blob);
        }

        self.link.send("GRAPH.BULK", &args)?;

        for label in &self.current.node_order {
            let count = self.current.node_data[label].count;
            *self.report.nodes_by_label.entry(label.clone()).or_insert(0) += count;
        }
        for rel_type in &self.current.rel_order {
            let count = self.current.rel_data[rel_type].count;
            *self
                .report
                .relations_by_type
                .entry(rel_type.clone())
                .or_insert(0) += count;
        }

        self.started = true;
        self.current = PendingBatch::default();
        Ok(())
    }
}

fn encode_tally(tally: &BatchTally) -> Vec<u8> {
    let mut out = Vec::with_capacity(24);
    out.extend_from_slice(&tally.nodes.to_le_bytes());
    out.extend_from_slice(&tally.relations.to_le_bytes());
    out.extend_from_slice(&tally.label_count.to_le_bytes());
    out.extend_from_slice(&tally.type_count.to_le_bytes());
    out
}

fn build_label_header(name: &str, schema_names: &[String]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(name.as_bytes());
    out.push(0);
    out.extend_from_slice(&(schema_names.len() as u32).to_le_bytes());
    for n in schema_names {
        out.extend_from_slice(n.as_bytes());
        out.push(0);
    }
    out
}

fn encode_property_list(
    schema_names: &[String],
    properties: &[(String, Value)],
) -> Result<Vec<u8>, LoaderError> {
    let mut body = Vec::new();
    let mut count: u16 = 0;
    for (name, value) in properties {
        if value.is_null() {
            continue;
        }
        let index = schema_names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| LoaderError::schema_error(name.clone()))? as u16;
        body.extend_from_slice(&index.to_le_bytes());
        encode_value(&mut body, value)?;
        count += 1;
    }
    let mut out = Vec::with_capacity(2 + body.len());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

fn encode_node_record(
    schema_names: &[String],
    properties: &[(String, Value)],
) -> Result<Vec<u8>, LoaderError> {
    encode_property_list(schema_names, properties)
}

fn encode_relation_record(
    src: u64,
    dest: u64,
    schema_names: &[String],
    properties: &[(String, Value)],
) -> Result<Vec<u8>, LoaderError> {
    let mut out = Vec::new();
    out.extend_from_slice(&src.to_le_bytes());
    out.extend_from_slice(&dest.to_le_bytes());
    out.extend_from_slice(&encode_property_list(schema_names, properties)?);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct FakeLink {
        sent: RefCell<Vec<(String, Vec<Vec<u8>>)>>,
    }

    impl ServerLink for FakeLink {
        type Reply = ();

        fn send(&mut self, command: &str, args: &[Vec<u8>]) -> Result<(), LoaderError> {
            self.sent
                .borrow_mut()
                .push((command.to_string(), args.to_vec()));
            Ok(())
        }
    }

    fn props(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(n, v)| (n.to_string(), v.clone())).collect()
    }

    #[test]
    fn default_ceiling_batches_many_records_into_one_flush() {
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", DEFAULT_MAX_TOKEN_COUNT);
        for i in 0..50 {
            batch
                .append_node("Person", &props(&[("name", Value::String(format!("p{i}")))]))
                .unwrap();
        }
        let (report, _link) = batch.finish().unwrap();
        assert_eq!(report.total_nodes(), 50);
        assert_eq!(*report.nodes_by_label.get("Person").unwrap(), 50);
    }

    #[test]
    fn max_token_count_one_forces_a_flush_per_record_without_failing() {
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", 1);
        for i in 0..5 {
            batch
                .append_node("Person", &props(&[("name", Value::String(format!("p{i}")))]))
                .unwrap();
        }
        let (report, _link) = batch.finish().unwrap();
        assert_eq!(report.total_nodes(), 5);
    }

    #[test]
    fn declared_schema_survives_a_sparse_first_row() {
        // The first "Person" row omits "age" (a null cell); a later row
        // supplies it. Without declaring the header-derived schema up
        // front, the label schema would be fixed to just ["name"] from
        // the first call and the second row's "age" would be unresolvable.
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", DEFAULT_MAX_TOKEN_COUNT);
        batch.declare_label_schema("Person", &["name".to_string(), "age".to_string()]);
        batch
            .append_node("Person", &props(&[("name", Value::String("a".into()))]))
            .unwrap();
        batch
            .append_node(
                "Person",
                &props(&[
                    ("name", Value::String("b".into())),
                    ("age", Value::Int64(30)),
                ]),
            )
            .unwrap();
        let (report, _link) = batch.finish().unwrap();
        assert_eq!(report.total_nodes(), 2);
    }

    #[test]
    fn single_batch_run_sends_the_end_phase_not_begin() {
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", DEFAULT_MAX_TOKEN_COUNT);
        batch
            .append_node("Person", &props(&[("name", Value::String("a".into()))]))
            .unwrap();
        let (_report, link) = batch.finish().unwrap();
        let sent = link.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].1[2], vec![PHASE_END]);
    }

    #[test]
    fn multi_batch_run_sends_begin_then_mid_then_end() {
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", 1);
        for name in ["a", "b", "c"] {
            batch
                .append_node("Person", &props(&[("name", Value::String(name.to_string()))]))
                .unwrap();
        }
        let (_report, link) = batch.finish().unwrap();
        let sent = link.sent.borrow();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].1[2], vec![PHASE_BEGIN]);
        assert_eq!(sent[1].1[2], vec![PHASE_MID]);
        assert_eq!(sent[2].1[2], vec![PHASE_END]);
    }

    #[test]
    fn oversized_record_is_rejected_independent_of_token_count() {
        let link = FakeLink::default();
        let mut batch = BatchBuilder::new(link, "g", DEFAULT_MAX_TOKEN_COUNT).with_max_record_bytes(8);
        let err = batch
            .append_node("Person", &props(&[("name", Value::String("far too long a value".into()))]))
            .unwrap_err();
        assert!(matches!(err, LoaderError::OversizedRow { .. }));
    }

    #[test]
    fn null_properties_are_omitted_from_the_encoded_record() {
        let schema = vec!["name".to_string(), "age".to_string()];
        let properties = props(&[("name", Value::String("a".into())), ("age", Value::Null)]);
        let record = encode_node_record(&schema, &properties).unwrap();
        // u2 count == 1, since age (null) is omitted.
        assert_eq!(u16::from_le_bytes([record[0], record[1]]), 1);
    }
}
