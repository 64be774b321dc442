//! Orchestrates one bulk-load run: verify the target graph is empty,
//! load every node file, then every relationship file, then create any
//! requested indices.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use loader_codec::schema::{IdMode, SchemaMode};
use loader_codec::BatchBuilder;
use loader_core::{IdentifierMap, LoadReport, LoaderError, ServerLink};
use loader_io::{NodeFile, RedisLink, RelationFile};
use tracing::info;

use crate::cli::{index_specs, pairs, Args};

/// De-duplicates `(label, property)` pairs while preserving first-seen
/// order, so a repeated `--index Label:Property` on the command line
/// creates exactly one index rather than one per repetition.
fn dedup_pairs(pairs: Vec<(String, String)>) -> Vec<(String, String)> {
    let mut seen = BTreeSet::new();
    pairs
        .into_iter()
        .filter(|pair| seen.insert(pair.clone()))
        .collect()
}

fn label_from_stem(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default()
        .to_string()
}

fn parse_id_mode(raw: &str) -> Result<IdMode> {
    match raw.to_ascii_uppercase().as_str() {
        "STRING" => Ok(IdMode::String),
        "INTEGER" => Ok(IdMode::Integer),
        other => bail!("unknown --id-type '{other}', expected STRING or INTEGER"),
    }
}

pub fn run(args: &Args) -> Result<LoadReport> {
    let id_mode = parse_id_mode(&args.id_type)?;

    let mut link = RedisLink::connect(&args.host, args.port, args.password.as_deref())
        .context("connecting to the graph server")?;
    link.ensure_graph_is_empty(&args.graph_name)
        .context("checking that the target graph is empty")?;

    let (mut report, mut link) = load_all_files(link, args, id_mode)?;

    // Repeated `--index`/`--full-text-index` pairs must create exactly one
    // index each, not one per occurrence on the command line.
    for (label, property) in dedup_pairs(index_specs(&args.index)?) {
        info!(label, property, "creating index");
        link.create_index(&args.graph_name, &label, &property)?;
        report.indices_created += 1;
    }
    for (label, property) in dedup_pairs(index_specs(&args.full_text_index)?) {
        info!(label, property, "creating full-text index");
        link.create_full_text_index(&args.graph_name, &label, &property)?;
        report.indices_created += 1;
    }

    Ok(report)
}

/// The link-generic core of a bulk-load run: reads every node file, then
/// every relationship file, into `link` via a [`BatchBuilder`], and hands
/// both the resulting [`LoadReport`] and the link back to the caller.
///
/// Split out from [`run`] so it can be exercised against a fake
/// [`ServerLink`] in tests without needing a live Redis connection or
/// `RedisLink`'s Redis-specific inherent methods (`ensure_graph_is_empty`,
/// `create_index`, ...), which stay in `run` around this core.
fn load_all_files<L: ServerLink>(
    link: L,
    args: &Args,
    id_mode: IdMode,
) -> Result<(LoadReport, L), LoaderError> {
    let schema_mode = if args.enforce_schema {
        SchemaMode::Enforced
    } else {
        SchemaMode::Inferred
    };
    let separator = args.separator_byte();

    let mut identifiers = IdentifierMap::new();
    let mut batch = BatchBuilder::new(link, args.graph_name.clone(), args.max_token_count);

    let node_jobs = node_jobs(args);
    for (label, path) in &node_jobs {
        info!(label, path = %path.display(), "loading node file");
        let file = NodeFile::open(path, separator, schema_mode, id_mode)?;
        batch.declare_label_schema(label, &file.property_names());
        for row in file {
            let row = row?;
            identifiers.register(row.namespace.as_deref(), &row.raw_identifier)?;
            batch.append_node(label, &row.properties)?;
        }
    }

    let relation_jobs = relation_jobs(args);
    for (rel_type, path) in &relation_jobs {
        info!(rel_type, path = %path.display(), "loading relationship file");
        let file = RelationFile::open(path, separator, schema_mode)?;
        batch.declare_type_schema(rel_type, &file.property_names());
        for row in file {
            let row = row?;
            let src = identifiers.resolve(row.start_namespace.as_deref(), &row.start_raw)?;
            let dest = identifiers.resolve(row.end_namespace.as_deref(), &row.end_raw)?;
            batch.append_relation(rel_type, src, dest, &row.properties)?;
        }
    }

    batch.finish()
}

/// Renders the final human-readable summary printed by the CLI, in the
/// exact per-label/per-type/total shape the loaded graph is checked
/// against (e.g. a literal `"27 nodes created"` line, not folded into a
/// combined `"total: N nodes, M relations"` sentence).
pub fn format_report(graph_name: &str, report: &LoadReport) -> String {
    let mut out = String::new();
    out.push_str(&format!("graph '{graph_name}' loaded:\n"));
    for (label, count) in &report.nodes_by_label {
        out.push_str(&format!("  {count} nodes created with label '{label}'\n"));
    }
    for (rel_type, count) in &report.relations_by_type {
        out.push_str(&format!("  {count} relations created for type '{rel_type}'\n"));
    }
    out.push_str(&format!("{} nodes created\n", report.total_nodes()));
    out.push_str(&format!("{} relations created\n", report.total_relations()));
    if report.indices_created > 0 {
        out.push_str(&format!("Indices created: {}\n", report.indices_created));
    }
    out
}

fn node_jobs(args: &Args) -> Vec<(String, PathBuf)> {
    let mut jobs: Vec<(String, PathBuf)> = args
        .nodes
        .iter()
        .map(|p| (label_from_stem(p), p.clone()))
        .collect();
    jobs.extend(
        pairs(&args.nodes_with_label)
            .into_iter()
            .map(|(label, path)| (label, PathBuf::from(path))),
    );
    jobs
}

fn relation_jobs(args: &Args) -> Vec<(String, PathBuf)> {
    let mut jobs: Vec<(String, PathBuf)> = args
        .relations
        .iter()
        .map(|p| (label_from_stem(p), p.clone()))
        .collect();
    jobs.extend(
        pairs(&args.relations_with_type)
            .into_iter()
            .map(|(rel_type, path)| (rel_type, PathBuf::from(path))),
    );
    jobs
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::io::Write;

    #[test]
    fn dedup_pairs_keeps_first_seen_order_and_drops_repeats() {
        let pairs = vec![
            ("Person".to_string(), "name".to_string()),
            ("Country".to_string(), "code".to_string()),
            ("Person".to_string(), "name".to_string()),
        ];
        assert_eq!(
            dedup_pairs(pairs),
            vec![
                ("Person".to_string(), "name".to_string()),
                ("Country".to_string(), "code".to_string()),
            ]
        );
    }

    #[test]
    fn label_from_stem_strips_directory_and_extension() {
        assert_eq!(label_from_stem(Path::new("/data/people.csv")), "people");
    }

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

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn test_args(
        nodes_with_label: Vec<String>,
        relations_with_type: Vec<String>,
    ) -> Args {
        Args {
            graph_name: "social".to_string(),
            nodes: vec![],
            nodes_with_label,
            relations: vec![],
            relations_with_type,
            separator: ",".to_string(),
            enforce_schema: false,
            id_type: "STRING".to_string(),
            index: vec![],
            full_text_index: vec![],
            max_token_count: loader_codec::DEFAULT_MAX_TOKEN_COUNT,
            host: "127.0.0.1".to_string(),
            port: 6379,
            password: None,
            verbose: false,
        }
    }

    #[test]
    fn load_all_files_reports_per_label_and_per_type_counts() {
        let people = write_csv("_identifier,name\n0,Alice\n1,Bob\n2,Carol\n");
        let knows = write_csv("src,dst\n0,1\n1,2\n");

        let args = test_args(
            vec!["Person".to_string(), people.path().display().to_string()],
            vec!["KNOWS".to_string(), knows.path().display().to_string()],
        );

        let (report, _link) =
            load_all_files(FakeLink::default(), &args, IdMode::String).unwrap();

        assert_eq!(report.total_nodes(), 3);
        assert_eq!(report.total_relations(), 2);
        assert_eq!(*report.nodes_by_label.get("Person").unwrap(), 3);
        assert_eq!(*report.relations_by_type.get("KNOWS").unwrap(), 2);
    }

    #[test]
    fn load_all_files_sends_a_graph_bulk_command() {
        let people = write_csv("_identifier,name\n0,Alice\n");
        let args = test_args(
            vec!["Person".to_string(), people.path().display().to_string()],
            vec![],
        );

        let (_report, link) =
            load_all_files(FakeLink::default(), &args, IdMode::String).unwrap();
        let sent = link.sent.borrow();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "GRAPH.BULK");
        assert_eq!(sent[0].1[0], b"social".to_vec());
    }

    #[test]
    fn load_all_files_fixes_label_schema_from_the_header_not_a_sparse_first_row() {
        // Carol's row is missing "age" (null cell); Dave's later row
        // supplies it. This must not fail with a schema error.
        let people = write_csv("_identifier,name,age\n0,Carol,\n1,Dave,40\n");
        let args = test_args(
            vec!["Person".to_string(), people.path().display().to_string()],
            vec![],
        );

        let (report, _link) =
            load_all_files(FakeLink::default(), &args, IdMode::String).unwrap();
        assert_eq!(report.total_nodes(), 2);
    }

    #[test]
    fn format_report_prints_literal_nodes_created_and_relations_created_lines() {
        let mut report = LoadReport::default();
        report.nodes_by_label.insert("Person".to_string(), 27);
        report.relations_by_type.insert("KNOWS".to_string(), 48);
        report.indices_created = 1;

        let text = format_report("social", &report);
        assert!(text.contains("27 nodes created"));
        assert!(text.contains("48 relations created"));
        assert!(text.contains("Indices created: 1"));
    }

    #[test]
    fn format_report_omits_the_indices_line_when_none_were_created() {
        let report = LoadReport::default();
        let text = format_report("social", &report);
        assert!(!text.contains("Indices created"));
    }
}
