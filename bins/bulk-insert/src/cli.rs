//! Command-line surface for `bulk-insert`.

use std::path::PathBuf;

use clap::Parser;
use loader_codec::DEFAULT_MAX_TOKEN_COUNT;

/// Bulk-loads CSV node and relationship files into a graph database in
/// one pass, batching encoded records and streaming them over a single
/// connection.
///
/// Node files are labeled either by their filename stem (`--nodes`) or
/// an explicit label (`--nodes-with-label Label file.csv`); relationship
/// files work the same way with `--relations` / `--relations-with-type`.
/// All node files are loaded before any relationship file, since
/// relationship rows resolve identifiers that must already have been
/// registered.
#[derive(Parser, Debug)]
#[command(name = "bulk-insert", version, about)]
pub struct Args {
    /// Name of the graph key to create on the server.
    pub graph_name: String,

    /// Node CSV file(s); the label is taken from each file's stem.
    #[arg(long = "nodes", value_name = "CSV_FILE")]
    pub nodes: Vec<PathBuf>,

    /// Node CSV file(s) with an explicit label: `--nodes-with-label Label file.csv`.
    #[arg(long = "nodes-with-label", value_names = ["LABEL", "CSV_FILE"], num_args = 2)]
    pub nodes_with_label: Vec<String>,

    /// Relationship CSV file(s); the type is taken from each file's stem.
    #[arg(long = "relations", value_name = "CSV_FILE")]
    pub relations: Vec<PathBuf>,

    /// Relationship CSV file(s) with an explicit type: `--relations-with-type Type file.csv`.
    #[arg(long = "relations-with-type", value_names = ["TYPE", "CSV_FILE"], num_args = 2)]
    pub relations_with_type: Vec<String>,

    /// Field separator character for every input file.
    #[arg(long, default_value = ",")]
    pub separator: String,

    /// Interpret headers as explicit `name:TYPE` declarations instead of
    /// inferring types from cell contents.
    #[arg(long)]
    pub enforce_schema: bool,

    /// How identifier columns are validated: `STRING` (default, any
    /// text) or `INTEGER` (must parse as a 64-bit integer).
    #[arg(long, default_value = "STRING")]
    pub id_type: String,

    /// Create an exact-match index: `--index Label:property`. Repeatable.
    #[arg(long, value_name = "LABEL:PROPERTY")]
    pub index: Vec<String>,

    /// Create a full-text index: `--full-text-index Label:property`. Repeatable.
    #[arg(long = "full-text-index", value_name = "LABEL:PROPERTY")]
    pub full_text_index: Vec<String>,

    /// Maximum number of server-command arguments a batch may accumulate
    /// before it is flushed.
    #[arg(long, default_value_t = DEFAULT_MAX_TOKEN_COUNT)]
    pub max_token_count: u64,

    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    #[arg(long, default_value_t = 6379)]
    pub port: u16,

    #[arg(long)]
    pub password: Option<String>,

    /// Enable debug-level logging (equivalent to `RUST_LOG=debug`).
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Flattens a `num_args = 2` repeated flag's values into `(a, b)` pairs.
pub fn pairs(flat: &[String]) -> Vec<(String, String)> {
    flat.chunks_exact(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect()
}

/// Splits each `LABEL:PROPERTY` token from a repeated `--index`/
/// `--full-text-index` flag into a `(label, property)` pair.
pub fn index_specs(flat: &[String]) -> anyhow::Result<Vec<(String, String)>> {
    flat.iter()
        .map(|spec| {
            spec.split_once(':')
                .map(|(label, property)| (label.to_string(), property.to_string()))
                .ok_or_else(|| anyhow::anyhow!("expected LABEL:PROPERTY, got '{spec}'"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_specs_splits_on_first_colon() {
        let specs = index_specs(&["Person:name".to_string()]).unwrap();
        assert_eq!(specs, vec![("Person".to_string(), "name".to_string())]);
    }

    #[test]
    fn index_specs_rejects_a_token_without_a_colon() {
        assert!(index_specs(&["Person".to_string()]).is_err());
    }

    #[test]
    fn pairs_chunks_flat_num_args_values() {
        let flat = vec!["Person".to_string(), "people.csv".to_string()];
        assert_eq!(pairs(&flat), vec![("Person".to_string(), "people.csv".to_string())]);
    }
}

impl Args {
    pub fn separator_byte(&self) -> u8 {
        self.separator.as_bytes().first().copied().unwrap_or(b',')
    }
}
