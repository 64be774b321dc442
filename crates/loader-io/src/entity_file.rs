//! CSV-backed node and relationship file drivers.
//!
//! Both types read their header once at open time (resolving it through
//! `loader_codec::schema`) and then yield one row at a time, already
//! split into identifier text and a typed property list, so that
//! `bulk-insert`'s `Session` never touches a raw `csv::StringRecord`.

use std::fs::File;
use std::path::Path;

use loader_codec::schema::{resolve_node_header, resolve_relation_header, IdMode, SchemaMode};
use loader_codec::typecodec::{coerce_cell, infer_cell};
use loader_core::{ColumnDescriptor, LoaderError, Role, Value};
use tracing::debug;

type Records = csv::StringRecordsIntoIter<File>;

/// Opens `path`, reads its header row, and returns the header alongside
/// an owned iterator positioned at the first data row.
fn open_and_read_header(path: &Path, separator: u8) -> Result<(Vec<String>, Records), LoaderError> {
    let reader = csv::ReaderBuilder::new()
        .delimiter(separator)
        .has_headers(false)
        .flexible(true)
        .from_path(path)
        .map_err(|e| LoaderError::Csv(e.to_string()))?;
    let mut records = reader.into_records();
    let first = records
        .next()
        .ok_or_else(|| LoaderError::Csv("empty input file".to_string()))?
        .map_err(|e| LoaderError::Csv(e.to_string()))?;
    let header = first.iter().map(|c| c.to_string()).collect();
    Ok((header, records))
}

/// One decoded row of a node file: its identifier and its non-null,
/// non-identifier property values in column order.
#[derive(Debug)]
pub struct NodeRow {
    pub namespace: Option<String>,
    pub raw_identifier: String,
    pub properties: Vec<(String, Value)>,
}

pub struct NodeFile {
    records: Records,
    columns: Vec<ColumnDescriptor>,
    mode: SchemaMode,
    id_mode: IdMode,
}

impl NodeFile {
    pub fn open(
        path: &Path,
        separator: u8,
        mode: SchemaMode,
        id_mode: IdMode,
    ) -> Result<Self, LoaderError> {
        let (header, records) = open_and_read_header(path, separator)?;
        let columns = resolve_node_header(&header, mode)?;
        debug_assert!(columns
            .iter()
            .any(|c| matches!(c.role, Role::Identifier { .. })));
        debug!(path = %path.display(), columns = columns.len(), "opened node file");
        Ok(Self {
            records,
            columns,
            mode,
            id_mode,
        })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    /// The header-declared property columns, fixing this label's
    /// on-wire schema regardless of which cells any single row leaves
    /// null. Under enforced mode, a *named* `ID` column (`uid:ID(User)`,
    /// as opposed to a bare `ID(User)`) also exposes its value as a
    /// property under that name, so it is included here too.
    pub fn property_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_property() || self.is_named_identifier_column(c))
            .map(|c| c.logical_name.clone())
            .collect()
    }

    fn is_named_identifier_column(&self, column: &ColumnDescriptor) -> bool {
        self.mode == SchemaMode::Enforced
            && matches!(column.role, Role::Identifier { .. })
            && !column.logical_name.is_empty()
    }
}

impl Iterator for NodeFile {
    type Item = Result<NodeRow, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(LoaderError::Csv(e.to_string()))),
        };
        if record.len() != self.columns.len() {
            return Some(Err(LoaderError::ColumnCount {
                expected: self.columns.len(),
            }));
        }

        let mut namespace = None;
        let mut raw_identifier = String::new();
        let mut properties = Vec::new();

        for (cell, column) in record.iter().zip(self.columns.iter()) {
            match &column.role {
                Role::Identifier { namespace: ns } => {
                    if let Err(e) = self.id_mode.validate(cell) {
                        return Some(Err(e));
                    }
                    namespace = ns.clone();
                    raw_identifier = cell.to_string();
                    if self.is_named_identifier_column(column) {
                        let id_value = match self.id_mode {
                            IdMode::String => Value::String(cell.to_string()),
                            IdMode::Integer => match cell.parse::<i64>() {
                                Ok(n) => Value::Int64(n),
                                Err(_) => return Some(Err(LoaderError::schema_error(cell))),
                            },
                        };
                        properties.push((column.logical_name.clone(), id_value));
                    }
                }
                Role::Ignore => {}
                Role::Property => {
                    let value = match self.mode {
                        SchemaMode::Inferred => infer_cell(cell),
                        SchemaMode::Enforced => coerce_cell(cell, column.type_tag),
                    };
                    match value {
                        Ok(v) => {
                            if !v.is_null() {
                                properties.push((column.logical_name.clone(), v));
                            }
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Role::StartId { .. } | Role::EndId { .. } => {
                    unreachable!("node header never produces START_ID/END_ID columns")
                }
            }
        }

        Some(Ok(NodeRow {
            namespace,
            raw_identifier,
            properties,
        }))
    }
}

/// One decoded row of a relationship file: its endpoint identifiers and
/// its property values.
#[derive(Debug)]
pub struct RelationRow {
    pub start_namespace: Option<String>,
    pub start_raw: String,
    pub end_namespace: Option<String>,
    pub end_raw: String,
    pub properties: Vec<(String, Value)>,
}

pub struct RelationFile {
    records: Records,
    columns: Vec<ColumnDescriptor>,
    mode: SchemaMode,
}

impl RelationFile {
    pub fn open(path: &Path, separator: u8, mode: SchemaMode) -> Result<Self, LoaderError> {
        let (header, records) = open_and_read_header(path, separator)?;
        if header.len() < 2 {
            return Err(LoaderError::RelationArity);
        }
        let columns = resolve_relation_header(&header, mode)?;
        debug!(path = %path.display(), columns = columns.len(), "opened relationship file");
        Ok(Self { records, columns, mode })
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn property_names(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.is_property())
            .map(|c| c.logical_name.clone())
            .collect()
    }
}

impl Iterator for RelationFile {
    type Item = Result<RelationRow, LoaderError>;

    fn next(&mut self) -> Option<Self::Item> {
        let record = match self.records.next()? {
            Ok(r) => r,
            Err(e) => return Some(Err(LoaderError::Csv(e.to_string()))),
        };
        if record.len() < 2 {
            return Some(Err(LoaderError::RelationArity));
        }
        if record.len() != self.columns.len() {
            return Some(Err(LoaderError::ColumnCount {
                expected: self.columns.len(),
            }));
        }

        let mut start_namespace = None;
        let mut start_raw = String::new();
        let mut end_namespace = None;
        let mut end_raw = String::new();
        let mut properties = Vec::new();

        for (cell, column) in record.iter().zip(self.columns.iter()) {
            match &column.role {
                Role::StartId { namespace } => {
                    start_namespace = namespace.clone();
                    start_raw = cell.to_string();
                }
                Role::EndId { namespace } => {
                    end_namespace = namespace.clone();
                    end_raw = cell.to_string();
                }
                Role::Ignore => {}
                Role::Property => {
                    let value = match self.mode {
                        SchemaMode::Inferred => infer_cell(cell),
                        SchemaMode::Enforced => coerce_cell(cell, column.type_tag),
                    };
                    match value {
                        Ok(v) => {
                            if !v.is_null() {
                                properties.push((column.logical_name.clone(), v));
                            }
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Role::Identifier { .. } => {
                    unreachable!("relationship header never produces an ID column")
                }
            }
        }

        Some(Ok(RelationRow {
            start_namespace,
            start_raw,
            end_namespace,
            end_raw,
            properties,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn node_file_infers_types_and_splits_out_identifier() {
        let f = write_csv("_identifier,name,age\n0,Alice,30\n1,Bob,\n");
        let file = NodeFile::open(f.path(), b',', SchemaMode::Inferred, IdMode::String).unwrap();
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].raw_identifier, "0");
        assert_eq!(rows[0].properties[1].1, Value::Int64(30));
        // Bob's age cell is empty -> Null -> omitted entirely.
        assert_eq!(rows[1].properties.len(), 1);
    }

    #[test]
    fn named_enforced_id_column_is_also_exposed_as_a_string_property() {
        // Mirrors test13_id_namespaces: `id:ID(User)` is both the lookup
        // key and a queryable `id` property, stored as the raw string.
        let f = write_csv("id:ID(User),name:STRING\n0,Jeffrey\n1,Filipe\n");
        let file = NodeFile::open(f.path(), b',', SchemaMode::Enforced, IdMode::String).unwrap();
        assert_eq!(file.property_names(), vec!["id".to_string(), "name".to_string()]);
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].properties[0], ("id".to_string(), Value::String("0".to_string())));
    }

    #[test]
    fn named_enforced_id_column_is_an_integer_property_under_integer_id_mode() {
        // Mirrors test19_integer_ids: same header, `--id-type integer`.
        let f = write_csv("id:ID(User),name:STRING\n0,Jeffrey\n");
        let file = NodeFile::open(f.path(), b',', SchemaMode::Enforced, IdMode::Integer).unwrap();
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].properties[0], ("id".to_string(), Value::Int64(0)));
    }

    #[test]
    fn bare_enforced_id_column_is_not_exposed_as_a_property() {
        let f = write_csv("ID(User),name:STRING\n0,Jeffrey\n");
        let file = NodeFile::open(f.path(), b',', SchemaMode::Enforced, IdMode::String).unwrap();
        assert_eq!(file.property_names(), vec!["name".to_string()]);
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].properties, vec![("name".to_string(), Value::String("Jeffrey".to_string()))]);
    }

    #[test]
    fn inferred_mode_never_exposes_the_identifier_column_as_a_property() {
        let f = write_csv("_identifier,name\n0,Alice\n");
        let file = NodeFile::open(f.path(), b',', SchemaMode::Inferred, IdMode::String).unwrap();
        assert_eq!(file.property_names(), vec!["name".to_string()]);
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].properties, vec![("name".to_string(), Value::String("Alice".to_string()))]);
    }

    #[test]
    fn node_file_rejects_rows_with_wrong_column_count() {
        let f = write_csv("_identifier,name\n0,Alice,extra\n");
        let mut file = NodeFile::open(f.path(), b',', SchemaMode::Inferred, IdMode::String).unwrap();
        let err = file.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("Expected 2 columns"));
    }

    #[test]
    fn relation_file_is_positional_under_inferred_mode() {
        let f = write_csv("src,dst,since\n0,1,2020\n");
        let file = RelationFile::open(f.path(), b',', SchemaMode::Inferred).unwrap();
        let rows: Vec<_> = file.map(|r| r.unwrap()).collect();
        assert_eq!(rows[0].start_raw, "0");
        assert_eq!(rows[0].end_raw, "1");
        assert_eq!(rows[0].properties[0].1, Value::Int64(2020));
    }

    #[test]
    fn short_relation_row_is_a_fatal_arity_error() {
        let f = write_csv("src,dst\n0\n");
        let mut file = RelationFile::open(f.path(), b',', SchemaMode::Inferred).unwrap();
        let err = file.next().unwrap().unwrap_err();
        assert!(err.to_string().contains("at least 2 elements"));
    }
}
