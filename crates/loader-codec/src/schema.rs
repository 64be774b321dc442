//! Header interpretation: turns a raw CSV header row into an ordered list
//! of [`ColumnDescriptor`]s, under either inferred or enforced schema
//! mode.

use loader_core::{ColumnDescriptor, LoaderError, Role, TypeTag};

/// Whether a file's header is interpreted by positional/underscore
/// convention (`Inferred`) or by explicit `name:TYPE` tags
/// (`Enforced`), per `--enforce-schema`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaMode {
    Inferred,
    Enforced,
}

/// How a node file's raw identifier text is validated, per `--id-type`.
///
/// The identifier is always used as an opaque lookup key regardless of
/// this setting; `Integer` additionally requires the raw text to parse
/// as an `i64`, matching the source tool's stricter id-type option.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdMode {
    #[default]
    String,
    Integer,
}

impl IdMode {
    pub fn validate(&self, raw: &str) -> Result<(), LoaderError> {
        match self {
            IdMode::String => Ok(()),
            IdMode::Integer => raw
                .parse::<i64>()
                .map(|_| ())
                .map_err(|_| LoaderError::schema_error(raw)),
        }
    }
}

/// Resolves a node file's header into column descriptors.
///
/// Inferred mode: a column literally named `_identifier` becomes the
/// node's identifier column; otherwise the first column takes that role
/// by position alone (a column merely named `id` is not special-cased).
/// Any other `_`-prefixed column is a private, non-property column.
///
/// Enforced mode: every cell is a `name:TAG` (or bare `TAG`) declaration,
/// optionally suffixed with `(namespace)`; exactly one `ID` column is
/// required.
pub fn resolve_node_header(
    headers: &[String],
    mode: SchemaMode,
) -> Result<Vec<ColumnDescriptor>, LoaderError> {
    match mode {
        SchemaMode::Inferred => Ok(resolve_inferred_node_header(headers)),
        SchemaMode::Enforced => resolve_enforced_node_header(headers),
    }
}

/// Resolves a relationship file's header into column descriptors.
///
/// Inferred mode: the first two columns are positionally the start and
/// end identifiers, with no namespace. Enforced mode requires exactly
/// one `START_ID` and one `END_ID` column, each optionally namespaced.
pub fn resolve_relation_header(
    headers: &[String],
    mode: SchemaMode,
) -> Result<Vec<ColumnDescriptor>, LoaderError> {
    match mode {
        SchemaMode::Inferred => resolve_inferred_relation_header(headers),
        SchemaMode::Enforced => resolve_enforced_relation_header(headers),
    }
}

fn resolve_inferred_node_header(headers: &[String]) -> Vec<ColumnDescriptor> {
    let identifier_index = headers
        .iter()
        .position(|h| h == "_identifier")
        .unwrap_or(0);

    headers
        .iter()
        .enumerate()
        .map(|(i, h)| {
            if i == identifier_index {
                ColumnDescriptor {
                    header_name: h.clone(),
                    logical_name: h.clone(),
                    type_tag: TypeTag::Id,
                    role: Role::Identifier { namespace: None },
                }
            } else if h.starts_with('_') {
                ColumnDescriptor {
                    header_name: h.clone(),
                    logical_name: h.clone(),
                    type_tag: TypeTag::Ignore,
                    role: Role::Ignore,
                }
            } else {
                ColumnDescriptor {
                    header_name: h.clone(),
                    logical_name: h.clone(),
                    type_tag: TypeTag::String,
                    role: Role::Property,
                }
            }
        })
        .collect()
}

fn resolve_inferred_relation_header(headers: &[String]) -> Result<Vec<ColumnDescriptor>, LoaderError> {
    if headers.len() < 2 {
        return Err(LoaderError::RelationArity);
    }
    Ok(headers
        .iter()
        .enumerate()
        .map(|(i, h)| match i {
            0 => ColumnDescriptor {
                header_name: h.clone(),
                logical_name: h.clone(),
                type_tag: TypeTag::StartId,
                role: Role::StartId { namespace: None },
            },
            1 => ColumnDescriptor {
                header_name: h.clone(),
                logical_name: h.clone(),
                type_tag: TypeTag::EndId,
                role: Role::EndId { namespace: None },
            },
            _ if h.starts_with('_') => ColumnDescriptor {
                header_name: h.clone(),
                logical_name: h.clone(),
                type_tag: TypeTag::Ignore,
                role: Role::Ignore,
            },
            _ => ColumnDescriptor {
                header_name: h.clone(),
                logical_name: h.clone(),
                type_tag: TypeTag::String,
                role: Role::Property,
            },
        })
        .collect())
}

fn resolve_enforced_node_header(headers: &[String]) -> Result<Vec<ColumnDescriptor>, LoaderError> {
    let descriptors: Vec<ColumnDescriptor> = headers
        .iter()
        .map(|h| parse_enforced_cell(h))
        .collect::<Result<_, _>>()?;
    if !descriptors
        .iter()
        .any(|d| matches!(d.role, Role::Identifier { .. }))
    {
        return Err(LoaderError::schema_error(format!(
            "node header is missing a required ID column: {}",
            headers.join(",")
        )));
    }
    Ok(descriptors)
}

fn resolve_enforced_relation_header(
    headers: &[String],
) -> Result<Vec<ColumnDescriptor>, LoaderError> {
    let descriptors: Vec<ColumnDescriptor> = headers
        .iter()
        .map(|h| parse_enforced_cell(h))
        .collect::<Result<_, _>>()?;
    let has_start = descriptors.iter().any(|d| matches!(d.role, Role::StartId { .. }));
    let has_end = descriptors.iter().any(|d| matches!(d.role, Role::EndId { .. }));
    if !has_start || !has_end {
        return Err(LoaderError::schema_error(format!(
            "relationship header is missing START_ID/END_ID: {}",
            headers.join(",")
        )));
    }
    Ok(descriptors)
}

/// Parses one enforced-mode header cell, e.g. `"age:INT"`,
/// `"uid:ID(User)"`, `"START_ID(User)"`, or bare `"IGNORE"`.
fn parse_enforced_cell(cell: &str) -> Result<ColumnDescriptor, LoaderError> {
    let header_name = cell.to_string();
    let (main, namespace) = split_namespace_suffix(cell);
    let (name_part, tag_part) = match main.rsplit_once(':') {
        Some((n, t)) => (n, t),
        None => ("", main),
    };
    let tag_upper = tag_part.trim().to_uppercase();
    let (type_tag, role) = match tag_upper.as_str() {
        "ID" => (TypeTag::Id, Role::Identifier { namespace }),
        "START_ID" => (TypeTag::StartId, Role::StartId { namespace }),
        "END_ID" => (TypeTag::EndId, Role::EndId { namespace }),
        "IGNORE" => (TypeTag::Ignore, Role::Ignore),
        "STRING" => (TypeTag::String, Role::Property),
        "INT" => (TypeTag::Int, Role::Property),
        "LONG" => (TypeTag::Long, Role::Property),
        "FLOAT" => (TypeTag::Float, Role::Property),
        "DOUBLE" => (TypeTag::Double, Role::Property),
        "BOOLEAN" | "BOOL" => (TypeTag::Boolean, Role::Property),
        "ARRAY" => (TypeTag::Array, Role::Property),
        _ => return Err(LoaderError::schema_error(header_name)),
    };
    // `ID`/`START_ID`/`END_ID` columns may be declared bare (`ID(User)`)
    // or named (`uid:ID(User)`). The bare form has no logical name of its
    // own — `logical_name` is left empty so callers can tell "anonymous
    // identifier column" apart from "identifier column the user also
    // wants exposed as a property under this name" (see `EntityFile`).
    // Property/Ignore columns always carry a real name in practice, so
    // they keep the declared-tag fallback.
    let logical_name = if !name_part.is_empty() {
        name_part.trim().to_string()
    } else if matches!(role, Role::Identifier { .. } | Role::StartId { .. } | Role::EndId { .. }) {
        String::new()
    } else {
        tag_part.trim().to_string()
    };
    Ok(ColumnDescriptor {
        header_name,
        logical_name,
        type_tag,
        role,
    })
}

fn split_namespace_suffix(cell: &str) -> (&str, Option<String>) {
    let trimmed = cell.trim();
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.rfind('(') {
            let namespace = &trimmed[open + 1..trimmed.len() - 1];
            return (&trimmed[..open], Some(namespace.to_string()));
        }
    }
    (trimmed, None)
}
