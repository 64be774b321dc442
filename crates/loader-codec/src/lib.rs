//! # loader-codec
//!
//! The parsing, coercion, binary-encoding, and batching engine of the bulk
//! graph loader. Everything in this crate is pure — it touches no files
//! and no sockets, which is what keeps it unit-testable without a live
//! graph server.
//!
//! - [`typecodec`] parses cell strings into [`loader_core::Value`] under
//!   inferred or enforced mode, and encodes typed values into the wire
//!   format described by the crate-level design notes.
//! - [`schema`] interprets a header row into an ordered list of
//!   [`loader_core::ColumnDescriptor`]s.
//! - [`batch`] accumulates encoded records into size-bounded batches and
//!   flushes them through a [`loader_core::ServerLink`].

pub mod batch;
pub mod schema;
pub mod typecodec;

pub use batch::{BatchBuilder, DEFAULT_MAX_TOKEN_COUNT};
pub use schema::{resolve_node_header, resolve_relation_header, IdMode, SchemaMode};
