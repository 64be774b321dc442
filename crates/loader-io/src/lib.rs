//! # loader-io
//!
//! The only crate in the workspace that touches a filesystem or a
//! socket: [`entity_file`] drives a node or relationship CSV through
//! `loader-codec`'s schema resolution and type coercion, and
//! [`redis_link`] implements [`loader_core::ServerLink`] over a
//! synchronous `redis::Connection`.

pub mod entity_file;
pub mod redis_link;

pub use entity_file::{NodeFile, NodeRow, RelationFile, RelationRow};
pub use redis_link::RedisLink;
