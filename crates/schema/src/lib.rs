//! Schema validation and version resolution for CDV collections.
//!
//! Every supported collection has a compiled JSON-schema validator and a
//! resolved version string. Validators are compiled once at startup; version
//! resolution consults a remote index with layered caching and falls back to
//! a compiled-in default so the write path keeps working when the index is
//! unreachable.

pub mod registry;
pub mod resolver;

pub use registry::{SchemaError, SchemaRegistry};
pub use resolver::{DEFAULT_VERSION, ResolvedVersion, ResolverError, SchemaIndex, VersionResolver};
