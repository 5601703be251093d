#![forbid(unsafe_code)]
#![warn(missing_docs)]
//! **toolhost-types** – manifest, schema, and configuration types shared by
//! every other crate in the tool host.
//!
//! This crate is intentionally inert: nothing here holds a lock, a socket,
//! or a file handle. Every type is `Clone + Serialize + Deserialize` so it
//! can cross the HTTP boundary or sit in an in-memory catalogue without
//! fuss. Runtime state (process handles, health counters) lives in
//! `toolhost-executor` and `toolhost-registry`.

pub mod config;
pub mod error;
pub mod manifest;
pub mod schema;

pub use config::HostConfig;
pub use error::ManifestError;
pub use manifest::{HealthSpec, Mode, RuntimeSpec, ToolManifest, Transport};
pub use schema::{MethodDescriptor, SchemaNode, SchemaType};
