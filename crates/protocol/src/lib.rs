//! Wire types for the Knugget session sync subsystem.
//!
//! This crate contains the serde-serializable shapes exchanged between the
//! background process, page agents, the website, and the host binary. These
//! types represent the "protocol layer": the shapes of data as they appear in
//! durable storage and on message channels.
//!
//! # Design Philosophy
//!
//! Types in this crate are:
//! * Pure data: No behavior beyond serialization and small read-only queries
//! * 1:1 with the wire: `{type, payload}` envelopes, camelCase records
//! * Stable: Changes only when the stored or exchanged shape changes
//!
//! Session orchestration is built on top of these types in `knugget-core`.

pub mod api;
pub mod host;
pub mod message;
pub mod session;
pub mod settings;

pub use api::*;
pub use host::*;
pub use message::*;
pub use session::*;
pub use settings::*;
