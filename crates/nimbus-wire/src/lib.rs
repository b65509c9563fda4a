//! Wire schema and cluster topology shared by the gateway and storage nodes.
//!
//! Nothing in this crate performs I/O beyond the byte-level framing in
//! [`framing`]; it exists so the gateway and a storage node implementation can
//! agree on message shapes without either depending on the other's internals.

pub mod framing;
pub mod ids;
pub mod message;
pub mod topology;

pub use ids::{MessageId, UnifiedId};
pub use message::{Reply, Request, ResultCode, SegmentHeader};
pub use topology::{Topology, TopologyError};
