//! HTTP gateway tying the data-plane core (spec §4) to the collaborators
//! and HTTP surface named in spec §6.

pub mod archiver;
pub mod cluster;
pub mod collaborators;
pub mod config;
pub mod destroyer;
pub mod error;
pub mod handoff_requestor;
pub mod handoff_server;
pub mod http;
pub mod retriever;

pub use archiver::{ArchiveOutcome, Archiver};
pub use cluster::Cluster;
pub use config::Config;
pub use destroyer::Destroyer;
pub use error::GatewayError;
pub use handoff_requestor::HandoffRequestor;
pub use handoff_server::{HandoffRecord, HandoffServer, InMemoryHandoffServer};
pub use retriever::{Retriever, RetrieveStream};
