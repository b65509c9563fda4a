//! Per-node socket client and the two write-path adapters built on it
//! (spec §4.1, §4.4, §4.5).

mod data_writer;
mod dialer;
mod error;
mod handoff_client;
mod node_client;
mod registry;
#[cfg(test)]
mod tests;
mod write_adapter;

pub use data_writer::DataWriter;
pub use dialer::{Dialer, TcpDialer};
pub use error::NodeClientError;
pub use handoff_client::HandoffClient;
pub use node_client::NodeClient;
pub use registry::{ClusterClients, RegistryError};
pub use write_adapter::{
    ArchiveFinal, ArchiveSlice, Destroy, StartArchive, WriteAdapter, WriteAdapterError,
};
