//! Client-side networking: transports and pose replication

pub mod replication;
pub mod transport;

pub use replication::{RemoteEntity, ReplicationConfig, ReplicationEvent, Replicator};
pub use transport::{ChannelTransport, OfflineTransport, Transport, TransportError, TransportEvent};
