//! Replication Module
//!
//! Keeps each user's primary copy on this node and the mirror on the user's
//! backup node in step.

pub mod coordinator;
pub mod deficiency;
pub mod protocol;
pub mod replica;

pub use coordinator::ReplicationCoordinator;
pub use deficiency::{Deficiency, DeficiencyKind, DeficiencyTracker};
pub use protocol::{FrameHeader, Message};
pub use replica::{LocalReplica, RemoteConnector, RemoteReplica, Replica, ReplicaConnector};
