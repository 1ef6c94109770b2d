//! Connection acquisition for data nodes.
//!
//! The hive routes keys to nodes but does not speak the nodes' wire
//! protocol. Embedders supply a [`ConnectionSource`] that turns a node URI
//! into whatever connection type their driver provides; the hive wraps the
//! result in a [`NodeConnection`] handle carrying the routing decision.
//!
//! The bundled [`DirectConnectionSource`] performs no I/O: it hands out
//! plain handles, which is enough for routing-only deployments and tests.

use crate::error::Result;
use crate::types::NodeId;

/// A connection handle to one data node.
///
/// The handle is owned by the caller; releasing it on every exit path is
/// the caller's responsibility. Read-intent handles carry the read-only
/// flag so drivers can set the session read-only.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConnection {
    node_id: NodeId,
    uri: String,
    read_only: bool,
}

impl NodeConnection {
    /// Creates a handle for `node_id` at `uri`.
    pub fn new(node_id: NodeId, uri: impl Into<String>, read_only: bool) -> Self {
        Self {
            node_id,
            uri: uri.into(),
            read_only,
        }
    }

    /// The node this connection is routed to.
    #[inline]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// The node's connect string.
    #[inline]
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// True if the connection was opened for read-only access.
    #[inline]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }
}

/// Opens connections to data nodes.
///
/// Implementations must be `Send + Sync`; the hive calls `open` from any
/// thread. Errors are re-raised to the caller after the hive records a
/// connection failure.
pub trait ConnectionSource: Send + Sync {
    /// Opens a connection to the node at `uri`.
    ///
    /// `read_only` is set when the caller declared read intent; the source
    /// should put the session into read-only mode where the driver
    /// supports it.
    fn open(&self, node_id: NodeId, uri: &str, read_only: bool) -> Result<NodeConnection>;
}

/// The default connection source: hands out plain handles without I/O.
#[derive(Clone, Copy, Debug, Default)]
pub struct DirectConnectionSource;

impl ConnectionSource for DirectConnectionSource {
    fn open(&self, node_id: NodeId, uri: &str, read_only: bool) -> Result<NodeConnection> {
        Ok(NodeConnection::new(node_id, uri, read_only))
    }
}
