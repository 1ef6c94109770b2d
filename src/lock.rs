//! Lock/status engine.
//!
//! Writability is evaluated by composing three scopes: the hive, the node,
//! and the individual partition key. A key is effectively writable iff the
//! hive is writable AND every one of its semaphores is writable AND every
//! semaphore's node is writable.
//!
//! The engine is purely advisory: it derives refusals from persisted status
//! rows and never takes storage-level locks. A refusal
//! ([`HiveError::ReadOnly`]) is terminal for the caller and is never
//! retried internally.

use std::fmt;

use crate::error::{HiveError, Result};
use crate::meta::{KeySemaphore, Node};
use crate::types::Status;

/// The scope that refused a write.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LockScope {
    /// The whole hive is frozen.
    Hive,
    /// One data node is frozen.
    Node,
    /// One partition key is frozen.
    Key,
}

impl fmt::Display for LockScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Hive => write!(f, "hive"),
            Self::Node => write!(f, "node"),
            Self::Key => write!(f, "key"),
        }
    }
}

/// Refuses the operation unless `status` is writable.
///
/// `label` names the refused target in the error, e.g. the node name or
/// the partition key value.
pub fn require_writable(scope: LockScope, status: Status, label: impl fmt::Display) -> Result<()> {
    if status.is_writable() {
        Ok(())
    } else {
        Err(HiveError::read_only(
            scope,
            format!("{} '{}' is read-only", scope, label),
        ))
    }
}

/// Refuses the operation unless every semaphore and its node are writable.
///
/// `node_of` resolves a semaphore's node against the current metadata
/// snapshot; semaphores whose node has vanished from the graph (a stale
/// directory row) do not block, matching the rule that node status only
/// composes for live nodes.
pub fn require_semaphores_writable<'a, F>(
    semaphores: &[KeySemaphore],
    node_of: F,
    key_label: impl fmt::Display,
) -> Result<()>
where
    F: Fn(&KeySemaphore) -> Option<&'a Node>,
{
    for semaphore in semaphores {
        if let Some(node) = node_of(semaphore) {
            require_writable(LockScope::Node, node.status, &node.name)?;
        }
        require_writable(LockScope::Key, semaphore.status, &key_label)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeId;

    fn node(id: u32, status: Status) -> Node {
        Node {
            id: NodeId(id),
            status,
            ..Node::new(format!("n{}", id), "db://x")
        }
    }

    #[test]
    fn test_require_writable_passes() {
        assert!(require_writable(LockScope::Hive, Status::Writable, "hive").is_ok());
    }

    #[test]
    fn test_require_writable_refuses_with_scope() {
        let err = require_writable(LockScope::Node, Status::ReadOnly, "n1").unwrap_err();
        match err {
            HiveError::ReadOnly { scope, reason } => {
                assert_eq!(scope, LockScope::Node);
                assert!(reason.contains("n1"));
            }
            other => panic!("expected ReadOnly, got {:?}", other),
        }
    }

    #[test]
    fn test_semaphores_all_writable() {
        let nodes = [node(1, Status::Writable), node(2, Status::Writable)];
        let semaphores = [
            KeySemaphore::new(NodeId(1), Status::Writable),
            KeySemaphore::new(NodeId(2), Status::Writable),
        ];
        let result = require_semaphores_writable(
            &semaphores,
            |s| nodes.iter().find(|n| n.id == s.node_id),
            42,
        );
        assert!(result.is_ok());
    }

    #[test]
    fn test_any_read_only_semaphore_refuses() {
        let nodes = [node(1, Status::Writable), node(2, Status::Writable)];
        let semaphores = [
            KeySemaphore::new(NodeId(1), Status::Writable),
            KeySemaphore::new(NodeId(2), Status::ReadOnly),
        ];
        let err = require_semaphores_writable(
            &semaphores,
            |s| nodes.iter().find(|n| n.id == s.node_id),
            42,
        )
        .unwrap_err();
        assert!(matches!(err, HiveError::ReadOnly { scope: LockScope::Key, .. }));
    }

    #[test]
    fn test_read_only_node_refuses() {
        let nodes = [node(1, Status::ReadOnly)];
        let semaphores = [KeySemaphore::new(NodeId(1), Status::Writable)];
        let err = require_semaphores_writable(
            &semaphores,
            |s| nodes.iter().find(|n| n.id == s.node_id),
            42,
        )
        .unwrap_err();
        assert!(matches!(err, HiveError::ReadOnly { scope: LockScope::Node, .. }));
    }

    #[test]
    fn test_vanished_node_does_not_block() {
        let semaphores = [KeySemaphore::new(NodeId(9), Status::Writable)];
        let result = require_semaphores_writable(&semaphores, |_| None, 42);
        assert!(result.is_ok());
    }
}
