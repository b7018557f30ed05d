//! Errors raised by the node framework.
//!
//! Configuration errors (duplicate registration, unknown types or fields,
//! exhausted capacities, mismatched routes) are authoring mistakes and are
//! normally forwarded to [`crate::fail::fatal`] by the embedding loop.
//! Logic errors such as stale handles surface as [`NodeError::InvalidHandle`]
//! so callers can tell them apart at the call site.

use thiserror::Error;

use crate::field::FieldKind;
use crate::world::{GroupId, NodeHandle};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NodeError {
    #[error("node type `{0}` is already registered")]
    DuplicateType(String),

    #[error("node type `{0}` is not registered")]
    UnknownType(String),

    #[error("node type `{type_name}` is out of slots (capacity {capacity})")]
    CapacityExhausted { type_name: String, capacity: usize },

    #[error("node table is full (capacity {capacity})")]
    NodeTableFull { capacity: usize },

    #[error("role `{role}` is declared twice in group `{group}`")]
    DuplicateRole { group: String, role: String },

    #[error("group `{group}` has no member with role `{role}`")]
    UnknownRole { group: String, role: String },

    #[error("node type `{type_name}` has no field `{field}`")]
    UnknownField { type_name: String, field: String },

    #[error("route {from} -> {to}: field sizes differ ({from_size} vs {to_size} bytes)")]
    FieldSizeMismatch {
        from: String,
        to: String,
        from_size: usize,
        to_size: usize,
    },

    #[error("{target}: expected {expected:?}, found {found:?}")]
    FieldKindMismatch {
        target: String,
        expected: FieldKind,
        found: FieldKind,
    },

    #[error("invalid value for {target}: {reason}")]
    InvalidValue { target: String, reason: String },

    #[error("role `{role}` in group `{group}` declares more than {max} routes")]
    TooManyRoutes {
        group: String,
        role: String,
        max: usize,
    },

    #[error("invalid node handle {0}")]
    InvalidHandle(NodeHandle),

    #[error("node {handle} is a `{found}`, not a `{expected}`")]
    WrongNodeType {
        handle: NodeHandle,
        expected: &'static str,
        found: &'static str,
    },

    #[error("group {0} is not live")]
    UnknownGroup(GroupId),

    #[error("group {0} is already live")]
    GroupInUse(GroupId),

    #[error("invalid update order: {0}")]
    UpdateOrder(String),

    #[error("node type `{type_name}` changed layout ({expected} bytes stored, {found} bytes registered)")]
    LayoutMismatch {
        type_name: String,
        expected: usize,
        found: usize,
    },
}

pub type NodeResult<T> = Result<T, NodeError>;
