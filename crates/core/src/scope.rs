//! Resource-scope levels used to bound where a value or capability applies.

use crate::id::{AccountId, ExecutionId, FlowId, NodeId};

/// The level at which a piece of state or a capability is scoped.
///
/// Mirrors the account → flow → execution → node containment
/// hierarchy: a value scoped at `Account` is visible to every flow and
/// execution under that account; a value scoped at `Node` is visible
/// only within that single node's invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeLevel {
    /// Visible across the whole account.
    Account(AccountId),
    /// Visible to every execution of one flow.
    Flow(FlowId),
    /// Visible within a single execution.
    Execution(ExecutionId),
    /// Visible within a single node invocation.
    Node(ExecutionId, NodeId),
}

impl ScopeLevel {
    /// The account this scope ultimately belongs to, if known at this level.
    #[must_use]
    pub fn account(&self) -> Option<AccountId> {
        match self {
            Self::Account(id) => Some(*id),
            _ => None,
        }
    }
}
