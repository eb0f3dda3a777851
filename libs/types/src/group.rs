//! Atomic transaction groups
//!
//! A group is an ordered batch of legs applied all-or-nothing by the ledger.
//! Every leg of a multi-leg group carries the same group id, a digest over
//! the ordered legs' identifiers computed before the id is attached.
//!
//! Policy code never indexes legs by position; it asks the group for a typed
//! view (`GroupShape`) and works with named legs.

use serde::{Deserialize, Serialize};

use crate::errors::GroupError;
use crate::ids::{tagged_digest, GroupId, TxId};
use crate::operation::Operation;

/// Maximum number of legs the ledger accepts in one group.
pub const MAX_GROUP_SIZE: usize = 16;

/// Compute the group id for `legs` in order.
///
/// Each leg is hashed with its group field cleared, so the id can be
/// recomputed from already-grouped legs.
pub fn compute_group_id(legs: &[Operation]) -> GroupId {
    let txids: Vec<TxId> = legs
        .iter()
        .map(|leg| {
            let mut bare = leg.clone();
            bare.header.group = None;
            bare.txid()
        })
        .collect();
    let parts: Vec<&[u8]> = txids.iter().map(|t| t.as_bytes().as_slice()).collect();
    GroupId::from_bytes(tagged_digest(b"TG", &parts))
}

/// An ordered, atomic batch of operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionGroup {
    legs: Vec<Operation>,
}

impl TransactionGroup {
    /// Build a group, assigning the group id to every leg when there is more
    /// than one. A single leg stays ungrouped.
    pub fn new(mut legs: Vec<Operation>) -> Result<Self, GroupError> {
        if legs.is_empty() {
            return Err(GroupError::Empty);
        }
        if legs.len() > MAX_GROUP_SIZE {
            return Err(GroupError::TooLarge {
                size: legs.len(),
                max: MAX_GROUP_SIZE,
            });
        }
        if legs.len() > 1 {
            let gid = compute_group_id(&legs);
            for leg in &mut legs {
                leg.header.group = Some(gid);
            }
        }
        Ok(Self { legs })
    }

    /// Wrap legs that already carry their group ids, checking consistency.
    pub fn from_grouped(legs: Vec<Operation>) -> Result<Self, GroupError> {
        if legs.is_empty() {
            return Err(GroupError::Empty);
        }
        if legs.len() > MAX_GROUP_SIZE {
            return Err(GroupError::TooLarge {
                size: legs.len(),
                max: MAX_GROUP_SIZE,
            });
        }
        let expected = if legs.len() > 1 {
            Some(compute_group_id(&legs))
        } else {
            legs[0].header.group
        };
        for (index, leg) in legs.iter().enumerate() {
            if leg.header.group != expected {
                return Err(GroupError::GroupIdMismatch { index });
            }
        }
        Ok(Self { legs })
    }

    pub fn legs(&self) -> &[Operation] {
        &self.legs
    }

    pub fn into_legs(self) -> Vec<Operation> {
        self.legs
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn leg(&self, index: usize) -> Option<&Operation> {
        self.legs.get(index)
    }

    /// Group id shared by the legs (`None` for a single ungrouped leg).
    pub fn group_id(&self) -> Option<GroupId> {
        self.legs.first().and_then(|leg| leg.header.group)
    }

    /// Typed view over the group.
    pub fn shape(&self) -> GroupShape<'_> {
        match self.legs.as_slice() {
            [single] => GroupShape::Single(single),
            [user, counter, approval] => GroupShape::Swap(SwapLegs {
                user,
                counter,
                approval,
            }),
            other => GroupShape::Unsupported(other.len()),
        }
    }
}

/// Typed view over a group's legs.
#[derive(Debug, Clone, Copy)]
pub enum GroupShape<'a> {
    Single(&'a Operation),
    Swap(SwapLegs<'a>),
    Unsupported(usize),
}

/// The three legs of a swap group, in group order.
#[derive(Debug, Clone, Copy)]
pub struct SwapLegs<'a> {
    /// The buyer's leg paying into the escrow
    pub user: &'a Operation,
    /// The escrow's leg paying the buyer
    pub counter: &'a Operation,
    /// The admin's zero-amount rate approval
    pub approval: &'a Operation,
}

/// Position of each swap leg inside its group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SwapLeg {
    User = 0,
    Counter = 1,
    Approval = 2,
}

impl SwapLeg {
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Owned swap group, built by the orchestrator before grouping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapGroup {
    pub user_leg: Operation,
    pub counter_leg: Operation,
    pub approval_leg: Operation,
}

impl SwapGroup {
    /// Bind the three legs into an atomic group in their fixed order.
    pub fn into_group(self) -> Result<TransactionGroup, GroupError> {
        TransactionGroup::new(vec![self.user_leg, self.counter_leg, self.approval_leg])
    }
}
