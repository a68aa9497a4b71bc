//! Ledger account owners.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::WorkerId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerType {
    Worker,
    Protocol,
}

/// Who a ledger account belongs to. The protocol has exactly one account per chain.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Owner {
    Worker(WorkerId),
    Protocol,
}

impl Owner {
    pub fn owner_type(&self) -> OwnerType {
        match self {
            Owner::Worker(_) => OwnerType::Worker,
            Owner::Protocol => OwnerType::Protocol,
        }
    }

    pub fn owner_id(&self) -> Option<&WorkerId> {
        match self {
            Owner::Worker(id) => Some(id),
            Owner::Protocol => None,
        }
    }
}

impl From<WorkerId> for Owner {
    fn from(id: WorkerId) -> Self {
        Owner::Worker(id)
    }
}

impl fmt::Display for Owner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Owner::Worker(id) => write!(f, "worker:{id}"),
            Owner::Protocol => f.write_str("protocol"),
        }
    }
}
