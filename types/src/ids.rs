//! Identifiers for tasks, milestones, submissions, workers and ledger entries.
//!
//! String ids are restricted to `[A-Za-z0-9.:-]` (1..=128 chars). Underscore
//! is reserved as the separator inside settlement ids, which keeps
//! `task_<task>_<submission>` unambiguous.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseError;

const MAX_ID_LEN: usize = 128;

fn validate_id(kind: &'static str, value: &str) -> Result<(), ParseError> {
    let valid = !value.is_empty()
        && value.len() <= MAX_ID_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'.' | b':'));
    if valid {
        Ok(())
    } else {
        Err(ParseError::InvalidId {
            kind,
            value: value.to_string(),
        })
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident, $kind:literal) => {
        $(#[$meta])*
        #[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Result<Self, ParseError> {
                let value = value.into();
                validate_id($kind, &value)?;
                Ok(Self(value))
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ParseError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl FromStr for $name {
            type Err = ParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// A task posted to the marketplace.
    TaskId,
    "task"
);
string_id!(
    /// One step of a multi-milestone task.
    MilestoneId,
    "milestone"
);
string_id!(
    /// A result submitted by a worker for review.
    SubmissionId,
    "submission"
);
string_id!(
    /// A worker (agent) identity, issued by the registration layer.
    WorkerId,
    "worker"
);
string_id!(
    /// A withdrawal request handed to the chain provider.
    WithdrawalId,
    "withdrawal"
);

/// Sequence number of a ledger entry, assigned by the store on append.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic settlement de-duplication key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SettlementId(String);

impl SettlementId {
    pub fn for_task(task: &TaskId, submission: &SubmissionId) -> Self {
        Self(format!("task_{task}_{submission}"))
    }

    pub fn for_milestone(milestone: &MilestoneId, submission: &SubmissionId) -> Self {
        Self(format!("milestone_{milestone}_{submission}"))
    }

    /// Milestone settlements key on the milestone, everything else on the task.
    pub fn derive(
        task: &TaskId,
        milestone: Option<&MilestoneId>,
        submission: &SubmissionId,
    ) -> Self {
        match milestone {
            Some(milestone) => Self::for_milestone(milestone, submission),
            None => Self::for_task(task, submission),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SettlementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settlement_ids_are_deterministic() {
        let task = TaskId::new("T1").unwrap();
        let sub = SubmissionId::new("S1").unwrap();
        let ms = MilestoneId::new("M1").unwrap();
        assert_eq!(SettlementId::derive(&task, None, &sub).as_str(), "task_T1_S1");
        assert_eq!(
            SettlementId::derive(&task, Some(&ms), &sub).as_str(),
            "milestone_M1_S1"
        );
    }

    #[test]
    fn ids_reject_separator_and_garbage() {
        assert!(TaskId::new("a_b").is_err());
        assert!(TaskId::new("").is_err());
        assert!(TaskId::new("a/b").is_err());
        assert!(TaskId::new("x".repeat(129)).is_err());
        assert!(TaskId::new("550e8400-e29b-41d4-a716-446655440000").is_ok());
        assert!(serde_json::from_str::<WorkerId>("\"bad id\"").is_err());
    }
}
