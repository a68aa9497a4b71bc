//! Task and milestone state machine.
//!
//! ```text
//! open ──claim──▶ claimed ──submit──▶ pending_review ──accept──▶ completed
//!  │  ▲             │  ▲                 │     │
//!  │  └──release────┘  └─────reject──────┘     └─▶ disputed ─▶ completed | open
//!  │  └──claim timeout (slash)─┘
//!  ├──cancel──▶ cancelled
//!  └──deadline──▶ expired
//! ```
//!
//! Every transition runs inside one write transaction together with the
//! stake, escrow and settlement movements it triggers. Claim expiry is
//! evaluated lazily by whichever command next touches the task, and can
//! also be applied in bulk by the sweep.

pub mod error;
pub mod machine;
pub mod milestones;
pub mod outcome;
pub mod reputation;
pub mod request;
pub mod sweep;
pub mod workers;

pub use error::MarketError;
pub use machine::TaskMarket;
pub use outcome::{
    AcceptOutcome, ClaimOutcome, DisputeResolution, ExpiredClaim, RejectOutcome,
    ReleaseOutcome, ResolveOutcome, SubmitOutcome,
};
pub use request::{NewMilestone, NewTask};
pub use sweep::SweepAction;
