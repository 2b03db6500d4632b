//! ringmend-repair: drives anti-entropy repair across the ring.
//!
//! For every selected keyspace, each selected endpoint repairs the token
//! ranges it replicates, one range at a time:
//!
//! ```text
//!   active_repair? ──non-empty──► skip endpoint (warn)
//!        │ empty
//!        ▼
//!   for each range:
//!     repair_start ──► poll status every poll_interval until terminal
//!        │ FAILED and no table requested
//!        ▼
//!     wait fallback_cooldown, then repair the range table by table
//!        │
//!        ▼
//!     failure budget: +1 per failed range, 0 after a success
//!                     ceiling reached ──► abort the whole run
//! ```
//!
//! Endpoints may run concurrently (bounded by `endpoint_concurrency`);
//! a single endpoint never has more than one job in flight.

pub mod budget;
pub mod error;
pub mod orchestrator;
pub mod plan;
pub mod summary;
mod stop;
mod worker;

pub use budget::FailureBudget;
pub use error::{RepairError, RepairResult};
pub use orchestrator::Orchestrator;
pub use plan::{EndpointTarget, KeyspaceTarget, RepairPlan};
pub use summary::{FailedRange, RepairSummary, SkippedEndpoint};
