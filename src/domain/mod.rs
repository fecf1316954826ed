//! Domain layer - Core swap settlement models and rules.
//!
//! Pure logic for the settlement orchestrator: token amounts, the job
//! lifecycle, poll status classification and allowance sizing.
//! No I/O here (hexagonal architecture inner ring).

pub mod allowance;
pub mod error;
pub mod job;
pub mod status;
pub mod token;

// Re-export core types for convenience
pub use allowance::{AllowancePolicy, AllowanceRecord};
pub use error::SwapError;
pub use job::{JobHandle, JobId, JobState, LocalId, SwapJob, SwapRequest};
pub use status::{JobStatusReport, TypedStatus};
pub use token::{Amount, TokenCatalog, TokenDescriptor, TransferStandard};
