//! `marquee-publishing`: the publishing job domain.
//!
//! Pure domain code: the job state machine, retry/backoff policy, the
//! payload/package/result value objects, and the channel adapter capability.
//! Storage, scheduling and audit live in `marquee-infra`.
//!
//! ## State machine
//!
//! ```text
//! Pending ──claim──▶ Processing ──▶ RequiresApproval ──approve──▶ Success
//!    ▲                    │ ├──────▶ Success
//!    └──retry (backoff)───┘ └──────▶ Failed
//! ```

pub mod adapter;
pub mod channel;
pub mod copy;
pub mod job;
pub mod manual;
pub mod payload;
pub mod registry;
pub mod retry;

pub use adapter::{AdapterError, ChannelAdapter};
pub use channel::Channel;
pub use copy::{CopyFormat, CopyVariant, preferred_format, select_copy};
pub use job::{FailureOutcome, PublishingJob, PublishingJobId, PublishingStatus};
pub use manual::ManualAdapter;
pub use payload::{PackageMetadata, PublishingPackage, PublishingPayload, PublishingResult};
pub use registry::{AdapterRegistry, ResolvedAdapter};
pub use retry::RetryPolicy;
