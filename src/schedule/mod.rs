//! Threshold-signature scheduled transactions
//!
//! A schedule holds a transaction until K of the N keys in its key list
//! have signed it, then executes it through the ledger gateway. Schedules
//! that aren't signed in time expire; an admin key can delete them before
//! that.
//!
//! # Example
//!
//! ```ignore
//! use schedule_ledger::schedule::{KeySet, NewSchedule, ScheduleRegistry, ScheduleSignature};
//!
//! // 2-of-3 key list
//! let key_set = KeySet::from_keys(&keys, 2)?;
//! let id = registry.create(NewSchedule::new(payload, key_set, operator)).await?;
//!
//! // Collect signatures; the second one executes the transfer
//! let digest = registry.signing_digest(&id).await?;
//! registry.sign(&id, &ScheduleSignature::create(&keys[0], &digest)?).await?;
//! registry.sign(&id, &ScheduleSignature::create(&keys[1], &digest)?).await?;
//! ```

pub mod clock;
pub mod collector;
pub mod entry;
pub mod error;
pub mod key_set;
pub mod registry;
pub mod sweeper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use collector::{SignatureCollector, SubmitOutcome};
pub use entry::{ScheduleEntry, ScheduleSignature, ScheduleSnapshot, ScheduleState};
pub use error::ScheduleError;
pub use key_set::{KeySet, MemberId};
pub use registry::{NewSchedule, ScheduleRegistry, SignOutcome};
pub use sweeper::{spawn_expiry_sweeper, SweeperHandle};
