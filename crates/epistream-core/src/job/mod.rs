//! Job vocabulary shared by the gate, pool, ledger and relay.

mod id;
mod types;

pub use id::{InvalidObjectId, ObjectId};
pub use types::{JobOutcome, JobState, Priority};
