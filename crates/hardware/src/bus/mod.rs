//! Shared bus: request/response types, timing models, and the arbiter.

/// Bus arbiter: winner selection, grant commit, deferred batch scheduler.
pub mod arbiter;
/// Bus request/response types and master identities.
pub mod op;
/// Access timing models (Saturn region preset and the timing trait).
pub mod timing;

pub use arbiter::{BusArbiter, WaitResult};
pub use op::{BusKind, BusMaster, BusOp, BusResponse, CommitResult};
pub use timing::{AccessTiming, SaturnTiming};
