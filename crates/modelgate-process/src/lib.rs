//! Process supervision (spec §4.3): spawns, health-checks, and tears down a
//! single canonical model's worker executable, exposing a small
//! `ensure_ready`/`stop` contract the coordinator drives.

mod error;
mod handle;
mod logring;
mod supervisor;

pub use error::Error;
pub use handle::ReadyHandle;
pub use logring::{LogRing, RingLine};
pub use supervisor::{Supervisor, SupervisorConfig};
