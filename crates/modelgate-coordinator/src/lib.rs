//! Group coordinator (spec §4.4): the single point every forwarder and
//! the binary's startup/reload paths go through to reach a supervisor.

mod coordinator;
mod error;

pub use coordinator::Coordinator;
pub use error::Error;
