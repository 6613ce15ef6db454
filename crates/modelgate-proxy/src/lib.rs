//! Reverse proxy / streaming forwarder (spec §4.5): the path from an
//! inbound OpenAI-style HTTP request to a ready worker's response bytes.

mod body;
mod error;
mod forwarder;

pub use body::{parse, requested_model, rewrite, strip_reserved_prefix, ParsedBody};
pub use error::Error;
pub use forwarder::{DefaultModelPolicy, ForwardResponse, Forwarder};
