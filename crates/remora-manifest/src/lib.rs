//! Remora Manifest Protocol
//!
//! The manifest is the only channel from a remote host back to the
//! orchestrator. It is one append-only text file shared by every producer
//! (the orchestrating Process plus each of its Runners). Each event is a line
//!
//! ```text
//! <timestamp> [<short-producer-id>] [<channel>] <content>
//! ```
//!
//! where the channel tag is optional and defaults to `state`. Lines that do
//! not start with a timestamp continue the previous event, which is how
//! multi-line stdout/stderr is carried.

pub mod error;
pub mod event;
pub mod parse;

pub use error::ManifestError;
pub use event::{append_event, format_timestamp, parse_timestamp, Channel, ManifestEvent, StateTag};
pub use parse::{Manifest, ProducerLog, StateRecord};

/// `strftime` format of every manifest timestamp (remote clock, UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Width in bytes of a formatted timestamp.
pub const TIMESTAMP_LEN: usize = 19;

/// Width in bytes of a short producer id.
pub const SHORT_ID_LEN: usize = 8;
