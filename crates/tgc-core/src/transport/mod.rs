//! Transport port (history fetch + send) and its generic helpers.
//!
//! The concrete MTProto-backed implementation lives in `tgc-gateway`; this module only
//! knows the shapes the pipeline needs and how to survive platform throttling.

pub mod memory;
pub mod paced;
pub mod port;
pub mod retry;
pub mod types;

pub use port::{ChannelTransport, TransportProvider, TransportResult};
pub use types::{HistoryQuery, MediaRef, OutgoingContent, ResolvedChannel, SentMessage, SourceMessage};
