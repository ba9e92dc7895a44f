//! # schwab-stream
//!
//! Client for the account-activity streaming protocol.
//!
//! - [`messages`]: outbound request frames and the inbound
//!   [`ProtocolMessage`] sum type (`notify` / `response` / `data`)
//! - [`session`]: [`StreamingSessionClient`], which logs in, subscribes and
//!   dispatches account items, and [`StreamingSession`], which runs it over a
//!   live WebSocket
//! - [`preferences`]: where the socket URL and client identifiers come from
//! - [`sequence`]: per-session request ids

#![deny(unsafe_code)]

pub mod errors;
pub mod messages;
pub mod preferences;
pub mod sequence;
pub mod session;
pub mod socket;
pub mod testing;

pub use errors::StreamError;
pub use messages::{AccountContent, ProtocolMessage, Service, StreamRequest, StreamRequests};
pub use preferences::{
    PreferenceSource, RestPreferenceSource, StaticPreferenceSource, StreamerSessionInfo,
};
pub use sequence::RequestSequenceCounter;
pub use session::{
    AccountUpdateHandler, ErrorHandler, SessionHandlers, SessionState, StreamingSession,
    StreamingSessionClient,
};
pub use socket::FrameSink;
