//! # schwab-core
//!
//! Building blocks shared by the Schwab session crates:
//!
//! - [`http`]: the [`HttpTransport`] trait plus a `reqwest` implementation
//! - [`retry`]: the bounded, cancellable [`RetryPolicy`] used by the 401 loops
//! - [`clock`]: an injectable [`Clock`] for expiry checks
//! - [`logging`]: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod clock;
pub mod errors;
pub mod http;
pub mod logging;
pub mod retry;
pub mod testing;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock, system_clock};
pub use errors::TransportError;
pub use http::{AUTHORIZATION, HttpRequest, HttpResponse, HttpTransport, Method, ReqwestTransport};
pub use retry::RetryPolicy;
pub use tokio_util::sync::CancellationToken;
