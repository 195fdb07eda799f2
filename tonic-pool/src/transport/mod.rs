//! The seam between the pool and the RPC transport underneath it.
//!
//! The pool never dials, frames or retries anything itself. It asks a
//! [`Transport`] for a connection handle per address, and asks each
//! [`Connection`] for its current [`ConnectivityState`] and for a future
//! that settles once the connection is ready. [`TonicTransport`] implements
//! both on top of `tonic::transport::Channel`.

mod backoff;
mod channel;
mod connector;

pub use backoff::BackoffConfig;
pub use channel::{TonicConnection, TonicTransport};

use crate::{BoxError, ConnectivityState};

/// Creates connections to addresses.
pub trait Transport: Send + Sync + 'static {
    /// An address after the transport has parsed it.
    type Target: Send + Sync + 'static;

    /// A cheaply cloneable handle to one connection.
    type Connection: Connection;

    /// Parses `address`. Called once per address when a pool is built, so a
    /// malformed address fails construction rather than a later selection.
    fn target(&self, address: &str) -> Result<Self::Target, BoxError>;

    /// Creates a connection handle for `target`.
    ///
    /// This must not block on connection establishment; the connection is
    /// expected to start out [`ConnectivityState::Idle`].
    fn connect(&self, target: &Self::Target) -> Self::Connection;
}

/// A handle to one transport connection.
///
/// Clones refer to the same underlying connection.
#[trait_variant::make(Send)]
pub trait Connection: Clone + Send + Sync + 'static {
    /// Returns the current state. With `try_to_connect` set, an idle
    /// connection starts connecting as a side effect, which turns polling
    /// for readiness into warming the connection up.
    fn state(&self, try_to_connect: bool) -> ConnectivityState;

    /// Resolves once the connection settles: `true` when it is ready, `false`
    /// when it failed or was shut down first.
    ///
    /// This has no deadline of its own; callers bound it with a timeout.
    async fn ready(&self) -> bool;

    /// Shuts the connection down. Calls made through any handle to it fail
    /// from then on, including calls still in flight.
    fn close(&self);
}
