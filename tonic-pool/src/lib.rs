//! Client side selection of a ready gRPC connection from a fixed set of
//! addresses.
//!
//! A [`Pool`] owns one lazily created connection per address. Each call to
//! [`Pool::select`] walks the addresses in round-robin order starting after
//! the one served last, returns the first connection whose transport reports
//! it as [`ConnectivityState::Ready`], and gives idle or connecting ones a
//! short, bounded chance to become ready along the way. When nothing is ready
//! the pool still hands back a random connection so the caller's RPC can ride
//! on the transport's own reconnect logic instead of blocking in the pool.
//!
//! Callers use the returned handle for one RPC and select again for the next.
//!
//! # Example
//!
//! ```no_run
//! use tonic_pool::{Pool, TonicTransport};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let pool = Pool::new(
//!     ["10.0.0.1:50051", "10.0.0.2:50051"],
//!     TonicTransport::new(),
//! )?;
//!
//! let connection = pool.select().await?;
//! let _channel = connection.channel();
//! // build a generated client from the channel and issue one call
//!
//! pool.close().await;
//! # Ok(())
//! # }
//! ```
//!
//! [`StubPool`] binds a generated client to every connection once and hands
//! out clones of it instead of raw connections, and [`Selector`] skips the
//! pool machinery entirely when only one address is configured.

#![warn(
    missing_debug_implementations,
    missing_docs,
    rust_2018_idioms,
    unreachable_pub
)]

mod connectivity;
mod endpoint;
mod error;
pub mod pool;
mod select;
mod single;
mod stub;
pub mod transport;

#[cfg(test)]
mod test_utils;

pub use connectivity::ConnectivityState;
pub use error::Error;
pub use pool::{Builder, Pool};
pub use select::{Select, Selector};
pub use single::SinglePassthrough;
pub use stub::StubPool;
pub use transport::{Connection, TonicConnection, TonicTransport, Transport};

/// Type-erased error used where a transport reports its own failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
