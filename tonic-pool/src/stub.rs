use std::fmt;

use crate::pool::{Builder, Pool};
use crate::transport::Transport;
use crate::Error;

/// A [`Pool`] that hands out a client stub instead of the raw connection.
///
/// `bind` runs once for each connection, when the pool creates it, and the
/// resulting stub lives exactly as long as that connection. Selections
/// return clones of it, so the stub should be cheap to clone. Generated
/// tonic clients are.
///
/// ```no_run
/// use tonic_pool::{StubPool, TonicTransport};
/// # #[derive(Clone)]
/// # struct GreeterClient(tonic::transport::Channel);
/// # impl GreeterClient {
/// #     fn new(channel: tonic::transport::Channel) -> Self { Self(channel) }
/// # }
///
/// # async fn run() -> Result<(), tonic_pool::Error> {
/// let pool = StubPool::new(
///     ["10.0.0.1:50051", "10.0.0.2:50051"],
///     TonicTransport::new(),
///     |connection| GreeterClient::new(connection.channel()),
/// )?;
///
/// let _client = pool.select().await?;
/// # Ok(())
/// # }
/// ```
pub struct StubPool<T: Transport, S> {
    inner: Pool<T, S>,
}

impl<T: Transport, S> StubPool<T, S> {
    /// Creates a stub pool over `addresses` with the default settings.
    ///
    /// See [`Builder::stub_pool`] to change them.
    pub fn new<I, F>(addresses: I, transport: T, bind: F) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: Fn(&T::Connection) -> S + Send + Sync + 'static,
    {
        Builder::new().stub_pool(addresses, transport, bind)
    }

    pub(crate) fn from_pool(inner: Pool<T, S>) -> Self {
        StubPool { inner }
    }

    /// The addresses in the order they are scanned.
    pub fn addresses(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.inner.addresses()
    }

    /// Selects a stub for the next call. See [`Pool::select`].
    pub async fn select(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        self.inner.select().await
    }

    /// Closes every connection, dropping the stubs bound to them.
    pub async fn close(&self) {
        self.inner.close().await
    }
}

impl<T: Transport, S> fmt::Debug for StubPool<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StubPool").field(&self.inner).finish()
    }
}
