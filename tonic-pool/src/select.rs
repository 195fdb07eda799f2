use std::fmt;

use crate::pool::{Builder, Pool};
use crate::single::SinglePassthrough;
use crate::stub::StubPool;
use crate::transport::Transport;
use crate::Error;

/// Something that yields a handle for the next call and can be closed.
///
/// Implemented by every selection strategy in this crate so callers can be
/// written once against whichever one they were configured with.
#[trait_variant::make(Send)]
pub trait Select: Send + Sync {
    /// What a selection returns: a connection or a stub bound to one.
    type Handle;

    /// Returns a handle for the next call. Fails only once closed.
    async fn select(&self) -> Result<Self::Handle, Error>;

    /// Closes every underlying connection. Idempotent.
    async fn close(&self);
}

impl<T, S> Select for Pool<T, S>
where
    T: Transport,
    S: Clone + Send + Sync + 'static,
{
    type Handle = S;

    async fn select(&self) -> Result<S, Error> {
        Pool::select(self).await
    }

    async fn close(&self) {
        Pool::close(self).await
    }
}

impl<T, S> Select for StubPool<T, S>
where
    T: Transport,
    S: Clone + Send + Sync + 'static,
{
    type Handle = S;

    async fn select(&self) -> Result<S, Error> {
        StubPool::select(self).await
    }

    async fn close(&self) {
        StubPool::close(self).await
    }
}

impl<T, S> Select for SinglePassthrough<T, S>
where
    T: Transport,
    S: Clone + Send + Sync + 'static,
{
    type Handle = S;

    async fn select(&self) -> Result<S, Error> {
        SinglePassthrough::select(self).await
    }

    async fn close(&self) {
        SinglePassthrough::close(self).await
    }
}

/// Chooses between [`SinglePassthrough`] and [`Pool`] by the number of
/// configured addresses.
///
/// With one address there is nothing to rotate over and no alternative to
/// fall back to, so the pool's locking and state checks are skipped.
pub enum Selector<T: Transport, S = <T as Transport>::Connection> {
    /// Exactly one address was configured.
    Single(SinglePassthrough<T, S>),
    /// More than one address was configured.
    Pool(Pool<T, S>),
}

impl<T: Transport> Selector<T> {
    /// Builds a selector handing out connections, with the default settings.
    pub fn new<I>(addresses: I, transport: T) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Builder::new().selector(addresses, transport)
    }
}

impl<T: Transport, S> Selector<T, S> {
    /// Builds a selector handing out the stub `bind` creates for each
    /// connection, with the default settings.
    pub fn with_stub<I, F>(addresses: I, transport: T, bind: F) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: Fn(&T::Connection) -> S + Send + Sync + 'static,
    {
        Builder::new().stub_selector(addresses, transport, bind)
    }

    /// Returns a handle for the next call.
    pub async fn select(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        match self {
            Selector::Single(single) => single.select().await,
            Selector::Pool(pool) => pool.select().await,
        }
    }

    /// Closes every underlying connection.
    pub async fn close(&self) {
        match self {
            Selector::Single(single) => single.close().await,
            Selector::Pool(pool) => pool.close().await,
        }
    }
}

impl<T, S> Select for Selector<T, S>
where
    T: Transport,
    S: Clone + Send + Sync + 'static,
{
    type Handle = S;

    async fn select(&self) -> Result<S, Error> {
        Selector::select(self).await
    }

    async fn close(&self) {
        Selector::close(self).await
    }
}

impl<T: Transport, S> fmt::Debug for Selector<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Single(single) => f.debug_tuple("Single").field(single).finish(),
            Selector::Pool(pool) => f.debug_tuple("Pool").field(pool).finish(),
        }
    }
}
