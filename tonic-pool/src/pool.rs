//! Round-robin selection over a fixed set of addresses.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use tokio::sync::Mutex;
use tracing::{debug, trace};

use crate::endpoint::{await_ready, Bind, Endpoint};
use crate::single::SinglePassthrough;
use crate::transport::Transport;
use crate::{ConnectivityState, Error, Selector, StubPool};

const DEFAULT_READY_TIMEOUT: Duration = Duration::from_millis(100);

/// Configures and builds pools.
///
/// ```
/// use std::time::Duration;
/// use tonic_pool::{Pool, TonicTransport};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), tonic_pool::Error> {
/// let pool = Pool::builder()
///     .ready_timeout(Duration::from_millis(250))
///     .pool(["10.0.0.1:50051", "10.0.0.2:50051"], TonicTransport::new())?;
/// # drop(pool);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct Builder {
    ready_timeout: Duration,
    shuffle: bool,
}

impl Builder {
    /// Creates a builder with the default settings.
    pub fn new() -> Self {
        Builder {
            ready_timeout: DEFAULT_READY_TIMEOUT,
            shuffle: true,
        }
    }

    /// Sets how long a selection waits on each idle or connecting endpoint
    /// before moving on to the next one.
    ///
    /// The wait happens while other selections are queued behind it, so the
    /// worst case for one selection is this timeout times the number of
    /// addresses.
    ///
    /// Default is 100 milliseconds.
    pub fn ready_timeout(self, timeout: Duration) -> Self {
        Builder {
            ready_timeout: timeout,
            ..self
        }
    }

    /// Whether to shuffle the addresses once at construction so that many
    /// clients configured with the same list do not all start on the same
    /// server.
    ///
    /// Default is `true`.
    pub fn shuffle(self, enabled: bool) -> Self {
        Builder {
            shuffle: enabled,
            ..self
        }
    }

    /// Builds a [`Pool`] handing out connections.
    pub fn pool<T, I>(&self, addresses: I, transport: T) -> Result<Pool<T>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.build(addresses, transport, Box::new(<T::Connection>::clone))
    }

    /// Builds a [`StubPool`] handing out the stub `bind` creates for each
    /// connection.
    pub fn stub_pool<T, S, I, F>(
        &self,
        addresses: I,
        transport: T,
        bind: F,
    ) -> Result<StubPool<T, S>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: Fn(&T::Connection) -> S + Send + Sync + 'static,
    {
        self.build(addresses, transport, Box::new(bind))
            .map(StubPool::from_pool)
    }

    /// Builds a [`Selector`] handing out connections: a passthrough for a
    /// single address, a pool otherwise.
    pub fn selector<T, I>(&self, addresses: I, transport: T) -> Result<Selector<T>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        self.build_selector(addresses, transport, Box::new(<T::Connection>::clone))
    }

    /// Builds a [`Selector`] handing out the stub `bind` creates for each
    /// connection.
    pub fn stub_selector<T, S, I, F>(
        &self,
        addresses: I,
        transport: T,
        bind: F,
    ) -> Result<Selector<T, S>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
        F: Fn(&T::Connection) -> S + Send + Sync + 'static,
    {
        self.build_selector(addresses, transport, Box::new(bind))
    }

    fn build<T, S, I>(
        &self,
        addresses: I,
        transport: T,
        bind: Bind<T::Connection, S>,
    ) -> Result<Pool<T, S>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let addresses = self.addresses(addresses)?;
        let endpoints = addresses
            .iter()
            .map(|address| {
                let target = transport
                    .target(address)
                    .map_err(|source| Error::invalid_address(address, source))?;
                Ok(Endpoint::new(Arc::clone(address), target))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        debug!(endpoints = endpoints.len(), "pool created");

        Ok(Pool {
            transport,
            bind,
            ready_timeout: self.ready_timeout,
            addresses: addresses.into_boxed_slice(),
            state: Mutex::new(State {
                endpoints,
                cursor: 0,
                closed: false,
            }),
        })
    }

    fn build_selector<T, S, I>(
        &self,
        addresses: I,
        transport: T,
        bind: Bind<T::Connection, S>,
    ) -> Result<Selector<T, S>, Error>
    where
        T: Transport,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let addresses = self.addresses(addresses)?;
        if let [address] = &addresses[..] {
            let target = transport
                .target(address)
                .map_err(|source| Error::invalid_address(address, source))?;
            return Ok(Selector::Single(SinglePassthrough::new(
                Arc::clone(address),
                target,
                transport,
                bind,
            )));
        }
        self.build(addresses, transport, bind).map(Selector::Pool)
    }

    fn addresses<I>(&self, addresses: I) -> Result<Vec<Arc<str>>, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut addresses = addresses
            .into_iter()
            .map(|address| Arc::<str>::from(address.as_ref()))
            .collect::<Vec<_>>();

        if addresses.is_empty() {
            return Err(Error::empty_addresses());
        }
        if let Some(address) = addresses.iter().find(|address| address.is_empty()) {
            return Err(Error::invalid_address(address, "address is empty"));
        }
        if self.shuffle {
            addresses.shuffle(&mut rand::rng());
        }
        Ok(addresses)
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

/// A fixed set of endpoints with round-robin selection.
///
/// Connections are created the first time a selection reaches their
/// endpoint and are kept until [`close`](Pool::close). A selection returns
/// the first ready endpoint after the one it returned last; idle and
/// connecting endpoints get a bounded wait, failed ones are skipped. When
/// none is ready a random endpoint is returned anyway, so the caller's call
/// fails or succeeds on the transport's terms rather than the pool's.
///
/// `S` is the handle returned by [`select`](Pool::select): the connection
/// itself for pools built with [`Pool::new`], or a stub bound to it for
/// pools wrapped in a [`StubPool`].
pub struct Pool<T: Transport, S = <T as Transport>::Connection> {
    transport: T,
    bind: Bind<T::Connection, S>,
    ready_timeout: Duration,
    addresses: Box<[Arc<str>]>,
    state: Mutex<State<T, S>>,
}

struct State<T: Transport, S> {
    endpoints: Vec<Endpoint<T, S>>,
    // Index of the endpoint the next scan starts at.
    cursor: usize,
    closed: bool,
}

impl<T: Transport> Pool<T> {
    /// Creates a pool over `addresses` with the default settings.
    ///
    /// Fails if `addresses` is empty or if `transport` rejects one of them.
    /// No connection is made until the first selection.
    pub fn new<I>(addresses: I, transport: T) -> Result<Self, Error>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Builder::new().pool(addresses, transport)
    }
}

impl Pool<crate::TonicTransport> {
    /// Returns a builder for configuring a pool.
    ///
    /// Only defined for the default transport so that `Pool::builder()`
    /// names a type without annotations, as `Server::builder()` does in
    /// tonic. [`Builder`] itself is not tied to a transport: the transport
    /// is passed to whichever build method is called, so use
    /// [`Builder::new`] with any other [`Transport`].
    pub fn builder() -> Builder {
        Builder::new()
    }
}

impl<T: Transport, S> Pool<T, S> {
    /// The addresses in the order they are scanned.
    pub fn addresses(&self) -> impl ExactSizeIterator<Item = &str> + '_ {
        self.addresses.iter().map(|address| &**address)
    }

    /// Selects a handle for the next call.
    ///
    /// Only fails once the pool is closed.
    pub async fn select(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        let mut state = self.state.lock().await;
        let State {
            endpoints,
            cursor,
            closed,
        } = &mut *state;

        if *closed {
            return Err(Error::closed());
        }

        let len = endpoints.len();
        for offset in 0..len {
            let index = (*cursor + offset) % len;
            let address = &self.addresses[index];
            let link = endpoints[index].ensure_connection(&self.transport, &self.bind);

            let ready = match link.current_state() {
                ConnectivityState::Ready => true,
                ConnectivityState::Idle | ConnectivityState::Connecting => {
                    trace!(%address, "waiting for endpoint");
                    let ready = await_ready(link.connection(), self.ready_timeout).await;
                    if !ready {
                        debug!(
                            %address,
                            timeout = ?self.ready_timeout,
                            "endpoint did not become ready, skipping"
                        );
                    }
                    ready
                }
                failed @ (ConnectivityState::TransientFailure | ConnectivityState::Shutdown) => {
                    debug!(%address, state = %failed, "skipping endpoint");
                    false
                }
            };

            if ready {
                *cursor = (index + 1) % len;
                trace!(%address, "selected endpoint");
                return Ok(link.stub().clone());
            }
        }

        let index = rand::random_range(..len);
        debug!(
            address = %self.addresses[index],
            "no endpoint ready, falling back to a random one"
        );
        let link = endpoints[index].ensure_connection(&self.transport, &self.bind);
        Ok(link.stub().clone())
    }

    /// Closes every connection the pool has created.
    ///
    /// Calling this more than once has no further effect. Handles selected
    /// earlier refer to closed connections, so calls made through them fail.
    pub async fn close(&self) {
        let mut state = self.state.lock().await;
        if state.closed {
            return;
        }
        state.closed = true;
        for endpoint in state.endpoints.iter_mut() {
            endpoint.close();
        }
        debug!("pool closed");
    }
}

impl<T: Transport, S> fmt::Debug for Pool<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("addresses", &self.addresses)
            .field("ready_timeout", &self.ready_timeout)
            .finish_non_exhaustive()
    }
}
