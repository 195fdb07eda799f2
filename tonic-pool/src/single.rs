use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::endpoint::{Bind, Endpoint};
use crate::transport::Transport;
use crate::Error;

/// One connection behind the same interface as [`Pool`](crate::Pool).
///
/// There is nothing to choose from, so no state is consulted: every
/// selection returns the same handle until the passthrough is closed.
/// The connection is created by the first selection. Built by
/// [`Selector`](crate::Selector) when it is given one address.
pub struct SinglePassthrough<T: Transport, S = <T as Transport>::Connection> {
    address: Arc<str>,
    transport: T,
    bind: Bind<T::Connection, S>,
    state: Mutex<State<T, S>>,
}

struct State<T: Transport, S> {
    endpoint: Endpoint<T, S>,
    closed: bool,
}

impl<T: Transport, S> SinglePassthrough<T, S> {
    pub(crate) fn new(
        address: Arc<str>,
        target: T::Target,
        transport: T,
        bind: Bind<T::Connection, S>,
    ) -> Self {
        SinglePassthrough {
            address: Arc::clone(&address),
            transport,
            bind,
            state: Mutex::new(State {
                endpoint: Endpoint::new(address, target),
                closed: false,
            }),
        }
    }

    /// The configured address.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Returns the handle. Only fails once closed.
    pub async fn select(&self) -> Result<S, Error>
    where
        S: Clone,
    {
        let mut state = self.state.lock();
        if state.closed {
            return Err(Error::closed());
        }
        let link = state
            .endpoint
            .ensure_connection(&self.transport, &self.bind);
        Ok(link.stub().clone())
    }

    /// Closes the connection and drops it together with its stub. Later
    /// calls do nothing.
    pub async fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        state.endpoint.close();
    }
}

impl<T: Transport, S> fmt::Debug for SinglePassthrough<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("SinglePassthrough")
            .field("address", &self.address)
            .field("connected", &state.endpoint.is_connected())
            .field("closed", &state.closed)
            .finish()
    }
}
