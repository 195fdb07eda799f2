use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::transport::{Connection, Transport};
use crate::ConnectivityState;

/// Builds the handle handed out for a connection. Runs once per connection.
pub(crate) type Bind<C, S> = Box<dyn Fn(&C) -> S + Send + Sync>;

/// One configured address and, once something has tried to use it, its
/// connection and the stub bound to that connection.
pub(crate) struct Endpoint<T: Transport, S> {
    address: Arc<str>,
    target: T::Target,
    link: Option<Link<T::Connection, S>>,
}

/// A connection and its stub. A stub never outlives its connection.
pub(crate) struct Link<C, S> {
    connection: C,
    stub: S,
}

impl<T: Transport, S> Endpoint<T, S> {
    pub(crate) fn new(address: Arc<str>, target: T::Target) -> Self {
        Endpoint {
            address,
            target,
            link: None,
        }
    }

    /// Creates the connection on first use. Never blocks on the connection
    /// becoming ready, and never replaces an existing connection.
    pub(crate) fn ensure_connection(
        &mut self,
        transport: &T,
        bind: &Bind<T::Connection, S>,
    ) -> &Link<T::Connection, S> {
        let Endpoint {
            address,
            target,
            link,
        } = self;

        link.get_or_insert_with(|| {
            debug!(%address, "creating connection");
            let connection = transport.connect(target);
            let stub = bind(&connection);
            Link { connection, stub }
        })
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Closes the connection if one was ever created.
    pub(crate) fn close(&mut self) {
        if let Some(link) = self.link.take() {
            debug!(address = %self.address, "closing connection");
            link.connection.close();
        }
    }
}

impl<C: Connection, S> Link<C, S> {
    /// Reads the live state, starting a connect attempt if the connection is
    /// idle.
    pub(crate) fn current_state(&self) -> ConnectivityState {
        self.connection.state(true)
    }

    pub(crate) fn connection(&self) -> &C {
        &self.connection
    }

    pub(crate) fn stub(&self) -> &S {
        &self.stub
    }
}

/// Waits up to `timeout` for `connection` to become ready. A timeout only
/// means "not ready now".
pub(crate) async fn await_ready<C: Connection>(connection: &C, timeout: Duration) -> bool {
    tokio::time::timeout(timeout, connection.ready())
        .await
        .unwrap_or(false)
}

impl<T: Transport, S> fmt::Debug for Endpoint<T, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("address", &self.address)
            .field("connected", &self.is_connected())
            .finish()
    }
}
