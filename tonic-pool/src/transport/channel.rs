use std::fmt;
use std::sync::Arc;

use http::Uri;
use tonic::transport::{Channel, Endpoint};

use super::backoff::BackoffConfig;
use super::connector::TrackingConnector;
use super::{Connection, Transport};
use crate::{BoxError, ConnectivityState, Error};

type Configure = Arc<dyn Fn(Endpoint) -> Endpoint + Send + Sync>;

/// A [`Transport`] producing lazily connected tonic channels.
///
/// Each address becomes one `tonic::transport::Endpoint`. Transport level
/// tuning such as keep-alive timers, the HTTP/2 header list size limit,
/// connect timeouts or TLS is applied by [`configure`](Self::configure) and
/// passed through to tonic untouched.
///
/// ```
/// use std::time::Duration;
/// use tonic_pool::TonicTransport;
///
/// let transport = TonicTransport::new().configure(|endpoint| {
///     endpoint
///         .http2_keep_alive_interval(Duration::from_secs(30))
///         .http2_max_header_list_size(16 * 1024)
///         .connect_timeout(Duration::from_secs(5))
/// });
/// # drop(transport);
/// ```
#[derive(Clone)]
pub struct TonicTransport {
    configure: Configure,
    backoff: BackoffConfig,
}

impl TonicTransport {
    /// Creates a transport with tonic's endpoint defaults.
    pub fn new() -> Self {
        TonicTransport {
            configure: Arc::new(|endpoint| endpoint),
            backoff: BackoffConfig::default(),
        }
    }

    /// Applies `f` to every endpoint this transport builds, after any
    /// previously registered configuration.
    pub fn configure<F>(self, f: F) -> Self
    where
        F: Fn(Endpoint) -> Endpoint + Send + Sync + 'static,
    {
        let previous = self.configure;
        TonicTransport {
            configure: Arc::new(move |endpoint| f(previous(endpoint))),
            ..self
        }
    }

    /// Sets how long a connection waits after a failed dial before it goes
    /// back to idle and may be dialed again.
    pub fn backoff(self, backoff: BackoffConfig) -> Result<Self, Error> {
        backoff.validate().map_err(Error::invalid_config)?;
        Ok(TonicTransport { backoff, ..self })
    }
}

impl Default for TonicTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for TonicTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicTransport")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl Transport for TonicTransport {
    type Target = Endpoint;
    type Connection = TonicConnection;

    fn target(&self, address: &str) -> Result<Endpoint, BoxError> {
        let uri = if address.contains("://") {
            address.to_owned()
        } else {
            format!("http://{address}")
        };
        let endpoint = Endpoint::from_shared(uri)?;
        Ok((self.configure)(endpoint))
    }

    fn connect(&self, endpoint: &Endpoint) -> TonicConnection {
        let connector = TrackingConnector::new(endpoint, self.backoff.clone());
        let channel = endpoint.connect_with_connector_lazy(connector.clone());
        TonicConnection { channel, connector }
    }
}

/// One lazily connected tonic [`Channel`] and the connectivity tracking
/// around it.
///
/// The channel is created once and kept for the life of the connection;
/// clones of the handle share it. Must be created inside a Tokio runtime.
#[derive(Clone)]
pub struct TonicConnection {
    channel: Channel,
    connector: TrackingConnector,
}

impl TonicConnection {
    /// Returns the channel, for building generated clients.
    pub fn channel(&self) -> Channel {
        self.channel.clone()
    }

    /// The URI this connection dials.
    pub fn uri(&self) -> &Uri {
        self.connector.shared().uri()
    }
}

impl Connection for TonicConnection {
    fn state(&self, try_to_connect: bool) -> ConnectivityState {
        let shared = self.connector.shared();
        if try_to_connect && shared.state() == ConnectivityState::Idle {
            self.connector.warm_up();
        }
        shared.state()
    }

    async fn ready(&self) -> bool {
        self.connector.shared().settled().await
    }

    fn close(&self) {
        self.connector.shared().close();
    }
}

impl PartialEq for TonicConnection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(self.connector.shared(), other.connector.shared())
    }
}

impl Eq for TonicConnection {}

impl fmt::Debug for TonicConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TonicConnection")
            .field("uri", self.uri())
            .field("state", &self.connector.shared().state())
            .finish()
    }
}
