use std::future::{poll_fn, Future};
use std::io::{self, IoSlice};
use std::pin::{pin, Pin};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use http::Uri;
use hyper::rt::{self, Read as _, Write as _};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use tokio::io::ReadBuf;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Notify};
use tokio::task::AbortHandle;
use tonic::transport::Endpoint;
use tower::ServiceExt;
use tower_service::Service;
use tracing::{debug, trace};

use super::backoff::{BackoffConfig, ExponentialBackoff};
use crate::{BoxError, ConnectivityState};

// Sent by the connector to claim a parked transport.
type Handoff = oneshot::Sender<TrackedIo>;

/// Connectivity bookkeeping for one connection, shared by its handles, its
/// connector and every transport the connector has handed out.
///
/// The state is published as a code in an atomic so it can be read without
/// taking the lock. It is only written while `inner` is held.
pub(crate) struct Shared {
    uri: Uri,
    code: AtomicU8,
    changed: Notify,
    // Flipped once on close; every live transport fails its IO from then on.
    closed: watch::Sender<bool>,
    inner: Mutex<Inner>,
}

struct Inner {
    // Transports currently alive, parked or in use by the channel.
    live: usize,
    // Claims the warmed-up transport held by the parking task.
    parked: Option<oneshot::Sender<Handoff>>,
    dialing: bool,
    backoff: ExponentialBackoff,
    retry: Option<AbortHandle>,
}

impl Inner {
    fn has_parked(&self) -> bool {
        self.parked
            .as_ref()
            .is_some_and(|parked| !parked.is_closed())
    }
}

impl Shared {
    pub(crate) fn new(uri: Uri, backoff: BackoffConfig) -> Self {
        Shared {
            uri,
            code: AtomicU8::new(ConnectivityState::Idle.code()),
            changed: Notify::new(),
            closed: watch::Sender::new(false),
            inner: Mutex::new(Inner {
                live: 0,
                parked: None,
                dialing: false,
                backoff: ExponentialBackoff::new(backoff),
                retry: None,
            }),
        }
    }

    pub(crate) fn uri(&self) -> &Uri {
        &self.uri
    }

    pub(crate) fn state(&self) -> ConnectivityState {
        ConnectivityState::from_code(self.code.load(Ordering::Acquire))
    }

    // Must be called with `inner` locked. `Shutdown` is terminal.
    fn publish(&self, state: ConnectivityState) {
        let previous = self.state();
        if previous == state || previous == ConnectivityState::Shutdown {
            return;
        }
        self.code.store(state.code(), Ordering::Release);
        trace!(uri = %self.uri, from = %previous, to = %state, "connectivity changed");
        self.changed.notify_waiters();
    }

    /// Resolves once the state is no longer idle or connecting.
    pub(crate) async fn settled(&self) -> bool {
        loop {
            let mut changed = pin!(self.changed.notified());
            changed.as_mut().enable();

            let state = self.state();
            if !state.is_pending() {
                return state == ConnectivityState::Ready;
            }

            changed.await;
        }
    }

    fn dial_started(&self) {
        let inner = self.inner.lock();
        if inner.live == 0 {
            self.publish(ConnectivityState::Connecting);
        }
    }

    fn dial_succeeded(self: &Arc<Self>, io: TokioIo<TcpStream>) -> TrackedIo {
        let mut inner = self.inner.lock();
        inner.live += 1;
        inner.backoff.reset();
        self.publish(ConnectivityState::Ready);

        let mut closed = self.closed.subscribe();
        TrackedIo {
            io,
            shared: Arc::downgrade(self),
            closed: Box::pin(async move {
                if closed.wait_for(|closed| *closed).await.is_err() {
                    std::future::pending::<()>().await;
                }
            }),
            shut: false,
        }
    }

    fn dial_failed(self: &Arc<Self>, error: &BoxError) {
        let mut inner = self.inner.lock();
        if inner.live > 0 || self.state() == ConnectivityState::Shutdown {
            return;
        }
        self.publish(ConnectivityState::TransientFailure);

        let delay = inner.backoff.backoff_duration();
        debug!(uri = %self.uri, %error, ?delay, "dial failed");

        let shared = Arc::downgrade(self);
        let retry = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(shared) = Weak::upgrade(&shared) {
                shared.backoff_elapsed();
            }
        });
        if let Some(previous) = inner.retry.replace(retry.abort_handle()) {
            previous.abort();
        }
    }

    fn backoff_elapsed(&self) {
        let mut inner = self.inner.lock();
        inner.retry = None;
        if self.state() == ConnectivityState::TransientFailure {
            self.publish(ConnectivityState::Idle);
        }
    }

    fn released(&self) {
        let mut inner = self.inner.lock();
        inner.live = inner.live.saturating_sub(1);
        if inner.live == 0 && self.state() == ConnectivityState::Ready {
            trace!(uri = %self.uri, "last transport closed");
            self.publish(ConnectivityState::Idle);
        }
    }

    fn take_parked(&self) -> Option<oneshot::Sender<Handoff>> {
        let mut inner = self.inner.lock();
        if inner.has_parked() {
            inner.parked.take()
        } else {
            None
        }
    }

    /// Shuts the connection down. New dials are refused from here on and
    /// every transport the channel holds fails its next read or write, so
    /// calls on handles obtained earlier fail too.
    pub(crate) fn close(&self) {
        let (parked, retry) = {
            let mut inner = self.inner.lock();
            self.publish(ConnectivityState::Shutdown);
            (inner.parked.take(), inner.retry.take())
        };
        if let Some(retry) = retry {
            retry.abort();
        }
        self.closed.send_replace(true);
        // The parking task drops its transport once the claim is gone.
        drop(parked);
    }
}

/// A `Service<Uri>` handed to the channel that dials through hyper's
/// `HttpConnector` while keeping `Shared` up to date.
#[derive(Clone)]
pub(crate) struct TrackingConnector {
    http: HttpConnector,
    dial_timeout: Option<Duration>,
    shared: Arc<Shared>,
}

impl TrackingConnector {
    pub(crate) fn new(endpoint: &Endpoint, backoff: BackoffConfig) -> Self {
        let mut http = HttpConnector::new();
        http.enforce_http(false);
        http.set_nodelay(endpoint.get_tcp_nodelay());
        http.set_keepalive(endpoint.get_tcp_keepalive());
        http.set_connect_timeout(endpoint.get_connect_timeout());

        TrackingConnector {
            http,
            dial_timeout: endpoint.get_connect_timeout(),
            shared: Arc::new(Shared::new(endpoint.uri().clone(), backoff)),
        }
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Starts one background dial if the connection is idle. The resulting
    /// transport is parked until the channel asks for one.
    pub(crate) fn warm_up(&self) {
        {
            let mut inner = self.shared.inner.lock();
            if inner.dialing
                || inner.has_parked()
                || self.shared.state() != ConnectivityState::Idle
            {
                return;
            }
            inner.dialing = true;
            if inner.live == 0 {
                self.shared.publish(ConnectivityState::Connecting);
            }
        }

        trace!(uri = %self.shared.uri, "warming up");
        let connector = self.clone();
        tokio::spawn(async move {
            let dialed = connector.dial(connector.shared.uri.clone()).await;

            let claim = {
                let mut inner = connector.shared.inner.lock();
                inner.dialing = false;
                match &dialed {
                    Ok(_) if connector.shared.state() != ConnectivityState::Shutdown => {
                        let (parked, claim) = oneshot::channel();
                        inner.parked = Some(parked);
                        Some(claim)
                    }
                    _ => None,
                }
            };

            // Anything not parked is dropped here, outside the lock.
            if let (Ok(io), Some(claim)) = (dialed, claim) {
                park(io, claim).await;
            }
        });
    }

    fn dial(&self, uri: Uri) -> impl Future<Output = Result<TrackedIo, BoxError>> + Send {
        let shared = Arc::clone(&self.shared);
        let connecting = self.http.clone().oneshot(uri);
        let dial_timeout = self.dial_timeout;

        async move {
            if shared.state() == ConnectivityState::Shutdown {
                return Err(BoxError::from("connection is closed"));
            }
            shared.dial_started();

            let dialed: Result<_, BoxError> = match dial_timeout {
                Some(limit) => match tokio::time::timeout(limit, connecting).await {
                    Ok(dialed) => dialed.map_err(Into::into),
                    Err(elapsed) => Err(elapsed.into()),
                },
                None => connecting.await.map_err(Into::into),
            };

            match dialed {
                Ok(io) => Ok(shared.dial_succeeded(io)),
                Err(error) => {
                    shared.dial_failed(&error);
                    Err(error)
                }
            }
        }
    }
}

enum Parked {
    Claimed(Handoff),
    Abandoned,
    PeerClosed,
}

/// Holds a warmed-up transport until the connector claims it.
///
/// Nothing reads a parked transport, so the peer going away is only noticed
/// by peeking. A peer that closes before sending anything counts as a failed
/// dial. Once the peer has sent its first bytes the transport is left alone.
async fn park(io: TrackedIo, mut claim: oneshot::Receiver<Handoff>) {
    let stream = io.io.inner();
    let mut greeted = false;
    let parked = poll_fn(|cx| {
        if let Poll::Ready(claimed) = Pin::new(&mut claim).poll(cx) {
            return Poll::Ready(match claimed {
                Ok(handoff) => Parked::Claimed(handoff),
                Err(_) => Parked::Abandoned,
            });
        }

        if !greeted {
            let mut byte = [0u8; 1];
            let mut buf = ReadBuf::new(&mut byte);
            match stream.poll_peek(cx, &mut buf) {
                Poll::Ready(Ok(0)) | Poll::Ready(Err(_)) => {
                    return Poll::Ready(Parked::PeerClosed);
                }
                Poll::Ready(Ok(_)) => greeted = true,
                Poll::Pending => {}
            }
        }

        Poll::Pending
    })
    .await;

    match parked {
        Parked::Claimed(handoff) => {
            // A connector that gave up on the claim drops the transport.
            let _ = handoff.send(io);
        }
        Parked::Abandoned => drop(io),
        Parked::PeerClosed => {
            drop(claim);
            let shared = io.shared.upgrade();
            drop(io);
            if let Some(shared) = shared {
                shared.dial_failed(&BoxError::from("peer closed the connection before use"));
            }
        }
    }
}

impl Service<Uri> for TrackingConnector {
    type Response = TrackedIo;
    type Error = BoxError;
    type Future = Pin<Box<dyn Future<Output = Result<TrackedIo, BoxError>> + Send>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, uri: Uri) -> Self::Future {
        if let Some(parked) = self.shared.take_parked() {
            let (handoff, claimed) = oneshot::channel();
            if parked.send(handoff).is_ok() {
                trace!(uri = %self.shared.uri, "using warmed-up transport");
                let fallback = self.dial(uri);
                return Box::pin(async move {
                    match claimed.await {
                        Ok(io) => Ok(io),
                        Err(_) => fallback.await,
                    }
                });
            }
        }
        Box::pin(self.dial(uri))
    }
}

/// A TCP transport that reports its own drop to `Shared` and fails all IO
/// once the connection is closed.
///
/// Holds a weak reference: the parking task may outlive every handle.
pub(crate) struct TrackedIo {
    io: TokioIo<TcpStream>,
    shared: Weak<Shared>,
    closed: Pin<Box<dyn Future<Output = ()> + Send>>,
    shut: bool,
}

impl TrackedIo {
    fn poll_closed(&mut self, cx: &mut Context<'_>) -> bool {
        if !self.shut && self.closed.as_mut().poll(cx).is_ready() {
            self.shut = true;
        }
        self.shut
    }
}

fn closed_error() -> io::Error {
    io::Error::new(io::ErrorKind::ConnectionAborted, "connection closed")
}

impl Drop for TrackedIo {
    fn drop(&mut self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.released();
        }
    }
}

impl rt::Read for TrackedIo {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: rt::ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_closed(cx) {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.io).poll_read(cx, buf)
    }
}

impl rt::Write for TrackedIo {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_closed(cx) {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.io).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.poll_closed(cx) {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.io).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.io).poll_shutdown(cx)
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.poll_closed(cx) {
            return Poll::Ready(Err(closed_error()));
        }
        Pin::new(&mut this.io).poll_write_vectored(cx, bufs)
    }

    fn is_write_vectored(&self) -> bool {
        self.io.is_write_vectored()
    }
}
