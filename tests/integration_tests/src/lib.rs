use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tonic::transport::server::TcpIncoming;
use tonic::transport::{Channel, Server};
use tonic::Status;
use tonic_health::pb::health_client::HealthClient;
use tonic_health::pb::HealthCheckRequest;
use tonic_health::ServingStatus;
use tonic_pool::TonicConnection;
use tower_layer::Layer;
use tower_service::Service;

pub fn trace_init() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// A health service on an ephemeral local port that counts the requests it
/// receives.
pub struct Backend {
    addr: SocketAddr,
    requests: Arc<AtomicUsize>,
    shutdown: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

impl Backend {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let incoming = TcpIncoming::from(listener);

        let (mut reporter, health) = tonic_health::server::health_reporter();
        reporter
            .set_service_status("", ServingStatus::Serving)
            .await;

        let requests = Arc::new(AtomicUsize::new(0));
        let (shutdown, rx) = oneshot::channel::<()>();

        let router = Server::builder()
            .layer(CountRequestsLayer(requests.clone()))
            .add_service(health);
        let handle = tokio::spawn(async move {
            router
                .serve_with_incoming_shutdown(incoming, async { drop(rx.await) })
                .await
                .unwrap();
        });

        Backend {
            addr,
            requests,
            shutdown,
            handle,
        }
    }

    pub fn address(&self) -> String {
        self.addr.to_string()
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn stop(self) {
        let _ = self.shutdown.send(());
        self.handle.await.unwrap();
    }
}

/// An address nothing listens on.
pub async fn unused_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr.to_string()
}

/// Issues one health check over `connection`.
pub async fn check(connection: &TonicConnection) -> Result<(), Status> {
    check_with(&mut HealthClient::new(connection.channel())).await
}

pub async fn check_with(client: &mut HealthClient<Channel>) -> Result<(), Status> {
    client
        .check(HealthCheckRequest {
            service: String::new(),
        })
        .await
        .map(drop)
}

#[derive(Clone)]
struct CountRequestsLayer(Arc<AtomicUsize>);

impl<S> Layer<S> for CountRequestsLayer {
    type Service = CountRequests<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CountRequests {
            inner,
            requests: self.0.clone(),
        }
    }
}

#[derive(Clone)]
struct CountRequests<S> {
    inner: S,
    requests: Arc<AtomicUsize>,
}

impl<S, R> Service<R> for CountRequests<S>
where
    S: Service<R>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: R) -> Self::Future {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.call(req)
    }
}
