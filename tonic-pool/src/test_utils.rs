//! A scriptable in-memory transport for exercising selection without sockets.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;

use crate::transport::{Connection, Transport};
use crate::{BoxError, ConnectivityState};

/// What a test connection does when asked to connect.
#[derive(Clone, Copy, Debug)]
pub(crate) enum Script {
    /// Becomes ready immediately.
    Ready,
    /// Fails immediately.
    Fail,
    /// Becomes ready after the given delay.
    After(Duration),
    /// Stays connecting forever.
    Hang,
}

#[derive(Clone, Default)]
pub(crate) struct TestTransport {
    scripts: Arc<Mutex<HashMap<String, Script>>>,
    connections: Arc<Mutex<Vec<TestConnection>>>,
}

impl TestTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Sets the script for connections to `address`. Addresses without a
    /// script connect immediately.
    pub(crate) fn script(self, address: &str, script: Script) -> Self {
        self.scripts.lock().insert(address.to_owned(), script);
        self
    }

    /// Number of connections created so far.
    pub(crate) fn connects(&self) -> usize {
        self.connections.lock().len()
    }

    /// The most recent connection created for `address`.
    pub(crate) fn connection(&self, address: &str) -> Option<TestConnection> {
        self.connections
            .lock()
            .iter()
            .rev()
            .find(|connection| connection.address() == address)
            .cloned()
    }

    /// Creates a connection directly, bypassing any pool.
    pub(crate) fn connection_for(&self, address: &str) -> TestConnection {
        self.connect(&address.to_owned())
    }
}

impl Transport for TestTransport {
    type Target = String;
    type Connection = TestConnection;

    fn target(&self, address: &str) -> Result<String, BoxError> {
        if address.starts_with("invalid:") {
            return Err("unparseable address".into());
        }
        Ok(address.to_owned())
    }

    fn connect(&self, target: &String) -> TestConnection {
        let script = self
            .scripts
            .lock()
            .get(target)
            .copied()
            .unwrap_or(Script::Ready);
        let connection = TestConnection {
            inner: Arc::new(TestInner {
                address: target.clone(),
                script,
                state: watch::Sender::new(ConnectivityState::Idle),
                closes: AtomicUsize::new(0),
            }),
        };
        self.connections.lock().push(connection.clone());
        connection
    }
}

#[derive(Clone)]
pub(crate) struct TestConnection {
    inner: Arc<TestInner>,
}

struct TestInner {
    address: String,
    script: Script,
    state: watch::Sender<ConnectivityState>,
    closes: AtomicUsize,
}

impl TestConnection {
    pub(crate) fn address(&self) -> &str {
        &self.inner.address
    }

    /// Reads the state without side effects.
    pub(crate) fn peek(&self) -> ConnectivityState {
        *self.inner.state.borrow()
    }

    pub(crate) fn set_state(&self, state: ConnectivityState) {
        self.inner.state.send_replace(state);
    }

    pub(crate) fn closes(&self) -> usize {
        self.inner.closes.load(Ordering::SeqCst)
    }

    fn start(&self) {
        match self.inner.script {
            Script::Ready => self.set_state(ConnectivityState::Ready),
            Script::Fail => self.set_state(ConnectivityState::TransientFailure),
            Script::Hang => self.set_state(ConnectivityState::Connecting),
            Script::After(delay) => {
                self.set_state(ConnectivityState::Connecting);
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.state.send_if_modified(|state| {
                        if *state == ConnectivityState::Connecting {
                            *state = ConnectivityState::Ready;
                            true
                        } else {
                            false
                        }
                    });
                });
            }
        }
    }
}

impl Connection for TestConnection {
    fn state(&self, try_to_connect: bool) -> ConnectivityState {
        if try_to_connect && self.peek() == ConnectivityState::Idle {
            self.start();
        }
        self.peek()
    }

    async fn ready(&self) -> bool {
        let mut state = self.inner.state.subscribe();
        state
            .wait_for(|state| !state.is_pending())
            .await
            .map(|state| *state == ConnectivityState::Ready)
            .unwrap_or(false)
    }

    fn close(&self) {
        self.inner.closes.fetch_add(1, Ordering::SeqCst);
        self.set_state(ConnectivityState::Shutdown);
    }
}

impl PartialEq for TestConnection {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for TestConnection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestConnection")
            .field("address", &self.inner.address)
            .field("state", &self.peek())
            .finish()
    }
}
