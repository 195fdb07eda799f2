use std::fmt;

/// The liveness of a single connection as observed from its transport.
///
/// A connection starts out `Idle`. Asking it to connect moves it to
/// `Connecting`, and from there to `Ready` once a transport is established or
/// to `TransientFailure` if the attempt fails. A ready connection whose
/// transport goes away drops back to `Idle`. `Shutdown` is terminal and is
/// only entered when the owner closes the connection.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum ConnectivityState {
    /// Not connected and not trying to.
    Idle,
    /// A connection attempt is in flight.
    Connecting,
    /// Able to carry RPCs.
    Ready,
    /// The last attempt failed; the transport will retry later.
    TransientFailure,
    /// Closed by its owner.
    Shutdown,
}

impl ConnectivityState {
    /// Maps a transport reported state code to a state.
    ///
    /// Codes follow the gRPC core numbering, `0` through `4` for `Idle`
    /// through `Shutdown`. Any other code is reported as `TransientFailure`:
    /// a state that cannot be observed is never treated as ready.
    pub const fn from_code(code: u8) -> Self {
        match code {
            0 => ConnectivityState::Idle,
            1 => ConnectivityState::Connecting,
            2 => ConnectivityState::Ready,
            3 => ConnectivityState::TransientFailure,
            4 => ConnectivityState::Shutdown,
            _ => ConnectivityState::TransientFailure,
        }
    }

    /// The code `from_code` maps back to this state.
    pub const fn code(self) -> u8 {
        match self {
            ConnectivityState::Idle => 0,
            ConnectivityState::Connecting => 1,
            ConnectivityState::Ready => 2,
            ConnectivityState::TransientFailure => 3,
            ConnectivityState::Shutdown => 4,
        }
    }

    /// Whether a connection in this state may still become ready without
    /// another connect request.
    pub(crate) fn is_pending(self) -> bool {
        matches!(
            self,
            ConnectivityState::Idle | ConnectivityState::Connecting
        )
    }
}

impl From<u8> for ConnectivityState {
    fn from(code: u8) -> Self {
        ConnectivityState::from_code(code)
    }
}

impl fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectivityState::Idle => write!(f, "Idle"),
            ConnectivityState::Connecting => write!(f, "Connecting"),
            ConnectivityState::Ready => write!(f, "Ready"),
            ConnectivityState::TransientFailure => write!(f, "TransientFailure"),
            ConnectivityState::Shutdown => write!(f, "Shutdown"),
        }
    }
}
