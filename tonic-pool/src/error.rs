use std::{error, fmt};

use crate::BoxError;

/// Errors returned when building or using a pool.
#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<BoxError>,
}

#[derive(Debug)]
enum Kind {
    EmptyAddresses,
    InvalidAddress(String),
    InvalidConfig(&'static str),
    Closed,
}

impl Error {
    pub(crate) fn empty_addresses() -> Self {
        Error {
            kind: Kind::EmptyAddresses,
            source: None,
        }
    }

    pub(crate) fn invalid_address(address: &str, source: impl Into<BoxError>) -> Self {
        Error {
            kind: Kind::InvalidAddress(address.to_owned()),
            source: Some(source.into()),
        }
    }

    pub(crate) fn invalid_config(reason: &'static str) -> Self {
        Error {
            kind: Kind::InvalidConfig(reason),
            source: None,
        }
    }

    pub(crate) fn closed() -> Self {
        Error {
            kind: Kind::Closed,
            source: None,
        }
    }

    /// Returns true if the pool was built from an empty address list.
    pub fn is_empty_addresses(&self) -> bool {
        matches!(self.kind, Kind::EmptyAddresses)
    }

    /// Returns true if an address could not be understood by the transport.
    pub fn is_invalid_address(&self) -> bool {
        matches!(self.kind, Kind::InvalidAddress(_))
    }

    /// Returns true if a configuration value was rejected.
    pub fn is_invalid_config(&self) -> bool {
        matches!(self.kind, Kind::InvalidConfig(_))
    }

    /// Returns true if the pool has been closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.kind, Kind::Closed)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            Kind::EmptyAddresses => f.write_str("address list is empty"),
            Kind::InvalidAddress(address) => write!(f, "invalid address {address:?}"),
            Kind::InvalidConfig(reason) => write!(f, "invalid configuration: {reason}"),
            Kind::Closed => f.write_str("pool is closed"),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|source| &**source as &(dyn error::Error + 'static))
    }
}
