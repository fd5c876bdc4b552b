use std::path::PathBuf;

use thiserror::Error;

use crate::registry::ConnectionId;
use crate::room::RoomId;

/// Failures inside the matchmaking and relay core.
///
/// None of these ever reach a client. The lobby logs them and the event
/// that produced them has no effect.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    #[error("connection {0} is not registered")]
    NotRegistered(ConnectionId),
    #[error("connection {0} is not bound to a room")]
    NotBound(ConnectionId),
    #[error("connection is bound to room {bound}, event addressed room {addressed}")]
    RoomMismatch { bound: RoomId, addressed: String },
    #[error("room {0} is not a private room")]
    NotPrivate(RoomId),
    #[error("room {room} holds {occupants} occupants, offer negotiation needs exactly two")]
    RoomCapacityExceeded { room: RoomId, occupants: usize },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: &'static str, value: String },
    #[error("{0} must be set together with the matching certificate/key variable")]
    IncompleteTls(&'static str),
    #[error("failed to read TLS material from {path}: {source}")]
    TlsIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(PathBuf),
    #[error("no private key found in {0}")]
    NoPrivateKey(PathBuf),
}
