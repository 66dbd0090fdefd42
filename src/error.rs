// Copyright (c) 2017 Anatoly Ikorsky
//
// Licensed under the Apache License, Version 2.0
// <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0> or the MIT
// license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. All files in the project carrying such notice may not be copied,
// modified, or distributed except according to those terms.

use std::{fmt, io};

use crate::constants::UnknownColumnType;

/// Errors delivered to operation callbacks.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed packet, unexpected phase or a codec boundary violation.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
    /// Server replied with an ERR packet.
    #[error(transparent)]
    Server(#[from] ServerError),
    /// Underlying byte stream failed (includes idle timeouts).
    #[error("transport error: {0}")]
    Transport(#[from] io::Error),
    #[error("authentication failed: {0}")]
    Authentication(#[from] AuthError),
    /// The caller misused the API.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),
    /// Session was closed before the operation could complete.
    #[error("connection closed")]
    ConnectionClosed,
    /// An earlier operation failed and the remaining queue was discarded.
    #[error("operation aborted by a previous error")]
    Aborted,
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum ProtocolError {
    #[error("buffer underrun: needed {needed} bytes, {remaining} remaining")]
    BufferUnderrun { needed: usize, remaining: usize },
    #[error("buffer overrun: writing {needed} bytes would exceed the {limit} bytes limit")]
    BufferOverrun { needed: usize, limit: usize },
    #[error("malformed packet: {0}")]
    Malformed(&'static str),
    #[error("unexpected packet 0x{header:02x} while {phase}")]
    UnexpectedPacket { header: u8, phase: &'static str },
    #[error("packets out of order: expected sequence id {expected}, got {got}")]
    OutOfOrder { expected: u8, got: u8 },
    #[error("unsupported protocol version {0}")]
    UnsupportedProtocolVersion(u8),
    #[error(transparent)]
    UnknownColumnType(#[from] UnknownColumnType),
}

/// Server error surfaced from an ERR packet.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct ServerError {
    pub code: u16,
    /// Present only when CLIENT_PROTOCOL_41 was negotiated.
    pub state: Option<String>,
    pub message: String,
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            Some(ref state) => write!(f, "ERROR {} ({}): {}", self.code, state, self.message),
            None => write!(f, "ERROR {}: {}", self.code, self.message),
        }
    }
}

impl std::error::Error for ServerError {}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum AuthError {
    #[error("unsupported auth plugin `{0}`")]
    UnsupportedPlugin(String),
    #[error("credentials rejected: {0}")]
    Rejected(ServerError),
    #[error("unusable server public key: {0}")]
    PublicKey(String),
}

#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
pub enum UsageError {
    #[error("statement is not prepared")]
    NotPrepared,
    #[error("statement expects {expected} parameters, {supplied} supplied")]
    ParamCount { expected: usize, supplied: usize },
    #[error("statement has no parameter {0}")]
    NoSuchParam(u16),
    #[error("statement belongs to a closed session or was closed")]
    StaleStatement,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn should_display_server_error() {
        let err = ServerError {
            code: 1096,
            state: Some("HY000".into()),
            message: "No tables used".into(),
        };
        assert_eq!(err.to_string(), "ERROR 1096 (HY000): No tables used");

        let err = ServerError {
            code: 1040,
            state: None,
            message: "Too many connections".into(),
        };
        assert_eq!(Error::from(err).to_string(), "ERROR 1040: Too many connections");
    }
}
