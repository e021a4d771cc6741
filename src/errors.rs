// Copyright (c) Facebook, Inc. and its affiliates.
// Modifications Copyright (c) 2022-2023 Bolt Labs Holdings, Inc
//
// This source code is licensed under both the MIT license found in the
// LICENSE-MIT file in the root directory of this source tree and the Apache
// License, Version 2.0 found in the LICENSE-APACHE file in the root directory
// of this source tree.

//! Error types produced during an execution of the protocols, together with
//! the source location that raised them. Sessions accumulate these on an
//! ordered stack so a driver can report exactly where an instance died.

use std::panic::Location;
use thiserror::Error;

/// The default Result type used in this crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// The four classes of failure a protocol instance can hit. Every variant
/// carries a human-readable description of the specific failure.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
pub enum ErrorKind {
    /// Session creation parameters were rejected before any protocol state
    /// existed.
    #[error("invalid configuration: {0}")]
    Configuration(String),
    /// An inbound payload could not be decoded, came from an unexpected
    /// sender, or had the wrong shape for the receiving round.
    #[error("malformed message: {0}")]
    Message(String),
    /// A cryptographic check failed. The instance is unrecoverable.
    #[error("verification failed: {0}")]
    Verification(String),
    /// The driver invoked an operation the state machine cannot honor.
    #[error("protocol state violation: {0}")]
    ProtocolState(String),
}

/// A single entry on a session's error stack: the failure class plus the
/// source location that raised it.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind} (at {location})")]
pub struct ProtocolError {
    kind: ErrorKind,
    location: &'static Location<'static>,
}

impl ProtocolError {
    #[track_caller]
    pub(crate) fn configuration(msg: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Configuration(msg.into()),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub(crate) fn message(msg: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Message(msg.into()),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub(crate) fn verification(msg: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Verification(msg.into()),
            location: Location::caller(),
        }
    }

    #[track_caller]
    pub(crate) fn protocol_state(msg: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::ProtocolState(msg.into()),
            location: Location::caller(),
        }
    }

    /// The failure class and description.
    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// The source location that raised the error.
    pub fn location(&self) -> &'static Location<'static> {
        self.location
    }
}

macro_rules! serialize {
    ($x:expr) => {{
        bincode::serialize($x)
            .map_err(|_| crate::errors::ProtocolError::message("could not encode payload"))
    }};
}

macro_rules! deserialize {
    ($x:expr) => {{
        bincode::deserialize($x)
            .map_err(|_| crate::errors::ProtocolError::message("could not decode payload"))
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[track_caller]
    fn here() -> ProtocolError {
        ProtocolError::verification("test entry")
    }

    #[test]
    fn errors_carry_their_raise_site() {
        let err = here();
        assert_eq!(
            err.kind(),
            &ErrorKind::Verification("test entry".to_string())
        );
        assert!(err.location().file().ends_with("errors.rs"));
        let rendered = err.to_string();
        assert!(rendered.contains("verification failed: test entry"));
        assert!(rendered.contains("errors.rs"));
    }

    #[test]
    fn codec_macros_map_into_message_kind() {
        let bytes = serialize!(&(1u64, String::from("x"))).unwrap();
        let back: (u64, String) = deserialize!(&bytes).unwrap();
        assert_eq!(back.0, 1);

        let garbage = [0xffu8; 3];
        let result: Result<(u64, String)> = deserialize!(&garbage[..]);
        let err = result.unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Message(_)));
    }
}
