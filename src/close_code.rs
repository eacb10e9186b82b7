//! Close-code classification.
//!
//! Maps the numeric close status reported by a transport to a [`CloseCode`]
//! category. The mapping is total: a missing status is [`CloseCode::Abnormal`]
//! and any status outside the table is [`CloseCode::Undefined`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a connection ended, reported once per connection attempt through
/// [`EventHandler::on_close`](crate::EventHandler::on_close).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CloseCode {
    /// 1000: the purpose of the connection was fulfilled.
    Normal,
    /// 1001: an endpoint is going away.
    GoingAway,
    /// 1002: protocol error.
    ProtocolError,
    /// 1003: received a data type the endpoint cannot accept.
    Unsupported,
    /// 1006, or no close status at all.
    Abnormal,
    /// 1007: message payload inconsistent with its type.
    InvalidPayload,
    /// 1008: policy violation.
    PolicyViolation,
    /// 1009: message too big to process.
    MessageTooBig,
    /// 1010: the server did not negotiate a required extension.
    MissingExtension,
    /// 1011: the server hit an unexpected condition.
    InternalError,
    /// 1015: TLS handshake failure.
    TlsHandshakeFailure,
    /// Any status not listed above.
    Undefined,
}

impl CloseCode {
    /// Classify an optional native close status.
    ///
    /// ```
    /// use polling_websocket::CloseCode;
    ///
    /// assert_eq!(CloseCode::from_status(Some(1000)), CloseCode::Normal);
    /// assert_eq!(CloseCode::from_status(None), CloseCode::Abnormal);
    /// assert_eq!(CloseCode::from_status(Some(4000)), CloseCode::Undefined);
    /// ```
    pub fn from_status(status: Option<u16>) -> Self {
        match status {
            Some(code) => Self::from(code),
            None => Self::Abnormal,
        }
    }

    /// Returns the wire value for this category, or `None` for
    /// [`Undefined`](CloseCode::Undefined).
    pub fn as_u16(self) -> Option<u16> {
        match self {
            Self::Normal => Some(1000),
            Self::GoingAway => Some(1001),
            Self::ProtocolError => Some(1002),
            Self::Unsupported => Some(1003),
            Self::Abnormal => Some(1006),
            Self::InvalidPayload => Some(1007),
            Self::PolicyViolation => Some(1008),
            Self::MessageTooBig => Some(1009),
            Self::MissingExtension => Some(1010),
            Self::InternalError => Some(1011),
            Self::TlsHandshakeFailure => Some(1015),
            Self::Undefined => None,
        }
    }

    /// Returns a human-readable description of this close code.
    pub fn description(self) -> &'static str {
        match self {
            Self::Normal => "The connection was closed normally.",
            Self::GoingAway => "The remote endpoint is going away.",
            Self::ProtocolError => "The connection was closed due to a protocol error.",
            Self::Unsupported => "The remote endpoint received a data type it cannot accept.",
            Self::Abnormal => "The connection was closed without a close frame.",
            Self::InvalidPayload => "A message payload did not match its declared type.",
            Self::PolicyViolation => "The remote endpoint closed the connection due to a policy violation.",
            Self::MessageTooBig => "A message was too big for the remote endpoint to process.",
            Self::MissingExtension => "The server did not negotiate a required extension.",
            Self::InternalError => "The server encountered an unexpected condition.",
            Self::TlsHandshakeFailure => "The TLS handshake failed.",
            Self::Undefined => "The connection was closed with an unrecognized status.",
        }
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => Self::Normal,
            1001 => Self::GoingAway,
            1002 => Self::ProtocolError,
            1003 => Self::Unsupported,
            1006 => Self::Abnormal,
            1007 => Self::InvalidPayload,
            1008 => Self::PolicyViolation,
            1009 => Self::MessageTooBig,
            1010 => Self::MissingExtension,
            1011 => Self::InternalError,
            1015 => Self::TlsHandshakeFailure,
            _ => Self::Undefined,
        }
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_u16() {
            Some(code) => write!(f, "{self:?} ({code})"),
            None => write!(f, "{self:?}"),
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_categories() {
        assert_eq!(CloseCode::from(1000), CloseCode::Normal);
        assert_eq!(CloseCode::from(1001), CloseCode::GoingAway);
        assert_eq!(CloseCode::from(1002), CloseCode::ProtocolError);
        assert_eq!(CloseCode::from(1003), CloseCode::Unsupported);
        assert_eq!(CloseCode::from(1007), CloseCode::InvalidPayload);
        assert_eq!(CloseCode::from(1008), CloseCode::PolicyViolation);
        assert_eq!(CloseCode::from(1009), CloseCode::MessageTooBig);
        assert_eq!(CloseCode::from(1010), CloseCode::MissingExtension);
        assert_eq!(CloseCode::from(1011), CloseCode::InternalError);
        assert_eq!(CloseCode::from(1015), CloseCode::TlsHandshakeFailure);
    }

    #[test]
    fn missing_status_is_abnormal() {
        assert_eq!(CloseCode::from_status(None), CloseCode::Abnormal);
    }

    #[test]
    fn unrecognized_status_is_undefined() {
        for code in [0, 999, 1004, 1005, 1012, 1014, 3000, 4999, u16::MAX] {
            assert_eq!(CloseCode::from(code), CloseCode::Undefined, "code {code}");
        }
    }

    #[test]
    fn wire_values_agree_with_classification() {
        for code in 0..=u16::MAX {
            let category = CloseCode::from(code);
            if let Some(wire) = category.as_u16() {
                assert_eq!(wire, code);
            }
        }
    }

    #[test]
    fn display_includes_wire_value() {
        assert_eq!(CloseCode::MessageTooBig.to_string(), "MessageTooBig (1009)");
        assert_eq!(CloseCode::Undefined.to_string(), "Undefined");
    }

    #[test]
    fn every_code_has_a_description() {
        assert!(!CloseCode::Normal.description().is_empty());
        assert!(!CloseCode::Undefined.description().is_empty());
    }
}
