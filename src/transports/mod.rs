//! Transport implementations.
//!
//! This module provides concrete [`Transport`](crate::Transport) implementations
//! behind feature gates:
//!
//! | Feature                | Transport                 |
//! |------------------------|---------------------------|
//! | `transport-websocket`  | [`TungsteniteTransport`]  |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{TungsteniteConnector, TungsteniteTransport};
