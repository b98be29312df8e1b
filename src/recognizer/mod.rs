//! Streaming speech recognizer connection
//!
//! Audio chunks flow out and JSON transcript events flow back over one duplex
//! WebSocket. The session only sees a [`RecognizerLink`]; the transport task
//! behind it owns the socket.

pub mod client;
pub mod messages;

pub use client::{link_pair, DeepgramConnector, LinkPeer, RecognizerConnector, RecognizerLink};
pub use messages::{RecognizerControl, RecognizerMessage};
