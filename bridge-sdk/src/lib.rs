//! bridge-sdk: the IRC client underneath irc-bridge.
//!
//! Handles the socket (plain or TLS), registration, keepalive and
//! reconnection, and turns server lines into typed [`event::Event`]s.
//! Consumers drive the connection through a [`client::ClientHandle`].

pub mod client;
pub mod event;
pub mod irc;
