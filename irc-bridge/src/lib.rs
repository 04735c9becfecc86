//! irc-bridge: relays channel activity between IRC networks.
//!
//! Each configured network gets one [`endpoint::Endpoint`]. Events seen on
//! one network are rendered into annotated lines ([`format`]) and fanned out
//! to every other endpoint through the shared [`relay::EndpointSet`].

pub mod config;
pub mod endpoint;
pub mod error;
pub mod format;
pub mod relay;
