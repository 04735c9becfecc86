//! One bridged network: its connection, nickname and channels.
//!
//! An endpoint turns client [`Event`]s into [`RelayedEvent`]s, renders them
//! with its identifier and hands them to the [`EndpointSet`]. In the other
//! direction it implements [`Peer`], posting lines from other networks to
//! each of its channels.

use std::sync::Arc;

use bridge_sdk::client::{self, ClientHandle, ReconnectConfig};
use bridge_sdk::event::Event;
use bridge_sdk::irc;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::Instrument;

use crate::config::{BridgeConfig, ServerConfig};
use crate::format::RelayedEvent;
use crate::relay::{EndpointSet, Peer};

pub struct Endpoint {
    identifier: String,
    server_addr: String,
    modes: String,
    configured_channels: Vec<String>,
    handle: ClientHandle,
    /// Our current nick on this network.
    nickname: Mutex<String>,
    /// Channels relayed lines are posted to. Read by peers' tasks.
    channels: Mutex<Vec<String>>,
}

impl Endpoint {
    /// Wrap an existing client handle. The nickname starts as the configured
    /// one and is replaced once the server confirms registration.
    pub fn new(config: &BridgeConfig, server: &ServerConfig, handle: ClientHandle) -> Self {
        Self {
            identifier: server.identifier.clone(),
            server_addr: server.server_addr(),
            modes: server.modes.clone(),
            configured_channels: server.channels.clone(),
            handle,
            nickname: Mutex::new(config.nickname.clone()),
            channels: Mutex::new(server.channels.clone()),
        }
    }

    /// Start connecting to `server`. Returns the endpoint and the event
    /// stream that [`Endpoint::run`] consumes.
    pub fn connect(
        config: &BridgeConfig,
        server: &ServerConfig,
    ) -> (Arc<Self>, mpsc::Receiver<Event>) {
        let (handle, events) =
            client::connect(config.connect_config(server), ReconnectConfig::default());
        (Arc::new(Self::new(config, server, handle)), events)
    }

    pub fn nickname(&self) -> String {
        self.nickname.lock().clone()
    }

    pub fn channels(&self) -> Vec<String> {
        self.channels.lock().clone()
    }

    pub fn handle(&self) -> &ClientHandle {
        &self.handle
    }

    /// Handle this endpoint's events until its connection shuts down.
    ///
    /// One task per endpoint, so handlers of one endpoint never overlap.
    pub async fn run(self: Arc<Self>, mut events: mpsc::Receiver<Event>, peers: Arc<EndpointSet>) {
        let span = tracing::info_span!("endpoint", id = %self.identifier);
        async move {
            while let Some(event) = events.recv().await {
                self.handle_event(&event, &peers);
            }
            tracing::info!("Event stream closed");
        }
        .instrument(span)
        .await
    }

    /// React to one event: update our own state and relay whatever the
    /// other networks should see.
    pub fn handle_event(&self, event: &Event, peers: &EndpointSet) {
        match event {
            Event::Connected => {
                tracing::info!(server = %self.server_addr, "Connected");
            }
            Event::Registered { nick } => self.on_registered(nick),
            Event::ServerNotice { text } => {
                tracing::debug!(server = %self.server_addr, "Notice: {text}");
            }
            Event::Disconnected { reason } => {
                tracing::warn!(server = %self.server_addr, reason = %reason, "Disconnected");
            }
            _ => {}
        }

        let Some(relayed) = self.observe(event) else {
            return;
        };
        tracing::debug!(kind = relayed.kind_name(), "Received event");
        let line = relayed.render(&self.identifier);
        let delivered = peers.relay(self, &line);
        tracing::trace!(peers = delivered, "Relayed");
    }

    fn on_registered(&self, nick: &str) {
        tracing::info!(nick = %nick, "Registered with server");
        if !nick.is_empty() {
            *self.nickname.lock() = nick.to_string();
        }
        if self.modes.is_empty() {
            return;
        }
        let nick = self.nickname();
        if let Err(e) = self.handle.try_raw(&format!("MODE {nick} {}", self.modes)) {
            tracing::warn!(error = %e, "Failed to set modes {}", self.modes);
        }
    }

    /// Translate a client event into the event other networks should see,
    /// tracking our own nick and channel membership on the way. Our own
    /// actions yield `None`.
    fn observe(&self, event: &Event) -> Option<RelayedEvent> {
        match event {
            Event::Message { from, target, text } => {
                if !irc::is_channel(target) || self.is_me(from) {
                    return None;
                }
                Some(RelayedEvent::Message {
                    actor: from.clone(),
                    text: text.clone(),
                })
            }
            Event::Action { from, target, text } => {
                if !irc::is_channel(target) || self.is_me(from) {
                    return None;
                }
                Some(RelayedEvent::Action {
                    actor: from.clone(),
                    text: text.clone(),
                })
            }
            Event::Joined { channel, nick } => {
                if self.is_me(nick) {
                    tracing::debug!(channel = %channel, "Skipping own join");
                    self.manage(channel);
                    return None;
                }
                Some(RelayedEvent::Join {
                    actor: nick.clone(),
                    channel: channel.clone(),
                })
            }
            Event::Parted {
                channel,
                nick,
                reason,
            } => {
                if self.is_me(nick) {
                    tracing::debug!(channel = %channel, "Skipping own part");
                    self.unmanage(channel);
                    return None;
                }
                Some(RelayedEvent::Part {
                    actor: nick.clone(),
                    channel: channel.clone(),
                    reason: reason.clone(),
                })
            }
            Event::Kicked {
                channel,
                nick,
                by,
                reason,
            } => {
                if self.is_me(nick) {
                    tracing::warn!(channel = %channel, by = %by, "Kicked from channel");
                    self.unmanage(channel);
                }
                Some(RelayedEvent::Kick {
                    actor: by.clone(),
                    target: nick.clone(),
                    channel: channel.clone(),
                    reason: reason.clone(),
                })
            }
            Event::UserQuit { nick, reason } => Some(RelayedEvent::Quit {
                actor: nick.clone(),
                reason: reason.clone(),
            }),
            Event::NickChanged { old_nick, new_nick } => {
                if self.is_me(old_nick) {
                    tracing::info!(nick = %new_nick, "Own nick changed");
                    *self.nickname.lock() = new_nick.clone();
                    return None;
                }
                Some(RelayedEvent::NickChange {
                    actor: old_nick.clone(),
                    new_nick: new_nick.clone(),
                })
            }
            Event::Connected
            | Event::Registered { .. }
            | Event::ServerNotice { .. }
            | Event::Disconnected { .. } => None,
        }
    }

    fn is_me(&self, nick: &str) -> bool {
        irc::irc_eq(&self.nickname.lock(), nick)
    }

    /// Resume posting to `channel` if it is one of ours.
    fn manage(&self, channel: &str) {
        let Some(configured) = self
            .configured_channels
            .iter()
            .find(|c| irc::irc_eq(c, channel))
        else {
            return;
        };
        let mut channels = self.channels.lock();
        if !channels.iter().any(|c| irc::irc_eq(c, channel)) {
            channels.push(configured.clone());
        }
    }

    fn unmanage(&self, channel: &str) {
        self.channels.lock().retain(|c| !irc::irc_eq(c, channel));
    }
}

impl Peer for Endpoint {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn send_message(&self, text: &str) {
        for channel in self.channels() {
            tracing::trace!(to = %self.identifier, channel = %channel, "Forwarding message");
            if let Err(e) = self.handle.try_privmsg(&channel, text) {
                tracing::warn!(to = %self.identifier, channel = %channel, error = %e, "Send failed");
            }
        }
    }

    fn send_action(&self, text: &str) {
        for channel in self.channels() {
            tracing::trace!(to = %self.identifier, channel = %channel, "Forwarding action");
            if let Err(e) = self.handle.try_action(&channel, text) {
                tracing::warn!(to = %self.identifier, channel = %channel, error = %e, "Send failed");
            }
        }
    }
}
