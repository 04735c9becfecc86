//! End-to-end relay scenarios across three networks, with detached client
//! handles standing in for live connections.

use std::sync::Arc;

use bridge_sdk::client::{ClientHandle, Command};
use bridge_sdk::event::Event;
use tokio::sync::mpsc;

use irc_bridge::config::BridgeConfig;
use irc_bridge::endpoint::Endpoint;
use irc_bridge::format;
use irc_bridge::relay::{EndpointSet, Peer};

const CONFIG: &str = r##"
nickname = "bridge"
ident = "bridge"
realname = "IRC relay bridge"

[[servers]]
address = "irc.a.example"
port = 6667
identifier = "neta"
channels = ["#relay"]

[[servers]]
address = "irc.b.example"
port = 6697
secure = true
identifier = "netb"
channels = ["#relay"]

[[servers]]
address = "irc.c.example"
port = 6667
identifier = "netc"
channels = ["#relay"]
"##;

struct Bridge {
    endpoints: Vec<Arc<Endpoint>>,
    outputs: Vec<mpsc::Receiver<Command>>,
    peers: Arc<EndpointSet>,
}

impl Bridge {
    fn new() -> Self {
        let config = BridgeConfig::parse(CONFIG).unwrap();
        let mut endpoints = Vec::new();
        let mut outputs = Vec::new();
        for server in &config.servers {
            let (handle, rx) = ClientHandle::detached(64);
            endpoints.push(Arc::new(Endpoint::new(&config, server, handle)));
            outputs.push(rx);
        }
        let peers = Arc::new(EndpointSet::new(
            endpoints.iter().map(|e| e.clone() as Arc<dyn Peer>).collect(),
        ));
        Self {
            endpoints,
            outputs,
            peers,
        }
    }

    fn feed(&self, index: usize, event: Event) {
        self.endpoints[index].handle_event(&event, &self.peers);
    }

    fn drain(&mut self, index: usize) -> Vec<Command> {
        let mut out = Vec::new();
        while let Ok(cmd) = self.outputs[index].try_recv() {
            out.push(cmd);
        }
        out
    }

    fn drain_all(&mut self) -> Vec<Vec<Command>> {
        (0..self.outputs.len()).map(|i| self.drain(i)).collect()
    }
}

fn say(text: &str) -> Command {
    Command::Privmsg {
        target: "#relay".into(),
        text: text.into(),
    }
}

#[test]
fn channel_message_reaches_the_other_two_networks() {
    let mut bridge = Bridge::new();
    bridge.feed(0, Event::Message {
        from: "bob".into(),
        target: "#relay".into(),
        text: "hello".into(),
    });

    let sent = bridge.drain_all();
    assert!(sent[0].is_empty(), "origin must not receive its own line");
    assert_eq!(sent[1], vec![say("(neta:b\x1F\x1Fob) hello")]);
    assert_eq!(sent[2], vec![say("(neta:b\x1F\x1Fob) hello")]);
}

#[test]
fn kick_on_b_is_announced_on_a_and_c() {
    let mut bridge = Bridge::new();
    bridge.feed(1, Event::Kicked {
        channel: "#relay".into(),
        nick: "eve".into(),
        by: "mod".into(),
        reason: Some("spam".into()),
    });

    let sent = bridge.drain_all();
    let expected = vec![say("netb:m\x1F\x1Fod has kicked e\x1F\x1Fve (spam)")];
    assert_eq!(sent[0], expected);
    assert!(sent[1].is_empty());
    assert_eq!(sent[2], expected);
}

#[test]
fn quit_without_reason_omits_the_parenthetical() {
    let mut bridge = Bridge::new();
    bridge.feed(2, Event::UserQuit {
        nick: "zed".into(),
        reason: None,
    });

    let sent = bridge.drain_all();
    assert_eq!(sent[0], vec![say("netc:z\x1F\x1Fed has quit")]);
    assert_eq!(sent[1], vec![say("netc:z\x1F\x1Fed has quit")]);
    assert!(sent[2].is_empty());
}

#[test]
fn every_event_fans_out_to_exactly_the_other_networks() {
    let events = [
        Event::Message { from: "u".into(), target: "#relay".into(), text: "t".into() },
        Event::Action { from: "u".into(), target: "#relay".into(), text: "t".into() },
        Event::Joined { channel: "#relay".into(), nick: "u".into() },
        Event::Parted { channel: "#relay".into(), nick: "u".into(), reason: Some("r".into()) },
        Event::Kicked { channel: "#relay".into(), nick: "v".into(), by: "u".into(), reason: None },
        Event::UserQuit { nick: "u".into(), reason: Some("r".into()) },
        Event::NickChanged { old_nick: "u".into(), new_nick: "w".into() },
    ];

    for origin in 0..3 {
        for event in &events {
            let mut bridge = Bridge::new();
            bridge.feed(origin, event.clone());
            let sent = bridge.drain_all();
            for (index, commands) in sent.iter().enumerate() {
                let expected = if index == origin { 0 } else { 1 };
                assert_eq!(commands.len(), expected, "origin {origin}, peer {index}, {event:?}");
            }
        }
    }
}

#[test]
fn own_join_produces_no_traffic() {
    let mut bridge = Bridge::new();
    bridge.feed(0, Event::Registered { nick: "bridge".into() });
    bridge.feed(0, Event::Joined {
        channel: "#relay".into(),
        nick: "bridge".into(),
    });
    assert!(bridge.drain_all().iter().all(Vec::is_empty));

    bridge.feed(0, Event::Joined {
        channel: "#relay".into(),
        nick: "alice".into(),
    });
    let sent = bridge.drain_all();
    assert_eq!(sent[1], vec![say("neta:a\x1F\x1Flice has joined")]);
    assert_eq!(sent[2], vec![say("neta:a\x1F\x1Flice has joined")]);
}

#[test]
fn relayed_nicks_undecorate_to_the_plain_nick() {
    let mut bridge = Bridge::new();
    bridge.feed(0, Event::NickChanged {
        old_nick: "carol".into(),
        new_nick: "caroline".into(),
    });
    let Command::Privmsg { text, .. } = &bridge.drain(1)[0] else {
        panic!("expected a PRIVMSG");
    };
    let (_, nicks) = text.split_once(':').unwrap();
    let (old, new) = nicks.split_once(" is now known as ").unwrap();
    assert_eq!(format::undecorate(old), "carol");
    assert_eq!(format::undecorate(new), "caroline");
}
