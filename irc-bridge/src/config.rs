//! Bridge configuration.
//!
//! Read once at startup from `config.toml` in the working directory:
//!
//! ```toml
//! nickname = "bridge"
//! ident = "bridge"
//! realname = "IRC relay bridge"
//!
//! [[servers]]
//! address = "irc.example.net"
//! port = 6697
//! secure = true
//! identifier = "exa"
//! modes = "+B"
//! channels = ["#lobby"]
//! ```

use std::collections::HashSet;
use std::path::Path;

use bridge_sdk::client::ConnectConfig;
use serde::Deserialize;

use crate::error::ConfigError;

/// Where the binary looks for its configuration.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Global identity plus one entry per bridged network.
#[derive(Debug, Clone, Deserialize)]
pub struct BridgeConfig {
    /// Nickname used on every network.
    pub nickname: String,
    /// Username (ident).
    pub ident: String,
    /// Real name.
    pub realname: String,
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
}

/// One network the bridge connects to.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    /// Use TLS.
    #[serde(default)]
    pub secure: bool,
    /// Skip TLS certificate verification (for self-signed certs).
    #[serde(default)]
    pub insecure: bool,
    /// Prefix shown on every line relayed from this network.
    pub identifier: String,
    /// User modes set on ourselves after registration, e.g. `+B`.
    #[serde(default)]
    pub modes: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

impl ServerConfig {
    /// `address:port`, bracketing IPv6 literals.
    pub fn server_addr(&self) -> String {
        if self.address.contains(':') && !self.address.starts_with('[') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl BridgeConfig {
    /// Read, parse and validate the config file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    /// Parse and validate TOML text.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the relay relies on: a usable nickname, at
    /// least one server, and unique non-empty identifiers.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nickname.trim().is_empty() {
            return Err(ConfigError::EmptyNickname);
        }
        if self.servers.is_empty() {
            return Err(ConfigError::NoServers);
        }
        let mut seen = HashSet::new();
        for server in &self.servers {
            if server.identifier.trim().is_empty() {
                return Err(ConfigError::EmptyIdentifier(server.server_addr()));
            }
            if !seen.insert(server.identifier.as_str()) {
                return Err(ConfigError::DuplicateIdentifier(server.identifier.clone()));
            }
        }
        Ok(())
    }

    /// Connection parameters for one server.
    pub fn connect_config(&self, server: &ServerConfig) -> ConnectConfig {
        ConnectConfig {
            server_addr: server.server_addr(),
            nick: self.nickname.clone(),
            user: self.ident.clone(),
            realname: self.realname.clone(),
            tls: server.secure,
            tls_insecure: server.insecure,
            channels: server.channels.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r##"
nickname = "bridge"
ident = "relay"
realname = "IRC relay bridge"

[[servers]]
address = "irc.one.example"
port = 6697
secure = true
identifier = "one"
modes = "+B"
channels = ["#lobby", "#dev"]

[[servers]]
address = "irc.two.example"
port = 6667
identifier = "two"
channels = ["#lobby"]
"##;

    #[test]
    fn parses_servers_with_defaults() {
        let config = BridgeConfig::parse(SAMPLE).unwrap();
        assert_eq!(config.nickname, "bridge");
        assert_eq!(config.servers.len(), 2);

        let one = &config.servers[0];
        assert!(one.secure);
        assert_eq!(one.modes, "+B");
        assert_eq!(one.channels, vec!["#lobby", "#dev"]);

        let two = &config.servers[1];
        assert!(!two.secure);
        assert!(!two.insecure);
        assert_eq!(two.modes, "");
        assert_eq!(two.server_addr(), "irc.two.example:6667");
    }

    #[test]
    fn connect_config_combines_global_and_server() {
        let config = BridgeConfig::parse(SAMPLE).unwrap();
        let connect = config.connect_config(&config.servers[0]);
        assert_eq!(connect.server_addr, "irc.one.example:6697");
        assert_eq!(connect.nick, "bridge");
        assert_eq!(connect.user, "relay");
        assert_eq!(connect.realname, "IRC relay bridge");
        assert!(connect.tls);
        assert!(!connect.tls_insecure);
        assert_eq!(connect.channels, vec!["#lobby", "#dev"]);
    }

    #[test]
    fn ipv6_addresses_are_bracketed() {
        let server = ServerConfig {
            address: "2001:db8::1".into(),
            port: 6667,
            secure: false,
            insecure: false,
            identifier: "v6".into(),
            modes: String::new(),
            channels: Vec::new(),
        };
        assert_eq!(server.server_addr(), "[2001:db8::1]:6667");
    }

    #[test]
    fn rejects_duplicate_identifiers() {
        let raw = SAMPLE.replace("identifier = \"two\"", "identifier = \"one\"");
        match BridgeConfig::parse(&raw) {
            Err(ConfigError::DuplicateIdentifier(id)) => assert_eq!(id, "one"),
            other => panic!("expected duplicate identifier, got {other:?}"),
        }
    }

    #[test]
    fn rejects_empty_identifier_and_nickname() {
        let raw = SAMPLE.replace("identifier = \"two\"", "identifier = \" \"");
        assert!(matches!(
            BridgeConfig::parse(&raw),
            Err(ConfigError::EmptyIdentifier(addr)) if addr == "irc.two.example:6667"
        ));

        let raw = SAMPLE.replace("nickname = \"bridge\"", "nickname = \"\"");
        assert!(matches!(BridgeConfig::parse(&raw), Err(ConfigError::EmptyNickname)));
    }

    #[test]
    fn rejects_missing_servers_and_fields() {
        let raw = "nickname = \"b\"\nident = \"b\"\nrealname = \"b\"\n";
        assert!(matches!(BridgeConfig::parse(raw), Err(ConfigError::NoServers)));

        let raw = "nickname = \"b\"\n";
        assert!(matches!(BridgeConfig::parse(raw), Err(ConfigError::Toml(_))));
    }

    #[test]
    fn load_reads_file_and_reports_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, SAMPLE).unwrap();
        let config = BridgeConfig::load(&path).unwrap();
        assert_eq!(config.servers[1].identifier, "two");

        let missing = dir.path().join("nope.toml");
        let err = BridgeConfig::load(&missing).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
        assert!(err.to_string().contains("nope.toml"));
    }
}
