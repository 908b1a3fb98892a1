// Node configuration

use crate::consensus::ConservationRule;
use std::net::SocketAddr;
use std::time::Duration;

/// Port a node listens on unless told otherwise
pub const DEFAULT_PORT: u16 = 42069;

/// Settle delay before configured peers are dialed
pub const DEFAULT_DIAL_DELAY: Duration = Duration::from_secs(2);

/// Node configuration
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Address the peer listener binds
    pub listen_addr: SocketAddr,
    /// Address sent to peers in hello; the bound address when unset
    pub advertised_addr: Option<String>,
    /// Display name used in logs
    pub name: String,
    /// Peers (`host:port`) dialed once at startup
    pub peers: Vec<String>,
    pub dial_delay: Duration,
    /// Coinbase receiver for mined blocks
    pub miner_address: Option<String>,
    /// Start continuous mining at startup
    pub mine: bool,
    pub conservation_rule: ConservationRule,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            advertised_addr: None,
            name: "node".to_string(),
            peers: Vec::new(),
            dial_delay: DEFAULT_DIAL_DELAY,
            miner_address: None,
            mine: false,
            conservation_rule: ConservationRule::default(),
        }
    }
}

impl NodeConfig {
    /// Loopback configuration on an ephemeral port with no dial delay
    pub fn local() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            dial_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Split a comma separated peer list, ignoring blanks and a `ws://` scheme
    pub fn parse_peer_list(list: &str) -> Vec<String> {
        list.split(',')
            .map(str::trim)
            .map(|peer| peer.strip_prefix("ws://").unwrap_or(peer))
            .filter(|peer| !peer.is_empty())
            .map(str::to_string)
            .collect()
    }
}
