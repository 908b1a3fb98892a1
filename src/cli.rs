// CLI arguments

use crate::config::{DEFAULT_PORT, NodeConfig};
use crate::consensus::ConservationRule;
use clap::Parser;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "pow-ledger-node")]
#[command(about = "Proof-of-work UTXO ledger node with peer gossip", long_about = None)]
pub struct Cli {
    /// Port to listen on for peers
    #[arg(short, long, env = "SERVER_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Interface to bind
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    pub bind: IpAddr,

    /// Display name used in logs
    #[arg(short, long, env = "NODE_NAME", default_value = "node")]
    pub name: String,

    /// Comma separated peers to dial at startup (host:port)
    #[arg(long, env = "PEER_ADDRESSES", default_value = "")]
    pub peers: String,

    /// Address announced to peers (defaults to the bound address)
    #[arg(long, env = "ADVERTISED_ADDRESS")]
    pub advertised_address: Option<String>,

    /// Mine continuously from startup
    #[arg(long, env = "IS_MINER")]
    pub miner: bool,

    /// Address (hex public key) receiving block rewards
    #[arg(long, env = "MINER_ADDRESS")]
    pub miner_address: Option<String>,

    /// Value conservation rule for transactions: exact or covering
    #[arg(long, default_value_t = ConservationRule::Exact)]
    pub conservation: ConservationRule,

    /// Settle delay before dialing peers, in milliseconds
    #[arg(long, default_value_t = 2000)]
    pub dial_delay_ms: u64,
}

impl Cli {
    /// Turn parsed arguments into a node configuration
    pub fn into_config(self) -> Result<NodeConfig, String> {
        if self.miner && self.miner_address.is_none() {
            return Err("--miner requires --miner-address (or MINER_ADDRESS)".to_string());
        }

        Ok(NodeConfig {
            listen_addr: SocketAddr::new(self.bind, self.port),
            advertised_addr: self.advertised_address,
            name: self.name,
            peers: NodeConfig::parse_peer_list(&self.peers),
            dial_delay: Duration::from_millis(self.dial_delay_ms),
            miner_address: self.miner_address,
            mine: self.miner,
            conservation_rule: self.conservation,
        })
    }
}
