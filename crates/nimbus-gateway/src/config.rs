use std::collections::HashMap;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use nimbus_erasure::Segmenter;
use nimbus_wire::Topology;

/// Gateway boot configuration, loaded from environment variables and CLI
/// flags (spec §10). Every field mirrors an `env =` binding so a deployment
/// can be driven entirely by environment, the way `crates/agent`'s `Args`
/// is.
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct Config {
    /// This process's own node name; must appear in `node-name-seq`.
    #[clap(long, env = "NIMBUSIO_NODE_NAME")]
    pub node_name: String,

    /// Whitespace-separated ordered list of every node name in the cluster.
    /// Position in this list fixes each node's segment number.
    #[clap(long, env = "NIMBUSIO_NODE_NAME_SEQ")]
    pub node_name_seq: String,

    /// Whitespace-separated `name=host:port` pairs, one per entry in
    /// `node-name-seq`.
    #[clap(long, env = "NIMBUSIO_NODE_ADDRESSES")]
    pub node_addresses: String,

    /// Request/reply round-trip deadline, in seconds.
    #[clap(long, env = "NIMBUSIO_REPLY_TIMEOUT", default_value = "300")]
    pub reply_timeout_secs: u64,

    /// Minimum data shards (`k`) required to reconstruct an object; total
    /// shards `n` is the node count.
    #[clap(long, env = "NIMBUSIO_MIN_SEGMENTS")]
    pub min_segments: usize,

    /// Address the HTTP surface binds to.
    #[clap(long, env = "NIMBUSIO_HTTP_BIND", default_value = "0.0.0.0:8090")]
    pub http_bind: String,

    /// How often the handoff beacon runs, in seconds.
    #[clap(long, env = "NIMBUSIO_HANDOFF_CADENCE", default_value = "300")]
    pub handoff_cadence_secs: u64,
}

impl Config {
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_secs(self.reply_timeout_secs)
    }

    pub fn handoff_cadence(&self) -> Duration {
        Duration::from_secs(self.handoff_cadence_secs)
    }

    /// Builds the cluster-wide topology from `node-name-seq`/`node-name`.
    /// Fails fast (per spec §6's "boot fails fast... topology is missing
    /// this node's own name or has fewer than `k` entries") rather than
    /// deferring the check to first use.
    pub fn topology(&self) -> anyhow::Result<Topology> {
        let nodes: Vec<String> = self.node_name_seq.split_whitespace().map(str::to_owned).collect();
        anyhow::ensure!(!nodes.is_empty(), "node-name-seq lists no node names");
        anyhow::ensure!(
            nodes.iter().any(|n| n == &self.node_name),
            "this node ({:?}) does not appear in node-name-seq",
            self.node_name
        );
        anyhow::ensure!(
            nodes.len() >= self.min_segments,
            "cluster has only {} nodes, fewer than the required min-segments ({})",
            nodes.len(),
            self.min_segments
        );
        anyhow::ensure!(
            self.min_segments >= 2,
            "min-segments ({}) must be at least 2: handoff always substitutes two distinct backups for an unreachable primary",
            self.min_segments
        );
        Ok(Topology::new(nodes))
    }

    /// Parses `node-addresses` into a `name -> host:port` map.
    pub fn node_address_map(&self) -> anyhow::Result<HashMap<String, String>> {
        self.node_addresses
            .split_whitespace()
            .map(|entry| {
                let (name, addr) = entry
                    .split_once('=')
                    .with_context(|| format!("malformed node address entry {entry:?}, expected name=host:port"))?;
                Ok((name.to_string(), addr.to_string()))
            })
            .collect()
    }

    pub fn segmenter(&self, node_count: usize) -> anyhow::Result<Segmenter> {
        Segmenter::new(self.min_segments, node_count).context("constructing erasure coder")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> Config {
        Config {
            node_name: "node-1".to_string(),
            node_name_seq: "node-1 node-2 node-3".to_string(),
            node_addresses: "node-1=127.0.0.1:9001 node-2=127.0.0.1:9002 node-3=127.0.0.1:9003".to_string(),
            reply_timeout_secs: 300,
            min_segments: 2,
            http_bind: "0.0.0.0:8090".to_string(),
            handoff_cadence_secs: 300,
        }
    }

    #[test]
    fn topology_rejects_self_not_in_node_seq() {
        let mut config = base_config();
        config.node_name = "not-there".to_string();
        assert!(config.topology().is_err());
    }

    #[test]
    fn topology_rejects_fewer_nodes_than_min_segments() {
        let mut config = base_config();
        config.min_segments = 10;
        assert!(config.topology().is_err());
    }

    #[test]
    fn topology_rejects_min_segments_below_two() {
        let mut config = base_config();
        config.min_segments = 1;
        assert!(config.topology().is_err());
    }

    #[test]
    fn node_address_map_parses_every_entry() {
        let config = base_config();
        let map = config.node_address_map().unwrap();
        assert_eq!(map.get("node-2").map(String::as_str), Some("127.0.0.1:9002"));
        assert_eq!(map.len(), 3);
    }
}
