use std::env;

/// The cluster's ordered, immutable list of storage node names.
///
/// Segment number `i` (1-indexed) is permanently bound to `nodes[i - 1]`. This
/// ordering is a global invariant shared by every node in the cluster and must
/// never be reshuffled without a full restart (see spec §3, §9).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topology {
    nodes: Vec<String>,
    this_node: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum TopologyError {
    #[error("{0} is not set")]
    MissingVar(&'static str),
    #[error("{0} lists no node names")]
    EmptyNodeList(&'static str),
    #[error("this node ({this_node:?}) does not appear in {var}")]
    SelfNotInList { var: &'static str, this_node: String },
}

impl Topology {
    /// Build a topology from an explicit node list, with no opinion about which
    /// node (if any) this process is.
    pub fn new(nodes: Vec<String>) -> Self {
        Self {
            nodes,
            this_node: None,
        }
    }

    /// Load the topology from the environment, per spec §6:
    /// `NIMBUSIO_NODE_NAME_SEQ` is a whitespace-separated ordered list of all N
    /// node names; `NIMBUSIO_NODE_NAME` names this process's own node.
    pub fn from_env() -> Result<Self, TopologyError> {
        let node_seq = env::var("NIMBUSIO_NODE_NAME_SEQ")
            .map_err(|_| TopologyError::MissingVar("NIMBUSIO_NODE_NAME_SEQ"))?;
        let nodes: Vec<String> = node_seq.split_whitespace().map(str::to_owned).collect();
        if nodes.is_empty() {
            return Err(TopologyError::EmptyNodeList("NIMBUSIO_NODE_NAME_SEQ"));
        }

        let this_node = env::var("NIMBUSIO_NODE_NAME")
            .map_err(|_| TopologyError::MissingVar("NIMBUSIO_NODE_NAME"))?;
        if !nodes.iter().any(|n| n == &this_node) {
            return Err(TopologyError::SelfNotInList {
                var: "NIMBUSIO_NODE_NAME_SEQ",
                this_node,
            });
        }

        Ok(Self {
            nodes,
            this_node: Some(this_node),
        })
    }

    /// Total number of storage nodes, `N`.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Node names in their fixed, segment-numbering order.
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// This process's own node name, if the topology was loaded for a node
    /// (rather than the gateway's cluster-wide view).
    pub fn this_node(&self) -> Option<&str> {
        self.this_node.as_deref()
    }

    /// The node name bound to 1-indexed `segment_num`.
    ///
    /// Panics if `segment_num` is outside `[1, node_count()]`: callers must only
    /// ever construct segment numbers from `1..=node_count()`.
    pub fn node_for_segment(&self, segment_num: u32) -> &str {
        &self.nodes[segment_num as usize - 1]
    }

    /// The 1-indexed segment number permanently bound to `node_name`, if present.
    pub fn segment_for_node(&self, node_name: &str) -> Option<u32> {
        self.nodes
            .iter()
            .position(|n| n == node_name)
            .map(|idx| idx as u32 + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_numbering_matches_node_order() {
        let topo = Topology::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(topo.node_for_segment(1), "a");
        assert_eq!(topo.node_for_segment(3), "c");
        assert_eq!(topo.segment_for_node("b"), Some(2));
        assert_eq!(topo.segment_for_node("missing"), None);
    }
}
