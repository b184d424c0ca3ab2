//! Bipartite place/transition graph of a net, for visualization.
//!
//! The graph is only a view: places and transitions become nodes, every
//! non-zero incidence entry becomes a weighted arc. `tpn show --dot` renders
//! it through `petgraph::dot`.

use std::fmt;

use petgraph::stable_graph::StableGraph;

use super::NetConfig;

/// A node of the topology view.
#[derive(Clone, PartialEq, Eq)]
pub enum NetNode {
    /// Place with its initial token count.
    Place { name: super::Symbol, tokens: i64 },
    /// Transition with its dwell time in milliseconds.
    Transition { name: super::Symbol, dwell_ms: u128 },
}

impl fmt::Debug for NetNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetNode::Place { name, tokens } => write!(f, "{} ({})", name, tokens),
            NetNode::Transition { name, dwell_ms: 0 } => write!(f, "{}", name),
            NetNode::Transition { name, dwell_ms } => write!(f, "{} [{} ms]", name, dwell_ms),
        }
    }
}

pub type NetGraph = StableGraph<NetNode, i64>;

/// Build the bipartite topology graph of a configuration.
pub fn topology_graph(config: &NetConfig) -> NetGraph {
    let mut graph = NetGraph::with_capacity(
        config.places.len() + config.transitions.len(),
        config.places.len() * 2,
    );

    let place_nodes: Vec<_> = config
        .places
        .iter()
        .map(|place| {
            graph.add_node(NetNode::Place {
                name: place.name().clone(),
                tokens: place.initial_tokens(),
            })
        })
        .collect();

    let transition_nodes: Vec<_> = config
        .transitions
        .iter()
        .map(|transition| {
            graph.add_node(NetNode::Transition {
                name: transition.name().clone(),
                dwell_ms: transition.dwell().as_millis(),
            })
        })
        .collect();

    for (place, row) in config.input.iter().enumerate() {
        for (transition, &weight) in row.iter().enumerate() {
            if weight > 0 {
                graph.add_edge(place_nodes[place], transition_nodes[transition], weight);
            }
        }
    }
    for (place, row) in config.output.iter().enumerate() {
        for (transition, &weight) in row.iter().enumerate() {
            if weight > 0 {
                graph.add_edge(transition_nodes[transition], place_nodes[place], weight);
            }
        }
    }

    graph
}
