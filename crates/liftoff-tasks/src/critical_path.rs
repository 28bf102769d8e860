//! Critical path calculation over the task DAG.
//!
//! The weight of a node is its own cost plus the heaviest weight among its
//! dependencies, i.e. the longest accumulated cost of any chain ending at
//! that node. Confined nodes whose weight equals the heaviest confined weight
//! are "critical blocking": the starter thread waits for exactly those.

use tracing::{debug, instrument};

use crate::dag::{TaskGraph, TaskNode};

/// Result of the longest-path analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CriticalPath {
    /// Critical-path weight per node index
    weights: Vec<u64>,
    /// Heaviest weight among confined nodes (0 without confined nodes)
    chain_length: u64,
    /// Critical blocking flag per node index
    blocking: Vec<bool>,
    /// Heaviest chain over all nodes, dependencies first
    longest_chain: Vec<usize>,
}

impl CriticalPath {
    /// Compute weights for every node. The graph must be acyclic.
    #[instrument(skip_all, fields(node_count = graph.len()))]
    pub fn compute<F>(graph: &TaskGraph, cost_of: F) -> Self
    where
        F: Fn(&TaskNode) -> u64,
    {
        // Dependencies come first in topological order, so each weight only
        // reads weights that are already final.
        let mut weights = vec![0u64; graph.len()];
        for idx in graph.topological_order() {
            let node = graph.node(idx);
            let heaviest_dep = node
                .dependencies()
                .iter()
                .map(|&dep| weights[dep])
                .max()
                .unwrap_or(0);
            weights[idx] = cost_of(node).saturating_add(heaviest_dep);
        }

        let chain_length = graph
            .nodes()
            .iter()
            .enumerate()
            .filter(|(_, node)| node.task().is_confined())
            .map(|(idx, _)| weights[idx])
            .max()
            .unwrap_or(0);

        let blocking: Vec<bool> = graph
            .nodes()
            .iter()
            .enumerate()
            .map(|(idx, node)| node.task().is_confined() && weights[idx] == chain_length)
            .collect();

        let longest_chain = trace_chain(graph, &weights);

        debug!(
            chain_length,
            critical_blocking = blocking.iter().filter(|b| **b).count(),
            "critical path computed"
        );

        Self {
            weights,
            chain_length,
            blocking,
            longest_chain,
        }
    }

    /// Weight of the node at `idx`
    pub fn weight(&self, idx: usize) -> u64 {
        self.weights[idx]
    }

    /// All weights by node index
    pub fn weights(&self) -> &[u64] {
        &self.weights
    }

    /// Heaviest weight among confined nodes
    pub fn chain_length(&self) -> u64 {
        self.chain_length
    }

    /// Whether the node at `idx` is critical blocking
    pub fn is_critical_blocking(&self, idx: usize) -> bool {
        self.blocking[idx]
    }

    /// Indices of all critical blocking nodes
    pub fn critical_blocking(&self) -> impl Iterator<Item = usize> + '_ {
        self.blocking
            .iter()
            .enumerate()
            .filter(|(_, b)| **b)
            .map(|(idx, _)| idx)
    }

    /// The heaviest dependency chain in the graph, dependencies first
    pub fn longest_chain(&self) -> &[usize] {
        &self.longest_chain
    }
}

/// Walk back from the heaviest node through its heaviest dependencies.
fn trace_chain(graph: &TaskGraph, weights: &[u64]) -> Vec<usize> {
    let Some(mut current) = heaviest(0..graph.len(), weights) else {
        return Vec::new();
    };

    let mut chain = vec![current];
    while let Some(next) = heaviest(graph.node(current).dependencies().iter().copied(), weights) {
        chain.push(next);
        current = next;
    }

    chain.reverse();
    chain
}

/// Index with the largest weight; the first one wins ties.
fn heaviest(indices: impl Iterator<Item = usize>, weights: &[u64]) -> Option<usize> {
    indices.fold(None, |best, idx| match best {
        Some(b) if weights[b] >= weights[idx] => Some(b),
        _ => Some(idx),
    })
}
