//! NUMA placement abstraction.
//!
//! Topology discovery and actual thread binding live outside the core;
//! the pool consumes a `ThreadBinder` that maps worker indices to nodes
//! and optionally pins the calling thread. Histories and network weights
//! are replicated per node, and each worker resolves its replica once at
//! spawn.

use std::fmt;
use std::sync::Arc;

/// Maps worker threads onto NUMA nodes. Implementations come from the
/// embedding layer (or tests); the default treats the machine as one node.
pub trait ThreadBinder: Send + Sync {
    /// Number of NUMA nodes the workers are spread over.
    fn node_count(&self) -> usize;

    /// Node of a given worker index.
    fn node_of(&self, thread_idx: usize) -> usize;

    /// Pin the calling thread to the node of `thread_idx`. The default
    /// implementation does nothing (no OS binding available).
    fn bind_current(&self, thread_idx: usize) {
        let _ = thread_idx;
    }
}

/// Everything on one node; binding is a no-op.
pub struct SingleNode;

impl ThreadBinder for SingleNode {
    fn node_count(&self) -> usize {
        1
    }

    fn node_of(&self, _thread_idx: usize) -> usize {
        0
    }
}

/// Spreads workers round-robin over a fixed node count without pinning.
/// Useful for exercising the replication paths.
pub struct RoundRobin {
    nodes: usize,
}

impl RoundRobin {
    #[must_use]
    pub fn new(nodes: usize) -> Self {
        RoundRobin {
            nodes: nodes.max(1),
        }
    }
}

impl ThreadBinder for RoundRobin {
    fn node_count(&self) -> usize {
        self.nodes
    }

    fn node_of(&self, thread_idx: usize) -> usize {
        thread_idx % self.nodes
    }
}

/// NUMA policy handed to the thread pool.
#[derive(Clone)]
pub struct NumaConfig {
    pub binder: Arc<dyn ThreadBinder>,
}

impl NumaConfig {
    #[must_use]
    pub fn new(binder: Arc<dyn ThreadBinder>) -> Self {
        NumaConfig { binder }
    }
}

impl Default for NumaConfig {
    fn default() -> Self {
        NumaConfig {
            binder: Arc::new(SingleNode),
        }
    }
}

impl fmt::Debug for NumaConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NumaConfig")
            .field("nodes", &self.binder.node_count())
            .finish()
    }
}
