use std::time::Duration;

/// Chain manager configuration parameters.
///
/// This includes both protocol-level knobs (batch policy, signature
/// requirements) and integration flags (anchoring, peer finality).
#[derive(Clone, Debug)]
pub struct ManagerConfig {
    /// Create a block as soon as this many judgments are pending.
    pub batch_size: usize,
    /// Create a block when this much time passes with a non-empty
    /// pending queue.
    pub batch_timeout: Duration,
    /// Reject foreign blocks that carry no signature.
    pub require_signatures: bool,
    /// Run full validation on `receive_block`. Disabling this is only
    /// sensible on trusted internal replication paths.
    pub verify_received_blocks: bool,
    /// Hand successfully written self-blocks to the anchor queue.
    pub auto_anchor: bool,
    /// Whether a peer network provides finality callbacks. When set,
    /// anchoring waits for finalization instead of firing immediately.
    pub p2p_enabled: bool,
    /// Peer node endpoint; opaque to the core, surfaced only in status
    /// reporting.
    pub p2p_node_url: Option<String>,
    /// How long to wait for a finality callback before a waiter times
    /// out.
    pub finality_timeout: Duration,
    /// Legacy single-operator key (hex). When no registry is attached,
    /// blocks carry the first 16 characters of this key and no
    /// signature. Generated at construction when absent.
    pub legacy_operator_key: Option<String>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_timeout: Duration::from_secs(60),
            require_signatures: false,
            verify_received_blocks: true,
            auto_anchor: false,
            p2p_enabled: false,
            p2p_node_url: None,
            finality_timeout: Duration::from_secs(30),
            legacy_operator_key: None,
        }
    }
}
