//! Node-level configuration consumed by the consensus core

use crate::params::Parameters;

// For explanation, see issue: https://github.com/serde-rs/serde/issues/368
fn default_k() -> usize {
    20
}
fn default_alpha() -> usize {
    14
}
fn default_beta1() -> u32 {
    15
}
fn default_beta2() -> u32 {
    20
}
fn default_concurrent_polls() -> usize {
    4
}
fn default_max_outstanding_items() -> usize {
    1024
}
fn default_max_item_processing_time_ms() -> u64 {
    30_000
}
fn default_max_outstanding_broadcast_requests() -> usize {
    50
}
fn default_retry_bootstrap() -> bool {
    true
}
fn default_retry_bootstrap_warn_frequency() -> u64 {
    50
}
fn default_startup_weight() -> u64 {
    1
}
fn default_compression_enabled() -> bool {
    true
}
fn default_max_message_size() -> usize {
    2 * 1024 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Validators sampled per poll.
    #[serde(default = "default_k")]
    pub k: usize,
    /// Distinct respondents required for a poll vote to count.
    #[serde(default = "default_alpha")]
    pub alpha: usize,
    /// Confidence threshold for virtuous transactions.
    #[serde(default = "default_beta1")]
    pub beta1: u32,
    /// Confidence threshold for rogue transactions.
    #[serde(default = "default_beta2")]
    pub beta2: u32,
    /// Polls allowed in flight at once.
    #[serde(default = "default_concurrent_polls")]
    pub concurrent_polls: usize,
    /// Health bound on the number of processing vertices.
    #[serde(default = "default_max_outstanding_items")]
    pub max_outstanding_items: usize,
    /// Health bound on the age of the oldest unresolved vertex.
    #[serde(default = "default_max_item_processing_time_ms")]
    pub max_item_processing_time_ms: u64,
    /// Per-phase cap on concurrent broadcast requests.
    #[serde(default = "default_max_outstanding_broadcast_requests")]
    pub max_outstanding_broadcast_requests: usize,
    /// Whether state sync and bootstrap restart on insufficient quorum.
    #[serde(default = "default_retry_bootstrap")]
    pub retry_bootstrap: bool,
    /// Attempts between connectivity warnings.
    #[serde(default = "default_retry_bootstrap_warn_frequency")]
    pub retry_bootstrap_warn_frequency: u64,
    /// Stake that must connect before the engines may start.
    #[serde(default = "default_startup_weight")]
    pub startup_weight: u64,
    /// Applies to opcodes marked compressible.
    #[serde(default = "default_compression_enabled")]
    pub compression_enabled: bool,
    /// Upper bound on a framed wire message.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            k: default_k(),
            alpha: default_alpha(),
            beta1: default_beta1(),
            beta2: default_beta2(),
            concurrent_polls: default_concurrent_polls(),
            max_outstanding_items: default_max_outstanding_items(),
            max_item_processing_time_ms: default_max_item_processing_time_ms(),
            max_outstanding_broadcast_requests: default_max_outstanding_broadcast_requests(),
            retry_bootstrap: default_retry_bootstrap(),
            retry_bootstrap_warn_frequency: default_retry_bootstrap_warn_frequency(),
            startup_weight: default_startup_weight(),
            compression_enabled: default_compression_enabled(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl Settings {
    /// The consensus parameter subset handed to the engines.
    pub fn parameters(&self) -> Parameters {
        Parameters {
            k: self.k,
            alpha: self.alpha,
            beta1: self.beta1,
            beta2: self.beta2,
            concurrent_polls: self.concurrent_polls,
        }
    }
}
