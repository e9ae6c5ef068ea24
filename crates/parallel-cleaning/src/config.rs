//! Tunables for a cleaning pass.

use std::num::NonZeroUsize;

/// Default number of compiled units claimed per cursor advance.
pub const DEFAULT_CLAIM_BATCH_SIZE: usize = 16;

const DEFAULT_BATCH: NonZeroUsize = match NonZeroUsize::new(DEFAULT_CLAIM_BATCH_SIZE) {
    Some(n) => n,
    None => panic!("DEFAULT_CLAIM_BATCH_SIZE must be non-zero"),
};

/// Configuration for one parallel cleaning pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CleaningConfig {
    /// Number of workers that will call into the pass.
    /// Values below 1 are treated as 1.
    pub num_workers: u32,
    /// Upper bound on the compiled units one worker claims per cursor advance.
    /// Larger batches mean fewer CAS races but coarser load balancing.
    pub claim_batch_size: NonZeroUsize,
    /// Ask the deduplication table to resize at the start of the pass.
    pub resize_dedup_table: bool,
    /// Check exactly-once unloading after the pass. Costs one extra walk of
    /// the code cache at construction.
    pub verify_after_pass: bool,
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            num_workers: available_parallelism(),
            claim_batch_size: DEFAULT_BATCH,
            resize_dedup_table: false,
            verify_after_pass: cfg!(debug_assertions),
        }
    }
}

impl CleaningConfig {
    /// Create a new configuration for `num_workers` workers.
    #[must_use]
    pub fn new(num_workers: u32) -> Self {
        Self {
            num_workers: num_workers.max(1),
            ..Default::default()
        }
    }

    /// The number of workers actually used (at least 1).
    #[must_use]
    pub const fn effective_workers(&self) -> u32 {
        if self.num_workers < 1 {
            1
        } else {
            self.num_workers
        }
    }

    /// Set the number of workers.
    pub const fn set_num_workers(&mut self, workers: u32) {
        self.num_workers = if workers < 1 { 1 } else { workers };
    }

    /// Set the claim batch size.
    pub const fn set_claim_batch_size(&mut self, batch: NonZeroUsize) {
        self.claim_batch_size = batch;
    }

    /// Request or skip a dedup table resize.
    pub const fn set_resize_dedup_table(&mut self, resize: bool) {
        self.resize_dedup_table = resize;
    }

    /// Enable or disable post-pass verification.
    pub const fn set_verify_after_pass(&mut self, verify: bool) {
        self.verify_after_pass = verify;
    }
}

/// Get the number of CPUs available for cleaning workers.
#[must_use]
pub fn available_parallelism() -> u32 {
    std::thread::available_parallelism()
        .map_or(1, NonZeroUsize::get)
        .try_into()
        .unwrap_or(u32::MAX)
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use super::{CleaningConfig, DEFAULT_CLAIM_BATCH_SIZE};

    #[test]
    fn test_config_defaults() {
        let config = CleaningConfig::default();

        assert!(config.num_workers >= 1);
        assert_eq!(config.claim_batch_size.get(), DEFAULT_CLAIM_BATCH_SIZE);
        assert!(!config.resize_dedup_table);
        assert_eq!(config.verify_after_pass, cfg!(debug_assertions));
    }

    #[test]
    fn test_config_clamps_workers() {
        assert_eq!(CleaningConfig::new(0).effective_workers(), 1);

        let mut config = CleaningConfig::new(8);
        assert_eq!(config.effective_workers(), 8);

        config.set_num_workers(0);
        assert_eq!(config.num_workers, 1);

        config.num_workers = 0;
        assert_eq!(config.effective_workers(), 1);
    }

    #[test]
    fn test_config_setters() {
        let mut config = CleaningConfig::new(2);
        config.set_claim_batch_size(NonZeroUsize::new(4).unwrap());
        config.set_resize_dedup_table(true);
        config.set_verify_after_pass(true);

        assert_eq!(config.claim_batch_size.get(), 4);
        assert!(config.resize_dedup_table);
        assert!(config.verify_after_pass);
    }
}
