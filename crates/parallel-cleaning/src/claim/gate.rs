//! Winner-take-all claim flag.

use std::sync::atomic::Ordering;

use crossbeam::utils::CachePadded;

use super::sync::AtomicBool;

/// An atomic exclusive-claim flag.
///
/// Starts unclaimed. Exactly one call to [`try_claim`](Self::try_claim)
/// succeeds over the lifetime of the gate, no matter how many threads race
/// for it. A gate is owned by one cleaning pass and dropped with it, so there
/// is no reset.
///
/// The flag lives on its own cache line: every worker of the pass polls it
/// once and we don't want those loads to bounce the line holding the batch
/// cursor.
#[derive(Debug, Default)]
pub struct SingleClaimGate {
    claimed: CachePadded<AtomicBool>,
}

impl SingleClaimGate {
    /// Create an unclaimed gate.
    #[cfg(not(loom))]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            claimed: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Create an unclaimed gate.
    #[cfg(loom)]
    #[must_use]
    pub fn new() -> Self {
        Self {
            claimed: CachePadded::new(AtomicBool::new(false)),
        }
    }

    /// Try to become the single owner of the work guarded by this gate.
    ///
    /// Returns `true` to exactly one caller. Losers return without retrying.
    pub fn try_claim(&self) -> bool {
        // Plain load first so late arrivals don't all issue a CAS.
        if self.claimed.load(Ordering::Acquire) {
            return false;
        }

        self.claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether some caller has already won the gate.
    #[must_use]
    pub fn is_claimed(&self) -> bool {
        self.claimed.load(Ordering::Acquire)
    }
}

#[cfg(all(test, not(loom)))]
mod tests {
    use super::SingleClaimGate;

    #[test]
    fn test_gate_starts_unclaimed() {
        let gate = SingleClaimGate::new();
        assert!(!gate.is_claimed());
    }

    #[test]
    fn test_gate_claims_once() {
        let gate = SingleClaimGate::new();

        assert!(gate.try_claim());
        assert!(gate.is_claimed());
        assert!(!gate.try_claim());
        assert!(!gate.try_claim());
    }

    #[test]
    fn test_gate_default_is_unclaimed() {
        let gate = SingleClaimGate::default();
        assert!(gate.try_claim());
    }
}
