use std::fmt;

/// Represent the ICE candidate pair state.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CandidatePairState {
    #[default]
    Unspecified = 0,

    /// A check could be performed but another pair of the same foundation
    /// must complete first.
    Frozen = 1,

    /// A check has not been performed for this pair.
    Waiting = 2,

    /// A check has been sent for this pair, but the transaction is in progress.
    InProgress = 3,

    /// A check for this pair was already done and failed, either never producing any response
    /// or producing an unrecoverable failure response.
    Failed = 4,

    /// A check for this pair was already done and produced a successful result.
    Succeeded = 5,
}

impl fmt::Display for CandidatePairState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            Self::Frozen => "frozen",
            Self::Waiting => "waiting",
            Self::InProgress => "in-progress",
            Self::Failed => "failed",
            Self::Succeeded => "succeeded",
            Self::Unspecified => "unspecified",
        };

        write!(f, "{s}")
    }
}

/// Represents a combination of a local and remote candidate, identified by
/// their indices into the agent's candidate lists.
#[derive(Clone, Copy)]
pub struct CandidatePair {
    pub local: usize,
    pub remote: usize,
    pub local_priority: u32,
    pub remote_priority: u32,
    pub(crate) ice_role_controlling: bool,
    pub(crate) binding_request_count: u16,
    pub(crate) state: CandidatePairState,
    pub(crate) nominated: bool,
}

impl fmt::Debug for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prio {} (local, prio {}) {} <-> {} (remote, prio {})",
            self.priority(),
            self.local_priority,
            self.local,
            self.remote,
            self.remote_priority,
        )
    }
}

impl fmt::Display for CandidatePair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prio {} (local, prio {}) {} <-> {} (remote, prio {})",
            self.priority(),
            self.local_priority,
            self.local,
            self.remote,
            self.remote_priority,
        )
    }
}

impl PartialEq for CandidatePair {
    fn eq(&self, other: &Self) -> bool {
        self.local == other.local && self.remote == other.remote
    }
}

impl CandidatePair {
    #[must_use]
    pub fn new(
        local: usize,
        remote: usize,
        local_priority: u32,
        remote_priority: u32,
        ice_role_controlling: bool,
    ) -> Self {
        Self {
            local,
            remote,
            local_priority,
            remote_priority,
            ice_role_controlling,
            state: CandidatePairState::Waiting,
            binding_request_count: 0,
            nominated: false,
        }
    }

    /// RFC 8445 Section 6.1.2.3: Computing Pair Priority and Ordering Pairs.
    /// Let G be the priority for the candidate provided by the controlling
    /// agent and D the priority provided by the controlled agent:
    /// pair priority = 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
    pub fn priority(&self) -> u64 {
        let (g, d) = if self.ice_role_controlling {
            (self.local_priority, self.remote_priority)
        } else {
            (self.remote_priority, self.local_priority)
        };

        (1u64 << 32) * u64::from(std::cmp::min(g, d))
            + 2 * u64::from(std::cmp::max(g, d))
            + u64::from(g > d)
    }

    pub fn state(&self) -> CandidatePairState {
        self.state
    }

    pub fn nominated(&self) -> bool {
        self.nominated
    }
}

#[cfg(test)]
mod candidate_pair_test {
    use super::*;

    fn pair(g: u32, d: u32) -> CandidatePair {
        CandidatePair::new(0, 0, g, d, true)
    }

    #[test]
    fn test_pair_priority_symmetry() {
        // both agents must compute the same pair priority
        let controlling = CandidatePair::new(0, 0, 100, 200, true);
        let controlled = CandidatePair::new(0, 0, 200, 100, false);
        assert_eq!(controlling.priority(), controlled.priority());
    }

    #[test]
    fn test_pair_priority_value() {
        // 2^32*MIN(G,D) + 2*MAX(G,D) + (G>D?1:0)
        assert_eq!(pair(100, 300).priority(), (1u64 << 32) * 100 + 2 * 300);
        assert_eq!(pair(300, 100).priority(), (1u64 << 32) * 100 + 2 * 300 + 1);
        assert_eq!(pair(300, 300).priority(), (1u64 << 32) * 300 + 2 * 300);

        // a higher-priority candidate pair must order first
        assert!(pair(300, 300).priority() > pair(100, 300).priority());
    }

    #[test]
    fn test_initial_state() {
        let p = pair(1, 1);
        assert_eq!(p.state(), CandidatePairState::Waiting);
        assert!(!p.nominated());
    }
}
