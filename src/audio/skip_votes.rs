use serenity::model::id::UserId;
use std::collections::HashSet;

pub const DEFAULT_SKIP_THRESHOLD: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The requester of the current track voted; skip right away
    ImmediateSkip,
    AlreadyVoted,
    /// Vote counted, threshold not reached yet
    Recorded(usize),
    ThresholdReached,
}

impl VoteOutcome {
    pub fn skips(self) -> bool {
        matches!(self, VoteOutcome::ImmediateSkip | VoteOutcome::ThresholdReached)
    }
}

/// Votes against the track that is currently playing.
#[derive(Debug, Clone)]
pub struct SkipVotes {
    voters: HashSet<UserId>,
    threshold: usize,
}

impl Default for SkipVotes {
    fn default() -> Self {
        Self::new(DEFAULT_SKIP_THRESHOLD)
    }
}

impl SkipVotes {
    pub fn new(threshold: usize) -> Self {
        Self {
            voters: HashSet::new(),
            threshold: threshold.max(1),
        }
    }

    /// Must run every time the current track changes.
    pub fn reset(&mut self) {
        self.voters.clear();
    }

    pub fn cast(&mut self, voter: UserId, requester: UserId) -> VoteOutcome {
        // El solicitante siempre puede saltar su propia canción
        if voter == requester {
            return VoteOutcome::ImmediateSkip;
        }

        if !self.voters.insert(voter) {
            return VoteOutcome::AlreadyVoted;
        }

        let count = self.voters.len();
        if count >= self.threshold {
            VoteOutcome::ThresholdReached
        } else {
            VoteOutcome::Recorded(count)
        }
    }

    pub fn count(&self) -> usize {
        self.voters.len()
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}
