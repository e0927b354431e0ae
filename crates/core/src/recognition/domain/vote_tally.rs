use std::time::Duration;

use crate::shared::constants::UNKNOWN_LABEL;

/// Votes and accumulated raw confidence for one label.
#[derive(Clone, Debug, PartialEq)]
pub struct LabelVotes {
    pub label: String,
    pub votes: u32,
    pub confidence_sum: f64,
}

impl LabelVotes {
    pub fn average_confidence(&self) -> f64 {
        if self.votes == 0 {
            0.0
        } else {
            self.confidence_sum / self.votes as f64
        }
    }
}

/// Per-session accumulation of recognition votes.
///
/// Labels are kept in first-vote order. The majority is the label with the
/// most votes; on a tie the current majority keeps its place if it is among
/// the leaders, otherwise the earliest-voted leader wins.
#[derive(Clone, Debug, Default)]
pub struct VoteTally {
    entries: Vec<LabelVotes>,
    majority: Option<usize>,
    last_poll_at: Option<Duration>,
}

impl VoteTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, label: &str, raw_confidence: f64) {
        let idx = match self.entries.iter().position(|e| e.label == label) {
            Some(idx) => idx,
            None => {
                self.entries.push(LabelVotes {
                    label: label.to_string(),
                    votes: 0,
                    confidence_sum: 0.0,
                });
                self.entries.len() - 1
            }
        };
        self.entries[idx].votes += 1;
        self.entries[idx].confidence_sum += raw_confidence;
        self.majority = self.leading_index();
    }

    fn leading_index(&self) -> Option<usize> {
        let top = self.entries.iter().map(|e| e.votes).max()?;
        if let Some(current) = self.majority {
            if self.entries[current].votes == top {
                return Some(current);
            }
        }
        self.entries.iter().position(|e| e.votes == top)
    }

    /// Current majority label, or `"unknown"` before the first vote.
    pub fn majority(&self) -> &str {
        self.majority
            .map(|idx| self.entries[idx].label.as_str())
            .unwrap_or(UNKNOWN_LABEL)
    }

    pub fn majority_entry(&self) -> Option<&LabelVotes> {
        self.majority.map(|idx| &self.entries[idx])
    }

    pub fn votes(&self, label: &str) -> u32 {
        self.entry(label).map_or(0, |e| e.votes)
    }

    pub fn confidence_sum(&self, label: &str) -> f64 {
        self.entry(label).map_or(0.0, |e| e.confidence_sum)
    }

    pub fn total_votes(&self) -> u32 {
        self.entries.iter().map(|e| e.votes).sum()
    }

    pub fn entries(&self) -> &[LabelVotes] {
        &self.entries
    }

    pub fn last_poll_at(&self) -> Option<Duration> {
        self.last_poll_at
    }

    /// True when more than `interval` has passed since the last poll, or no
    /// poll has happened yet.
    pub fn is_due(&self, now: Duration, interval: Duration) -> bool {
        match self.last_poll_at {
            None => true,
            Some(last) => now.saturating_sub(last) > interval,
        }
    }

    pub fn mark_polled(&mut self, now: Duration) {
        self.last_poll_at = Some(now);
    }

    fn entry(&self, label: &str) -> Option<&LabelVotes> {
        self.entries.iter().find(|e| e.label == label)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tally_of(labels: &[&str]) -> VoteTally {
        let mut tally = VoteTally::new();
        for label in labels {
            tally.record(label, 10.0);
        }
        tally
    }

    #[test]
    fn test_empty_tally_is_unknown() {
        let tally = VoteTally::new();
        assert_eq!(tally.majority(), UNKNOWN_LABEL);
        assert_eq!(tally.total_votes(), 0);
        assert!(tally.majority_entry().is_none());
    }

    #[test]
    fn test_majority_follows_most_votes() {
        let tally = tally_of(&["alice", "unknown", "alice", "alice"]);
        assert_eq!(tally.majority(), "alice");
        assert_eq!(tally.votes("alice"), 3);
        assert_eq!(tally.votes("unknown"), 1);
        assert_eq!(tally.total_votes(), 4);
    }

    #[test]
    fn test_tie_keeps_previous_majority() {
        // bob leads 2-1, then alice catches up: bob keeps the lead.
        let tally = tally_of(&["bob", "alice", "bob", "alice"]);
        assert_eq!(tally.majority(), "bob");
    }

    #[test]
    fn test_tie_with_overtaken_majority_uses_insertion_order() {
        // carol leads, then alice and bob both pass her and tie.
        let tally = tally_of(&["carol", "alice", "bob", "alice", "bob"]);
        assert_eq!(tally.majority(), "alice");
    }

    #[test]
    fn test_first_vote_tie_goes_to_first_label() {
        let tally = tally_of(&["dave", "erin"]);
        assert_eq!(tally.majority(), "dave");
    }

    #[test]
    fn test_overtake_changes_majority() {
        let tally = tally_of(&["bob", "alice", "alice"]);
        assert_eq!(tally.majority(), "alice");
    }

    #[test]
    fn test_confidence_accumulates_per_label() {
        let mut tally = VoteTally::new();
        tally.record("alice", 40.0);
        tally.record("alice", 20.0);
        tally.record("unknown", 90.0);
        assert_relative_eq!(tally.confidence_sum("alice"), 60.0);
        assert_relative_eq!(tally.confidence_sum("unknown"), 90.0);
        assert_relative_eq!(tally.confidence_sum("nobody"), 0.0);
        assert_relative_eq!(tally.majority_entry().unwrap().average_confidence(), 30.0);
    }

    #[test]
    fn test_is_due_before_first_poll() {
        let tally = VoteTally::new();
        assert!(tally.is_due(Duration::ZERO, Duration::from_secs(1)));
    }

    #[test]
    fn test_is_due_requires_strictly_more_than_interval() {
        let mut tally = VoteTally::new();
        tally.mark_polled(Duration::from_secs(2));
        let interval = Duration::from_secs(1);
        assert!(!tally.is_due(Duration::from_millis(2500), interval));
        assert!(!tally.is_due(Duration::from_secs(3), interval));
        assert!(tally.is_due(Duration::from_millis(3001), interval));
    }
}
