//! Discovery scheduling — the searching/waiting rhythm shared by
//! browse-based backends.

use std::time::Duration;

/// Phase of a discovery cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    /// An active browse window is open.
    Searching,
    /// Browsing is stopped until the next window.
    Waiting,
}

/// Alternates a discovery loop between short active-search windows and a
/// long idle wait.
///
/// A cycle runs `bursts` consecutive search windows, then one wait, then
/// repeats. Backends open a fresh browse for each search window and tear
/// it down when the cycle hands back [`ScanPhase::Waiting`].
#[derive(Debug, Clone)]
pub struct ScanCycle {
    search: Duration,
    wait: Duration,
    bursts: u32,
    searched: u32,
}

impl ScanCycle {
    /// Strict alternation: one search window, one wait.
    #[must_use]
    pub fn new(search: Duration, wait: Duration) -> Self {
        Self::with_bursts(search, wait, 1)
    }

    /// Run `bursts` consecutive search windows before each wait. A zero
    /// burst count is treated as one.
    #[must_use]
    pub fn with_bursts(search: Duration, wait: Duration, bursts: u32) -> Self {
        Self {
            search,
            wait,
            bursts: bursts.max(1),
            searched: 0,
        }
    }

    /// The phase to execute next and how long it lasts.
    pub fn advance(&mut self) -> (ScanPhase, Duration) {
        if self.searched < self.bursts {
            self.searched += 1;
            (ScanPhase::Searching, self.search)
        } else {
            self.searched = 0;
            (ScanPhase::Waiting, self.wait)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn phases(cycle: &mut ScanCycle, count: usize) -> Vec<ScanPhase> {
        (0..count).map(|_| cycle.advance().0).collect()
    }

    #[test]
    fn should_alternate_search_and_wait() {
        let mut cycle = ScanCycle::new(Duration::from_secs(5), Duration::from_secs(120));
        assert_eq!(
            phases(&mut cycle, 4),
            vec![
                ScanPhase::Searching,
                ScanPhase::Waiting,
                ScanPhase::Searching,
                ScanPhase::Waiting,
            ]
        );
    }

    #[test]
    fn should_burst_before_first_wait() {
        let mut cycle =
            ScanCycle::with_bursts(Duration::from_secs(10), Duration::from_secs(30), 3);
        assert_eq!(
            phases(&mut cycle, 5),
            vec![
                ScanPhase::Searching,
                ScanPhase::Searching,
                ScanPhase::Searching,
                ScanPhase::Waiting,
                ScanPhase::Searching,
            ]
        );
    }

    #[test]
    fn should_return_configured_durations() {
        let mut cycle = ScanCycle::new(Duration::from_secs(5), Duration::from_secs(120));
        assert_eq!(
            cycle.advance(),
            (ScanPhase::Searching, Duration::from_secs(5))
        );
        assert_eq!(
            cycle.advance(),
            (ScanPhase::Waiting, Duration::from_secs(120))
        );
    }

    #[test]
    fn should_treat_zero_bursts_as_one() {
        let mut cycle = ScanCycle::with_bursts(Duration::from_secs(1), Duration::from_secs(2), 0);
        assert_eq!(
            phases(&mut cycle, 2),
            vec![ScanPhase::Searching, ScanPhase::Waiting]
        );
    }
}
