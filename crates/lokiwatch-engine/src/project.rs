//! Project status derivation from member server statuses.

use std::fmt;

use lokiwatch_core::ServerStatus;

/// Member status tallies for one project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProjectStatusCounts {
    pub running: usize,
    pub stopped: usize,
    pub error: usize,
    pub unresponsive: usize,
}

impl ProjectStatusCounts {
    pub fn from_statuses<I>(statuses: I) -> Self
    where
        I: IntoIterator<Item = ServerStatus>,
    {
        statuses.into_iter().fold(Self::default(), |mut acc, status| {
            match status {
                ServerStatus::Running => acc.running += 1,
                ServerStatus::Stopped => acc.stopped += 1,
                ServerStatus::Error => acc.error += 1,
                ServerStatus::Unresponsive => acc.unresponsive += 1,
            }
            acc
        })
    }

    pub fn total(&self) -> usize {
        self.running + self.stopped + self.error + self.unresponsive
    }

    /// Priority rule: any Error wins, then any Running, then any Stopped,
    /// then Unresponsive when every member is. Anything else (no members)
    /// falls back to Running.
    pub fn derive(&self) -> ServerStatus {
        if self.error > 0 {
            ServerStatus::Error
        } else if self.running > 0 {
            ServerStatus::Running
        } else if self.stopped > 0 {
            ServerStatus::Stopped
        } else if self.total() > 0 && self.unresponsive == self.total() {
            ServerStatus::Unresponsive
        } else {
            ServerStatus::Running
        }
    }
}

impl fmt::Display for ProjectStatusCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Running={} Stopped={} Error={} Unresponsive={}",
            self.running, self.stopped, self.error, self.unresponsive
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ServerStatus::*;

    fn derive(statuses: &[ServerStatus]) -> ServerStatus {
        ProjectStatusCounts::from_statuses(statuses.iter().copied()).derive()
    }

    #[test]
    fn priority_rule() {
        assert_eq!(derive(&[Error, Running]), Error);
        assert_eq!(derive(&[Running, Stopped]), Running);
        assert_eq!(derive(&[Unresponsive, Unresponsive]), Unresponsive);
        assert_eq!(derive(&[Stopped, Stopped]), Stopped);
        assert_eq!(derive(&[Stopped, Unresponsive]), Stopped);
        assert_eq!(derive(&[Unresponsive, Error]), Error);
    }

    #[test]
    fn empty_project_falls_back_to_running() {
        assert_eq!(derive(&[]), Running);
    }

    #[test]
    fn order_independent() {
        let members = [Unresponsive, Stopped, Running, Error, Stopped];
        let expected = derive(&members);
        for rotation in 0..members.len() {
            let mut rotated = members;
            rotated.rotate_left(rotation);
            assert_eq!(derive(&rotated), expected);
            rotated.reverse();
            assert_eq!(derive(&rotated), expected);
        }
    }

    #[test]
    fn display_lists_counts() {
        let counts = ProjectStatusCounts::from_statuses([Running, Running, Error]);
        assert_eq!(counts.total(), 3);
        assert_eq!(counts.to_string(), "Running=2 Stopped=0 Error=1 Unresponsive=0");
    }
}
