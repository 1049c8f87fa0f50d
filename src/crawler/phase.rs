//! Crawl loop state machine
//!
//! The loop cycles Scrolling → Discovering → Filtering → Dispatching → Idle
//! and back, with ShuttingDown as the sole terminal state reached on
//! interrupt or fatal fault.

use std::fmt;

/// State of the crawl loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlPhase {
    /// Scrolling the primary session and waiting for content to render
    Scrolling,

    /// Querying the DOM for item links
    Discovering,

    /// Checking discovered identifiers against the index and artifacts
    Filtering,

    /// Submitting fetch jobs to the worker pool
    Dispatching,

    /// Backoff and authentication re-check before the next pass
    Idle,

    /// Terminal: releasing sessions and stopping the pool
    ShuttingDown,
}

impl CrawlPhase {
    /// The phase a normal pass transitions to next
    pub fn next(self) -> CrawlPhase {
        match self {
            Self::Scrolling => Self::Discovering,
            Self::Discovering => Self::Filtering,
            Self::Filtering => Self::Dispatching,
            Self::Dispatching => Self::Idle,
            Self::Idle => Self::Scrolling,
            Self::ShuttingDown => Self::ShuttingDown,
        }
    }

    /// True for the terminal state
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShuttingDown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scrolling => "scrolling",
            Self::Discovering => "discovering",
            Self::Filtering => "filtering",
            Self::Dispatching => "dispatching",
            Self::Idle => "idle",
            Self::ShuttingDown => "shutting_down",
        }
    }
}

impl fmt::Display for CrawlPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_cycles_back_to_scrolling() {
        let mut phase = CrawlPhase::Scrolling;
        for expected in [
            CrawlPhase::Discovering,
            CrawlPhase::Filtering,
            CrawlPhase::Dispatching,
            CrawlPhase::Idle,
            CrawlPhase::Scrolling,
        ] {
            phase = phase.next();
            assert_eq!(phase, expected);
        }
    }

    #[test]
    fn test_shutting_down_is_terminal() {
        assert!(CrawlPhase::ShuttingDown.is_terminal());
        assert_eq!(CrawlPhase::ShuttingDown.next(), CrawlPhase::ShuttingDown);

        assert!(!CrawlPhase::Scrolling.is_terminal());
        assert!(!CrawlPhase::Idle.is_terminal());
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CrawlPhase::Scrolling), "scrolling");
        assert_eq!(format!("{}", CrawlPhase::ShuttingDown), "shutting_down");
    }
}
