//! Fault classification
//!
//! Every error raised during a crawl pass is classified before the loop
//! reacts: transient faults log and loop, authentication faults leave the
//! session degraded but alive, fatal faults trigger the shutdown path.

use crate::MagpieError;
use std::fmt;

/// How the crawl loop should react to an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    /// Stale element, timing race, single failed call: log and continue
    Transient,

    /// Login could not be re-established: continue degraded
    Auth,

    /// Setup or configuration failure: shut down
    Fatal,
}

impl fmt::Display for FaultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::Auth => "auth",
            Self::Fatal => "fatal",
        };
        write!(f, "{}", s)
    }
}

/// Classifies an error raised during a crawl pass
pub fn classify(error: &MagpieError) -> FaultKind {
    match error {
        MagpieError::Config(_) => FaultKind::Fatal,
        MagpieError::Session(_) => FaultKind::Auth,
        // Driver hiccups, index lookups, filesystem races: retry next pass.
        _ => FaultKind::Transient,
    }
}
