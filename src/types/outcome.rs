//! Terminal task outcomes and their severity lattice.
//!
//! Every completed task carries exactly one [`Outcome`]. Outcomes form a
//! total severity order `Ok < Err < Cancelled < Panicked`; aggregation
//! (task into region, sibling into sibling) is the lattice join.

use core::fmt;
use serde::{Deserialize, Serialize};

/// The terminal classification of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Completed successfully.
    Ok,
    /// Completed with an error the task itself reported.
    Err,
    /// Completed under a cancellation in force.
    Cancelled,
    /// The poll function panicked.
    Panicked,
}

impl Outcome {
    /// Returns the severity ordinal (0 for `Ok` through 3 for `Panicked`).
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            Self::Ok => 0,
            Self::Err => 1,
            Self::Cancelled => 2,
            Self::Panicked => 3,
        }
    }

    /// Joins two outcomes, keeping the more severe; left-biased on ties.
    #[must_use]
    pub const fn join(self, other: Self) -> Self {
        if other.severity() > self.severity() {
            other
        } else {
            self
        }
    }

    /// Joins optional operands; a missing operand is the `Ok` identity.
    #[must_use]
    pub fn join_opt(a: Option<Self>, b: Option<Self>) -> Self {
        a.unwrap_or(Self::Ok).join(b.unwrap_or(Self::Ok))
    }

    /// Returns the lowercase name of this outcome.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Err => "err",
            Self::Cancelled => "cancelled",
            Self::Panicked => "panicked",
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [Outcome; 4] = [
        Outcome::Ok,
        Outcome::Err,
        Outcome::Cancelled,
        Outcome::Panicked,
    ];

    #[test]
    fn severity_is_strictly_increasing() {
        for pair in ALL.windows(2) {
            assert!(pair[0].severity() < pair[1].severity());
        }
    }

    #[test]
    fn join_is_max_severity() {
        assert_eq!(Outcome::Ok.join(Outcome::Err), Outcome::Err);
        assert_eq!(Outcome::Cancelled.join(Outcome::Err), Outcome::Cancelled);
        assert_eq!(Outcome::Panicked.join(Outcome::Cancelled), Outcome::Panicked);
    }

    #[test]
    fn join_commutes_in_severity_and_is_idempotent() {
        for a in ALL {
            assert_eq!(a.join(a), a);
            for b in ALL {
                assert_eq!(a.join(b).severity(), b.join(a).severity());
            }
        }
    }

    #[test]
    fn ok_is_identity_and_panicked_absorbs() {
        for a in ALL {
            assert_eq!(Outcome::Ok.join(a), a);
            assert_eq!(a.join(Outcome::Ok), a);
            assert_eq!(a.join(Outcome::Panicked), Outcome::Panicked);
        }
    }

    #[test]
    fn null_operands_are_ok_identity() {
        assert_eq!(Outcome::join_opt(None, None), Outcome::Ok);
        assert_eq!(Outcome::join_opt(Some(Outcome::Err), None), Outcome::Err);
        assert_eq!(
            Outcome::join_opt(None, Some(Outcome::Cancelled)),
            Outcome::Cancelled
        );
    }

    #[test]
    fn lowercase_names() {
        assert_eq!(Outcome::Cancelled.to_string(), "cancelled");
        assert_eq!(Outcome::Panicked.as_str(), "panicked");
    }
}
