//! Check verdicts
//!
//! A [`Verdict`] is what a single stage of a single check reports about a
//! message. Stage functions build raw verdicts; the fail-action policy turns
//! them into effective verdicts the pipeline acts on.

use std::fmt;

/// SMTP reply a check wants the message rejected with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// Basic SMTP reply code (e.g. 550)
    pub code: u16,
    /// Enhanced status code (RFC 3463), e.g. `[5, 7, 1]`
    pub enhanced_code: [u8; 3],
    /// Human-readable reason
    pub message: String,
}

impl Diagnostic {
    /// Permanent policy failure (`550 5.7.0`)
    pub fn new(message: impl Into<String>) -> Self {
        Self::permanent(550, [5, 7, 0], message)
    }

    /// Permanent failure with explicit codes
    pub fn permanent(code: u16, enhanced_code: [u8; 3], message: impl Into<String>) -> Self {
        Self {
            code,
            enhanced_code,
            message: message.into(),
        }
    }

    /// Temporary failure (`451 4.7.0`), e.g. after a DNS error
    pub fn temporary(message: impl Into<String>) -> Self {
        Self {
            code: 451,
            enhanced_code: [4, 7, 0],
            message: message.into(),
        }
    }

    pub fn is_temporary(&self) -> bool {
        (400..500).contains(&self.code)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [class, subject, detail] = self.enhanced_code;
        write!(
            f,
            "{} {}.{}.{} {}",
            self.code, class, subject, detail, self.message
        )
    }
}

impl From<&str> for Diagnostic {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for Diagnostic {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

/// Outcome of one check stage.
///
/// The default value is the neutral verdict: no diagnostic, no score
/// contribution, no quarantine hint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[must_use]
pub struct Verdict {
    /// Present when the check wants the message blocked
    pub diagnostic: Option<Diagnostic>,
    /// Spam score contribution, independent of blocking
    pub score_adjust: i32,
    /// Soft advisory to quarantine the message
    pub quarantine: bool,
}

impl Verdict {
    /// The "no opinion" verdict
    pub fn neutral() -> Self {
        Self::default()
    }

    /// A blocking verdict carrying `diagnostic`
    pub fn reject(diagnostic: impl Into<Diagnostic>) -> Self {
        Self {
            diagnostic: Some(diagnostic.into()),
            ..Self::default()
        }
    }

    /// A soft score contribution without blocking
    pub fn score(delta: i32) -> Self {
        Self {
            score_adjust: delta,
            ..Self::default()
        }
    }

    /// A quarantine hint without blocking
    pub fn quarantine() -> Self {
        Self {
            quarantine: true,
            ..Self::default()
        }
    }

    /// Add a score contribution
    pub fn with_score(mut self, delta: i32) -> Self {
        self.score_adjust = delta;
        self
    }

    /// Returns true if nothing is reported
    pub fn is_neutral(&self) -> bool {
        self.diagnostic.is_none() && self.score_adjust == 0 && !self.quarantine
    }

    /// Returns true if the verdict blocks the message
    pub fn is_reject(&self) -> bool {
        self.diagnostic.is_some()
    }
}
