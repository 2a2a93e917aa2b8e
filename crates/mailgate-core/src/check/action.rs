//! Fail action policy
//!
//! Stage functions are written as if every failure were a hard reject. The
//! configured [`FailAction`] decides what a diagnostic actually turns into.

use super::verdict::Verdict;
use std::fmt;
use std::str::FromStr;

/// What to do when a check reports a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailAction {
    /// Keep the diagnostic, the message is rejected
    Reject,
    /// Drop the diagnostic, mark the message for quarantine
    Quarantine,
    /// Drop the diagnostic, contribute the given weight to the spam score
    ScoreAdjust(i32),
    /// Drop everything
    Ignore,
}

impl FailAction {
    /// Turn a raw verdict into the effective one.
    ///
    /// Verdicts without a diagnostic pass through untouched, so soft signals
    /// (score, quarantine hint) survive every action.
    pub fn apply(self, verdict: Verdict) -> Verdict {
        if verdict.diagnostic.is_none() {
            return verdict;
        }

        match self {
            FailAction::Reject => verdict,
            FailAction::Quarantine => Verdict {
                diagnostic: None,
                quarantine: true,
                ..verdict
            },
            FailAction::ScoreAdjust(weight) => Verdict {
                diagnostic: None,
                score_adjust: weight,
                ..verdict
            },
            FailAction::Ignore => Verdict::neutral(),
        }
    }

    /// Parse the `fail_action` directive value.
    ///
    /// Accepts a string token (`"score 5"`) or an array of tokens
    /// (`["score", 5]`).
    pub fn from_directive(value: &toml::Value) -> Result<Self, String> {
        match value {
            toml::Value::String(s) => s.parse(),
            toml::Value::Array(items) => {
                let tokens = items
                    .iter()
                    .map(|item| match item {
                        toml::Value::String(s) => Ok(s.clone()),
                        toml::Value::Integer(i) => Ok(i.to_string()),
                        other => Err(format!("unexpected {} in token list", other.type_str())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                tokens.join(" ").parse()
            }
            other => Err(format!("expected string, got {}", other.type_str())),
        }
    }
}

impl FromStr for FailAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut tokens = s.split_whitespace();
        let keyword = tokens
            .next()
            .ok_or_else(|| "empty fail action".to_string())?
            .to_ascii_lowercase();

        let action = match keyword.as_str() {
            "reject" => FailAction::Reject,
            "quarantine" => FailAction::Quarantine,
            "ignore" => FailAction::Ignore,
            "score" => {
                let weight = tokens
                    .next()
                    .ok_or_else(|| "score requires an integer weight".to_string())?;
                let weight = weight
                    .parse::<i32>()
                    .map_err(|_| format!("invalid score weight '{}'", weight))?;
                FailAction::ScoreAdjust(weight)
            }
            other => return Err(format!("unknown action '{}'", other)),
        };

        match tokens.next() {
            Some(extra) => Err(format!("unexpected argument '{}'", extra)),
            None => Ok(action),
        }
    }
}

impl fmt::Display for FailAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailAction::Reject => write!(f, "reject"),
            FailAction::Quarantine => write!(f, "quarantine"),
            FailAction::ScoreAdjust(weight) => write!(f, "score {}", weight),
            FailAction::Ignore => write!(f, "ignore"),
        }
    }
}
