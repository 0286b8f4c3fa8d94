//! Line classification.
//!
//! An ordered table of independent rules. Every rule sees every line, so one
//! line can yield several observations (e.g. a failure marker and a counter).

use regex::Regex;
use tracing::warn;

use crate::source::DecodedLine;

/// Literal that marks a failed test on the target.
pub const FAILURE_MARKER: &str = "FAILED";

/// A fact derived from one line of target output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The line reports a failure.
    FailureMarker,
    /// Latest single-bit ECC error count.
    SingleBitCount(u64),
    /// Latest double-bit ECC error count.
    DoubleBitCount(u64),
    /// The rule did not apply.
    NoMatch,
}

/// How a rule turns a line into an observation.
#[derive(Debug, Clone)]
enum Matcher {
    /// Fires when the line contains the literal.
    Contains(&'static str),
    /// Captures a decimal count and wraps it.
    Count(Regex, fn(u64) -> Observation),
}

/// One named classification rule.
#[derive(Debug, Clone)]
pub struct Rule {
    name: &'static str,
    matcher: Matcher,
}

impl Rule {
    /// Rule name, used in diagnostics.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Evaluate this rule alone against `text`.
    pub fn evaluate(&self, text: &str) -> Observation {
        match &self.matcher {
            Matcher::Contains(literal) => {
                if text.contains(literal) {
                    Observation::FailureMarker
                } else {
                    Observation::NoMatch
                }
            }
            Matcher::Count(pattern, wrap) => {
                let Some(digits) = pattern.captures(text).and_then(|c| c.get(1)) else {
                    return Observation::NoMatch;
                };
                match digits.as_str().parse::<u64>() {
                    Ok(n) => wrap(n),
                    Err(e) => {
                        warn!(
                            rule = self.name,
                            digits = digits.as_str(),
                            error = %e,
                            "counter value out of range"
                        );
                        Observation::NoMatch
                    }
                }
            }
        }
    }
}

/// Stateless classifier holding the rule table.
#[derive(Debug, Clone)]
pub struct Classifier {
    rules: Vec<Rule>,
}

impl Classifier {
    /// Build the classifier with the standard rules.
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
        }
    }

    /// The rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Run every rule over `line`, returning the observations that matched
    /// in rule order.
    pub fn classify(&self, line: &DecodedLine) -> Vec<Observation> {
        self.rules
            .iter()
            .map(|rule| rule.evaluate(line.as_str()))
            .filter(|obs| *obs != Observation::NoMatch)
            .collect()
    }
}

impl Default for Classifier {
    fn default() -> Self {
        Self::new()
    }
}

fn default_rules() -> Vec<Rule> {
    let counters: [(&'static str, &str, fn(u64) -> Observation); 2] = [
        (
            "single_bit_errors",
            r"Single Bit Errors: (\d+)",
            Observation::SingleBitCount,
        ),
        (
            "double_bit_errors",
            r"Double Bit Errors: (\d+)",
            Observation::DoubleBitCount,
        ),
    ];

    let mut rules = vec![Rule {
        name: "failure_marker",
        matcher: Matcher::Contains(FAILURE_MARKER),
    }];

    rules.extend(counters.into_iter().filter_map(|(name, pattern, wrap)| {
        Regex::new(pattern).ok().map(|regex| Rule {
            name,
            matcher: Matcher::Count(regex, wrap),
        })
    }));

    rules
}
