//! Predicate-filtered decoding: typed patterns matched against decoded
//! records.
//!
//! A [`Pattern`] holds one parse of the user's pattern per value kind it
//! could mean; a record matches when any of its leaves matches any armed
//! slot. The runner layers match limits, before/after context, and count
//! mode on top of a stream of decoded records.

use std::collections::VecDeque;

use crate::error::AuError;
use crate::value::Value;

/// The atomic literals a pattern can match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomPattern {
    True,
    False,
    Null,
}

/// A string pattern: whole-string or substring match.
#[derive(Debug, Clone)]
pub struct StrPattern {
    pub pattern: String,
    /// `true` for whole-string equality, `false` for substring search.
    pub full_match: bool,
}

/// What to look for, and how to report it.
///
/// By default every slot the raw pattern parses as is armed; explicit type
/// flags arm exactly one. A slot that is `None` never matches.
#[derive(Debug, Clone, Default)]
pub struct Pattern {
    /// Restrict matching to values keyed by this object key, at any depth.
    pub key: Option<String>,
    pub str_pattern: Option<StrPattern>,
    pub int_pattern: Option<i64>,
    pub uint_pattern: Option<u64>,
    pub double_pattern: Option<f64>,
    pub atom_pattern: Option<AtomPattern>,
    /// Stop after this many matching records.
    pub max_matches: Option<u64>,
    /// Records of context to emit before each match.
    pub before_context: usize,
    /// Records of context to emit after each match.
    pub after_context: usize,
    /// Count matching records instead of emitting them.
    pub count_only: bool,
}

impl Pattern {
    /// Parse `raw` into whichever typed slots accept it, like the default
    /// (untyped) grep invocation does.
    pub fn parse_default(raw: &str) -> Self {
        Self {
            str_pattern: Some(StrPattern {
                pattern: raw.to_owned(),
                full_match: true,
            }),
            int_pattern: raw.parse().ok(),
            uint_pattern: raw.parse().ok(),
            double_pattern: raw.parse().ok(),
            atom_pattern: parse_atom(raw),
            ..Self::default()
        }
    }

    /// Whether `value` (a decoded record) matches this pattern.
    pub fn matches(&self, value: &Value) -> bool {
        match &self.key {
            None => self.any_leaf(value),
            Some(key) => self.matches_under_key(value, key.as_bytes()),
        }
    }

    fn any_leaf(&self, value: &Value) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|v| self.any_leaf(v)),
            Value::Object(entries) => entries.iter().any(|(_, v)| self.any_leaf(v)),
            leaf => self.matches_leaf(leaf),
        }
    }

    /// Search objects at any depth for `key`; only the value directly under
    /// a matching key is tested, and only if it is a scalar.
    fn matches_under_key(&self, value: &Value, key: &[u8]) -> bool {
        match value {
            Value::Array(items) => items.iter().any(|v| self.matches_under_key(v, key)),
            Value::Object(entries) => entries.iter().any(|(k, v)| {
                (k == key && self.matches_leaf(v)) || self.matches_under_key(v, key)
            }),
            _ => false,
        }
    }

    fn matches_leaf(&self, value: &Value) -> bool {
        match value {
            Value::Null => self.atom_pattern == Some(AtomPattern::Null),
            Value::Bool(true) => self.atom_pattern == Some(AtomPattern::True),
            Value::Bool(false) => self.atom_pattern == Some(AtomPattern::False),
            Value::Int(i) => {
                self.int_pattern == Some(*i)
                    || self.double_pattern == Some(*i as f64)
            }
            Value::Uint(u) => {
                self.uint_pattern == Some(*u)
                    || (i64::try_from(*u).is_ok() && self.int_pattern == Some(*u as i64))
                    || self.double_pattern == Some(*u as f64)
            }
            Value::Double(d) => self.double_pattern == Some(*d),
            Value::String(bytes) => match &self.str_pattern {
                Some(StrPattern {
                    pattern,
                    full_match,
                }) => {
                    if *full_match {
                        bytes.as_slice() == pattern.as_bytes()
                    } else {
                        contains(bytes, pattern.as_bytes())
                    }
                }
                None => false,
            },
            Value::Time(_) => false,
            Value::Array(_) | Value::Object(_) => false,
        }
    }
}

/// Parse `raw` as one of the atomic literals.
pub fn parse_atom(raw: &str) -> Option<AtomPattern> {
    match raw {
        "true" => Some(AtomPattern::True),
        "false" => Some(AtomPattern::False),
        "null" => Some(AtomPattern::Null),
        _ => None,
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    needle.is_empty()
        || haystack
            .windows(needle.len())
            .any(|window| window == needle)
}

/// Drives a pattern over a stream of decoded records, handling context
/// buffering, the match limit, and count mode.
pub struct GrepRunner<'p> {
    pattern: &'p Pattern,
    before: VecDeque<Value>,
    after_remaining: usize,
    matches: u64,
}

impl<'p> GrepRunner<'p> {
    pub fn new(pattern: &'p Pattern) -> Self {
        Self {
            pattern,
            before: VecDeque::new(),
            after_remaining: 0,
            matches: 0,
        }
    }

    /// Number of matching records seen so far.
    pub fn matches(&self) -> u64 {
        self.matches
    }

    /// Feed one decoded record. Matching records (and their context) are
    /// handed to `emit` unless the pattern is counting. Returns `false`
    /// once the match limit is reached and processing should stop.
    pub fn push<F>(&mut self, value: Value, emit: &mut F) -> Result<bool, AuError>
    where
        F: FnMut(&Value) -> Result<(), AuError> + ?Sized,
    {
        if self.pattern.matches(&value) {
            self.matches += 1;
            if !self.pattern.count_only {
                for pending in self.before.drain(..) {
                    emit(&pending)?;
                }
                emit(&value)?;
                self.after_remaining = self.pattern.after_context;
            }
            if let Some(limit) = self.pattern.max_matches {
                if self.matches >= limit {
                    return Ok(false);
                }
            }
        } else if !self.pattern.count_only {
            if self.after_remaining > 0 {
                emit(&value)?;
                self.after_remaining -= 1;
            } else if self.pattern.before_context > 0 {
                if self.before.len() == self.pattern.before_context {
                    self.before.pop_front();
                }
                self.before.push_back(value);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(i: u64, label: &str) -> Value {
        Value::Object(vec![
            (b"sequence".to_vec(), Value::Uint(i)),
            (b"label".to_vec(), Value::string(label)),
        ])
    }

    #[test]
    fn test_default_pattern_matches_several_types() {
        let pattern = Pattern::parse_default("42");
        assert!(pattern.matches(&Value::Uint(42)));
        assert!(pattern.matches(&Value::string("42")));
        assert!(pattern.matches(&Value::Double(42.0)));
        assert!(!pattern.matches(&Value::Uint(43)));

        let pattern = Pattern::parse_default("-7");
        assert!(pattern.matches(&Value::Int(-7)));
        assert!(!pattern.matches(&Value::Uint(7)));
    }

    #[test]
    fn test_atom_patterns() {
        let pattern = Pattern {
            atom_pattern: Some(AtomPattern::Null),
            ..Pattern::default()
        };
        assert!(pattern.matches(&Value::Null));
        assert!(!pattern.matches(&Value::Bool(false)));
    }

    #[test]
    fn test_substring_match() {
        let pattern = Pattern {
            str_pattern: Some(StrPattern {
                pattern: "err".into(),
                full_match: false,
            }),
            ..Pattern::default()
        };
        assert!(pattern.matches(&record(1, "an error happened")));
        assert!(!pattern.matches(&record(1, "all fine")));
    }

    #[test]
    fn test_key_restriction() {
        let pattern = Pattern {
            key: Some("sequence".into()),
            uint_pattern: Some(3),
            ..Pattern::default()
        };
        assert!(pattern.matches(&record(3, "x")));
        // The same number under a different key does not match.
        let other = Value::Object(vec![(b"other".to_vec(), Value::Uint(3))]);
        assert!(!pattern.matches(&other));
        // Nested objects are searched.
        let nested = Value::Object(vec![(b"outer".to_vec(), record(3, "x"))]);
        assert!(pattern.matches(&nested));
    }

    #[test]
    fn test_leaves_are_found_in_containers() {
        let pattern = Pattern::parse_default("needle string");
        let value = Value::Array(vec![
            Value::Uint(1),
            Value::Object(vec![(b"k".to_vec(), Value::string("needle string"))]),
        ]);
        assert!(pattern.matches(&value));
    }

    fn run(pattern: &Pattern, records: Vec<Value>) -> (u64, Vec<Value>) {
        let mut runner = GrepRunner::new(pattern);
        let mut emitted = Vec::new();
        for value in records {
            let keep_going = runner
                .push(value, &mut |v| {
                    emitted.push(v.clone());
                    Ok(())
                })
                .unwrap();
            if !keep_going {
                break;
            }
        }
        (runner.matches(), emitted)
    }

    #[test]
    fn test_runner_context() {
        let pattern = Pattern {
            uint_pattern: Some(5),
            key: Some("sequence".into()),
            before_context: 2,
            after_context: 1,
            ..Pattern::default()
        };
        let records: Vec<Value> = (0..10).map(|i| record(i, "x")).collect();
        let (matches, emitted) = run(&pattern, records);
        assert_eq!(matches, 1);
        // Records 3, 4 (before), 5 (the match), 6 (after).
        let sequences: Vec<u64> = emitted
            .iter()
            .map(|v| match v {
                Value::Object(entries) => match entries[0].1 {
                    Value::Uint(u) => u,
                    _ => panic!("unexpected value"),
                },
                _ => panic!("unexpected record"),
            })
            .collect();
        assert_eq!(sequences, [3, 4, 5, 6]);
    }

    #[test]
    fn test_runner_match_limit() {
        let pattern = Pattern {
            str_pattern: Some(StrPattern {
                pattern: "x".into(),
                full_match: true,
            }),
            key: Some("label".into()),
            max_matches: Some(3),
            ..Pattern::default()
        };
        let records: Vec<Value> = (0..10).map(|i| record(i, "x")).collect();
        let (matches, emitted) = run(&pattern, records);
        assert_eq!(matches, 3);
        assert_eq!(emitted.len(), 3);
    }

    #[test]
    fn test_runner_count_only_emits_nothing() {
        let pattern = Pattern {
            count_only: true,
            uint_pattern: Some(2),
            ..Pattern::default()
        };
        let records: Vec<Value> = (0..5).map(|i| record(i, "x")).collect();
        let (matches, emitted) = run(&pattern, records);
        assert_eq!(matches, 1);
        assert!(emitted.is_empty());
    }
}
