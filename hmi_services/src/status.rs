//! Readiness flags and the rules that combine them.
//!
//! A flag is a named boolean owned by the consumer. A rule names the flags
//! it reads and how they combine; the state machine evaluates rules after
//! every flag change.

use std::collections::BTreeMap;
use std::fmt;

/// Named boolean readiness flags of one service.
///
/// Reading a flag that was never set yields `false`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReadinessFlags {
    values: BTreeMap<String, bool>,
}

impl ReadinessFlags {
    /// Create an empty flag set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value of `name`.
    pub fn get(&self, name: &str) -> bool {
        self.values.get(name).copied().unwrap_or(false)
    }

    /// Set `name` to `value`. Returns `true` if the value changed.
    pub fn set(&mut self, name: &str, value: bool) -> bool {
        match self.values.get_mut(name) {
            Some(current) if *current == value => false,
            Some(current) => {
                *current = value;
                true
            }
            None => {
                self.values.insert(name.to_string(), value);
                value
            }
        }
    }

    /// Declare `name` with `false` unless it already has a value.
    pub fn declare(&mut self, name: &str) {
        self.values.entry(name.to_string()).or_insert(false);
    }

    /// Whether `name` was declared or set.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// Iterate over `(name, value)` pairs in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, bool)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }
}

/// How the flags of a rule combine.
pub enum Combinator {
    /// Every flag is `true`.
    All,
    /// At least one flag is `true`.
    Any,
    /// Arbitrary predicate over the flag set.
    Custom(Box<dyn Fn(&ReadinessFlags) -> bool>),
}

impl fmt::Debug for Combinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => f.write_str("All"),
            Self::Any => f.write_str("Any"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Readiness rule: a set of flag names plus a combinator.
#[derive(Debug)]
pub struct Statuses {
    flags: Vec<String>,
    combinator: Combinator,
}

impl Statuses {
    /// Rule that holds when every named flag is `true`.
    pub fn all<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(flags, Combinator::All)
    }

    /// Rule that holds when any named flag is `true`.
    pub fn any<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(flags, Combinator::Any)
    }

    /// Rule evaluated by `predicate`. `flags` lists the flags it reads.
    pub fn custom<I, S, F>(flags: I, predicate: F) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: Fn(&ReadinessFlags) -> bool + 'static,
    {
        Self::new(flags, Combinator::Custom(Box::new(predicate)))
    }

    /// Rule with no flags. Only valid for the terminal state.
    pub fn none() -> Self {
        Self::new(Vec::<String>::new(), Combinator::All)
    }

    fn new<I, S>(flags: I, combinator: Combinator) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
            combinator,
        }
    }

    /// Flag names the rule reads.
    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    /// Whether the rule names no flag.
    pub fn is_empty(&self) -> bool {
        self.flags.is_empty()
    }

    /// Evaluate against `values`. An empty `All`/`Any` rule holds.
    pub fn holds(&self, values: &ReadinessFlags) -> bool {
        match &self.combinator {
            Combinator::All => self.flags.iter().all(|f| values.get(f)),
            Combinator::Any => self.is_empty() || self.flags.iter().any(|f| values.get(f)),
            Combinator::Custom(predicate) => predicate(values),
        }
    }
}
