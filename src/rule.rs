use std::fmt;

use crate::error::{Error, Result};
use crate::nexus::NexusValue;

/// An ordered permission path supplied at decision time, e.g. `node.add.foo`.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Perm(Vec<String>);

impl Perm {
    /// Builds a permission path from its segments.
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for Perm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl<S: Into<String>> From<Vec<S>> for Perm {
    fn from(value: Vec<S>) -> Self {
        Self(value.into_iter().map(Into::into).collect())
    }
}

impl<'a> From<&'a [&'a str]> for Perm {
    fn from(value: &'a [&'a str]) -> Self {
        Self(value.iter().map(|s| (*s).to_string()).collect())
    }
}

/// A single authorization rule: `allow` when `path` is a prefix of the
/// queried permission.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Rule {
    pub allow: bool,
    pub path: Vec<String>,
}

impl Rule {
    /// Creates a rule. `path` must not be empty; callers that need to
    /// build rules from untrusted input should validate this themselves,
    /// the original makes the same assumption (`assert len(rule) == 2`
    /// only checks shape, not path emptiness).
    pub fn new(allow: bool, path: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            allow,
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// True when this rule's path is a prefix of `perm` (equal length counts).
    pub fn matches(&self, perm: &Perm) -> bool {
        let perm = perm.segments();
        if self.path.len() > perm.len() {
            return false;
        }
        self.path.as_slice() == &perm[..self.path.len()]
    }
}

/// Scans `rules` in order and returns the `allow` flag of the first match.
pub(crate) fn first_match(rules: &[Rule], perm: &Perm) -> Option<bool> {
    rules.iter().find(|rule| rule.matches(perm)).map(|r| r.allow)
}

/// Serializes a single rule as an `[allow, [segments]]` pair.
pub(crate) fn rule_to_nexus(rule: &Rule) -> NexusValue {
    NexusValue::List(vec![
        NexusValue::Bool(rule.allow),
        NexusValue::List(rule.path.iter().map(|s| NexusValue::Str(s.clone())).collect()),
    ])
}

pub(crate) fn rule_from_nexus(value: &NexusValue) -> Result<Rule> {
    let pair = value
        .as_list()
        .ok_or_else(|| Error::NoSuchImpl("expected an [allow, path] pair".into()))?;
    let allow = pair
        .first()
        .and_then(NexusValue::as_bool)
        .ok_or_else(|| Error::NoSuchImpl("expected rule allow flag".into()))?;
    let path = pair
        .get(1)
        .and_then(NexusValue::as_list)
        .ok_or_else(|| Error::NoSuchImpl("expected rule path".into()))?
        .iter()
        .map(|segment| {
            segment
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::NoSuchImpl("expected rule path segment".into()))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Rule::new(allow, path))
}

/// Serializes a rule list as an array of `[allow, [segments]]` pairs, per
/// the event payload contract (§6).
pub(crate) fn rules_to_nexus(rules: &[Rule]) -> NexusValue {
    NexusValue::List(rules.iter().map(rule_to_nexus).collect())
}

pub(crate) fn rules_from_nexus(value: &NexusValue) -> Result<Vec<Rule>> {
    let items = value
        .as_list()
        .ok_or_else(|| Error::NoSuchImpl("expected a rule list".into()))?;
    items.iter().map(rule_from_nexus).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_of_equal_length_matches() {
        let rule = Rule::new(true, ["node", "add"]);
        let perm = Perm::new(["node", "add"]);
        assert!(rule.matches(&perm));
    }

    #[test]
    fn prefix_of_shorter_path_matches_longer_perm() {
        let rule = Rule::new(true, ["node", "add"]);
        let perm = Perm::new(["node", "add", "foo"]);
        assert!(rule.matches(&perm));
    }

    #[test]
    fn longer_path_than_perm_does_not_match() {
        let rule = Rule::new(true, ["node", "add", "foo"]);
        let perm = Perm::new(["node", "add"]);
        assert!(!rule.matches(&perm));
    }

    #[test]
    fn unrelated_path_does_not_match() {
        let rule = Rule::new(false, ["node", "del"]);
        let perm = Perm::new(["node", "add"]);
        assert!(!rule.matches(&perm));
    }

    #[test]
    fn first_match_wins_in_order() {
        let rules = vec![
            Rule::new(true, ["node"]),
            Rule::new(false, ["node", "del"]),
        ];
        let perm = Perm::new(["node", "del"]);
        assert_eq!(first_match(&rules, &perm), Some(true));
    }

    #[test]
    fn rules_round_trip_through_nexus_values() {
        let rules = vec![Rule::new(true, ["node", "add"]), Rule::new(false, ["node", "del"])];
        let encoded = rules_to_nexus(&rules);
        let decoded = rules_from_nexus(&encoded).unwrap();
        assert_eq!(decoded, rules);
    }
}
