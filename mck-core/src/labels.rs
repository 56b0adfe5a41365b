//! Label selector parsing and the reserved `cluster` term
use crate::{identity::CLUSTER_LABEL, Error, Result};
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    iter::FromIterator,
    str::FromStr,
};

// local type aliases
type Map = BTreeMap<String, String>;
type Expressions = Vec<Expression>;

/// A selector expression with existing operations
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Expression {
    /// `key in (a,b)`
    In(String, BTreeSet<String>),
    /// `key notin (a,b)`
    NotIn(String, BTreeSet<String>),
    /// `key=value` or `key==value`
    Equal(String, String),
    /// `key!=value`
    NotEqual(String, String),
    /// `key`
    Exists(String),
    /// `!key`
    DoesNotExist(String),
}

/// Perform selection on a list of expressions
#[derive(Clone, Debug, Eq, PartialEq, Default)]
pub struct Selector(Expressions);

impl Selector {
    /// Convert a selector to a string for the API
    pub fn to_selector_string(&self) -> String {
        let selectors: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        selectors.join(",")
    }

    /// Indicates whether this label selector matches everything
    pub fn selects_all(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether a label set satisfies every expression
    pub fn matches(&self, labels: &Map) -> bool {
        self.0.iter().all(|expr| expr.matches(labels))
    }

    /// Remove and return every expression on `key`
    pub fn take(&mut self, key: &str) -> Selector {
        let (taken, kept): (Expressions, Expressions) = std::mem::take(&mut self.0)
            .into_iter()
            .partition(|e| e.key() == key);
        self.0 = kept;
        Self(taken)
    }

    /// Values explicitly required by `=` and `in` terms, intersected
    ///
    /// `None` when no such term exists.
    pub fn required_values(&self) -> Option<BTreeSet<String>> {
        self.0
            .iter()
            .filter_map(|e| match e {
                Expression::Equal(_, v) => Some(BTreeSet::from([v.clone()])),
                Expression::In(_, vs) => Some(vs.clone()),
                _ => None,
            })
            .reduce(|acc, vs| acc.intersection(&vs).cloned().collect())
    }
}

impl FromStr for Selector {
    type Err = Error;

    /// Parse the comma-separated requirement grammar used by `labelSelector`
    fn from_str(s: &str) -> Result<Self> {
        split_requirements(s)?
            .into_iter()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(Expression::parse)
            .collect()
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_selector_string())
    }
}

// commas inside `in (..)` sets do not separate requirements
fn split_requirements(s: &str) -> Result<Vec<&str>> {
    let mut parts = vec![];
    let mut depth = 0usize;
    let mut start = 0;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| Error::Decode(format!("unbalanced parenthesis in selector {s:?}")))?
            }
            ',' if depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(Error::Decode(format!("unbalanced parenthesis in selector {s:?}")));
    }
    parts.push(&s[start..]);
    Ok(parts)
}

// === Expression ===

impl Expression {
    fn key(&self) -> &str {
        match self {
            Expression::In(key, _)
            | Expression::NotIn(key, _)
            | Expression::Equal(key, _)
            | Expression::NotEqual(key, _)
            | Expression::Exists(key)
            | Expression::DoesNotExist(key) => key,
        }
    }

    fn parse(requirement: &str) -> Result<Self> {
        let invalid = || Error::Decode(format!("invalid label selector requirement {requirement:?}"));

        if let Some(key) = requirement.strip_prefix('!') {
            let key = key.trim();
            return if key.is_empty() || key.contains(|c: char| c.is_whitespace() || "=!()".contains(c)) {
                Err(invalid())
            } else {
                Ok(Expression::DoesNotExist(key.to_string()))
            };
        }

        let end = requirement
            .find(|c: char| c.is_whitespace() || "=!(".contains(c))
            .unwrap_or(requirement.len());
        let (key, rest) = requirement.split_at(end);
        if key.is_empty() {
            return Err(invalid());
        }
        let key = key.to_string();
        let rest = rest.trim_start();

        if rest.is_empty() {
            Ok(Expression::Exists(key))
        } else if let Some(v) = rest.strip_prefix("==").or_else(|| rest.strip_prefix('=')) {
            Ok(Expression::Equal(key, v.trim().to_string()))
        } else if let Some(v) = rest.strip_prefix("!=") {
            Ok(Expression::NotEqual(key, v.trim().to_string()))
        } else if let Some(set) = rest.strip_prefix("notin") {
            Ok(Expression::NotIn(key, parse_set(set).ok_or_else(invalid)?))
        } else if let Some(set) = rest.strip_prefix("in") {
            Ok(Expression::In(key, parse_set(set).ok_or_else(invalid)?))
        } else {
            Err(invalid())
        }
    }

    fn matches(&self, labels: &Map) -> bool {
        match self {
            Expression::In(key, values) => match labels.get(key) {
                Some(v) => values.contains(v),
                None => false,
            },
            Expression::NotIn(key, values) => match labels.get(key) {
                Some(v) => !values.contains(v),
                None => true,
            },
            Expression::Exists(key) => labels.contains_key(key),
            Expression::DoesNotExist(key) => !labels.contains_key(key),
            Expression::Equal(key, value) => labels.get(key) == Some(value),
            Expression::NotEqual(key, value) => labels.get(key) != Some(value),
        }
    }
}

fn parse_set(s: &str) -> Option<BTreeSet<String>> {
    let inner = s.trim().strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(String::from)
            .collect(),
    )
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| values.iter().cloned().collect::<Vec<_>>().join(",");
        match self {
            Expression::In(key, values) => write!(f, "{key} in ({})", join(values)),
            Expression::NotIn(key, values) => write!(f, "{key} notin ({})", join(values)),
            Expression::Equal(key, value) => write!(f, "{key}={value}"),
            Expression::NotEqual(key, value) => write!(f, "{key}!={value}"),
            Expression::Exists(key) => write!(f, "{key}"),
            Expression::DoesNotExist(key) => write!(f, "!{key}"),
        }
    }
}

impl FromIterator<Expression> for Selector {
    fn from_iter<T: IntoIterator<Item = Expression>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

// === cluster addressing ===

/// The `cluster` terms of a label selector, split from the terms forwarded upstream
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClusterSelector(Selector);

impl ClusterSelector {
    /// Parse `selector`, returning the upstream remainder and the cluster terms
    ///
    /// The remainder is `None` when nothing is left to forward.
    pub fn split(selector: Option<&str>) -> Result<(Option<String>, Self)> {
        let mut parsed: Selector = match selector {
            Some(s) => s.parse()?,
            None => Selector::default(),
        };
        let clusters = parsed.take(CLUSTER_LABEL);
        let rest = (!parsed.selects_all()).then(|| parsed.to_selector_string());
        Ok((rest, Self(clusters)))
    }

    /// Whether no cluster term was given
    pub fn is_empty(&self) -> bool {
        self.0.selects_all()
    }

    /// Clusters named by `cluster=` or `cluster in (..)`, if any such term was given
    pub fn named(&self) -> Option<BTreeSet<String>> {
        self.0.required_values()
    }

    /// Whether `cluster` satisfies every cluster term
    pub fn admits(&self, cluster: &str) -> bool {
        self.0
            .matches(&Map::from([(CLUSTER_LABEL.to_string(), cluster.to_string())]))
    }

    /// The one cluster an operation that cannot span clusters is aimed at
    pub fn single(&self) -> Result<String> {
        match self.named() {
            Some(named) if named.len() == 1 => named
                .into_iter()
                .next()
                .filter(|c| self.admits(c))
                .ok_or(Error::MissingCluster(CLUSTER_LABEL)),
            _ => Err(Error::MissingCluster(CLUSTER_LABEL)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_operator() {
        let selector: Selector = "env=prod, tier==web,zone!=eu, app in (a, b),team notin (x),debug,!legacy"
            .parse()
            .unwrap();
        assert_eq!(
            selector,
            Selector::from_iter([
                Expression::Equal("env".into(), "prod".into()),
                Expression::Equal("tier".into(), "web".into()),
                Expression::NotEqual("zone".into(), "eu".into()),
                Expression::In("app".into(), ["a".to_string(), "b".to_string()].into()),
                Expression::NotIn("team".into(), ["x".to_string()].into()),
                Expression::Exists("debug".into()),
                Expression::DoesNotExist("legacy".into()),
            ])
        );
        assert_eq!(
            selector.to_selector_string(),
            "env=prod,tier=web,zone!=eu,app in (a,b),team notin (x),debug,!legacy"
        );
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["app in a,b", "=x", "app in (a", "a)", "app ~ b", "!"] {
            assert!(
                matches!(bad.parse::<Selector>(), Err(Error::Decode(_))),
                "{bad:?} should not parse"
            );
        }
        assert!("".parse::<Selector>().unwrap().selects_all());
    }

    #[test]
    fn matches_labels() {
        let labels: Map = [("foo".to_string(), "bar".to_string())].into();
        for (selector, matches, msg) in [
            ("", true, "empty match"),
            ("foo=bar", true, "exact label match"),
            ("foo in (bar,baz)", true, "set match"),
            ("foo notin (bar)", false, "excluded"),
            ("!foo", false, "exists"),
            ("bah", false, "missing key"),
        ] {
            let s: Selector = selector.parse().unwrap();
            assert_eq!(s.matches(&labels), matches, "{msg}");
        }
    }

    #[test]
    fn cluster_term_is_stripped_from_forwarded_selector() {
        let (rest, clusters) = ClusterSelector::split(Some("env=prod,cluster=a")).unwrap();
        assert_eq!(rest.as_deref(), Some("env=prod"));
        assert_eq!(clusters.single().unwrap(), "a");

        let (rest, clusters) = ClusterSelector::split(Some("cluster==b")).unwrap();
        assert_eq!(rest, None);
        assert_eq!(clusters.single().unwrap(), "b");

        let (rest, clusters) = ClusterSelector::split(None).unwrap();
        assert_eq!(rest, None);
        assert!(clusters.is_empty());
        assert!(clusters.admits("anything"));
    }

    #[test]
    fn cluster_sets_narrow_fan_out() {
        let (_, clusters) = ClusterSelector::split(Some("cluster in (a,b)")).unwrap();
        assert!(clusters.admits("a") && clusters.admits("b") && !clusters.admits("c"));
        assert_eq!(clusters.single(), Err(Error::MissingCluster("cluster")));

        let (_, clusters) = ClusterSelector::split(Some("cluster!=a")).unwrap();
        assert!(!clusters.admits("a") && clusters.admits("b"));
        assert_eq!(clusters.named(), None);
        assert_eq!(clusters.single(), Err(Error::MissingCluster("cluster")));

        let (_, clusters) = ClusterSelector::split(Some("cluster in (a,b),cluster=b")).unwrap();
        assert_eq!(clusters.single().unwrap(), "b");
    }
}
