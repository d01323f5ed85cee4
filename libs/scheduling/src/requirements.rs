//! Scheduling requirements and the value-set algebra behind them.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

/// Requirement operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    In,
    NotIn,
    Exists,
    DoesNotExist,
    Gt,
    Lt,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Operator::In => "In",
            Operator::NotIn => "NotIn",
            Operator::Exists => "Exists",
            Operator::DoesNotExist => "DoesNotExist",
            Operator::Gt => "Gt",
            Operator::Lt => "Lt",
        };
        f.write_str(s)
    }
}

/// A single `(key, operator, values, min_values)` constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requirement {
    pub key: String,
    pub operator: Operator,
    #[serde(default)]
    pub values: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_values: Option<usize>,
}

impl Requirement {
    pub fn new<I, S>(key: impl Into<String>, operator: Operator, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            key: key.into(),
            operator,
            values: values.into_iter().map(Into::into).collect(),
            min_values: None,
        }
    }

    pub fn in_values<I, S>(key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(key, Operator::In, values)
    }

    pub fn exists(key: impl Into<String>) -> Self {
        Self::new(key, Operator::Exists, Vec::<String>::new())
    }

    pub fn does_not_exist(key: impl Into<String>) -> Self {
        Self::new(key, Operator::DoesNotExist, Vec::<String>::new())
    }

    pub fn with_min_values(mut self, min_values: usize) -> Self {
        self.min_values = Some(min_values);
        self
    }

    /// Whether the constraint is satisfied by a label being absent.
    pub fn allows_absent(&self) -> bool {
        matches!(self.operator, Operator::NotIn | Operator::DoesNotExist)
    }

    pub(crate) fn value_set(&self) -> ValueSet {
        ValueSet::from_requirement(self)
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.key, self.operator)?;
        if !self.values.is_empty() {
            write!(f, " [{}]", self.values.join(","))?;
        }
        if let Some(min) = self.min_values {
            write!(f, " minValues={min}")?;
        }
        Ok(())
    }
}

/// The set of label values a requirement admits.
///
/// A finite set lists its members. A complement set admits everything except
/// its members. Integer bounds further restrict either form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ValueSet {
    values: BTreeSet<String>,
    complement: bool,
    greater_than: Option<i64>,
    less_than: Option<i64>,
}

impl ValueSet {
    fn finite(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            values: values.into_iter().collect(),
            complement: false,
            greater_than: None,
            less_than: None,
        }
    }

    fn everything_except(values: impl IntoIterator<Item = String>) -> Self {
        Self {
            complement: true,
            ..Self::finite(values)
        }
    }

    pub(crate) fn from_requirement(req: &Requirement) -> Self {
        let bound = || req.values.first().and_then(|v| v.parse::<i64>().ok());

        match req.operator {
            Operator::In => Self::finite(req.values.iter().cloned()),
            Operator::NotIn => Self::everything_except(req.values.iter().cloned()),
            Operator::Exists => Self::everything_except([]),
            Operator::DoesNotExist => Self::finite([]),
            // An unparsable bound admits nothing.
            Operator::Gt => match bound() {
                Some(n) => Self {
                    greater_than: Some(n),
                    ..Self::everything_except([])
                },
                None => Self::finite([]),
            },
            Operator::Lt => match bound() {
                Some(n) => Self {
                    less_than: Some(n),
                    ..Self::everything_except([])
                },
                None => Self::finite([]),
            },
        }
    }

    pub(crate) fn intersect(&self, other: &ValueSet) -> ValueSet {
        let greater_than = max_bound(self.greater_than, other.greater_than);
        let less_than = min_bound(self.less_than, other.less_than);

        let (values, complement) = match (self.complement, other.complement) {
            (true, true) => (self.values.union(&other.values).cloned().collect(), true),
            (true, false) => (other.values.difference(&self.values).cloned().collect(), false),
            (false, true) => (self.values.difference(&other.values).cloned().collect(), false),
            (false, false) => (self.values.intersection(&other.values).cloned().collect(), false),
        };

        let mut set = ValueSet {
            values,
            complement,
            greater_than,
            less_than,
        };
        if !set.complement {
            let (gt, lt) = (set.greater_than, set.less_than);
            set.values.retain(|v| within_bounds(v, gt, lt));
        }
        set
    }

    /// Number of admitted values; `usize::MAX` for an unbounded set.
    pub(crate) fn len(&self) -> usize {
        if !self.complement {
            return self.values.len();
        }
        match (self.greater_than, self.less_than) {
            (Some(gt), Some(lt)) => {
                let span = (lt as i128 - gt as i128 - 1).max(0);
                let excluded = self
                    .values
                    .iter()
                    .filter(|v| within_bounds(v, Some(gt), Some(lt)))
                    .count() as i128;
                usize::try_from(span - excluded).unwrap_or(usize::MAX)
            }
            _ => usize::MAX,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True for the set produced by `DoesNotExist`: nothing is admitted and
    /// no bound was involved.
    pub(crate) fn is_absent(&self) -> bool {
        !self.complement
            && self.values.is_empty()
            && self.greater_than.is_none()
            && self.less_than.is_none()
    }

    /// The only admitted value, when there is exactly one.
    pub(crate) fn single_value(&self) -> Option<&str> {
        if self.complement || self.values.len() != 1 {
            return None;
        }
        self.values.iter().next().map(String::as_str)
    }
}

fn max_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

fn min_bound(a: Option<i64>, b: Option<i64>) -> Option<i64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn within_bounds(value: &str, gt: Option<i64>, lt: Option<i64>) -> bool {
    if gt.is_none() && lt.is_none() {
        return true;
    }
    let Ok(n) = value.parse::<i64>() else {
        return false;
    };
    gt.is_none_or(|g| n > g) && lt.is_none_or(|l| n < l)
}

/// Requirements keyed by label.
///
/// Constraints inserted under the same key intersect: the key admits only
/// values every one of them admits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Requirement>", into = "Vec<Requirement>")]
pub struct Requirements {
    by_key: BTreeMap<String, Vec<Requirement>>,
}

impl Requirements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, requirement: Requirement) {
        self.by_key
            .entry(requirement.key.clone())
            .or_default()
            .push(requirement);
    }

    /// Builder-style insert.
    pub fn with(mut self, requirement: Requirement) -> Self {
        self.insert(requirement);
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn get(&self, key: &str) -> &[Requirement] {
        self.by_key.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.by_key.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Requirement> {
        self.by_key.values().flatten()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }

    /// The combined value set for `key`, if any constraint names it.
    pub(crate) fn value_set(&self, key: &str) -> Option<ValueSet> {
        let mut constraints = self.by_key.get(key)?.iter().map(Requirement::value_set);
        let first = constraints.next()?;
        Some(constraints.fold(first, |acc, set| acc.intersect(&set)))
    }

    /// Every key whose combined constraints admit exactly one value.
    pub fn single_valued_labels(&self) -> BTreeMap<String, String> {
        self.by_key
            .keys()
            .filter_map(|key| {
                let set = self.value_set(key)?;
                let value = set.single_value()?.to_string();
                Some((key.clone(), value))
            })
            .collect()
    }
}

impl FromIterator<Requirement> for Requirements {
    fn from_iter<I: IntoIterator<Item = Requirement>>(iter: I) -> Self {
        let mut requirements = Self::new();
        for requirement in iter {
            requirements.insert(requirement);
        }
        requirements
    }
}

impl From<Vec<Requirement>> for Requirements {
    fn from(list: Vec<Requirement>) -> Self {
        list.into_iter().collect()
    }
}

impl From<Requirements> for Vec<Requirement> {
    fn from(requirements: Requirements) -> Self {
        requirements.by_key.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn req(op: Operator, values: &[&str]) -> Requirement {
        Requirement::new("k", op, values.iter().copied())
    }

    #[rstest]
    #[case::in_in(req(Operator::In, &["a", "b"]), req(Operator::In, &["b", "c"]), 1)]
    #[case::in_disjoint(req(Operator::In, &["a"]), req(Operator::In, &["c"]), 0)]
    #[case::in_notin(req(Operator::In, &["a", "b"]), req(Operator::NotIn, &["a"]), 1)]
    #[case::in_exists(req(Operator::In, &["a", "b"]), req(Operator::Exists, &[]), 2)]
    #[case::in_absent(req(Operator::In, &["a"]), req(Operator::DoesNotExist, &[]), 0)]
    #[case::gt_in(req(Operator::Gt, &["4"]), req(Operator::In, &["2", "8", "16"]), 2)]
    #[case::gt_lt(req(Operator::Gt, &["1"]), req(Operator::Lt, &["5"]), 3)]
    #[case::gt_lt_empty(req(Operator::Gt, &["4"]), req(Operator::Lt, &["5"]), 0)]
    #[case::gt_non_numeric(req(Operator::Gt, &["4"]), req(Operator::In, &["large"]), 0)]
    #[case::gt_unparsable(req(Operator::Gt, &["x"]), req(Operator::Exists, &[]), 0)]
    #[case::notin_notin(req(Operator::NotIn, &["a"]), req(Operator::NotIn, &["b"]), usize::MAX)]
    fn test_intersection_len(#[case] a: Requirement, #[case] b: Requirement, #[case] len: usize) {
        let left = a.value_set().intersect(&b.value_set());
        let right = b.value_set().intersect(&a.value_set());
        assert_eq!(left.len(), len);
        assert_eq!(right.len(), len);
    }

    #[test]
    fn test_same_key_inserts_intersect() {
        let requirements = Requirements::new()
            .with(Requirement::in_values("zone", ["a", "b"]))
            .with(Requirement::in_values("zone", ["b", "c"]))
            .with(Requirement::in_values("arch", ["amd64"]))
            .with(Requirement::exists("os"));

        let labels = requirements.single_valued_labels();
        assert_eq!(labels.get("zone").map(String::as_str), Some("b"));
        assert_eq!(labels.get("arch").map(String::as_str), Some("amd64"));
        assert!(!labels.contains_key("os"));
    }

    #[test]
    fn test_serde_as_list() {
        let json = r#"[
            {"key": "kubernetes.io/arch", "operator": "In", "values": ["amd64"]},
            {"key": "example.com/tier", "operator": "Exists"}
        ]"#;
        let requirements: Requirements = serde_json::from_str(json).unwrap();
        assert!(requirements.contains_key("kubernetes.io/arch"));
        assert_eq!(requirements.iter().count(), 2);

        let back = serde_json::to_value(&requirements).unwrap();
        assert_eq!(back.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn test_display() {
        let r = Requirement::in_values("zone", ["a", "b"]).with_min_values(2);
        assert_eq!(r.to_string(), "zone In [a,b] minValues=2");
    }
}
