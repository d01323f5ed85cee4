//! Well-known label keys and alias normalization.
//!
//! The tables are plain values: a matcher receives its [`LabelConfig`] at
//! construction and nothing here is process-global.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

pub const LABEL_INSTANCE_TYPE: &str = "node.kubernetes.io/instance-type";
pub const LABEL_ARCH: &str = "kubernetes.io/arch";
pub const LABEL_OS: &str = "kubernetes.io/os";
pub const LABEL_ZONE: &str = "topology.kubernetes.io/zone";
pub const LABEL_REGION: &str = "topology.kubernetes.io/region";
pub const LABEL_CAPACITY_TYPE: &str = "karpenter.sh/capacity-type";

pub const CAPACITY_TYPE_ON_DEMAND: &str = "on-demand";
pub const ARCH_AMD64: &str = "amd64";
pub const OS_LINUX: &str = "linux";

const BASE_WELL_KNOWN: [&str; 6] = [
    LABEL_INSTANCE_TYPE,
    LABEL_ARCH,
    LABEL_OS,
    LABEL_ZONE,
    LABEL_REGION,
    LABEL_CAPACITY_TYPE,
];

const BASE_ALIASES: [(&str, &str); 5] = [
    ("beta.kubernetes.io/arch", LABEL_ARCH),
    ("beta.kubernetes.io/os", LABEL_OS),
    ("beta.kubernetes.io/instance-type", LABEL_INSTANCE_TYPE),
    ("failure-domain.beta.kubernetes.io/zone", LABEL_ZONE),
    ("failure-domain.beta.kubernetes.io/region", LABEL_REGION),
];

/// Extra entries merged on top of the base tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelOverrides {
    pub well_known: Vec<String>,
    /// Deprecated key → canonical key.
    pub aliases: BTreeMap<String, String>,
}

/// The well-known label set and the alias table used to normalize keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelConfig {
    well_known: BTreeSet<String>,
    aliases: BTreeMap<String, String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            well_known: BASE_WELL_KNOWN.iter().map(|s| s.to_string()).collect(),
            aliases: BASE_ALIASES
                .iter()
                .map(|(from, to)| (from.to_string(), to.to_string()))
                .collect(),
        }
    }
}

impl LabelConfig {
    /// Merges `overrides` into this config. Overrides win on key collision.
    pub fn with_overrides(mut self, overrides: LabelOverrides) -> Self {
        self.well_known.extend(overrides.well_known);
        self.aliases.extend(overrides.aliases);
        self
    }

    /// Maps a deprecated key to its canonical form.
    pub fn normalize<'a>(&'a self, key: &'a str) -> &'a str {
        self.aliases.get(key).map(String::as_str).unwrap_or(key)
    }

    /// Whether `key` (after normalization) is a well-known label.
    pub fn is_well_known(&self, key: &str) -> bool {
        self.well_known.contains(self.normalize(key))
    }

    pub fn well_known(&self) -> impl Iterator<Item = &str> {
        self.well_known.iter().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_deprecated_keys() {
        let config = LabelConfig::default();
        assert_eq!(config.normalize("beta.kubernetes.io/arch"), LABEL_ARCH);
        assert_eq!(config.normalize(LABEL_ARCH), LABEL_ARCH);
        assert_eq!(config.normalize("example.com/team"), "example.com/team");
    }

    #[test]
    fn test_well_known() {
        let config = LabelConfig::default();
        assert!(config.is_well_known(LABEL_ZONE));
        assert!(config.is_well_known("failure-domain.beta.kubernetes.io/zone"));
        assert!(!config.is_well_known("example.com/team"));
    }

    #[test]
    fn test_overrides_win() {
        let overrides = LabelOverrides {
            well_known: vec!["example.com/gpu".to_string()],
            aliases: BTreeMap::from([
                ("beta.kubernetes.io/arch".to_string(), "example.com/arch".to_string()),
                ("old.example.com/gpu".to_string(), "example.com/gpu".to_string()),
            ]),
        };
        let config = LabelConfig::default().with_overrides(overrides);

        assert_eq!(config.normalize("beta.kubernetes.io/arch"), "example.com/arch");
        assert!(config.is_well_known("old.example.com/gpu"));
        assert!(config.is_well_known(LABEL_OS));
    }
}
