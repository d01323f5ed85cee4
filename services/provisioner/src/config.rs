//! Configuration for the provisioner.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use stratus_reconcile::PollSpec;
use stratus_scheduling::{LabelConfig, LabelOverrides, RequirementMatcher, UndefinedLabelPolicy};

use crate::backend::NovaConfig;
use crate::instance::InstanceSettings;

/// Provisioner configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Compute API endpoint.
    pub compute_url: String,

    /// Pre-issued compute API token.
    pub auth_token: String,

    /// Cluster name stamped onto instance metadata.
    pub cluster_name: String,

    /// Instance name prefix.
    pub instance_prefix: String,

    pub poll_interval_secs: u64,

    pub poll_timeout_secs: u64,

    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,

    /// Delete instances that fail to become active.
    pub cleanup_failed: bool,

    /// Reject offerings that leave a required well-known label undefined.
    pub deny_undefined_well_known: bool,

    /// Labels treated as well-known in addition to the built-in set.
    pub extra_well_known_labels: Vec<String>,

    /// Deprecated label key → canonical key, merged over the built-in aliases.
    pub label_aliases: BTreeMap<String, String>,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let compute_url = var("STRATUS_COMPUTE_URL", "http://127.0.0.1:8774/v2.1");
        let auth_token = var("STRATUS_AUTH_TOKEN", "");
        let cluster_name = var("STRATUS_CLUSTER_NAME", "stratus");
        let instance_prefix = var("STRATUS_INSTANCE_PREFIX", "stratus");

        let poll_interval_secs = parse_u64(&lookup, "STRATUS_POLL_INTERVAL_SECS", 5)?;
        let poll_timeout_secs = parse_u64(&lookup, "STRATUS_POLL_TIMEOUT_SECS", 300)?;
        let request_timeout_secs = parse_u64(&lookup, "STRATUS_REQUEST_TIMEOUT_SECS", 30)?;
        if poll_interval_secs == 0 {
            bail!("STRATUS_POLL_INTERVAL_SECS must be greater than zero");
        }

        let cleanup_failed = parse_bool(&lookup, "STRATUS_CLEANUP_FAILED", true)?;
        let deny_undefined_well_known =
            parse_bool(&lookup, "STRATUS_DENY_UNDEFINED_WELL_KNOWN", false)?;

        let extra_well_known_labels = lookup("STRATUS_EXTRA_WELL_KNOWN_LABELS")
            .map(|raw| split_list(&raw).map(String::from).collect())
            .unwrap_or_default();

        let label_aliases = match lookup("STRATUS_LABEL_ALIASES") {
            Some(raw) => parse_aliases(&raw).context("invalid STRATUS_LABEL_ALIASES")?,
            None => BTreeMap::new(),
        };

        let log_level = var("STRATUS_LOG_LEVEL", "info");

        Ok(Self {
            compute_url,
            auth_token,
            cluster_name,
            instance_prefix,
            poll_interval_secs,
            poll_timeout_secs,
            request_timeout_secs,
            cleanup_failed,
            deny_undefined_well_known,
            extra_well_known_labels,
            label_aliases,
            log_level,
        })
    }

    pub fn poll_spec(&self) -> PollSpec {
        PollSpec::new(
            Duration::from_secs(self.poll_interval_secs),
            Duration::from_secs(self.poll_timeout_secs),
        )
    }

    pub fn instance_settings(&self) -> InstanceSettings {
        InstanceSettings {
            cluster_name: self.cluster_name.clone(),
            name_prefix: self.instance_prefix.clone(),
            poll: self.poll_spec(),
            cleanup_on_failure: self.cleanup_failed,
        }
    }

    pub fn nova(&self) -> NovaConfig {
        NovaConfig {
            endpoint: self.compute_url.clone(),
            auth_token: self.auth_token.clone(),
            request_timeout: Duration::from_secs(self.request_timeout_secs),
        }
    }

    pub fn matcher(&self) -> RequirementMatcher {
        let labels = LabelConfig::default().with_overrides(LabelOverrides {
            well_known: self.extra_well_known_labels.clone(),
            aliases: self.label_aliases.clone(),
        });
        let policy = if self.deny_undefined_well_known {
            UndefinedLabelPolicy::DenyWellKnown
        } else {
            UndefinedLabelPolicy::Allow
        };
        RequirementMatcher::new(labels, policy)
    }
}

fn parse_u64(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{key} must be a non-negative integer, got '{raw}'")),
        None => Ok(default),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("true" | "1" | "yes") => Ok(true),
        Some("false" | "0" | "no") => Ok(false),
        Some(other) => bail!("{key} must be true or false, got '{other}'"),
    }
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

/// Parses `old=new,old2=new2`.
fn parse_aliases(raw: &str) -> Result<BTreeMap<String, String>> {
    split_list(raw)
        .map(|pair| {
            let Some((from, to)) = pair.split_once('=') else {
                bail!("expected 'old=new', got '{pair}'");
            };
            Ok((from.trim().to_string(), to.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.cluster_name, "stratus");
        assert_eq!(config.poll_interval_secs, 5);
        assert_eq!(config.poll_timeout_secs, 300);
        assert!(config.cleanup_failed);
        assert!(!config.deny_undefined_well_known);
        assert_eq!(config.instance_settings().name_prefix, "stratus");
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("STRATUS_CLUSTER_NAME", "prod"),
            ("STRATUS_POLL_INTERVAL_SECS", "2"),
            ("STRATUS_CLEANUP_FAILED", "false"),
            ("STRATUS_DENY_UNDEFINED_WELL_KNOWN", "true"),
            ("STRATUS_EXTRA_WELL_KNOWN_LABELS", "example.com/gpu, example.com/tier"),
            ("STRATUS_LABEL_ALIASES", "old.example.com/gpu=example.com/gpu"),
        ]))
        .unwrap();

        assert_eq!(config.cluster_name, "prod");
        assert_eq!(config.poll_spec().interval, Duration::from_secs(2));
        assert!(!config.instance_settings().cleanup_on_failure);
        assert_eq!(config.extra_well_known_labels.len(), 2);

        let matcher = config.matcher();
        assert!(matcher.labels().is_well_known("old.example.com/gpu"));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(Config::from_lookup(lookup(&[("STRATUS_POLL_INTERVAL_SECS", "soon")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STRATUS_POLL_INTERVAL_SECS", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STRATUS_CLEANUP_FAILED", "maybe")])).is_err());
        assert!(Config::from_lookup(lookup(&[("STRATUS_LABEL_ALIASES", "no-separator")])).is_err());
    }
}
