//! The provider identifier type.

use std::fmt;
use std::str::FromStr;

use crate::IdError;

/// Scheme of every provider identifier issued by this system.
pub const PROVIDER_SCHEME: &str = "openstack";

/// A parsed `openstack:///<instance-id>` identifier.
///
/// Construction always validates, so a `ProviderId` value is guaranteed to
/// format back into a string that parses to the same instance id.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProviderId {
    instance_id: String,
}

impl ProviderId {
    /// The scheme for this identifier type.
    pub const SCHEME: &'static str = PROVIDER_SCHEME;

    /// Encodes a backend instance id.
    ///
    /// Fails for an empty id or one that would not survive a roundtrip
    /// (path separators, whitespace).
    pub fn new(instance_id: impl Into<String>) -> Result<Self, IdError> {
        let instance_id = instance_id.into();
        validate_instance_id(&instance_id)?;
        Ok(Self { instance_id })
    }

    /// Parses an identifier in the canonical `openstack:///<instance-id>` form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }

        let Some((scheme, rest)) = s.split_once("://") else {
            return Err(IdError::format(format!(
                "'{s}' is missing the '{}://' prefix",
                Self::SCHEME
            )));
        };

        if scheme != Self::SCHEME {
            return Err(IdError::InvalidScheme {
                expected: Self::SCHEME,
                actual: scheme.to_string(),
            });
        }

        // The authority must be empty: `openstack:///<id>`, never `openstack://<id>/<name>`.
        let Some(path) = rest.strip_prefix('/') else {
            return Err(IdError::format(format!(
                "'{s}' carries an authority component; expected '{}:///<instance-id>'",
                Self::SCHEME
            )));
        };

        validate_instance_id(path)?;

        Ok(Self {
            instance_id: path.to_string(),
        })
    }

    /// Returns the backend instance id.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Consumes the identifier, returning the backend instance id.
    pub fn into_instance_id(self) -> String {
        self.instance_id
    }
}

fn validate_instance_id(id: &str) -> Result<(), IdError> {
    if id.is_empty() {
        return Err(IdError::format("instance id is empty"));
    }
    if id.contains('/') {
        return Err(IdError::format(format!(
            "instance id '{id}' has additional path segments"
        )));
    }
    if id.chars().any(char::is_whitespace) {
        return Err(IdError::format(format!(
            "instance id '{id}' contains whitespace"
        )));
    }
    Ok(())
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:///{}", Self::SCHEME, self.instance_id)
    }
}

impl FromStr for ProviderId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ProviderId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl TryFrom<&str> for ProviderId {
    type Error = IdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.to_string()
    }
}

impl serde::Serialize for ProviderId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for ProviderId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rstest::rstest;

    #[test]
    fn test_encode() {
        let id = ProviderId::new("abc123").unwrap();
        assert_eq!(id.to_string(), "openstack:///abc123");
        assert_eq!(id.instance_id(), "abc123");
    }

    #[test]
    fn test_parse_canonical() {
        let id = ProviderId::parse("openstack:///f22b426e-91e1-79f04c705c09").unwrap();
        assert_eq!(id.instance_id(), "f22b426e-91e1-79f04c705c09");
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(ProviderId::parse(""), Err(IdError::Empty));
    }

    #[test]
    fn test_parse_wrong_scheme() {
        let err = ProviderId::parse("aws:///i-123").unwrap_err();
        assert!(matches!(err, IdError::InvalidScheme { .. }));
    }

    #[rstest]
    #[case::no_scheme("invalid-format")]
    #[case::authority_form("openstack://abc123/node-1")]
    #[case::bare_authority("openstack://abc123")]
    #[case::extra_segments("openstack:///abc123/extra")]
    #[case::empty_id("openstack:///")]
    #[case::whitespace("openstack:///abc 123")]
    fn test_parse_rejects_malformed(#[case] input: &str) {
        let err = ProviderId::parse(input).unwrap_err();
        assert!(
            matches!(err, IdError::InvalidFormat { .. }),
            "expected InvalidFormat for {input:?}, got {err:?}"
        );
    }

    #[test]
    fn test_new_rejects_path_separator() {
        assert!(ProviderId::new("a/b").is_err());
        assert!(ProviderId::new("").is_err());
    }

    #[test]
    fn test_serde_as_string() {
        let id = ProviderId::new("abc123").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"openstack:///abc123\"");

        let parsed: ProviderId = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);

        let bad: Result<ProviderId, _> = serde_json::from_str("\"openstack://x/y\"");
        assert!(bad.is_err());
    }

    proptest! {
        #[test]
        fn prop_roundtrip(instance_id in "[A-Za-z0-9._:-]{1,64}") {
            let encoded = ProviderId::new(instance_id.clone()).unwrap().to_string();
            let parsed = ProviderId::parse(&encoded).unwrap();
            prop_assert_eq!(parsed.instance_id(), instance_id.as_str());
        }
    }
}
