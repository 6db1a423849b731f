//! Three-valued optional boolean
//!
//! vSphere reports many rule flags as nullable booleans. `TriState` keeps
//! "not set" apart from "explicitly false" everywhere in the model.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Explicitly true, explicitly false, or unset (platform default)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum TriState {
    #[default]
    Unset,
    True,
    False,
}

impl TriState {
    /// Whether a value was given
    pub fn is_set(self) -> bool {
        !matches!(self, TriState::Unset)
    }

    /// Serde helper for `skip_serializing_if`
    pub fn is_unset(&self) -> bool {
        !self.is_set()
    }

    /// Resolve to a concrete value, falling back to `default` when unset
    pub fn unwrap_or(self, default: bool) -> bool {
        Option::<bool>::from(self).unwrap_or(default)
    }

    /// `self` when set, otherwise `fallback`
    pub fn or(self, fallback: TriState) -> TriState {
        if self.is_set() { self } else { fallback }
    }
}

impl From<Option<bool>> for TriState {
    fn from(value: Option<bool>) -> Self {
        match value {
            None => TriState::Unset,
            Some(true) => TriState::True,
            Some(false) => TriState::False,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        Some(value).into()
    }
}

impl From<TriState> for Option<bool> {
    fn from(value: TriState) -> Self {
        match value {
            TriState::Unset => None,
            TriState::True => Some(true),
            TriState::False => Some(false),
        }
    }
}

impl std::fmt::Display for TriState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TriState::Unset => write!(f, "unset"),
            TriState::True => write!(f, "true"),
            TriState::False => write!(f, "false"),
        }
    }
}

impl Serialize for TriState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Option::<bool>::from(*self).serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for TriState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Option::<bool>::deserialize(deserializer)?.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_is_not_false() {
        assert_ne!(TriState::Unset, TriState::False);
        assert_eq!(TriState::from(None), TriState::Unset);
        assert_eq!(TriState::from(Some(false)), TriState::False);
        assert_eq!(Option::<bool>::from(TriState::Unset), None);
    }

    #[test]
    fn test_serde_as_optional_bool() {
        assert_eq!(serde_json::to_string(&TriState::True).unwrap(), "true");
        assert_eq!(serde_json::to_string(&TriState::Unset).unwrap(), "null");
        let parsed: TriState = serde_json::from_str("false").unwrap();
        assert_eq!(parsed, TriState::False);
        let parsed: TriState = serde_json::from_str("null").unwrap();
        assert_eq!(parsed, TriState::Unset);
    }

    #[test]
    fn test_or_and_unwrap_or() {
        assert_eq!(TriState::Unset.or(TriState::True), TriState::True);
        assert_eq!(TriState::False.or(TriState::True), TriState::False);
        assert!(TriState::Unset.unwrap_or(true));
        assert!(!TriState::False.unwrap_or(true));
    }
}
