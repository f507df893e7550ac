//! Entity identities used to scope secondary fetches.
//!
//! A medication is identified by its case-insensitive generic name plus its
//! position in the analysed list, so two entries with the same name stay
//! distinct. Uploaded documents get a fresh UUID each.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::FocusKind;
use super::ModelError;

/// Identity of one analysed medication or herb: `name#position`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    name: String,
    position: usize,
}

impl EntityKey {
    pub fn new(name: &str, position: usize) -> Self {
        Self {
            name: normalize_name(name),
            position,
        }
    }

    /// Whether `name` normalizes to this key's name.
    pub fn names(&self, name: &str) -> bool {
        normalize_name(name) == self.name
    }

    /// Lower-cased generic name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

/// Trimmed, Unicode lower-cased form used for every name comparison.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_lowercase()
}

impl std::fmt::Display for EntityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.name, self.position)
    }
}

impl std::str::FromStr for EntityKey {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, position) = s
            .rsplit_once('#')
            .ok_or_else(|| ModelError::InvalidEntityKey(s.to_string()))?;
        if name.trim().is_empty() {
            return Err(ModelError::InvalidEntityKey(s.to_string()));
        }
        let position = position
            .parse::<usize>()
            .map_err(|_| ModelError::InvalidEntityKey(s.to_string()))?;
        Ok(Self::new(name, position))
    }
}

/// Key of one detail Fetch Cell: what is being fetched, for which entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetailKey {
    pub kind: FocusKind,
    pub entity: EntityKey,
}

impl DetailKey {
    pub fn new(kind: FocusKind, entity: EntityKey) -> Self {
        Self { kind, entity }
    }
}

impl std::fmt::Display for DetailKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.entity)
    }
}

/// Identity of one uploaded document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentKey(Uuid);

impl DocumentKey {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DocumentKey {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "doc:{}", self.0)
    }
}
