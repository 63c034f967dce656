//! Allow-list of caller identities permitted to mutate trades.

use std::collections::HashSet;

/// Set of caller identities (Discord user ids) allowed to invoke
/// trade-mutating commands.
///
/// Read-only once built; a reload replaces the whole list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationList {
    ids: HashSet<String>,
}

impl AuthorizationList {
    pub fn new<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ids: ids
                .into_iter()
                .map(Into::into)
                .map(|id| id.trim().to_string())
                .filter(|id| !id.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated list, ignoring blanks and surrounding whitespace.
    pub fn parse_csv(raw: &str) -> Self {
        Self::new(raw.split(','))
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.ids.contains(identity.trim())
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}
