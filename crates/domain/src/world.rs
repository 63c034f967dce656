use serde::{Deserialize, Serialize};

use crate::command::WorldNumber;

/// Reference data for one game world, as reported by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorldInfo {
    pub number: WorldNumber,
    pub population: u32,
    /// Host-specific world type flags (members, PvP, skill total, ...).
    #[serde(default)]
    pub flags: Vec<String>,
}

impl WorldInfo {
    pub fn new(number: WorldNumber, population: u32) -> Self {
        Self {
            number,
            population,
            flags: Vec::new(),
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags = flags.into_iter().map(Into::into).collect();
        self
    }
}
