//! Loader configuration.

use serde::{Deserialize, Serialize};

/// Settings for the batch fetch engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Prefix of the synthetic column carrying each row's owning id.
    pub tag_prefix: String,
    /// Send each owning id once, even if instances repeat.
    pub dedupe_ids: bool,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            tag_prefix: "__".to_string(),
            dedupe_ids: true,
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn tag_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.tag_prefix = prefix.into();
        self
    }

    #[must_use]
    pub fn dedupe_ids(mut self, value: bool) -> Self {
        self.dedupe_ids = value;
        self
    }

    /// Alias of the owning-id column for `column`.
    pub fn tag_alias(&self, column: &str) -> String {
        format!("{}{}", self.tag_prefix, column.to_lowercase())
    }
}
