use serde::Deserialize;
use std::fmt;

/// The image host API key.
///
/// Only deserialized from configuration and only read when building the outbound request
/// header. It deliberately implements neither `Serialize` nor `Display`, and its `Debug` output
/// is redacted so that config dumps and error chains never carry it.
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct RelayCredential(String);

impl RelayCredential {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn expose_secret(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for RelayCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RelayCredential([REDACTED])")
    }
}
