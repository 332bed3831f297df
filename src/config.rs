use crate::error::Result;
use serde::Deserialize;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;

const DEFAULT_PURCHASE_TIMEOUT_MS: u64 = 5 * 60 * 1000;

/// Engine settings. Every field has a default so partial JSON files are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// How long a launched purchase may wait for the provider's update.
    /// `None` waits indefinitely.
    pub purchase_timeout_ms: Option<u64>,
    pub messages: ErrorMessages,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            purchase_timeout_ms: Some(DEFAULT_PURCHASE_TIMEOUT_MS),
            messages: ErrorMessages::default(),
        }
    }
}

impl EngineConfig {
    /// Loads a JSON config file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    pub fn purchase_timeout(&self) -> Option<Duration> {
        self.purchase_timeout_ms.map(Duration::from_millis)
    }

    pub fn with_purchase_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.purchase_timeout_ms = timeout.map(|t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX));
        self
    }
}

/// Message templates for locally raised errors. `{id}` is replaced with the item id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ErrorMessages {
    pub item_not_found: String,
    pub item_not_owned: String,
    pub not_consumable: String,
    pub operation_in_progress: String,
    pub purchase_timeout: String,
}

impl Default for ErrorMessages {
    fn default() -> Self {
        Self {
            item_not_found: "Product {id} not found".to_string(),
            item_not_owned: "Product {id} is not owned".to_string(),
            not_consumable: "Product {id} is not consumable".to_string(),
            operation_in_progress: "A purchase of {id} is already in progress".to_string(),
            purchase_timeout: "Purchase of {id} timed out".to_string(),
        }
    }
}

impl ErrorMessages {
    pub fn render(template: &str, id: &str) -> String {
        template.replace("{id}", id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.purchase_timeout(), Some(Duration::from_secs(300)));
        assert_eq!(
            ErrorMessages::render(&config.messages.item_not_found, "coins_100"),
            "Product coins_100 not found"
        );
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"{{"purchase_timeout_ms": 250, "messages": {{"item_not_owned": "no {{id}} for you"}}}}"#
        )
        .unwrap();

        let config = EngineConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.purchase_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(config.messages.item_not_owned, "no {id} for you");
        assert_eq!(
            config.messages.not_consumable,
            ErrorMessages::default().not_consumable
        );
    }

    #[test]
    fn test_oversized_timeout_saturates() {
        let config = EngineConfig::default().with_purchase_timeout(Some(Duration::MAX));
        assert_eq!(config.purchase_timeout_ms, Some(u64::MAX));
    }

    #[test]
    fn test_null_timeout_disables_it() {
        let config: EngineConfig = serde_json::from_str(r#"{"purchase_timeout_ms": null}"#).unwrap();
        assert_eq!(config.purchase_timeout(), None);
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let result: std::result::Result<EngineConfig, _> =
            serde_json::from_str(r#"{"timeout": 5}"#);
        assert!(result.is_err());
    }
}
