//! Collection configuration.

use restmirror_types::Params;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Options recognized by a collection. Every field has a default, so a
/// partial JSON object deserializes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CollectionConfig {
    /// Keep a snapshot of each settled fetch and serve repeats from it.
    /// When off, cache entries exist only while a fetch is in flight.
    pub with_caching: bool,
    /// Field holding each entity's identity.
    pub id_field: String,
    /// Attach the request parameters to every fetch response.
    pub respond_with_payload: bool,
    /// Leave the entity store untouched; responses carry detached models.
    pub dont_collect: bool,
    /// Merged under the parameters of every fetch.
    pub default_params: Params,
    /// Delay applied to mock payloads installed without an explicit delay.
    pub mock_delay_ms: u64,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            with_caching: true,
            id_field: "id".to_string(),
            respond_with_payload: true,
            dont_collect: false,
            default_params: Params::new(),
            mock_delay_ms: 500,
        }
    }
}

impl CollectionConfig {
    /// The default mock delay as a `Duration`.
    pub fn mock_delay(&self) -> Duration {
        Duration::from_millis(self.mock_delay_ms)
    }

    /// `params` layered over `default_params`; explicit values win.
    pub fn with_defaults(&self, params: Params) -> Params {
        if self.default_params.is_empty() {
            return params;
        }
        let mut merged = self.default_params.clone();
        merged.extend(params);
        merged
    }
}
