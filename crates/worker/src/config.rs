//! Worker settings.

use std::collections::BTreeMap;

use extraction::{FetchLocation, LibraryKey};
use serde::{Deserialize, Serialize};

/// Location of the energy module in the default catalog.
pub const DEFAULT_ENERGY_LOCATION: &str = "builtin://energy";

/// Settings for one [`FeatureExtractionWorker`](crate::FeatureExtractionWorker).
///
/// Every field has a default, so an empty `[worker]` table is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Fetch locations known before any `addRemoteLibraries` message arrives.
    pub remote_libraries: BTreeMap<LibraryKey, FetchLocation>,

    /// Capacity of the inbound and outbound message channels.
    pub outbound_capacity: usize,

    /// Answer failed imports with an `importFailed` message instead of only
    /// logging them.
    pub report_import_failures: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        let remote_libraries = LibraryKey::new("energy")
            .zip(FetchLocation::new(DEFAULT_ENERGY_LOCATION))
            .into_iter()
            .collect();
        Self {
            remote_libraries,
            outbound_capacity: 256,
            report_import_failures: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_seeds_the_energy_library() {
        let config = WorkerConfig::default();
        let energy = LibraryKey::new("energy").unwrap();
        assert_eq!(
            config.remote_libraries.get(&energy).map(FetchLocation::as_str),
            Some(DEFAULT_ENERGY_LOCATION)
        );
        assert!(!config.report_import_failures);
        assert_eq!(config.outbound_capacity, 256);
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: WorkerConfig =
            serde_json::from_str(r#"{"report_import_failures": true}"#).unwrap();
        assert!(config.report_import_failures);
        assert_eq!(config.outbound_capacity, 256);
        assert_eq!(config.remote_libraries.len(), 1);
    }
}
