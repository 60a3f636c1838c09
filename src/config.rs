//! Boot configuration: the parameter catalog and the structures that exist at power-on.

use crate::error::ExecutionStartError;
use crate::parameter::{ParameterCatalog, ParameterError, ParameterId, ParameterValue};
use crate::registry::{CollectionInterval, StructureId, StructureRegistry};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

pub const DEFAULT_LISTEN_PORT: u16 = 8080;
pub const DEFAULT_MAX_TICK_MS: u64 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid parameter catalog: {0}")]
    Catalog(#[from] ParameterError),
    #[error("boot structure {id}: {source}")]
    Structure {
        id: StructureId,
        source: ExecutionStartError,
    },
    #[error("boot structure {id} references parameter {parameter} outside the catalog")]
    UnknownParameter { id: StructureId, parameter: ParameterId },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructureConfig {
    pub id: StructureId,
    #[serde(default)]
    pub enabled: bool,
    pub collection_interval: CollectionInterval,
    #[serde(default)]
    pub parameters: Vec<ParameterId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BootConfig {
    /// Initial values; position is the parameter ID and the variant fixes its kind.
    pub parameters: Vec<ParameterValue>,
    pub structures: Vec<StructureConfig>,
    pub listen_port: u16,
    /// Upper bound on the simulator's sleep between scheduler ticks.
    pub max_tick_ms: u64,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            parameters: vec![
                ParameterValue::U8(3),
                ParameterValue::U16(7),
                ParameterValue::U32(10),
                ParameterValue::U32(5),
                ParameterValue::U8(11),
                ParameterValue::U32(23),
                ParameterValue::U32(53),
                ParameterValue::U8(55),
                ParameterValue::U16(32),
                ParameterValue::U32(43),
                ParameterValue::U32(91),
                ParameterValue::U8(1),
            ],
            structures: vec![StructureConfig {
                id: 1,
                enabled: true,
                collection_interval: 500,
                parameters: vec![3],
            }],
            listen_port: DEFAULT_LISTEN_PORT,
            max_tick_ms: DEFAULT_MAX_TICK_MS,
        }
    }
}

impl BootConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn build_catalog(&self) -> Result<ParameterCatalog, ConfigError> {
        Ok(ParameterCatalog::with_values(self.parameters.iter().copied())?)
    }

    /// Create the boot structures through the regular create path. Unlike a
    /// ground request, a boot structure must reference catalog parameters only
    /// and fit the structure capacity.
    pub fn install_structures(&self, registry: &mut StructureRegistry) -> Result<(), ConfigError> {
        for structure in &self.structures {
            let id = structure.id;
            if let Some(&parameter) = structure
                .parameters
                .iter()
                .find(|&&p| usize::from(p) >= self.parameters.len())
            {
                return Err(ConfigError::UnknownParameter { id, parameter });
            }

            let outcome = registry
                .create(id, structure.collection_interval, &structure.parameters)
                .map_err(|source| ConfigError::Structure { id, source })?;
            if outcome.truncated > 0 {
                return Err(ConfigError::Structure {
                    id,
                    source: ExecutionStartError::ParameterCapacityExceeded,
                });
            }

            if structure.enabled {
                registry
                    .enable(id)
                    .map_err(|source| ConfigError::Structure { id, source })?;
            }
            debug!(id, enabled = structure.enabled, "boot structure installed");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let config = BootConfig::default();
        let catalog = config.build_catalog().unwrap();

        assert_eq!(catalog.count(), 12);
        assert_eq!(catalog.get(3).map(|p| p.get()), Some(ParameterValue::U32(5)));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = BootConfig::from_json(r#"{ "listen_port": 9000 }"#).unwrap();

        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.max_tick_ms, DEFAULT_MAX_TICK_MS);
        assert_eq!(config.parameters.len(), 12);
    }

    #[test]
    fn test_duplicate_boot_structure_rejected() {
        let mut config = BootConfig::default();
        config.structures.push(config.structures[0].clone());

        let mut registry = StructureRegistry::new();
        let result = config.install_structures(&mut registry);
        assert!(matches!(
            result,
            Err(ConfigError::Structure { id: 1, source: ExecutionStartError::DuplicateStructure })
        ));
    }

    #[test]
    fn test_boot_structure_outside_catalog_rejected() {
        let config = BootConfig::from_json(
            r#"{ "parameters": [{"U8": 1}], "structures": [{"id": 2, "collection_interval": 10, "parameters": [0, 5]}] }"#,
        )
        .unwrap();

        let mut registry = StructureRegistry::new();
        assert!(matches!(
            config.install_structures(&mut registry),
            Err(ConfigError::UnknownParameter { id: 2, parameter: 5 })
        ));
        assert!(registry.is_empty());
    }
}
