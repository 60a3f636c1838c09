//! Housekeeping structure registry.
//!
//! A bounded map of report structures keyed by [`StructureId`] and kept in
//! ascending ID order, which is also the order the scheduler walks them.
//! Parameter references are catalog IDs only.

use crate::error::{ExecutionStartError, InternalError};
use crate::parameter::ParameterId;
use heapless::Vec;
use static_assertions::const_assert;
use tracing::debug;

pub const MAX_HOUSEKEEPING_STRUCTURES: usize = 10;
pub const MAX_SIMPLY_COMMUTATED_PARAMETERS: usize = 30;

// Structure IDs are u8 and parameter counts travel as u16
const_assert!(MAX_HOUSEKEEPING_STRUCTURES <= 256);
const_assert!(MAX_SIMPLY_COMMUTATED_PARAMETERS <= u16::MAX as usize);

pub type StructureId = u8;
pub type CollectionInterval = u32;
pub type ParameterIdList = Vec<ParameterId, MAX_SIMPLY_COMMUTATED_PARAMETERS>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HousekeepingStructure {
    pub id: StructureId,
    /// Periodic generation action status.
    pub enabled: bool,
    pub collection_interval: CollectionInterval,
    parameter_ids: ParameterIdList,
}

impl HousekeepingStructure {
    pub fn new(id: StructureId, collection_interval: CollectionInterval) -> Self {
        Self {
            id,
            enabled: false,
            collection_interval,
            parameter_ids: Vec::new(),
        }
    }

    pub fn parameter_ids(&self) -> &[ParameterId] {
        &self.parameter_ids
    }

    pub fn contains_parameter(&self, id: ParameterId) -> bool {
        self.parameter_ids.contains(&id)
    }

    pub fn is_full(&self) -> bool {
        self.parameter_ids.is_full()
    }

    /// Add `id` unless already present. `Ok(false)` means it was skipped as a duplicate.
    pub fn insert_parameter(&mut self, id: ParameterId) -> Result<bool, ExecutionStartError> {
        if self.contains_parameter(id) {
            return Ok(false);
        }
        self.parameter_ids
            .push(id)
            .map_err(|_| ExecutionStartError::ParameterCapacityExceeded)?;
        Ok(true)
    }
}

/// Result of a create whose input list was normalised.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreateOutcome {
    pub accepted: usize,
    pub duplicates_skipped: usize,
    pub truncated: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StructureRegistry {
    structures: Vec<HousekeepingStructure, MAX_HOUSEKEEPING_STRUCTURES>,
}

impl StructureRegistry {
    pub fn new() -> Self {
        Self { structures: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.structures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.structures.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.structures.is_full()
    }

    pub fn contains(&self, id: StructureId) -> bool {
        self.get(id).is_some()
    }

    pub fn get(&self, id: StructureId) -> Option<&HousekeepingStructure> {
        self.structures.iter().find(|s| s.id == id)
    }

    fn get_mut(&mut self, id: StructureId) -> Option<&mut HousekeepingStructure> {
        self.structures.iter_mut().find(|s| s.id == id)
    }

    /// Structures in ascending ID order.
    pub fn iter(&self) -> impl Iterator<Item = &HousekeepingStructure> {
        self.structures.iter()
    }

    /// Create-time checks, in reporting order: duplicate ID first, then capacity.
    pub fn check_creatable(&self, id: StructureId) -> Result<(), ExecutionStartError> {
        if self.contains(id) {
            return Err(ExecutionStartError::DuplicateStructure);
        }
        if self.is_full() {
            return Err(ExecutionStartError::StructureCapacityExceeded);
        }
        Ok(())
    }

    /// Insert a fully built structure. It always starts disabled.
    pub fn insert(&mut self, mut structure: HousekeepingStructure) -> Result<(), ExecutionStartError> {
        self.check_creatable(structure.id)?;
        structure.enabled = false;

        debug!(
            id = structure.id,
            interval = structure.collection_interval,
            parameters = structure.parameter_ids.len(),
            "housekeeping structure created"
        );
        self.structures
            .push(structure)
            .map_err(|_| ExecutionStartError::StructureCapacityExceeded)?;
        self.structures.sort_unstable_by_key(|s| s.id);
        Ok(())
    }

    /// Create a structure from a parameter list. Repeated IDs are skipped
    /// silently; IDs beyond the per-structure capacity are cut off.
    pub fn create(
        &mut self,
        id: StructureId,
        collection_interval: CollectionInterval,
        parameter_ids: &[ParameterId],
    ) -> Result<CreateOutcome, ExecutionStartError> {
        self.check_creatable(id)?;

        let mut structure = HousekeepingStructure::new(id, collection_interval);
        let mut outcome = CreateOutcome::default();
        for (index, &parameter_id) in parameter_ids.iter().enumerate() {
            match structure.insert_parameter(parameter_id) {
                Ok(true) => outcome.accepted += 1,
                Ok(false) => outcome.duplicates_skipped += 1,
                Err(_) => {
                    outcome.truncated = parameter_ids.len() - index;
                    break;
                }
            }
        }

        self.insert(structure)?;
        Ok(outcome)
    }

    pub fn delete(&mut self, id: StructureId) -> Result<(), ExecutionStartError> {
        let index = self
            .structures
            .iter()
            .position(|s| s.id == id)
            .ok_or(ExecutionStartError::UnknownStructure)?;

        if self.structures[index].enabled {
            return Err(ExecutionStartError::DeleteOfEnabledStructure);
        }

        // Order-preserving removal keeps the ID ordering intact
        self.structures.remove(index);
        debug!(id, "housekeeping structure deleted");
        Ok(())
    }

    pub fn enable(&mut self, id: StructureId) -> Result<(), ExecutionStartError> {
        self.set_enabled_flag(id, true)
    }

    pub fn disable(&mut self, id: StructureId) -> Result<(), ExecutionStartError> {
        self.set_enabled_flag(id, false)
    }

    fn set_enabled_flag(&mut self, id: StructureId, enabled: bool) -> Result<(), ExecutionStartError> {
        let structure = self.get_mut(id).ok_or(ExecutionStartError::UnknownStructure)?;
        structure.enabled = enabled;
        debug!(id, enabled, "periodic generation status changed");
        Ok(())
    }

    pub fn modify_interval(
        &mut self,
        id: StructureId,
        collection_interval: CollectionInterval,
    ) -> Result<(), ExecutionStartError> {
        let structure = self.get_mut(id).ok_or(ExecutionStartError::UnknownStructure)?;
        structure.collection_interval = collection_interval;
        debug!(id, interval = collection_interval, "collection interval modified");
        Ok(())
    }

    /// Batch-level append checks: the structure exists and is disabled.
    pub fn check_appendable(&self, id: StructureId) -> Result<(), ExecutionStartError> {
        let structure = self.get(id).ok_or(ExecutionStartError::UnknownStructure)?;
        if structure.enabled {
            return Err(ExecutionStartError::AppendToEnabledStructure);
        }
        Ok(())
    }

    /// Append one parameter. Checks run capacity first, then catalog range,
    /// then duplicates. A capacity failure means no later append can succeed.
    pub fn append_parameter(
        &mut self,
        id: StructureId,
        parameter_id: ParameterId,
        catalog_size: usize,
    ) -> Result<(), ExecutionStartError> {
        self.check_appendable(id)?;
        let structure = self.get_mut(id).ok_or(ExecutionStartError::UnknownStructure)?;

        if structure.is_full() {
            return Err(ExecutionStartError::ParameterCapacityExceeded);
        }
        if usize::from(parameter_id) >= catalog_size {
            return Err(ExecutionStartError::UnknownParameter);
        }
        if !structure.insert_parameter(parameter_id)? {
            return Err(ExecutionStartError::DuplicateParameter);
        }
        Ok(())
    }

    /// Read-only view of a structure the caller has already validated.
    pub fn describe(&self, id: StructureId) -> Result<&HousekeepingStructure, InternalError> {
        self.get(id).ok_or(InternalError::NonExistentHousekeeping)
    }

    pub fn structure_exists(&self, id: StructureId) -> bool {
        self.contains(id)
    }

    pub fn is_enabled(&self, id: StructureId) -> Result<bool, InternalError> {
        self.describe(id).map(|s| s.enabled)
    }

    pub fn collection_interval(&self, id: StructureId) -> Result<CollectionInterval, InternalError> {
        self.describe(id).map(|s| s.collection_interval)
    }

    pub fn set_periodic_generation(&mut self, id: StructureId, enabled: bool) -> Result<(), InternalError> {
        let structure = self.get_mut(id).ok_or(InternalError::NonExistentHousekeeping)?;
        structure.enabled = enabled;
        Ok(())
    }

    pub fn set_collection_interval(
        &mut self,
        id: StructureId,
        collection_interval: CollectionInterval,
    ) -> Result<(), InternalError> {
        let structure = self.get_mut(id).ok_or(InternalError::NonExistentHousekeeping)?;
        structure.collection_interval = collection_interval;
        Ok(())
    }
}
