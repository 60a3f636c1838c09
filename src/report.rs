//! Ground-side views of the housekeeping reports.
//!
//! Each view reads its fields back in wire order, so a decoded report
//! reproduces exactly what the service encoded.

use crate::message::{Message, MessageError};
use crate::parameter::{ParameterCatalog, ParameterId, ParameterValue};
use crate::registry::{CollectionInterval, StructureId};
use serde::{Deserialize, Serialize};

/// TM[3,10]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureReport {
    pub id: StructureId,
    pub enabled: bool,
    pub collection_interval: CollectionInterval,
    pub parameter_ids: Vec<ParameterId>,
}

impl StructureReport {
    pub fn decode(report: &mut Message) -> Result<Self, MessageError> {
        report.reset_read();
        let id = report.read_u8()?;
        let enabled = report.read_bool()?;
        let collection_interval = report.read_u32()?;
        let count = report.read_u16()?;
        let parameter_ids = (0..count)
            .map(|_| report.read_u16())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            id,
            enabled,
            collection_interval,
            parameter_ids,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicProperties {
    pub id: StructureId,
    pub enabled: bool,
    pub collection_interval: CollectionInterval,
}

/// TM[3,35]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeriodicPropertiesReport {
    pub structures: Vec<PeriodicProperties>,
}

impl PeriodicPropertiesReport {
    pub fn decode(report: &mut Message) -> Result<Self, MessageError> {
        report.reset_read();
        let count = report.read_u8()?;
        let mut structures = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            structures.push(PeriodicProperties {
                id: report.read_u8()?,
                enabled: report.read_bool()?,
                collection_interval: report.read_u32()?,
            });
        }
        Ok(Self { structures })
    }
}

/// TM[3,25]. Values carry no type tags, so the payload stays raw until
/// matched against the parameter kinds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParametersReport {
    pub id: StructureId,
    pub values: Vec<u8>,
}

impl ParametersReport {
    pub fn decode(report: &mut Message) -> Result<Self, MessageError> {
        report.reset_read();
        let id = report.read_u8()?;
        let values = report.data()[report.read_position()..].to_vec();
        Ok(Self { id, values })
    }

    /// Split the payload using the kinds of `parameter_ids` in `catalog`.
    /// `None` when the payload does not match those kinds exactly.
    pub fn values_for(&self, parameter_ids: &[ParameterId], catalog: &ParameterCatalog) -> Option<Vec<ParameterValue>> {
        let mut offset = 0;
        let mut values = Vec::with_capacity(parameter_ids.len());
        for &parameter_id in parameter_ids {
            let kind = catalog.get(parameter_id)?.kind();
            let bytes = self.values.get(offset..offset + kind.width())?;
            values.push(kind.decode(bytes)?);
            offset += kind.width();
        }
        (offset == self.values.len()).then_some(values)
    }
}
