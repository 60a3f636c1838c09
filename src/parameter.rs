//! Typed parameter store.
//!
//! Parameters are memory cells holding exactly one of the supported value
//! kinds. The catalog is a flat arena indexed by [`ParameterId`]; housekeeping
//! structures keep IDs into it and never copy parameter storage.

use crate::message::{Message, MessageError};
use heapless::{Deque, Vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MAX_PARAMETERS: usize = 64;
pub const MAX_PARAMETER_SAMPLES: usize = 16;

pub type ParameterId = u16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterKind {
    U8,
    U16,
    U32,
    F32,
}

impl ParameterKind {
    /// Encoded width in bytes.
    pub fn width(self) -> usize {
        match self {
            ParameterKind::U8 => 1,
            ParameterKind::U16 => 2,
            ParameterKind::U32 | ParameterKind::F32 => 4,
        }
    }

    pub fn zero(self) -> ParameterValue {
        match self {
            ParameterKind::U8 => ParameterValue::U8(0),
            ParameterKind::U16 => ParameterValue::U16(0),
            ParameterKind::U32 => ParameterValue::U32(0),
            ParameterKind::F32 => ParameterValue::F32(0.0),
        }
    }

    /// Decode a big-endian value of this kind. `None` unless `bytes` has exactly the native width.
    pub fn decode(self, bytes: &[u8]) -> Option<ParameterValue> {
        if bytes.len() != self.width() {
            return None;
        }

        let value = match self {
            ParameterKind::U8 => ParameterValue::U8(bytes[0]),
            ParameterKind::U16 => ParameterValue::U16(u16::from_be_bytes([bytes[0], bytes[1]])),
            ParameterKind::U32 => {
                ParameterValue::U32(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
            ParameterKind::F32 => {
                ParameterValue::F32(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
            }
        };
        Some(value)
    }

    pub fn read_from(self, message: &mut Message) -> Result<ParameterValue, MessageError> {
        Ok(match self {
            ParameterKind::U8 => ParameterValue::U8(message.read_u8()?),
            ParameterKind::U16 => ParameterValue::U16(message.read_u16()?),
            ParameterKind::U32 => ParameterValue::U32(message.read_u32()?),
            ParameterKind::F32 => ParameterValue::F32(message.read_f32()?),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ParameterValue {
    U8(u8),
    U16(u16),
    U32(u32),
    F32(f32),
}

impl ParameterValue {
    pub fn kind(&self) -> ParameterKind {
        match self {
            ParameterValue::U8(_) => ParameterKind::U8,
            ParameterValue::U16(_) => ParameterKind::U16,
            ParameterValue::U32(_) => ParameterKind::U32,
            ParameterValue::F32(_) => ParameterKind::F32,
        }
    }

    /// Bit-exact big-endian bytes at the native width.
    pub fn to_be_bytes(&self) -> Vec<u8, 4> {
        let mut bytes = Vec::new();
        let result = match *self {
            ParameterValue::U8(v) => bytes.extend_from_slice(&[v]),
            ParameterValue::U16(v) => bytes.extend_from_slice(&v.to_be_bytes()),
            ParameterValue::U32(v) => bytes.extend_from_slice(&v.to_be_bytes()),
            ParameterValue::F32(v) => bytes.extend_from_slice(&v.to_be_bytes()),
        };
        debug_assert!(result.is_ok(), "parameter values are at most 4 bytes wide");
        bytes
    }

    pub fn append_to(&self, message: &mut Message) -> Result<(), MessageError> {
        match *self {
            ParameterValue::U8(v) => message.append_u8(v),
            ParameterValue::U16(v) => message.append_u16(v),
            ParameterValue::U32(v) => message.append_u32(v),
            ParameterValue::F32(v) => message.append_f32(v),
        }
    }

    /// Lossless for the integer kinds.
    pub fn as_f64(&self) -> f64 {
        match *self {
            ParameterValue::U8(v) => f64::from(v),
            ParameterValue::U16(v) => f64::from(v),
            ParameterValue::U32(v) => f64::from(v),
            ParameterValue::F32(v) => f64::from(v),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ParameterError {
    #[error("parameter {0} does not exist")]
    NotFound(ParameterId),
    #[error("value of kind {found:?} written to a {expected:?} parameter")]
    KindMismatch { expected: ParameterKind, found: ParameterKind },
    #[error("parameter catalog is full")]
    CatalogFull,
    #[error("no retained sample at index {0}")]
    NoSample(usize),
    #[error(transparent)]
    Message(#[from] MessageError),
}

#[derive(Debug, Clone)]
pub struct Parameter {
    value: ParameterValue,
    samples: Deque<ParameterValue, MAX_PARAMETER_SAMPLES>,
    sample_count: u16,
}

impl Parameter {
    pub fn new(initial: ParameterValue) -> Self {
        Self {
            value: initial,
            samples: Deque::new(),
            sample_count: 0,
        }
    }

    pub fn kind(&self) -> ParameterKind {
        self.value.kind()
    }

    pub fn get(&self) -> ParameterValue {
        self.value
    }

    pub fn set(&mut self, value: ParameterValue) -> Result<(), ParameterError> {
        let expected = self.kind();
        if value.kind() != expected {
            return Err(ParameterError::KindMismatch { expected, found: value.kind() });
        }
        self.value = value;
        Ok(())
    }

    /// Overwrite the current value with the next native-width field of `message`.
    pub fn set_from_message(&mut self, message: &mut Message) -> Result<(), ParameterError> {
        self.value = self.kind().read_from(message)?;
        Ok(())
    }

    pub fn append_to_message(&self, message: &mut Message) -> Result<(), MessageError> {
        self.value.append_to(message)
    }

    pub fn value_as_f64(&self) -> f64 {
        self.value.as_f64()
    }

    /// Record a sample without touching the current value. When the ring is
    /// full the oldest sample is dropped.
    pub fn store_sample(&mut self, sample: ParameterValue) -> Result<(), ParameterError> {
        let expected = self.kind();
        if sample.kind() != expected {
            return Err(ParameterError::KindMismatch { expected, found: sample.kind() });
        }

        if self.samples.is_full() {
            self.samples.pop_front();
        }
        let _ = self.samples.push_back(sample);
        self.sample_count = self.sample_count.wrapping_add(1);
        Ok(())
    }

    /// Total samples stored since the last clear, including dropped ones.
    pub fn sample_count(&self) -> u16 {
        self.sample_count
    }

    /// Retained sample by age, 0 being the oldest still held.
    pub fn sample(&self, index: usize) -> Option<ParameterValue> {
        self.samples.iter().nth(index).copied()
    }

    pub fn retained_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn append_sample_to_message(&self, message: &mut Message, index: usize) -> Result<(), ParameterError> {
        let sample = self.sample(index).ok_or(ParameterError::NoSample(index))?;
        sample.append_to(message)?;
        Ok(())
    }

    pub fn clear_samples(&mut self) {
        self.samples.clear();
        self.sample_count = 0;
    }
}

/// Process-wide parameter arena. IDs are dense positions in registration order.
#[derive(Debug, Clone, Default)]
pub struct ParameterCatalog {
    parameters: Vec<Parameter, MAX_PARAMETERS>,
}

impl ParameterCatalog {
    pub fn new() -> Self {
        Self { parameters: Vec::new() }
    }

    pub fn with_values<I>(values: I) -> Result<Self, ParameterError>
    where
        I: IntoIterator<Item = ParameterValue>,
    {
        let mut catalog = Self::new();
        for value in values {
            catalog.register(value)?;
        }
        Ok(catalog)
    }

    pub fn register(&mut self, initial: ParameterValue) -> Result<ParameterId, ParameterError> {
        let id = self.parameters.len() as ParameterId;
        self.parameters
            .push(Parameter::new(initial))
            .map_err(|_| ParameterError::CatalogFull)?;
        Ok(id)
    }

    pub fn get(&self, id: ParameterId) -> Option<&Parameter> {
        self.parameters.get(usize::from(id))
    }

    pub fn get_mut(&mut self, id: ParameterId) -> Option<&mut Parameter> {
        self.parameters.get_mut(usize::from(id))
    }

    pub fn count(&self) -> usize {
        self.parameters.len()
    }

    pub fn contains(&self, id: ParameterId) -> bool {
        usize::from(id) < self.parameters.len()
    }

    pub fn set(&mut self, id: ParameterId, value: ParameterValue) -> Result<(), ParameterError> {
        self.get_mut(id).ok_or(ParameterError::NotFound(id))?.set(value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ParameterId, &Parameter)> {
        self.parameters
            .iter()
            .enumerate()
            .map(|(index, parameter)| (index as ParameterId, parameter))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_distinguishes_missing_from_zero() {
        let catalog = ParameterCatalog::with_values([ParameterValue::U8(0)]).unwrap();

        assert_eq!(catalog.get(0).map(Parameter::get), Some(ParameterValue::U8(0)));
        assert!(catalog.get(1).is_none());
        assert!(!catalog.contains(1));
    }

    #[test]
    fn test_set_rejects_other_kind() {
        let mut parameter = Parameter::new(ParameterValue::U16(7));

        let result = parameter.set(ParameterValue::U32(7));
        assert_eq!(
            result,
            Err(ParameterError::KindMismatch { expected: ParameterKind::U16, found: ParameterKind::U32 })
        );
        assert_eq!(parameter.get(), ParameterValue::U16(7));
    }

    #[test]
    fn test_native_width_encoding() {
        assert_eq!(ParameterValue::U8(3).to_be_bytes().as_slice(), &[3]);
        assert_eq!(ParameterValue::U16(0x0102).to_be_bytes().as_slice(), &[1, 2]);
        assert_eq!(ParameterValue::U32(0x0102_0304).to_be_bytes().as_slice(), &[1, 2, 3, 4]);
        assert_eq!(ParameterValue::F32(-2.5).to_be_bytes().as_slice(), &(-2.5f32).to_be_bytes());
    }

    #[test]
    fn test_decode_requires_exact_width() {
        assert_eq!(ParameterKind::U16.decode(&[0, 9]), Some(ParameterValue::U16(9)));
        assert_eq!(ParameterKind::U16.decode(&[9]), None);
        assert_eq!(ParameterKind::F32.decode(&1.5f32.to_be_bytes()), Some(ParameterValue::F32(1.5)));
    }

    #[test]
    fn test_sample_ring_drops_oldest() {
        let mut parameter = Parameter::new(ParameterValue::U8(0));
        for value in 0..(MAX_PARAMETER_SAMPLES as u8 + 4) {
            parameter.store_sample(ParameterValue::U8(value)).unwrap();
        }

        assert_eq!(parameter.retained_samples(), MAX_PARAMETER_SAMPLES);
        assert_eq!(parameter.sample_count(), MAX_PARAMETER_SAMPLES as u16 + 4);
        assert_eq!(parameter.sample(0), Some(ParameterValue::U8(4)));
        // Live value is independent of samples
        assert_eq!(parameter.get(), ParameterValue::U8(0));
    }

    #[test]
    fn test_catalog_capacity() {
        let mut catalog = ParameterCatalog::new();
        for _ in 0..MAX_PARAMETERS {
            catalog.register(ParameterValue::U8(1)).unwrap();
        }
        assert_eq!(catalog.register(ParameterValue::U8(1)), Err(ParameterError::CatalogFull));
    }
}
