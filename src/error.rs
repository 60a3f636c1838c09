//! Error taxonomy for the housekeeping service and the error reporting
//! collaborator that records it.
//!
//! Acceptance errors reject a whole request before any mutation. Execution
//! start errors are reported per batch item. Internal errors flag defects
//! and never originate from ground input.

use crate::message::Message;
use heapless::Deque;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};

pub const ERROR_LOG_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum AcceptanceError {
    #[error("request ended before all declared fields were read")]
    MessageTooShort,
    #[error("request envelope does not match the addressed service")]
    UnacceptableMessage,
}

impl AcceptanceError {
    pub fn code(self) -> u16 {
        match self {
            AcceptanceError::MessageTooShort => 1,
            AcceptanceError::UnacceptableMessage => 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ExecutionStartError {
    #[error("parameter does not exist in the catalog")]
    UnknownParameter,
    #[error("housekeeping structure does not exist")]
    UnknownStructure,
    #[error("housekeeping structure already exists")]
    DuplicateStructure,
    #[error("cannot delete a structure with periodic generation enabled")]
    DeleteOfEnabledStructure,
    #[error("parameter already present in the structure")]
    DuplicateParameter,
    #[error("cannot append to a structure with periodic generation enabled")]
    AppendToEnabledStructure,
    #[error("maximum number of housekeeping structures reached")]
    StructureCapacityExceeded,
    #[error("maximum number of parameters in the structure reached")]
    ParameterCapacityExceeded,
}

impl ExecutionStartError {
    pub fn code(self) -> u16 {
        match self {
            ExecutionStartError::UnknownParameter => 8,
            ExecutionStartError::UnknownStructure => 24,
            ExecutionStartError::DuplicateStructure => 25,
            ExecutionStartError::DeleteOfEnabledStructure => 26,
            ExecutionStartError::DuplicateParameter => 27,
            ExecutionStartError::AppendToEnabledStructure => 28,
            ExecutionStartError::StructureCapacityExceeded => 29,
            ExecutionStartError::ParameterCapacityExceeded => 30,
        }
    }

    /// Both capacity variants are the `CapacityExceeded` kind.
    pub fn is_capacity(self) -> bool {
        matches!(
            self,
            ExecutionStartError::StructureCapacityExceeded | ExecutionStartError::ParameterCapacityExceeded
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum InternalError {
    #[error("report exceeds the maximum message size")]
    MessageTooLarge,
    #[error("message type not handled by this service")]
    OtherMessageType,
    #[error("housekeeping structure vanished after validation")]
    NonExistentHousekeeping,
    #[error("structure references a parameter missing from the catalog")]
    NonExistentParameter,
}

impl InternalError {
    pub fn code(self) -> u16 {
        match self {
            InternalError::MessageTooLarge => 1,
            InternalError::OtherMessageType => 9,
            InternalError::NonExistentHousekeeping => 13,
            InternalError::NonExistentParameter => 14,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum ServiceError {
    #[error("acceptance failure: {0}")]
    Acceptance(#[from] AcceptanceError),
    #[error("execution start failure: {0}")]
    ExecutionStart(#[from] ExecutionStartError),
    #[error("internal failure: {0}")]
    Internal(#[from] InternalError),
}

/// Identity of the request an error was raised against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestId {
    pub service_type: u8,
    pub message_type: u8,
    pub application_id: u16,
}

impl From<&Message> for RequestId {
    fn from(message: &Message) -> Self {
        Self {
            service_type: message.service_type,
            message_type: message.message_type,
            application_id: message.application_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub request: Option<RequestId>,
    pub error: ServiceError,
}

/// Sink for taxonomy entries. Reporting never terminates the caller.
pub trait ErrorReporter {
    fn report_acceptance(&mut self, request: &Message, error: AcceptanceError);
    fn report_execution_start(&mut self, request: &Message, error: ExecutionStartError);
    fn report_internal(&mut self, error: InternalError);
}

/// Bounded error history; the oldest entry is dropped when full.
#[derive(Debug, Default)]
pub struct ErrorLog {
    records: Deque<ErrorRecord, ERROR_LOG_CAPACITY>,
    total_reported: u32,
}

impl ErrorLog {
    pub fn new() -> Self {
        Self {
            records: Deque::new(),
            total_reported: 0,
        }
    }

    fn record(&mut self, record: ErrorRecord) {
        if self.records.is_full() {
            self.records.pop_front();
        }
        let _ = self.records.push_back(record);
        self.total_reported = self.total_reported.wrapping_add(1);
    }

    /// Retained records, oldest first.
    pub fn records(&self) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter()
    }

    /// The `count` most recent records, oldest first.
    pub fn latest(&self, count: usize) -> impl Iterator<Item = &ErrorRecord> {
        self.records.iter().skip(self.records.len().saturating_sub(count))
    }

    pub fn count(&self) -> usize {
        self.records.len()
    }

    pub fn total_reported(&self) -> u32 {
        self.total_reported
    }

    pub fn count_of(&self, error: impl Into<ServiceError>) -> usize {
        let error = error.into();
        self.records.iter().filter(|record| record.error == error).count()
    }

    pub fn last(&self) -> Option<&ErrorRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

impl ErrorReporter for ErrorLog {
    fn report_acceptance(&mut self, request: &Message, error: AcceptanceError) {
        warn!(
            service = request.service_type,
            message = request.message_type,
            code = error.code(),
            "request rejected: {}", error
        );
        self.record(ErrorRecord {
            request: Some(RequestId::from(request)),
            error: error.into(),
        });
    }

    fn report_execution_start(&mut self, request: &Message, error: ExecutionStartError) {
        warn!(
            service = request.service_type,
            message = request.message_type,
            code = error.code(),
            "execution start failed: {}", error
        );
        self.record(ErrorRecord {
            request: Some(RequestId::from(request)),
            error: error.into(),
        });
    }

    fn report_internal(&mut self, error: InternalError) {
        error!(code = error.code(), "internal error: {}", error);
        self.record(ErrorRecord {
            request: None,
            error: error.into(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_log_counts_by_kind() {
        let mut log = ErrorLog::new();
        let request = Message::telecommand(3, 3);

        log.report_execution_start(&request, ExecutionStartError::UnknownStructure);
        log.report_execution_start(&request, ExecutionStartError::UnknownStructure);
        log.report_internal(InternalError::NonExistentHousekeeping);

        assert_eq!(log.count(), 3);
        assert_eq!(log.count_of(ExecutionStartError::UnknownStructure), 2);
        assert_eq!(log.count_of(InternalError::NonExistentHousekeeping), 1);
        let records: Vec<_> = log.records().collect();
        assert_eq!(records[0].request.map(|r| r.message_type), Some(3));
        assert!(records[2].request.is_none());
        assert_eq!(log.latest(1).count(), 1);
        assert!(log.latest(1).all(|r| r.request.is_none()));
    }

    #[test]
    fn test_error_log_drops_oldest_when_full() {
        let mut log = ErrorLog::new();
        let request = Message::telecommand(3, 1);

        log.report_acceptance(&request, AcceptanceError::UnacceptableMessage);
        for _ in 0..ERROR_LOG_CAPACITY {
            log.report_execution_start(&request, ExecutionStartError::DuplicateStructure);
        }

        assert_eq!(log.count(), ERROR_LOG_CAPACITY);
        assert_eq!(log.count_of(AcceptanceError::UnacceptableMessage), 0);
        assert_eq!(log.records().count(), ERROR_LOG_CAPACITY);
        assert_eq!(log.latest(ERROR_LOG_CAPACITY + 5).count(), ERROR_LOG_CAPACITY);
        assert_eq!(log.total_reported(), ERROR_LOG_CAPACITY as u32 + 1);
    }

    #[test]
    fn test_ecss_codes() {
        assert_eq!(ExecutionStartError::UnknownStructure.code(), 24);
        assert_eq!(ExecutionStartError::ParameterCapacityExceeded.code(), 30);
        assert_eq!(AcceptanceError::UnacceptableMessage.code(), 5);
        assert_eq!(InternalError::NonExistentHousekeeping.code(), 13);
        assert!(ExecutionStartError::StructureCapacityExceeded.is_capacity());
    }
}
