//! # PUS Housekeeping
//!
//! An ECSS PUS ST[03] housekeeping core for onboard software: report structure
//! management, periodic collection scheduling over heterogeneous intervals, a
//! typed parameter store, and the big-endian report encoding ground systems
//! decode byte for byte.
//!
//! ## Features
//!
//! - **Binary report codec**: fixed-capacity messages with independent read and write cursors
//! - **Typed parameter store**: u8/u16/u32/f32 cells with native-width encoding and sample rings
//! - **Structure registry**: bounded create/delete/append/modify with deterministic error order
//! - **Collection scheduler**: phase-stable due detection anchored at multiples of each interval
//! - **Embedded-friendly**: all onboard state lives in `heapless` containers
//!
//! ## Quick Start
//!
//! ```rust
//! use pus_housekeeping::{BootConfig, HousekeepingAgent, Message};
//!
//! let mut agent = HousekeepingAgent::from_config(&BootConfig::default()).unwrap();
//!
//! // Enable structure 1 (already enabled at boot, so this is a no-op)
//! let mut request = Message::telecommand(3, 5);
//! request.append_u8(1).unwrap();
//! request.append_u8(1).unwrap();
//! agent.handle_request(&mut request).unwrap();
//!
//! // Structure 1 collects every 500 ms
//! assert_eq!(agent.tick(0), 500);
//! assert_eq!(agent.tick(500), 500);
//! assert_eq!(agent.take_reports().len(), 1);
//! ```
//!
//! ## Architecture
//!
//! - [`message`] - Binary report codec
//! - [`parameter`] - Typed parameter store and catalog
//! - [`registry`] - Housekeeping structure registry
//! - [`scheduler`] - Periodic collection scheduling
//! - [`service`] - Request dispatcher and report generation
//! - [`report`] - Ground-side report decoding
//! - [`error`] - Error taxonomy and error reporting
//! - [`transport`] - Report delivery
//! - [`agent`] - Context object tying the above together
//! - [`config`] - Boot configuration
//! - [`frame`] - JSON line framing for the simulator link

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod agent;
pub mod config;
pub mod error;
pub mod frame;
pub mod message;
pub mod parameter;
pub mod registry;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod transport;

// Re-export main public types for convenience
pub use agent::{AgentError, HousekeepingAgent};
pub use config::BootConfig;
pub use error::{AcceptanceError, ErrorLog, ErrorReporter, ExecutionStartError, InternalError, ServiceError};
pub use message::{Message, PacketType};
pub use parameter::{ParameterCatalog, ParameterValue};
pub use registry::StructureRegistry;
pub use scheduler::NEVER;
pub use service::{HousekeepingMessageType, HousekeepingService, ServiceContext, SERVICE_TYPE};
pub use transport::{MessageTransport, ReportQueue};
