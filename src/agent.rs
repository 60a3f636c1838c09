use crate::config::{BootConfig, ConfigError};
use crate::error::{ErrorLog, ServiceError};
use crate::message::Message;
use crate::parameter::ParameterCatalog;
use crate::scheduler::{SchedulerStats, TickState, Timestamp};
use crate::service::{HousekeepingService, ServiceContext};
use crate::transport::{ReportQueue, REPORT_QUEUE_CAPACITY};
use heapless::{spsc::Queue, Vec};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

// spsc queues hold one element less than their size
const REQUEST_QUEUE_SIZE: usize = 16;

type RequestQueue = Queue<Message, REQUEST_QUEUE_SIZE>;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AgentState {
    pub requests_processed: u32,
    pub requests_rejected: u32,
    pub ticks: u32,
    pub reports_delivered: u32,
    pub last_error: Option<ServiceError>,
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("request queue full")]
    RequestQueueFull,
    #[error("request failed: {0}")]
    Request(#[from] ServiceError),
    #[error("invalid boot configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Context object owning the catalog, the housekeeping service and its collaborators.
///
/// Requests and scheduler ticks both go through `&mut self`, so a host running
/// them on separate tasks has to wrap the agent in a lock.
pub struct HousekeepingAgent {
    catalog: ParameterCatalog,
    service: HousekeepingService,
    reports: ReportQueue,
    errors: ErrorLog,
    request_queue: RequestQueue,
    tick: TickState,
    state: AgentState,
}

impl HousekeepingAgent {
    pub fn new(catalog: ParameterCatalog) -> Self {
        Self {
            catalog,
            service: HousekeepingService::new(),
            reports: ReportQueue::new(),
            errors: ErrorLog::new(),
            request_queue: Queue::new(),
            tick: TickState::new(),
            state: AgentState::default(),
        }
    }

    /// Build the catalog and boot structures described by `config`.
    pub fn from_config(config: &BootConfig) -> Result<Self, AgentError> {
        let catalog = config.build_catalog()?;
        let mut agent = Self::new(catalog);
        config.install_structures(agent.service.registry_mut())?;

        info!(
            parameters = agent.catalog.count(),
            structures = agent.service.registry().len(),
            "housekeeping agent configured"
        );
        Ok(agent)
    }

    pub fn queue_request(&mut self, request: Message) -> Result<(), AgentError> {
        // NASA Rule 5: Safety assertion for queue capacity
        debug_assert!(
            self.request_queue.len() <= self.request_queue.capacity(),
            "Request queue length {} beyond capacity {}",
            self.request_queue.len(),
            self.request_queue.capacity()
        );

        self.request_queue
            .enqueue(request)
            .map_err(|_| AgentError::RequestQueueFull)
    }

    /// Execute every queued request in arrival order. Returns how many ran.
    pub fn process_requests(&mut self) -> usize {
        let mut processed = 0;
        while let Some(mut request) = self.request_queue.dequeue() {
            // Failures are already recorded in the error log and agent state
            let _ = self.handle_request(&mut request);
            processed += 1;
        }
        processed
    }

    /// Execute one request immediately, bypassing the queue.
    pub fn handle_request(&mut self, request: &mut Message) -> Result<(), AgentError> {
        let Self {
            catalog,
            service,
            reports,
            errors,
            state,
            ..
        } = self;
        let mut ctx = ServiceContext::new(catalog, reports, errors);

        state.requests_processed = state.requests_processed.saturating_add(1);
        match service.execute(request, &mut ctx) {
            Ok(()) => Ok(()),
            Err(error) => {
                state.requests_rejected = state.requests_rejected.saturating_add(1);
                state.last_error = Some(error);
                Err(error.into())
            }
        }
    }

    /// Run one scheduler tick at `now` and return the delay before the next one.
    pub fn tick(&mut self, now: Timestamp) -> u32 {
        if now < self.tick.now {
            warn!(now, last = self.tick.now, "scheduler time went backwards");
        }
        self.tick.advance_to(now);

        let Self {
            catalog,
            service,
            reports,
            errors,
            tick,
            state,
            ..
        } = self;
        let mut ctx = ServiceContext::new(catalog, reports, errors);
        tick.delay = service.report_pending_structures(tick.now, tick.previous, tick.delay, &mut ctx);

        state.ticks = state.ticks.saturating_add(1);
        debug!(now, delay = tick.delay, "tick complete");
        tick.delay
    }

    /// Drain queued reports, oldest first.
    pub fn take_reports(&mut self) -> Vec<Message, REPORT_QUEUE_CAPACITY> {
        let mut drained = Vec::new();
        while let Some(report) = self.reports.pop() {
            // Both sides share the same capacity
            let _ = drained.push(report);
        }
        self.state.reports_delivered = self.state.reports_delivered.saturating_add(drained.len() as u32);
        drained
    }

    pub fn catalog(&self) -> &ParameterCatalog {
        &self.catalog
    }

    /// Live parameter values are updated by the onboard software between ticks.
    pub fn catalog_mut(&mut self) -> &mut ParameterCatalog {
        &mut self.catalog
    }

    pub fn service(&self) -> &HousekeepingService {
        &self.service
    }

    pub fn reports(&self) -> &ReportQueue {
        &self.reports
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    pub fn clear_errors(&mut self) {
        self.errors.clear();
    }

    pub fn tick_state(&self) -> &TickState {
        &self.tick
    }

    pub fn get_state(&self) -> &AgentState {
        &self.state
    }

    pub fn get_scheduler_stats(&self) -> &SchedulerStats {
        self.service.scheduler().get_stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::ParameterValue;

    fn agent() -> HousekeepingAgent {
        let catalog = ParameterCatalog::with_values([ParameterValue::U8(1), ParameterValue::U16(2)]).unwrap();
        HousekeepingAgent::new(catalog)
    }

    #[test]
    fn test_request_queue_bounded() {
        let mut agent = agent();
        let mut accepted = 0;
        loop {
            match agent.queue_request(Message::telecommand(3, 5)) {
                Ok(()) => accepted += 1,
                Err(AgentError::RequestQueueFull) => break,
                Err(other) => panic!("unexpected error {other}"),
            }
        }

        assert_eq!(accepted, REQUEST_QUEUE_SIZE - 1);
        assert_eq!(agent.process_requests(), accepted);
    }

    #[test]
    fn test_rejected_request_updates_state() {
        let mut agent = agent();
        let mut request = Message::telemetry(3, 1);

        assert!(agent.handle_request(&mut request).is_err());
        assert_eq!(agent.get_state().requests_rejected, 1);
        assert!(agent.get_state().last_error.is_some());
    }

    #[test]
    fn test_tick_threads_state() {
        let mut agent = agent();
        agent.tick(100);
        agent.tick(250);

        let tick = agent.tick_state();
        assert_eq!((tick.previous, tick.now), (100, 250));
        assert_eq!(tick.delay, crate::scheduler::NEVER);
        assert_eq!(agent.get_state().ticks, 2);
    }
}
