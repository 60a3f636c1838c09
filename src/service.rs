//! ST[03] housekeeping request dispatcher and report generation.

use crate::error::{AcceptanceError, ErrorReporter, ExecutionStartError, InternalError, ServiceError};
use crate::message::{Message, MessageError, PacketType, MAX_MESSAGE_SIZE};
use crate::parameter::{ParameterCatalog, ParameterId};
use crate::registry::{HousekeepingStructure, StructureId, StructureRegistry};
use crate::scheduler::{CollectionScheduler, TickState, Timestamp};
use crate::transport::MessageTransport;
use heapless::Vec;
use tracing::{debug, info};

pub const SERVICE_TYPE: u8 = 3;

type RequestParameterIds = Vec<ParameterId, { MAX_MESSAGE_SIZE / 2 }>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum HousekeepingMessageType {
    CreateHousekeepingReportStructure = 1,
    DeleteHousekeepingReportStructure = 3,
    EnablePeriodicHousekeepingParametersReport = 5,
    DisablePeriodicHousekeepingParametersReport = 6,
    ReportHousekeepingStructures = 9,
    HousekeepingStructuresReport = 10,
    HousekeepingParametersReport = 25,
    GenerateOneShotHousekeepingReport = 27,
    AppendParametersToHousekeepingStructure = 29,
    ModifyCollectionIntervalOfStructures = 31,
    ReportHousekeepingPeriodicProperties = 33,
    HousekeepingPeriodicPropertiesReport = 35,
}

impl TryFrom<u8> for HousekeepingMessageType {
    type Error = InternalError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        use HousekeepingMessageType::*;
        Ok(match value {
            1 => CreateHousekeepingReportStructure,
            3 => DeleteHousekeepingReportStructure,
            5 => EnablePeriodicHousekeepingParametersReport,
            6 => DisablePeriodicHousekeepingParametersReport,
            9 => ReportHousekeepingStructures,
            10 => HousekeepingStructuresReport,
            25 => HousekeepingParametersReport,
            27 => GenerateOneShotHousekeepingReport,
            29 => AppendParametersToHousekeepingStructure,
            31 => ModifyCollectionIntervalOfStructures,
            33 => ReportHousekeepingPeriodicProperties,
            35 => HousekeepingPeriodicPropertiesReport,
            _ => return Err(InternalError::OtherMessageType),
        })
    }
}

impl From<HousekeepingMessageType> for u8 {
    fn from(message_type: HousekeepingMessageType) -> Self {
        message_type as u8
    }
}

/// Collaborators a request or tick is executed against.
pub struct ServiceContext<'a> {
    pub catalog: &'a ParameterCatalog,
    pub transport: &'a mut dyn MessageTransport,
    pub errors: &'a mut dyn ErrorReporter,
}

impl<'a> ServiceContext<'a> {
    pub fn new(
        catalog: &'a ParameterCatalog,
        transport: &'a mut dyn MessageTransport,
        errors: &'a mut dyn ErrorReporter,
    ) -> Self {
        Self { catalog, transport, errors }
    }
}

fn too_short(_: MessageError) -> AcceptanceError {
    AcceptanceError::MessageTooShort
}

fn too_large(_: MessageError) -> InternalError {
    InternalError::MessageTooLarge
}

#[derive(Debug, Default)]
pub struct HousekeepingService {
    registry: StructureRegistry,
    scheduler: CollectionScheduler,
}

impl HousekeepingService {
    pub fn new() -> Self {
        Self {
            registry: StructureRegistry::new(),
            scheduler: CollectionScheduler::new(),
        }
    }

    pub fn registry(&self) -> &StructureRegistry {
        &self.registry
    }

    /// Direct registry access for boot-time setup and verification.
    pub fn registry_mut(&mut self) -> &mut StructureRegistry {
        &mut self.registry
    }

    pub fn scheduler(&self) -> &CollectionScheduler {
        &self.scheduler
    }

    /// Route a telecommand to its handler. Every failure is reported through
    /// `ctx.errors`; the returned error is the one that stopped the request, if any.
    pub fn execute(&mut self, request: &mut Message, ctx: &mut ServiceContext<'_>) -> Result<(), ServiceError> {
        if request.packet_type != PacketType::Telecommand || request.service_type != SERVICE_TYPE {
            ctx.errors.report_acceptance(request, AcceptanceError::UnacceptableMessage);
            return Err(AcceptanceError::UnacceptableMessage.into());
        }

        use HousekeepingMessageType::*;
        let result = match HousekeepingMessageType::try_from(request.message_type) {
            Ok(CreateHousekeepingReportStructure) => self.create_structure(request, ctx),
            Ok(DeleteHousekeepingReportStructure) => self.delete_structures(request, ctx),
            Ok(EnablePeriodicHousekeepingParametersReport) => self.set_periodic_generation(request, ctx, true),
            Ok(DisablePeriodicHousekeepingParametersReport) => self.set_periodic_generation(request, ctx, false),
            Ok(ReportHousekeepingStructures) => self.report_structures(request, ctx),
            Ok(GenerateOneShotHousekeepingReport) => self.generate_one_shot_reports(request, ctx),
            Ok(AppendParametersToHousekeepingStructure) => self.append_parameters(request, ctx),
            Ok(ModifyCollectionIntervalOfStructures) => self.modify_collection_intervals(request, ctx),
            Ok(ReportHousekeepingPeriodicProperties) => self.report_periodic_properties(request, ctx),
            // Report types are never valid as requests
            Ok(HousekeepingStructuresReport)
            | Ok(HousekeepingParametersReport)
            | Ok(HousekeepingPeriodicPropertiesReport)
            | Err(_) => {
                ctx.errors.report_internal(InternalError::OtherMessageType);
                return Err(InternalError::OtherMessageType.into());
            }
        };

        result.map_err(|error| {
            ctx.errors.report_acceptance(request, error);
            ServiceError::from(error)
        })
    }

    fn create_structure(&mut self, request: &mut Message, ctx: &mut ServiceContext<'_>) -> Result<(), AcceptanceError> {
        let id = request.read_u8().map_err(too_short)?;
        let interval = request.read_u32().map_err(too_short)?;

        if let Err(error) = self.registry.check_creatable(id) {
            ctx.errors.report_execution_start(request, error);
            return Ok(());
        }

        let count = request.read_u16().map_err(too_short)?;
        let mut parameter_ids = RequestParameterIds::new();
        for _ in 0..count {
            let parameter_id = request.read_u16().map_err(too_short)?;
            // A request payload cannot hold more IDs than the buffer
            let _ = parameter_ids.push(parameter_id);
        }

        match self.registry.create(id, interval, &parameter_ids) {
            Ok(outcome) if outcome.truncated > 0 => ctx
                .errors
                .report_execution_start(request, ExecutionStartError::ParameterCapacityExceeded),
            Ok(_) => {}
            Err(error) => ctx.errors.report_execution_start(request, error),
        }
        Ok(())
    }

    fn delete_structures(&mut self, request: &mut Message, ctx: &mut ServiceContext<'_>) -> Result<(), AcceptanceError> {
        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            if let Err(error) = self.registry.delete(id) {
                ctx.errors.report_execution_start(request, error);
            }
        }
        Ok(())
    }

    fn set_periodic_generation(
        &mut self,
        request: &mut Message,
        ctx: &mut ServiceContext<'_>,
        enabled: bool,
    ) -> Result<(), AcceptanceError> {
        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            let result = if enabled {
                self.registry.enable(id)
            } else {
                self.registry.disable(id)
            };
            if let Err(error) = result {
                ctx.errors.report_execution_start(request, error);
            }
        }
        Ok(())
    }

    fn append_parameters(&mut self, request: &mut Message, ctx: &mut ServiceContext<'_>) -> Result<(), AcceptanceError> {
        let id = request.read_u8().map_err(too_short)?;
        if let Err(error) = self.registry.check_appendable(id) {
            ctx.errors.report_execution_start(request, error);
            return Ok(());
        }

        let count = request.read_u16().map_err(too_short)?;
        for _ in 0..count {
            let parameter_id: ParameterId = request.read_u16().map_err(too_short)?;
            match self.registry.append_parameter(id, parameter_id, ctx.catalog.count()) {
                Ok(()) => {}
                Err(ExecutionStartError::ParameterCapacityExceeded) => {
                    ctx.errors
                        .report_execution_start(request, ExecutionStartError::ParameterCapacityExceeded);
                    // Capacity is a hard stop for the rest of the batch
                    break;
                }
                Err(error) => ctx.errors.report_execution_start(request, error),
            }
        }
        Ok(())
    }

    fn modify_collection_intervals(
        &mut self,
        request: &mut Message,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), AcceptanceError> {
        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            let interval = request.read_u32().map_err(too_short)?;
            if let Err(error) = self.registry.modify_interval(id, interval) {
                ctx.errors.report_execution_start(request, error);
            }
        }
        Ok(())
    }

    fn report_structures(&mut self, request: &mut Message, ctx: &mut ServiceContext<'_>) -> Result<(), AcceptanceError> {
        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            if !self.registry.structure_exists(id) {
                ctx.errors
                    .report_execution_start(request, ExecutionStartError::UnknownStructure);
                continue;
            }
            self.housekeeping_structure_report(id, ctx);
        }
        Ok(())
    }

    fn generate_one_shot_reports(
        &mut self,
        request: &mut Message,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), AcceptanceError> {
        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            if !self.registry.structure_exists(id) {
                ctx.errors
                    .report_execution_start(request, ExecutionStartError::UnknownStructure);
                continue;
            }
            self.housekeeping_parameters_report(id, ctx);
        }
        Ok(())
    }

    fn report_periodic_properties(
        &mut self,
        request: &mut Message,
        ctx: &mut ServiceContext<'_>,
    ) -> Result<(), AcceptanceError> {
        // First scan only counts; errors are reported on the replay
        let count = request.read_u8().map_err(too_short)?;
        let mut valid: u8 = 0;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            if self.registry.structure_exists(id) {
                valid += 1;
            }
        }
        request.reset_read();

        let mut report = Message::telemetry(
            SERVICE_TYPE,
            HousekeepingMessageType::HousekeepingPeriodicPropertiesReport.into(),
        );
        let mut overflow = report.append_u8(valid).is_err();

        let count = request.read_u8().map_err(too_short)?;
        for _ in 0..count {
            let id = request.read_u8().map_err(too_short)?;
            match self.registry.get(id) {
                Some(structure) => {
                    overflow |= append_periodic_properties(&mut report, structure).is_err();
                }
                None => ctx
                    .errors
                    .report_execution_start(request, ExecutionStartError::UnknownStructure),
            }
        }

        if overflow {
            ctx.errors.report_internal(InternalError::MessageTooLarge);
        } else {
            info!(structures = valid, "periodic properties report emitted");
            ctx.transport.store_message(report);
        }
        Ok(())
    }

    /// Encode the structure report TM[3,10] for an existing structure.
    pub fn build_structure_report(&self, id: StructureId) -> Result<Message, InternalError> {
        let structure = self.registry.describe(id)?;
        let mut report = Message::telemetry(
            SERVICE_TYPE,
            HousekeepingMessageType::HousekeepingStructuresReport.into(),
        );

        report.append_u8(structure.id).map_err(too_large)?;
        report.append_bool(structure.enabled).map_err(too_large)?;
        report.append_u32(structure.collection_interval).map_err(too_large)?;
        report
            .append_u16(structure.parameter_ids().len() as u16)
            .map_err(too_large)?;
        for &parameter_id in structure.parameter_ids() {
            report.append_u16(parameter_id).map_err(too_large)?;
        }
        Ok(report)
    }

    /// Encode the parameters report TM[3,25]. Parameters missing from the
    /// catalog are reported and left out.
    pub fn build_parameters_report(
        &self,
        id: StructureId,
        catalog: &ParameterCatalog,
        errors: &mut dyn ErrorReporter,
    ) -> Result<Message, InternalError> {
        let structure = self.registry.describe(id)?;
        let mut report = Message::telemetry(
            SERVICE_TYPE,
            HousekeepingMessageType::HousekeepingParametersReport.into(),
        );

        report.append_u8(structure.id).map_err(too_large)?;
        for &parameter_id in structure.parameter_ids() {
            match catalog.get(parameter_id) {
                Some(parameter) => parameter.append_to_message(&mut report).map_err(too_large)?,
                None => errors.report_internal(InternalError::NonExistentParameter),
            }
        }
        Ok(report)
    }

    /// Build and store a structure report; failures are internal errors.
    pub fn housekeeping_structure_report(&self, id: StructureId, ctx: &mut ServiceContext<'_>) {
        match self.build_structure_report(id) {
            Ok(report) => {
                info!(id, "housekeeping structure report emitted");
                ctx.transport.store_message(report);
            }
            Err(error) => ctx.errors.report_internal(error),
        }
    }

    /// Build and store a parameters report; failures are internal errors.
    pub fn housekeeping_parameters_report(&self, id: StructureId, ctx: &mut ServiceContext<'_>) {
        match self.build_parameters_report(id, ctx.catalog, &mut *ctx.errors) {
            Ok(report) => {
                debug!(id, bytes = report.len(), "housekeeping parameters report emitted");
                ctx.transport.store_message(report);
            }
            Err(error) => ctx.errors.report_internal(error),
        }
    }

    /// Emit a parameters report for every enabled structure due in
    /// `(previous, now]` and return the delay until the next one is due.
    /// `previous_delay` only feeds tick statistics.
    pub fn report_pending_structures(
        &mut self,
        now: Timestamp,
        previous: Timestamp,
        previous_delay: u32,
        ctx: &mut ServiceContext<'_>,
    ) -> u32 {
        let pending = self.scheduler.pending(&self.registry, now, previous);
        for &id in &pending {
            self.housekeeping_parameters_report(id, ctx);
        }

        let next_delay = self.scheduler.next_delay(&self.registry, now);
        let tick = TickState {
            now,
            previous,
            delay: previous_delay,
        };
        self.scheduler.record_tick(&tick, pending.len(), next_delay);
        next_delay
    }
}

fn append_periodic_properties(report: &mut Message, structure: &HousekeepingStructure) -> Result<(), MessageError> {
    report.append_u8(structure.id)?;
    report.append_bool(structure.enabled)?;
    report.append_u32(structure.collection_interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorLog;
    use crate::parameter::ParameterValue;
    use crate::transport::ReportQueue;

    fn catalog() -> ParameterCatalog {
        ParameterCatalog::with_values([
            ParameterValue::U8(3),
            ParameterValue::U16(7),
            ParameterValue::U32(10),
        ])
        .unwrap()
    }

    #[test]
    fn test_wrong_service_is_unacceptable() {
        let catalog = catalog();
        let mut queue = ReportQueue::new();
        let mut log = ErrorLog::new();
        let mut ctx = ServiceContext::new(&catalog, &mut queue, &mut log);
        let mut service = HousekeepingService::new();

        let mut request = Message::telecommand(20, 1);
        let result = service.execute(&mut request, &mut ctx);

        assert_eq!(result, Err(AcceptanceError::UnacceptableMessage.into()));
        assert_eq!(log.count_of(AcceptanceError::UnacceptableMessage), 1);
    }

    #[test]
    fn test_unknown_message_type_is_internal() {
        let catalog = catalog();
        let mut queue = ReportQueue::new();
        let mut log = ErrorLog::new();
        let mut ctx = ServiceContext::new(&catalog, &mut queue, &mut log);
        let mut service = HousekeepingService::new();

        let mut request = Message::telecommand(SERVICE_TYPE, 25);
        assert!(service.execute(&mut request, &mut ctx).is_err());
        let mut request = Message::telecommand(SERVICE_TYPE, 200);
        assert!(service.execute(&mut request, &mut ctx).is_err());

        assert_eq!(log.count_of(InternalError::OtherMessageType), 2);
    }

    #[test]
    fn test_parameters_report_uses_native_widths() {
        let catalog = catalog();
        let mut log = ErrorLog::new();
        let mut service = HousekeepingService::new();
        service.registry_mut().create(4, 0, &[2, 0, 1]).unwrap();

        let report = service.build_parameters_report(4, &catalog, &mut log).unwrap();
        assert_eq!(report.message_type, 25);
        assert_eq!(report.data(), &[4, 0, 0, 0, 10, 3, 0, 7]);
    }

    #[test]
    fn test_missing_parameter_is_skipped() {
        let catalog = catalog();
        let mut log = ErrorLog::new();
        let mut service = HousekeepingService::new();
        service.registry_mut().create(1, 0, &[0, 40]).unwrap();

        let report = service.build_parameters_report(1, &catalog, &mut log).unwrap();
        assert_eq!(report.data(), &[1, 3]);
        assert_eq!(log.count_of(InternalError::NonExistentParameter), 1);
    }

    #[test]
    fn test_describe_missing_structure() {
        let service = HousekeepingService::new();
        assert_eq!(service.build_structure_report(9), Err(InternalError::NonExistentHousekeeping));
    }
}
