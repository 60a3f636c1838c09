use pus_housekeeping::scheduler::Timestamp;
use pus_housekeeping::*;

struct Bench {
    catalog: ParameterCatalog,
    queue: ReportQueue,
    log: ErrorLog,
    service: HousekeepingService,
}

impl Bench {
    /// One enabled structure per interval, IDs in the order given.
    fn with_intervals(intervals: &[u32]) -> Self {
        let catalog = ParameterCatalog::with_values([ParameterValue::U16(0x0102), ParameterValue::F32(1.5)]).unwrap();
        let mut service = HousekeepingService::new();
        for (id, &interval) in intervals.iter().enumerate() {
            let registry = service.registry_mut();
            registry.create(id as u8, interval, &[0]).unwrap();
            registry.enable(id as u8).unwrap();
        }
        Self {
            catalog,
            queue: ReportQueue::new(),
            log: ErrorLog::new(),
            service,
        }
    }

    /// Run a tick and return the delay plus the IDs of the structures reported.
    fn advance(&mut self, now: Timestamp, previous: Timestamp, previous_delay: u32) -> (u32, Vec<u8>) {
        let mut ctx = ServiceContext::new(&self.catalog, &mut self.queue, &mut self.log);
        let delay = self.service.report_pending_structures(now, previous, previous_delay, &mut ctx);

        let mut reported = Vec::new();
        while let Some(report) = self.queue.pop() {
            assert!(report.is_of_type(PacketType::Telemetry, 3, 25));
            reported.push(report.data()[0]);
        }
        (delay, reported)
    }
}

#[test]
fn test_three_interval_scenario() {
    let mut bench = Bench::with_intervals(&[900, 1000, 2700]);

    assert_eq!(bench.advance(0, 0, 0), (900, vec![]));
    assert_eq!(bench.advance(900, 0, 900), (100, vec![0]));
    assert_eq!(bench.advance(1006, 900, 100), (794, vec![1]));
    assert_eq!(bench.advance(2700, 2015, 685), (300, vec![0, 2]));
}

#[test]
fn test_never_interval_never_reports() {
    let mut bench = Bench::with_intervals(&[NEVER, NEVER]);

    for now in [0, 1, 1000, 1 << 40] {
        assert_eq!(bench.advance(now, now / 2, NEVER), (NEVER, vec![]));
    }
}

#[test]
fn test_zero_interval_reports_every_tick() {
    let mut bench = Bench::with_intervals(&[0, 0]);

    for now in [0, 0, 5, 6] {
        assert_eq!(bench.advance(now, now, 0), (0, vec![0, 1]));
    }
}

#[test]
fn test_empty_registry_returns_never() {
    let mut bench = Bench::with_intervals(&[]);
    assert_eq!(bench.advance(100, 0, 0), (NEVER, vec![]));
}

#[test]
fn test_due_detection_is_idempotent() {
    let mut bench = Bench::with_intervals(&[100]);

    assert_eq!(bench.advance(100, 50, 50).1, vec![0]);
    // An empty window reports nothing new
    assert_eq!(bench.advance(100, 100, 100).1, Vec::<u8>::new());
}

#[test]
fn test_missed_boundaries_produce_one_report() {
    let mut bench = Bench::with_intervals(&[100]);

    let (delay, reported) = bench.advance(1050, 0, 100);
    assert_eq!(reported, vec![0]);
    // Phase stays anchored at multiples of the interval
    assert_eq!(delay, 50);
    assert_eq!(bench.service.scheduler().get_stats().late_ticks, 1);
}

#[test]
fn test_disabled_structures_are_skipped() {
    let mut bench = Bench::with_intervals(&[100, 300]);
    bench.service.registry_mut().disable(0).unwrap();

    assert_eq!(bench.advance(300, 0, 0), (300, vec![1]));
}

#[test]
fn test_interval_change_takes_effect_next_tick() {
    let mut bench = Bench::with_intervals(&[1000]);
    assert_eq!(bench.advance(0, 0, 0).0, 1000);

    bench.service.registry_mut().modify_interval(0, 250).unwrap();
    assert_eq!(bench.advance(260, 0, 1000), (240, vec![0]));
}

#[test]
fn test_reports_carry_current_values() {
    let mut bench = Bench::with_intervals(&[10]);
    bench.catalog.set(0, ParameterValue::U16(0xBEEF)).unwrap();

    let mut ctx = ServiceContext::new(&bench.catalog, &mut bench.queue, &mut bench.log);
    bench.service.report_pending_structures(10, 0, 10, &mut ctx);

    let report = bench.queue.pop().unwrap();
    assert_eq!(report.data(), &[0, 0xBE, 0xEF]);
}

#[test]
fn test_scheduler_stats_accumulate() {
    let mut bench = Bench::with_intervals(&[100, 200]);
    bench.advance(100, 0, 100);
    bench.advance(200, 100, 100);

    let stats = bench.service.scheduler().get_stats();
    assert_eq!(stats.total_ticks, 2);
    assert_eq!(stats.total_reports_triggered, 3);
    assert_eq!(stats.late_ticks, 0);
    assert_eq!(stats.last_delay, 100);
}
