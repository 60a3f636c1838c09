use crate::message::Message;
use heapless::Deque;
use tracing::{debug, warn};

pub const REPORT_QUEUE_CAPACITY: usize = 32;

/// Onward delivery of fully encoded reports.
pub trait MessageTransport {
    fn store_message(&mut self, report: Message);
}

/// Downlink buffer holding reports until the driver drains them.
///
/// When full, the oldest report is discarded to make room.
#[derive(Debug)]
pub struct ReportQueue {
    reports: Deque<Message, REPORT_QUEUE_CAPACITY>,
    total_stored: u32,
    total_dropped: u32,
}

impl ReportQueue {
    pub fn new() -> Self {
        Self {
            reports: Deque::new(),
            total_stored: 0,
            total_dropped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Message> {
        self.reports.iter().nth(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Message> {
        self.reports.iter()
    }

    pub fn pop(&mut self) -> Option<Message> {
        self.reports.pop_front()
    }

    /// Count queued reports of the given message type.
    pub fn count_of_type(&self, message_type: u8) -> usize {
        self.reports.iter().filter(|r| r.message_type == message_type).count()
    }

    pub fn total_stored(&self) -> u32 {
        self.total_stored
    }

    pub fn total_dropped(&self) -> u32 {
        self.total_dropped
    }

    pub fn clear(&mut self) {
        self.reports.clear();
    }
}

impl Default for ReportQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageTransport for ReportQueue {
    fn store_message(&mut self, report: Message) {
        if self.reports.is_full() {
            self.reports.pop_front();
            self.total_dropped = self.total_dropped.wrapping_add(1);
            warn!("report queue full, dropped oldest report");
        }

        debug!(
            service = report.service_type,
            message = report.message_type,
            bytes = report.len(),
            "report stored"
        );
        let _ = self.reports.push_back(report);
        self.total_stored = self.total_stored.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_preserves_order() {
        let mut queue = ReportQueue::new();
        queue.store_message(Message::telemetry(3, 10));
        queue.store_message(Message::telemetry(3, 25));

        assert_eq!(queue.get(0).map(|r| r.message_type), Some(10));
        assert_eq!(queue.pop().map(|r| r.message_type), Some(10));
        assert_eq!(queue.pop().map(|r| r.message_type), Some(25));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_queue_drops_oldest_when_full() {
        let mut queue = ReportQueue::new();
        for index in 0..=REPORT_QUEUE_CAPACITY {
            let mut report = Message::telemetry(3, 25);
            report.append_u8(index as u8).unwrap();
            queue.store_message(report);
        }

        assert_eq!(queue.len(), REPORT_QUEUE_CAPACITY);
        assert_eq!(queue.total_dropped(), 1);
        assert_eq!(queue.get(0).map(|r| r.data()[0]), Some(1));
    }
}
