//! Batching for the publisher's delivery task.
//!
//! Records bound for the same partition accumulate in a [`BatchBuffer`] until
//! a size, byte or age threshold is met, then go to the sink as one `append`
//! call.
//!
//! ```text
//! publish(...) ──▶ BatchManager ──▶ ("transactions", 0) → BatchBuffer { 40 records }
//!                               ├─▶ ("transactions", 1) → BatchBuffer { 12 records }
//!                               └─▶ ...
//!
//!   flush on: records >= batch_size | bytes >= batch_max_bytes | age >= batch_timeout
//!             or explicit flush()/close()
//! ```
//!
//! Neither type is thread-safe; the delivery task owns them exclusively.

use bytes::Bytes;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

/// A record as handed to a [`RecordSink`](crate::RecordSink).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRecord {
    /// Optional record key
    pub key: Option<Bytes>,
    /// Record value (schema-framed unless published unvalidated)
    pub value: Bytes,
    /// Timestamp in milliseconds since Unix epoch
    pub timestamp: u64,
}

impl BatchRecord {
    pub fn new(key: Option<Bytes>, value: Bytes, timestamp: u64) -> Self {
        Self {
            key,
            value,
            timestamp,
        }
    }

    /// Total size = key_size + value_size + 16 bytes for timestamp and metadata
    pub fn size_bytes(&self) -> usize {
        let key_size = self.key.as_ref().map_or(0, |k| k.len());
        key_size + self.value.len() + 16
    }
}

/// A buffered record tagged with the publish sequence number whose
/// acknowledgement it will resolve.
#[derive(Debug, Clone)]
pub struct QueuedRecord {
    pub sequence: u64,
    pub record: BatchRecord,
}

/// Records drained for one partition: (topic, partition, records).
pub type ReadyBatch = (String, u32, Vec<QueuedRecord>);

/// Buffer for a single partition.
#[derive(Debug)]
pub struct BatchBuffer {
    records: Vec<QueuedRecord>,

    /// Sum of all record sizes
    size_bytes: usize,

    /// When the first record of the current batch arrived
    created_at: Instant,

    max_batch_size: usize,
    max_batch_bytes: usize,
    linger: Duration,
}

impl BatchBuffer {
    pub fn new(max_batch_size: usize, max_batch_bytes: usize, linger: Duration) -> Self {
        Self {
            records: Vec::with_capacity(max_batch_size.min(1024)),
            size_bytes: 0,
            created_at: Instant::now(),
            max_batch_size,
            max_batch_bytes,
            linger,
        }
    }

    pub fn append(&mut self, record: QueuedRecord) {
        if self.records.is_empty() {
            self.created_at = Instant::now();
        }
        self.size_bytes += record.record.size_bytes();
        self.records.push(record);
        trace!(
            record_count = self.records.len(),
            size_bytes = self.size_bytes,
            "Appended record to batch"
        );
    }

    /// Check if this batch should be flushed.
    ///
    /// `true` if the batch is non-empty and ANY of these hold:
    /// - record count >= max_batch_size
    /// - size in bytes >= max_batch_bytes
    /// - age >= linger
    pub fn should_flush(&self) -> bool {
        if self.records.is_empty() {
            return false;
        }

        if self.records.len() >= self.max_batch_size {
            trace!(
                record_count = self.records.len(),
                max_batch_size = self.max_batch_size,
                "Batch should flush: size threshold"
            );
            return true;
        }

        if self.size_bytes >= self.max_batch_bytes {
            trace!(
                size_bytes = self.size_bytes,
                max_batch_bytes = self.max_batch_bytes,
                "Batch should flush: bytes threshold"
            );
            return true;
        }

        let age = self.created_at.elapsed();
        if age >= self.linger {
            trace!(
                age_ms = age.as_millis(),
                linger_ms = self.linger.as_millis(),
                "Batch should flush: time threshold"
            );
            return true;
        }

        false
    }

    /// Take every buffered record, in append order, and reset the buffer.
    pub fn drain(&mut self) -> Vec<QueuedRecord> {
        let records = std::mem::take(&mut self.records);
        self.size_bytes = 0;
        self.created_at = Instant::now();
        debug!(record_count = records.len(), "Drained batch buffer");
        records
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn size_bytes(&self) -> usize {
        self.size_bytes
    }
}

/// Per-partition batch buffers keyed by (topic, partition).
#[derive(Debug)]
pub struct BatchManager {
    buffers: HashMap<(String, u32), BatchBuffer>,
    max_batch_size: usize,
    max_batch_bytes: usize,
    linger: Duration,
}

impl BatchManager {
    pub fn new(max_batch_size: usize, max_batch_bytes: usize, linger: Duration) -> Self {
        Self {
            buffers: HashMap::new(),
            max_batch_size,
            max_batch_bytes,
            linger,
        }
    }

    /// Append a record to its partition's buffer, creating the buffer on
    /// first use.
    pub fn append(&mut self, topic: &str, partition: u32, record: QueuedRecord) {
        let (max_batch_size, max_batch_bytes, linger) =
            (self.max_batch_size, self.max_batch_bytes, self.linger);
        self.buffers
            .entry((topic.to_string(), partition))
            .or_insert_with(|| BatchBuffer::new(max_batch_size, max_batch_bytes, linger))
            .append(record);
    }

    /// Drain every batch that meets a flush threshold.
    pub fn ready_batches(&mut self) -> Vec<ReadyBatch> {
        let mut ready = Vec::new();

        for ((topic, partition), buffer) in &mut self.buffers {
            if buffer.should_flush() {
                ready.push((topic.clone(), *partition, buffer.drain()));
            }
        }

        if !ready.is_empty() {
            debug!(batch_count = ready.len(), "Found ready batches");
        }
        ready
    }

    /// Drain every non-empty batch regardless of thresholds.
    pub fn flush_all(&mut self) -> Vec<ReadyBatch> {
        let mut all = Vec::new();

        for ((topic, partition), buffer) in &mut self.buffers {
            if !buffer.is_empty() {
                all.push((topic.clone(), *partition, buffer.drain()));
            }
        }

        debug!(batch_count = all.len(), "Flushed all batches");
        all
    }

    /// (partition_count, total_records, total_bytes)
    pub fn stats(&self) -> (usize, usize, usize) {
        let partition_count = self.buffers.len();
        let total_records: usize = self.buffers.values().map(|b| b.len()).sum();
        let total_bytes: usize = self.buffers.values().map(|b| b.size_bytes()).sum();
        (partition_count, total_records, total_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued(sequence: u64, value: &'static str) -> QueuedRecord {
        QueuedRecord {
            sequence,
            record: BatchRecord::new(Some(Bytes::from("ACC-1001")), Bytes::from(value), 0),
        }
    }

    #[test]
    fn test_batch_record_size() {
        let record = BatchRecord::new(Some(Bytes::from("key")), Bytes::from("value"), 1234567890);
        assert_eq!(record.size_bytes(), 3 + 5 + 16);

        let keyless = BatchRecord::new(None, Bytes::from("value"), 0);
        assert_eq!(keyless.size_bytes(), 5 + 16);
    }

    #[test]
    fn test_flush_on_size() {
        let mut buffer = BatchBuffer::new(3, 1024 * 1024, Duration::from_secs(60));
        buffer.append(queued(0, "a"));
        buffer.append(queued(1, "b"));
        assert!(!buffer.should_flush());

        buffer.append(queued(2, "c"));
        assert!(buffer.should_flush());
    }

    #[test]
    fn test_flush_on_bytes() {
        let mut buffer = BatchBuffer::new(100, 50, Duration::from_secs(60));
        buffer.append(queued(0, "a-fairly-long-value-that-fills-the-buffer"));
        assert!(buffer.should_flush());
    }

    #[test]
    fn test_flush_on_age() {
        let mut buffer = BatchBuffer::new(100, 1024 * 1024, Duration::from_millis(10));
        buffer.append(queued(0, "a"));
        std::thread::sleep(Duration::from_millis(20));
        assert!(buffer.should_flush());
    }

    #[test]
    fn test_empty_buffer_never_flushes() {
        let buffer = BatchBuffer::new(1, 1, Duration::ZERO);
        assert!(!buffer.should_flush());
    }

    #[test]
    fn test_drain_preserves_order_and_resets() {
        let mut buffer = BatchBuffer::new(100, 1024 * 1024, Duration::from_secs(60));
        for i in 0..5 {
            buffer.append(queued(i, "v"));
        }

        let drained: Vec<u64> = buffer.drain().into_iter().map(|q| q.sequence).collect();
        assert_eq!(drained, vec![0, 1, 2, 3, 4]);
        assert!(buffer.is_empty());
        assert_eq!(buffer.size_bytes(), 0);
    }

    #[test]
    fn test_manager_ready_batches() {
        let mut manager = BatchManager::new(2, 1024 * 1024, Duration::from_secs(60));
        manager.append("transactions", 0, queued(0, "a"));
        manager.append("transactions", 0, queued(1, "b"));
        manager.append("transactions", 1, queued(2, "c"));

        let ready = manager.ready_batches();
        assert_eq!(ready.len(), 1);
        let (topic, partition, records) = &ready[0];
        assert_eq!(topic, "transactions");
        assert_eq!(*partition, 0);
        assert_eq!(records.len(), 2);

        assert_eq!(manager.stats().1, 1);
    }

    #[test]
    fn test_manager_flush_all() {
        let mut manager = BatchManager::new(100, 1024 * 1024, Duration::from_secs(60));
        manager.append("transactions", 0, queued(0, "a"));
        manager.append("audit", 2, queued(1, "b"));

        let all = manager.flush_all();
        assert_eq!(all.len(), 2);
        assert_eq!(manager.stats(), (2, 0, 0));
        assert!(manager.flush_all().is_empty());
    }
}
