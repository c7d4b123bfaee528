//! Measurement vector stream: append-only, single writer, many readers.
//!
//! The writer ([`MeasurementVectorStream`]) is an owned value; only its holder can
//! append or reset. Readers ([`StreamReader`]) are cheap clones that load the
//! latest published [`StreamSnapshot`].
//!
//! # Publication
//!
//! Samples are stored in sealed chunks of [`CHUNK_LEN`] shared behind `Arc`s
//! plus an open tail. Every append publishes a new snapshot by swapping one
//! `Arc` pointer under a `parking_lot::RwLock`; readers hold the lock only long
//! enough to clone that pointer. A snapshot never changes after it is taken,
//! and appends never copy sealed history.

use crate::clock::{Clock, MonotonicClock};
use crate::error::StreamError;
use crate::measurement::sample::MeasurementSample;
use crate::protocol::response::DecodedReading;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Samples per sealed chunk.
pub const CHUNK_LEN: usize = 256;

/// Immutable point-in-time view of a stream.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    sealed: Arc<Vec<Arc<[MeasurementSample]>>>,
    tail: Arc<[MeasurementSample]>,
    len: usize,
    generation: u64,
}

impl Default for StreamSnapshot {
    fn default() -> Self {
        Self {
            sealed: Arc::new(Vec::new()),
            tail: Arc::from(Vec::new()),
            len: 0,
            generation: 0,
        }
    }
}

impl StreamSnapshot {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the snapshot holds no samples.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Session generation; bumped by every reset.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Samples in sequence order.
    pub fn iter(&self) -> impl Iterator<Item = &MeasurementSample> + '_ {
        self.sealed
            .iter()
            .flat_map(|chunk| chunk.iter())
            .chain(self.tail.iter())
    }

    /// Sample at `index`.
    pub fn get(&self, index: usize) -> Option<&MeasurementSample> {
        if index >= self.len {
            return None;
        }
        let sealed_len = self.sealed.len() * CHUNK_LEN;
        if index < sealed_len {
            self.sealed
                .get(index / CHUNK_LEN)
                .and_then(|chunk| chunk.get(index % CHUNK_LEN))
        } else {
            self.tail.get(index - sealed_len)
        }
    }

    /// First sample.
    pub fn first(&self) -> Option<&MeasurementSample> {
        self.get(0)
    }

    /// Most recent sample.
    pub fn last(&self) -> Option<&MeasurementSample> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// The last `n` samples in order; `n` is clamped to the available count.
    pub fn latest(&self, n: usize) -> Vec<MeasurementSample> {
        let n = n.min(self.len);
        (self.len - n..self.len)
            .filter_map(|i| self.get(i).cloned())
            .collect()
    }

    /// Copy of every sample.
    pub fn to_vec(&self) -> Vec<MeasurementSample> {
        self.iter().cloned().collect()
    }
}

type Published = Arc<RwLock<Arc<StreamSnapshot>>>;

/// Read-only handle on a stream.
#[derive(Debug, Clone)]
pub struct StreamReader {
    published: Published,
    count_rx: watch::Receiver<usize>,
}

impl StreamReader {
    /// Consistent view of everything appended so far.
    pub fn snapshot(&self) -> Arc<StreamSnapshot> {
        self.published.read().clone()
    }

    /// The last `n` samples.
    pub fn latest(&self, n: usize) -> Vec<MeasurementSample> {
        self.snapshot().latest(n)
    }

    /// Current sample count.
    pub fn len(&self) -> usize {
        self.published.read().len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Receiver of the sample count, updated on every append and reset.
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.count_rx.clone()
    }
}

/// Writer side of the measurement stream.
pub struct MeasurementVectorStream {
    clock: Arc<dyn Clock>,
    sealed: Arc<Vec<Arc<[MeasurementSample]>>>,
    tail: Vec<MeasurementSample>,
    next_sequence: u64,
    last_timestamp: Option<Instant>,
    generation: u64,
    published: Published,
    count_tx: watch::Sender<usize>,
}

impl std::fmt::Debug for MeasurementVectorStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeasurementVectorStream")
            .field("len", &self.len())
            .field("next_sequence", &self.next_sequence)
            .field("generation", &self.generation)
            .finish()
    }
}

impl Default for MeasurementVectorStream {
    fn default() -> Self {
        Self::new()
    }
}

impl MeasurementVectorStream {
    /// Empty stream timestamped by the system monotonic clock.
    pub fn new() -> Self {
        Self::with_clock(MonotonicClock)
    }

    /// Empty stream timestamped by `clock`.
    pub fn with_clock<C: Clock + 'static>(clock: C) -> Self {
        let (count_tx, _) = watch::channel(0);
        Self {
            clock: Arc::new(clock),
            sealed: Arc::new(Vec::new()),
            tail: Vec::with_capacity(CHUNK_LEN),
            next_sequence: 0,
            last_timestamp: None,
            generation: 0,
            published: Arc::new(RwLock::new(Arc::new(StreamSnapshot::default()))),
            count_tx,
        }
    }

    /// New read-only handle.
    pub fn reader(&self) -> StreamReader {
        StreamReader {
            published: Arc::clone(&self.published),
            count_rx: self.count_tx.subscribe(),
        }
    }

    /// Append a reading, assigning the next sequence number and a timestamp.
    ///
    /// A rejected reading does not consume a sequence number.
    pub fn append(&mut self, reading: DecodedReading) -> Result<MeasurementSample, StreamError> {
        if !reading.pressure.is_finite() {
            return Err(StreamError::NonFinite {
                field: "pressure",
                value: reading.pressure,
            });
        }
        if let Some(t) = reading.temperature.filter(|t| !t.is_finite()) {
            return Err(StreamError::NonFinite {
                field: "temperature",
                value: t,
            });
        }

        let mut timestamp = self.clock.now();
        if let Some(last) = self.last_timestamp {
            if timestamp <= last {
                timestamp = last + Duration::from_nanos(1);
            }
        }

        let sample = MeasurementSample {
            sequence_number: self.next_sequence,
            timestamp,
            pressure: reading.pressure,
            temperature: reading.temperature,
            raw_frame: reading.source_frame.map(|f| f.payload().clone()),
        };

        self.tail.push(sample.clone());
        if self.tail.len() == CHUNK_LEN {
            let chunk: Arc<[MeasurementSample]> = std::mem::take(&mut self.tail).into();
            let mut sealed = Vec::with_capacity(self.sealed.len() + 1);
            sealed.extend(self.sealed.iter().cloned());
            sealed.push(chunk);
            self.sealed = Arc::new(sealed);
            self.tail.reserve(CHUNK_LEN);
        }

        self.next_sequence += 1;
        self.last_timestamp = Some(timestamp);
        self.publish();
        Ok(sample)
    }

    /// Clear all samples and restart numbering at zero. Call only between sessions.
    pub fn reset(&mut self) {
        self.sealed = Arc::new(Vec::new());
        self.tail.clear();
        self.next_sequence = 0;
        self.last_timestamp = None;
        self.generation += 1;
        self.publish();
        tracing::debug!(generation = self.generation, "Measurement stream reset");
    }

    /// Consistent view of everything appended so far.
    pub fn snapshot(&self) -> Arc<StreamSnapshot> {
        self.published.read().clone()
    }

    /// The last `n` samples.
    pub fn latest(&self, n: usize) -> Vec<MeasurementSample> {
        self.snapshot().latest(n)
    }

    /// Number of samples.
    pub fn len(&self) -> usize {
        self.sealed.len() * CHUNK_LEN + self.tail.len()
    }

    /// Whether the stream is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sequence number the next accepted reading will get.
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    /// Session generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    fn publish(&self) {
        let snapshot = Arc::new(StreamSnapshot {
            sealed: Arc::clone(&self.sealed),
            tail: self.tail.as_slice().into(),
            len: self.len(),
            generation: self.generation,
        });
        *self.published.write() = snapshot;
        self.count_tx.send_replace(self.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn stream() -> (MeasurementVectorStream, ManualClock) {
        let clock = ManualClock::new();
        (MeasurementVectorStream::with_clock(clock.clone()), clock)
    }

    #[test]
    fn sequence_numbers_are_gap_free_and_restart_after_reset() {
        let (mut stream, clock) = stream();
        for i in 0..5 {
            clock.advance_secs(1.0);
            let s = stream.append(DecodedReading::new(100.0 - i as f64)).unwrap();
            assert_eq!(s.sequence_number, i);
        }
        stream.reset();
        assert!(stream.is_empty());
        assert_eq!(stream.generation(), 1);
        let s = stream.append(DecodedReading::new(1.0)).unwrap();
        assert_eq!(s.sequence_number, 0);
    }

    #[test]
    fn rejected_reading_does_not_consume_sequence_number() {
        let (mut stream, _clock) = stream();
        stream.append(DecodedReading::new(1.0)).unwrap();
        let err = stream.append(DecodedReading::new(f64::NAN)).unwrap_err();
        assert!(matches!(err, StreamError::NonFinite { field: "pressure", .. }));
        let err = stream
            .append(DecodedReading::new(1.0).with_temperature(f64::INFINITY))
            .unwrap_err();
        assert!(matches!(
            err,
            StreamError::NonFinite {
                field: "temperature",
                ..
            }
        ));
        assert_eq!(stream.append(DecodedReading::new(2.0)).unwrap().sequence_number, 1);
    }

    #[test]
    fn timestamps_strictly_increase_with_a_stalled_clock() {
        let (mut stream, _clock) = stream();
        let a = stream.append(DecodedReading::new(1.0)).unwrap();
        let b = stream.append(DecodedReading::new(1.0)).unwrap();
        assert!(b.timestamp > a.timestamp);
    }

    #[test]
    fn snapshot_is_isolated_from_later_appends() {
        let (mut stream, clock) = stream();
        stream.append(DecodedReading::new(1.0)).unwrap();
        let reader = stream.reader();
        let before = reader.snapshot();

        for _ in 0..(CHUNK_LEN * 2 + 3) {
            clock.advance_secs(0.1);
            stream.append(DecodedReading::new(2.0)).unwrap();
        }

        assert_eq!(before.len(), 1);
        assert_eq!(before.to_vec().len(), 1);
        assert_eq!(reader.len(), CHUNK_LEN * 2 + 4);
    }

    #[test]
    fn indexing_across_chunk_boundaries() {
        let (mut stream, _clock) = stream();
        let total = CHUNK_LEN + 10;
        for i in 0..total {
            stream.append(DecodedReading::new(i as f64)).unwrap();
        }
        let snap = stream.snapshot();
        assert_eq!(snap.len(), total);
        for (i, sample) in snap.iter().enumerate() {
            assert_eq!(sample.sequence_number, i as u64);
            assert_eq!(snap.get(i), Some(sample));
        }
        assert!(snap.get(total).is_none());
        assert_eq!(snap.last().unwrap().pressure, (total - 1) as f64);
    }

    #[test]
    fn latest_is_clamped_and_ordered() {
        let (mut stream, _clock) = stream();
        for i in 0..4 {
            stream.append(DecodedReading::new(i as f64)).unwrap();
        }
        let last_two: Vec<f64> = stream.latest(2).iter().map(|s| s.pressure).collect();
        assert_eq!(last_two, vec![2.0, 3.0]);
        assert_eq!(stream.latest(100).len(), 4);
        assert!(stream.latest(0).is_empty());
    }

    #[test]
    fn subscribers_see_count_changes() {
        let (mut stream, _clock) = stream();
        let mut rx = stream.reader().subscribe();
        stream.append(DecodedReading::new(1.0)).unwrap();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), 1);
        stream.reset();
        assert_eq!(*rx.borrow_and_update(), 0);
    }
}
