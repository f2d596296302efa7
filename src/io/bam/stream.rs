//! Background record decoding with cooperative cancellation.
//!
//! [`RecordStream`] moves a [`BamReader`] onto its own thread, which decodes
//! records into a bounded channel. The consumer iterates the stream like any
//! other record iterator; a full channel blocks the decoder, so memory stays
//! bounded by the channel capacity.
//!
//! # Example
//!
//! ```no_run
//! use biobam::io::bam::BamReader;
//!
//! # fn main() -> biobam::Result<()> {
//! let bam = BamReader::from_path("alignments.bam")?;
//! let stream = bam.into_stream(256);
//! let token = stream.token().clone();
//!
//! for record in stream {
//!     let record = record?;
//!     if record.name == "stop-here" {
//!         token.cancel();
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use super::reader::BamReader;
use super::record::Record;
use crate::error::Result;
use crossbeam_channel::{bounded, Receiver};
use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::debug;

/// Default number of decoded records buffered between threads.
pub const DEFAULT_STREAM_CAPACITY: usize = 256;

/// Shared flag checked between records.
///
/// Clones observe the same flag. Cancellation is one-way.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    /// Create a token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Records decoded on a worker thread.
///
/// Yields records in file order. A decode error or cancellation is
/// delivered as the final item. Dropping the stream cancels the worker and
/// joins it.
pub struct RecordStream {
    receiver: Option<Receiver<Result<Record>>>,
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RecordStream {
    /// Start decoding `reader` into a channel of `capacity` records.
    pub fn spawn<R: Read + Send + 'static>(reader: BamReader<R>, capacity: usize) -> Self {
        Self::with_token(reader, capacity, CancellationToken::new())
    }

    /// Like [`RecordStream::spawn`], observing an existing token.
    pub fn with_token<R: Read + Send + 'static>(
        mut reader: BamReader<R>,
        capacity: usize,
        token: CancellationToken,
    ) -> Self {
        let (sender, receiver) = bounded(capacity);
        let worker_token = token.clone();

        let handle = thread::spawn(move || {
            let mut sent = 0u64;
            for item in reader.records_with_cancel(&worker_token) {
                let last = item.is_err();
                if sender.send(item).is_err() {
                    break;
                }
                sent += 1;
                if last {
                    break;
                }
            }
            debug!(sent, cancelled = worker_token.is_cancelled(), "record stream worker exiting");
        });

        Self {
            receiver: Some(receiver),
            token,
            handle: Some(handle),
        }
    }

    /// Token controlling the worker.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Stop the worker after its current record.
    pub fn cancel(&self) {
        self.token.cancel();
    }
}

impl Iterator for RecordStream {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.receiver.as_ref()?.recv().ok()
    }
}

impl Drop for RecordStream {
    fn drop(&mut self) {
        self.token.cancel();
        // Disconnect so a worker blocked on a full channel wakes up
        self.receiver.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl<R: Read + Send + 'static> BamReader<R> {
    /// Decode the remaining records on a worker thread.
    pub fn into_stream(self, capacity: usize) -> RecordStream {
        RecordStream::spawn(self, capacity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BiobamError;
    use crate::io::bam::{BamWriter, CigarOp, Header, Reference};
    use std::io::Cursor;

    fn bam_with(count: i32) -> Vec<u8> {
        let header = Header::new(vec![Reference::new("chr1", 10_000_000)]);
        let mut writer = BamWriter::new(Vec::new(), &header).unwrap();
        for i in 0..count {
            let mut record = Record::new();
            record.name = format!("read{}", i);
            record.reference_id = Some(0);
            record.position = Some(1 + i * 10);
            record.sequence = b"ACGTACGT".to_vec();
            record.cigar = vec![CigarOp::Match(8)];
            writer.write_record(&record).unwrap();
        }
        writer.finish().unwrap().0
    }

    #[test]
    fn test_token_shared_between_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn test_stream_yields_all_records_in_order() {
        let bam = BamReader::new(Cursor::new(bam_with(500))).unwrap();
        let names: Vec<String> = bam.into_stream(8).map(|r| r.unwrap().name).collect();
        assert_eq!(names.len(), 500);
        assert_eq!(names[0], "read0");
        assert_eq!(names[499], "read499");
    }

    #[test]
    fn test_stream_cancel_ends_with_cancelled() {
        let bam = BamReader::new(Cursor::new(bam_with(10_000))).unwrap();
        let mut stream = bam.into_stream(4);
        assert!(stream.next().unwrap().is_ok());

        stream.cancel();
        let rest: Vec<_> = stream.by_ref().collect();
        assert!(rest.len() < 10_000);
        assert!(matches!(rest.last(), Some(Err(BiobamError::Cancelled))));
    }

    #[test]
    fn test_drop_mid_stream_joins_worker() {
        let bam = BamReader::new(Cursor::new(bam_with(5_000))).unwrap();
        let mut stream = bam.into_stream(2);
        assert!(stream.next().is_some());
        drop(stream);
    }
}
