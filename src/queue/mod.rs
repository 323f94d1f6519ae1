//! Strictly-FIFO, memory-budget-aware row correlation queue.
//!
//! The queue buffers a serialized snapshot of every input row sent to the
//! external worker so each result row can be re-joined with its original.
//! Logically it is one FIFO queue; physically it is an ordered set of
//! in-memory pages plus an optional spill file that always holds the
//! oldest unread rows. Growing the page set requests bytes from the task's
//! memory manager; a denied request spills the oldest pages and retries
//! rather than exceeding the budget.

mod spill;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::error::{BridgeError, Result};
use crate::memory::TaskContext;
use crate::queue::spill::SpillFile;
use crate::types::Row;

/// Default page size for buffered row images.
pub const DEFAULT_PAGE_SIZE: usize = 64 * 1024;

/// Bytes of framing per record: `[len u32][crc32 u32]`.
pub(crate) const RECORD_HEADER_LEN: usize = 8;

/// One in-memory page of framed row records.
#[derive(Debug)]
struct RowPage {
    buf: Vec<u8>,
    /// Byte position of the next unread record.
    read_off: usize,
    /// Bytes charged against the memory budget for this page.
    granted: usize,
    /// Unread records remaining in this page.
    rows: u64,
}

impl RowPage {
    fn new(granted: usize) -> Self {
        RowPage {
            buf: Vec::with_capacity(granted),
            read_off: 0,
            granted,
            rows: 0,
        }
    }

    fn fits(&self, record_len: usize) -> bool {
        self.buf.len() + record_len <= self.granted
    }

    fn unread(&self) -> &[u8] {
        &self.buf[self.read_off..]
    }

    fn is_exhausted(&self) -> bool {
        self.read_off >= self.buf.len()
    }
}

/// Statistics about queue activity.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueueStats {
    /// Rows appended over the queue's lifetime.
    pub rows_added: u64,
    /// Rows removed over the queue's lifetime.
    pub rows_removed: u64,
    /// Number of spill events (pages or records written to disk).
    pub spill_count: u64,
    /// Total bytes written to the spill file.
    pub spilled_bytes: u64,
    /// Bytes currently charged against the memory budget.
    pub in_memory_bytes: usize,
}

/// A strictly-FIFO buffer of in-flight input rows with transparent spill.
#[derive(Debug)]
pub struct HybridRowQueue {
    ctx: Arc<TaskContext>,
    pages: VecDeque<RowPage>,
    spill: Option<SpillFile>,
    spill_path: PathBuf,
    page_size: usize,
    rows_added: u64,
    rows_removed: u64,
    /// Unread rows currently held by the spill file.
    spilled_unread: u64,
    spill_count: u64,
    spilled_bytes: u64,
    closed: bool,
}

impl HybridRowQueue {
    /// Creates a queue charged against the given task's memory budget,
    /// spilling into the task's private temporary area.
    #[must_use]
    pub fn new(ctx: Arc<TaskContext>) -> Self {
        Self::with_page_size(ctx, DEFAULT_PAGE_SIZE)
    }

    /// Creates a queue with an explicit page size.
    #[must_use]
    pub fn with_page_size(ctx: Arc<TaskContext>, page_size: usize) -> Self {
        let spill_path = ctx.spill_path();
        HybridRowQueue {
            ctx,
            pages: VecDeque::new(),
            spill: None,
            spill_path,
            page_size: page_size.max(RECORD_HEADER_LEN + 1),
            rows_added: 0,
            rows_removed: 0,
            spilled_unread: 0,
            spill_count: 0,
            spilled_bytes: 0,
            closed: false,
        }
    }

    /// Returns the number of rows currently buffered.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.rows_added - self.rows_removed
    }

    /// Returns true if no rows are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns queue statistics.
    #[must_use]
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            rows_added: self.rows_added,
            rows_removed: self.rows_removed,
            spill_count: self.spill_count,
            spilled_bytes: self.spilled_bytes,
            in_memory_bytes: self.pages.iter().map(|p| p.granted).sum(),
        }
    }

    /// Returns true if the queue has spilled at least once.
    #[must_use]
    pub fn has_spilled(&self) -> bool {
        self.spill_count > 0
    }

    /// Appends a serialized copy of the row.
    ///
    /// Never drops a row: if the memory budget denies a fresh page, the
    /// oldest pages spill to the backing file; if the budget cannot grant
    /// even one page, the record writes through to the file directly.
    ///
    /// # Errors
    ///
    /// Returns an error if the row cannot be serialized or spill I/O
    /// fails. Memory pressure itself is never an error.
    pub fn add(&mut self, row: &Row) -> Result<()> {
        self.ensure_open("add")?;
        let payload = bincode::serialize(row)
            .map_err(|e| BridgeError::SerializationError(format!("row encode failed: {e}")))?;
        let payload_len = u32::try_from(payload.len()).map_err(|_| {
            BridgeError::SerializationError("row image exceeds u32 length range".to_string())
        })?;
        let mut record = Vec::with_capacity(RECORD_HEADER_LEN + payload.len());
        record.extend_from_slice(&payload_len.to_le_bytes());
        record.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
        record.extend_from_slice(&payload);

        self.write_record(&record)?;
        self.rows_added += 1;
        Ok(())
    }

    /// Returns and discards the oldest not-yet-removed row.
    ///
    /// # Errors
    ///
    /// Returns a protocol violation when removing past the last added row,
    /// or a spill/checksum error if a spilled record cannot be read back.
    pub fn remove(&mut self) -> Result<Row> {
        self.ensure_open("remove")?;
        if self.rows_removed == self.rows_added {
            return Err(BridgeError::remove_past_end(
                self.rows_added,
                self.rows_removed + 1,
            ));
        }

        let payload = if self.spilled_unread > 0 {
            let spill = self.spill.as_mut().expect("spilled rows imply a file");
            let payload = spill.read_record()?;
            self.spilled_unread -= 1;
            payload
        } else {
            self.read_from_pages()?
        };

        let row = bincode::deserialize(&payload)
            .map_err(|e| BridgeError::SerializationError(format!("row decode failed: {e}")))?;
        self.rows_removed += 1;
        Ok(row)
    }

    /// Releases all in-memory pages and deletes any spill file.
    ///
    /// Idempotent; also runs via `Drop` as a backstop, and is intended to
    /// be registered as a task-completion hook so the release happens on
    /// every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error if the spill file cannot be deleted; in-memory
    /// pages are released regardless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut freed = 0usize;
        for page in self.pages.drain(..) {
            freed += page.granted;
            self.ctx.memory().release(page.granted);
        }
        debug!(
            task_id = self.ctx.task_id(),
            freed_bytes = freed,
            "row queue closed"
        );
        if let Some(spill) = self.spill.take() {
            spill.delete()?;
        }
        Ok(())
    }

    fn ensure_open(&self, op: &str) -> Result<()> {
        if self.closed {
            return Err(BridgeError::UnsupportedOperation(format!(
                "{op} on a closed row queue"
            )));
        }
        Ok(())
    }

    /// Appends one framed record, growing or spilling the page set.
    fn write_record(&mut self, record: &[u8]) -> Result<()> {
        if let Some(page) = self.pages.back_mut() {
            if page.fits(record.len()) {
                page.buf.extend_from_slice(record);
                page.rows += 1;
                return Ok(());
            }
        }

        // The record needs a fresh page; oversized rows get a page of
        // their own.
        let wanted = self.page_size.max(record.len());
        loop {
            if self.ctx.memory().try_allocate(wanted) {
                let mut page = RowPage::new(wanted);
                page.buf.extend_from_slice(record);
                page.rows += 1;
                self.pages.push_back(page);
                return Ok(());
            }
            if let Some(oldest) = self.pages.pop_front() {
                self.spill_page(oldest)?;
            } else {
                // Budget cannot hold even one page: write straight through.
                // All buffered rows are already on disk, so order holds.
                self.append_to_spill(record, 1)?;
                return Ok(());
            }
        }
    }

    /// Moves the unread remainder of one page to the spill file and
    /// releases its memory grant.
    fn spill_page(&mut self, page: RowPage) -> Result<()> {
        if !page.is_exhausted() {
            let unread = page.unread().to_vec();
            self.append_to_spill(&unread, page.rows)?;
        }
        self.ctx.memory().release(page.granted);
        Ok(())
    }

    fn append_to_spill(&mut self, bytes: &[u8], rows: u64) -> Result<()> {
        if self.spill.is_none() {
            debug!(
                task_id = self.ctx.task_id(),
                path = %self.spill_path.display(),
                "memory budget exhausted, spilling row queue to disk"
            );
            self.spill = Some(SpillFile::create(&self.spill_path)?);
        }
        let spill = self.spill.as_mut().expect("just created");
        spill.append(bytes)?;
        self.spilled_unread += rows;
        self.spill_count += 1;
        self.spilled_bytes += bytes.len() as u64;
        Ok(())
    }

    /// Reads the oldest record from the in-memory page set.
    fn read_from_pages(&mut self) -> Result<Vec<u8>> {
        let page = self
            .pages
            .front_mut()
            .ok_or_else(|| BridgeError::SpillError("row accounting out of sync".to_string()))?;

        let header_end = page.read_off + RECORD_HEADER_LEN;
        let header: [u8; RECORD_HEADER_LEN] = page.buf[page.read_off..header_end]
            .try_into()
            .expect("8-byte window");
        let len = u32::from_le_bytes(header[0..4].try_into().expect("4-byte window")) as usize;
        let expected_crc = u32::from_le_bytes(header[4..8].try_into().expect("4-byte window"));

        let payload = page.buf[header_end..header_end + len].to_vec();
        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            return Err(BridgeError::ChecksumError(format!(
                "buffered record expected {expected_crc:#010x}, got {actual_crc:#010x}"
            )));
        }

        page.read_off = header_end + len;
        page.rows -= 1;
        if page.is_exhausted() {
            let page = self.pages.pop_front().expect("front page exists");
            self.ctx.memory().release(page.granted);
        }
        Ok(payload)
    }
}

impl Drop for HybridRowQueue {
    fn drop(&mut self) {
        // Backstop only; the owning pipeline closes explicitly.
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Value;
    use tempfile::TempDir;

    fn row(i: i64) -> Row {
        Row::new(vec![Value::Int64(i), Value::String(format!("row-{i}"))])
    }

    fn context(budget: usize, temp: &TempDir) -> Arc<TaskContext> {
        Arc::new(TaskContext::new(1, budget, temp.path()))
    }

    #[test]
    fn test_fifo_in_memory() {
        let temp = TempDir::new().unwrap();
        let mut queue = HybridRowQueue::new(context(0, &temp));
        for i in 0..100 {
            queue.add(&row(i)).unwrap();
        }
        assert_eq!(queue.len(), 100);
        for i in 0..100 {
            assert_eq!(queue.remove().unwrap(), row(i));
        }
        assert!(queue.is_empty());
        assert!(!queue.has_spilled());
        queue.close().unwrap();
    }

    #[test]
    fn test_remove_past_end_is_protocol_violation() {
        let temp = TempDir::new().unwrap();
        let mut queue = HybridRowQueue::new(context(0, &temp));
        queue.add(&row(1)).unwrap();
        queue.remove().unwrap();
        assert!(matches!(
            queue.remove(),
            Err(BridgeError::ProtocolViolation { .. })
        ));
    }

    #[test]
    fn test_spill_preserves_fifo() {
        let temp = TempDir::new().unwrap();
        // Budget below two pages forces at least one spill.
        let ctx = context(300, &temp);
        let mut queue = HybridRowQueue::with_page_size(Arc::clone(&ctx), 256);
        for i in 0..200 {
            queue.add(&row(i)).unwrap();
        }
        assert!(queue.has_spilled());
        assert!(queue.stats().spilled_bytes > 0);
        for i in 0..200 {
            assert_eq!(queue.remove().unwrap(), row(i));
        }
        queue.close().unwrap();
    }

    #[test]
    fn test_interleaved_add_remove_across_spill() {
        let temp = TempDir::new().unwrap();
        let ctx = context(300, &temp);
        let mut queue = HybridRowQueue::with_page_size(ctx, 256);
        let mut next_add = 0i64;
        let mut next_remove = 0i64;
        // Alternate bursts of adds and removes to cross tier boundaries.
        for burst in 0..20 {
            for _ in 0..(5 + burst % 3) {
                queue.add(&row(next_add)).unwrap();
                next_add += 1;
            }
            for _ in 0..(3 + burst % 2) {
                assert_eq!(queue.remove().unwrap(), row(next_remove));
                next_remove += 1;
            }
        }
        while next_remove < next_add {
            assert_eq!(queue.remove().unwrap(), row(next_remove));
            next_remove += 1;
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn test_write_through_when_budget_below_one_page() {
        let temp = TempDir::new().unwrap();
        let ctx = context(16, &temp); // smaller than any page
        let mut queue = HybridRowQueue::with_page_size(ctx, 256);
        for i in 0..50 {
            queue.add(&row(i)).unwrap();
        }
        assert!(queue.has_spilled());
        assert_eq!(queue.stats().in_memory_bytes, 0);
        for i in 0..50 {
            assert_eq!(queue.remove().unwrap(), row(i));
        }
    }

    #[test]
    fn test_oversized_row_gets_own_page() {
        let temp = TempDir::new().unwrap();
        let mut queue = HybridRowQueue::with_page_size(context(0, &temp), 64);
        let big = Row::new(vec![Value::Binary(vec![7u8; 4096])]);
        queue.add(&big).unwrap();
        queue.add(&row(1)).unwrap();
        assert_eq!(queue.remove().unwrap(), big);
        assert_eq!(queue.remove().unwrap(), row(1));
    }

    #[test]
    fn test_close_deletes_spill_file_and_releases_memory() {
        let temp = TempDir::new().unwrap();
        let ctx = context(300, &temp);
        let mut queue = HybridRowQueue::with_page_size(Arc::clone(&ctx), 256);
        for i in 0..100 {
            queue.add(&row(i)).unwrap();
        }
        assert!(queue.has_spilled());
        let spilled: Vec<_> = std::fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        assert_eq!(spilled.len(), 1);

        queue.close().unwrap();
        assert_eq!(ctx.memory().used(), 0);
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);

        // close() is idempotent.
        queue.close().unwrap();
    }

    #[test]
    fn test_operations_on_closed_queue_fail() {
        let temp = TempDir::new().unwrap();
        let mut queue = HybridRowQueue::new(context(0, &temp));
        queue.close().unwrap();
        assert!(queue.add(&row(1)).is_err());
        assert!(queue.remove().is_err());
    }

    #[test]
    fn test_drop_cleans_up_spill_file() {
        let temp = TempDir::new().unwrap();
        {
            let ctx = context(300, &temp);
            let mut queue = HybridRowQueue::with_page_size(ctx, 256);
            for i in 0..100 {
                queue.add(&row(i)).unwrap();
            }
            assert!(queue.has_spilled());
        }
        assert_eq!(std::fs::read_dir(temp.path()).unwrap().count(), 0);
    }
}
