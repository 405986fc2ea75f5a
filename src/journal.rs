use crate::op_counter::OpCounter;
use bytemuck::Pod;
use memmap2::{MmapMut, MmapOptions};
use std::cell::Cell;
use std::fs::OpenOptions;
use std::io;
use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::Ordering::{Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicU64, AtomicUsize};

/// Append-only record log over a memory map.
///
/// One writer appends fixed-size `Pod` records; any number of readers follow it
/// without locks. The write index is published with release ordering after the
/// record bytes are copied, so a reader never observes a partial record.
pub struct Journal<T: Pod + Send> {
    _mmap: Arc<MmapMut>,
    ptr: *mut u8,
    len: usize,
    write_index: Arc<AtomicUsize>,
    op_counter: Arc<OpCounter>,
    _marker: PhantomData<T>,
}

// The raw pointer targets the shared mapping kept alive by `_mmap`.
unsafe impl<T: Pod + Send> Send for Journal<T> {}

impl<T: Pod + Send> Journal<T> {
    /// In-memory journal holding up to `capacity` records.
    pub fn anonymous(capacity: usize, op_counter: Arc<OpCounter>) -> io::Result<Self> {
        let bytes = (capacity * size_of::<T>()).max(1);
        let mmap = MmapOptions::new().len(bytes).map_anon()?;
        Ok(Self::from_mmap(mmap, op_counter))
    }

    /// File-backed journal; an existing file at `path` is truncated.
    pub fn create(path: impl AsRef<Path>, capacity: usize, op_counter: Arc<OpCounter>) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len((capacity * size_of::<T>()).max(1) as u64)?;
        let mmap = unsafe { MmapOptions::new().map_mut(&file)? };
        Ok(Self::from_mmap(mmap, op_counter))
    }

    fn from_mmap(mut mmap: MmapMut, op_counter: Arc<OpCounter>) -> Self {
        let ptr = mmap.as_mut_ptr();
        let len = mmap.len();
        Self {
            _mmap: Arc::new(mmap),
            ptr,
            len,
            write_index: Arc::new(AtomicUsize::new(0)),
            op_counter,
            _marker: PhantomData,
        }
    }

    /// # Panics
    /// Panics when the journal is full. Capacity is fixed at construction.
    #[inline(always)]
    pub fn append(&mut self, item: &T) {
        let size = size_of::<T>();
        let pos = self.write_index.load(Relaxed);
        assert!(
            pos + size <= self.len,
            "Journal is full. Capacity: {} records",
            self.capacity()
        );
        unsafe {
            std::ptr::copy_nonoverlapping(bytemuck::bytes_of(item).as_ptr(), self.ptr.add(pos), size);
        }
        self.write_index.store(pos + size, Release);
    }

    pub fn reader(&self) -> JournalReader<T> {
        JournalReader {
            _mmap: self._mmap.clone(),
            ptr: self.ptr,
            write_index: self.write_index.clone(),
            next_index: Cell::new(0),
            op_count: self.op_counter.new_counter(),
            _marker: PhantomData,
        }
    }

    pub fn len(&self) -> usize {
        self.write_index.load(Acquire) / size_of::<T>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.len / size_of::<T>()
    }
}

/// Cursor over a [`Journal`]. Call [`JournalReader::next`] to advance, then read the
/// current record with [`JournalReader::get`] or [`JournalReader::with`].
pub struct JournalReader<T: Pod + Send> {
    _mmap: Arc<MmapMut>,
    ptr: *mut u8,
    write_index: Arc<AtomicUsize>,
    next_index: Cell<usize>,
    op_count: Arc<AtomicU64>,
    _marker: PhantomData<T>,
}

unsafe impl<T: Pod + Send> Send for JournalReader<T> {}

impl<T: Pod + Send> JournalReader<T> {
    #[inline(always)]
    fn published(&self) -> usize {
        self.write_index.load(Acquire) / size_of::<T>()
    }

    #[inline(always)]
    fn record(&self, index: usize) -> &T {
        let size = size_of::<T>();
        let bytes = unsafe { std::slice::from_raw_parts(self.ptr.add(index * size), size) };
        bytemuck::from_bytes(bytes)
    }

    /// Advances to the next record. Returns false when the writer has not published one yet.
    #[inline(always)]
    pub fn next(&self) -> bool {
        let index = self.next_index.get();
        if index >= self.published() {
            return false;
        }
        self.next_index.set(index + 1);
        self.op_count.fetch_add(1, Relaxed);
        true
    }

    /// Runs `handler` on the current record, `None` before the first `next`.
    #[inline(always)]
    pub fn with<R>(&self, handler: impl FnOnce(&T) -> R) -> Option<R> {
        let next = self.next_index.get();
        if next == 0 {
            return None;
        }
        Some(handler(self.record(next - 1)))
    }

    #[inline(always)]
    pub fn get(&self) -> Option<T> {
        self.with(|item| *item)
    }

    pub fn get_at(&self, index: usize) -> Option<T> {
        (index < self.published()).then(|| *self.record(index))
    }

    pub fn get_last(&self) -> Option<T> {
        self.published().checked_sub(1).map(|i| *self.record(i))
    }

    /// Records consumed so far.
    pub fn position(&self) -> usize {
        self.next_index.get()
    }

    /// Records published by the writer.
    pub fn size(&self) -> usize {
        self.published()
    }

    /// Records published but not yet consumed.
    pub fn pending(&self) -> usize {
        self.published() - self.next_index.get()
    }
}
