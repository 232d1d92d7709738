use std::{cell::RefCell, collections::BTreeMap, rc::Rc};

use futures::{
    future::{self, LocalBoxFuture, Shared},
    FutureExt,
};

use crate::{MemoryError, MemoryReader, ProcessError};

const PAGE_SIZE: u64 = 4096;

type ChunkTask = Shared<LocalBoxFuture<'static, Result<Rc<Vec<u8>>, MemoryError>>>;

struct Chunk {
    len: usize,
    task: ChunkTask,
}

/// Stores results of reads in case the same memory is read multiple times.
///
/// Reads are aligned out to 4 KiB pages and merged with neighbouring cached
/// chunks; concurrent requests into the same chunk share one pending read.
/// The cache is dropped whenever the process is stopped or resumed.
pub struct CachingReader<P> {
    inner: Rc<P>,
    chunks: RefCell<BTreeMap<u64, Chunk>>,
}

impl<P: MemoryReader + 'static> CachingReader<P> {
    /// Wrap `inner` with a chunk cache.
    pub fn new(inner: P) -> Self {
        CachingReader {
            inner: Rc::new(inner),
            chunks: RefCell::new(BTreeMap::new()),
        }
    }

    fn make_chunk(&self, start: u64, end: u64) -> (u64, usize, ChunkTask) {
        let len = (end - start) as usize;
        let inner = Rc::clone(&self.inner);
        let task: LocalBoxFuture<'static, Result<Rc<Vec<u8>>, MemoryError>> =
            Box::pin(async move { inner.read(start, len).await.map(Rc::new) });
        let task = task.shared();
        self.chunks.borrow_mut().insert(
            start,
            Chunk {
                len,
                task: task.clone(),
            },
        );
        (start, len, task)
    }

    /// Find or create the chunks covering `[address, address + len)`.
    fn collect_chunks(&self, address: u64, len: usize) -> Vec<(u64, usize, ChunkTask)> {
        let start_page = address & !(PAGE_SIZE - 1);
        let end_page = ((address + len as u64 - 1) & !(PAGE_SIZE - 1)) + PAGE_SIZE;
        let end = address + len as u64;

        let mut collected = Vec::new();

        // Reuse the cached chunk covering `address`, or create one reaching
        // to the next cached chunk or the end of the requested range.
        let (prev, next_start) = {
            let chunks = self.chunks.borrow();
            let prev = chunks
                .range(..=address)
                .next_back()
                .map(|(&start, chunk)| (start, chunk.len, chunk.task.clone()));
            let next_start = chunks.range(address + 1..).next().map(|(&start, _)| start);
            (prev, next_start)
        };
        let mut current = match prev {
            Some(chunk) if chunk.0 + chunk.1 as u64 > address => chunk,
            _ => match next_start {
                Some(next_start) if end > next_start => self.make_chunk(start_page, next_start),
                _ => self.make_chunk(start_page, end_page),
            },
        };
        collected.push(current.clone());

        while current.0 + (current.1 as u64) < end_page {
            let current_end = current.0 + current.1 as u64;
            let next = {
                let chunks = self.chunks.borrow();
                chunks
                    .range(current_end..)
                    .next()
                    .map(|(&start, chunk)| (start, chunk.len, chunk.task.clone()))
            };
            current = match next {
                None => self.make_chunk(current_end, end_page),
                Some((next_start, _, _)) if next_start >= end_page => {
                    self.make_chunk(current_end, end_page)
                }
                Some((next_start, _, _)) if next_start != current_end => {
                    self.make_chunk(current_end, next_start)
                }
                Some(next) => next,
            };
            collected.push(current.clone());
        }

        collected
    }
}

impl<P: MemoryReader + 'static> MemoryReader for CachingReader<P> {
    fn id(&self) -> &[u8] {
        self.inner.id()
    }

    fn base_offset(&self) -> i64 {
        self.inner.base_offset()
    }

    fn stop(&self) -> Result<(), ProcessError> {
        self.chunks.borrow_mut().clear();
        self.inner.stop()
    }

    fn resume(&self) -> Result<(), ProcessError> {
        self.chunks.borrow_mut().clear();
        self.inner.resume()
    }

    fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>> {
        Box::pin(async move {
            if len == 0 {
                return Ok(Vec::new());
            }
            let chunks = self.collect_chunks(address, len);
            let results = future::join_all(chunks.iter().map(|(_, _, task)| task.clone())).await;
            let mut out = vec![0u8; len];
            let end = address + len as u64;
            for ((chunk_start, chunk_len, _), result) in chunks.iter().zip(results) {
                let data = result?;
                let chunk_end = chunk_start + *chunk_len as u64;
                let copy_start = (*chunk_start).max(address);
                let copy_end = chunk_end.min(end);
                if copy_start < copy_end {
                    let src = (copy_start - chunk_start) as usize..(copy_end - chunk_start) as usize;
                    let dst = (copy_start - address) as usize..(copy_end - address) as usize;
                    out[dst].copy_from_slice(&data[src]);
                }
            }
            Ok(out)
        })
    }

    fn run(&self, task: LocalBoxFuture<'_, ()>) {
        self.inner.run(task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{drive, ReadRequest, SparseMemory};
    use std::cell::Cell;

    struct CountingReader {
        inner: SparseMemory,
        reads: Cell<usize>,
    }

    impl MemoryReader for CountingReader {
        fn id(&self) -> &[u8] {
            self.inner.id()
        }
        fn base_offset(&self) -> i64 {
            self.inner.base_offset()
        }
        fn stop(&self) -> Result<(), ProcessError> {
            self.inner.stop()
        }
        fn resume(&self) -> Result<(), ProcessError> {
            self.inner.resume()
        }
        fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read(address, len)
        }
        fn read_vectored(
            &self,
            requests: Vec<ReadRequest>,
        ) -> LocalBoxFuture<'_, Result<Vec<Vec<u8>>, MemoryError>> {
            self.reads.set(self.reads.get() + 1);
            self.inner.read_vectored(requests)
        }
    }

    fn image() -> SparseMemory {
        let mut memory = SparseMemory::new();
        let bytes: Vec<u8> = (0..0x4000u32).map(|i| i as u8).collect();
        memory.insert(0x10000, bytes);
        memory
    }

    #[test]
    fn overlapping_reads_hit_cache() {
        let cache = CachingReader::new(CountingReader {
            inner: image(),
            reads: Cell::new(0),
        });

        // Four overlapping reads inside a 0x3000 byte range: at most 3 pages.
        let total = drive(
            async {
                let a = cache.read(0x10010, 0x100).await.unwrap();
                let b = cache.read(0x10010, 0x100).await.unwrap();
                let c = cache.read(0x10800, 0x1000).await.unwrap();
                let d = cache.read(0x10000, 0x2800).await.unwrap();
                assert_eq!(a, b);
                assert_eq!(a[0], 0x10);
                assert_eq!(c[0], 0x00);
                assert_eq!(d.len(), 0x2800);
                d[0x7ff]
            },
            || false,
        );
        assert_eq!(total, 0xff);
        assert!(cache.inner.reads.get() <= 3, "reads: {}", cache.inner.reads.get());
    }

    #[test]
    fn concurrent_reads_share_pending_chunk() {
        let cache = CachingReader::new(CountingReader {
            inner: image(),
            reads: Cell::new(0),
        });
        drive(
            async {
                let (a, b) = future::join(cache.read(0x10000, 16), cache.read(0x10008, 16)).await;
                assert_eq!(a.unwrap()[8..16], b.unwrap()[0..8]);
            },
            || false,
        );
        assert_eq!(cache.inner.reads.get(), 1);
    }

    #[test]
    fn stop_drops_cache() {
        let cache = CachingReader::new(CountingReader {
            inner: image(),
            reads: Cell::new(0),
        });
        drive(
            async {
                cache.read(0x10000, 16).await.unwrap();
            },
            || false,
        );
        cache.stop().unwrap();
        drive(
            async {
                cache.read(0x10000, 16).await.unwrap();
            },
            || false,
        );
        assert_eq!(cache.inner.reads.get(), 2);
    }
}
