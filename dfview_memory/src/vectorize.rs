use std::cell::{Cell, RefCell};

use futures::{channel::oneshot, future::LocalBoxFuture};

use crate::{drive, MemoryError, MemoryReader, ProcessError, ReadRequest};

/// Default cap on the aggregated size of one vectored batch.
pub const DEFAULT_VECTORIZE_CAP: usize = 48 * 1024 * 1024;

type PendingSender = oneshot::Sender<Result<Vec<u8>, MemoryError>>;

/// Vectorizes reads.
///
/// Delays single read operations and groups them into one call to the
/// underlying [MemoryReader::read_vectored]. The queue is flushed when the
/// aggregated size would exceed the cap, or when the driving task yields the
/// CPU with reads still pending.
pub struct VectorizingReader<P> {
    inner: P,
    cap: usize,
    pending: RefCell<Vec<(ReadRequest, PendingSender)>>,
    pending_bytes: Cell<usize>,
}

impl<P: MemoryReader> VectorizingReader<P> {
    /// Wrap `inner` with the default size cap.
    pub fn new(inner: P) -> Self {
        Self::with_cap(inner, DEFAULT_VECTORIZE_CAP)
    }

    /// Wrap `inner`, keeping batches below `cap` aggregated bytes.
    pub fn with_cap(inner: P, cap: usize) -> Self {
        VectorizingReader {
            inner,
            cap,
            pending: RefCell::new(Vec::new()),
            pending_bytes: Cell::new(0),
        }
    }

    /// Issue every queued read as a single vectored call.
    ///
    /// Returns whether there was anything to flush.
    pub async fn flush(&self) -> bool {
        let batch: Vec<_> = {
            let mut pending = self.pending.borrow_mut();
            self.pending_bytes.set(0);
            pending.drain(..).collect()
        };
        if batch.is_empty() {
            return false;
        }
        let requests: Vec<ReadRequest> = batch.iter().map(|(request, _)| *request).collect();
        match self.inner.read_vectored(requests).await {
            Ok(blocks) => {
                for ((_, sender), block) in batch.into_iter().zip(blocks) {
                    let _ = sender.send(Ok(block));
                }
            }
            Err(err) => {
                for (_, sender) in batch {
                    let _ = sender.send(Err(err.clone()));
                }
            }
        }
        true
    }
}

impl<P: MemoryReader> MemoryReader for VectorizingReader<P> {
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
        Box::pin(async move {
            if self.pending_bytes.get() + len > self.cap {
                self.flush().await;
            }
            let (sender, receiver) = oneshot::channel();
            self.pending
                .borrow_mut()
                .push((ReadRequest { address, len }, sender));
            self.pending_bytes.set(self.pending_bytes.get() + len);
            receiver.await.map_err(|_| MemoryError::Interrupted)?
        })
    }

    fn run(&self, task: LocalBoxFuture<'_, ()>) {
        drive(task, || drive(self.flush(), || false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SparseMemory;
    use futures::future;
    use std::cell::Cell;

    struct CountingReader {
        inner: SparseMemory,
        vectored_calls: Cell<usize>,
        single_calls: Cell<usize>,
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
            self.single_calls.set(self.single_calls.get() + 1);
            self.inner.read(address, len)
        }
        fn read_vectored(
            &self,
            requests: Vec<ReadRequest>,
        ) -> LocalBoxFuture<'_, Result<Vec<Vec<u8>>, MemoryError>> {
            self.vectored_calls.set(self.vectored_calls.get() + 1);
            self.inner.read_vectored(requests)
        }
    }

    fn counting(memory: SparseMemory) -> VectorizingReader<CountingReader> {
        VectorizingReader::new(CountingReader {
            inner: memory,
            vectored_calls: Cell::new(0),
            single_calls: Cell::new(0),
        })
    }

    #[test]
    fn small_reads_collapse_into_one_batch() {
        let mut memory = SparseMemory::new();
        memory.insert(0x1000, (0u8..=255).collect::<Vec<u8>>());
        let vectorizer = counting(memory);

        vectorizer.run(Box::pin(async {
            let reads = (0..16u64).map(|i| vectorizer.read(0x1000 + i * 16, 16));
            let blocks = future::join_all(reads).await;
            for (i, block) in blocks.into_iter().enumerate() {
                assert_eq!(block.unwrap()[0], (i * 16) as u8);
            }
        }));

        assert_eq!(vectorizer.inner.vectored_calls.get(), 1);
        assert_eq!(vectorizer.inner.single_calls.get(), 0);
    }

    #[test]
    fn oversized_read_flushes_and_succeeds() {
        let mut memory = SparseMemory::new();
        memory.insert(0x1000, vec![7u8; 4096]);
        let vectorizer = VectorizingReader::with_cap(
            CountingReader {
                inner: memory,
                vectored_calls: Cell::new(0),
                single_calls: Cell::new(0),
            },
            64,
        );

        vectorizer.run(Box::pin(async {
            let (a, b) = future::join(
                vectorizer.read(0x1000, 16),
                // Larger than the cap: the queue flushes first, then the big
                // read goes out on its own.
                vectorizer.read(0x1000, 4096),
            )
            .await;
            assert_eq!(a.unwrap().len(), 16);
            assert_eq!(b.unwrap().len(), 4096);
        }));

        assert_eq!(vectorizer.inner.vectored_calls.get(), 2);
    }
}
