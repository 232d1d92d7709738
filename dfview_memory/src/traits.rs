use futures::future::{self, LocalBoxFuture};

use crate::{drive, MemoryError, ProcessError};

/// One block of memory to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadRequest {
    /// Start address in the target process.
    pub address: u64,
    /// Number of bytes to read.
    pub len: usize,
}

/// Interface to a Dwarf Fortress process.
///
/// Reads are futures; they only make progress while a task is being driven
/// through [MemoryReader::run] (or [drive] directly). Wrappers implement this
/// trait and delegate to an inner reader.
pub trait MemoryReader {
    /// Identifier of the target binary: a PE timestamp or an ELF MD5 digest,
    /// matched against version records.
    fn id(&self) -> &[u8];

    /// Offset of the process image compared to the addresses recorded in the
    /// symbol tables.
    fn base_offset(&self) -> i64;

    /// Stop the process before reading memory.
    fn stop(&self) -> Result<(), ProcessError>;

    /// Resume the process once reading is done.
    fn resume(&self) -> Result<(), ProcessError>;

    /// Read one block of memory.
    fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>>;

    /// Read multiple blocks of memory.
    ///
    /// The default launches the single reads concurrently and fails on the
    /// first error; back-ends with a vectored primitive override this.
    fn read_vectored(
        &self,
        requests: Vec<ReadRequest>,
    ) -> LocalBoxFuture<'_, Result<Vec<Vec<u8>>, MemoryError>> {
        Box::pin(async move {
            let reads = requests
                .iter()
                .map(|request| self.read(request.address, request.len));
            future::join_all(reads).await.into_iter().collect()
        })
    }

    /// Block the current thread until `task` completes.
    ///
    /// Wrappers that hold back work until the driving task yields (the
    /// vectoriser) override this to flush their queues while the task is
    /// pending.
    fn run(&self, task: LocalBoxFuture<'_, ()>) {
        drive(task, || false)
    }
}

impl<'r, R: MemoryReader + ?Sized> MemoryReader for &'r R {
    fn id(&self) -> &[u8] {
        (**self).id()
    }

    fn base_offset(&self) -> i64 {
        (**self).base_offset()
    }

    fn stop(&self) -> Result<(), ProcessError> {
        (**self).stop()
    }

    fn resume(&self) -> Result<(), ProcessError> {
        (**self).resume()
    }

    fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>> {
        (**self).read(address, len)
    }

    fn read_vectored(
        &self,
        requests: Vec<ReadRequest>,
    ) -> LocalBoxFuture<'_, Result<Vec<Vec<u8>>, MemoryError>> {
        (**self).read_vectored(requests)
    }

    fn run(&self, task: LocalBoxFuture<'_, ()>) {
        (**self).run(task)
    }
}
