use std::{fs, io, ptr};

use futures::future::LocalBoxFuture;
use md5::{Digest, Md5};

use crate::{MemoryError, MemoryReader, ProcessError, ReadRequest};

// process_vm_readv accepts at most this many segments per call.
const IOV_BATCH: usize = 1024;

/// A native Linux Dwarf Fortress process.
///
/// Stopping attaches with ptrace and waits for the tracee to enter
/// signal-delivery-stop; resuming detaches. Reads go through
/// `process_vm_readv`, so they work without being attached as long as the
/// target is stopped.
///
/// The binary identifier is the MD5 digest of `/proc/<pid>/exe`, matching the
/// checksums recorded for ELF builds. Native builds load at the linked
/// address, so the base offset is zero.
pub struct NativeProcess {
    pid: libc::pid_t,
    id: Vec<u8>,
}

impl NativeProcess {
    /// Open the process `pid` and identify its executable.
    pub fn attach(pid: i32) -> Result<Self, ProcessError> {
        let exe = fs::read(format!("/proc/{}/exe", pid)).map_err(|err| ProcessError {
            code: err.raw_os_error().unwrap_or(0),
            message: format!("failed to read /proc/{}/exe: {}", pid, err),
        })?;
        let id = Md5::digest(&exe).to_vec();
        Ok(NativeProcess { pid, id })
    }

    fn wait_for_signal(&self, signal: i32) -> Result<(), ProcessError> {
        loop {
            let mut status = 0;
            if unsafe { libc::waitpid(self.pid, &mut status, 0) } == -1 {
                return Err(ProcessError::last_os_error());
            }
            if !libc::WIFSTOPPED(status) {
                continue;
            }
            let stop_signal = libc::WSTOPSIG(status);
            if stop_signal == signal {
                return Ok(());
            }
            // Forward unrelated signals to the tracee and keep waiting.
            let forwarded = unsafe {
                libc::ptrace(
                    libc::PTRACE_CONT,
                    self.pid,
                    ptr::null_mut::<libc::c_void>(),
                    stop_signal as *mut libc::c_void,
                )
            };
            if forwarded == -1 {
                return Err(ProcessError::last_os_error());
            }
        }
    }

    fn read_segments(&self, requests: &[ReadRequest], blocks: &mut [Vec<u8>]) -> Result<(), MemoryError> {
        let mut local = Vec::with_capacity(requests.len());
        let mut remote = Vec::with_capacity(requests.len());
        let mut bytes = 0usize;
        for (request, block) in requests.iter().zip(blocks.iter_mut()) {
            local.push(libc::iovec {
                iov_base: block.as_mut_ptr() as *mut libc::c_void,
                iov_len: block.len(),
            });
            remote.push(libc::iovec {
                iov_base: request.address as *mut libc::c_void,
                iov_len: request.len,
            });
            bytes += request.len;
        }
        let read = unsafe {
            libc::process_vm_readv(
                self.pid,
                local.as_ptr(),
                local.len() as libc::c_ulong,
                remote.as_ptr(),
                remote.len() as libc::c_ulong,
                0,
            )
        };
        if read < 0 {
            return Err(MemoryError::last_os_error());
        }
        if read as usize != bytes {
            return Err(MemoryError::Os {
                code: libc::EACCES,
                message: io::Error::from_raw_os_error(libc::EACCES).to_string(),
            });
        }
        Ok(())
    }
}

impl MemoryReader for NativeProcess {
    fn id(&self) -> &[u8] {
        &self.id
    }

    fn base_offset(&self) -> i64 {
        0
    }

    fn stop(&self) -> Result<(), ProcessError> {
        let attached = unsafe {
            libc::ptrace(
                libc::PTRACE_ATTACH,
                self.pid,
                ptr::null_mut::<libc::c_void>(),
                ptr::null_mut::<libc::c_void>(),
            )
        };
        if attached == -1 {
            return Err(ProcessError::last_os_error());
        }
        self.wait_for_signal(libc::SIGSTOP)
    }

    fn resume(&self) -> Result<(), ProcessError> {
        let detached = unsafe {
            libc::ptrace(
                libc::PTRACE_DETACH,
                self.pid,
                ptr::null_mut::<libc::c_void>(),
                ptr::null_mut::<libc::c_void>(),
            )
        };
        if detached == -1 {
            return Err(ProcessError::last_os_error());
        }
        Ok(())
    }

    fn read(&self, address: u64, len: usize) -> LocalBoxFuture<'_, Result<Vec<u8>, MemoryError>> {
        Box::pin(async move {
            let mut block = vec![0u8; len];
            if len > 0 {
                self.read_segments(
                    &[ReadRequest { address, len }],
                    std::slice::from_mut(&mut block),
                )?;
            }
            Ok(block)
        })
    }

    fn read_vectored(
        &self,
        requests: Vec<ReadRequest>,
    ) -> LocalBoxFuture<'_, Result<Vec<Vec<u8>>, MemoryError>> {
        Box::pin(async move {
            let mut blocks: Vec<Vec<u8>> = requests.iter().map(|r| vec![0u8; r.len]).collect();
            for start in (0..requests.len()).step_by(IOV_BATCH) {
                let end = (start + IOV_BATCH).min(requests.len());
                self.read_segments(&requests[start..end], &mut blocks[start..end])?;
            }
            Ok(blocks)
        })
    }
}
