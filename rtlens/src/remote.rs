//! Live process memory reads
//!
//! Attachment sometimes has to look at the target's live memory (e.g. to
//! verify that a biased static address is actually mapped before handing it
//! to the sampler). [`RemoteMemory`] is the read-bytes-at-address contract;
//! [`ProcessVmReader`] implements it with `process_vm_readv(2)`.

#![allow(unsafe_code)] // process_vm_readv requires raw iovec plumbing

use crate::domain::{Pid, ReadError};
use libc::{c_void, iovec, process_vm_readv};

/// Read access to another process's address space.
pub trait RemoteMemory {
    /// Read `len` bytes at `addr` in process `pid`.
    fn read_at(&self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>, ReadError>;

    /// Read a little-endian u64.
    fn read_u64(&self, pid: Pid, addr: u64) -> Result<u64, ReadError> {
        let bytes = self.read_at(pid, addr, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&bytes);
        Ok(u64::from_le_bytes(buf))
    }

    /// Read a little-endian u32.
    fn read_u32(&self, pid: Pid, addr: u64) -> Result<u32, ReadError> {
        let bytes = self.read_at(pid, addr, 4)?;
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&bytes);
        Ok(u32::from_le_bytes(buf))
    }
}

/// `process_vm_readv`-backed reader. Requires ptrace-level access to the
/// target (root, or same-uid with classic ptrace scope).
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessVmReader;

impl RemoteMemory for ProcessVmReader {
    fn read_at(&self, pid: Pid, addr: u64, len: usize) -> Result<Vec<u8>, ReadError> {
        let mut buffer = vec![0u8; len];

        let local_iov = iovec { iov_base: buffer.as_mut_ptr().cast::<c_void>(), iov_len: len };
        let remote_iov = iovec { iov_base: addr as *mut c_void, iov_len: len };

        let result =
            unsafe { process_vm_readv(i32::from(pid), &local_iov, 1, &remote_iov, 1, 0) };

        #[allow(clippy::cast_possible_wrap)]
        if result == len as isize {
            Ok(buffer)
        } else {
            Err(ReadError::Process {
                pid,
                addr,
                len,
                source: std::io::Error::last_os_error(),
            })
        }
    }
}
