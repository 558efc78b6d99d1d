use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::MAX_TRANSFER_SIZE;

#[derive(Clone, Copy, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum ErrorKind {
    #[error("caller lacks the capability to inspect other processes")]
    PermissionDenied,
    #[error("length must be between 1 and {} bytes", MAX_TRANSFER_SIZE)]
    InvalidArgument,
    #[error("caller buffer is not accessible")]
    BadAddress,
    #[error("no such process")]
    NoSuchProcess,
    #[error("failed to allocate staging buffer")]
    OutOfMemory,
    /// Carries the count reported by the foreign address space copy.
    #[error("target address range is not accessible (status {0})")]
    AccessFault(isize),
    #[error("unsupported operation")]
    UnsupportedOperation,
}

impl ErrorKind {
    /// Status in the ioctl convention: a negative errno, or for
    /// [`ErrorKind::AccessFault`] the transfer's own count.
    pub fn raw_status(self) -> isize {
        let errno = match self {
            ErrorKind::PermissionDenied => libc::EPERM,
            ErrorKind::InvalidArgument => libc::EINVAL,
            ErrorKind::BadAddress => libc::EFAULT,
            ErrorKind::NoSuchProcess => libc::ESRCH,
            ErrorKind::OutOfMemory => libc::ENOMEM,
            ErrorKind::AccessFault(count) => return count,
            ErrorKind::UnsupportedOperation => libc::ENOTTY,
        };
        -(errno as isize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_status_uses_negative_errno() {
        assert_eq!(ErrorKind::PermissionDenied.raw_status(), -1);
        assert_eq!(ErrorKind::NoSuchProcess.raw_status(), -3);
        assert_eq!(ErrorKind::OutOfMemory.raw_status(), -12);
        assert_eq!(ErrorKind::BadAddress.raw_status(), -14);
        assert_eq!(ErrorKind::InvalidArgument.raw_status(), -22);
        assert_eq!(ErrorKind::UnsupportedOperation.raw_status(), -25);
    }

    #[test]
    fn access_fault_reports_the_transfer_count() {
        assert_eq!(ErrorKind::AccessFault(0).raw_status(), 0);
        assert_eq!(ErrorKind::AccessFault(-5).raw_status(), -5);
    }
}
