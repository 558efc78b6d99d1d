use thiserror::Error;

use crate::Direction;

#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("caller buffer fault")]
pub struct BufferFault;

/// Memory owned by the caller of a request.
///
/// The service only borrows it for the duration of one call: a Read fills it
/// from the staging buffer, a Write sources the staging buffer from it.
pub trait CallerBuffer {
    /// Whether `len` bytes may be accessed for `direction`, i.e. writable for
    /// a Read and readable for a Write.
    fn accessible(&self, len: usize, direction: Direction) -> bool;

    /// Fills all of `staging` from the caller's memory.
    fn copy_to_staging(&self, staging: &mut [u8]) -> Result<(), BufferFault>;

    /// Copies all of `staging` into the caller's memory.
    fn copy_from_staging(&mut self, staging: &[u8]) -> Result<(), BufferFault>;
}

impl CallerBuffer for [u8] {
    fn accessible(&self, len: usize, _direction: Direction) -> bool {
        len <= self.len()
    }

    fn copy_to_staging(&self, staging: &mut [u8]) -> Result<(), BufferFault> {
        let src = self.get(..staging.len()).ok_or(BufferFault)?;
        staging.copy_from_slice(src);
        Ok(())
    }

    fn copy_from_staging(&mut self, staging: &[u8]) -> Result<(), BufferFault> {
        let dst = self.get_mut(..staging.len()).ok_or(BufferFault)?;
        dst.copy_from_slice(staging);
        Ok(())
    }
}
