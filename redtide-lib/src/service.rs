use tracing::{debug, trace};

use crate::{
    host::Host, Caller, CallerBuffer, Direction, ErrorKind, Request, StagingBuffer,
    MAX_TRANSFER_SIZE,
};

/// Checks a signed length against `1..=MAX_TRANSFER_SIZE`.
pub fn validate_length(length: i32) -> Result<usize, ErrorKind> {
    usize::try_from(length)
        .ok()
        .filter(|&len| len > 0 && len <= MAX_TRANSFER_SIZE)
        .ok_or(ErrorKind::InvalidArgument)
}

/// Performs one cross-process read or write per call.
///
/// Holds nothing but the host backend, so a single instance can serve
/// concurrent callers, including several aimed at the same process.
pub struct MemoryAccessService<H> {
    host: H,
}

impl<H> MemoryAccessService<H>
where
    H: Host,
{
    pub fn new(host: H) -> Self {
        Self { host }
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Runs `request` on behalf of `caller`, reading into or writing from
    /// `buffer`. Returns the number of bytes the foreign address space copy
    /// moved, which for a Write may be short of the requested length.
    pub fn handle<B>(
        &self,
        caller: &Caller,
        request: &Request,
        buffer: &mut B,
    ) -> Result<usize, ErrorKind>
    where
        B: CallerBuffer + ?Sized,
    {
        let result = self.process(caller, request, buffer);
        match &result {
            Ok(count) => trace!(
                "{:?} pid={} addr={:#x} len={} -> {}",
                request.command(),
                request.target_process_id(),
                request.virtual_address(),
                request.length(),
                count
            ),
            Err(err) => debug!(
                "{:?} pid={} addr={:#x} len={} rejected for caller {:?}: {}",
                request.command(),
                request.target_process_id(),
                request.virtual_address(),
                request.length(),
                caller.pid(),
                err
            ),
        }
        result
    }

    fn process<B>(
        &self,
        caller: &Caller,
        request: &Request,
        buffer: &mut B,
    ) -> Result<usize, ErrorKind>
    where
        B: CallerBuffer + ?Sized,
    {
        if !self.host.is_privileged(caller) {
            return Err(ErrorKind::PermissionDenied);
        }
        let length = validate_length(request.length())?;
        let direction = request.command().direction();
        if let Some(direction) = direction {
            if !buffer.accessible(length, direction) {
                return Err(ErrorKind::BadAddress);
            }
        }
        let process = self
            .host
            .resolve_process(request.target_process_id())
            .ok_or(ErrorKind::NoSuchProcess)?;
        let mut staging = StagingBuffer::allocate(length)?;

        match direction {
            Some(Direction::Read) => {
                self.read(&process, request.virtual_address(), &mut staging, buffer)
            }
            Some(Direction::Write) => {
                self.write(&process, request.virtual_address(), &mut staging, buffer)
            }
            None => Err(ErrorKind::UnsupportedOperation),
        }
    }

    fn read<B>(
        &self,
        process: &H::Handle,
        address: u64,
        staging: &mut StagingBuffer,
        buffer: &mut B,
    ) -> Result<usize, ErrorKind>
    where
        B: CallerBuffer + ?Sized,
    {
        let count = self
            .host
            .transfer(process, address, staging.as_mut_slice(), Direction::Read);
        if count <= 0 {
            return Err(ErrorKind::AccessFault(count));
        }
        let count = (count as usize).min(staging.len());
        buffer
            .copy_from_staging(&staging.as_slice()[..count])
            .map_err(|_| ErrorKind::BadAddress)?;
        Ok(count)
    }

    fn write<B>(
        &self,
        process: &H::Handle,
        address: u64,
        staging: &mut StagingBuffer,
        buffer: &B,
    ) -> Result<usize, ErrorKind>
    where
        B: CallerBuffer + ?Sized,
    {
        buffer
            .copy_to_staging(staging.as_mut_slice())
            .map_err(|_| ErrorKind::BadAddress)?;
        let count = self
            .host
            .transfer(process, address, staging.as_mut_slice(), Direction::Write);
        // Short and empty writes pass through; only a failure sentinel is an error.
        if count < 0 {
            return Err(ErrorKind::AccessFault(count));
        }
        Ok((count as usize).min(staging.len()))
    }
}
