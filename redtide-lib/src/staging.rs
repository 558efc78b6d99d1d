use crate::ErrorKind;

/// Service-owned bounce buffer between the caller's memory and the target's.
///
/// Holds exactly the requested number of bytes and is released when dropped,
/// which every exit path of a request does exactly once.
pub struct StagingBuffer {
    bytes: Vec<u8>,
}

impl StagingBuffer {
    pub fn allocate(len: usize) -> Result<Self, ErrorKind> {
        #[cfg(test)]
        if tracking::take_injected_failure() {
            return Err(ErrorKind::OutOfMemory);
        }

        let mut bytes = Vec::new();
        bytes
            .try_reserve_exact(len)
            .map_err(|_| ErrorKind::OutOfMemory)?;
        bytes.resize(len, 0);

        #[cfg(test)]
        tracking::allocated();
        Ok(Self { bytes })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.bytes
    }
}

impl Drop for StagingBuffer {
    fn drop(&mut self) {
        #[cfg(test)]
        tracking::released();
    }
}
