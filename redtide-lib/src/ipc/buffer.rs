use bytes::Bytes;

use crate::{BufferFault, CallerBuffer, Direction};

/// Caller buffer carried inside a message: the payload is the readable
/// source, and up to `capacity` bytes may be written back as the reply.
///
/// Reply bytes are only materialized once the service has copied them, so
/// an oversized capacity never causes an allocation.
pub struct InlineBuffer<'a> {
    payload: &'a [u8],
    capacity: usize,
    reply: Vec<u8>,
}

impl<'a> InlineBuffer<'a> {
    pub fn new(payload: &'a [u8], capacity: usize) -> Self {
        Self {
            payload,
            capacity,
            reply: Vec::new(),
        }
    }

    pub fn into_reply(self) -> Bytes {
        Bytes::from(self.reply)
    }
}

impl CallerBuffer for InlineBuffer<'_> {
    fn accessible(&self, len: usize, direction: Direction) -> bool {
        match direction {
            Direction::Read => len <= self.capacity,
            Direction::Write => len <= self.payload.len(),
        }
    }

    fn copy_to_staging(&self, staging: &mut [u8]) -> Result<(), BufferFault> {
        self.payload.copy_to_staging(staging)
    }

    fn copy_from_staging(&mut self, staging: &[u8]) -> Result<(), BufferFault> {
        if staging.len() > self.capacity {
            return Err(BufferFault);
        }
        self.reply.clear();
        self.reply.extend_from_slice(staging);
        Ok(())
    }
}
