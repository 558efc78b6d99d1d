//! In-memory host for tests and local development.

use std::{
    collections::{HashMap, HashSet},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex, PoisonError,
    },
};

use super::{CapabilityCheck, ForeignMemory, ProcessTable};
use crate::{Caller, Direction};

struct Region {
    start: u64,
    bytes: Vec<u8>,
    writable: bool,
}

impl Region {
    fn contains(&self, address: u64) -> bool {
        address >= self.start && address - self.start < self.bytes.len() as u64
    }
}

#[derive(Default)]
pub struct SimulatedProcess {
    regions: Vec<Region>,
}

impl SimulatedProcess {
    fn transfer(&mut self, address: u64, buffer: &mut [u8], direction: Direction) -> isize {
        let mut done = 0;
        while done < buffer.len() {
            let Some(cursor) = address.checked_add(done as u64) else {
                break;
            };
            let Some(region) = self.regions.iter_mut().find(|r| r.contains(cursor)) else {
                break;
            };
            if direction == Direction::Write && !region.writable {
                break;
            }
            let offset = (cursor - region.start) as usize;
            let len = (region.bytes.len() - offset).min(buffer.len() - done);
            let mapped = &mut region.bytes[offset..offset + len];
            let local = &mut buffer[done..done + len];
            match direction {
                Direction::Read => local.copy_from_slice(mapped),
                Direction::Write => mapped.copy_from_slice(local),
            }
            done += len;
        }
        if done == 0 {
            -(libc::EFAULT as isize)
        } else {
            done as isize
        }
    }

    fn peek(&self, address: u64, len: usize) -> Option<Vec<u8>> {
        (0..len as u64)
            .map(|i| {
                let cursor = address.checked_add(i)?;
                let region = self.regions.iter().find(|r| r.contains(cursor))?;
                Some(region.bytes[(cursor - region.start) as usize])
            })
            .collect()
    }
}

pub type SimulatedHandle = Arc<Mutex<SimulatedProcess>>;

/// Process table and address spaces kept in memory.
///
/// A resolved handle stays usable after [`SimulatedHost::kill`], the same way
/// a kernel task reference outlives the pid table entry.
#[derive(Default)]
pub struct SimulatedHost {
    processes: Mutex<HashMap<i32, SimulatedHandle>>,
    privileged_pids: Mutex<HashSet<i32>>,
    privileged_uids: Mutex<HashSet<u32>>,
    lookups: AtomicUsize,
    transfers: AtomicUsize,
}

impl SimulatedHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_pid(&self, pid: i32) {
        lock(&self.privileged_pids).insert(pid);
    }

    pub fn grant_uid(&self, uid: u32) {
        lock(&self.privileged_uids).insert(uid);
    }

    pub fn spawn(&self, pid: i32) {
        lock(&self.processes).entry(pid).or_default();
    }

    pub fn kill(&self, pid: i32) {
        lock(&self.processes).remove(&pid);
    }

    /// Maps `bytes` at `address` in `pid`, spawning the process if needed.
    /// Regions must not overlap.
    pub fn map(&self, pid: i32, address: u64, bytes: &[u8], writable: bool) {
        let process = lock(&self.processes).entry(pid).or_default().clone();
        lock(&process).regions.push(Region {
            start: address,
            bytes: bytes.to_vec(),
            writable,
        });
    }

    /// Current contents of `len` bytes at `address`, if all are mapped.
    pub fn peek(&self, pid: i32, address: u64, len: usize) -> Option<Vec<u8>> {
        let process = lock(&self.processes).get(&pid)?.clone();
        let process = lock(&process);
        process.peek(address, len)
    }

    /// Number of process table lookups so far.
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::Relaxed)
    }

    /// Number of foreign address space copies so far.
    pub fn transfers(&self) -> usize {
        self.transfers.load(Ordering::Relaxed)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CapabilityCheck for SimulatedHost {
    fn is_privileged(&self, caller: &Caller) -> bool {
        caller
            .pid()
            .is_some_and(|pid| lock(&self.privileged_pids).contains(&pid))
            || caller
                .uid()
                .is_some_and(|uid| lock(&self.privileged_uids).contains(&uid))
    }
}

impl ProcessTable for SimulatedHost {
    type Handle = SimulatedHandle;

    fn resolve_process(&self, pid: i32) -> Option<SimulatedHandle> {
        self.lookups.fetch_add(1, Ordering::Relaxed);
        lock(&self.processes).get(&pid).cloned()
    }
}

impl ForeignMemory for SimulatedHost {
    fn transfer(
        &self,
        process: &SimulatedHandle,
        address: u64,
        buffer: &mut [u8],
        direction: Direction,
    ) -> isize {
        self.transfers.fetch_add(1, Ordering::Relaxed);
        lock(process).transfer(address, buffer, direction)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transfer_stops_at_the_end_of_a_region() {
        let host = SimulatedHost::new();
        host.map(7, 0x1000, &[1, 2, 3, 4], true);
        let process = host.resolve_process(7).unwrap();

        let mut buf = [0u8; 8];
        assert_eq!(host.transfer(&process, 0x1002, &mut buf, Direction::Read), 2);
        assert_eq!(buf[..2], [3, 4]);
        assert_eq!(
            host.transfer(&process, 0x2000, &mut buf, Direction::Read),
            -(libc::EFAULT as isize)
        );
    }

    #[test]
    fn transfer_spans_adjacent_regions() {
        let host = SimulatedHost::new();
        host.map(7, 0x1000, &[1, 2], true);
        host.map(7, 0x1002, &[3, 4], true);
        let process = host.resolve_process(7).unwrap();

        let mut buf = [0u8; 4];
        assert_eq!(host.transfer(&process, 0x1000, &mut buf, Direction::Read), 4);
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn read_only_regions_reject_writes() {
        let host = SimulatedHost::new();
        host.map(7, 0x1000, &[1, 2], false);
        let process = host.resolve_process(7).unwrap();

        let mut buf = [9u8; 2];
        assert!(host.transfer(&process, 0x1000, &mut buf, Direction::Write) < 0);
        assert_eq!(host.peek(7, 0x1000, 2), Some(vec![1, 2]));
    }

    #[test]
    fn killed_processes_no_longer_resolve() {
        let host = SimulatedHost::new();
        host.spawn(7);
        let handle = host.resolve_process(7).unwrap();
        host.kill(7);
        assert!(host.resolve_process(7).is_none());
        assert_eq!(host.lookups(), 2);
        drop(handle);
    }

    #[test]
    fn privilege_by_pid_or_uid() {
        let host = SimulatedHost::new();
        host.grant_pid(10);
        host.grant_uid(0);
        assert!(host.is_privileged(&Caller::new(Some(10), Some(1000))));
        assert!(host.is_privileged(&Caller::new(Some(11), Some(0))));
        assert!(!host.is_privileged(&Caller::new(Some(11), Some(1000))));
        assert!(!host.is_privileged(&Caller::new(None, None)));
    }
}
