use std::{
    fs,
    io::{IoSlice, IoSliceMut},
};

use nix::{
    errno::Errno,
    sys::{
        signal::kill,
        uio::{process_vm_readv, process_vm_writev, RemoteIoVec},
    },
    unistd::Pid,
};
use tracing::trace;

use super::{CapabilityCheck, ForeignMemory, ProcessTable};
use crate::{Caller, Direction};

const CAP_SYS_PTRACE: u32 = 19;

fn effective_capabilities(pid: i32) -> Option<u64> {
    let status = fs::read_to_string(format!("/proc/{pid}/status")).ok()?;
    status
        .lines()
        .find_map(|line| line.strip_prefix("CapEff:"))
        .and_then(|caps| u64::from_str_radix(caps.trim(), 16).ok())
}

/// Zombies keep their pid but no longer have an address space.
fn is_defunct(pid: i32) -> bool {
    let Ok(stat) = fs::read_to_string(format!("/proc/{pid}/stat")) else {
        return false;
    };
    // The command name may itself contain parentheses.
    stat.rsplit_once(')')
        .and_then(|(_, rest)| rest.trim_start().chars().next())
        .is_some_and(|state| state == 'Z' || state == 'X')
}

/// Host backend on top of procfs, `kill(2)` and `process_vm_readv(2)`.
#[derive(Clone, Copy, Debug, Default)]
pub struct LinuxHost;

#[derive(Debug)]
pub struct LinuxProcess {
    pid: Pid,
}

impl LinuxProcess {
    pub fn pid(&self) -> i32 {
        self.pid.as_raw()
    }
}

impl CapabilityCheck for LinuxHost {
    fn is_privileged(&self, caller: &Caller) -> bool {
        let Some(pid) = caller.pid() else {
            return false;
        };
        effective_capabilities(pid).is_some_and(|caps| caps & (1 << CAP_SYS_PTRACE) != 0)
    }
}

impl ProcessTable for LinuxHost {
    type Handle = LinuxProcess;

    fn resolve_process(&self, pid: i32) -> Option<LinuxProcess> {
        // 0 and negative ids address process groups in kill(2).
        if pid <= 0 {
            return None;
        }
        let pid = Pid::from_raw(pid);
        match kill(pid, None) {
            Ok(()) | Err(Errno::EPERM) => {}
            Err(err) => {
                trace!("pid {} not resolvable: {}", pid, err);
                return None;
            }
        }
        if is_defunct(pid.as_raw()) {
            return None;
        }
        Some(LinuxProcess { pid })
    }
}

impl ForeignMemory for LinuxHost {
    fn transfer(
        &self,
        process: &LinuxProcess,
        address: u64,
        buffer: &mut [u8],
        direction: Direction,
    ) -> isize {
        let Ok(base) = usize::try_from(address) else {
            return -(libc::EFAULT as isize);
        };
        let remote = [RemoteIoVec {
            base,
            len: buffer.len(),
        }];
        let result = match direction {
            Direction::Read => {
                process_vm_readv(process.pid, &mut [IoSliceMut::new(buffer)], &remote)
            }
            Direction::Write => process_vm_writev(process.pid, &[IoSlice::new(buffer)], &remote),
        };
        match result {
            Ok(count) => count as isize,
            Err(errno) => -(errno as i32 as isize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_the_current_process() {
        let pid = std::process::id() as i32;
        let process = LinuxHost.resolve_process(pid).unwrap();
        assert_eq!(process.pid(), pid);
    }

    #[test]
    fn rejects_group_ids_and_unused_pids() {
        assert!(LinuxHost.resolve_process(0).is_none());
        assert!(LinuxHost.resolve_process(-1).is_none());
        // Above the kernel's PID_MAX_LIMIT.
        assert!(LinuxHost.resolve_process(4_194_304 + 1).is_none());
    }

    #[test]
    fn callers_without_pid_are_not_privileged() {
        assert!(!LinuxHost.is_privileged(&Caller::new(None, Some(0))));
    }

    #[test]
    fn privilege_follows_the_ptrace_bit_of_the_effective_set() {
        let pid = std::process::id() as i32;
        let status = fs::read_to_string("/proc/self/status").unwrap();
        let cap_eff = status
            .lines()
            .find(|line| line.starts_with("CapEff:"))
            .unwrap()
            .split_whitespace()
            .nth(1)
            .unwrap();
        let caps = u64::from_str_radix(cap_eff, 16).unwrap();

        assert_eq!(effective_capabilities(pid), Some(caps));
        assert_eq!(
            LinuxHost.is_privileged(&Caller::new(Some(pid), None)),
            caps & (1 << 19) != 0
        );
    }

    #[test]
    fn zombies_do_not_resolve() {
        let mut child = std::process::Command::new("true").spawn().unwrap();
        let pid = child.id() as i32;
        let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
        while !is_defunct(pid) {
            assert!(std::time::Instant::now() < deadline, "child {pid} never exited");
            std::thread::sleep(std::time::Duration::from_millis(10));
        }

        assert!(LinuxHost.resolve_process(pid).is_none());
        child.wait().unwrap();
    }

    #[test]
    fn reads_and_writes_own_address_space() {
        let process = LinuxHost
            .resolve_process(std::process::id() as i32)
            .unwrap();
        let source = [0x11u8, 0x22, 0x33, 0x44];
        let mut staging = [0u8; 4];
        let count = LinuxHost.transfer(
            &process,
            source.as_ptr() as u64,
            &mut staging,
            Direction::Read,
        );
        assert_eq!(count, 4);
        assert_eq!(staging, source);

        let mut target = vec![0u8; 4];
        let address = target.as_mut_ptr() as u64;
        let mut data = [0xaau8, 0xbb, 0xcc, 0xdd];
        let count = LinuxHost.transfer(&process, address, &mut data, Direction::Write);
        assert_eq!(count, 4);
        assert_eq!(std::hint::black_box(&target)[..], [0xaa, 0xbb, 0xcc, 0xdd]);
    }

    #[test]
    fn unmapped_address_is_a_negative_count() {
        let process = LinuxHost
            .resolve_process(std::process::id() as i32)
            .unwrap();
        let mut staging = [0u8; 8];
        let count = LinuxHost.transfer(&process, 0, &mut staging, Direction::Read);
        assert_eq!(count, -(libc::EFAULT as isize));
    }
}
