use std::ffi::c_void;

use tracing::trace;
use windows::{
    core::PCWSTR,
    Win32::{
        Foundation::{CloseHandle, BOOL, FALSE, HANDLE, LUID, STILL_ACTIVE},
        Security::{
            LookupPrivilegeValueW, PrivilegeCheck, LUID_AND_ATTRIBUTES, PRIVILEGE_SET,
            PRIVILEGE_SET_ALL_NECESSARY, SE_DEBUG_NAME, SE_PRIVILEGE_ENABLED, TOKEN_QUERY,
        },
        System::{
            Diagnostics::Debug::{ReadProcessMemory, WriteProcessMemory},
            Threading::{
                GetExitCodeProcess, OpenProcess, OpenProcessToken, PROCESS_QUERY_INFORMATION,
                PROCESS_QUERY_LIMITED_INFORMATION, PROCESS_VM_OPERATION, PROCESS_VM_READ,
                PROCESS_VM_WRITE,
            },
        },
    },
};

use super::{CapabilityCheck, ForeignMemory, ProcessTable};
use crate::{Caller, Direction};

struct SafeHandle(HANDLE);

impl Drop for SafeHandle {
    fn drop(&mut self) {
        let _ = unsafe { CloseHandle(self.0) };
    }
}

fn has_debug_privilege(pid: u32) -> windows::core::Result<bool> {
    let process = SafeHandle(unsafe { OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, FALSE, pid) }?);
    let mut token = HANDLE::default();
    unsafe { OpenProcessToken(process.0, TOKEN_QUERY, &mut token) }?;
    let token = SafeHandle(token);

    let mut luid = LUID::default();
    unsafe { LookupPrivilegeValueW(PCWSTR::null(), SE_DEBUG_NAME, &mut luid) }?;
    let mut required = PRIVILEGE_SET {
        PrivilegeCount: 1,
        Control: PRIVILEGE_SET_ALL_NECESSARY,
        Privilege: [LUID_AND_ATTRIBUTES {
            Luid: luid,
            Attributes: SE_PRIVILEGE_ENABLED,
        }],
    };
    let mut granted = BOOL::default();
    unsafe { PrivilegeCheck(token.0, &mut required, &mut granted) }?;
    Ok(granted.as_bool())
}

/// Host backend on top of `OpenProcess` and `Read/WriteProcessMemory`.
#[derive(Clone, Copy, Debug, Default)]
pub struct WindowsHost;

pub struct WindowsProcess {
    process: SafeHandle,
}

impl CapabilityCheck for WindowsHost {
    fn is_privileged(&self, caller: &Caller) -> bool {
        let Some(pid) = caller.pid().and_then(|pid| u32::try_from(pid).ok()) else {
            return false;
        };
        match has_debug_privilege(pid) {
            Ok(granted) => granted,
            Err(err) => {
                trace!("privilege check for pid {} failed: {}", pid, err);
                false
            }
        }
    }
}

impl ProcessTable for WindowsHost {
    type Handle = WindowsProcess;

    fn resolve_process(&self, pid: i32) -> Option<WindowsProcess> {
        let pid = u32::try_from(pid).ok()?;
        let process = unsafe {
            OpenProcess(
                PROCESS_QUERY_INFORMATION
                    | PROCESS_VM_OPERATION
                    | PROCESS_VM_READ
                    | PROCESS_VM_WRITE,
                FALSE,
                pid,
            )
        }
        .ok()?;
        let process = SafeHandle(process);
        let mut exit_code = 0u32;
        unsafe { GetExitCodeProcess(process.0, &mut exit_code) }.ok()?;
        (exit_code == STILL_ACTIVE.0 as u32).then_some(WindowsProcess { process })
    }
}

impl ForeignMemory for WindowsHost {
    fn transfer(
        &self,
        process: &WindowsProcess,
        address: u64,
        buffer: &mut [u8],
        direction: Direction,
    ) -> isize {
        let mut count: usize = 0;
        let result = unsafe {
            match direction {
                Direction::Read => ReadProcessMemory(
                    process.process.0,
                    address as usize as *const c_void,
                    buffer.as_mut_ptr() as *mut c_void,
                    buffer.len(),
                    Some(&mut count),
                ),
                Direction::Write => WriteProcessMemory(
                    process.process.0,
                    address as usize as *const c_void,
                    buffer.as_ptr() as *const c_void,
                    buffer.len(),
                    Some(&mut count),
                ),
            }
        };
        match result {
            Ok(()) => count as isize,
            // ERROR_PARTIAL_COPY still reports how far it got.
            Err(_) if count > 0 => count as isize,
            Err(err) => match (err.code().0 & 0xffff) as isize {
                0 => -1,
                code => -code,
            },
        }
    }
}
