//! Platform-specific process control, isolated so the rest of the driver
//! never sees OS-specific spawn flags, signal names, or kill utilities
//! (spec §9 design note).

use std::process::Command;

/// Hides the console window the transcoder would otherwise flash open on
/// Windows. No-op elsewhere.
#[cfg(windows)]
pub(crate) fn configure_hidden_console(cmd: &mut Command) {
    use std::os::windows::process::CommandExt;
    const CREATE_NO_WINDOW: u32 = 0x0800_0000;
    cmd.creation_flags(CREATE_NO_WINDOW);
}

#[cfg(not(windows))]
pub(crate) fn configure_hidden_console(_cmd: &mut Command) {}

/// Sends the OS "please terminate" signal: `SIGTERM` on Unix, a graceful
/// `TerminateProcess` request mediated by `windows-rs` on Windows.
#[cfg(unix)]
pub(crate) fn send_terminate_signal(pid: u32) {
    // SAFETY: signaling a PID we own (the child we spawned) with SIGTERM.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(windows)]
pub(crate) fn send_terminate_signal(pid: u32) {
    use windows::Win32::Foundation::CloseHandle;
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};

    unsafe {
        if let Ok(handle) = OpenProcess(PROCESS_TERMINATE, false, pid) {
            let _ = TerminateProcess(handle, 1);
            let _ = CloseHandle(handle);
        }
    }
}

/// Last-resort tree-kill used only by the stop-all escalation cascade
/// (spec §4.F). On Windows this shells out to `taskkill /T /F`; on Unix a
/// `SIGKILL` to the process is sufficient since the driver never detaches
/// the transcoder into its own process group.
#[cfg(windows)]
pub(crate) fn kill_process_tree(pid: u32) {
    let _ = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output();
}

#[cfg(unix)]
pub(crate) fn kill_process_tree(pid: u32) {
    // SAFETY: signaling a PID we own with SIGKILL.
    unsafe {
        libc::kill(pid as libc::pid_t, libc::SIGKILL);
    }
}

/// A Job Object with `JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE` set: every
/// transcoder assigned to it is killed automatically if the kernel process
/// itself is killed without a clean shutdown, so a crashed supervisor never
/// leaves orphaned `ffmpeg` processes writing into camera directories.
#[cfg(windows)]
mod job_object {
    use std::sync::OnceLock;

    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::JobObjects::{
        AssignProcessToJobObject, CreateJobObjectW, JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE,
        JOBOBJECT_EXTENDED_LIMIT_INFORMATION, JobObjectExtendedLimitInformation,
        SetInformationJobObject,
    };
    use windows::Win32::System::Threading::{OpenProcess, PROCESS_ALL_ACCESS};

    struct JobHandle(isize);
    // SAFETY: a Windows job object handle is valid from any thread.
    unsafe impl Send for JobHandle {}
    unsafe impl Sync for JobHandle {}

    static JOB: OnceLock<Option<JobHandle>> = OnceLock::new();

    fn job_handle() -> Option<HANDLE> {
        JOB.get_or_init(|| unsafe {
            let handle = CreateJobObjectW(None, None).ok()?;
            let mut info = JOBOBJECT_EXTENDED_LIMIT_INFORMATION::default();
            info.BasicLimitInformation.LimitFlags = JOB_OBJECT_LIMIT_KILL_ON_JOB_CLOSE;
            SetInformationJobObject(
                handle,
                JobObjectExtendedLimitInformation,
                &info as *const _ as *const std::ffi::c_void,
                std::mem::size_of_val(&info) as u32,
            )
            .ok()?;
            Some(JobHandle(handle.0 as isize))
        })
        .as_ref()
        .map(|h| HANDLE(h.0 as *mut std::ffi::c_void))
    }

    pub(crate) fn assign(pid: u32) {
        let Some(job) = job_handle() else { return };
        unsafe {
            if let Ok(process) = OpenProcess(PROCESS_ALL_ACCESS, false, pid) {
                let _ = AssignProcessToJobObject(job, process);
                let _ = CloseHandle(process);
            }
        }
    }
}

#[cfg(windows)]
pub(crate) fn assign_to_kill_on_exit_job(pid: u32) {
    job_object::assign(pid);
}

#[cfg(not(windows))]
pub(crate) fn assign_to_kill_on_exit_job(_pid: u32) {}
