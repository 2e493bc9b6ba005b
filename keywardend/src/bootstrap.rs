//! Process hardening for a daemon that holds decrypted private keys.
//!
//! Everything here is best-effort: a failed call is logged and startup
//! continues.

/// Disable core dumps and `/proc/<pid>/mem` access, and optionally pin memory
/// so key material is never swapped out.
///
/// Call before the first key is read.
#[cfg(target_os = "linux")]
pub fn harden_process(lock_memory: bool) {
    // SAFETY: PR_SET_DUMPABLE takes plain integer arguments and touches no
    // memory owned by this process.
    let ret = unsafe { libc::prctl(libc::PR_SET_DUMPABLE, 0i64, 0i64, 0i64, 0i64) };
    if ret == 0 {
        tracing::debug!("PR_SET_DUMPABLE=0: core dumps disabled");
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!("PR_SET_DUMPABLE=0 failed (non-fatal): {err}");
    }

    if !lock_memory {
        return;
    }

    // SAFETY: mlockall only changes paging behaviour.
    let ret = unsafe { libc::mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) };
    if ret == 0 {
        tracing::debug!("mlockall: memory pages locked in RAM");
    } else {
        // EPERM / ENOMEM without CAP_IPC_LOCK or a large enough RLIMIT_MEMLOCK.
        let err = std::io::Error::last_os_error();
        tracing::warn!("mlockall failed (non-fatal, memory may be swapped): {err}");
    }
}

#[cfg(not(target_os = "linux"))]
pub fn harden_process(_lock_memory: bool) {}
