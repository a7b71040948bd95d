//! Real-time scheduling helpers (Linux SCHED_FIFO / affinity / mlockall; macOS mlockall).

use crate::cli::{LoopArgs, RtLock};

/// Effective RT settings after merging CLI flags over `[rt]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtRequest {
    pub enabled: bool,
    pub priority: i32,
    pub lock: RtLock,
    pub cpu: Option<usize>,
}

impl RtRequest {
    pub fn resolve(cfg: &soc_config::RtCfg, opts: &LoopArgs) -> Self {
        let cfg_lock = RtLock::from(cfg.lock);
        Self {
            enabled: opts.rt || cfg.enabled,
            priority: opts.rt_prio.unwrap_or(cfg.priority),
            // A bare --rt with an untouched [rt] table uses the OS default lock
            lock: opts.rt_lock.unwrap_or(if cfg.enabled || cfg_lock != RtLock::None {
                cfg_lock
            } else {
                RtLock::os_default()
            }),
            cpu: opts.rt_cpu.or(cfg.cpu),
        }
    }
}

#[cfg(target_os = "linux")]
/// Capacity of cpu_set_t in CPU indices (bits).
const MAX_CPUSET_BITS: usize = std::mem::size_of::<libc::cpu_set_t>() * 8;

#[inline]
fn is_retryable_memlock_error(err: &std::io::Error) -> bool {
    matches!(err.raw_os_error(), Some(code) if code == libc::EPERM || code == libc::ENOMEM)
}

fn memlock_limit_hint() -> Option<String> {
    let mut rlim = std::mem::MaybeUninit::<libc::rlimit>::uninit();
    // SAFETY: getrlimit writes a full rlimit on success; we only read it then.
    let rc = unsafe { libc::getrlimit(libc::RLIMIT_MEMLOCK, rlim.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: rc == 0 above.
    let cur = unsafe { rlim.assume_init() }.rlim_cur;
    if cur == libc::RLIM_INFINITY {
        Some("memlock limit: unlimited".to_string())
    } else {
        Some(format!("memlock limit: {} KiB", cur / 1024))
    }
}

fn mlockall(flags: libc::c_int) -> std::io::Result<()> {
    // SAFETY: plain syscall wrapper with no pointer arguments.
    let rc = unsafe { libc::mlockall(flags) };
    if rc != 0 {
        Err(std::io::Error::last_os_error())
    } else {
        Ok(())
    }
}

/// Lock process memory; `All` falls back to `Current` on EPERM/ENOMEM.
fn try_apply_mem_lock(lock: RtLock) -> eyre::Result<()> {
    let err = match lock {
        RtLock::None => return Ok(()),
        RtLock::Current => match mlockall(libc::MCL_CURRENT) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
        RtLock::All => match mlockall(libc::MCL_CURRENT | libc::MCL_FUTURE) {
            Ok(()) => return Ok(()),
            Err(e) => e,
        },
    };

    let attempted_all = lock == RtLock::All;
    let mut fallback_err = None;
    if attempted_all && is_retryable_memlock_error(&err) {
        match mlockall(libc::MCL_CURRENT) {
            Ok(()) => {
                tracing::warn!(
                    error = %err,
                    "mlockall(current|future) failed; locked current pages only"
                );
                return Ok(());
            }
            Err(e2) => fallback_err = Some(e2),
        }
    }

    let mut msg = format!(
        "mlockall({}) failed: {err}",
        if attempted_all { "current|future" } else { "current" }
    );
    if is_retryable_memlock_error(&err) {
        if let Some(h) = memlock_limit_hint() {
            msg.push_str(&format!("; {h}"));
        }
        msg.push_str("; hint: needs CAP_IPC_LOCK (or root) and sufficient 'ulimit -l'");
        if let Some(e2) = fallback_err {
            msg.push_str(&format!("; fallback mlockall(current) also failed: {e2}"));
        }
    }
    Err(eyre::eyre!(msg))
}

#[cfg(target_os = "linux")]
fn has_cap_sys_nice() -> bool {
    const CAP_SYS_NICE: u64 = 1 << 23;
    let Ok(status) = std::fs::read_to_string("/proc/self/status") else {
        return false;
    };
    status
        .lines()
        .filter(|l| l.starts_with("CapEff:"))
        .filter_map(|l| l.split_whitespace().nth(1))
        .filter_map(|hex| u64::from_str_radix(hex, 16).ok())
        .any(|caps| caps & CAP_SYS_NICE != 0)
}

/// SCHED_FIFO at `prio`, clamped to the system range. Returns the applied priority.
#[cfg(target_os = "linux")]
fn try_apply_fifo_priority(prio: i32) -> eyre::Result<i32> {
    use libc::{SCHED_FIFO, sched_get_priority_max, sched_get_priority_min, sched_param};

    // SAFETY: geteuid has no preconditions.
    let euid = unsafe { libc::geteuid() };
    if euid != 0 && !has_cap_sys_nice() {
        eyre::bail!(
            "insufficient privileges for SCHED_FIFO: needs CAP_SYS_NICE or root (euid {euid}). \
             Hint: run with sudo or 'sudo setcap cap_sys_nice=ep /path/to/soc'"
        );
    }

    // SAFETY: pure queries.
    let (min, max) = unsafe {
        (
            sched_get_priority_min(SCHED_FIFO),
            sched_get_priority_max(SCHED_FIFO),
        )
    };
    let (min, max) = if min < 0 || max < 0 { (1, 99) } else { (min, max) };
    let applied = prio.clamp(min, max);
    let param = sched_param {
        sched_priority: applied,
    };
    // SAFETY: param outlives the call; pid 0 is the calling process.
    let rc = unsafe { libc::sched_setscheduler(0, SCHED_FIFO, &param) };
    if rc != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(applied)
}

/// Pin the process to `cpu` if the current affinity mask allows it.
#[cfg(target_os = "linux")]
fn try_apply_affinity(cpu: usize) -> eyre::Result<()> {
    use libc::{CPU_ISSET, CPU_SET, CPU_ZERO};

    if cpu >= MAX_CPUSET_BITS {
        eyre::bail!("requested CPU {cpu} exceeds cpu_set_t capacity {MAX_CPUSET_BITS}");
    }
    // SAFETY: sysconf has no preconditions.
    let online = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_ONLN) };
    if online < 1 {
        eyre::bail!("_SC_NPROCESSORS_ONLN < 1");
    }
    if cpu as libc::c_long >= online {
        eyre::bail!("requested CPU {cpu} >= online {online}");
    }

    // SAFETY: cpu_set_t is plain data; zeroed is a valid empty set.
    let mut allowed: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    let size = std::mem::size_of::<libc::cpu_set_t>();
    // SAFETY: `allowed` is a valid, writable cpu_set_t of `size` bytes.
    if unsafe { libc::sched_getaffinity(0, size, &mut allowed) } != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    // SAFETY: cpu < MAX_CPUSET_BITS checked above.
    if !unsafe { CPU_ISSET(cpu, &allowed) } {
        eyre::bail!("CPU {cpu} not permitted by current affinity mask");
    }

    // SAFETY: as above.
    let mut desired: libc::cpu_set_t = unsafe { std::mem::zeroed() };
    unsafe {
        CPU_ZERO(&mut desired);
        CPU_SET(cpu, &mut desired);
    }
    // SAFETY: `desired` is a valid cpu_set_t of `size` bytes.
    if unsafe { libc::sched_setaffinity(0, size, &desired) } != 0 {
        return Err(eyre::eyre!(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Apply `req` once per process. Every step is best effort: failures are
/// logged and the estimator runs without that guarantee.
#[cfg(target_os = "linux")]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !req.enabled {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "RT: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "RT: mlockall failed"),
        }
        match try_apply_fifo_priority(req.priority) {
            Ok(applied) => tracing::info!(priority = applied, "RT: SCHED_FIFO applied"),
            Err(err) => tracing::warn!(
                priority = req.priority,
                error = %err,
                "RT: sched_setscheduler(SCHED_FIFO) failed"
            ),
        }
        if let Some(cpu) = req.cpu {
            match try_apply_affinity(cpu) {
                Ok(()) => tracing::info!(cpu, "RT: pinned to CPU"),
                Err(err) => tracing::warn!(cpu, error = %err, "RT: affinity not applied"),
            }
        }
    });
}

#[cfg(not(target_os = "linux"))]
pub fn setup_rt_once(req: RtRequest) {
    use std::sync::OnceLock;
    static RT_ONCE: OnceLock<()> = OnceLock::new();

    if !req.enabled {
        return;
    }
    RT_ONCE.get_or_init(|| {
        match try_apply_mem_lock(req.lock) {
            Ok(()) => tracing::info!(lock = ?req.lock, "RT: memory lock applied"),
            Err(err) => tracing::warn!(error = %err, "RT: mlockall failed"),
        }
        tracing::warn!("RT: SCHED_FIFO and CPU affinity are Linux-only; only mlockall applied");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loop_args() -> LoopArgs {
        LoopArgs {
            cycles: None,
            period_ms: None,
            rt: false,
            rt_prio: None,
            rt_lock: None,
            rt_cpu: None,
            stats: false,
        }
    }

    #[test]
    fn config_defaults_leave_rt_off() {
        let req = RtRequest::resolve(&soc_config::RtCfg::default(), &loop_args());
        assert!(!req.enabled);
        assert_eq!(req.priority, 75);
        assert_eq!(req.cpu, None);
    }

    #[test]
    fn cli_flags_override_config() {
        let cfg = soc_config::RtCfg {
            enabled: true,
            priority: 50,
            lock: soc_config::RtLockCfg::All,
            cpu: Some(1),
        };
        let mut opts = loop_args();
        opts.rt_prio = Some(80);
        opts.rt_lock = Some(RtLock::None);
        opts.rt_cpu = Some(2);
        let req = RtRequest::resolve(&cfg, &opts);
        assert_eq!(
            req,
            RtRequest {
                enabled: true,
                priority: 80,
                lock: RtLock::None,
                cpu: Some(2),
            }
        );
    }

    #[test]
    fn bare_rt_flag_uses_os_default_lock() {
        let mut opts = loop_args();
        opts.rt = true;
        let req = RtRequest::resolve(&soc_config::RtCfg::default(), &opts);
        assert!(req.enabled);
        assert_eq!(req.lock, RtLock::os_default());
    }

    #[test]
    fn disabled_request_is_a_no_op() {
        setup_rt_once(RtRequest {
            enabled: false,
            priority: 75,
            lock: RtLock::All,
            cpu: Some(0),
        });
    }
}
