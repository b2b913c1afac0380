//! Open-file limit, used to keep the global stream limit below EMFILE territory.

/// File descriptors one admitted stream may hold: the file itself plus walker and pipe handles.
pub const FDS_PER_STREAM: usize = 4;

/// Soft `RLIMIT_NOFILE`, or `None` when unlimited or unknown.
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    let mut rlim = libc::rlimit {
        rlim_cur: 0,
        rlim_max: 0,
    };
    // SAFETY: `rlim` is a valid, writable rlimit.
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, &mut rlim) } != 0 {
        return None;
    }
    let soft = rlim.rlim_cur as u64;
    (rlim.rlim_cur != libc::RLIM_INFINITY && soft <= i64::MAX as u64).then_some(soft)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Streams that fit in four fifths of the open-file limit, at least one.
fn fd_stream_budget() -> Option<usize> {
    let usable = max_open_fds()? / 5 * 4;
    let streams = usize::try_from(usable).unwrap_or(usize::MAX) / FDS_PER_STREAM;
    Some(streams.max(1))
}

/// `requested`, lowered to the open-file budget when that is smaller.
pub fn cap_streams_by_fd_limit(requested: usize) -> usize {
    match fd_stream_budget() {
        Some(budget) if budget < requested => {
            log::debug!(
                "Open-file limit allows {} streams, lowering from {}",
                budget,
                requested
            );
            budget
        }
        _ => requested,
    }
}
