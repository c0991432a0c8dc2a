//! Pure sizing functions for pool scaling decisions.

/// Containers to add so the free count reaches `target_free`, never
/// exceeding the remaining headroom below `maximum_size`.
#[must_use]
pub(crate) fn containers_to_add(
    pool_size: usize,
    maximum_size: usize,
    free: usize,
    target_free: usize,
) -> usize {
    if target_free <= free {
        return 0;
    }
    let wanted = target_free - free;
    wanted.min(maximum_size.saturating_sub(pool_size))
}

/// Containers to remove when the free count exceeds `target_free`.
#[must_use]
pub(crate) fn containers_to_remove(free: usize, target_free: usize) -> usize {
    free.saturating_sub(target_free)
}
