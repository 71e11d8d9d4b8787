//! Dotted version comparison for release tags.

use std::cmp::Ordering;

/// Split `value` on `.` into integer segments. A segment that is not a plain
/// non-negative integer counts as `0`.
pub fn parse_version(value: &str) -> Vec<u64> {
    value
        .split('.')
        .map(|segment| segment.trim().parse::<u64>().unwrap_or(0))
        .collect()
}

/// Compare two versions segment by segment, padding the shorter with zeros.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let (a, b) = (parse_version(a), parse_version(b));
    let len = a.len().max(b.len());

    (0..len)
        .map(|i| {
            let left = a.get(i).copied().unwrap_or(0);
            let right = b.get(i).copied().unwrap_or(0);
            left.cmp(&right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// True when `candidate` is strictly greater than `current`. An empty
/// candidate is never newer.
pub fn is_version_newer(candidate: &str, current: &str) -> bool {
    if candidate.trim().is_empty() {
        return false;
    }
    compare_versions(candidate, current) == Ordering::Greater
}

/// Release tags are usually `v1.2.3`; strip the leading `v`.
pub fn normalize_tag(tag: &str) -> &str {
    let tag = tag.trim();
    tag.strip_prefix('v')
        .or_else(|| tag.strip_prefix('V'))
        .unwrap_or(tag)
}
