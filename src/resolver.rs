//! Missing-month resolution.
//!
//! An empty result means the local series already holds every month the
//! remote dataset offers; it is the common case, not an error.

use std::collections::BTreeSet;

use crate::month::YearMonth;

/// Months present remotely but not locally, ascending
pub fn resolve<'a, R, L>(remote_months: R, local_months: L) -> Vec<YearMonth>
where
    R: IntoIterator<Item = &'a YearMonth>,
    L: IntoIterator<Item = &'a YearMonth>,
{
    let remote: BTreeSet<YearMonth> = remote_months.into_iter().copied().collect();
    let local: BTreeSet<YearMonth> = local_months.into_iter().copied().collect();
    remote.difference(&local).copied().collect()
}

/// [`resolve`], ignoring remote months after `end`
pub fn resolve_through<'a, R, L>(
    remote_months: R,
    local_months: L,
    end: Option<YearMonth>,
) -> Vec<YearMonth>
where
    R: IntoIterator<Item = &'a YearMonth>,
    L: IntoIterator<Item = &'a YearMonth>,
{
    let mut missing = resolve(remote_months, local_months);
    if let Some(end) = end {
        missing.retain(|m| *m <= end);
    }
    missing
}

#[cfg(test)]
mod tests {
    use super::*;

    fn months(list: &[&str]) -> Vec<YearMonth> {
        list.iter().map(|s| s.parse().unwrap()).collect()
    }

    #[test]
    fn test_resolve_returns_sorted_difference() {
        let remote = months(&["2025-03", "2025-01", "2025-02"]);
        let local = months(&["2025-01"]);
        assert_eq!(resolve(&remote, &local), months(&["2025-02", "2025-03"]));
    }

    #[test]
    fn test_resolve_already_current() {
        let remote = months(&["2025-01", "2025-02"]);
        let local = months(&["2024-12", "2025-01", "2025-02"]);
        assert!(resolve(&remote, &local).is_empty());
    }

    #[test]
    fn test_resolve_fills_interior_gap() {
        let remote = months(&["2025-01", "2025-02", "2025-03"]);
        let local = months(&["2025-01", "2025-03"]);
        assert_eq!(resolve(&remote, &local), months(&["2025-02"]));
    }

    #[test]
    fn test_resolve_through_end_month() {
        let remote = months(&["2025-01", "2025-02", "2025-03"]);
        let local = months(&["2025-01"]);
        let end = "2025-02".parse().ok();
        assert_eq!(resolve_through(&remote, &local, end), months(&["2025-02"]));
        assert_eq!(
            resolve_through(&remote, &local, None),
            months(&["2025-02", "2025-03"])
        );
    }
}
