//! Selection of the snapshot an instance is restored from.

use std::cmp::Reverse;

use crate::compute::Snapshot;

/// Snapshot state accepted for restores.
pub const AVAILABLE_STATE: &str = "available";

/// Picks the newest usable snapshot for `instance_name`.
///
/// A snapshot qualifies when it is `available` and either carries the
/// configured `snapshot_name` (ignored when empty) or was taken from an
/// instance with the same name.
#[must_use]
pub fn select_latest_snapshot(
    snapshots: Vec<Snapshot>,
    snapshot_name: &str,
    instance_name: &str,
) -> Option<Snapshot> {
    snapshots
        .into_iter()
        .filter(|snapshot| snapshot.state == AVAILABLE_STATE)
        .filter(|snapshot| {
            (!snapshot_name.is_empty() && snapshot.name == snapshot_name)
                || snapshot.from_instance_name.as_deref() == Some(instance_name)
        })
        .min_by_key(|snapshot| Reverse(snapshot.created_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::snapshot;
    use rstest::rstest;

    #[rstest]
    fn picks_newest_snapshot_of_the_instance() {
        let picked = select_latest_snapshot(
            vec![
                snapshot("old", Some("feature-x"), 100),
                snapshot("new", Some("feature-x"), 300),
                snapshot("other", Some("feature-y"), 500),
            ],
            "",
            "feature-x",
        );
        assert_eq!(picked.map(|found| found.name).as_deref(), Some("new"));
    }

    #[rstest]
    fn matches_configured_snapshot_name() {
        let picked = select_latest_snapshot(
            vec![
                snapshot("golden", Some("builder"), 100),
                snapshot("unrelated", Some("builder"), 200),
            ],
            "golden",
            "feature-x",
        );
        assert_eq!(picked.map(|found| found.name).as_deref(), Some("golden"));
    }

    #[rstest]
    fn skips_snapshots_that_are_not_available() {
        let mut pending = snapshot("pending", Some("feature-x"), 900);
        pending.state = String::from("pending");
        let picked = select_latest_snapshot(
            vec![pending, snapshot("ready", Some("feature-x"), 1)],
            "",
            "feature-x",
        );
        assert_eq!(picked.map(|found| found.name).as_deref(), Some("ready"));
    }

    #[rstest]
    #[case(vec![])]
    #[case(vec![snapshot("other", Some("feature-y"), 1)])]
    #[case(vec![snapshot("orphan", None, 1)])]
    fn absence_is_not_an_error(#[case] snapshots: Vec<Snapshot>) {
        assert_eq!(select_latest_snapshot(snapshots, "", "feature-x"), None);
    }

    #[rstest]
    fn empty_snapshot_name_does_not_match_unnamed_snapshots() {
        let picked = select_latest_snapshot(vec![snapshot("", None, 1)], "", "feature-x");
        assert_eq!(picked, None);
    }
}
