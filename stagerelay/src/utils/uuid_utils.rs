//! Run identifiers and collision-free sequence numbers.

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Generates a new UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates a new UUID v7 (time-ordered).
#[must_use]
pub fn generate_uuid_v7() -> Uuid {
    Uuid::now_v7()
}

/// Returns the first eight hex digits of a UUID, for display.
///
/// On a v7 id these are timestamp bits shared by every id minted in the
/// same minute, so they must not be used to tell runs apart.
#[must_use]
pub fn short_id(id: &Uuid) -> String {
    let mut simple = id.simple().to_string();
    simple.truncate(8);
    simple
}

/// Returns the last twelve hex digits of a UUID.
///
/// On a v7 id these are 48 random bits, distinct per run.
#[must_use]
pub fn run_tag(id: &Uuid) -> String {
    let simple = id.simple().to_string();
    simple[simple.len() - 12..].to_string()
}

/// Returns the next value of the process-wide monotonic sequence.
///
/// Two artifacts written within the same clock tick still get distinct keys.
#[must_use]
pub fn next_sequence() -> u64 {
    SEQUENCE.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_v7_is_time_ordered() {
        let a = generate_uuid_v7();
        let b = generate_uuid_v7();
        assert_eq!(a.get_version_num(), 7);
        assert!(a < b);
    }

    #[test]
    fn test_short_id() {
        let id = Uuid::parse_str("0190f5d2-7a3b-7cde-8f01-23456789abcd").unwrap();
        assert_eq!(short_id(&id), "0190f5d2");
        assert_eq!(run_tag(&id), "23456789abcd");
    }

    #[test]
    fn test_run_tag_differs_where_prefix_repeats() {
        let ids: Vec<Uuid> = (0..64).map(|_| generate_uuid_v7()).collect();
        let prefixes: HashSet<String> = ids.iter().map(short_id).collect();
        let tags: HashSet<String> = ids.iter().map(run_tag).collect();

        assert!(prefixes.len() < ids.len());
        assert_eq!(tags.len(), ids.len());
    }

    #[test]
    fn test_sequence_is_unique_across_threads() {
        let handles: Vec<_> = (0..4)
            .map(|_| std::thread::spawn(|| (0..100).map(|_| next_sequence()).collect::<Vec<_>>()))
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for value in handle.join().unwrap() {
                assert!(seen.insert(value));
            }
        }
        assert_eq!(seen.len(), 400);
    }
}
