//! Assertions over recorded side effects.

use super::fixtures::TestHarness;

/// Asserts the harness saw exactly `expected`, in order.
pub fn assert_calls(harness: &TestHarness, expected: &[&str]) {
    let actual = harness.log.entries();
    assert_eq!(actual, expected, "unexpected adapter calls");
}

/// Asserts no adapter was touched.
pub fn assert_untouched(harness: &TestHarness) {
    assert!(
        harness.log.entries().is_empty(),
        "expected no adapter calls, got {:?}",
        harness.log.entries()
    );
    assert_eq!(harness.sink.attempts(), 0, "status sink was called");
    assert_eq!(harness.dispatcher.attempts(), 0, "dispatcher was called");
}

/// Asserts each of `parts` occurs in `text`, in the given order.
pub fn assert_in_order(text: &str, parts: &[&str]) {
    let mut from = 0;
    for part in parts {
        match text[from..].find(part) {
            Some(pos) => from += pos + part.len(),
            None => panic!("expected {part:?} after byte {from} in:\n{text}"),
        }
    }
}

/// Asserts exactly one status update was sent, with label `label`.
pub fn assert_single_report(harness: &TestHarness, label: &str) {
    let updates = harness.sink.updates();
    assert_eq!(updates.len(), 1, "expected one status update, got {updates:?}");
    assert_eq!(updates[0].stage, label);
}
