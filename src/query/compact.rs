//! Payload change-log compaction
//!
//! A resource is usually re-recorded many times without changing. Compaction
//! turns the raw history into a change log: entries are put in time order and
//! an entry survives only if its payload differs from the one right before
//! it. The first entry always survives.

use crate::query::payload::PayloadOutput;

/// Collapse consecutive duplicate payloads
///
/// The sort is stable, so entries sharing a timestamp keep their input order.
/// Compacting an already compacted list returns it unchanged.
pub fn compact_payloads(mut entries: Vec<PayloadOutput>) -> Vec<PayloadOutput> {
    entries.sort_by_key(|e| e.payload_time);

    let total = entries.len();
    let mut kept: Vec<PayloadOutput> = Vec::with_capacity(total);
    for entry in entries {
        let changed = kept.last().map_or(true, |last| last.payload != entry.payload);
        if changed {
            kept.push(entry);
        }
    }

    tracing::debug!(
        total,
        kept = kept.len(),
        dropped = total - kept.len(),
        "Compacted payload history"
    );
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(t: i64, payload: &str) -> PayloadOutput {
        PayloadOutput {
            payload_key: format!("/watch/0000000000/Pod/ns1/foo/{}", t),
            payload_time: t,
            payload: payload.to_string(),
        }
    }

    fn shape(entries: &[PayloadOutput]) -> Vec<(i64, &str)> {
        entries
            .iter()
            .map(|e| (e.payload_time, e.payload.as_str()))
            .collect()
    }

    #[test]
    fn test_drops_unchanged_payloads() {
        let input = vec![
            entry(30, "B"),
            entry(5, "A"),
            entry(40, "B"),
            entry(10, "A"),
            entry(50, "A"),
        ];
        let out = compact_payloads(input);
        assert_eq!(shape(&out), vec![(5, "A"), (30, "B"), (50, "A")]);
    }

    #[test]
    fn test_first_entry_survives_even_if_empty() {
        let out = compact_payloads(vec![entry(2, ""), entry(1, ""), entry(3, "x")]);
        assert_eq!(shape(&out), vec![(1, ""), (3, "x")]);
    }

    #[test]
    fn test_empty_input() {
        assert!(compact_payloads(Vec::new()).is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_input_order() {
        let out = compact_payloads(vec![entry(7, "first"), entry(7, "second"), entry(7, "second")]);
        assert_eq!(shape(&out), vec![(7, "first"), (7, "second")]);
    }

    #[test]
    fn test_idempotent() {
        let input = vec![
            entry(3, "A"),
            entry(1, "A"),
            entry(2, "B"),
            entry(4, "B"),
            entry(5, "C"),
            entry(6, "A"),
        ];
        let once = compact_payloads(input);
        let twice = compact_payloads(once.clone());
        assert_eq!(once, twice);
        assert_eq!(shape(&once), vec![(1, "A"), (2, "B"), (3, "A"), (4, "B"), (5, "C"), (6, "A")]);
    }
}
