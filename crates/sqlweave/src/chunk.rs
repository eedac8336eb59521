//! Parameter-ceiling chunking for `IN (...)` operations.
//!
//! SQLite bounds the number of bound parameters per statement (999 by
//! default). Every bulk operation splits its key list so that the keys
//! plus any fixed parameters already in the statement stay under the
//! ceiling.

use sqlweave_core::Value;

/// Split `values` into chunks that fit a statement already carrying
/// `reserved` fixed parameters under a `max_params` ceiling.
///
/// The chunk size is always at least one, so a misconfigured ceiling
/// degrades to per-row statements instead of an infinite loop.
pub fn in_chunks(values: &[Value], reserved: usize, max_params: usize) -> std::slice::Chunks<'_, Value> {
    let capacity = max_params.saturating_sub(reserved).max(1);
    values.chunks(capacity)
}

/// Build a `?, ?, ...` placeholder list of the given arity.
pub fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(n: i64) -> Vec<Value> {
        (0..n).map(Value::Integer).collect()
    }

    #[test]
    fn chunks_respect_reserved_parameters() {
        let values = keys(10);
        let chunks: Vec<_> = in_chunks(&values, 2, 4).collect();
        assert_eq!(chunks.len(), 5);
        assert!(chunks.iter().all(|c| c.len() <= 2));
    }

    #[test]
    fn no_element_lost_or_duplicated() {
        let values = keys(2_500);
        let total: usize = in_chunks(&values, 1, 999).map(<[Value]>::len).sum();
        assert_eq!(total, 2_500);

        let mut seen = Vec::new();
        for chunk in in_chunks(&values, 1, 999) {
            seen.extend_from_slice(chunk);
        }
        assert_eq!(seen, values);
    }

    #[test]
    fn degenerate_ceiling_still_progresses() {
        let values = keys(3);
        let chunks: Vec<_> = in_chunks(&values, 5, 4).collect();
        assert_eq!(chunks.len(), 3);
    }

    #[test]
    fn placeholder_list() {
        assert_eq!(placeholders(0), "");
        assert_eq!(placeholders(1), "?");
        assert_eq!(placeholders(3), "?, ?, ?");
    }
}
