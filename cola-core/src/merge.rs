use crate::item::Item;

/// The compaction collaborator (`SPEC_FULL.md` §6): a pluggable, stable
/// merge of two ascending-sorted runs into one.
///
/// `new_run` is always the shallower (younger) input and `old_run` the
/// deeper (older) one; an implementation MUST make the item from `new_run`
/// win when both runs carry the same key, since inserts flow top-down and
/// shallower always represents a later write (`SPEC_FULL.md` §4.4).
pub trait CompactionPolicy {
    /// Merges `new_run` and `old_run`. `destination_is_deepest` is true
    /// only when the merge's destination is the last level, which is the
    /// sole point at which a tombstone may be safely dropped outright: once
    /// there is no level below to shadow, keeping it around serves no
    /// purpose (`SPEC_FULL.md` §3 lifecycle, case (a)).
    fn merge(&self, new_run: &[Item], old_run: &[Item], destination_is_deepest: bool) -> Vec<Item>;
}

/// The reference compaction policy: collapse duplicate keys so the younger
/// (shallower) item wins, and drop tombstones once they reach the deepest
/// level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LastWriterWins;

impl CompactionPolicy for LastWriterWins {
    fn merge(&self, new_run: &[Item], old_run: &[Item], destination_is_deepest: bool) -> Vec<Item> {
        let mut merged = merge_sorted_runs(new_run, old_run);
        if destination_is_deepest {
            merged.retain(|item| item.opt != crate::item::Opt::Del);
        }
        merged
    }
}

/// Stably merges two ascending-sorted runs, `new_run` winning ties.
///
/// This is the shared primitive both the level-merge engine and the
/// full-merge reader (`in_one`) build on; `CompactionPolicy` implementations
/// are expected to call it rather than reimplement the interleave.
///
/// Either input may itself carry adjacent duplicate keys — this is only
/// possible for a level-0 run, since levels at depth ≥ 1 never hold more
/// than one item per key (`SPEC_FULL.md` §3) — in which case the last
/// (most recently inserted) occurrence in each run wins before the two
/// runs are interleaved.
pub fn merge_sorted_runs(new_run: &[Item], old_run: &[Item]) -> Vec<Item> {
    let new_run = dedupe_keep_last(new_run);
    let old_run = dedupe_keep_last(old_run);

    let mut out = Vec::with_capacity(new_run.len() + old_run.len());
    let (mut i, mut j) = (0, 0);

    while i < new_run.len() && j < old_run.len() {
        match new_run[i].key.cmp(&old_run[j].key) {
            std::cmp::Ordering::Less => {
                out.push(new_run[i].clone());
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(old_run[j].clone());
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                // Same key in both runs: the younger (new_run) item wins
                // and the older one is discarded entirely.
                out.push(new_run[i].clone());
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&new_run[i..]);
    out.extend_from_slice(&old_run[j..]);
    out
}

/// Collapses adjacent equal-key items, keeping the last (most recent) one
/// in each run. Assumes `items` is already sorted ascending by key with
/// ties broken by insertion order (exactly what a stable sort over a
/// level-0 read produces).
pub(crate) fn dedupe_keep_last(items: &[Item]) -> Vec<Item> {
    let mut out: Vec<Item> = Vec::with_capacity(items.len());
    for item in items {
        if out.last().is_some_and(|last: &Item| last.key == item.key) {
            out.pop();
        }
        out.push(item.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::Item;

    fn put(k: &str, offset: u64) -> Item {
        Item::put(k.as_bytes().to_vec(), offset, 1)
    }

    fn del(k: &str) -> Item {
        Item::tombstone(k.as_bytes().to_vec())
    }

    #[test]
    fn merge_interleaves_disjoint_keys() {
        let new_run = vec![put("b", 2), put("d", 4)];
        let old_run = vec![put("a", 1), put("c", 3)];
        let merged = merge_sorted_runs(&new_run, &old_run);
        let keys: Vec<_> = merged.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec()]);
    }

    #[test]
    fn merge_shallower_wins_on_duplicate_key() {
        let new_run = vec![put("a", 99)];
        let old_run = vec![put("a", 1)];
        let merged = merge_sorted_runs(&new_run, &old_run);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].offset, 99);
    }

    #[test]
    fn merge_tombstone_shadows_older_put() {
        let new_run = vec![del("a")];
        let old_run = vec![put("a", 1)];
        let merged = merge_sorted_runs(&new_run, &old_run);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].opt, crate::item::Opt::Del);
    }

    #[test]
    fn last_writer_wins_elides_tombstones_only_at_deepest() {
        let policy = LastWriterWins;
        let new_run = vec![del("a")];
        let old_run = vec![put("a", 1)];

        let not_deepest = policy.merge(&new_run, &old_run, false);
        assert_eq!(not_deepest.len(), 1);
        assert_eq!(not_deepest[0].opt, crate::item::Opt::Del);

        let deepest = policy.merge(&new_run, &old_run, true);
        assert!(deepest.is_empty());
    }

    #[test]
    fn last_writer_wins_keeps_live_puts_at_deepest() {
        let policy = LastWriterWins;
        let merged = policy.merge(&[put("a", 1)], &[], true);
        assert_eq!(merged.len(), 1);
    }
}
