use crate::config::FormatConfig;
use crate::error::{Error, Lookup, Result};
use crate::filter::MembershipFilter;
use crate::header::Header;
use crate::item::{Item, Opt};
use crate::merge::{dedupe_keep_last, CompactionPolicy};
use crate::stats::StatsSink;
use crate::store::PositionalStore;
use cola_support::{insertion_sort_by_key, SlabBuffer};

/// The durable, level-merging key index (`SPEC_FULL.md` §4.4).
///
/// `S`, `F`, `C`, and `T` are the four collaborators this crate never hard
/// codes a concrete implementation of: the byte store, the membership
/// filter, the compaction policy, and the stats sink (`SPEC_FULL.md` §6).
/// A fresh handle with no opinions about any of them is `Cola::open` with
/// [`crate::filter::AcceptAllFilter`], [`crate::merge::LastWriterWins`], and
/// [`crate::stats::NoopStats`].
pub struct Cola<S, F, C, T> {
    cfg: FormatConfig,
    store: S,
    header: Header,
    filter: F,
    policy: C,
    stats: T,
    /// Set once every non-terminal level is at or past its `gap = 3`
    /// capacity bound (`SPEC_FULL.md` §4.4, §8 scenario 4). The embedder is
    /// expected to notice this and open a fresh, larger file; this crate
    /// does not reclaim space or grow a level's capacity on its own.
    pub willfull: bool,
}

impl<S, F, C, T> Cola<S, F, C, T>
where
    S: PositionalStore,
    F: MembershipFilter,
    C: CompactionPolicy,
    T: StatsSink,
{
    /// Opens `store` as a COLA file, initializing a fresh header if `store`
    /// is empty (a brand new file or an empty in-memory store) and loading
    /// the existing one otherwise.
    pub fn open(cfg: FormatConfig, store: S, policy: C, stats: T) -> Result<Self> {
        let header = if store.len()? == 0 {
            Header::zeroed(&cfg)
        } else {
            Header::load(&cfg, &store)?
        };
        let filter = F::from_bitset(&header.bitset);

        Ok(Cola {
            cfg,
            store,
            header,
            filter,
            policy,
            stats,
            // Matches the original: `willfull` starts false on every open,
            // even reopening a file a previous session left saturated. It
            // is only ever (re)computed by `check_merge`, which a caller
            // triggers again on the next `add` that crosses L0's trigger.
            willfull: false,
        })
    }

    /// Drops the handle, flushing nothing further — every mutation already
    /// persisted its header synchronously (`SPEC_FULL.md` §4.3).
    pub fn close(self) {}

    /// The format this handle was opened with.
    pub fn config(&self) -> &FormatConfig {
        &self.cfg
    }

    /// Current population of `level` (0-indexed). Exposed for diagnostics
    /// and tests, mirroring what the original's `cola_dump` prints.
    pub fn level_count(&self, level: usize) -> u32 {
        self.header.count[level]
    }

    /// Resets the in-memory header back to empty: every level's count to
    /// zero, the max key cleared, and the filter rebuilt empty. Mirrors the
    /// original's `cola_truncate`: this is a logical reset only, nothing is
    /// persisted and the file's bytes are untouched (`SPEC_FULL.md` §9).
    /// A caller that wants the on-disk bytes gone has to remove/recreate
    /// the file itself; the next `add` after a `truncate` is what makes the
    /// zeroed header durable.
    pub fn truncate(&mut self) {
        self.header = Header::zeroed(&self.cfg);
        self.filter = F::from_bitset(&self.header.bitset);
        self.willfull = false;
    }

    /// Inserts `item` at level 0, then runs the merge engine if level 0 is
    /// now at capacity (`SPEC_FULL.md` §4.5).
    pub fn add(&mut self, item: Item) -> Result<()> {
        if item.key.len() > self.cfg.max_key_size {
            return Err(Error::KeyTooLong {
                len: item.key.len(),
                max: self.cfg.max_key_size,
            });
        }

        if item.opt == Opt::Put {
            self.filter.add(&item.key);
            self.header.bitset = self.filter.bitset().to_vec();
        }
        self.header.bump_max_key(&item.key);

        let slot = self.header.count[0] as u64;
        let offset = self.cfg.level_offset(0) + slot * self.cfg.item_size() as u64;
        let mut buf = Vec::with_capacity(self.cfg.item_size());
        item.encode(&self.cfg, &mut buf)?;
        self.store.write_at(offset, &buf)?;
        self.header.count[0] += 1;
        self.header.persist(&self.cfg, &self.store)?;

        if self.header.count[0] as i64 >= self.cfg.level_max(0, 1) {
            self.check_merge()?;
        }
        Ok(())
    }

    /// Looks `key` up, shallowest level first (`SPEC_FULL.md` §4.6).
    ///
    /// Level 0 is read whole and sorted in memory (duplicates are possible
    /// there; the most recently inserted version of a key wins). Levels at
    /// depth ≥ 1 are searched by binary search directly against the store,
    /// since each holds no more than one entry per key. This never
    /// consults the membership filter itself — a key that was only ever
    /// tombstoned is never added to the filter (`add` only calls
    /// `filter.add` for `Opt::Put`), so short-circuiting here on
    /// `!filter.contains(key)` would turn a tombstoned key into a false
    /// `Absent` instead of `Tombstoned`. Consulting the filter to skip a
    /// definite negative before calling `get` is the caller's job
    /// (`SPEC_FULL.md` §4.6).
    pub fn get(&self, key: &[u8]) -> Result<Lookup> {
        let l0 = dedupe_keep_last(&self.read_level_tail(0, self.header.count[0] as usize)?);
        if let Ok(idx) = l0.binary_search_by(|it| it.key.as_slice().cmp(key)) {
            return Ok(Self::lookup_of(&l0[idx]));
        }

        for level in 1..self.cfg.max_level {
            let count = self.header.count[level] as usize;
            if count == 0 {
                continue;
            }
            if let Some(item) = self.binary_search_level(level, count, key)? {
                return Ok(Self::lookup_of(&item));
            }
        }
        Ok(Lookup::Absent)
    }

    fn lookup_of(item: &Item) -> Lookup {
        match item.opt {
            Opt::Put => Lookup::Found {
                offset: item.offset,
                vlen: item.vlen,
            },
            Opt::Del => Lookup::Tombstoned,
        }
    }

    fn binary_search_level(&self, level: usize, count: usize, key: &[u8]) -> Result<Option<Item>> {
        let (mut lo, mut hi) = (0usize, count);
        let item_size = self.cfg.item_size() as u64;
        let base = self.cfg.level_offset(level);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let mut raw = vec![0u8; self.cfg.item_size()];
            self.store.read_at(base + mid as u64 * item_size, &mut raw)?;
            let item = Item::decode(&self.cfg, &mut &raw[..])?;
            match key.cmp(item.key.as_slice()) {
                std::cmp::Ordering::Equal => return Ok(Some(item)),
                std::cmp::Ordering::Less => hi = mid,
                std::cmp::Ordering::Greater => lo = mid + 1,
            }
        }
        Ok(None)
    }

    /// Merges every populated level down into a single ascending run with
    /// no duplicate keys and no tombstones — the full-merge reader used for
    /// rebuild/compaction (`SPEC_FULL.md` §4.7, named after the original's
    /// `cola_in_one`).
    pub fn in_one(&mut self) -> Result<Vec<Item>> {
        let last_non_empty = (0..self.cfg.max_level).rev().find(|&i| self.header.count[i] > 0);

        let mut acc: Vec<Item> = Vec::new();
        for level in 0..self.cfg.max_level {
            let count = self.header.count[level] as usize;
            if count == 0 {
                continue;
            }
            let run = self.read_level_tail(level, count)?;
            let is_last = Some(level) == last_non_empty;

            acc = if acc.is_empty() {
                if is_last {
                    self.policy.merge(&run, &[], true)
                } else {
                    run
                }
            } else {
                self.policy.merge(&acc, &run, is_last)
            };
        }
        self.stats.incr_full_scan_compactions();
        Ok(acc)
    }

    /// Scans every level from the deepest to the shallowest
    /// (`SPEC_FULL.md` §4.4). For the deepest level, a population at or past
    /// its `gap = 3` bound just counts toward `full` (there is no level
    /// below it to push into). For every other level, if its *destination*
    /// is already at or past that bound, the level is blocked and also
    /// counts toward `full` without being checked itself; only once the
    /// destination has room does this level's own population get compared
    /// against its bound to decide whether (and how much) to push.
    fn check_merge(&mut self) -> Result<()> {
        let max_level = self.cfg.max_level;
        let mut full = 0usize;

        for level in (0..max_level).rev() {
            let capacity = self.cfg.level_max(level, 3);
            let count = self.header.count[level] as i64;

            if level == max_level - 1 {
                if count >= capacity {
                    full += 1;
                }
                continue;
            }

            let next_capacity = self.cfg.level_max(level + 1, 3);
            let next_count = self.header.count[level + 1] as i64;
            if next_count >= next_capacity {
                full += 1;
                continue;
            }

            if count >= capacity {
                let room = next_capacity - (count + next_count);
                if room >= 0 {
                    self.merge_to_next(level, count as usize)?;
                } else {
                    let diff = next_capacity - next_count;
                    if diff > 0 {
                        self.merge_to_next(level, diff as usize)?;
                    }
                }
            }
        }

        self.willfull = full >= max_level - 1;
        if self.willfull {
            log::debug!(
                "cola: {full} of {} level transitions blocked, file needs reopening larger",
                max_level - 1
            );
            self.dump();
        }
        Ok(())
    }

    /// Merges the tail `m` items of `level` into `level + 1` and shrinks
    /// `level`'s count by `m` (`SPEC_FULL.md` §4.4). `level`'s remaining
    /// entries do not move; only the count changes, so the next write into
    /// `level` overwrites what used to be its tail.
    fn merge_to_next(&mut self, level: usize, m: usize) -> Result<()> {
        let destination = level + 1;
        let destination_count = self.header.count[destination] as usize;
        let destination_is_deepest = destination == self.cfg.max_level - 1;

        let new_run = self.read_level_tail(level, m)?;
        let old_run = self.read_level_tail(destination, destination_count)?;
        let merged = self.policy.merge(&new_run, &old_run, destination_is_deepest);

        self.write_level(destination, &merged)?;
        self.header.count[level] -= m as u32;
        self.header.count[destination] = merged.len() as u32;
        self.header.persist(&self.cfg, &self.store)?;
        self.stats.incr_level_merges();
        log::debug!(
            "cola: merged {m} item(s) from L{level} into L{destination} ({} item(s) now)",
            merged.len()
        );
        Ok(())
    }

    fn dump(&self) {
        for level in 0..self.cfg.max_level {
            log::debug!(
                "cola: L{level} count={} capacity={}",
                self.header.count[level],
                self.cfg.level_max(level, 0)
            );
        }
    }

    /// Reads the last `n` items physically stored in `level`. For level 0
    /// this also sorts the result in place (`SPEC_FULL.md` §4.2); the
    /// result may still carry adjacent duplicate keys for level 0 — callers
    /// that need uniqueness call [`dedupe_keep_last`] themselves.
    fn read_level_tail(&self, level: usize, n: usize) -> Result<Vec<Item>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        let count = self.header.count[level] as u64;
        let item_size = self.cfg.item_size() as u64;
        let start = self.cfg.level_offset(level) + (count - n as u64) * item_size;

        let mut raw = vec![0u8; n * self.cfg.item_size()];
        self.store.read_at(start, &mut raw)?;

        let mut slab: SlabBuffer<Item> = SlabBuffer::with_capacity(n);
        {
            let items = slab.as_mut_slice(n);
            for (slot, chunk) in items.iter_mut().zip(raw.chunks(self.cfg.item_size())) {
                *slot = Item::decode(&self.cfg, &mut &chunk[..])?;
            }
            if level == 0 {
                insertion_sort_by_key(items, |item| item.key.as_slice());
            }
        }
        Ok(slab.into_vec(n))
    }

    /// Writes `items` starting at the beginning of `level`, overwriting
    /// whatever was there.
    fn write_level(&mut self, level: usize, items: &[Item]) -> Result<()> {
        let mut buf = Vec::with_capacity(items.len() * self.cfg.item_size());
        for item in items {
            item.encode(&self.cfg, &mut buf)?;
        }
        self.store.write_at(self.cfg.level_offset(level), &buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::tiny;
    use crate::filter::AcceptAllFilter;
    use crate::merge::LastWriterWins;
    use crate::stats::NoopStats;
    use crate::store::MemoryStore;

    type TestCola = Cola<MemoryStore, AcceptAllFilter, LastWriterWins, NoopStats>;

    fn fresh() -> TestCola {
        Cola::open(tiny(), MemoryStore::new(), LastWriterWins, NoopStats).unwrap()
    }

    #[test]
    fn get_on_empty_file_is_absent() {
        let cola = fresh();
        assert_eq!(cola.get(b"missing").unwrap(), Lookup::Absent);
    }

    #[test]
    fn put_then_get_round_trips_without_a_merge() {
        let mut cola = fresh();
        cola.add(Item::put(b"a".to_vec(), 10, 3)).unwrap();
        cola.add(Item::put(b"b".to_vec(), 20, 4)).unwrap();
        assert_eq!(cola.header.count[0], 2);
        assert_eq!(cola.get(b"a").unwrap(), Lookup::Found { offset: 10, vlen: 3 });
        assert_eq!(cola.get(b"b").unwrap(), Lookup::Found { offset: 20, vlen: 4 });
        assert_eq!(cola.get(b"c").unwrap(), Lookup::Absent);
    }

    #[test]
    fn duplicate_key_in_l0_resolves_to_latest_insert() {
        let mut cola = fresh();
        cola.add(Item::put(b"k".to_vec(), 1, 1)).unwrap();
        cola.add(Item::put(b"k".to_vec(), 2, 1)).unwrap();
        assert_eq!(cola.get(b"k").unwrap(), Lookup::Found { offset: 2, vlen: 1 });
    }

    #[test]
    fn three_inserts_stay_in_l0_unmerged() {
        // tiny() has level_max(0, 1) = 4: the add-path trigger only fires
        // once L0 holds its 4th item, so three distinct inserts sit in L0
        // untouched (`SPEC_FULL.md` §8 scenario 1).
        let mut cola = fresh();
        cola.add(Item::put(b"a".to_vec(), 10, 1)).unwrap();
        cola.add(Item::put(b"b".to_vec(), 11, 1)).unwrap();
        cola.add(Item::put(b"c".to_vec(), 12, 1)).unwrap();
        assert_eq!(cola.header.count[0], 3);
        assert_eq!(cola.header.count[1], 0);
        assert_eq!(cola.get(b"b").unwrap(), Lookup::Found { offset: 11, vlen: 1 });
        assert_eq!(cola.header.max_key, b"c");
    }

    #[test]
    fn filling_l0_triggers_a_merge_into_level_one() {
        let mut cola = fresh();
        // The fourth distinct insert crosses the trigger and pushes every
        // item in L0 into level 1 (`SPEC_FULL.md` §8 scenario 2).
        cola.add(Item::put(b"a".to_vec(), 1, 1)).unwrap();
        cola.add(Item::put(b"b".to_vec(), 2, 1)).unwrap();
        cola.add(Item::put(b"c".to_vec(), 3, 1)).unwrap();
        cola.add(Item::put(b"d".to_vec(), 4, 1)).unwrap();
        assert_eq!(cola.header.count[0] + cola.header.count[1], 4);
        assert_eq!(cola.header.count[0], 0);
        assert_eq!(cola.header.count[1], 4);
        assert_eq!(cola.get(b"a").unwrap(), Lookup::Found { offset: 1, vlen: 1 });
        assert_eq!(cola.get(b"d").unwrap(), Lookup::Found { offset: 4, vlen: 1 });
    }

    #[test]
    fn tombstone_shadows_a_merged_put() {
        let mut cola = fresh();
        cola.add(Item::put(b"a".to_vec(), 1, 1)).unwrap();
        cola.add(Item::put(b"b".to_vec(), 2, 1)).unwrap();
        cola.add(Item::put(b"c".to_vec(), 3, 1)).unwrap();
        cola.add(Item::put(b"d".to_vec(), 4, 1)).unwrap();
        assert_eq!(cola.header.count[1], 4);

        // Inserting into L0 again (now far from its own trigger) shadows
        // the already-merged PUT one level down without re-triggering a
        // merge (`SPEC_FULL.md` §8 scenario 3).
        cola.add(Item::tombstone(b"b".to_vec())).unwrap();
        assert_eq!(cola.header.count[0], 1);
        assert_eq!(cola.get(b"b").unwrap(), Lookup::Tombstoned);

        cola.add(Item::put(b"b".to_vec(), 99, 1)).unwrap();
        assert_eq!(cola.get(b"b").unwrap(), Lookup::Found { offset: 99, vlen: 1 });
    }

    #[test]
    fn truncate_clears_every_level() {
        let mut cola = fresh();
        cola.add(Item::put(b"a".to_vec(), 1, 1)).unwrap();
        cola.add(Item::put(b"b".to_vec(), 2, 1)).unwrap();
        cola.add(Item::put(b"c".to_vec(), 3, 1)).unwrap();
        cola.add(Item::put(b"d".to_vec(), 4, 1)).unwrap();
        assert_eq!(cola.header.count[1], 4);

        cola.truncate();
        assert!(cola.header.count.iter().all(|&c| c == 0));
        assert_eq!(cola.get(b"a").unwrap(), Lookup::Absent);
    }

    #[test]
    fn in_one_produces_one_sorted_deduplicated_live_run() {
        let mut cola = fresh();
        for (k, v) in [("c", 3u64), ("a", 1), ("b", 2)] {
            cola.add(Item::put(k.as_bytes().to_vec(), v, 1)).unwrap();
        }
        // The tombstone is the fourth insert, crossing L0's trigger and
        // landing all four records (including the tombstone) in level 1.
        cola.add(Item::tombstone(b"b".to_vec())).unwrap();
        // "b" now deleted; only "a" and "c" remain live.
        let merged = cola.in_one().unwrap();
        let keys: Vec<_> = merged.iter().map(|i| i.key.clone()).collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"c".to_vec()]);
        assert!(merged.iter().all(|i| i.opt == Opt::Put));
    }

    #[test]
    fn rejects_key_longer_than_configured_bound() {
        let mut cola = fresh();
        let oversized = vec![0u8; cola.cfg.max_key_size + 1];
        assert!(matches!(
            cola.add(Item::put(oversized, 0, 0)),
            Err(Error::KeyTooLong { .. })
        ));
    }

    #[test]
    fn reopening_an_existing_store_preserves_state() {
        let store = MemoryStore::new();
        {
            let mut cola: Cola<&MemoryStore, AcceptAllFilter, LastWriterWins, NoopStats> =
                Cola::open(tiny(), &store, LastWriterWins, NoopStats).unwrap();
            cola.add(Item::put(b"a".to_vec(), 1, 1)).unwrap();
        }
        let reopened: Cola<&MemoryStore, AcceptAllFilter, LastWriterWins, NoopStats> =
            Cola::open(tiny(), &store, LastWriterWins, NoopStats).unwrap();
        assert_eq!(reopened.get(b"a").unwrap(), Lookup::Found { offset: 1, vlen: 1 });
    }

    #[test]
    fn in_one_on_empty_file_is_empty() {
        let mut cola = fresh();
        assert!(cola.in_one().unwrap().is_empty());
    }

    #[test]
    fn tombstone_only_key_is_found_with_a_real_filter_wired_in() {
        // `add` only calls `filter.add` for `Opt::Put`, so a key that is
        // only ever tombstoned is never recorded in the membership filter.
        // With `BitsetFilter` actually wired in (not the always-true
        // `AcceptAllFilter` every other test here uses), `get` must still
        // walk the levels and report `Tombstoned` instead of treating the
        // filter miss as a definite negative.
        type RealFilterCola = Cola<MemoryStore, crate::filter::BitsetFilter, LastWriterWins, NoopStats>;
        let mut cola: RealFilterCola =
            Cola::open(tiny(), MemoryStore::new(), LastWriterWins, NoopStats).unwrap();

        cola.add(Item::tombstone(b"never-put".to_vec())).unwrap();
        assert_eq!(cola.get(b"never-put").unwrap(), Lookup::Tombstoned);
    }
}
