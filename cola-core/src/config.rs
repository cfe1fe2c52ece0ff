/// On-disk format version stamped into every header.
///
/// Bumped whenever `HEADER_SIZE`, `ITEM_SIZE`, or the byte layout within
/// either changes in a way that would make an old file unreadable by a
/// newer build (or vice versa). The original C implementation this crate
/// is descended from never did this — opening a file built with different
/// constants silently misread it. See `SPEC_FULL.md` §10.3 and §9.
pub const FORMAT_VERSION: u8 = 1;

/// The one configuration record governing the COLA file format.
///
/// Both the writer that created a file and every later reader of it must be
/// constructed with an equivalent `FormatConfig` (same `max_key_size`,
/// `l0_item_capacity`, `max_level`, and `filter_bitset_size`). Nothing in
/// this crate persists the config itself; only `FORMAT_VERSION` is checked
/// at open, so mismatched configs on the same file are a caller error, not
/// one this crate can detect in general (same as the original).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatConfig {
    /// Maximum number of bytes a key may occupy.
    pub max_key_size: usize,
    /// Number of items level 0 (the insertion buffer) can hold before a
    /// merge is triggered.
    pub l0_item_capacity: usize,
    /// Number of levels, including level 0.
    pub max_level: usize,
    /// Size in bytes of the opaque membership-filter bitset carried in the
    /// header.
    pub filter_bitset_size: usize,
}

impl FormatConfig {
    /// Constructs a config from first principles; `l0_item_capacity` is the
    /// number of items level 0 can hold, not a byte size — the byte size of
    /// level 0 (`l0_size`) is derived from it and `item_size()`.
    pub fn new(
        max_key_size: usize,
        l0_item_capacity: usize,
        max_level: usize,
        filter_bitset_size: usize,
    ) -> Self {
        assert!(l0_item_capacity > 0, "l0_item_capacity must be positive");
        assert!(max_level >= 2, "max_level must allow at least one merge destination");
        FormatConfig {
            max_key_size,
            l0_item_capacity,
            max_level,
            filter_bitset_size,
        }
    }

    /// The reference configuration: a 256-byte key bound, 1024 items in L0,
    /// 12 levels (capacity grows by roughly 3 orders of magnitude top to
    /// bottom), and a 4 KiB membership-filter bitset.
    pub fn standard() -> Self {
        FormatConfig::new(256, 1024, 12, 4096)
    }

    /// Width in bytes of one fixed-width item record: a `u16` key length
    /// prefix, the zero-padded key buffer itself, a one-byte op tag, a
    /// 64-bit offset, and a 32-bit value length.
    pub fn item_size(&self) -> usize {
        2 + self.max_key_size + 1 + 8 + 4
    }

    /// Byte size of level 0.
    pub fn l0_size(&self) -> usize {
        self.l0_item_capacity * self.item_size()
    }

    /// Width in bytes of the fixed-size header: version byte, one 32-bit
    /// population counter per level, the max-key field (same encoding as an
    /// item's key: `u16` length prefix + zero-padded buffer), and the
    /// membership-filter bitset.
    pub fn header_size(&self) -> usize {
        1 + 4 * self.max_level + (2 + self.max_key_size) + self.filter_bitset_size
    }

    /// Byte offset at which level `i` begins.
    pub fn level_offset(&self, level: usize) -> u64 {
        let mut off = self.header_size() as u64;
        let l0 = self.l0_size() as u64;
        for j in 0..level {
            off += (1u64 << j) * l0;
        }
        off
    }

    /// Maximum number of items level `i` may hold, with `gap` items of
    /// headroom reserved so merge-capacity checks never overfill the level.
    pub fn level_max(&self, level: usize, gap: i64) -> i64 {
        let capacity = ((1u64 << level) * self.l0_size() as u64) / self.item_size() as u64;
        capacity as i64 - gap
    }
}
