use crate::config::FORMAT_VERSION;

/// Errors that can occur while operating on a COLA file.
///
/// Mirrors the original's error taxonomy (`SPEC_FULL.md` §7): a positional
/// I/O failure is always fatal to the operation in progress, and the only
/// locally-recovered case is a missing file at `open`, which is handled
/// before it ever becomes an `Error` (see `Cola::open`).
#[derive(Debug)]
pub enum Error {
    /// A positional read or write failed.
    Io(std::io::Error),

    /// The file's header declares a format version this build does not
    /// understand.
    UnsupportedVersion { found: u8, expected: u8 },

    /// The header's own bytes are internally inconsistent (not an I/O
    /// problem — a value read back from a position this crate wrote to
    /// doesn't satisfy an invariant this crate established).
    CorruptHeader(&'static str),

    /// A key exceeds the bound configured for this file.
    KeyTooLong { len: usize, max: usize },

    /// A membership filter's serialized bitset exceeds `filter_bitset_size`.
    FilterBitsetTooLong { len: usize, max: usize },
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Io(e) => write!(f, "cola: I/O error: {e}"),
            Error::UnsupportedVersion { found, expected } => write!(
                f,
                "cola: unsupported format version {found} (expected {expected})"
            ),
            Error::CorruptHeader(reason) => write!(f, "cola: corrupt header: {reason}"),
            Error::KeyTooLong { len, max } => {
                write!(f, "cola: key of {len} bytes exceeds max_key_size {max}")
            }
            Error::FilterBitsetTooLong { len, max } => write!(
                f,
                "cola: filter bitset of {len} bytes exceeds filter_bitset_size {max}"
            ),
        }
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Error::Io(value)
    }
}

impl Error {
    pub(crate) fn unsupported_version(found: u8) -> Self {
        Error::UnsupportedVersion {
            found,
            expected: FORMAT_VERSION,
        }
    }
}

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

/// Outcome of a point lookup, distinguishing "found", "tombstoned" (the key
/// was explicitly deleted), and "absent" (never seen, or shadowed only by
/// itself) — see `SPEC_FULL.md` §4.6 and §9's resolved open question.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    Found { offset: u64, vlen: u32 },
    Tombstoned,
    Absent,
}

impl Lookup {
    pub fn is_found(&self) -> bool {
        matches!(self, Lookup::Found { .. })
    }
}
