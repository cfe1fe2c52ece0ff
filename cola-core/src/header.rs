use crate::config::{FormatConfig, FORMAT_VERSION};
use crate::error::{Error, Result};
use crate::store::PositionalStore;
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use std::io::{Cursor, Read, Write};

/// The file's fixed-size header: per-level population, the largest key
/// ever inserted, and the membership filter's opaque bitset
/// (`SPEC_FULL.md` §3, §6).
///
/// The header manager persists the *entire* header as a single positional
/// write at offset 0 on every mutation — there is no partial-header update
/// path (`SPEC_FULL.md` §4.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub count: Vec<u32>,
    pub max_key: Vec<u8>,
    pub bitset: Vec<u8>,
}

impl Header {
    /// A fresh, empty header: every level at population zero, no max key
    /// yet, and a zeroed filter bitset.
    pub fn zeroed(cfg: &FormatConfig) -> Self {
        Header {
            count: vec![0; cfg.max_level],
            max_key: Vec::new(),
            bitset: vec![0; cfg.filter_bitset_size],
        }
    }

    /// Reads and decodes the header from offset 0 of `store`.
    pub fn load<S: PositionalStore>(cfg: &FormatConfig, store: &S) -> Result<Self> {
        let mut buf = vec![0u8; cfg.header_size()];
        store.read_at(0, &mut buf)?;
        Header::decode(cfg, &buf)
    }

    /// Writes the encoded header to offset 0 of `store`.
    pub fn persist<S: PositionalStore>(&self, cfg: &FormatConfig, store: &S) -> Result<()> {
        let mut buf = Vec::with_capacity(cfg.header_size());
        self.encode(cfg, &mut buf)?;
        store.write_at(0, &buf)?;
        Ok(())
    }

    fn decode(cfg: &FormatConfig, buf: &[u8]) -> Result<Self> {
        let mut r = Cursor::new(buf);

        let version = r.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::unsupported_version(version));
        }

        let mut count = Vec::with_capacity(cfg.max_level);
        for _ in 0..cfg.max_level {
            count.push(r.read_u32::<BE>()?);
        }

        let klen = r.read_u16::<BE>()? as usize;
        let mut max_key_buf = vec![0u8; cfg.max_key_size];
        r.read_exact(&mut max_key_buf)?;
        if klen > cfg.max_key_size {
            return Err(Error::CorruptHeader("max_key length exceeds max_key_size"));
        }
        max_key_buf.truncate(klen);

        let mut bitset = vec![0u8; cfg.filter_bitset_size];
        r.read_exact(&mut bitset)?;

        Ok(Header {
            count,
            max_key: max_key_buf,
            bitset,
        })
    }

    fn encode<W: Write>(&self, cfg: &FormatConfig, w: &mut W) -> Result<()> {
        w.write_u8(FORMAT_VERSION)?;
        for i in 0..cfg.max_level {
            w.write_u32::<BE>(*self.count.get(i).unwrap_or(&0))?;
        }
        if self.max_key.len() > cfg.max_key_size {
            return Err(Error::KeyTooLong {
                len: self.max_key.len(),
                max: cfg.max_key_size,
            });
        }
        w.write_u16::<BE>(self.max_key.len() as u16)?;
        w.write_all(&self.max_key)?;
        w.write_all(&vec![0u8; cfg.max_key_size - self.max_key.len()])?;

        if self.bitset.len() > cfg.filter_bitset_size {
            return Err(Error::FilterBitsetTooLong {
                len: self.bitset.len(),
                max: cfg.filter_bitset_size,
            });
        }
        w.write_all(&self.bitset)?;
        w.write_all(&vec![0u8; cfg.filter_bitset_size - self.bitset.len()])?;
        Ok(())
    }

    /// Updates `max_key` in place if `key` is greater, byte-string order
    /// (`SPEC_FULL.md` §4.5 step 3). Returns whether it changed.
    pub fn bump_max_key(&mut self, key: &[u8]) -> bool {
        if key > self.max_key.as_slice() {
            self.max_key = key.to_vec();
            true
        } else {
            false
        }
    }
}
