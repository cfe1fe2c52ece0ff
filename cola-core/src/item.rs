use crate::config::FormatConfig;
use crate::error::{Error, Result};
use byteorder::{ReadBytesExt, WriteBytesExt, BE};
use std::io::{Read, Write};

/// Whether an item records a live value or a tombstone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opt {
    /// A logical delete of `key`.
    Del = 0,
    /// A live value; `offset`/`vlen` point at it in the external value log.
    Put = 1,
}

impl Opt {
    fn from_byte(b: u8) -> Result<Self> {
        match b {
            0 => Ok(Opt::Del),
            1 => Ok(Opt::Put),
            _ => Err(Error::CorruptHeader("item opt byte is neither PUT nor DEL")),
        }
    }
}

/// One fixed-width COLA record.
///
/// `key` is compared lexicographically as a byte string. `offset`/`vlen`
/// are opaque to this crate — they are a pointer into whatever external
/// value store the embedder uses; this crate never dereferences them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Item {
    pub key: Vec<u8>,
    pub opt: Opt,
    pub offset: u64,
    pub vlen: u32,
}

impl Item {
    pub fn put(key: impl Into<Vec<u8>>, offset: u64, vlen: u32) -> Self {
        Item {
            key: key.into(),
            opt: Opt::Put,
            offset,
            vlen,
        }
    }

    pub fn tombstone(key: impl Into<Vec<u8>>) -> Self {
        Item {
            key: key.into(),
            opt: Opt::Del,
            offset: 0,
            vlen: 0,
        }
    }

    /// Encodes this item into exactly `cfg.item_size()` bytes: a `u16`
    /// length prefix, the key zero-padded out to `max_key_size`, the op
    /// byte, the offset, and the value length.
    pub(crate) fn encode<W: Write>(&self, cfg: &FormatConfig, w: &mut W) -> Result<()> {
        if self.key.len() > cfg.max_key_size {
            return Err(Error::KeyTooLong {
                len: self.key.len(),
                max: cfg.max_key_size,
            });
        }
        w.write_u16::<BE>(self.key.len() as u16)?;
        w.write_all(&self.key)?;
        w.write_all(&vec![0u8; cfg.max_key_size - self.key.len()])?;
        w.write_u8(self.opt as u8)?;
        w.write_u64::<BE>(self.offset)?;
        w.write_u32::<BE>(self.vlen)?;
        Ok(())
    }

    pub(crate) fn decode<R: Read>(cfg: &FormatConfig, r: &mut R) -> Result<Self> {
        let klen = r.read_u16::<BE>()? as usize;
        let mut buf = vec![0u8; cfg.max_key_size];
        r.read_exact(&mut buf)?;
        if klen > cfg.max_key_size {
            return Err(Error::CorruptHeader("decoded key length exceeds max_key_size"));
        }
        buf.truncate(klen);
        let opt = Opt::from_byte(r.read_u8()?)?;
        let offset = r.read_u64::<BE>()?;
        let vlen = r.read_u32::<BE>()?;
        Ok(Item {
            key: buf,
            opt,
            offset,
            vlen,
        })
    }
}

impl Default for Item {
    /// A zeroed item used only to pre-fill `SlabBuffer` slots before a real
    /// read overwrites them (or, for the sentinel slot, never).
    fn default() -> Self {
        Item {
            key: Vec::new(),
            opt: Opt::Del,
            offset: 0,
            vlen: 0,
        }
    }
}
