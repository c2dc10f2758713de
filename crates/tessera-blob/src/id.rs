//! Blob identifiers.
//!
//! A [`BlobId`] is an ordered list of [`BlobPart`]s. Its text form is the hex
//! encoding of the parts' binary encodings laid end to end:
//!
//! ```text
//! inline:    0x00 varint(len) bytes[len]
//! chunk:     0x01 varint(len) hash[32]
//! indirect:  0x02 varint(level) varint(len) varint(index_len) hash[32]
//! ```
//!
//! All integers are unsigned LEB128. The empty string is the empty blob.
//! Because parts are self-delimiting, concatenating the text of two ids
//! yields the id of the concatenated blobs, and parsing it recovers the
//! flat, ordered part list of both.

use std::fmt;
use std::str::FromStr;

use tessera_types::chunk::CHUNK_ID_LEN;
use tessera_types::ChunkId;
use thiserror::Error;

const TAG_INLINE: u8 = 0x00;
const TAG_CHUNK: u8 = 0x01;
const TAG_INDIRECT: u8 = 0x02;

/// Errors from parsing a blob id or the contents of an index chunk.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IdError {
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    #[error("unknown part tag {tag:#04x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("truncated part at byte {offset}")]
    Truncated { offset: usize },

    #[error("varint overflow at byte {offset}")]
    VarintOverflow { offset: usize },

    #[error("indirect part at byte {offset} has level 0")]
    ZeroLevel { offset: usize },

    #[error("index chunk {index} of level {level} holds a part of level {found}")]
    LevelNotDecreasing {
        index: ChunkId,
        level: u32,
        found: u32,
    },

    #[error("index chunk {index} covers {actual} bytes but its reference records {expected}")]
    IndexLengthMismatch {
        index: ChunkId,
        expected: u64,
        actual: u64,
    },

    #[error("part lengths add up to more than u64::MAX bytes")]
    LengthOverflow,
}

/// One self-delimiting piece of a blob.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum BlobPart {
    /// Payload bytes carried in the id itself; no chunk backs them.
    Inline(Vec<u8>),
    /// A single stored data chunk of `len` bytes.
    Chunk { id: ChunkId, len: u64 },
    /// A stored index chunk whose content is itself an encoded part list
    /// covering `len` blob bytes. `index_len` is the size of the index chunk.
    /// Every part inside has a level strictly below `level`.
    Indirect {
        id: ChunkId,
        level: u32,
        len: u64,
        index_len: u64,
    },
}

impl BlobPart {
    /// Number of blob bytes this part stands for.
    pub fn length(&self) -> u64 {
        match self {
            Self::Inline(data) => data.len() as u64,
            Self::Chunk { len, .. } | Self::Indirect { len, .. } => *len,
        }
    }

    /// Indirection depth: 0 for inline and data chunks.
    pub fn level(&self) -> u32 {
        match self {
            Self::Indirect { level, .. } => *level,
            _ => 0,
        }
    }

    /// The stored chunk this part references, if any.
    pub fn chunk_id(&self) -> Option<&ChunkId> {
        match self {
            Self::Inline(_) => None,
            Self::Chunk { id, .. } | Self::Indirect { id, .. } => Some(id),
        }
    }

    /// Size of this part's binary encoding.
    pub fn encoded_len(&self) -> usize {
        match self {
            Self::Inline(data) => 1 + varint_len(data.len() as u64) + data.len(),
            Self::Chunk { len, .. } => 1 + varint_len(*len) + CHUNK_ID_LEN,
            Self::Indirect {
                level,
                len,
                index_len,
                ..
            } => {
                1 + varint_len(u64::from(*level))
                    + varint_len(*len)
                    + varint_len(*index_len)
                    + CHUNK_ID_LEN
            }
        }
    }

    fn encode_into(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Inline(data) => {
                buf.push(TAG_INLINE);
                encode_varint(buf, data.len() as u64);
                buf.extend_from_slice(data);
            }
            Self::Chunk { id, len } => {
                buf.push(TAG_CHUNK);
                encode_varint(buf, *len);
                buf.extend_from_slice(id.as_bytes());
            }
            Self::Indirect {
                id,
                level,
                len,
                index_len,
            } => {
                buf.push(TAG_INDIRECT);
                encode_varint(buf, u64::from(*level));
                encode_varint(buf, *len);
                encode_varint(buf, *index_len);
                buf.extend_from_slice(id.as_bytes());
            }
        }
    }
}

impl fmt::Debug for BlobPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inline(data) => write!(f, "Inline({} bytes)", data.len()),
            Self::Chunk { id, len } => write!(f, "Chunk({}, {len})", id.short_hex()),
            Self::Indirect {
                id, level, len, ..
            } => write!(f, "Indirect({}, level {level}, {len})", id.short_hex()),
        }
    }
}

/// Handle to an immutable blob: empty, inline, single-chunk or combined.
///
/// The total length is checked and cached when the id is built, so every
/// `BlobId` in hand covers at most `u64::MAX` bytes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct BlobId {
    parts: Vec<BlobPart>,
    len: u64,
}

impl BlobId {
    /// The zero-length blob. Its text form is `""`.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an id from an ordered part list.
    pub fn from_parts(parts: Vec<BlobPart>) -> Result<Self, IdError> {
        let len = total_length(&parts)?;
        Ok(Self { parts, len })
    }

    /// Parse the text form.
    pub fn parse(text: &str) -> Result<Self, IdError> {
        let bytes = hex::decode(text).map_err(|e| IdError::InvalidHex(e.to_string()))?;
        Self::decode(&bytes)
    }

    /// Decode the binary form (the bytes the text form is hex of, and the
    /// content of index chunks).
    pub fn decode(bytes: &[u8]) -> Result<Self, IdError> {
        let mut parts = Vec::new();
        let mut offset = 0;
        while offset < bytes.len() {
            let (part, consumed) = decode_part(bytes, offset)?;
            parts.push(part);
            offset += consumed;
        }
        Self::from_parts(parts)
    }

    /// Binary encoding of every part, in order.
    pub fn to_bytes(&self) -> Vec<u8> {
        encode_parts(&self.parts)
    }

    /// Concatenate blobs: the result reads as each input in turn.
    pub fn concat<'a, I>(ids: I) -> Result<Self, IdError>
    where
        I: IntoIterator<Item = &'a BlobId>,
    {
        let mut parts = Vec::new();
        let mut len = 0u64;
        for id in ids {
            len = len.checked_add(id.len).ok_or(IdError::LengthOverflow)?;
            parts.extend(id.parts.iter().cloned());
        }
        Ok(Self { parts, len })
    }

    /// The ordered parts.
    pub fn parts(&self) -> &[BlobPart] {
        &self.parts
    }

    /// Take ownership of the ordered parts.
    pub fn into_parts(self) -> Vec<BlobPart> {
        self.parts
    }

    /// Whether this is the empty blob.
    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }

    /// Blob length in bytes. Needs no chunk access: every part records its
    /// own length.
    pub fn length(&self) -> u64 {
        self.len
    }

    /// Whether the blob is carried entirely in the id, with no backing chunk.
    pub fn is_inline(&self) -> bool {
        self.parts.iter().all(|p| matches!(p, BlobPart::Inline(_)))
    }
}

impl fmt::Display for BlobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl FromStr for BlobId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<BlobId> for String {
    fn from(id: BlobId) -> Self {
        id.to_string()
    }
}

/// Sum of the part lengths, or [`IdError::LengthOverflow`] past `u64::MAX`.
pub(crate) fn total_length(parts: &[BlobPart]) -> Result<u64, IdError> {
    parts.iter().try_fold(0u64, |total, part| {
        total.checked_add(part.length()).ok_or(IdError::LengthOverflow)
    })
}

/// Binary encoding of a part list.
pub(crate) fn encode_parts(parts: &[BlobPart]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(parts.iter().map(BlobPart::encoded_len).sum());
    for part in parts {
        part.encode_into(&mut buf);
    }
    buf
}

fn decode_part(bytes: &[u8], start: usize) -> Result<(BlobPart, usize), IdError> {
    let tag = bytes[start];
    let mut offset = start + 1;
    let part = match tag {
        TAG_INLINE => {
            let len = read_varint(bytes, &mut offset)?;
            let data = take(bytes, &mut offset, len)?;
            BlobPart::Inline(data.to_vec())
        }
        TAG_CHUNK => {
            let len = read_varint(bytes, &mut offset)?;
            let id = read_chunk_id(bytes, &mut offset)?;
            BlobPart::Chunk { id, len }
        }
        TAG_INDIRECT => {
            let level_at = offset;
            let level = read_varint(bytes, &mut offset)?;
            let level = u32::try_from(level).map_err(|_| IdError::VarintOverflow { offset: level_at })?;
            if level == 0 {
                return Err(IdError::ZeroLevel { offset: start });
            }
            let len = read_varint(bytes, &mut offset)?;
            let index_len = read_varint(bytes, &mut offset)?;
            let id = read_chunk_id(bytes, &mut offset)?;
            BlobPart::Indirect {
                id,
                level,
                len,
                index_len,
            }
        }
        other => {
            return Err(IdError::UnknownTag {
                tag: other,
                offset: start,
            })
        }
    };
    Ok((part, offset - start))
}

fn take<'a>(bytes: &'a [u8], offset: &mut usize, len: u64) -> Result<&'a [u8], IdError> {
    let remaining = (bytes.len() - *offset) as u64;
    if len > remaining {
        return Err(IdError::Truncated { offset: *offset });
    }
    let start = *offset;
    *offset += len as usize;
    Ok(&bytes[start..*offset])
}

fn read_chunk_id(bytes: &[u8], offset: &mut usize) -> Result<ChunkId, IdError> {
    let at = *offset;
    let hash = take(bytes, offset, CHUNK_ID_LEN as u64)?;
    ChunkId::from_slice(hash).map_err(|_| IdError::Truncated { offset: at })
}

fn read_varint(bytes: &[u8], offset: &mut usize) -> Result<u64, IdError> {
    let (value, consumed) = decode_varint(&bytes[*offset..], *offset)?;
    *offset += consumed;
    Ok(value)
}

/// Encode a u64 as a variable-length integer.
pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a variable-length integer. Returns (value, bytes_consumed).
/// `base` is the position of `data` within the whole id, for error reporting.
pub(crate) fn decode_varint(data: &[u8], base: usize) -> Result<(u64, usize), IdError> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift == 63 && byte > 1 {
            return Err(IdError::VarintOverflow { offset: base + i });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift > 63 {
            return Err(IdError::VarintOverflow { offset: base + i });
        }
    }
    Err(IdError::Truncated {
        offset: base + data.len(),
    })
}

fn varint_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.max(1).div_ceil(7)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(byte: u8, len: u64) -> BlobPart {
        BlobPart::Chunk {
            id: ChunkId::from_hash([byte; 32]),
            len,
        }
    }

    #[test]
    fn empty_text_is_empty_blob() {
        let id = BlobId::parse("").unwrap();
        assert!(id.is_empty());
        assert_eq!(id.length(), 0);
        assert_eq!(BlobId::empty().to_string(), "");
    }

    #[test]
    fn inline_text_form() {
        let id = BlobId::from_parts(vec![BlobPart::Inline(vec![0xab, 0xcd])]).unwrap();
        assert_eq!(id.to_string(), "0002abcd");
        assert_eq!(BlobId::parse("0002abcd").unwrap(), id);
        assert!(id.is_inline());
    }

    #[test]
    fn chunk_part_encodes_length_then_hash() {
        let id = BlobId::from_parts(vec![chunk(0x11, 300)]).unwrap();
        let text = id.to_string();
        // tag 01, varint(300) = ac 02, then 32 hash bytes.
        assert!(text.starts_with("01ac02"));
        assert_eq!(text.len(), 2 * (1 + 2 + 32));
        assert_eq!(BlobId::parse(&text).unwrap(), id);
    }

    #[test]
    fn indirect_part_roundtrip() {
        let part = BlobPart::Indirect {
            id: ChunkId::from_hash([3; 32]),
            level: 2,
            len: 10_000_000,
            index_len: 4_500,
        };
        let id = BlobId::from_parts(vec![part.clone()]).unwrap();
        assert_eq!(id.to_bytes().len(), part.encoded_len());
        assert_eq!(BlobId::parse(&id.to_string()).unwrap().parts(), &[part]);
    }

    #[test]
    fn text_concatenation_is_blob_concatenation() {
        let a = BlobId::from_parts(vec![BlobPart::Inline(vec![1, 2])]).unwrap();
        let b = BlobId::from_parts(vec![chunk(9, 5000), BlobPart::Inline(vec![3])]).unwrap();
        let joined = format!("{a}{b}");
        let parsed = BlobId::parse(&joined).unwrap();
        assert_eq!(parsed, BlobId::concat([&a, &b]).unwrap());
        assert_eq!(parsed.length(), a.length() + b.length());
        assert_eq!(parsed.parts().len(), 3);
    }

    #[test]
    fn nested_concatenation_flattens() {
        let a = BlobId::from_parts(vec![BlobPart::Inline(vec![1])]).unwrap();
        let ab = BlobId::concat([&a, &a]).unwrap();
        let abab = BlobId::concat([&ab, &ab]).unwrap();
        assert_eq!(abab.parts().len(), 4);
        assert_eq!(abab.to_string(), format!("{ab}{ab}"));
    }

    #[test]
    fn uppercase_hex_is_accepted() {
        let id = BlobId::from_parts(vec![BlobPart::Inline(vec![0xab])]).unwrap();
        assert_eq!(BlobId::parse(&id.to_string().to_uppercase()).unwrap(), id);
    }

    // -----------------------------------------------------------------------
    // Malformed ids
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            BlobId::parse("ff").unwrap_err(),
            IdError::UnknownTag { tag: 0xff, offset: 0 }
        );
    }

    #[test]
    fn odd_length_and_bad_chars_are_rejected() {
        assert!(matches!(BlobId::parse("0"), Err(IdError::InvalidHex(_))));
        assert!(matches!(BlobId::parse("zz"), Err(IdError::InvalidHex(_))));
    }

    #[test]
    fn truncated_inline_payload_is_rejected() {
        // Claims 5 bytes, carries 2.
        assert_eq!(
            BlobId::parse("00050102").unwrap_err(),
            IdError::Truncated { offset: 2 }
        );
    }

    #[test]
    fn truncated_hash_is_rejected() {
        let text = BlobId::from_parts(vec![chunk(1, 10)]).unwrap().to_string();
        let cut = &text[..text.len() - 2];
        assert!(matches!(BlobId::parse(cut), Err(IdError::Truncated { .. })));
    }

    #[test]
    fn truncated_varint_is_rejected() {
        assert_eq!(
            BlobId::parse("0180").unwrap_err(),
            IdError::Truncated { offset: 2 }
        );
    }

    #[test]
    fn overlong_varint_is_rejected() {
        let text = format!("01{}", "ff".repeat(10));
        assert!(matches!(
            BlobId::parse(&text),
            Err(IdError::VarintOverflow { .. })
        ));
    }

    #[test]
    fn zero_level_indirect_is_rejected() {
        let mut bytes = vec![TAG_INDIRECT, 0, 1, 1];
        bytes.extend_from_slice(&[0u8; 32]);
        assert_eq!(
            BlobId::decode(&bytes).unwrap_err(),
            IdError::ZeroLevel { offset: 0 }
        );
    }

    #[test]
    fn lengths_past_u64_max_are_rejected() {
        // A chunk claiming u64::MAX bytes followed by a one-byte chunk.
        let text = format!(
            "01{}01{}0101{}",
            "ff".repeat(9),
            "aa".repeat(32),
            "bb".repeat(32)
        );
        assert_eq!(BlobId::parse(&text).unwrap_err(), IdError::LengthOverflow);
    }

    #[test]
    fn lengths_up_to_u64_max_are_accepted() {
        let id = BlobId::from_parts(vec![chunk(1, u64::MAX - 1), chunk(2, 1)]).unwrap();
        assert_eq!(id.length(), u64::MAX);
        assert_eq!(BlobId::parse(&id.to_string()).unwrap().length(), u64::MAX);
    }

    #[test]
    fn concat_past_u64_max_is_rejected() {
        let big = BlobId::from_parts(vec![chunk(1, u64::MAX)]).unwrap();
        let one = BlobId::from_parts(vec![chunk(2, 1)]).unwrap();
        assert_eq!(BlobId::concat([&big, &one]).unwrap_err(), IdError::LengthOverflow);
    }

    // -----------------------------------------------------------------------
    // Varint helpers
    // -----------------------------------------------------------------------

    #[test]
    fn varint_len_matches_encoding() {
        for value in [0, 1, 127, 128, 16_383, 16_384, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            encode_varint(&mut buf, value);
            assert_eq!(buf.len(), varint_len(value), "value {value}");
            assert_eq!(decode_varint(&buf, 0).unwrap(), (value, buf.len()));
        }
    }
}
