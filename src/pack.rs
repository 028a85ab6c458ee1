//! Decoding packed object streams fetched from a remote.
//!
//! A pack is `Header → N × Record → Trailer`. Each record is either a
//! direct object (type tag, varint size, zlib payload) or a delta
//! against the id of an object that appeared *earlier in the same
//! stream*. The format does not record the compressed payload length,
//! so the record boundary is found by exhausting the decompressor and
//! asking it how many input bytes it consumed.
//!
//! Delta payloads are a copy/insert instruction stream: an opcode with
//! the top bit set copies a range out of the base (or out of the output
//! produced so far), an opcode with the top bit clear inserts its low
//! 7 bits' worth of literal bytes.

use std::collections::HashMap;
use std::io::Read;

use flate2::read::ZlibDecoder;
use sha1::{Digest, Sha1};

use crate::codec::ByteReader;
use crate::error::{Error, Result};
use crate::object::Object;
use crate::types::{ObjectId, ObjectKind};

/// magic tag at the start of a pack stream
pub const PACK_MAGIC: &[u8; 4] = b"PACK";

/// the one supported pack format version
pub const PACK_VERSION: u32 = 2;

/// The 3-bit type tag of a packed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PackedKind {
    Commit,
    Tree,
    Blob,
    Tag,
    /// recognized but unsupported: deltas against a byte offset
    DeltaOffset,
    /// delta against the id of an earlier object in the stream
    DeltaBase,
}

impl PackedKind {
    fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(PackedKind::Commit),
            2 => Ok(PackedKind::Tree),
            3 => Ok(PackedKind::Blob),
            4 => Ok(PackedKind::Tag),
            6 => Ok(PackedKind::DeltaOffset),
            7 => Ok(PackedKind::DeltaBase),
            _ => Err(Error::UnsupportedPackedObjectType(tag)),
        }
    }

    fn object_kind(self) -> Option<ObjectKind> {
        match self {
            PackedKind::Commit => Some(ObjectKind::Commit),
            PackedKind::Tree => Some(ObjectKind::Tree),
            PackedKind::Blob => Some(ObjectKind::Blob),
            PackedKind::Tag => Some(ObjectKind::Tag),
            PackedKind::DeltaOffset | PackedKind::DeltaBase => None,
        }
    }
}

/// Decode a pack stream into fully materialized objects, in stream
/// order, ready for the object store.
///
/// Deltas are resolved against a running id→object map as records are
/// decoded, so a base must precede every delta that references it.
pub fn parse_pack(data: &[u8]) -> Result<Vec<Object>> {
    let mut reader = ByteReader::new(data);

    if reader.read(4)? != PACK_MAGIC {
        return Err(Error::InvalidPackMagic);
    }

    let version = reader.read_u32()?;
    if version != PACK_VERSION {
        return Err(Error::UnsupportedPackVersion(version));
    }

    let count = reader.read_u32()?;
    let mut objects: Vec<Object> = Vec::with_capacity(count as usize);
    let mut by_id: HashMap<ObjectId, usize> = HashMap::new();

    for _ in 0..count {
        let record = parse_packed_object(&mut reader)?;

        let obj = match record {
            PackedRecord::Direct(obj) => obj,
            PackedRecord::Delta { base_id, payload } => {
                let base_pos = by_id
                    .get(&base_id)
                    .copied()
                    .ok_or_else(|| Error::ObjectNotFound(base_id.to_hex()))?;
                expand_delta(&payload, &objects[base_pos])?
            }
        };

        by_id.insert(obj.id(), objects.len());
        objects.push(obj);
    }

    let trailer = reader.read_sha1()?;
    let body_end = reader.position() - 20;
    let computed = Sha1::digest(&data[..body_end]);
    if trailer.as_bytes() != computed.as_slice() {
        return Err(Error::BadPackChecksum);
    }

    Ok(objects)
}

enum PackedRecord {
    Direct(Object),
    Delta { base_id: ObjectId, payload: Vec<u8> },
}

fn parse_packed_object(reader: &mut ByteReader<'_>) -> Result<PackedRecord> {
    let byte = reader.read_u8()?;
    let mut extended = byte & 0x80 != 0;

    let tag = (byte >> 4) & 0x7;
    let kind = PackedKind::from_tag(tag)?;
    if kind == PackedKind::DeltaOffset {
        return Err(Error::UnsupportedPackedObjectType(tag));
    }

    // the low 4 bits start the size; continuation bytes add 7 bits each
    let mut size = u64::from(byte & 0xf);
    let mut shift: u32 = 4;
    while extended {
        let byte = reader.read_u8()?;
        extended = byte & 0x80 != 0;
        if shift >= 64 {
            return Err(Error::InvalidVarint);
        }
        size |= u64::from(byte & 0x7f) << shift;
        shift += 7;
    }

    let base_id = if kind == PackedKind::DeltaBase {
        Some(reader.read_sha1()?)
    } else {
        None
    };

    // the compressed length is not recorded; let the decompressor find
    // the boundary and advance by what it actually consumed
    let mut decoder = ZlibDecoder::new(reader.remaining());
    let mut contents = Vec::new();
    decoder.read_to_end(&mut contents)?;
    reader.skip(decoder.total_in() as usize)?;

    if contents.len() as u64 != size {
        return Err(Error::InvalidObjectLength {
            expected: size,
            actual: contents.len() as u64,
        });
    }

    match base_id {
        Some(base_id) => Ok(PackedRecord::Delta {
            base_id,
            payload: contents,
        }),
        None => {
            // direct records always carry a concrete object kind
            let kind = kind
                .object_kind()
                .ok_or(Error::UnsupportedPackedObjectType(tag))?;
            Ok(PackedRecord::Direct(Object::new(kind, contents)))
        }
    }
}

/// Expand a copy/insert delta against its base object.
///
/// The expanded object inherits the base's kind.
fn expand_delta(payload: &[u8], base: &Object) -> Result<Object> {
    let mut reader = ByteReader::new(payload);

    let base_length = reader.read_leb128()?;
    let result_length = reader.read_leb128()?;

    if base.size != base_length {
        return Err(Error::InvalidBaseObjectLength {
            expected: base_length,
            actual: base.size,
        });
    }

    let source = &base.content;
    let mut dest: Vec<u8> = Vec::with_capacity(result_length as usize);

    while !reader.is_eof() {
        let opcode = reader.read_u8()?;

        if opcode & 0x80 != 0 {
            // copy: bits 0-3 select offset bytes, bits 4-5 length
            // bytes, both little-endian; bit 6 selects the source
            let mut offset: usize = 0;
            for i in 0..4 {
                if opcode & (1 << i) != 0 {
                    offset |= usize::from(reader.read_u8()?) << (i * 8);
                }
            }

            let mut length: usize = 0;
            for i in 0..2 {
                if opcode & (1 << (4 + i)) != 0 {
                    length |= usize::from(reader.read_u8()?) << (i * 8);
                }
            }
            if length == 0 {
                length = 1 << 16;
            }

            if opcode & 0x40 != 0 {
                // copy from the output produced so far; byte at a time
                // so a range overlapping the write position repeats
                if offset >= dest.len() {
                    return Err(Error::InvalidDeltaInstruction);
                }
                for i in 0..length {
                    let byte = dest[offset + i];
                    dest.push(byte);
                }
            } else {
                let end = offset
                    .checked_add(length)
                    .ok_or(Error::InvalidDeltaInstruction)?;
                if end > source.len() {
                    return Err(Error::InvalidDeltaInstruction);
                }
                dest.extend_from_slice(&source[offset..end]);
            }
        } else {
            // insert: low 7 bits of literal bytes from the delta stream
            let length = usize::from(opcode & 0x7f);
            dest.extend_from_slice(reader.read(length)?);
        }
    }

    if dest.len() as u64 != result_length {
        return Err(Error::InvalidResultObjectLength {
            expected: result_length,
            actual: dest.len() as u64,
        });
    }

    Ok(Object::new(base.kind, dest))
}
