//! Reading IFD entry values that may live inline or elsewhere in the file.
//!
//! Arrays such as TileOffsets and TileByteCounts are fetched with a single read
//! each, then decoded in memory.

use bytes::Bytes;

use crate::error::TiffError;
use crate::io::RangeReader;

use super::parser::{ByteOrder, IfdEntry, TiffHeader};
use super::tags::FieldType;

/// Upper bound on a single out-of-line value, to keep a corrupt count from
/// allocating gigabytes.
const MAX_VALUE_BYTES: u64 = 256 * 1024 * 1024;

pub struct ValueReader<'a, R: RangeReader> {
    reader: &'a R,
    header: &'a TiffHeader,
}

impl<'a, R: RangeReader> ValueReader<'a, R> {
    pub fn new(reader: &'a R, header: &'a TiffHeader) -> Self {
        Self { reader, header }
    }

    /// Raw bytes of an entry's value, inline or fetched from its offset.
    pub async fn read_bytes(&self, entry: &IfdEntry) -> Result<Bytes, TiffError> {
        let size = entry
            .value_byte_size()
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;

        if entry.is_inline {
            return Ok(Bytes::copy_from_slice(
                &entry.value_offset_bytes[..size as usize],
            ));
        }

        if size > MAX_VALUE_BYTES {
            return Err(TiffError::InvalidTagValue {
                tag: "value",
                message: format!("value of {} bytes exceeds limit", size),
            });
        }

        let offset = entry.value_offset(self.header.byte_order);
        Ok(self.reader.read_exact_at(offset, size as usize).await?)
    }

    /// Integer array (Short, Long or Long8) widened to u64.
    pub async fn read_u64_array(&self, entry: &IfdEntry) -> Result<Vec<u64>, TiffError> {
        let field_type = entry
            .field_type
            .ok_or(TiffError::UnknownFieldType(entry.field_type_raw))?;
        if entry.count == 0 {
            return Ok(Vec::new());
        }
        let bytes = self.read_bytes(entry).await?;
        parse_u64_array(&bytes, field_type, entry.count as usize, self.header.byte_order)
    }

    /// NUL-terminated ASCII value.
    pub async fn read_string(&self, entry: &IfdEntry) -> Result<String, TiffError> {
        if entry.field_type != Some(FieldType::Ascii) {
            return Err(TiffError::InvalidTagValue {
                tag: "string",
                message: format!("expected Ascii, got {:?}", entry.field_type),
            });
        }
        let bytes = self.read_bytes(entry).await?;
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
    }
}

/// Decode `count` integers of `field_type` from `bytes`.
pub fn parse_u64_array(
    bytes: &[u8],
    field_type: FieldType,
    count: usize,
    byte_order: ByteOrder,
) -> Result<Vec<u64>, TiffError> {
    let width = match field_type {
        FieldType::Short | FieldType::Long | FieldType::Long8 => field_type.size_in_bytes(),
        other => {
            return Err(TiffError::InvalidTagValue {
                tag: "array",
                message: format!("expected Short, Long or Long8, got {:?}", other),
            })
        }
    };

    let needed = count.saturating_mul(width);
    if bytes.len() < needed {
        return Err(TiffError::FileTooSmall {
            required: needed as u64,
            actual: bytes.len() as u64,
        });
    }

    Ok(bytes[..needed]
        .chunks_exact(width)
        .map(|chunk| match field_type {
            FieldType::Short => byte_order.read_u16(chunk) as u64,
            FieldType::Long => byte_order.read_u32(chunk) as u64,
            _ => byte_order.read_u64(chunk),
        })
        .collect())
}
