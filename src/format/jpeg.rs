//! JPEG stream helpers for TIFF tiles.
//!
//! TIFF files with compression 7 often store quantization and Huffman tables
//! once, in the JPEGTables tag, and write each tile as an "abbreviated" stream
//! without them. Before a tile can be handed to a regular decoder the tables
//! have to be spliced back in:
//!
//! ```text
//! JPEGTables:  SOI DQT DHT EOI
//! tile:        SOI SOF SOS <scan> EOI
//! merged:      SOI DQT DHT SOF SOS <scan> EOI
//! ```

use bytes::{Bytes, BytesMut};

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];
const DQT: u8 = 0xDB;
const DHT: u8 = 0xC4;
const SOS: u8 = 0xDA;

/// Whether a tile stream lacks its own tables and needs JPEGTables merged in.
///
/// Walks marker segments up to the first SOS. A stream is abbreviated when
/// either DQT or DHT is missing before the scan starts.
pub fn needs_tables(data: &[u8]) -> bool {
    if data.len() < 4 || data[0..2] != SOI {
        return false;
    }

    let mut has_dqt = false;
    let mut has_dht = false;
    let mut pos = 2;

    while pos + 1 < data.len() {
        if data[pos] != 0xFF {
            pos += 1;
            continue;
        }
        let marker = data[pos + 1];
        match marker {
            // Fill bytes and standalone markers carry no length.
            0xFF => {
                pos += 1;
                continue;
            }
            0x01 | 0xD0..=0xD9 => {
                pos += 2;
                continue;
            }
            SOS => break,
            DQT => has_dqt = true,
            DHT => has_dht = true,
            _ => {}
        }
        if pos + 3 >= data.len() {
            break;
        }
        let length = u16::from_be_bytes([data[pos + 2], data[pos + 3]]) as usize;
        pos += 2 + length;
    }

    !(has_dqt && has_dht)
}

/// Splice a JPEGTables blob in front of an abbreviated tile stream.
///
/// Drops the EOI that terminates the tables and the SOI that opens the tile.
pub fn merge_jpeg_tables(tables: &[u8], tile_data: &[u8]) -> Bytes {
    if tables.is_empty() || tile_data.is_empty() {
        return Bytes::copy_from_slice(tile_data);
    }

    let tables_end = if tables.ends_with(&EOI) {
        tables.len() - 2
    } else {
        tables.len()
    };
    let tile_start = if tile_data.starts_with(&SOI) { 2 } else { 0 };

    let mut merged = BytesMut::with_capacity(tables_end + tile_data.len() - tile_start);
    merged.extend_from_slice(&tables[..tables_end]);
    merged.extend_from_slice(&tile_data[tile_start..]);
    merged.freeze()
}

/// Produce a decodable JPEG stream for a tile, merging tables only when needed.
pub fn prepare_tile_jpeg(tables: Option<&[u8]>, tile_data: Bytes) -> Bytes {
    match tables {
        Some(tables) if needs_tables(&tile_data) => merge_jpeg_tables(tables, &tile_data),
        _ => tile_data,
    }
}
