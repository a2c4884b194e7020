//! Builders for small tiled TIFFs used by unit tests.

/// One level of a generated pyramid. Every pixel of the level has `color`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TestLevel {
    pub width: u32,
    pub height: u32,
    pub tile: u32,
    pub color: [u8; 3],
}

impl TestLevel {
    pub fn new(width: u32, height: u32, tile: u32, color: [u8; 3]) -> Self {
        Self {
            width,
            height,
            tile,
            color,
        }
    }
}

fn entry(out: &mut Vec<u8>, tag: u16, field_type: u16, count: u32, value: u32) {
    out.extend_from_slice(&tag.to_le_bytes());
    out.extend_from_slice(&field_type.to_le_bytes());
    out.extend_from_slice(&count.to_le_bytes());
    out.extend_from_slice(&value.to_le_bytes());
}

/// Little-endian classic TIFF with one uncompressed RGB tiled IFD per level.
pub(crate) fn build_rgb_pyramid(levels: &[TestLevel]) -> Vec<u8> {
    let mut out = vec![b'I', b'I', 42, 0, 0, 0, 0, 0];
    let mut next_pos = 4usize;

    for level in levels {
        let tiles = level.width.div_ceil(level.tile) * level.height.div_ceil(level.tile);
        let tile_len = level.tile * level.tile * 3;

        let mut offsets = Vec::with_capacity(tiles as usize);
        for _ in 0..tiles {
            offsets.push(out.len() as u32);
            for _ in 0..level.tile * level.tile {
                out.extend_from_slice(&level.color);
            }
        }

        let offsets_pos = out.len() as u32;
        for offset in &offsets {
            out.extend_from_slice(&offset.to_le_bytes());
        }
        let counts_pos = out.len() as u32;
        for _ in 0..tiles {
            out.extend_from_slice(&tile_len.to_le_bytes());
        }
        let bps_pos = out.len() as u32;
        out.extend_from_slice(&[8, 0, 8, 0, 8, 0]);
        if out.len() % 2 == 1 {
            out.push(0);
        }

        let ifd_pos = out.len() as u32;
        out[next_pos..next_pos + 4].copy_from_slice(&ifd_pos.to_le_bytes());

        let (offsets_value, counts_value) = if tiles == 1 {
            (offsets[0], tile_len)
        } else {
            (offsets_pos, counts_pos)
        };

        out.extend_from_slice(&11u16.to_le_bytes());
        entry(&mut out, 256, 4, 1, level.width);
        entry(&mut out, 257, 4, 1, level.height);
        entry(&mut out, 258, 3, 3, bps_pos);
        entry(&mut out, 259, 3, 1, 1);
        entry(&mut out, 262, 3, 1, 2);
        entry(&mut out, 277, 3, 1, 3);
        entry(&mut out, 284, 3, 1, 1);
        entry(&mut out, 322, 4, 1, level.tile);
        entry(&mut out, 323, 4, 1, level.tile);
        entry(&mut out, 324, 4, tiles, offsets_value);
        entry(&mut out, 325, 4, tiles, counts_value);
        next_pos = out.len();
        out.extend_from_slice(&0u32.to_le_bytes());
    }

    out
}
