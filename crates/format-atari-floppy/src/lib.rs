//! Atari ST floppy image formats: raw `.ST` sector dumps and the
//! track-granular RLE-compressed `.MSA` (Magic Shadow Archiver) format.

use std::fmt;

pub const SECTOR_SIZE: usize = 512;

#[derive(Debug)]
pub enum FloppyFormatError {
    /// `.ST` file size does not match any valid `(sides, tracks,
    /// sectors_per_track)` geometry.
    InvalidStSize(usize),
    /// `.MSA` header was truncated or carried the wrong magic bytes.
    InvalidMsaHeader,
    /// An `.MSA` track's RLE stream produced more or fewer bytes than
    /// its declared decoded size.
    MsaDecompressionOverrun,
    /// A write was attempted against a write-protected image.
    WriteProtected,
}

impl fmt::Display for FloppyFormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidStSize(size) => {
                write!(f, ".ST image size {size} does not match any known geometry")
            }
            Self::InvalidMsaHeader => write!(f, "invalid .MSA header"),
            Self::MsaDecompressionOverrun => write!(f, ".MSA track RLE decompression overran track size"),
            Self::WriteProtected => write!(f, "disk is write-protected"),
        }
    }
}

impl std::error::Error for FloppyFormatError {}

/// Disk geometry: sides, tracks, and sectors per track (bytes per
/// sector is fixed at 512 for the formats this crate supports).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub sides: u8,
    pub tracks: u8,
    pub sectors_per_track: u8,
}

/// A loaded floppy image addressed by linear block address:
/// `lba = (track * sides + side) * sectors_per_track + (sector - 1)`.
pub struct FloppyImage {
    data: Vec<u8>,
    geometry: Geometry,
    write_protect: bool,
}

impl FloppyImage {
    /// Parse a raw `.ST` sector dump. Geometry is deduced from file size
    /// by linear search over `sides in {1,2}`, `tracks in {79..=82}`,
    /// `sectors_per_track in {8..=12}`; the first match wins.
    pub fn from_st_bytes(data: Vec<u8>, write_protect: bool) -> Result<Self, FloppyFormatError> {
        for sides in [1u8, 2] {
            for tracks in 79u8..=82 {
                for spt in 8u8..=12 {
                    let expected = usize::from(sides) * usize::from(tracks) * usize::from(spt) * SECTOR_SIZE;
                    if data.len() == expected {
                        return Ok(Self {
                            data,
                            geometry: Geometry { sides, tracks, sectors_per_track: spt },
                            write_protect,
                        });
                    }
                }
            }
        }
        Err(FloppyFormatError::InvalidStSize(data.len()))
    }

    /// Parse an `.MSA` image: a 10-byte big-endian header followed by
    /// one entry per `(track, side)`, each a 2-byte track size and
    /// either a raw track (size == `sectors_per_track * 512`) or an RLE
    /// stream where byte `0xE5` introduces `{value, count_be}` and any
    /// other byte is literal.
    pub fn from_msa_bytes(bytes: &[u8], write_protect: bool) -> Result<Self, FloppyFormatError> {
        if bytes.len() < 10 || bytes[0] != 0x0E || bytes[1] != 0x0F {
            return Err(FloppyFormatError::InvalidMsaHeader);
        }
        let spt = u16::from_be_bytes([bytes[2], bytes[3]]);
        let sides_field = u16::from_be_bytes([bytes[4], bytes[5]]);
        let start_track = u16::from_be_bytes([bytes[6], bytes[7]]);
        let end_track = u16::from_be_bytes([bytes[8], bytes[9]]);
        let sides = sides_field + 1;
        let tracks = end_track - start_track + 1;
        let track_len = usize::from(spt) * SECTOR_SIZE;

        let mut out = vec![0u8; usize::from(tracks) * usize::from(sides) * track_len];
        let mut cursor = 10usize;
        for track in 0..tracks {
            for side in 0..sides {
                if cursor + 2 > bytes.len() {
                    return Err(FloppyFormatError::InvalidMsaHeader);
                }
                let stored_len = u16::from_be_bytes([bytes[cursor], bytes[cursor + 1]]) as usize;
                cursor += 2;
                let dest_start = (usize::from(track) * usize::from(sides) + usize::from(side)) * track_len;
                let dest = &mut out[dest_start..dest_start + track_len];

                if stored_len == track_len {
                    dest.copy_from_slice(&bytes[cursor..cursor + stored_len]);
                    cursor += stored_len;
                } else {
                    let src = &bytes[cursor..cursor + stored_len];
                    decompress_rle(src, dest)?;
                    cursor += stored_len;
                }
            }
        }

        Ok(Self {
            data: out,
            geometry: Geometry { sides: sides as u8, tracks: tracks as u8, sectors_per_track: spt as u8 },
            write_protect,
        })
    }

    #[must_use]
    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    #[must_use]
    pub fn write_protect(&self) -> bool {
        self.write_protect
    }

    fn offset(&self, lba: u32) -> usize {
        lba as usize * SECTOR_SIZE
    }

    #[must_use]
    pub fn read_sector(&self, lba: u32) -> &[u8] {
        let start = self.offset(lba);
        &self.data[start..start + SECTOR_SIZE]
    }

    pub fn write_sector(&mut self, lba: u32, bytes: &[u8]) -> Result<(), FloppyFormatError> {
        if self.write_protect {
            return Err(FloppyFormatError::WriteProtected);
        }
        let start = self.offset(lba);
        self.data[start..start + SECTOR_SIZE].copy_from_slice(bytes);
        Ok(())
    }

    #[must_use]
    pub fn total_sectors(&self) -> u32 {
        (self.data.len() / SECTOR_SIZE) as u32
    }
}

fn decompress_rle(src: &[u8], dest: &mut [u8]) -> Result<(), FloppyFormatError> {
    let mut si = 0usize;
    let mut di = 0usize;
    while si < src.len() {
        if di >= dest.len() {
            return Err(FloppyFormatError::MsaDecompressionOverrun);
        }
        let byte = src[si];
        si += 1;
        if byte == 0xE5 {
            if si + 3 > src.len() {
                return Err(FloppyFormatError::MsaDecompressionOverrun);
            }
            let value = src[si];
            let count = u16::from_be_bytes([src[si + 1], src[si + 2]]) as usize;
            si += 3;
            if di + count > dest.len() {
                return Err(FloppyFormatError::MsaDecompressionOverrun);
            }
            dest[di..di + count].fill(value);
            di += count;
        } else {
            dest[di] = byte;
            di += 1;
        }
    }
    if di != dest.len() {
        return Err(FloppyFormatError::MsaDecompressionOverrun);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_st_size() {
        assert!(FloppyImage::from_st_bytes(vec![0; 100], false).is_err());
    }

    #[test]
    fn autodetects_737280_byte_geometry() {
        let data = vec![0u8; 2 * 80 * 9 * 512];
        let img = FloppyImage::from_st_bytes(data, false).expect("valid geometry");
        assert_eq!(
            img.geometry(),
            Geometry { sides: 2, tracks: 80, sectors_per_track: 9 }
        );
    }

    #[test]
    fn read_write_round_trip() {
        let mut img = FloppyImage::from_st_bytes(vec![0; 2 * 80 * 9 * 512], false).unwrap();
        let sector: Vec<u8> = (0..512).map(|i| (i & 0xFF) as u8).collect();
        img.write_sector(42, &sector).unwrap();
        assert_eq!(img.read_sector(42), &sector[..]);
    }

    #[test]
    fn write_protected_image_rejects_writes() {
        let mut img = FloppyImage::from_st_bytes(vec![0; 2 * 80 * 9 * 512], true).unwrap();
        assert!(img.write_sector(0, &[0; 512]).is_err());
    }

    #[test]
    fn msa_rle_track_decompresses_expected_prefix() {
        let mut bytes = vec![0x0E, 0x0F, 0x00, 0x09, 0x00, 0x00, 0x00, 0x00, 0x00, 0x4F];
        // one side, 80 tracks nominally, but we only supply track 0 here
        // so construct a minimal single-track/single-side MSA for test
        // purposes: sides field = 0 -> 1 side; tracks = 0..=0x4F span is
        // too large for this unit test, so instead build a fresh minimal
        // header with end_track = start_track = 0.
        bytes[8] = 0x00;
        bytes[9] = 0x00;
        let track_len = 9 * 512;
        let rle: Vec<u8> = {
            let mut v = vec![0xE5, 0xFF, 0x00, 0x08]; // 8 x 0xFF
            v.extend_from_slice(&[0xAA, 0xAA]); // 2 literal 0xAA
            v.extend(std::iter::repeat(0x00).take(track_len - 10)); // pad with literal zeros
            v
        };
        let mut msa = bytes;
        msa.extend_from_slice(&(rle.len() as u16).to_be_bytes());
        msa.extend_from_slice(&rle);

        let img = FloppyImage::from_msa_bytes(&msa, false).expect("valid msa");
        let track = img.read_sector(0);
        assert_eq!(&track[0..8], &[0xFF; 8]);
        assert_eq!(&track[8..10], &[0xAA, 0xAA]);
    }
}
