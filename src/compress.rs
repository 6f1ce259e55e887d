use std::io::{self, Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

pub trait Compressor {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>>;
    /// Output past `limit` bytes is an error
    fn decompress(&self, data: &[u8], limit: u64) -> std::io::Result<Vec<u8>>;
}

/// zlib wrapped deflate, each call is a complete stream
pub struct Zlib {
    level: Compression,
}

impl Zlib {
    pub fn new(level: u32) -> Self {
        Zlib {
            level: Compression::new(level),
        }
    }
}

impl Default for Zlib {
    fn default() -> Self {
        Zlib {
            level: Compression::default(),
        }
    }
}

impl Compressor for Zlib {
    fn compress(&self, data: &[u8]) -> std::io::Result<Vec<u8>> {
        let mut enc = ZlibEncoder::new(Vec::with_capacity(data.len() / 2 + 16), self.level);
        enc.write_all(data)?;
        enc.finish()
    }

    fn decompress(&self, data: &[u8], limit: u64) -> std::io::Result<Vec<u8>> {
        let mut out = Vec::with_capacity(data.len() * 2);
        ZlibDecoder::new(data)
            .take(limit.saturating_add(1))
            .read_to_end(&mut out)?;

        if out.len() as u64 > limit {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("chunk inflates past {} bytes", limit),
            ));
        }
        Ok(out)
    }
}

#[cfg(test)]
mod test_zlib {
    use super::*;

    #[test]
    fn empty_is_a_stream() {
        let zlib = Zlib::default();
        let packed = zlib.compress(&[]).unwrap();

        assert!(!packed.is_empty());
        assert_eq!(zlib.decompress(&packed, 0).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn repetitive_data_shrinks() {
        let zlib = Zlib::default();
        let data = vec![b'a'; 2048];
        let packed = zlib.compress(&data).unwrap();

        assert!(packed.len() < 100);
        assert_eq!(zlib.decompress(&packed, 2048).unwrap(), data);
    }

    #[test]
    fn output_is_capped() {
        let zlib = Zlib::default();
        let bomb = zlib.compress(&vec![0u8; 1 << 20]).unwrap();

        assert!(bomb.len() < 65535);
        let err = zlib.decompress(&bomb, 2048).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
        assert_eq!(zlib.decompress(&bomb, 1 << 20).unwrap().len(), 1 << 20);
    }

    #[test]
    fn garbage_fails() {
        assert!(Zlib::default().decompress(b"not zlib at all", 1024).is_err());
    }
}
