use std::io::Read;

use crate::buf::fill_buf;
use crate::compress::Compressor;
use crate::crypto::Cipher;

/// Splits a reader into plaintext chunks of `size` bytes, the last may be short.
///
/// An empty reader still yields one empty chunk so every file has at least
/// one entry in its chunk table.
pub struct Chunks<R: Read> {
    inner: R,
    size: usize,
    chunk: usize,
    done: bool,
}

impl<R: Read> Chunks<R> {
    pub fn new(reader: R, size: usize) -> Self {
        Chunks {
            inner: reader,
            size,
            chunk: 0,
            done: false,
        }
    }
}

impl<R: Read> Iterator for Chunks<R> {
    type Item = std::io::Result<Vec<u8>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let mut in_buf = vec![0u8; self.size];
        match fill_buf(&mut self.inner, &mut in_buf) {
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
            Ok((true, 0)) => {
                self.done = true;
                if self.chunk == 0 {
                    self.chunk += 1;
                    Some(Ok(Vec::new()))
                } else {
                    None
                }
            }
            Ok((eof, len)) => {
                self.done = eof;
                self.chunk += 1;
                in_buf.truncate(len);
                Some(Ok(in_buf))
            }
        }
    }
}

/// Compress then encrypt on the way in, the reverse on the way out
pub struct Pipeline {
    compressor: Box<dyn Compressor>,
    cipher: Box<dyn Cipher>,
}

impl Pipeline {
    pub fn new(compressor: Box<dyn Compressor>, cipher: Box<dyn Cipher>) -> Self {
        Pipeline { compressor, cipher }
    }

    pub fn cipher(&self) -> &dyn Cipher {
        self.cipher.as_ref()
    }

    pub fn encode_chunk(&self, plaintext: &[u8]) -> std::io::Result<Vec<u8>> {
        let packed = self.compressor.compress(plaintext)?;
        Ok(self.cipher.seal(packed))
    }

    /// `limit` bounds the plaintext, normally what is left of the file
    pub fn decode_chunk(&self, ciphertext: Vec<u8>, limit: u64) -> std::io::Result<Vec<u8>> {
        let packed = self.cipher.open(ciphertext);
        self.compressor.decompress(&packed, limit)
    }
}
