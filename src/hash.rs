use std::fmt;
use std::io::{copy, Read, Write};

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};

pub const HASH_LEN: usize = 32;

type Blake2b256 = Blake2b<U32>;

// Make the hasher api be similiar to blake3's
pub struct Hasher(Blake2b256);

impl Hasher {
    pub fn new() -> Hasher {
        Hasher(Blake2b256::new())
    }

    pub fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    pub fn finalize(self) -> Hash {
        Hash(self.0.finalize().into())
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Hasher::new()
    }
}

impl Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// BLAKE2b-256 digest of a file's plaintext
#[derive(PartialEq, Eq, Clone, Copy, std::hash::Hash)]
pub struct Hash([u8; HASH_LEN]);

pub fn hash<R: Read>(data: &mut R) -> Result<Hash, std::io::Error> {
    let mut hash = Hasher::new();
    copy(data, &mut hash)?;
    Ok(hash.finalize())
}

pub fn from_hex(hash: &str) -> Result<Hash, hex::FromHexError> {
    let mut bytes = [0u8; HASH_LEN];
    hex::decode_to_slice(hash, &mut bytes)?;
    Ok(Hash(bytes))
}

impl From<[u8; HASH_LEN]> for Hash {
    fn from(bytes: [u8; HASH_LEN]) -> Self {
        Hash(bytes)
    }
}

impl Hash {
    pub fn as_bytes(&self) -> &[u8; HASH_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Hash {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Hash({})", self.to_hex())
    }
}
