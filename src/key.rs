use std::fmt;

use md5::{Digest, Md5};

pub const KEY_LEN: usize = 16;
pub const IV_LEN: usize = 16;

// The package format derives the AES-128 key straight from the md5 of the
// secret, there is no salt or stretching. Anything stronger would break
// compatibility with existing packages.
pub struct SecretKey([u8; KEY_LEN]);

impl SecretKey {
    pub fn derive(secret: &str) -> Self {
        SecretKey(Md5::digest(secret.as_bytes()).into())
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("SecretKey(****)")
    }
}

/// Fresh random IV for a new package
pub fn gen_iv() -> [u8; IV_LEN] {
    rand::random()
}
