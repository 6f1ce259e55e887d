use aes::Aes128;
use cfb8::cipher::{AsyncStreamCipher, KeyIvInit};

use crate::key::{SecretKey, IV_LEN, KEY_LEN};

// Trait for wrapping up the encryption/decryption portion of the code
//
// Every call starts over from the same key and IV, nothing carries between
// calls. That is what lets each chunk and each trailer field decrypt alone.
pub trait Cipher {
    fn encrypt(&self, data: &mut [u8]);
    fn decrypt(&self, data: &mut [u8]);
    fn is_encrypting(&self) -> bool;

    fn seal(&self, mut data: Vec<u8>) -> Vec<u8> {
        self.encrypt(&mut data);
        data
    }

    fn open(&self, mut data: Vec<u8>) -> Vec<u8> {
        self.decrypt(&mut data);
        data
    }
}

/// Pass-through for unencrypted packages
pub struct Plaintext;

impl Cipher for Plaintext {
    fn encrypt(&self, _data: &mut [u8]) {}

    fn decrypt(&self, _data: &mut [u8]) {}

    fn is_encrypting(&self) -> bool {
        false
    }
}

type Aes128Cfb8Enc = cfb8::Encryptor<Aes128>;
type Aes128Cfb8Dec = cfb8::Decryptor<Aes128>;

/// AES-128 in 8-bit cipher feedback mode
pub struct AesCfb8 {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl AesCfb8 {
    pub fn new(key: &SecretKey, iv: [u8; IV_LEN]) -> Self {
        AesCfb8 {
            key: *key.as_bytes(),
            iv,
        }
    }

    pub fn iv(&self) -> &[u8; IV_LEN] {
        &self.iv
    }
}

impl Cipher for AesCfb8 {
    fn encrypt(&self, data: &mut [u8]) {
        Aes128Cfb8Enc::new(&self.key.into(), &self.iv.into()).encrypt(data);
    }

    fn decrypt(&self, data: &mut [u8]) {
        Aes128Cfb8Dec::new(&self.key.into(), &self.iv.into()).decrypt(data);
    }

    fn is_encrypting(&self) -> bool {
        true
    }
}

/// Picks the cipher for a package, an empty secret means no encryption
pub fn for_secret(secret: Option<&str>, iv: [u8; IV_LEN]) -> Box<dyn Cipher> {
    match secret {
        Some(secret) if !secret.is_empty() => Box::new(AesCfb8::new(&SecretKey::derive(secret), iv)),
        _ => Box::new(Plaintext),
    }
}

#[cfg(test)]
mod test_cfb8 {
    use super::*;

    // Hand built so the test key can be the raw NIST one rather than a md5 output
    fn nist_cipher() -> AesCfb8 {
        let key: [u8; 16] = hex::decode("2b7e151628aed2a6abf7158809cf4f3c").unwrap().try_into().unwrap();
        let iv: [u8; 16] = hex::decode("000102030405060708090a0b0c0d0e0f").unwrap().try_into().unwrap();
        AesCfb8 { key, iv }
    }

    #[test]
    fn nist_vector() {
        let cipher = nist_cipher();
        let plain = hex::decode("6bc1bee22e409f96e93d7e117393172aae2d").unwrap();

        let sealed = cipher.seal(plain.clone());
        assert_eq!(hex::encode(&sealed), "3b79424c9c0dd436bace9e0ed4586a4f32b9");
        assert_eq!(cipher.open(sealed), plain);
    }

    #[test]
    fn restarts_every_call() {
        let cipher = AesCfb8::new(&SecretKey::derive("k"), [7; IV_LEN]);

        let first = cipher.seal(b"same bytes".to_vec());
        let second = cipher.seal(b"same bytes".to_vec());
        assert_eq!(first, second);
        assert_ne!(first, b"same bytes".to_vec());
    }

    #[test]
    fn wrong_key_garbles() {
        let sealed = AesCfb8::new(&SecretKey::derive("k"), [1; IV_LEN]).seal(b"hello world".to_vec());
        let opened = AesCfb8::new(&SecretKey::derive("j"), [1; IV_LEN]).open(sealed);
        assert_ne!(opened, b"hello world".to_vec());
    }

    #[test]
    fn empty_secret_is_plaintext() {
        assert!(!for_secret(Some(""), [0; IV_LEN]).is_encrypting());
        assert!(!for_secret(None, [0; IV_LEN]).is_encrypting());
        assert!(for_secret(Some("k"), [0; IV_LEN]).is_encrypting());
    }

    #[test]
    fn plaintext_passthrough() {
        assert_eq!(Plaintext.seal(vec![1, 2, 3]), vec![1, 2, 3]);
    }
}
