//! Encrypted password support
//!
//! `encryptedpassword` holds hex of the password encrypted with AES-256-CFB
//! under the collector's built-in key and IV. This only keeps the password
//! out of plain sight in config files; it is not a secret store.

use crate::error::{BeatError, Result};
use aes::Aes256;
use cfb_mode::Decryptor;
use cfb_mode::cipher::{AsyncStreamCipher, KeyIvInit};

/// Built-in AES-256 key (32 bytes)
const KEY: &[u8; 32] = b"github.com/adibendahan/mysqlbeat";

/// Built-in CFB initialization vector
const IV: [u8; 16] = [
    0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x09, 0x0a, 0x0b, 0x0c, 0x0d, 0x0e, 0x0f,
];

/// Decrypt a hex `encryptedpassword` value
pub fn decrypt_password(encoded: &str) -> Result<String> {
    let mut buf = hex::decode(encoded.trim())
        .map_err(|e| BeatError::config(format!("encryptedpassword is not valid hex: {e}")))?;

    let cipher = Decryptor::<Aes256>::new_from_slices(KEY, &IV)
        .map_err(|e| BeatError::config(format!("password cipher setup failed: {e}")))?;
    cipher.decrypt(&mut buf);

    String::from_utf8(buf)
        .map_err(|_| BeatError::config("encryptedpassword does not decrypt to UTF-8 text"))
}
