//! Body encryption using AES-256-CBC with PKCS#7 padding.
//!
//! Every message body gets a fresh key and a fresh random IV. The IV travels
//! in front of the ciphertext: `iv (16 bytes) || ciphertext`.
//! CBC carries no authentication tag; integrity comes from the signature
//! over the plaintext, checked after decryption.

use crate::error::{Error, Result};
use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use rand::RngCore;
use zeroize::Zeroizing;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Size of the body key in bytes (256 bits).
pub const KEY_SIZE: usize = 32;

/// Size of the IV in bytes (one AES block).
pub const IV_SIZE: usize = 16;

/// AES block size in bytes.
pub const BLOCK_SIZE: usize = 16;

/// Generate a fresh random body key.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    rand::rngs::OsRng.fill_bytes(&mut key[..]);
    key
}

/// Encrypt with a random IV, prepending it to the output.
pub fn encrypt_with_random_iv(key: &[u8; KEY_SIZE], plaintext: &[u8]) -> Vec<u8> {
    let mut iv = [0u8; IV_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut iv);

    let ciphertext =
        Aes256CbcEnc::new(key.into(), &iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut output = Vec::with_capacity(IV_SIZE + ciphertext.len());
    output.extend_from_slice(&iv);
    output.extend_from_slice(&ciphertext);
    output
}

/// Decrypt data produced by [`encrypt_with_random_iv`].
///
/// Returns a generic error for short input, partial blocks and bad padding.
pub fn decrypt_with_prepended_iv(key: &[u8; KEY_SIZE], data: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if data.len() < IV_SIZE + BLOCK_SIZE || (data.len() - IV_SIZE) % BLOCK_SIZE != 0 {
        return Err(Error::Crypto("ciphertext has invalid length".into()));
    }

    let iv: [u8; IV_SIZE] = data[..IV_SIZE]
        .try_into()
        .map_err(|_| Error::Crypto("invalid iv".into()))?;

    let plaintext = Aes256CbcDec::new(key.into(), &iv.into())
        .decrypt_padded_vec_mut::<Pkcs7>(&data[IV_SIZE..])
        .map_err(|_| Error::Crypto("decryption failed".into()))?;

    Ok(Zeroizing::new(plaintext))
}
