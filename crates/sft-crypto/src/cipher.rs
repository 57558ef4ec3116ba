//! Whole-payload AES-256-ECB encryption with PKCS#7 padding
//!
//! Ciphertext format: `ceil((len + 1) / 16) * 16` bytes, no IV, no tag.

use aes::Aes256;
use ecb::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyInit};

use crate::keys::SharedKey;
use crate::{CryptoError, BLOCK_SIZE};

type Aes256EcbEnc = ecb::Encryptor<Aes256>;
type Aes256EcbDec = ecb::Decryptor<Aes256>;

/// Encrypt `plaintext` under the shared key.
///
/// Deterministic: the same plaintext and key always give the same ciphertext.
pub fn encrypt(plaintext: &[u8], key: &SharedKey) -> Vec<u8> {
    Aes256EcbEnc::new(key.as_bytes().into()).encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

/// Decrypt `ciphertext` produced by [`encrypt`] and strip the padding.
pub fn decrypt(ciphertext: &[u8], key: &SharedKey) -> Result<Vec<u8>, CryptoError> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidCiphertextLength(ciphertext.len()));
    }

    Aes256EcbDec::new(key.as_bytes().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::BadPadding)
}
