use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ciphertext length {0} is not a positive multiple of the block size")]
    InvalidCiphertextLength(usize),

    #[error("decryption failed: bad padding (wrong key or corrupted data)")]
    BadPadding,

    #[error("shared key has wrong size: {0} bytes (expected 32)")]
    InvalidKeyLength(usize),

    #[error("shared key is not valid base64: {0}")]
    InvalidKeyEncoding(String),

    #[error("key file I/O: {0}")]
    Io(#[from] std::io::Error),
}
