//! sft-crypto: payload protection for the transfer protocol
//!
//! Pipeline (sender → receiver):
//! ```text
//! plaintext ──SHA-256──▶ content hash (sent during negotiation)
//! plaintext ──AES-256-ECB/PKCS#7(shared key)──▶ ciphertext (sent as one frame)
//! ciphertext ──decrypt──▶ plaintext ──SHA-256──▶ compared with the negotiated hash
//! ```
//!
//! ECB with a single pre-shared key is deterministic and carries no
//! authentication tag: identical plaintexts encrypt identically, and the
//! content hash is the only integrity gate.

pub mod cipher;
pub mod digest;
pub mod error;
pub mod keys;

pub use cipher::{decrypt, encrypt};
pub use digest::digest;
pub use error::CryptoError;
pub use keys::{KeyFile, KeyProvider, SharedKey};

/// Size of the shared key in bytes (AES-256)
pub const KEY_SIZE: usize = 32;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
