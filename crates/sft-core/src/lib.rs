pub mod config;
pub mod error;
pub mod types;

pub use error::{SftError, SftResult};
pub use types::{FileMetadata, SessionState, Status};

/// Default TCP port for the transfer protocol
pub const DEFAULT_PORT: u16 = 8888;
