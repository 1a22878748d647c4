pub mod error;
pub mod hash;
pub mod ids;
pub mod ts;
pub mod types;

pub use error::{is_silent, NotSupported, SilentError};
pub use hash::sha256_hex;
pub use ids::{IdGen, SeqIdGen, UlidGen};
pub use types::*;
