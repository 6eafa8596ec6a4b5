#![forbid(unsafe_code)]

//! Unpacks legacy Macintosh archive and encoding formats: BinHex 4.0,
//! MacBinary, StuffIt classic and 5, and Compact Pro. Everything works
//! over in-memory byte slices; the peeling driver chains wrapper formats
//! and resolves nested encodings like `.sit.hqx` automatically.

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod domain;
pub mod error;

pub mod util {
    pub mod bits;
    pub mod buf;
    pub mod crc;
}

pub mod codec;

pub mod container {
    pub mod binhex;
    pub mod compactpro;
    pub mod macbinary;
    pub mod sit;
    pub(crate) mod sit5;
}

pub mod peel;

pub use crate::domain::{ExtractedFile, FileMeta, FourCC};
pub use crate::error::{PeelError, Result};
pub use crate::peel::{Format, detect, peel, peel_path};

pub mod prelude {
    pub use crate::domain::{ExtractedFile, FileMeta, FourCC};
    pub use crate::error::{PeelError, Result};
    pub use crate::peel::{Format, detect, peel, peel_path};
}
