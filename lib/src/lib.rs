pub mod error;
pub mod export;
pub mod format;
pub mod import;
pub mod mesh;
pub mod skeleton;
pub mod util;

pub use error::{Error, MappingWarning, Result};
