pub mod error;
pub mod fs;

pub use error::SandboxError;
pub use fs::{SandboxedFs, Stat};
