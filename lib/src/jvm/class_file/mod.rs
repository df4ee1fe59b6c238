//! Raw class file structure
//!
//! Everything in this module mirrors the binary layout of [the class file format][0] closely:
//! names and types are still indices into the constant pool and attribute bodies are still bytes
//! until they are decoded. Going to and from bytes is done through [`Serialize`] and
//! [`Deserialize`] (big-endian, `u16` length prefixes).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html

mod attribute;
mod binary_format;
mod class;
mod constants;
mod field;
mod method;
mod version;

pub use attribute::*;
pub use binary_format::*;
pub use class::*;
pub use constants::*;
pub use field::*;
pub use method::*;
pub use version::*;
