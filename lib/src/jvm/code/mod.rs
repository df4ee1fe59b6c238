//! Bytecode representation, decoding, and layout
//!
//! ### Structure
//!
//! Despite being pushed off into [just another method attribute](crate::jvm::class_file::Code),
//! the bytecode is arguably the most important part of the class file. We split up the [list of
//! bytecode instructions][0] into two groups:
//!
//!   - [`Instruction`] for straight-line instructions
//!   - [`BranchInstruction`] for instructions that jump, switch, return, or throw
//!
//! Jump targets are [`SynLabel`]s rather than offsets, so method bodies can be freely rewritten
//! (see [`crate::jvm::model::Code`]). Offsets only show up at the edges: [`decode_code_array`]
//! turns the raw code array into instructions with absolute branch targets and [`layout_code`]
//! turns instructions and labels back into bytes.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-6.html#jvms-6.5

mod decode;
mod instructions;
mod jump_encoding;
mod label;

pub use decode::*;
pub use instructions::*;
pub use jump_encoding::*;
pub use label::*;
