//! Structural representation of classes
//!
//! This is the representation that flows through [`crate::jvm::visitor`] chains. Unlike the raw
//! [`crate::jvm::class_file`] structures, every name, type, and constant is resolved:
//!
//!   - a class is a [`ClassHeader`] plus [`FieldNode`]s and [`MethodNode`]s (see [`ClassNode`])
//!   - method bodies are [`Code`], a list of [`CodeElement`]s with labels instead of offsets
//!   - constants are [`ConstantValue`]s, with bootstrap methods carried structurally
//!
//! Everything derives `PartialEq`, which is how an unchanged class gets detected.

mod annotation;
mod class;
mod constant;
mod field;
mod method;

pub use annotation::*;
pub use class::*;
pub use constant::*;
pub use field::*;
pub use method::*;
