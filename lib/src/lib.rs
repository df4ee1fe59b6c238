//! Rewrite JVM classes on their way into a sandbox
//!
//! Classes are streamed from their raw bytes through an ordered [`transform::TransformPipeline`]
//! and written back out by a [`jvm::ClassWriter`] which computes stack map frames without ever
//! loading a class: type merges are answered by [`jvm::class_graph::CommonAncestorResolver`] over
//! a pluggable [`jvm::class_graph::DescriptorLocator`].
//!
//! The [`runtime`] module holds the stores that the helper calls injected by some passes consult
//! once the rewritten classes run.

pub mod jvm;
pub mod runtime;
pub mod transform;
mod util;
