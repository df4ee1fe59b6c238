//! Read, rewrite, and write JVM classes
//!
//! Classes are read into a structural model (see [`model`]) where constant pool indices are
//! resolved, jump offsets are replaced with labels, and attributes are decoded. The model can be
//! rewritten freely: [`ClassReader`] replays it through a chain of [`ClassVisitor`]s which ends in
//! a [`ClassWriter`], and the writer recomputes everything that depends on the exact bytes
//! (constant pool, jump widths, maximums, stack map frames).
//!
//! ### Simple example
//!
//! Consider the following simple Java class:
//!
//! ```java,ignore,no_run
//! public class Point {
//!     public final int x;
//!     public final int y;
//!
//!     public Point(int x, int y) {
//!         this.x = x;
//!         this.y = y;
//!     }
//! }
//! ```
//!
//! Generating an analogous class file can be done as follows:
//!
//! ```
//! use classmorph::jvm::class_graph::PlatformLocator;
//! use classmorph::jvm::code::{BranchInstruction::*, Instruction::*, InvokeType};
//! use classmorph::jvm::model::{FieldRef, MethodRef};
//! use classmorph::jvm::*;
//!
//! # fn generate_class() -> Result<(), Error> {
//! let point = BinaryName::from_str("me/alec/Point").unwrap();
//! let x = FieldRef {
//!     owner: point.clone(),
//!     name: UnqualifiedName::from_str("x").unwrap(),
//!     descriptor: FieldType::int(),
//! };
//! let y = FieldRef {
//!     owner: point.clone(),
//!     name: UnqualifiedName::from_str("y").unwrap(),
//!     descriptor: FieldType::int(),
//! };
//!
//! // Declare the class and its fields
//! let mut class = ClassBuilder::new(ClassAccessFlags::PUBLIC, point, BinaryName::OBJECT, vec![]);
//! let final_field = FieldAccessFlags::PUBLIC | FieldAccessFlags::FINAL;
//! class.add_field(final_field, x.name.clone(), FieldType::int());
//! class.add_field(final_field, y.name.clone(), FieldType::int());
//!
//! // Generate the constructor method body
//! let mut constructor = class.start_method(
//!     MethodAccessFlags::PUBLIC,
//!     UnqualifiedName::INIT,
//!     MethodDescriptor {
//!         parameters: vec![FieldType::int(), FieldType::int()],
//!         return_type: None,
//!     },
//! );
//! let object_init = MethodRef::new(
//!     BinaryName::OBJECT,
//!     UnqualifiedName::INIT,
//!     MethodDescriptor { parameters: vec![], return_type: None },
//! );
//! let code = &mut constructor.code;
//! code.push_instruction(ALoad(0));
//! code.push_instruction(Invoke(InvokeType::Special, object_init));
//! code.push_instruction(ALoad(0));
//! code.push_instruction(ILoad(1));
//! code.push_instruction(PutField(x));
//! code.push_instruction(ALoad(0));
//! code.push_instruction(ILoad(2));
//! code.push_instruction(PutField(y));
//! code.push_branch_instruction(Return);
//! constructor.finish()?;
//!
//! // Finally, encode the class into bytes
//! let class_bytes: Vec<u8> = write_class(&class.result(), &PlatformLocator)?;
//! # Ok(())
//! # }
//! # generate_class().unwrap();
//! ```

mod access_flags;
mod class_builder;
pub mod class_file;
pub mod class_graph;
pub mod code;
pub mod descriptors;
mod errors;
pub mod model;
mod names;
pub mod reader;
pub mod signatures;
pub mod verifier;
pub mod visitor;
pub mod writer;

pub use access_flags::*;
pub use class_builder::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
pub use reader::ClassReader;
pub use visitor::{ClassCollector, ClassVisitor, CodeCollector, MethodVisitor};
pub use writer::{write_class, ClassWriter};
