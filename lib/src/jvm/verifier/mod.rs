//! Stack map frame inference
//!
//! For any specific instruction inside a method body, the stack and locals should have the same
//! structure, regardless of which control flow was used to reach that instruction. In other words:
//! although the values on the stack and in the locals may obviously be different, the types and
//! order of the stack and local variables cannot. This information is referred to as the _stack
//! map frame_ (represented using [`Frame`]) and the set of stack map frames for all possible jump
//! targets in a method is the _stack map table_.
//!
//! Rewriting a method invalidates its stack map table, so frames are always recomputed from
//! scratch (see [`analyze_method`]). Straight-line instructions are simple (see
//! [`AnalysisFrame::execute`]), but when an instruction can be reached from multiple locations
//! the incoming frames need to be unified. Unifying two object types requires knowing the class
//! hierarchy, which is abstracted behind [`SuperClassResolver`]. This ends up being a fix-point
//! algorithm which converges towards the right answer (if there is one).
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1

mod analysis;
mod frame;
mod types;

pub use analysis::*;
pub use frame::*;
pub use types::*;
