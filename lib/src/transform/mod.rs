//! Catalogue of bytecode rewriting passes
//!
//! Every pass is a [`ClassVisitor`] decorator: it receives the class stream from the previous
//! pass (or the reader) and forwards a rewritten stream to the next pass (or the writer). Passes
//! are constructed once, validated up front, and then shared across every class (and thread) they
//! are applied to. Any state specific to one class lives in the visitor that [`Transform::wrap`]
//! creates for it.
//!
//! Each pass has an identity [`Transform::key`], which covers the pass kind and every
//! construction-time parameter. Two passes with the same key produce the same bytes for the same
//! input class (and the same locator answers), so keys can be used to cache transformed classes.
//!
//! ### Order
//!
//! The passes form a closed set with a fixed order (see [`TransformPipeline::catalogue`]):
//!
//!  1. [`VersionClamp`]
//!  2. [`ApiCompat`]
//!  3. [`ExceptionWrap`]
//!  4. [`LifecycleOwnerFallback`]
//!  5. [`StringReplace`]
//!  6. [`ConstantRemap`]
//!  7. [`ReplaceClass`]
//!  8. [`ThreadLocalSubstitution`]
//!  9. [`Repackage`]
//!  10. [`AllocationLimit`]
//!  11. [`CooperativeInterrupt`]
//!  12. [`LiveLiteralsDetection`]

mod allocation_limit;
mod api_compat;
mod codegen;
mod constant_remap;
mod cooperative_interrupt;
mod errors;
mod exception_wrap;
mod lifecycle;
mod live_literals;
mod pipeline;
mod remapper;
mod repackage;
mod replace_class;
mod sampling;
mod settings;
mod string_replace;
mod thread_local;
mod version_clamp;

pub use allocation_limit::*;
pub use api_compat::*;
pub use constant_remap::*;
pub use cooperative_interrupt::*;
pub use errors::*;
pub use exception_wrap::*;
pub use lifecycle::*;
pub use live_literals::*;
pub use pipeline::*;
pub use remapper::*;
pub use repackage::*;
pub use replace_class::*;
pub use sampling::*;
pub use settings::*;
pub use string_replace::*;
pub use thread_local::*;
pub use version_clamp::*;

use crate::jvm::model::ClassNode;
use crate::jvm::ClassVisitor;
use sha2::{Digest, Sha256};

/// One pass of the catalogue
pub enum Transform {
    VersionClamp(VersionClamp),
    ApiCompat(ApiCompat),
    ExceptionWrap(ExceptionWrap),
    LifecycleOwnerFallback(LifecycleOwnerFallback),
    StringReplace(StringReplace),
    ConstantRemap(ConstantRemap),
    ReplaceClass(ReplaceClass),
    ThreadLocalSubstitution(ThreadLocalSubstitution),
    Repackage(Repackage),
    AllocationLimit(AllocationLimit),
    CooperativeInterrupt(CooperativeInterrupt),
    LiveLiteralsDetection(LiveLiteralsDetection),
}

impl Transform {
    /// Position of the pass in the catalogue order
    pub fn catalogue_index(&self) -> usize {
        match self {
            Transform::VersionClamp(_) => 0,
            Transform::ApiCompat(_) => 1,
            Transform::ExceptionWrap(_) => 2,
            Transform::LifecycleOwnerFallback(_) => 3,
            Transform::StringReplace(_) => 4,
            Transform::ConstantRemap(_) => 5,
            Transform::ReplaceClass(_) => 6,
            Transform::ThreadLocalSubstitution(_) => 7,
            Transform::Repackage(_) => 8,
            Transform::AllocationLimit(_) => 9,
            Transform::CooperativeInterrupt(_) => 10,
            Transform::LiveLiteralsDetection(_) => 11,
        }
    }

    /// Stable identity of the pass and its parameters
    pub fn key(&self) -> String {
        match self {
            Transform::VersionClamp(pass) => pass.key(),
            Transform::ApiCompat(pass) => pass.key(),
            Transform::ExceptionWrap(pass) => pass.key(),
            Transform::LifecycleOwnerFallback(pass) => pass.key(),
            Transform::StringReplace(pass) => pass.key(),
            Transform::ConstantRemap(pass) => pass.key(),
            Transform::ReplaceClass(pass) => pass.key(),
            Transform::ThreadLocalSubstitution(pass) => pass.key(),
            Transform::Repackage(pass) => pass.key(),
            Transform::AllocationLimit(pass) => pass.key(),
            Transform::CooperativeInterrupt(pass) => pass.key(),
            Transform::LiveLiteralsDetection(pass) => pass.key(),
        }
    }

    /// Decorate `next` with this pass
    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        match self {
            Transform::VersionClamp(pass) => pass.wrap(next),
            Transform::ApiCompat(pass) => pass.wrap(next),
            Transform::ExceptionWrap(pass) => pass.wrap(next),
            Transform::LifecycleOwnerFallback(pass) => pass.wrap(next),
            Transform::StringReplace(pass) => pass.wrap(next),
            Transform::ConstantRemap(pass) => pass.wrap(next),
            Transform::ReplaceClass(pass) => pass.wrap(next),
            Transform::ThreadLocalSubstitution(pass) => pass.wrap(next),
            Transform::Repackage(pass) => pass.wrap(next),
            Transform::AllocationLimit(pass) => pass.wrap(next),
            Transform::CooperativeInterrupt(pass) => pass.wrap(next),
            Transform::LiveLiteralsDetection(pass) => pass.wrap(next),
        }
    }

    /// Classes this pass makes rewritten code depend on, which must be defined alongside
    pub fn generated_classes(&self) -> Vec<&ClassNode> {
        match self {
            Transform::LifecycleOwnerFallback(pass) => vec![pass.fallback_class()],
            _ => vec![],
        }
    }
}

macro_rules! transform_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Transform {
                fn from(pass: $variant) -> Transform {
                    Transform::$variant(pass)
                }
            }
        )*
    };
}

transform_from!(
    VersionClamp,
    ApiCompat,
    ExceptionWrap,
    LifecycleOwnerFallback,
    StringReplace,
    ConstantRemap,
    ReplaceClass,
    ThreadLocalSubstitution,
    Repackage,
    AllocationLimit,
    CooperativeInterrupt,
    LiveLiteralsDetection,
);

/// SHA-256 of a sequence of strings, as lowercase hex
///
/// Entries are length-prefixed so that `["ab", "c"]` and `["a", "bc"]` differ. Callers are
/// responsible for feeding entries in a canonical (sorted) order.
pub(crate) fn digest<S: AsRef<str>>(entries: impl IntoIterator<Item = S>) -> String {
    let mut hasher = Sha256::new();
    for entry in entries {
        let entry = entry.as_ref();
        hasher.update((entry.len() as u64).to_be_bytes());
        hasher.update(entry.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn digests_separate_entries() {
        assert_ne!(digest(["ab", "c"]), digest(["a", "bc"]));
        assert_eq!(digest(["ab", "c"]), digest(vec![String::from("ab"), String::from("c")]));
        assert_eq!(digest(Vec::<String>::new()).len(), 64);
    }

    #[test]
    fn catalogue_indices_are_distinct() -> Result<(), Error> {
        let settings = TransformSettings::default();
        let passes: Vec<Transform> = vec![
            VersionClamp::new(52, 61)?.into(),
            ReplaceClass::new("a/A", "a/B")?.into(),
            CooperativeInterrupt::new(100, &settings)?.into(),
            AllocationLimit::new(100, &settings)?.into(),
            LiveLiteralsDetection::new(&settings, |_| ()).into(),
        ];
        let indices: Vec<usize> = passes.iter().map(Transform::catalogue_index).collect();
        assert_eq!(indices, vec![0, 6, 10, 9, 11]);
        Ok(())
    }
}
