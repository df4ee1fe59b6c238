use super::{Error, SampledHook, TransformSettings};
use crate::jvm::code::SynLabel;
use crate::jvm::model::CodeElement;
use crate::jvm::ClassVisitor;
use std::collections::HashSet;

/// Give long running loops a chance to notice they were interrupted
///
/// A call to the interrupt check goes before (a sampled subset of) backward jumps: jumps to a
/// label placed earlier in the method, which is how every loop gets back to its start.
pub struct CooperativeInterrupt {
    hook: SampledHook,
}

impl CooperativeInterrupt {
    pub fn new(
        percentage: u8,
        settings: &TransformSettings,
    ) -> Result<CooperativeInterrupt, Error> {
        let hook = SampledHook::new(percentage, &settings.hooks.interrupt_check, settings)?;
        Ok(CooperativeInterrupt { hook })
    }

    pub fn key(&self) -> String {
        self.hook.key("cooperative-interrupt")
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        self.hook.wrap(is_backward_jump, next)
    }
}

fn is_backward_jump(element: &CodeElement, placed: &HashSet<SynLabel>) -> bool {
    match element {
        CodeElement::Branch(branch) => branch
            .jump_targets()
            .into_iter()
            .any(|target| placed.contains(target)),
        _ => false,
    }
}
