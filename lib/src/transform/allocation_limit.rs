use super::{Error, SampledHook, TransformSettings};
use crate::jvm::code::{Instruction, SynLabel};
use crate::jvm::model::CodeElement;
use crate::jvm::ClassVisitor;
use std::collections::HashSet;

/// Report object allocations to the allocation limiter
///
/// A call to the allocation hook goes before (a sampled subset of) `new` instructions, so that a
/// unit of work allocating without bound gets stopped.
pub struct AllocationLimit {
    hook: SampledHook,
}

impl AllocationLimit {
    pub fn new(percentage: u8, settings: &TransformSettings) -> Result<AllocationLimit, Error> {
        let hook = SampledHook::new(percentage, &settings.hooks.allocation_check, settings)?;
        Ok(AllocationLimit { hook })
    }

    pub fn key(&self) -> String {
        self.hook.key("allocation-limit")
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        self.hook.wrap(is_allocation, next)
    }
}

fn is_allocation(element: &CodeElement, _labels: &HashSet<SynLabel>) -> bool {
    matches!(element, CodeElement::Instruction(Instruction::New(_)))
}
