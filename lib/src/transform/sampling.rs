use super::{codegen, digest, Error, HookMethod, RuntimeHooks, TransformSettings};
use crate::jvm::code::SynLabel;
use crate::jvm::model::{ClassHeader, CodeElement, MethodNode};
use crate::jvm::{
    self, BinaryName, ClassVisitor, MethodDescriptor, Name, RenderDescriptor, UnqualifiedName,
};
use log::trace;
use sha2::{Digest, Sha256};
use std::collections::HashSet;

/// Percentage of eligible sites that get instrumented (between 1 and 100)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct SamplingRate(u8);

impl SamplingRate {
    pub const ALL: SamplingRate = SamplingRate(100);

    pub fn new(percentage: u8) -> Result<SamplingRate, Error> {
        if (1..=100).contains(&percentage) {
            Ok(SamplingRate(percentage))
        } else {
            Err(Error::InvalidSetting(format!(
                "sampling percentage {} is not between 1 and 100",
                percentage
            )))
        }
    }

    pub fn percentage(&self) -> u8 {
        self.0
    }
}

/// Decides which sites of one method get instrumented
///
/// Draws come from a SHA-256 counter generator: draw `n` hashes the method's state with `n`. The
/// state is derived from the seed and the identity of the method, so transforming the same
/// method twice instruments the same sites.
pub struct Sampler {
    rate: SamplingRate,
    state: [u8; 32],
    draws: u64,
}

impl Sampler {
    pub fn new(
        rate: SamplingRate,
        seed: u64,
        class: &BinaryName,
        method: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Sampler {
        let mut hasher = Sha256::new();
        hasher.update(seed.to_be_bytes());
        for part in [class.as_str(), method.as_str(), descriptor.render().as_str()] {
            hasher.update((part.len() as u64).to_be_bytes());
            hasher.update(part.as_bytes());
        }
        let mut state = [0u8; 32];
        state.copy_from_slice(&hasher.finalize());
        Sampler {
            rate,
            state,
            draws: 0,
        }
    }

    fn next_u64(&mut self) -> u64 {
        self.draws += 1;
        let mut hasher = Sha256::new();
        hasher.update(self.state);
        hasher.update(self.draws.to_be_bytes());
        let block = hasher.finalize();
        let mut out = [0u8; 8];
        out.copy_from_slice(&block[..8]);
        u64::from_be_bytes(out)
    }

    /// Should the next eligible site be instrumented?
    pub fn sample(&mut self) -> bool {
        self.rate == SamplingRate::ALL || self.next_u64() % 100 < u64::from(self.rate.0)
    }
}

/// Call to a no-argument hook, injected before a sampled subset of some kind of site
///
/// Classes under a trusted prefix or in the package of a runtime helper are never instrumented.
pub(crate) struct SampledHook {
    rate: SamplingRate,
    seed: u64,
    hook: HookMethod,
    hooks: RuntimeHooks,
    trusted_prefixes: Vec<String>,
}

/// Is this element a site (given the labels placed before it in the method)?
pub(crate) type SitePredicate = fn(&CodeElement, &HashSet<SynLabel>) -> bool;

impl SampledHook {
    pub(crate) fn new(
        percentage: u8,
        hook: &HookMethod,
        settings: &TransformSettings,
    ) -> Result<SampledHook, Error> {
        hook.expect_descriptor(&RuntimeHooks::no_arguments())?;
        Ok(SampledHook {
            rate: SamplingRate::new(percentage)?,
            seed: settings.sampling_seed,
            hook: hook.clone(),
            hooks: settings.hooks.clone(),
            trusted_prefixes: settings.trusted_prefixes.clone(),
        })
    }

    pub(crate) fn key(&self, kind: &str) -> String {
        let mut trusted = self.trusted_prefixes.clone();
        trusted.sort();
        format!(
            "{}:{}:{}:{}:{}",
            kind,
            self.rate.percentage(),
            self.seed,
            self.hook,
            digest(trusted)
        )
    }

    pub(crate) fn is_excluded(&self, class: &BinaryName) -> bool {
        self.hooks.is_helper_class(class)
            || self
                .trusted_prefixes
                .iter()
                .any(|prefix| class.as_str().starts_with(prefix.as_str()))
    }

    pub(crate) fn wrap<'a>(
        &'a self,
        is_site: SitePredicate,
        next: Box<dyn ClassVisitor + 'a>,
    ) -> Box<dyn ClassVisitor + 'a> {
        Box::new(SampledHookVisitor {
            hook: self,
            is_site,
            next,
            class: None,
        })
    }
}

struct SampledHookVisitor<'a> {
    hook: &'a SampledHook,
    is_site: SitePredicate,
    next: Box<dyn ClassVisitor + 'a>,

    /// Class being visited, unless it is excluded
    class: Option<BinaryName>,
}

impl<'a> ClassVisitor for SampledHookVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.class = if self.hook.is_excluded(&header.name) {
            None
        } else {
            Some(header.name.clone())
        };
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        if let (Some(class), Some(code)) = (&self.class, &mut method.code) {
            let header = &method.header;
            let mut sampler = Sampler::new(
                self.hook.rate,
                self.hook.seed,
                class,
                &header.name,
                &header.descriptor,
            );
            let mut seen = HashSet::new();
            let mut elements = Vec::with_capacity(code.elements.len());
            let mut injected = 0;
            for element in code.elements.drain(..) {
                if let CodeElement::Label(label) = &element {
                    seen.insert(*label);
                }
                if (self.is_site)(&element, &seen) && sampler.sample() {
                    elements.push(codegen::invoke_static(self.hook.hook.method_ref()));
                    injected += 1;
                }
                elements.push(element);
            }
            code.elements = elements;
            if injected > 0 {
                trace!(
                    "Injected {} calls to {} in {}.{}",
                    injected,
                    self.hook.hook,
                    class,
                    header.name
                );
            }
        }
        self.next.visit_method(method)
    }
}
