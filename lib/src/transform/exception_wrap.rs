use super::{codegen, digest, Error, HookMethod, RuntimeHooks, TransformSettings};
use crate::jvm::code::{
    BranchInstruction, Instruction, InvokeType, LabelGenerator, SynLabelGenerator,
};
use crate::jvm::model::{
    Annotations, ClassHeader, Code, CodeElement, MethodHeader, MethodNode, MethodRef,
    ParameterAnnotationSets, TryCatchBlock,
};
use crate::jvm::{
    self, BinaryName, ClassVisitor, FieldType, MethodAccessFlags, MethodDescriptor, Name,
    RenderDescriptor, UnqualifiedName,
};
use log::debug;
use std::collections::HashSet;

const ORIGINAL_SUFFIX: &str = "$original";

/// Keep exceptions thrown by framework callbacks from escaping
///
/// Each callback in the allow-list has its body moved into a private `name$original` method.
/// The callback itself becomes a call to that method inside a catch-all handler which reports
/// the exception to the failure hook and returns normally. A failing `onMeasure(II)V` also sets
/// a measured size of zero, since the framework insists on one.
pub struct ExceptionWrap {
    callbacks: HashSet<(UnqualifiedName, MethodDescriptor<BinaryName>)>,
    failure_hook: HookMethod,
}

impl ExceptionWrap {
    pub fn new(settings: &TransformSettings) -> Result<ExceptionWrap, Error> {
        let failure_hook = settings.hooks.callback_failure.clone();
        failure_hook.expect_descriptor(&RuntimeHooks::callback_failure_descriptor())?;

        let mut callbacks = HashSet::new();
        for (name, descriptor) in &settings.wrapped_callbacks {
            if descriptor.return_type.is_some() || name.is_initializer() {
                return Err(Error::InvalidSetting(format!(
                    "callback {}{} cannot be wrapped (only void methods can)",
                    name,
                    descriptor.render()
                )));
            }
            callbacks.insert((name.clone(), descriptor.clone()));
        }
        Ok(ExceptionWrap {
            callbacks,
            failure_hook,
        })
    }

    pub fn key(&self) -> String {
        let mut entries: Vec<String> = self
            .callbacks
            .iter()
            .map(|(name, descriptor)| format!("{}{}", name, descriptor.render()))
            .collect();
        entries.sort();
        entries.push(self.failure_hook.to_string());
        format!("exception-wrap:{}", digest(entries))
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(ExceptionWrapVisitor {
            pass: self,
            next,
            class: None,
            methods: vec![],
        })
    }

    fn is_eligible(&self, header: &MethodHeader) -> bool {
        let flags = header.access_flags;
        flags.intersects(MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED)
            && !flags.intersects(
                MethodAccessFlags::ABSTRACT | MethodAccessFlags::STATIC | MethodAccessFlags::NATIVE,
            )
            && self
                .callbacks
                .contains(&(header.name.clone(), header.descriptor.clone()))
    }

    /// Split a callback into the wrapper and the renamed original
    fn split(&self, class: &BinaryName, method: MethodNode) -> [MethodNode; 2] {
        let original_name = method.header.name.concat(ORIGINAL_SUFFIX);

        let mut original_header = method.header.clone();
        original_header.name = original_name.clone();
        original_header.access_flags.remove(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::PROTECTED | MethodAccessFlags::FINAL,
        );
        original_header
            .access_flags
            .insert(MethodAccessFlags::PRIVATE | MethodAccessFlags::SYNTHETIC);
        original_header.annotations = Annotations::default();
        original_header.parameter_annotations = ParameterAnnotationSets::default();

        let wrapper_code = self.wrapper_code(
            class,
            &method.header.name,
            &original_name,
            &method.header.descriptor,
        );
        let wrapper = MethodNode {
            header: method.header,
            code: Some(wrapper_code),
        };
        let original = MethodNode {
            header: original_header,
            code: method.code,
        };
        [wrapper, original]
    }

    fn wrapper_code(
        &self,
        class: &BinaryName,
        name: &UnqualifiedName,
        original_name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Code {
        let mut labels = SynLabelGenerator::default();
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let handler = labels.fresh_label();

        let mut elements = vec![CodeElement::Label(start)];
        elements.extend(codegen::load_arguments(descriptor, false));
        elements.push(CodeElement::Instruction(Instruction::Invoke(
            InvokeType::Special,
            MethodRef::new(class.clone(), original_name.clone(), descriptor.clone()),
        )));
        elements.push(CodeElement::Label(end));
        elements.push(CodeElement::Branch(BranchInstruction::Return));

        elements.push(CodeElement::Label(handler));
        elements.push(codegen::invoke_static(self.failure_hook.method_ref()));
        let measure = [FieldType::int(), FieldType::int()];
        if name.as_str() == "onMeasure" && descriptor.parameters == measure {
            elements.extend([
                CodeElement::Instruction(Instruction::ALoad(0)),
                CodeElement::Instruction(Instruction::IConst0),
                CodeElement::Instruction(Instruction::IConst0),
                CodeElement::Instruction(Instruction::Invoke(
                    InvokeType::Virtual,
                    MethodRef::new(
                        class.clone(),
                        UnqualifiedName::from_static("setMeasuredDimension"),
                        descriptor.clone(),
                    ),
                )),
            ]);
        }
        elements.push(CodeElement::Branch(BranchInstruction::Return));

        Code {
            elements,
            try_catch_blocks: vec![TryCatchBlock {
                start,
                end,
                handler,
                catch_type: Some(BinaryName::THROWABLE),
            }],
            local_variables: vec![],
        }
    }
}

struct ExceptionWrapVisitor<'a> {
    pass: &'a ExceptionWrap,
    next: Box<dyn ClassVisitor + 'a>,

    /// Name of the class, unless it is an interface (which is never rewritten)
    class: Option<BinaryName>,

    /// Methods held back until every method of the class is known
    methods: Vec<MethodNode>,
}

impl<'a> ClassVisitor for ExceptionWrapVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.class = if header.is_interface() || self.pass.callbacks.is_empty() {
            None
        } else {
            Some(header.name.clone())
        };
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), jvm::Error> {
        if self.class.is_some() {
            self.methods.push(method);
            Ok(())
        } else {
            self.next.visit_method(method)
        }
    }

    fn visit_end(&mut self) -> Result<(), jvm::Error> {
        let methods = std::mem::take(&mut self.methods);
        let class = match self.class.take() {
            Some(class) => class,
            None => return self.next.visit_end(),
        };

        let already_wrapped = methods.iter().any(|method| {
            method.header.name.as_str().ends_with(ORIGINAL_SUFFIX)
                && methods.iter().any(|wrapper| {
                    wrapper.header.name.concat(ORIGINAL_SUFFIX) == method.header.name
                        && wrapper.header.descriptor == method.header.descriptor
                })
        });

        for method in methods {
            if !already_wrapped && method.code.is_some() && self.pass.is_eligible(&method.header) {
                debug!(
                    "Wrapping callback {}.{}{}",
                    class,
                    method.header.name,
                    method.header.descriptor.render()
                );
                for split in self.pass.split(&class, method) {
                    self.next.visit_method(split)?;
                }
            } else {
                self.next.visit_method(method)?;
            }
        }
        self.next.visit_end()
    }
}
