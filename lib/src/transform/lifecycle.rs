use super::{digest, Error, LifecycleAccessor, TransformSettings};
use crate::jvm::code::{
    BranchInstruction, EqComparison, Instruction, InvokeType, LabelGenerator, SynLabel,
};
use crate::jvm::model::{
    ClassHeader, ClassNode, Code, CodeElement, CodeInstruction, FieldRef, MethodNode, MethodRef,
};
use crate::jvm::{
    self, BinaryName, ClassAccessFlags, ClassBuilder, ClassVisitor, FieldAccessFlags, FieldType,
    MethodAccessFlags, MethodDescriptor, Name, RefType, UnqualifiedName,
};
use log::debug;
use std::sync::OnceLock;

/// Never let a lifecycle owner lookup come back empty
///
/// Views created outside of an activity (as they are in the sandbox) have no lifecycle owner
/// attached, and UI toolkits crash when they look one up. The accessor is rewritten so that a
/// `null` result is replaced with an instance of a generated fallback owner (whose lifecycle is
/// permanently resumed), which is then attached to the view so later lookups find it directly.
pub struct LifecycleOwnerFallback {
    accessor: LifecycleAccessor,
    fallback: OnceLock<ClassNode>,
}

impl LifecycleOwnerFallback {
    pub fn new(settings: &TransformSettings) -> Result<LifecycleOwnerFallback, Error> {
        let accessor = settings.lifecycle.clone();
        if accessor.fallback_class == accessor.owner {
            return Err(Error::InvalidSetting(format!(
                "fallback lifecycle owner cannot replace the accessor class {}",
                accessor.owner
            )));
        }
        Ok(LifecycleOwnerFallback {
            accessor,
            fallback: OnceLock::new(),
        })
    }

    pub fn key(&self) -> String {
        let accessor = &self.accessor;
        let parts = [
            &accessor.owner,
            &accessor.target,
            &accessor.owner_interface,
            &accessor.registry,
            &accessor.lifecycle,
            &accessor.state,
            &accessor.fallback_class,
        ];
        let mut entries: Vec<&str> = parts.iter().map(|name| name.as_str()).collect();
        entries.push(accessor.getter.as_str());
        entries.push(accessor.setter.as_str());
        format!("lifecycle-owner-fallback:{}", digest(entries))
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(LifecycleVisitor {
            pass: self,
            next,
            is_owner: false,
        })
    }

    /// Fallback owner class that rewritten accessors instantiate
    pub fn fallback_class(&self) -> &ClassNode {
        self.fallback.get_or_init(|| generate_fallback(&self.accessor))
    }

    /// Does the body already fall back to a fresh owner?
    fn is_rewritten(&self, code: &Code) -> bool {
        let fallback = RefType::Object(self.accessor.fallback_class.clone());
        code.elements
            .iter()
            .any(|element| *element == CodeElement::Instruction(Instruction::New(fallback.clone())))
    }

    /// Replace every `areturn` so that `null` becomes a fresh (and attached) fallback owner
    fn rewrite_getter(&self, code: Code) -> Code {
        let accessor = &self.accessor;
        let fallback = &accessor.fallback_class;
        let mut labels = code.label_generator();
        let mut elements = Vec::with_capacity(code.elements.len());

        for element in code.elements {
            if element != CodeElement::Branch(BranchInstruction::AReturn) {
                elements.push(element);
                continue;
            }
            let non_null = labels.fresh_label();
            elements.extend([
                CodeElement::Instruction(Instruction::Dup),
                CodeElement::Branch(BranchInstruction::IfNull(EqComparison::NE, non_null)),
                CodeElement::Instruction(Instruction::Pop),
                CodeElement::Instruction(Instruction::New(RefType::Object(fallback.clone()))),
                CodeElement::Instruction(Instruction::Dup),
                CodeElement::Instruction(Instruction::Invoke(
                    InvokeType::Special,
                    MethodRef::new(fallback.clone(), UnqualifiedName::INIT, no_arguments()),
                )),
                CodeElement::Instruction(Instruction::Dup),
                CodeElement::Instruction(Instruction::ALoad(0)),
                CodeElement::Instruction(Instruction::Swap),
                CodeElement::Instruction(Instruction::Invoke(
                    InvokeType::Static,
                    MethodRef::new(
                        accessor.owner.clone(),
                        accessor.setter.clone(),
                        accessor.setter_descriptor(),
                    ),
                )),
                CodeElement::Label(non_null),
                CodeElement::Branch(BranchInstruction::AReturn),
            ]);
        }

        Code { elements, ..code }
    }
}

fn no_arguments() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: None,
    }
}

fn returning(class: &BinaryName) -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: Some(FieldType::object(class.clone())),
    }
}

fn generate_fallback(accessor: &LifecycleAccessor) -> ClassNode {
    let this = &accessor.fallback_class;
    let registry_type = FieldType::object(accessor.registry.clone());
    let registry_field = FieldRef {
        owner: this.clone(),
        name: UnqualifiedName::from_static("registry"),
        descriptor: registry_type.clone(),
    };

    let mut class = ClassBuilder::new(
        ClassAccessFlags::PUBLIC
            | ClassAccessFlags::FINAL
            | ClassAccessFlags::SUPER
            | ClassAccessFlags::SYNTHETIC,
        this.clone(),
        BinaryName::OBJECT,
        vec![accessor.owner_interface.clone()],
    );
    class.add_field(
        FieldAccessFlags::PRIVATE | FieldAccessFlags::FINAL,
        registry_field.name.clone(),
        registry_type,
    );

    let state = FieldRef {
        owner: accessor.state.clone(),
        name: UnqualifiedName::from_static("RESUMED"),
        descriptor: FieldType::object(accessor.state.clone()),
    };
    let constructor = vec![
        Instruction::ALoad(0),
        Instruction::Invoke(
            InvokeType::Special,
            MethodRef::new(BinaryName::OBJECT, UnqualifiedName::INIT, no_arguments()),
        ),
        Instruction::ALoad(0),
        Instruction::New(RefType::Object(accessor.registry.clone())),
        Instruction::Dup,
        Instruction::ALoad(0),
        Instruction::Invoke(
            InvokeType::Special,
            MethodRef::new(
                accessor.registry.clone(),
                UnqualifiedName::INIT,
                MethodDescriptor {
                    parameters: vec![FieldType::object(accessor.owner_interface.clone())],
                    return_type: None,
                },
            ),
        ),
        Instruction::PutField(registry_field.clone()),
        Instruction::ALoad(0),
        Instruction::GetField(registry_field.clone()),
        Instruction::GetStatic(state),
        Instruction::Invoke(
            InvokeType::Virtual,
            MethodRef::new(
                accessor.registry.clone(),
                UnqualifiedName::from_static("setCurrentState"),
                MethodDescriptor {
                    parameters: vec![FieldType::object(accessor.state.clone())],
                    return_type: None,
                },
            ),
        ),
    ];
    class.add_method(
        MethodAccessFlags::PUBLIC,
        UnqualifiedName::INIT,
        no_arguments(),
        Some(body(constructor, BranchInstruction::Return)),
    );

    let get_registry = || {
        body(
            vec![
                Instruction::ALoad(0),
                Instruction::GetField(registry_field.clone()),
            ],
            BranchInstruction::AReturn,
        )
    };
    class.add_method(
        MethodAccessFlags::PUBLIC,
        UnqualifiedName::from_static("getLifecycle"),
        returning(&accessor.lifecycle),
        Some(get_registry()),
    );
    class.add_method(
        MethodAccessFlags::PUBLIC,
        UnqualifiedName::from_static("getLifecycleRegistry"),
        returning(&accessor.registry),
        Some(get_registry()),
    );

    debug!("Generated fallback lifecycle owner {}", this);
    class.result()
}

fn body(instructions: Vec<CodeInstruction>, exit: BranchInstruction<SynLabel>) -> Code {
    let mut elements: Vec<CodeElement> = instructions
        .into_iter()
        .map(CodeElement::Instruction)
        .collect();
    elements.push(CodeElement::Branch(exit));
    Code {
        elements,
        ..Code::default()
    }
}

struct LifecycleVisitor<'a> {
    pass: &'a LifecycleOwnerFallback,
    next: Box<dyn ClassVisitor + 'a>,
    is_owner: bool,
}

impl<'a> ClassVisitor for LifecycleVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.is_owner = header.name == self.pass.accessor.owner;
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        let accessor = &self.pass.accessor;
        let is_getter = self.is_owner
            && method.header.is_static()
            && method.header.name == accessor.getter
            && method.header.descriptor == accessor.getter_descriptor();
        let is_rewritten = method
            .code
            .as_ref()
            .map_or(false, |code| self.pass.is_rewritten(code));
        if is_getter && is_rewritten {
            debug!("{}.{} already has a fallback", accessor.owner, accessor.getter);
        } else if is_getter {
            if let Some(code) = method.code.take() {
                debug!(
                    "Adding fallback lifecycle owner to {}.{}",
                    accessor.owner, accessor.getter
                );
                method.code = Some(self.pass.rewrite_getter(code));
            }
        }
        self.next.visit_method(method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::{ClassDescriptor, DefinedClassesLocator, ObjectLocator};
    use crate::jvm::class_file::Version;
    use crate::jvm::model::MethodHeader;
    use crate::jvm::{write_class, ClassCollector, ClassReader};

    fn owner_class(accessor: &LifecycleAccessor) -> ClassNode {
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            accessor.owner.clone(),
            Some(BinaryName::OBJECT),
        ));
        let mut getter = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            accessor.getter.clone(),
            accessor.getter_descriptor(),
        ));
        getter.code = Some(body(vec![Instruction::AConstNull], BranchInstruction::AReturn));
        class.methods.push(getter);
        class
    }

    fn apply(pass: &LifecycleOwnerFallback, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn null_owner_is_replaced() {
        let settings = TransformSettings::default();
        let pass = LifecycleOwnerFallback::new(&settings).unwrap();
        let class = apply(&pass, owner_class(&settings.lifecycle));
        let elements = &class.methods[0].code.as_ref().unwrap().elements;

        let returns = elements
            .iter()
            .filter(|element| **element == CodeElement::Branch(BranchInstruction::AReturn))
            .count();
        assert_eq!(returns, 1);
        assert!(elements.contains(&CodeElement::Instruction(Instruction::New(
            RefType::Object(settings.lifecycle.fallback_class.clone())
        ))));
        assert!(elements.iter().any(|element| matches!(
            element,
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Static, method))
                if method.name == settings.lifecycle.setter
        )));
    }

    #[test]
    fn rewritten_getters_are_left_alone() {
        let settings = TransformSettings::default();
        let pass = LifecycleOwnerFallback::new(&settings).unwrap();
        let once = apply(&pass, owner_class(&settings.lifecycle));
        let twice = apply(&pass, once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn rewritten_getter_can_be_written() {
        let settings = TransformSettings::default();
        let pass = LifecycleOwnerFallback::new(&settings).unwrap();
        let class = apply(&pass, owner_class(&settings.lifecycle));

        let locator = DefinedClassesLocator::new();
        locator.register(ClassDescriptor::from_header(&pass.fallback_class().header));
        locator.register(ClassDescriptor::new(
            settings.lifecycle.owner_interface.clone(),
            BinaryName::OBJECT,
            vec![],
            true,
        ));
        let bytes = write_class(&class, &locator).unwrap();
        let reread = ClassReader::new(&bytes).unwrap();
        assert_eq!(reread.class_name(), &settings.lifecycle.owner);
    }

    #[test]
    fn fallback_class_is_generated_once() {
        let settings = TransformSettings::default();
        let pass = LifecycleOwnerFallback::new(&settings).unwrap();
        let first: *const ClassNode = pass.fallback_class();
        let second: *const ClassNode = pass.fallback_class();
        assert_eq!(first, second);

        let fallback = pass.fallback_class();
        assert_eq!(
            fallback.header.interfaces,
            vec![settings.lifecycle.owner_interface.clone()]
        );
        assert_eq!(fallback.fields.len(), 1);
        assert_eq!(fallback.methods.len(), 3);
        write_class(fallback, &ObjectLocator).unwrap();
    }

    #[test]
    fn other_methods_are_untouched() {
        let settings = TransformSettings::default();
        let pass = LifecycleOwnerFallback::new(&settings).unwrap();
        let mut class = owner_class(&settings.lifecycle);
        class.header.name = BinaryName::from_str("app/Other").unwrap();
        assert_eq!(apply(&pass, class.clone()), class);
    }
}
