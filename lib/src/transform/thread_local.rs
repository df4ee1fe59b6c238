use super::{ClassRemapper, Error, RuntimeHooks, TransformSettings};
use crate::jvm::model::{ClassHeader, FieldNode, MethodNode};
use crate::jvm::{self, BinaryName, ClassVisitor};
use log::debug;

/// Swap `java/lang/ThreadLocal` for a variant whose values can be tracked (and cleared)
///
/// Every reference is renamed: super classes, instantiations, calls, descriptors, signatures.
/// Only the exact name is matched, so subclasses of `ThreadLocal` (eg. `InheritableThreadLocal`)
/// are untouched. The tracked variant itself and the runtime helpers are never rewritten.
pub struct ThreadLocalSubstitution {
    replacement: BinaryName,
    hooks: RuntimeHooks,
}

impl ThreadLocalSubstitution {
    pub fn new(settings: &TransformSettings) -> Result<ThreadLocalSubstitution, Error> {
        let replacement = settings.tracked_thread_local.clone();
        if replacement == BinaryName::THREADLOCAL {
            return Err(Error::InvalidSetting(String::from(
                "tracked thread local cannot be java/lang/ThreadLocal itself",
            )));
        }
        Ok(ThreadLocalSubstitution {
            replacement,
            hooks: settings.hooks.clone(),
        })
    }

    pub fn key(&self) -> String {
        format!("thread-local:{}", self.replacement)
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(ThreadLocalVisitor {
            pass: self,
            next,
            enabled: false,
        })
    }

    fn substitute(&self, name: &BinaryName) -> Option<BinaryName> {
        if *name == BinaryName::THREADLOCAL {
            Some(self.replacement.clone())
        } else {
            None
        }
    }
}

struct ThreadLocalVisitor<'a> {
    pass: &'a ThreadLocalSubstitution,
    next: Box<dyn ClassVisitor + 'a>,
    enabled: bool,
}

impl<'a> ThreadLocalVisitor<'a> {
    fn remap<T>(
        &self,
        value: T,
        apply: impl FnOnce(&ClassRemapper, T) -> Result<T, jvm::Error>,
    ) -> Result<T, jvm::Error> {
        if self.enabled {
            let pass = self.pass;
            let map = |name: &BinaryName| pass.substitute(name);
            apply(&ClassRemapper::new(&map), value)
        } else {
            Ok(value)
        }
    }
}

impl<'a> ClassVisitor for ThreadLocalVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.enabled = header.name != self.pass.replacement
            && !self.pass.hooks.is_helper_class(&header.name);
        if !self.enabled {
            debug!("Not substituting thread locals in {}", header.name);
        }
        let header = self.remap(header, |remapper, header| remapper.header(header))?;
        self.next.visit_header(header)
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), jvm::Error> {
        let field = self.remap(field, |remapper, field| remapper.field(field))?;
        self.next.visit_field(field)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), jvm::Error> {
        let method = self.remap(method, |remapper, method| remapper.method(method))?;
        self.next.visit_method(method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
    use crate::jvm::model::{ClassNode, Code, CodeElement, MethodHeader, MethodRef};
    use crate::jvm::{
        ClassAccessFlags, ClassCollector, FieldAccessFlags, FieldType, MethodAccessFlags,
        MethodDescriptor, Name, RefType, UnqualifiedName,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn holder(class: &str) -> ClassNode {
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name(class),
            Some(BinaryName::OBJECT),
        ));
        class.fields.push(FieldNode::new(
            FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            UnqualifiedName::from_str("CURRENT").unwrap(),
            FieldType::object(BinaryName::THREADLOCAL),
        ));
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::CLINIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::New(RefType::Object(
                    BinaryName::THREADLOCAL,
                ))),
                CodeElement::Instruction(Instruction::Dup),
                CodeElement::Instruction(Instruction::Invoke(
                    InvokeType::Special,
                    MethodRef::new(
                        BinaryName::THREADLOCAL,
                        UnqualifiedName::INIT,
                        MethodDescriptor {
                            parameters: vec![],
                            return_type: None,
                        },
                    ),
                )),
                CodeElement::Instruction(Instruction::Pop),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    fn apply(pass: &ThreadLocalSubstitution, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn thread_locals_are_substituted() {
        let settings = TransformSettings::default();
        let pass = ThreadLocalSubstitution::new(&settings).unwrap();
        let class = apply(&pass, holder("app/Session"));
        let tracked = settings.tracked_thread_local.clone();

        assert_eq!(class.fields[0].descriptor, FieldType::object(tracked.clone()));
        let elements = &class.methods[0].code.as_ref().unwrap().elements;
        assert_eq!(
            elements[0],
            CodeElement::Instruction(Instruction::New(RefType::Object(tracked.clone())))
        );
        match &elements[2] {
            CodeElement::Instruction(Instruction::Invoke(_, method)) => {
                assert_eq!(method.owner_class(), Some(&tracked))
            }
            other => panic!("unexpected element {:?}", other),
        }
    }

    #[test]
    fn runtime_classes_are_untouched() {
        let settings = TransformSettings::default();
        let pass = ThreadLocalSubstitution::new(&settings).unwrap();

        let tracked = holder(settings.tracked_thread_local.as_str());
        assert_eq!(apply(&pass, tracked.clone()), tracked);

        let helper = holder("classmorph/runtime/SandboxHooks");
        assert_eq!(apply(&pass, helper.clone()), helper);
    }

    #[test]
    fn only_exact_name_matches() {
        let pass = ThreadLocalSubstitution::new(&TransformSettings::default()).unwrap();
        let mut class = holder("app/Session");
        class.fields[0].descriptor = FieldType::object(name("java/lang/InheritableThreadLocal"));
        class.methods.clear();
        assert_eq!(apply(&pass, class.clone()), class);
    }

    #[test]
    fn self_substitution_is_rejected() {
        let mut settings = TransformSettings::default();
        settings.tracked_thread_local = BinaryName::THREADLOCAL;
        assert!(ThreadLocalSubstitution::new(&settings).is_err());
    }
}
