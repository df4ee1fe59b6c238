use super::Error;
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::model::{ClassHeader, CodeElement, MethodNode};
use crate::jvm::{self, BinaryName, ClassVisitor, Name, RefType};
use log::{debug, trace};

/// Substitute one class for another where it gets extended or instantiated
///
/// `extends A` becomes `extends B`, `new A` becomes `new B`, and every `invokespecial A.m`
/// (constructor and super calls) becomes `invokespecial B.m`. Nothing checks that `B` is
/// actually compatible with `A`. The two classes themselves are left alone.
pub struct ReplaceClass {
    from: BinaryName,
    to: BinaryName,
}

impl ReplaceClass {
    pub fn new(from: &str, to: &str) -> Result<ReplaceClass, Error> {
        let from = BinaryName::from_str(from).map_err(Error::InvalidSetting)?;
        let to = BinaryName::from_str(to).map_err(Error::InvalidSetting)?;
        if from == to {
            return Err(Error::InvalidSetting(format!(
                "class {} cannot replace itself",
                from
            )));
        }
        Ok(ReplaceClass { from, to })
    }

    pub fn key(&self) -> String {
        format!("replace-class:{}->{}", self.from, self.to)
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(ReplaceClassVisitor {
            pass: self,
            next,
            enabled: false,
        })
    }
}

struct ReplaceClassVisitor<'a> {
    pass: &'a ReplaceClass,
    next: Box<dyn ClassVisitor + 'a>,
    enabled: bool,
}

impl<'a> ClassVisitor for ReplaceClassVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, mut header: ClassHeader) -> Result<(), jvm::Error> {
        let pass = self.pass;
        self.enabled = header.name != pass.from && header.name != pass.to;
        if self.enabled && header.super_name.as_ref() == Some(&pass.from) {
            debug!("Rebasing {} from {} onto {}", header.name, pass.from, pass.to);
            header.super_name = Some(pass.to.clone());
        }
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        let pass = self.pass;
        if let (true, Some(code)) = (self.enabled, &mut method.code) {
            for element in &mut code.elements {
                match element {
                    CodeElement::Instruction(Instruction::New(RefType::Object(class)))
                        if *class == pass.from =>
                    {
                        trace!("Replacing new {} in {}", class, method.header.name);
                        *class = pass.to.clone();
                    }
                    CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, target))
                        if target.owner_class() == Some(&pass.from) =>
                    {
                        target.owner = RefType::Object(pass.to.clone());
                    }
                    _ => (),
                }
            }
        }
        self.next.visit_method(method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::BranchInstruction;
    use crate::jvm::model::{ClassNode, Code, MethodHeader, MethodRef};
    use crate::jvm::{
        ClassAccessFlags, ClassCollector, MethodAccessFlags, MethodDescriptor, UnqualifiedName,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn init(owner: &str) -> MethodRef {
        MethodRef::new(
            name(owner),
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        )
    }

    fn subclass(class: &str) -> ClassNode {
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name(class),
            Some(name("a/A")),
        ));
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::PUBLIC,
            UnqualifiedName::INIT,
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::ALoad(0)),
                CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, init("a/A"))),
                CodeElement::Instruction(Instruction::New(RefType::Object(name("a/A")))),
                CodeElement::Instruction(Instruction::Dup),
                CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, init("a/A"))),
                CodeElement::Instruction(Instruction::Pop),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    fn apply(pass: &ReplaceClass, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn extends_new_and_constructors_are_replaced() {
        let pass = ReplaceClass::new("a/A", "a/B").unwrap();
        let class = apply(&pass, subclass("a/C"));
        assert_eq!(class.header.super_name, Some(name("a/B")));

        let elements = &class.methods[0].code.as_ref().unwrap().elements;
        assert_eq!(
            elements[1],
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, init("a/B")))
        );
        assert_eq!(
            elements[2],
            CodeElement::Instruction(Instruction::New(RefType::Object(name("a/B"))))
        );
        assert_eq!(
            elements[4],
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Special, init("a/B")))
        );
    }

    #[test]
    fn replacement_itself_is_untouched() {
        let pass = ReplaceClass::new("a/A", "a/B").unwrap();
        let replacement = subclass("a/B");
        assert_eq!(apply(&pass, replacement.clone()), replacement);
    }

    #[test]
    fn invalid_replacements() {
        assert!(ReplaceClass::new("a/A", "a/A").is_err());
        assert!(ReplaceClass::new("a.A", "a/B").is_err());
    }
}
