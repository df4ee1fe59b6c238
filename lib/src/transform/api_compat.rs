use super::{codegen, digest, Error};
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::model::{ClassHeader, Code, CodeElement, MethodNode, MethodRef};
use crate::jvm::{
    self, BinaryName, ClassVisitor, FieldType, MethodDescriptor, Name, RefType, RenderDescriptor,
    UnqualifiedName,
};
use log::debug;
use std::collections::HashSet;

/// Patch applied to one method
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ShimKind {
    /// Calls to `String.startsWith(String)` become `String.contains(CharSequence)`
    PrefixCheckToContains,

    /// The body just returns a default value (`0`, `false`, `null`, or nothing)
    NoOp,

    /// The body forwards every argument to a static method (with `this` first for instance
    /// methods) and returns what it returns
    RedirectToStatic {
        owner: BinaryName,
        name: UnqualifiedName,
    },
}

/// Patch to a specific method of a specific class
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiShim {
    pub class: BinaryName,
    pub method: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub kind: ShimKind,
}

impl ApiShim {
    fn render(&self) -> String {
        let kind = match &self.kind {
            ShimKind::PrefixCheckToContains => String::from("contains"),
            ShimKind::NoOp => String::from("noop"),
            ShimKind::RedirectToStatic { owner, name } => format!("redirect:{}.{}", owner, name),
        };
        format!(
            "{}.{}{}={}",
            self.class,
            self.method,
            self.descriptor.render(),
            kind
        )
    }
}

/// Patches for library methods that misbehave in the sandbox
///
/// Each shim names its method exactly. Methods that do not exist (or have no body) are simply
/// never patched.
pub struct ApiCompat {
    shims: Vec<ApiShim>,
}

impl ApiCompat {
    pub fn new(shims: Vec<ApiShim>) -> Result<ApiCompat, Error> {
        let mut seen = HashSet::new();
        for shim in &shims {
            if !seen.insert((&shim.class, &shim.method, &shim.descriptor)) {
                return Err(Error::InvalidSetting(format!(
                    "more than one shim for {}.{}",
                    shim.class, shim.method
                )));
            }
            if shim.method.is_initializer() && shim.kind != ShimKind::PrefixCheckToContains {
                return Err(Error::InvalidSetting(format!(
                    "body of initializer {}.{} cannot be replaced",
                    shim.class, shim.method
                )));
            }
        }
        Ok(ApiCompat { shims })
    }

    pub fn key(&self) -> String {
        let mut shims: Vec<String> = self.shims.iter().map(ApiShim::render).collect();
        shims.sort();
        format!("api-compat:{}", digest(shims))
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(ApiCompatVisitor {
            pass: self,
            next,
            class_shims: vec![],
        })
    }
}

struct ApiCompatVisitor<'a> {
    pass: &'a ApiCompat,
    next: Box<dyn ClassVisitor + 'a>,

    /// Shims for the class being visited
    class_shims: Vec<&'a ApiShim>,
}

impl<'a> ClassVisitor for ApiCompatVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.class_shims = self
            .pass
            .shims
            .iter()
            .filter(|shim| shim.class == header.name)
            .collect();
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        let shim = self.class_shims.iter().copied().find(|shim| {
            shim.method == method.header.name && shim.descriptor == method.header.descriptor
        });
        if let Some(shim) = shim {
            if let Some(code) = method.code.take() {
                debug!("Patching {}.{}", shim.class, shim.method);
                method.code = Some(match &shim.kind {
                    ShimKind::PrefixCheckToContains => prefix_check_to_contains(code),
                    ShimKind::NoOp => Code {
                        elements: codegen::default_return(&method.header.descriptor),
                        ..Code::default()
                    },
                    ShimKind::RedirectToStatic { owner, name } => {
                        redirect_to_static(&shim.class, &method, owner, name)
                    }
                });
            }
        }
        self.next.visit_method(method)
    }
}

fn starts_with() -> MethodRef {
    MethodRef::new(
        BinaryName::STRING,
        UnqualifiedName::STARTSWITH,
        MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::STRING)],
            return_type: Some(FieldType::boolean()),
        },
    )
}

fn contains() -> MethodRef {
    MethodRef::new(
        BinaryName::STRING,
        UnqualifiedName::CONTAINS,
        MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::CHARSEQUENCE)],
            return_type: Some(FieldType::boolean()),
        },
    )
}

fn prefix_check_to_contains(mut code: Code) -> Code {
    let starts_with = starts_with();
    for element in &mut code.elements {
        if let CodeElement::Instruction(Instruction::Invoke(InvokeType::Virtual, method)) = element
        {
            if *method == starts_with {
                *method = contains();
            }
        }
    }
    code
}

fn redirect_to_static(
    class: &BinaryName,
    method: &MethodNode,
    owner: &BinaryName,
    name: &UnqualifiedName,
) -> Code {
    let header = &method.header;
    let mut descriptor = header.descriptor.clone();
    if !header.is_static() {
        descriptor
            .parameters
            .insert(0, FieldType::Ref(RefType::Object(class.clone())));
    }
    let return_type = descriptor.return_type.clone();

    let mut elements = codegen::load_arguments(&header.descriptor, header.is_static());
    elements.push(codegen::invoke_static(MethodRef::new(
        owner.clone(),
        name.clone(),
        descriptor,
    )));
    elements.push(CodeElement::Branch(codegen::return_instruction(
        return_type.as_ref(),
    )));
    Code {
        elements,
        ..Code::default()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::BranchInstruction;
    use crate::jvm::model::{ClassNode, MethodHeader};
    use crate::jvm::{ClassAccessFlags, ClassCollector, MethodAccessFlags};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn matches_descriptor() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::STRING), FieldType::long()],
            return_type: Some(FieldType::boolean()),
        }
    }

    fn library_class() -> ClassNode {
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name("lib/Fonts"),
            Some(BinaryName::OBJECT),
        ));
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::PUBLIC,
            UnqualifiedName::from_str("matches").unwrap(),
            matches_descriptor(),
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::ALoad(1)),
                CodeElement::Instruction(Instruction::Ldc(
                    crate::jvm::model::ConstantValue::String(String::from("sans")),
                )),
                CodeElement::Instruction(Instruction::Invoke(InvokeType::Virtual, starts_with())),
                CodeElement::Branch(BranchInstruction::IReturn),
            ],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    fn apply(pass: &ApiCompat, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    fn shim(kind: ShimKind) -> ApiShim {
        ApiShim {
            class: name("lib/Fonts"),
            method: UnqualifiedName::from_str("matches").unwrap(),
            descriptor: matches_descriptor(),
            kind,
        }
    }

    #[test]
    fn prefix_checks_become_contains() {
        let pass = ApiCompat::new(vec![shim(ShimKind::PrefixCheckToContains)]).unwrap();
        let class = apply(&pass, library_class());
        let code = class.methods[0].code.as_ref().unwrap();
        assert_eq!(
            code.elements[2],
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Virtual, contains()))
        );
    }

    #[test]
    fn no_op_returns_default() {
        let pass = ApiCompat::new(vec![shim(ShimKind::NoOp)]).unwrap();
        let class = apply(&pass, library_class());
        assert_eq!(
            class.methods[0].code.as_ref().unwrap().elements,
            vec![
                CodeElement::Instruction(Instruction::IConst0),
                CodeElement::Branch(BranchInstruction::IReturn),
            ]
        );
    }

    #[test]
    fn redirect_passes_this_first() {
        let pass = ApiCompat::new(vec![shim(ShimKind::RedirectToStatic {
            owner: name("compat/Fonts"),
            name: UnqualifiedName::from_str("matches").unwrap(),
        })])
        .unwrap();
        let class = apply(&pass, library_class());
        let elements = &class.methods[0].code.as_ref().unwrap().elements;
        assert_eq!(elements[0], CodeElement::Instruction(Instruction::ALoad(0)));
        assert_eq!(elements[1], CodeElement::Instruction(Instruction::ALoad(1)));
        assert_eq!(elements[2], CodeElement::Instruction(Instruction::LLoad(2)));
        match &elements[3] {
            CodeElement::Instruction(Instruction::Invoke(InvokeType::Static, method)) => {
                assert_eq!(
                    method.descriptor.render(),
                    "(Llib/Fonts;Ljava/lang/String;J)Z"
                );
            }
            other => panic!("unexpected element {:?}", other),
        }
        assert_eq!(elements[4], CodeElement::Branch(BranchInstruction::IReturn));
    }

    #[test]
    fn other_classes_are_untouched() {
        let pass = ApiCompat::new(vec![shim(ShimKind::NoOp)]).unwrap();
        let mut class = library_class();
        class.header.name = name("lib/Other");
        assert_eq!(apply(&pass, class.clone()), class);
    }

    #[test]
    fn other_methods_keep_their_bodies() {
        let pass = ApiCompat::new(vec![shim(ShimKind::NoOp)]).unwrap();
        let mut class = library_class();
        let mut sibling = class.methods[0].clone();
        sibling.header.name = UnqualifiedName::from_str("matchesExactly").unwrap();
        class.methods.push(sibling.clone());

        let patched = apply(&pass, class);
        assert_eq!(patched.methods[1], sibling);
        assert_eq!(
            patched.methods[0].code.as_ref().unwrap().elements.len(),
            2,
            "only the shimmed method is replaced"
        );
    }

    #[test]
    fn invalid_shims() {
        assert!(ApiCompat::new(vec![shim(ShimKind::NoOp), shim(ShimKind::NoOp)]).is_err());
        let mut constructor = shim(ShimKind::NoOp);
        constructor.method = UnqualifiedName::INIT;
        assert!(ApiCompat::new(vec![constructor]).is_err());
    }

    #[test]
    fn keys_ignore_shim_order() {
        let first = shim(ShimKind::NoOp);
        let mut second = shim(ShimKind::PrefixCheckToContains);
        second.class = name("lib/Other");
        let forwards = ApiCompat::new(vec![first.clone(), second.clone()]).unwrap();
        let backwards = ApiCompat::new(vec![second, first]).unwrap();
        assert_eq!(forwards.key(), backwards.key());
    }
}
