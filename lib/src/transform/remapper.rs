use crate::jvm::model::{
    Annotation, Annotations, BootstrapMethod, ClassHeader, Code, CodeElement, ConstantValue,
    DynamicConstant, ElementValue, FieldNode, FieldRef, Handle, InvokeDynamic, MemberRef,
    MethodNode, MethodRef,
};
use crate::jvm::signatures::{map_signature, SignatureKind};
use crate::jvm::{
    BinaryName, ClassVisitor, Error, FieldType, MethodDescriptor, Name, ParseDescriptor, RefType,
    RenderDescriptor,
};

/// Renames classes everywhere they can be mentioned in a class
///
/// This covers the header (including signatures, inner classes, nest attributes, and record
/// components), member descriptors and signatures, annotations, constants (including method
/// handles and bootstrap methods), instruction operands, exception handlers, and local variable
/// debug information.
pub struct ClassRemapper<'m> {
    map: &'m dyn Fn(&BinaryName) -> Option<BinaryName>,
}

impl<'m> ClassRemapper<'m> {
    /// Remapper applying `map` (which returns `None` for names that stay the same)
    pub fn new(map: &'m dyn Fn(&BinaryName) -> Option<BinaryName>) -> ClassRemapper<'m> {
        ClassRemapper { map }
    }

    pub fn class(&self, name: &BinaryName) -> BinaryName {
        (self.map)(name).unwrap_or_else(|| name.clone())
    }

    pub fn ref_type(&self, ref_type: &RefType<BinaryName>) -> RefType<BinaryName> {
        ref_type.map(|name| self.class(name))
    }

    pub fn field_type(&self, field_type: &FieldType<BinaryName>) -> FieldType<BinaryName> {
        field_type.map(|name| self.class(name))
    }

    pub fn method_descriptor(
        &self,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> MethodDescriptor<BinaryName> {
        descriptor.map(|name| self.class(name))
    }

    pub fn signature(&self, signature: &str, kind: SignatureKind) -> Result<String, Error> {
        let map = |name: &str| -> Option<String> {
            let name = BinaryName::from_str(name).ok()?;
            (self.map)(&name).map(|mapped| mapped.as_str().to_owned())
        };
        map_signature(signature, kind, &map)
            .map_err(|err| Error::Malformed(format!("signature '{}': {}", signature, err)))
    }

    fn optional_signature(
        &self,
        signature: Option<String>,
        kind: SignatureKind,
    ) -> Result<Option<String>, Error> {
        signature
            .map(|signature| self.signature(&signature, kind))
            .transpose()
    }

    /// Field descriptor given as a string (as in annotations)
    fn descriptor_string(&self, descriptor: &str) -> Result<String, Error> {
        if descriptor == "V" {
            return Ok(descriptor.to_owned());
        }
        let field_type = FieldType::<BinaryName>::parse(descriptor)
            .map_err(|err| Error::InvalidDescriptor(format!("{}: {}", descriptor, err)))?;
        Ok(self.field_type(&field_type).render())
    }

    pub fn header(&self, mut header: ClassHeader) -> Result<ClassHeader, Error> {
        header.name = self.class(&header.name);
        header.super_name = header.super_name.map(|name| self.class(&name));
        header.interfaces = header
            .interfaces
            .iter()
            .map(|name| self.class(name))
            .collect();
        header.signature = self.optional_signature(header.signature, SignatureKind::Class)?;
        for inner_class in &mut header.inner_classes {
            let renamed = self.class(&inner_class.inner_class);
            if renamed != inner_class.inner_class {
                // Simple name follows the renamed class, as long as it still nests under its outer
                if let (Some(inner_name), Some(outer)) =
                    (&mut inner_class.inner_name, &inner_class.outer_class)
                {
                    let outer = self.class(outer);
                    if let Some(simple) = renamed
                        .as_str()
                        .strip_prefix(outer.as_str())
                        .and_then(|rest| rest.strip_prefix('$'))
                    {
                        *inner_name = simple.to_owned();
                    }
                }
            }
            inner_class.inner_class = renamed;
            inner_class.outer_class = inner_class.outer_class.as_ref().map(|name| self.class(name));
        }
        if let Some(enclosing) = &mut header.enclosing_method {
            enclosing.class = self.class(&enclosing.class);
            if let Some((_, descriptor)) = &mut enclosing.method {
                *descriptor = self.method_descriptor(descriptor);
            }
        }
        header.nest_host = header.nest_host.map(|name| self.class(&name));
        header.nest_members = header
            .nest_members
            .iter()
            .map(|name| self.class(name))
            .collect();
        header.permitted_subclasses = header
            .permitted_subclasses
            .iter()
            .map(|name| self.class(name))
            .collect();
        if let Some(components) = &mut header.record_components {
            for component in components {
                component.descriptor = self.field_type(&component.descriptor);
                component.signature =
                    self.optional_signature(component.signature.take(), SignatureKind::Field)?;
                component.annotations = self.annotations(&component.annotations)?;
            }
        }
        header.annotations = self.annotations(&header.annotations)?;
        Ok(header)
    }

    pub fn field(&self, mut field: FieldNode) -> Result<FieldNode, Error> {
        field.descriptor = self.field_type(&field.descriptor);
        field.signature = self.optional_signature(field.signature, SignatureKind::Field)?;
        field.constant_value = field
            .constant_value
            .map(|value| self.constant(&value))
            .transpose()?;
        field.annotations = self.annotations(&field.annotations)?;
        Ok(field)
    }

    pub fn method(&self, mut method: MethodNode) -> Result<MethodNode, Error> {
        let header = &mut method.header;
        header.descriptor = self.method_descriptor(&header.descriptor);
        header.signature = self.optional_signature(header.signature.take(), SignatureKind::Method)?;
        header.exceptions = header
            .exceptions
            .iter()
            .map(|name| self.class(name))
            .collect();
        header.annotations = self.annotations(&header.annotations)?;
        for parameters in [
            &mut header.parameter_annotations.visible,
            &mut header.parameter_annotations.invisible,
        ]
        .into_iter()
        .flatten()
        {
            for annotations in parameters.iter_mut() {
                *annotations = annotations
                    .iter()
                    .map(|annotation| self.annotation(annotation))
                    .collect::<Result<_, Error>>()?;
            }
        }
        header.annotation_default = header
            .annotation_default
            .as_ref()
            .map(|value| self.element_value(value))
            .transpose()?;
        method.code = method.code.map(|code| self.code(code)).transpose()?;
        Ok(method)
    }

    pub fn code(&self, mut code: Code) -> Result<Code, Error> {
        for element in &mut code.elements {
            if let CodeElement::Instruction(insn) = element {
                *insn = insn.map(
                    |class| Ok::<_, Error>(self.ref_type(class)),
                    |constant| self.constant(constant),
                    |field| Ok(self.field_ref(field)),
                    |method| Ok(self.method_ref(method)),
                    |indy| self.invoke_dynamic(indy),
                )?;
            }
        }
        for block in &mut code.try_catch_blocks {
            block.catch_type = block.catch_type.as_ref().map(|name| self.class(name));
        }
        for variable in &mut code.local_variables {
            variable.descriptor = self.field_type(&variable.descriptor);
            variable.signature =
                self.optional_signature(variable.signature.take(), SignatureKind::Field)?;
        }
        Ok(code)
    }

    pub fn field_ref(&self, field: &FieldRef) -> FieldRef {
        FieldRef {
            owner: self.class(&field.owner),
            name: field.name.clone(),
            descriptor: self.field_type(&field.descriptor),
        }
    }

    pub fn method_ref(&self, method: &MethodRef) -> MethodRef {
        MethodRef {
            owner: self.ref_type(&method.owner),
            name: method.name.clone(),
            descriptor: self.method_descriptor(&method.descriptor),
            is_interface: method.is_interface,
        }
    }

    pub fn constant(&self, constant: &ConstantValue) -> Result<ConstantValue, Error> {
        Ok(match constant {
            ConstantValue::Class(class) => ConstantValue::Class(self.ref_type(class)),
            ConstantValue::MethodType(descriptor) => {
                ConstantValue::MethodType(self.method_descriptor(descriptor))
            }
            ConstantValue::MethodHandle(handle) => ConstantValue::MethodHandle(self.handle(handle)),
            ConstantValue::Dynamic(dynamic) => ConstantValue::Dynamic(Box::new(DynamicConstant {
                name: dynamic.name.clone(),
                descriptor: self.field_type(&dynamic.descriptor),
                bootstrap: self.bootstrap(&dynamic.bootstrap)?,
            })),
            other => other.clone(),
        })
    }

    fn handle(&self, handle: &Handle) -> Handle {
        Handle {
            kind: handle.kind,
            member: match &handle.member {
                MemberRef::Field(field) => MemberRef::Field(self.field_ref(field)),
                MemberRef::Method(method) => MemberRef::Method(self.method_ref(method)),
            },
        }
    }

    fn bootstrap(&self, bootstrap: &BootstrapMethod) -> Result<BootstrapMethod, Error> {
        Ok(BootstrapMethod {
            handle: self.handle(&bootstrap.handle),
            arguments: bootstrap
                .arguments
                .iter()
                .map(|argument| self.constant(argument))
                .collect::<Result<_, Error>>()?,
        })
    }

    fn invoke_dynamic(&self, indy: &InvokeDynamic) -> Result<InvokeDynamic, Error> {
        Ok(InvokeDynamic {
            name: indy.name.clone(),
            descriptor: self.method_descriptor(&indy.descriptor),
            bootstrap: self.bootstrap(&indy.bootstrap)?,
        })
    }

    fn annotations(&self, annotations: &Annotations) -> Result<Annotations, Error> {
        let remap = |annotations: &[Annotation]| -> Result<Vec<Annotation>, Error> {
            annotations
                .iter()
                .map(|annotation| self.annotation(annotation))
                .collect()
        };
        Ok(Annotations {
            visible: remap(&annotations.visible)?,
            invisible: remap(&annotations.invisible)?,
        })
    }

    fn annotation(&self, annotation: &Annotation) -> Result<Annotation, Error> {
        Ok(Annotation {
            type_descriptor: self.descriptor_string(&annotation.type_descriptor)?,
            elements: annotation
                .elements
                .iter()
                .map(|(name, value)| Ok((name.clone(), self.element_value(value)?)))
                .collect::<Result<_, Error>>()?,
        })
    }

    fn element_value(&self, value: &ElementValue) -> Result<ElementValue, Error> {
        Ok(match value {
            ElementValue::Const(tag, constant) => ElementValue::Const(*tag, constant.clone()),
            ElementValue::Enum {
                type_descriptor,
                constant_name,
            } => ElementValue::Enum {
                type_descriptor: self.descriptor_string(type_descriptor)?,
                constant_name: constant_name.clone(),
            },
            ElementValue::Class(descriptor) => {
                ElementValue::Class(self.descriptor_string(descriptor)?)
            }
            ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(self.annotation(annotation)?)
            }
            ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| self.element_value(value))
                    .collect::<Result<_, Error>>()?,
            ),
        })
    }
}

/// Class visitor renaming classes with a [`ClassRemapper`]
pub struct RemappingVisitor<'a> {
    remapper: ClassRemapper<'a>,
    next: Box<dyn ClassVisitor + 'a>,
}

impl<'a> RemappingVisitor<'a> {
    pub fn new(
        map: &'a dyn Fn(&BinaryName) -> Option<BinaryName>,
        next: Box<dyn ClassVisitor + 'a>,
    ) -> RemappingVisitor<'a> {
        RemappingVisitor {
            remapper: ClassRemapper::new(map),
            next,
        }
    }
}

impl<'a> ClassVisitor for RemappingVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        let header = self.remapper.header(header)?;
        self.next.visit_header(header)
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        let field = self.remapper.field(field)?;
        self.next.visit_field(field)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        let method = self.remapper.method(method)?;
        self.next.visit_method(method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{HandleKind, Version};
    use crate::jvm::code::{Instruction, InvokeType};
    use crate::jvm::model::{InnerClass, MethodHeader};
    use crate::jvm::{
        ClassAccessFlags, InnerClassAccessFlags, MethodAccessFlags, UnqualifiedName,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn shade(name: &BinaryName) -> Option<BinaryName> {
        if name.as_str().starts_with("lib/") {
            Some(name.with_prefix("shaded/"))
        } else {
            None
        }
    }

    #[test]
    fn header_references() {
        let remapper = ClassRemapper::new(&shade);
        let mut header = ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name("lib/Outer"),
            Some(name("lib/Base")),
        );
        header.interfaces = vec![name("java/lang/Runnable"), name("lib/Api")];
        header.signature = Some(String::from("Llib/Base<Llib/Item;>;Ljava/lang/Runnable;"));
        header.inner_classes.push(InnerClass {
            inner_class: name("lib/Outer$Inner"),
            outer_class: Some(name("lib/Outer")),
            inner_name: Some(String::from("Inner")),
            access_flags: InnerClassAccessFlags::empty(),
        });
        header.annotations.visible.push(Annotation {
            type_descriptor: String::from("Llib/Marker;"),
            elements: vec![(
                String::from("value"),
                ElementValue::Class(String::from("Llib/Item;")),
            )],
        });

        let header = remapper.header(header).unwrap();
        assert_eq!(header.name, name("shaded/lib/Outer"));
        assert_eq!(header.super_name, Some(name("shaded/lib/Base")));
        assert_eq!(
            header.interfaces,
            vec![name("java/lang/Runnable"), name("shaded/lib/Api")]
        );
        assert_eq!(
            header.signature.as_deref(),
            Some("Lshaded/lib/Base<Lshaded/lib/Item;>;Ljava/lang/Runnable;")
        );
        assert_eq!(header.inner_classes[0].inner_class, name("shaded/lib/Outer$Inner"));
        assert_eq!(header.inner_classes[0].inner_name.as_deref(), Some("Inner"));
        assert_eq!(header.annotations.visible[0].type_descriptor, "Lshaded/lib/Marker;");
        assert_eq!(
            header.annotations.visible[0].elements[0].1,
            ElementValue::Class(String::from("Lshaded/lib/Item;"))
        );
    }

    #[test]
    fn code_references() {
        let remapper = ClassRemapper::new(&shade);
        let item = name("lib/Item");
        let descriptor = MethodDescriptor {
            parameters: vec![FieldType::object(item.clone())],
            return_type: Some(FieldType::array(FieldType::object(item.clone()))),
        };
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("wrap").unwrap(),
            descriptor.clone(),
        ));
        let handle = Handle {
            kind: HandleKind::InvokeStatic,
            member: MemberRef::Method(MethodRef::new(
                item.clone(),
                UnqualifiedName::from_str("make").unwrap(),
                descriptor.clone(),
            )),
        };
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::New(RefType::Object(item.clone()))),
                CodeElement::Instruction(Instruction::Invoke(
                    InvokeType::Static,
                    MethodRef::new(
                        name("java/util/Objects"),
                        UnqualifiedName::from_str("requireNonNull").unwrap(),
                        MethodDescriptor {
                            parameters: vec![FieldType::object(BinaryName::OBJECT)],
                            return_type: Some(FieldType::object(BinaryName::OBJECT)),
                        },
                    ),
                )),
                CodeElement::Instruction(Instruction::Ldc(ConstantValue::MethodHandle(handle))),
            ],
            ..Code::default()
        });

        let method = remapper.method(method).unwrap();
        assert_eq!(
            method.header.descriptor.render(),
            "(Lshaded/lib/Item;)[Lshaded/lib/Item;"
        );
        let elements = method.code.unwrap().elements;
        assert_eq!(
            elements[0],
            CodeElement::Instruction(Instruction::New(RefType::Object(name("shaded/lib/Item"))))
        );
        match &elements[1] {
            CodeElement::Instruction(Instruction::Invoke(_, method)) => {
                assert_eq!(method.owner_class(), Some(&name("java/util/Objects")))
            }
            other => panic!("unexpected element {:?}", other),
        }
        match &elements[2] {
            CodeElement::Instruction(Instruction::Ldc(ConstantValue::MethodHandle(handle))) => {
                match &handle.member {
                    MemberRef::Method(method) => {
                        assert_eq!(method.owner_class(), Some(&name("shaded/lib/Item")))
                    }
                    other => panic!("unexpected member {:?}", other),
                }
            }
            other => panic!("unexpected element {:?}", other),
        }
    }
}
