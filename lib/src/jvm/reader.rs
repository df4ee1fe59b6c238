//! Parse class files into the structural model
//!
//! [`ClassReader`] resolves every constant pool reference up front, so the visitors downstream
//! never see an index. Branch targets and the boundaries of exception ranges and local variables
//! turn into [`SynLabel`]s, placed in ascending offset order.
//!
//! Attributes which are not modeled (type annotations, custom attributes, ...) are dropped with a
//! debug log. Stack map frames are dropped silently since the writer always recomputes them.

use crate::jvm::class_file::{
    self, AnnotationDefault, Attribute, BootstrapMethods, ClassConstantIndex, ClassFile, Constant,
    ConstantIndex, ConstantValue as RawConstantValue, Exceptions, FieldRefConstantIndex,
    InnerClasses, InvokeDynamicConstantIndex, LineNumberTable, LocalVariableTable,
    LocalVariableTypeTable, MethodParameters, MethodRefConstantIndex, NestHost, NestMembers,
    PermittedSubclasses, Record, RuntimeInvisibleAnnotations,
    RuntimeInvisibleParameterAnnotations, RuntimeVisibleAnnotations,
    RuntimeVisibleParameterAnnotations, Signature, SourceDebugExtension, SourceFile,
    Utf8ConstantIndex,
};
use crate::jvm::class_graph::ClassDescriptor;
use crate::jvm::code::{
    decode_code_array, DecodedInstruction, LabelGenerator, SerializableInstruction, SynLabel,
    SynLabelGenerator,
};
use crate::jvm::model::{
    Annotation, Annotations, BootstrapMethod, ClassHeader, ClassNode, Code, CodeElement,
    CodeInstruction, ConstantValue, DynamicConstant, ElementValue, EnclosingMethod, FieldNode,
    FieldRef, Handle, InnerClass, InvokeDynamic, LocalVariable, MemberRef, MethodHeader,
    MethodNode, MethodParameter, MethodRef, RecordComponent, TryCatchBlock,
};
use crate::jvm::visitor::ClassVisitor;
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, FieldType, MethodDescriptor, Name, ParseDescriptor,
    RefType, UnqualifiedName,
};
use log::debug;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Bootstrap methods referring to dynamic constants which refer to bootstrap methods, ...
const MAX_DYNAMIC_NESTING: usize = 32;

/// Parsed class, ready to be replayed into visitors
pub struct ClassReader<'b> {
    bytes: &'b [u8],
    node: ClassNode,
}

impl<'b> ClassReader<'b> {
    /// Parse and fully resolve a class file
    pub fn new(bytes: &'b [u8]) -> Result<ClassReader<'b>, Error> {
        let class_file = ClassFile::parse(bytes)?;
        let node = Pool::new(&class_file)?.read_class()?;
        Ok(ClassReader { bytes, node })
    }

    /// Read just enough of a class file to describe its place in the class hierarchy
    ///
    /// Fields, methods, and attributes are never looked at.
    pub fn descriptor(bytes: &[u8]) -> Result<ClassDescriptor, Error> {
        let class_file = ClassFile::parse_header(bytes)?;
        let name = class_name(&class_file, class_file.this_class)?;
        if name == BinaryName::OBJECT {
            return Ok(ClassDescriptor::object());
        }
        let super_name = match class_file.super_class {
            Some(super_class) => class_name(&class_file, super_class)?,
            None => return Err(Error::Malformed(format!("{} has no super class", name))),
        };
        let interfaces = class_file
            .interfaces
            .iter()
            .map(|interface| class_name(&class_file, *interface))
            .collect::<Result<Vec<_>, Error>>()?;
        let is_interface = class_file.access_flags.contains(ClassAccessFlags::INTERFACE);
        Ok(ClassDescriptor::new(name, super_name, interfaces, is_interface))
    }

    /// Bytes the class was read from
    pub fn bytes(&self) -> &'b [u8] {
        self.bytes
    }

    pub fn node(&self) -> &ClassNode {
        &self.node
    }

    pub fn class_name(&self) -> &BinaryName {
        &self.node.header.name
    }

    /// Copy of the structural model
    pub fn read_node(&self) -> ClassNode {
        self.node.clone()
    }

    /// Replay the class into a visitor chain
    pub fn accept(&self, visitor: &mut dyn ClassVisitor) -> Result<(), Error> {
        self.read_node().accept(visitor)
    }
}

fn class_name(class_file: &ClassFile, index: ClassConstantIndex) -> Result<BinaryName, Error> {
    let name = class_file.class_name(index)?;
    BinaryName::from_str(name).map_err(Error::InvalidName)
}

fn parse_field_type(descriptor: &str) -> Result<FieldType<BinaryName>, Error> {
    FieldType::parse(descriptor)
        .map_err(|err| Error::InvalidDescriptor(format!("{}: {}", descriptor, err)))
}

fn parse_method_descriptor(descriptor: &str) -> Result<MethodDescriptor<BinaryName>, Error> {
    MethodDescriptor::parse(descriptor)
        .map_err(|err| Error::InvalidDescriptor(format!("{}: {}", descriptor, err)))
}

fn parse_unqualified(name: &str) -> Result<UnqualifiedName, Error> {
    UnqualifiedName::from_str(name).map_err(Error::InvalidName)
}

/// Constant pool resolution for one class file
struct Pool<'c> {
    class_file: &'c ClassFile,
    bootstrap_methods: Vec<class_file::BootstrapMethod>,
}

impl<'c> Pool<'c> {
    fn new(class_file: &'c ClassFile) -> Result<Pool<'c>, Error> {
        let mut bootstrap_methods = vec![];
        for attribute in &class_file.attributes {
            if class_file.attribute_name(attribute)? == "BootstrapMethods" {
                bootstrap_methods = attribute.decode::<BootstrapMethods>()?.0;
            }
        }
        Ok(Pool {
            class_file,
            bootstrap_methods,
        })
    }

    fn utf8(&self, index: Utf8ConstantIndex) -> Result<&'c str, Error> {
        self.class_file.utf8(index)
    }

    fn string(&self, index: Utf8ConstantIndex) -> Result<String, Error> {
        self.utf8(index).map(str::to_owned)
    }

    fn binary_name(&self, index: ClassConstantIndex) -> Result<BinaryName, Error> {
        class_name(self.class_file, index)
    }

    fn ref_type(&self, index: ClassConstantIndex) -> Result<RefType<BinaryName>, Error> {
        let name = self.class_file.class_name(index)?;
        RefType::from_internal_name(name)
            .map_err(|err| Error::InvalidDescriptor(format!("{}: {}", name, err)))
    }

    fn name_and_type(
        &self,
        index: class_file::NameAndTypeConstantIndex,
    ) -> Result<(&'c str, &'c str), Error> {
        self.class_file.name_and_type(index)
    }

    fn field_ref(&self, index: FieldRefConstantIndex) -> Result<FieldRef, Error> {
        match self.class_file.constant(index.0)? {
            Constant::FieldRef(class, name_and_type) => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(FieldRef {
                    owner: self.binary_name(*class)?,
                    name: parse_unqualified(name)?,
                    descriptor: parse_field_type(descriptor)?,
                })
            }
            other => Err(unexpected("Fieldref", index.0, other)),
        }
    }

    fn method_ref(&self, index: MethodRefConstantIndex) -> Result<MethodRef, Error> {
        match self.class_file.constant(index.0)? {
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                Ok(MethodRef {
                    owner: self.ref_type(*class)?,
                    name: parse_unqualified(name)?,
                    descriptor: parse_method_descriptor(descriptor)?,
                    is_interface: *is_interface,
                })
            }
            other => Err(unexpected("Methodref", index.0, other)),
        }
    }

    fn handle(&self, index: ConstantIndex) -> Result<Handle, Error> {
        match self.class_file.constant(index)? {
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                let member = if handle_kind.is_field() {
                    MemberRef::Field(self.field_ref(FieldRefConstantIndex(*member))?)
                } else {
                    MemberRef::Method(self.method_ref(MethodRefConstantIndex(*member))?)
                };
                Ok(Handle {
                    kind: *handle_kind,
                    member,
                })
            }
            other => Err(unexpected("MethodHandle", index, other)),
        }
    }

    fn bootstrap(&self, index: u16, depth: usize) -> Result<BootstrapMethod, Error> {
        if depth > MAX_DYNAMIC_NESTING {
            return Err(Error::Malformed(String::from(
                "dynamic constants are nested too deeply",
            )));
        }
        let entry = self.bootstrap_methods.get(index as usize).ok_or_else(|| {
            Error::Malformed(format!("invalid bootstrap method index {}", index))
        })?;
        let handle = self.handle(entry.bootstrap_method)?;
        let arguments = entry
            .bootstrap_arguments
            .iter()
            .map(|argument| self.constant_value_at_depth(*argument, depth + 1))
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(BootstrapMethod { handle, arguments })
    }

    fn invoke_dynamic(&self, index: InvokeDynamicConstantIndex) -> Result<InvokeDynamic, Error> {
        match self.class_file.constant(index.0)? {
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                let (name, descriptor) = self.name_and_type(*method_descriptor)?;
                Ok(InvokeDynamic {
                    name: parse_unqualified(name)?,
                    descriptor: parse_method_descriptor(descriptor)?,
                    bootstrap: self.bootstrap(*bootstrap_method, 0)?,
                })
            }
            other => Err(unexpected("InvokeDynamic", index.0, other)),
        }
    }

    fn constant_value(&self, index: ConstantIndex) -> Result<ConstantValue, Error> {
        self.constant_value_at_depth(index, 0)
    }

    fn constant_value_at_depth(
        &self,
        index: ConstantIndex,
        depth: usize,
    ) -> Result<ConstantValue, Error> {
        Ok(match self.class_file.constant(index)? {
            Constant::Integer(integer) => ConstantValue::Integer(*integer),
            Constant::Float(float) => ConstantValue::Float(*float),
            Constant::Long(long) => ConstantValue::Long(*long),
            Constant::Double(double) => ConstantValue::Double(*double),
            Constant::String(string) => ConstantValue::String(self.string(*string)?),
            Constant::Class(_) => {
                ConstantValue::Class(self.ref_type(ClassConstantIndex(index))?)
            }
            Constant::MethodType { descriptor } => {
                ConstantValue::MethodType(parse_method_descriptor(self.utf8(*descriptor)?)?)
            }
            Constant::MethodHandle { .. } => ConstantValue::MethodHandle(self.handle(index)?),
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                let (name, descriptor) = self.name_and_type(*name_and_type)?;
                ConstantValue::Dynamic(Box::new(DynamicConstant {
                    name: parse_unqualified(name)?,
                    descriptor: parse_field_type(descriptor)?,
                    bootstrap: self.bootstrap(*bootstrap_method, depth + 1)?,
                }))
            }
            other => return Err(unexpected("loadable", index, other)),
        })
    }

    fn attribute_name(&self, attribute: &Attribute) -> Result<&'c str, Error> {
        self.class_file.attribute_name(attribute)
    }

    fn read_class(&self) -> Result<ClassNode, Error> {
        let class_file = self.class_file;
        if class_file.access_flags.contains(ClassAccessFlags::MODULE) {
            return Err(Error::Unsupported(String::from("module descriptor")));
        }

        let name = self.binary_name(class_file.this_class)?;
        let super_name = class_file
            .super_class
            .map(|index| self.binary_name(index))
            .transpose()?;
        let mut header =
            ClassHeader::new(class_file.version, class_file.access_flags, name, super_name);
        header.interfaces = class_file
            .interfaces
            .iter()
            .map(|interface| self.binary_name(*interface))
            .collect::<Result<_, Error>>()?;

        for attribute in &class_file.attributes {
            let attribute_name = self.attribute_name(attribute)?;
            match attribute_name {
                "Signature" => {
                    header.signature = Some(self.string(attribute.decode::<Signature>()?.0)?)
                }
                "SourceFile" => {
                    header.source_file = Some(self.string(attribute.decode::<SourceFile>()?.0)?)
                }
                "SourceDebugExtension" => {
                    header.source_debug_extension =
                        Some(attribute.decode::<SourceDebugExtension>()?.0)
                }
                "InnerClasses" => {
                    for inner in attribute.decode::<InnerClasses>()?.0 {
                        header.inner_classes.push(InnerClass {
                            inner_class: self.binary_name(inner.inner_class)?,
                            outer_class: inner
                                .outer_class
                                .map(|outer| self.binary_name(outer))
                                .transpose()?,
                            inner_name: inner
                                .inner_name
                                .map(|name| self.string(name))
                                .transpose()?,
                            access_flags: inner.access_flags,
                        });
                    }
                }
                "EnclosingMethod" => {
                    let enclosing = attribute.decode::<class_file::EnclosingMethod>()?;
                    let method = match enclosing.method {
                        Some(method) => {
                            let (name, descriptor) = self.name_and_type(method)?;
                            Some((parse_unqualified(name)?, parse_method_descriptor(descriptor)?))
                        }
                        None => None,
                    };
                    header.enclosing_method = Some(EnclosingMethod {
                        class: self.binary_name(enclosing.class)?,
                        method,
                    });
                }
                "NestHost" => {
                    header.nest_host = Some(self.binary_name(attribute.decode::<NestHost>()?.0)?)
                }
                "NestMembers" => {
                    header.nest_members = self.binary_names(&attribute.decode::<NestMembers>()?.0)?
                }
                "PermittedSubclasses" => {
                    header.permitted_subclasses =
                        self.binary_names(&attribute.decode::<PermittedSubclasses>()?.0)?
                }
                "Record" => {
                    let components = attribute
                        .decode::<Record>()?
                        .0
                        .iter()
                        .map(|component| self.read_record_component(component))
                        .collect::<Result<_, Error>>()?;
                    header.record_components = Some(components);
                }
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    self.read_annotations(attribute, attribute_name, &mut header.annotations)?
                }
                "Deprecated" => header.deprecated = true,
                "Synthetic" => header.synthetic = true,
                "BootstrapMethods" => (),
                "Module" | "ModulePackages" | "ModuleMainClass" => {
                    return Err(Error::Unsupported(format!("{} attribute", attribute_name)))
                }
                other => debug!("Dropping {} attribute of {}", other, header.name),
            }
        }

        let fields = class_file
            .fields
            .iter()
            .map(|field| self.read_field(field))
            .collect::<Result<_, Error>>()?;
        let methods = class_file
            .methods
            .iter()
            .map(|method| self.read_method(&header.name, method))
            .collect::<Result<_, Error>>()?;

        Ok(ClassNode {
            header,
            fields,
            methods,
        })
    }

    fn binary_names(&self, indices: &[ClassConstantIndex]) -> Result<Vec<BinaryName>, Error> {
        indices.iter().map(|index| self.binary_name(*index)).collect()
    }

    fn read_record_component(
        &self,
        component: &class_file::RecordComponent,
    ) -> Result<RecordComponent, Error> {
        let mut read = RecordComponent {
            name: parse_unqualified(self.utf8(component.name_index)?)?,
            descriptor: parse_field_type(self.utf8(component.descriptor_index)?)?,
            signature: None,
            annotations: Annotations::default(),
        };
        for attribute in &component.attributes {
            match self.attribute_name(attribute)? {
                "Signature" => {
                    read.signature = Some(self.string(attribute.decode::<Signature>()?.0)?)
                }
                name @ ("RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations") => {
                    self.read_annotations(attribute, name, &mut read.annotations)?
                }
                other => debug!("Dropping {} attribute of record component {}", other, read.name),
            }
        }
        Ok(read)
    }

    fn read_field(&self, field: &class_file::Field) -> Result<FieldNode, Error> {
        let mut read = FieldNode::new(
            field.access_flags,
            parse_unqualified(self.utf8(field.name_index)?)?,
            parse_field_type(self.utf8(field.descriptor_index)?)?,
        );
        for attribute in &field.attributes {
            let attribute_name = self.attribute_name(attribute)?;
            match attribute_name {
                "ConstantValue" => {
                    let index = attribute.decode::<RawConstantValue>()?.0;
                    read.constant_value = Some(self.constant_value(index)?);
                }
                "Signature" => {
                    read.signature = Some(self.string(attribute.decode::<Signature>()?.0)?)
                }
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    self.read_annotations(attribute, attribute_name, &mut read.annotations)?
                }
                "Deprecated" => read.deprecated = true,
                "Synthetic" => read.synthetic = true,
                other => debug!("Dropping {} attribute of field {}", other, read.name),
            }
        }
        Ok(read)
    }

    fn read_method(
        &self,
        class: &BinaryName,
        method: &class_file::Method,
    ) -> Result<MethodNode, Error> {
        let mut header = MethodHeader::new(
            method.access_flags,
            parse_unqualified(self.utf8(method.name_index)?)?,
            parse_method_descriptor(self.utf8(method.descriptor_index)?)?,
        );
        let description = format!(
            "{}.{}{}",
            class,
            header.name,
            self.utf8(method.descriptor_index)?
        );
        let mut code = None;

        for attribute in &method.attributes {
            let attribute_name = self.attribute_name(attribute)?;
            match attribute_name {
                "Code" => {
                    let raw = attribute.decode::<class_file::Code>()?;
                    code = Some(self.read_code(&raw, &description)?);
                }
                "Exceptions" => {
                    header.exceptions = self.binary_names(&attribute.decode::<Exceptions>()?.0)?
                }
                "Signature" => {
                    header.signature = Some(self.string(attribute.decode::<Signature>()?.0)?)
                }
                "RuntimeVisibleAnnotations" | "RuntimeInvisibleAnnotations" => {
                    self.read_annotations(attribute, attribute_name, &mut header.annotations)?
                }
                "RuntimeVisibleParameterAnnotations" => {
                    let parameters = attribute.decode::<RuntimeVisibleParameterAnnotations>()?;
                    header.parameter_annotations.visible =
                        Some(self.read_parameter_annotations(&(parameters.0).0)?);
                }
                "RuntimeInvisibleParameterAnnotations" => {
                    let parameters = attribute.decode::<RuntimeInvisibleParameterAnnotations>()?;
                    header.parameter_annotations.invisible =
                        Some(self.read_parameter_annotations(&(parameters.0).0)?);
                }
                "AnnotationDefault" => {
                    let default = attribute.decode::<AnnotationDefault>()?;
                    header.annotation_default = Some(self.read_element_value(&default.0)?);
                }
                "MethodParameters" => {
                    let parameters = attribute
                        .decode::<MethodParameters>()?
                        .0
                        .iter()
                        .map(|parameter| {
                            Ok(MethodParameter {
                                name: parameter.name.map(|name| self.string(name)).transpose()?,
                                access_flags: parameter.access_flags,
                            })
                        })
                        .collect::<Result<_, Error>>()?;
                    header.parameters = Some(parameters);
                }
                "Deprecated" => header.deprecated = true,
                "Synthetic" => header.synthetic = true,
                other => debug!("Dropping {} attribute of {}", other, description),
            }
        }

        Ok(MethodNode { header, code })
    }

    fn read_annotations(
        &self,
        attribute: &Attribute,
        attribute_name: &str,
        annotations: &mut Annotations,
    ) -> Result<(), Error> {
        if attribute_name == "RuntimeVisibleAnnotations" {
            for annotation in attribute.decode::<RuntimeVisibleAnnotations>()?.0 {
                annotations.visible.push(self.read_annotation(&annotation)?);
            }
        } else {
            for annotation in attribute.decode::<RuntimeInvisibleAnnotations>()?.0 {
                annotations.invisible.push(self.read_annotation(&annotation)?);
            }
        }
        Ok(())
    }

    fn read_parameter_annotations(
        &self,
        parameters: &[Vec<class_file::Annotation>],
    ) -> Result<Vec<Vec<Annotation>>, Error> {
        parameters
            .iter()
            .map(|annotations| {
                annotations
                    .iter()
                    .map(|annotation| self.read_annotation(annotation))
                    .collect()
            })
            .collect()
    }

    fn read_annotation(&self, annotation: &class_file::Annotation) -> Result<Annotation, Error> {
        Ok(Annotation {
            type_descriptor: self.string(annotation.type_index)?,
            elements: annotation
                .element_value_pairs
                .iter()
                .map(|(name, value)| Ok((self.string(*name)?, self.read_element_value(value)?)))
                .collect::<Result<_, Error>>()?,
        })
    }

    fn read_element_value(&self, value: &class_file::ElementValue) -> Result<ElementValue, Error> {
        Ok(match value {
            class_file::ElementValue::Const { tag: b's', value } => ElementValue::Const(
                b's',
                ConstantValue::String(self.string(Utf8ConstantIndex(*value))?),
            ),
            class_file::ElementValue::Const { tag, value } => {
                ElementValue::Const(*tag, self.constant_value(*value)?)
            }
            class_file::ElementValue::Enum {
                type_name,
                const_name,
            } => ElementValue::Enum {
                type_descriptor: self.string(*type_name)?,
                constant_name: self.string(*const_name)?,
            },
            class_file::ElementValue::Class(descriptor) => {
                ElementValue::Class(self.string(*descriptor)?)
            }
            class_file::ElementValue::Annotation(annotation) => {
                ElementValue::Annotation(self.read_annotation(annotation)?)
            }
            class_file::ElementValue::Array(values) => ElementValue::Array(
                values
                    .iter()
                    .map(|value| self.read_element_value(value))
                    .collect::<Result<_, Error>>()?,
            ),
        })
    }

    fn read_code(&self, raw: &class_file::Code, method: &str) -> Result<Code, Error> {
        let code_array = &raw.code_array.0;
        let code_len = code_array.len();
        let decoded = decode_code_array(code_array)?;

        let mut line_numbers: HashMap<usize, Vec<u16>> = HashMap::new();
        let mut locals = vec![];
        let mut local_types = vec![];
        for attribute in &raw.attributes {
            match self.attribute_name(attribute)? {
                "LineNumberTable" => {
                    for line in attribute.decode::<LineNumberTable>()?.0 {
                        line_numbers
                            .entry(line.start_pc.0 as usize)
                            .or_default()
                            .push(line.line_number);
                    }
                }
                "LocalVariableTable" => locals.extend(attribute.decode::<LocalVariableTable>()?.0),
                "LocalVariableTypeTable" => {
                    local_types.extend(attribute.decode::<LocalVariableTypeTable>()?.0)
                }
                "StackMapTable" => (),
                other => debug!("Dropping {} attribute of {}", other, method),
            }
        }

        // Every offset that needs a label, whether it is a branch target or a range boundary
        let mut boundaries = vec![false; code_len + 1];
        for (offset, _) in &decoded {
            boundaries[*offset] = true;
        }
        boundaries[code_len] = true;
        let mut needed = BTreeSet::new();
        let mut need = |offset: usize, what: &str| -> Result<(), Error> {
            if offset > code_len || !boundaries[offset] {
                return Err(Error::Malformed(format!(
                    "{} at offset {} of {} is not an instruction boundary",
                    what, offset, method
                )));
            }
            needed.insert(offset);
            Ok(())
        };
        for (_, instruction) in &decoded {
            if let DecodedInstruction::Branch(branch) = instruction {
                for target in branch.jump_targets() {
                    need(*target, "jump target")?;
                }
            }
        }
        for handler in &raw.exception_table {
            need(handler.start_pc.0 as usize, "exception range start")?;
            need(handler.end_pc.0 as usize, "exception range end")?;
            need(handler.handler_pc.0 as usize, "exception handler")?;
        }
        for local in &locals {
            need(local.start_pc.0 as usize, "local variable start")?;
            need(
                local.start_pc.0 as usize + local.length as usize,
                "local variable end",
            )?;
        }
        for local in &local_types {
            need(local.start_pc.0 as usize, "local variable start")?;
            need(
                local.start_pc.0 as usize + local.length as usize,
                "local variable end",
            )?;
        }

        // Labels are handed out in offset order
        let mut generator = SynLabelGenerator::default();
        let needed: BTreeMap<usize, SynLabel> = needed
            .into_iter()
            .map(|offset| (offset, generator.fresh_label()))
            .collect();
        let label_at = |offset: usize| -> Result<SynLabel, Error> {
            needed.get(&offset).copied().ok_or_else(|| {
                Error::Malformed(format!("no label at offset {} of {}", offset, method))
            })
        };

        let mut elements = Vec::with_capacity(decoded.len() * 2);
        for (offset, instruction) in &decoded {
            if let Some(label) = needed.get(offset) {
                elements.push(CodeElement::Label(*label));
            }
            if let Some(lines) = line_numbers.get(offset) {
                elements.extend(lines.iter().map(|line| CodeElement::LineNumber(*line)));
            }
            elements.push(match instruction {
                DecodedInstruction::Instruction(instruction) => {
                    CodeElement::Instruction(self.read_instruction(instruction)?)
                }
                DecodedInstruction::Branch(branch) => {
                    CodeElement::Branch(branch.map_labels(|target| label_at(*target))?)
                }
            });
        }
        if let Some(label) = needed.get(&code_len) {
            elements.push(CodeElement::Label(*label));
        }

        let try_catch_blocks = raw
            .exception_table
            .iter()
            .map(|handler| {
                Ok(TryCatchBlock {
                    start: label_at(handler.start_pc.0 as usize)?,
                    end: label_at(handler.end_pc.0 as usize)?,
                    handler: label_at(handler.handler_pc.0 as usize)?,
                    catch_type: handler
                        .catch_type
                        .map(|catch_type| self.binary_name(catch_type))
                        .transpose()?,
                })
            })
            .collect::<Result<_, Error>>()?;

        let mut local_variables = Vec::with_capacity(locals.len());
        for local in &locals {
            let name = self.string(local.name_index)?;
            let signature = local_types
                .iter()
                .find(|typed| {
                    typed.start_pc == local.start_pc
                        && typed.length == local.length
                        && typed.index == local.index
                        && typed.name_index == local.name_index
                })
                .map(|typed| self.string(typed.descriptor_index))
                .transpose()?;
            local_variables.push(LocalVariable {
                name,
                descriptor: parse_field_type(self.utf8(local.descriptor_index)?)?,
                signature,
                start: label_at(local.start_pc.0 as usize)?,
                end: label_at(local.start_pc.0 as usize + local.length as usize)?,
                index: local.index,
            });
        }

        Ok(Code {
            elements,
            try_catch_blocks,
            local_variables,
        })
    }

    fn read_instruction(
        &self,
        instruction: &SerializableInstruction,
    ) -> Result<CodeInstruction, Error> {
        instruction.map(
            |class| self.ref_type(*class),
            |constant| self.constant_value(*constant),
            |field| self.field_ref(*field),
            |method| self.method_ref(*method),
            |indy| self.invoke_dynamic(*indy),
        )
    }
}

fn unexpected(expected: &str, index: ConstantIndex, found: &Constant) -> Error {
    Error::Malformed(format!(
        "expected {} constant at index {}, found {:?}",
        expected, index.0, found
    ))
}
