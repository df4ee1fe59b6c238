//! Serialize the structural model back into class file bytes
//!
//! [`ClassWriter`] is the sink at the end of every visitor chain. Every method body goes through
//! the same steps:
//!
//!   1. frames are inferred for every reachable instruction (see [`analyze_method`]), which also
//!      gives the maximum stack and locals
//!   2. unreachable instructions are dropped and the remaining ones are laid out, widening jumps
//!      as needed (see [`layout_code`])
//!   3. exception ranges, line numbers, and local variables are mapped to the final offsets,
//!      skipping the ones which became empty
//!   4. a stack map frame is emitted at every jump target, exception handler, and the instruction
//!      after every widened conditional jump
//!
//! The only place the class hierarchy matters is merging two object types in step 1. That
//! question is answered by the [`CommonAncestorResolver`] over the writer's locator, without ever
//! loading a class.

use crate::jvm::class_file::{
    self, Attribute, AttributeLike, BootstrapMethods, BytecodeArray, BytecodeIndex, ClassFile,
    ConstantsPool, ConstantsWriter, ExceptionHandler, LineNumber, LineNumberTable,
    LocalVariableTable, LocalVariableTypeTable, Serialize, StackMapFrame, StackMapTable,
};
use crate::jvm::class_graph::{ClassDescriptor, CommonAncestorResolver, DescriptorLocator};
use crate::jvm::code::{layout_code, CodeLayout, LayoutElement, SynLabel};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{
    ClassHeader, ClassNode, Code, CodeElement, FieldNode, MethodHeader, MethodNode,
};
use crate::jvm::reader::ClassReader;
use crate::jvm::verifier::{
    analyze_method, AnalysisFrame, FrameAnalysis, SerializableFrame, SuperClassResolver,
};
use crate::jvm::visitor::{ClassCollector, ClassVisitor};
use crate::jvm::{BinaryName, Error, Name, VerifierErrorKind};
use log::debug;
use std::collections::BTreeMap;

/// Visitor sink producing class file bytes
pub struct ClassWriter<'r> {
    locator: &'r dyn DescriptorLocator,

    /// Class the stream was read from, along with its bytes
    source: Option<(&'r ClassNode, &'r [u8])>,
    collector: ClassCollector,
    bytes: Option<Vec<u8>>,
}

impl<'r> ClassWriter<'r> {
    pub fn new(locator: &'r dyn DescriptorLocator) -> ClassWriter<'r> {
        ClassWriter {
            locator,
            source: None,
            collector: ClassCollector::new(),
            bytes: None,
        }
    }

    /// Writer which returns the source bytes verbatim if the class reaches it unchanged
    pub fn with_source<'b: 'r>(
        source: &'r ClassReader<'b>,
        locator: &'r dyn DescriptorLocator,
    ) -> ClassWriter<'r> {
        ClassWriter {
            source: Some((source.node(), source.bytes())),
            ..ClassWriter::new(locator)
        }
    }

    /// Bytes of the class (only available after [`ClassVisitor::visit_end`])
    pub fn into_bytes(self) -> Result<Vec<u8>, Error> {
        self.bytes
            .ok_or_else(|| Error::Malformed(String::from("class stream was never ended")))
    }
}

impl<'r> ClassVisitor for ClassWriter<'r> {
    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        self.collector.visit_header(header)
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        self.collector.visit_field(field)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        self.collector.visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        let node = std::mem::take(&mut self.collector).into_node()?;
        let bytes = match self.source {
            Some((source, bytes)) if *source == node => {
                debug!("{} is unchanged, reusing its bytes", node.header.name);
                bytes.to_vec()
            }
            _ => write_class(&node, self.locator)?,
        };
        self.bytes = Some(bytes);
        Ok(())
    }
}

/// Serialize a class, computing frames and maximums for every method body
pub fn write_class(class: &ClassNode, locator: &dyn DescriptorLocator) -> Result<Vec<u8>, Error> {
    let header = &class.header;
    let resolver = WriterResolver { header, locator };
    let mut constants = ConstantsPool::new();

    let this_class = header.name.constant_index(&mut constants)?;
    let super_class = match &header.super_name {
        Some(super_name) => Some(super_name.constant_index(&mut constants)?),
        None => None,
    };
    let interfaces = header
        .interfaces
        .iter()
        .map(|interface| Ok(interface.constant_index(&mut constants)?))
        .collect::<Result<Vec<_>, Error>>()?;
    let fields = class
        .fields
        .iter()
        .map(|field| field.serialize_field(&mut constants))
        .collect::<Result<Vec<_>, Error>>()?;
    let methods = class
        .methods
        .iter()
        .map(|method| write_method(header, method, &mut constants, &resolver))
        .collect::<Result<Vec<_>, Error>>()?;
    let mut attributes = header.serialize_attributes(&mut constants)?;

    // Bootstrap methods are only known once every constant is in
    let bootstrap_name = if constants.has_bootstrap_methods() {
        Some(constants.get_utf8(BootstrapMethods::NAME)?)
    } else {
        None
    };
    let (constants, bootstrap_methods) = constants.into_parts();
    if let Some(name_index) = bootstrap_name {
        let mut info = vec![];
        BootstrapMethods(bootstrap_methods).serialize(&mut info)?;
        attributes.push(Attribute { name_index, info });
    }

    let class_file = ClassFile {
        version: header.version,
        constants,
        access_flags: header.access_flags,
        this_class,
        super_class,
        interfaces,
        fields,
        methods,
        attributes,
    };
    class_file.to_bytes()
}

fn write_method(
    class: &ClassHeader,
    method: &MethodNode,
    constants: &mut ConstantsPool,
    resolver: &WriterResolver,
) -> Result<class_file::Method, Error> {
    let name_index = constants.get_utf8(method.header.name.as_str())?;
    let descriptor_index = constants.get_utf8(method.header.descriptor.render())?;
    let mut attributes = vec![];
    if let Some(code) = &method.code {
        let code = write_code(class, &method.header, code, constants, resolver)?;
        attributes.push(constants.get_attribute(code)?);
    }
    attributes.extend(method.header.serialize_attributes(constants)?);
    Ok(class_file::Method {
        access_flags: method.header.access_flags,
        name_index,
        descriptor_index,
        attributes,
    })
}

fn write_code(
    class: &ClassHeader,
    header: &MethodHeader,
    code: &Code,
    constants: &mut ConstantsPool,
    resolver: &WriterResolver,
) -> Result<class_file::Code, Error> {
    let method = format!(
        "{}.{}{}",
        class.name,
        header.name,
        header.descriptor.render()
    );
    let analysis = analyze_method(&class.name, header, code, resolver)?;

    // Only reachable instructions make it into the layout
    let mut layout_elements = Vec::with_capacity(code.elements.len());
    let mut layout_index = vec![None; code.elements.len()];
    let mut element_index = Vec::with_capacity(code.elements.len());
    let mut pending_lines = vec![];
    let mut lines = vec![];
    let mut dropped = 0;
    for (index, element) in code.elements.iter().enumerate() {
        let layout_element = match element {
            CodeElement::Label(label) => LayoutElement::Label(*label),
            CodeElement::LineNumber(line) => {
                pending_lines.push(*line);
                continue;
            }
            CodeElement::Instruction(_) | CodeElement::Branch(_) if !analysis.is_live(index) => {
                pending_lines.clear();
                dropped += 1;
                continue;
            }
            CodeElement::Instruction(instruction) => {
                LayoutElement::Instruction(instruction.map_with(
                    constants,
                    |pool, class| class.constant_index(pool),
                    |pool, constant| constant.constant_index(pool),
                    |pool, field| field.constant_index(pool),
                    |pool, method| method.constant_index(pool),
                    |pool, indy| indy.constant_index(pool),
                )?)
            }
            CodeElement::Branch(branch) => LayoutElement::Branch(branch.clone()),
        };
        if !matches!(layout_element, LayoutElement::Label(_)) {
            lines.extend(
                pending_lines
                    .drain(..)
                    .map(|line| (layout_elements.len(), line)),
            );
        }
        layout_index[index] = Some(layout_elements.len());
        element_index.push(index);
        layout_elements.push(layout_element);
    }
    if dropped > 0 {
        debug!("Dropping {} unreachable instructions from {}", dropped, method);
    }

    let layout = layout_code(&layout_elements, &method)?;
    let offset_of = |label: &SynLabel| -> Result<usize, Error> {
        layout
            .label_offsets
            .get(label)
            .copied()
            .ok_or_else(|| Error::VerifierError {
                method: method.clone(),
                instruction: 0,
                kind: VerifierErrorKind::UnplacedLabel(*label),
            })
    };

    let mut exception_table = vec![];
    let mut handler_labels = vec![];
    for block in &code.try_catch_blocks {
        let start = offset_of(&block.start)?;
        let end = offset_of(&block.end)?;
        if start >= end {
            continue;
        }
        exception_table.push(ExceptionHandler {
            start_pc: BytecodeIndex(start as u16),
            end_pc: BytecodeIndex(end as u16),
            handler_pc: BytecodeIndex(offset_of(&block.handler)? as u16),
            catch_type: match &block.catch_type {
                Some(catch_type) => Some(catch_type.constant_index(constants)?),
                None => None,
            },
        });
        handler_labels.push(block.handler);
    }

    let mut attributes = vec![];

    if !lines.is_empty() {
        let line_numbers = lines
            .iter()
            .map(|(layout_index, line)| LineNumber {
                start_pc: BytecodeIndex(layout.offsets[*layout_index] as u16),
                line_number: *line,
            })
            .collect();
        attributes.push(constants.get_attribute(LineNumberTable(line_numbers))?);
    }

    let mut local_variables = vec![];
    let mut local_variable_types = vec![];
    for local in &code.local_variables {
        let start = offset_of(&local.start)?;
        let end = offset_of(&local.end)?;
        if start >= end {
            continue;
        }
        let name_index = constants.get_utf8(local.name.as_str())?;
        let entry = class_file::LocalVariable {
            start_pc: BytecodeIndex(start as u16),
            length: (end - start) as u16,
            name_index,
            descriptor_index: constants.get_utf8(local.descriptor.render())?,
            index: local.index,
        };
        local_variables.push(entry);
        if let Some(signature) = &local.signature {
            local_variable_types.push(class_file::LocalVariable {
                descriptor_index: constants.get_utf8(signature.as_str())?,
                ..entry
            });
        }
    }
    if !local_variables.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTable(local_variables))?);
    }
    if !local_variable_types.is_empty() {
        attributes.push(constants.get_attribute(LocalVariableTypeTable(local_variable_types))?);
    }

    if class.version.requires_stack_map_frames() {
        let frames = FrameTable {
            code,
            analysis: &analysis,
            layout: &layout,
            layout_index: &layout_index,
            element_index: &element_index,
        }
        .stack_map_frames(class, header, &handler_labels, constants)?;
        if !frames.is_empty() {
            attributes.push(constants.get_attribute(StackMapTable(frames))?);
        }
    }

    Ok(class_file::Code {
        max_stack: analysis.max_stack,
        max_locals: analysis.max_locals,
        code_array: BytecodeArray(layout.code),
        exception_table,
        attributes,
    })
}

/// Everything needed to decide where frames go and what they contain
struct FrameTable<'a> {
    code: &'a Code,
    analysis: &'a FrameAnalysis,
    layout: &'a CodeLayout,

    /// Code element index to layout index (`None` for dropped elements)
    layout_index: &'a [Option<usize>],

    /// Layout index to code element index
    element_index: &'a [usize],
}

impl<'a> FrameTable<'a> {
    fn stack_map_frames(
        &self,
        class: &ClassHeader,
        header: &MethodHeader,
        handler_labels: &[SynLabel],
        constants: &mut ConstantsPool,
    ) -> Result<Vec<StackMapFrame>, Error> {
        let elements = &self.code.elements;

        // For every label, the first instruction at or after it
        let mut label_targets = std::collections::HashMap::new();
        let mut next_instruction = None;
        for index in (0..elements.len()).rev() {
            match &elements[index] {
                CodeElement::Instruction(_) | CodeElement::Branch(_) => {
                    next_instruction = Some(index)
                }
                CodeElement::Label(label) => {
                    if let Some(target) = next_instruction {
                        label_targets.insert(*label, target);
                    }
                }
                CodeElement::LineNumber(_) => (),
            }
        }

        // Offset to the code element whose frame is needed there
        let mut targets: BTreeMap<usize, usize> = BTreeMap::new();
        let mut add_label_target = |label: &SynLabel, targets: &mut BTreeMap<usize, usize>| {
            if let Some(element) = label_targets.get(label) {
                if let Some(offset) = self.offset_of_element(*element) {
                    targets.insert(offset, *element);
                }
            }
        };
        for (index, element) in elements.iter().enumerate() {
            if let CodeElement::Branch(branch) = element {
                if self.analysis.is_live(index) {
                    for label in branch.jump_targets() {
                        add_label_target(label, &mut targets);
                    }
                }
            }
        }
        for label in handler_labels {
            add_label_target(label, &mut targets);
        }
        for widened in &self.layout.widened {
            let fall_through = self.element_index[widened + 1..]
                .iter()
                .find(|element| {
                    matches!(
                        elements[**element],
                        CodeElement::Instruction(_) | CodeElement::Branch(_)
                    )
                })
                .copied();
            if let Some(element) = fall_through {
                if let Some(offset) = self.offset_of_element(element) {
                    targets.insert(offset, element);
                }
            }
        }

        let entry = AnalysisFrame::method_entry(
            &class.name,
            header.is_static(),
            &header.name,
            &header.descriptor.parameters,
        );
        let mut previous = self.serializable_frame(&entry, constants)?;
        let mut previous_offset = None;
        let mut frames = Vec::with_capacity(targets.len());
        for (offset, element) in targets {
            let frame = match &self.analysis.frames[element] {
                Some(frame) => self.serializable_frame(frame, constants)?,
                None => continue,
            };
            let offset_delta = match previous_offset {
                None => offset,
                Some(previous_offset) => offset - previous_offset - 1,
            } as u16;
            frames.push(frame.stack_map_frame(offset_delta, &previous));
            previous = frame;
            previous_offset = Some(offset);
        }
        Ok(frames)
    }

    fn offset_of_element(&self, element: usize) -> Option<usize> {
        self.layout_index[element].map(|index| self.layout.offsets[index])
    }

    fn serializable_frame(
        &self,
        frame: &AnalysisFrame,
        constants: &mut ConstantsPool,
    ) -> Result<SerializableFrame, Error> {
        let mut convert = |vtype: &crate::jvm::verifier::AnalysisType| {
            vtype.try_map(
                |class| Ok(class.constant_index(constants)?),
                |uninitialized| {
                    self.offset_of_element(uninitialized.created_at)
                        .map(|offset| offset as u16)
                        .ok_or_else(|| {
                            Error::Malformed(format!(
                                "uninitialized object from unreachable instruction {}",
                                uninitialized.created_at
                            ))
                        })
                },
            )
        };
        let locals = frame
            .locals
            .iter()
            .map(&mut convert)
            .collect::<Result<Vec<_>, Error>>()?;
        let stack = frame
            .stack
            .iter()
            .map(&mut convert)
            .collect::<Result<Vec<_>, Error>>()?;
        Ok(SerializableFrame { locals, stack })
    }
}

/// Hierarchy queries made while writing one class
///
/// The class being written is answered from its own header, since it usually is not known to
/// the locator yet (or is known with a different shape, before transformation).
struct WriterResolver<'a> {
    header: &'a ClassHeader,
    locator: &'a dyn DescriptorLocator,
}

impl<'a> DescriptorLocator for WriterResolver<'a> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        if *name == self.header.name {
            Ok(ClassDescriptor::from_header(self.header))
        } else {
            self.locator.locate(name)
        }
    }
}

impl<'a> SuperClassResolver for WriterResolver<'a> {
    fn common_super_class(
        &self,
        first: &BinaryName,
        second: &BinaryName,
    ) -> Result<BinaryName, Error> {
        if *first == BinaryName::OBJECT || *second == BinaryName::OBJECT {
            return Ok(BinaryName::OBJECT);
        }
        CommonAncestorResolver::new(self).common_super_class(first, second)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{Constant, Version};
    use crate::jvm::class_graph::ObjectLocator;
    use crate::jvm::code::{
        BranchInstruction, Instruction, LabelGenerator, OrdComparison, SynLabelGenerator,
    };
    use crate::jvm::model::TryCatchBlock;
    use crate::jvm::{
        ClassAccessFlags, FieldType, MethodAccessFlags, MethodDescriptor, UnqualifiedName,
    };

    fn class_with(method: MethodNode, version: Version) -> ClassNode {
        let header = ClassHeader::new(
            version,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            BinaryName::from_str("a/Counter").unwrap(),
            Some(BinaryName::OBJECT),
        );
        let mut class = ClassNode::new(header);
        class.methods.push(method);
        class
    }

    /// `static int count(int n) { int i = 0; while (i < n) i++; return i; }`
    fn counting_method() -> MethodNode {
        let mut labels = SynLabelGenerator::default();
        let check = labels.fresh_label();
        let done = labels.fresh_label();
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("count").unwrap(),
            MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::int()),
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::LineNumber(3),
                CodeElement::Instruction(Instruction::IConst0),
                CodeElement::Instruction(Instruction::IStore(1)),
                CodeElement::Label(check),
                CodeElement::Instruction(Instruction::ILoad(1)),
                CodeElement::Instruction(Instruction::ILoad(0)),
                CodeElement::Branch(BranchInstruction::IfICmp(OrdComparison::GE, done)),
                CodeElement::Instruction(Instruction::IInc(1, 1)),
                CodeElement::Branch(BranchInstruction::Goto(check)),
                CodeElement::Label(done),
                CodeElement::Instruction(Instruction::ILoad(1)),
                CodeElement::Branch(BranchInstruction::IReturn),
            ],
            ..Code::default()
        });
        method
    }

    fn code_attribute(bytes: &[u8]) -> (ClassFile, class_file::Code) {
        let class_file = ClassFile::parse(bytes).unwrap();
        let code = class_file.methods[0]
            .attributes
            .iter()
            .find(|attribute| class_file.attribute_name(attribute).unwrap() == "Code")
            .unwrap()
            .decode::<class_file::Code>()
            .unwrap();
        (class_file, code)
    }

    fn attribute_names(class_file: &ClassFile, attributes: &[Attribute]) -> Vec<String> {
        attributes
            .iter()
            .map(|attribute| class_file.attribute_name(attribute).unwrap().to_owned())
            .collect()
    }

    #[test]
    fn invokedynamic_keeps_its_bootstrap_method() {
        use crate::jvm::class_file::HandleKind;
        use crate::jvm::model::{
            BootstrapMethod, ConstantValue, Handle, InvokeDynamic, MemberRef, MethodRef,
        };

        let object = |name: &str| FieldType::object(BinaryName::from_str(name).unwrap());
        let string = || FieldType::object(BinaryName::STRING);
        let factory = MethodRef::new(
            BinaryName::from_str("java/lang/invoke/StringConcatFactory").unwrap(),
            UnqualifiedName::from_str("makeConcatWithConstants").unwrap(),
            MethodDescriptor {
                parameters: vec![
                    object("java/lang/invoke/MethodHandles$Lookup"),
                    string(),
                    object("java/lang/invoke/MethodType"),
                    string(),
                ],
                return_type: Some(object("java/lang/invoke/CallSite")),
            },
        );
        let concat = CodeElement::Instruction(Instruction::InvokeDynamic(InvokeDynamic {
            name: UnqualifiedName::from_str("makeConcatWithConstants").unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: Some(string()),
            },
            bootstrap: BootstrapMethod {
                handle: Handle {
                    kind: HandleKind::InvokeStatic,
                    member: MemberRef::Method(factory),
                },
                arguments: vec![ConstantValue::String(String::from("answer"))],
            },
        }));
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("describe").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(string()),
            },
        ));
        method.code = Some(Code {
            elements: vec![concat.clone(), CodeElement::Branch(BranchInstruction::AReturn)],
            ..Code::default()
        });

        let bytes = write_class(&class_with(method, Version::JAVA11), &ObjectLocator).unwrap();
        let class_file = ClassFile::parse(&bytes).unwrap();
        assert!(attribute_names(&class_file, &class_file.attributes)
            .contains(&String::from("BootstrapMethods")));
        let reread = ClassReader::new(&bytes).unwrap();
        let code = reread.node().methods[0].code.as_ref().unwrap();
        assert_eq!(code.elements[0], concat);
    }

    #[test]
    fn loops_get_frames_and_maximums() {
        let class = class_with(counting_method(), Version::JAVA8);
        let bytes = write_class(&class, &ObjectLocator).unwrap();
        let (class_file, code) = code_attribute(&bytes);

        assert_eq!(code.max_stack, 2);
        assert_eq!(code.max_locals, 2);
        assert_eq!(
            attribute_names(&class_file, &code.attributes),
            vec!["LineNumberTable", "StackMapTable"]
        );

        // Frames at the loop head and at the exit
        let frames = code
            .attributes
            .iter()
            .find(|attribute| class_file.attribute_name(attribute).unwrap() == "StackMapTable")
            .unwrap();
        assert_eq!(u16::from_be_bytes([frames.info[0], frames.info[1]]), 2);
    }

    #[test]
    fn old_versions_have_no_frames() {
        let class = class_with(counting_method(), Version::JAVA5);
        let bytes = write_class(&class, &ObjectLocator).unwrap();
        let (class_file, code) = code_attribute(&bytes);
        assert_eq!(
            attribute_names(&class_file, &code.attributes),
            vec!["LineNumberTable"]
        );
    }

    #[test]
    fn read_what_was_written() {
        let class = class_with(counting_method(), Version::JAVA8);
        let bytes = write_class(&class, &ObjectLocator).unwrap();
        let reader = ClassReader::new(&bytes).unwrap();
        let read = reader.read_node();
        assert_eq!(read.header, class.header);
        let code = read.methods[0].code.as_ref().unwrap();
        assert_eq!(code.instruction_count(), 9);
        assert_eq!(code.elements[0], CodeElement::LineNumber(3));

        // Writing the read class again gives the same bytes
        assert_eq!(write_class(&read, &ObjectLocator).unwrap(), bytes);
    }

    #[test]
    fn unchanged_classes_reuse_source_bytes() {
        let class = class_with(counting_method(), Version::JAVA8);
        let written = write_class(&class, &ObjectLocator).unwrap();

        // Pad the constant pool with an unused entry, which a fresh write would not produce
        let mut class_file = ClassFile::parse(&written).unwrap();
        class_file.constants.push(Constant::Utf8(String::from("padding")));
        let bytes = class_file.to_bytes().unwrap();
        let rewritten = ClassReader::new(&bytes).unwrap().read_node();
        assert_ne!(write_class(&rewritten, &ObjectLocator).unwrap(), bytes);

        let reader = ClassReader::new(&bytes).unwrap();
        let mut writer = ClassWriter::with_source(&reader, &ObjectLocator);
        reader.accept(&mut writer).unwrap();
        assert_eq!(writer.into_bytes().unwrap(), bytes);
    }

    #[test]
    fn dead_code_and_empty_ranges_are_dropped() {
        let mut labels = SynLabelGenerator::default();
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let handler = labels.fresh_label();
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("dead").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Branch(BranchInstruction::Return),
                CodeElement::Label(start),
                CodeElement::Instruction(Instruction::Nop),
                CodeElement::Label(end),
                CodeElement::Branch(BranchInstruction::Return),
                CodeElement::Label(handler),
                CodeElement::Branch(BranchInstruction::AThrow),
            ],
            try_catch_blocks: vec![TryCatchBlock {
                start,
                end,
                handler,
                catch_type: None,
            }],
            local_variables: vec![],
        });
        let class = class_with(method, Version::JAVA8);
        let bytes = write_class(&class, &ObjectLocator).unwrap();
        let (_, code) = code_attribute(&bytes);
        assert_eq!(code.code_array.0, vec![0xb1]);
        assert!(code.exception_table.is_empty());
        assert!(code.attributes.is_empty());
    }

    #[test]
    fn constructors_track_uninitialized_this() {
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
                CodeElement::Instruction(Instruction::Invoke(
                    crate::jvm::code::InvokeType::Special,
                    crate::jvm::model::MethodRef::new(
                        BinaryName::OBJECT,
                        UnqualifiedName::INIT,
                        MethodDescriptor {
                            parameters: vec![],
                            return_type: None,
                        },
                    ),
                )),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        });
        let class = class_with(method, Version::JAVA8);
        let bytes = write_class(&class, &ObjectLocator).unwrap();
        let (class_file, code) = code_attribute(&bytes);
        assert_eq!(code.max_locals, 1);
        assert_eq!(code.max_stack, 1);
        assert!(class_file
            .constants
            .iter()
            .any(|(_, _, constant)| matches!(constant, Constant::Utf8(s) if s == "<init>")));
    }
}
