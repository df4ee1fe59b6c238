use crate::jvm::class_file::Version;
use crate::jvm::code::{BranchInstruction, LabelGenerator, SynLabel, SynLabelGenerator};
use crate::jvm::model::{
    ClassHeader, ClassNode, Code, CodeElement, CodeInstruction, FieldNode, MethodHeader,
    MethodNode, TryCatchBlock,
};
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, FieldAccessFlags, FieldType, MethodAccessFlags,
    MethodDescriptor, UnqualifiedName,
};
use std::collections::HashSet;

/// Incrementally build a class from scratch
///
/// Frames and maximums are never specified: the class writer computes them.
pub struct ClassBuilder {
    header: ClassHeader,
    fields: Vec<FieldNode>,
    methods: Vec<MethodNode>,
}

impl ClassBuilder {
    /// Create a new class builder
    pub fn new(
        access_flags: ClassAccessFlags,
        this_class: BinaryName,
        super_class: BinaryName,
        interfaces: Vec<BinaryName>,
    ) -> ClassBuilder {
        let mut header = ClassHeader::new(
            Version::JAVA8,
            access_flags,
            this_class,
            Some(super_class),
        );
        header.interfaces = interfaces;
        ClassBuilder {
            header,
            fields: vec![],
            methods: vec![],
        }
    }

    /// Change the class file version (defaults to Java 8)
    pub fn set_version(&mut self, version: Version) {
        self.header.version = version;
    }

    /// Header being built, for setting attributes
    pub fn header_mut(&mut self) -> &mut ClassHeader {
        &mut self.header
    }

    pub fn class_name(&self) -> &BinaryName {
        &self.header.name
    }

    /// Add a field to the class
    pub fn add_field(
        &mut self,
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    ) -> &mut FieldNode {
        self.fields.push(FieldNode::new(access_flags, name, descriptor));
        let last = self.fields.len() - 1;
        &mut self.fields[last]
    }

    /// Add a method with an already built body (or no body at all)
    pub fn add_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
        code: Option<Code>,
    ) {
        let mut method = MethodNode::new(MethodHeader::new(access_flags, name, descriptor));
        method.code = code;
        self.methods.push(method);
    }

    /// Start building a method body, which is added to the class on [`MethodBuilder::finish`]
    pub fn start_method(
        &mut self,
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodBuilder<'_> {
        MethodBuilder {
            header: MethodHeader::new(access_flags, name, descriptor),
            code: CodeBuilder::new(),
            methods: &mut self.methods,
        }
    }

    /// Consume the builder and return the class
    pub fn result(self) -> ClassNode {
        ClassNode {
            header: self.header,
            fields: self.fields,
            methods: self.methods,
        }
    }
}

pub struct MethodBuilder<'a> {
    header: MethodHeader,

    /// Code builder
    pub code: CodeBuilder,

    /// Where to ultimately push the result
    methods: &'a mut Vec<MethodNode>,
}

impl<'a> MethodBuilder<'a> {
    pub fn header_mut(&mut self) -> &mut MethodHeader {
        &mut self.header
    }

    pub fn finish(self) -> Result<(), Error> {
        let code = self.code.result()?;
        self.methods.push(MethodNode {
            header: self.header,
            code: Some(code),
        });
        Ok(())
    }
}

/// Builds the body of one method
///
/// Unlike hand-assembling [`Code`], this checks that labels are placed exactly once.
#[derive(Default)]
pub struct CodeBuilder {
    labels: SynLabelGenerator,
    code: Code,
    placed: HashSet<SynLabel>,
    used: Vec<SynLabel>,
}

impl CodeBuilder {
    pub fn new() -> CodeBuilder {
        CodeBuilder::default()
    }

    /// Generate a fresh label
    pub fn fresh_label(&mut self) -> SynLabel {
        self.labels.fresh_label()
    }

    /// Mark the position of a label (can only be done once per label)
    pub fn place_label(&mut self, label: SynLabel) -> Result<(), Error> {
        if !self.placed.insert(label) {
            return Err(Error::Malformed(format!("label {:?} placed twice", label)));
        }
        self.code.elements.push(CodeElement::Label(label));
        Ok(())
    }

    pub fn push_instruction(&mut self, insn: CodeInstruction) {
        self.code.elements.push(CodeElement::Instruction(insn));
    }

    pub fn push_branch_instruction(&mut self, insn: BranchInstruction<SynLabel>) {
        self.used.extend(insn.jump_targets().into_iter().copied());
        self.code.elements.push(CodeElement::Branch(insn));
    }

    /// Attribute the next instruction to a source line
    pub fn push_line_number(&mut self, line: u16) {
        self.code.elements.push(CodeElement::LineNumber(line));
    }

    /// Handle exceptions of some type (all of them for `None`) thrown between two labels
    pub fn add_try_catch(
        &mut self,
        start: SynLabel,
        end: SynLabel,
        handler: SynLabel,
        catch_type: Option<BinaryName>,
    ) {
        self.used.extend([start, end, handler]);
        self.code.try_catch_blocks.push(TryCatchBlock {
            start,
            end,
            handler,
            catch_type,
        });
    }

    /// Finished body, provided every label used has been placed
    pub fn result(self) -> Result<Code, Error> {
        if let Some(label) = self.used.iter().find(|label| !self.placed.contains(*label)) {
            return Err(Error::Malformed(format!("label {:?} is never placed", label)));
        }
        Ok(self.code)
    }
}
