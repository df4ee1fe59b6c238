use crate::jvm::class_file::{
    self, AnnotationDefault, Attribute, ConstantsPool, ConstantsWriter, Deprecated, Exceptions,
    MethodParameters, ParameterAnnotations, RuntimeInvisibleParameterAnnotations,
    RuntimeVisibleParameterAnnotations, Signature, Synthetic,
};
use crate::jvm::code::{BranchInstruction, Instruction, SynLabel, SynLabelGenerator};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::annotation::serialize_annotations;
use crate::jvm::model::{
    Annotation, Annotations, ConstantValue, ElementValue, FieldRef, InvokeDynamic, MethodRef,
};
use crate::jvm::{
    BinaryName, Error, FieldType, MethodAccessFlags, MethodDescriptor, Name, ParameterAccessFlags,
    RefType, UnqualifiedName,
};

/// Everything about a method except for its code
#[derive(Clone, Debug, PartialEq)]
pub struct MethodHeader {
    pub access_flags: MethodAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Generic signature
    pub signature: Option<String>,

    /// Declared checked exceptions
    pub exceptions: Vec<BinaryName>,
    pub annotations: Annotations,
    pub parameter_annotations: ParameterAnnotationSets,

    /// Default value of an annotation interface element
    pub annotation_default: Option<ElementValue>,
    pub parameters: Option<Vec<MethodParameter>>,
    pub deprecated: bool,
    pub synthetic: bool,
}

/// Per-parameter annotations (each is absent when the attribute is absent)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ParameterAnnotationSets {
    pub visible: Option<Vec<Vec<Annotation>>>,
    pub invisible: Option<Vec<Vec<Annotation>>>,
}

/// Entry of the `MethodParameters` attribute
#[derive(Clone, Debug, PartialEq)]
pub struct MethodParameter {
    pub name: Option<String>,
    pub access_flags: ParameterAccessFlags,
}

impl MethodHeader {
    pub fn new(
        access_flags: MethodAccessFlags,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodHeader {
        MethodHeader {
            access_flags,
            name,
            descriptor,
            signature: None,
            exceptions: vec![],
            annotations: Annotations::default(),
            parameter_annotations: ParameterAnnotationSets::default(),
            annotation_default: None,
            parameters: None,
            deprecated: false,
            synthetic: false,
        }
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Whether the method has a body (neither `abstract` nor `native`)
    pub fn has_code(&self) -> bool {
        !self
            .access_flags
            .intersects(MethodAccessFlags::ABSTRACT | MethodAccessFlags::NATIVE)
    }

    /// Method attributes, except for `Code`
    pub(crate) fn serialize_attributes(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<Vec<Attribute>, Error> {
        let mut attributes = vec![];

        if !self.exceptions.is_empty() {
            let exceptions = self
                .exceptions
                .iter()
                .map(|exception| Ok(exception.constant_index(constants)?))
                .collect::<Result<_, Error>>()?;
            attributes.push(constants.get_attribute(Exceptions(exceptions))?);
        }
        if let Some(signature) = &self.signature {
            let signature = constants.get_utf8(signature.as_str())?;
            attributes.push(constants.get_attribute(Signature(signature))?);
        }
        self.annotations.serialize_into(constants, &mut attributes)?;
        if let Some(visible) = &self.parameter_annotations.visible {
            let visible = serialize_parameter_annotations(visible, constants)?;
            attributes.push(constants.get_attribute(RuntimeVisibleParameterAnnotations(visible))?);
        }
        if let Some(invisible) = &self.parameter_annotations.invisible {
            let invisible = serialize_parameter_annotations(invisible, constants)?;
            attributes
                .push(constants.get_attribute(RuntimeInvisibleParameterAnnotations(invisible))?);
        }
        if let Some(default) = &self.annotation_default {
            let default = default.serialize_element(constants)?;
            attributes.push(constants.get_attribute(AnnotationDefault(default))?);
        }
        if let Some(parameters) = &self.parameters {
            let parameters = parameters
                .iter()
                .map(|parameter| -> Result<_, Error> {
                    Ok(class_file::MethodParameter {
                        name: match &parameter.name {
                            Some(name) => Some(constants.get_utf8(name.as_str())?),
                            None => None,
                        },
                        access_flags: parameter.access_flags,
                    })
                })
                .collect::<Result<_, _>>()?;
            attributes.push(constants.get_attribute(MethodParameters(parameters))?);
        }
        if self.deprecated {
            attributes.push(constants.get_attribute(Deprecated)?);
        }
        if self.synthetic {
            attributes.push(constants.get_attribute(Synthetic)?);
        }

        Ok(attributes)
    }
}

fn serialize_parameter_annotations(
    parameters: &[Vec<Annotation>],
    constants: &mut ConstantsPool,
) -> Result<ParameterAnnotations, Error> {
    let parameters = parameters
        .iter()
        .map(|annotations| serialize_annotations(annotations, constants))
        .collect::<Result<_, _>>()?;
    Ok(ParameterAnnotations(parameters))
}

/// Method along with its code (absent for `abstract` and `native` methods)
#[derive(Clone, Debug, PartialEq)]
pub struct MethodNode {
    pub header: MethodHeader,
    pub code: Option<Code>,
}

impl MethodNode {
    /// Method with no code yet
    pub fn new(header: MethodHeader) -> MethodNode {
        MethodNode { header, code: None }
    }
}

/// Instruction whose operands are symbolic references rather than constant pool indices
pub type CodeInstruction =
    Instruction<RefType<BinaryName>, ConstantValue, FieldRef, MethodRef, InvokeDynamic>;

impl CodeInstruction {
    /// Load a constant, picking `ldc2_w` for constants that take two slots
    pub fn ldc(value: ConstantValue) -> CodeInstruction {
        if value.is_wide() {
            Instruction::Ldc2(value)
        } else {
            Instruction::Ldc(value)
        }
    }
}

/// Element of a method body
#[derive(Clone, Debug, PartialEq)]
pub enum CodeElement {
    /// Position in the code (jump target, or boundary of a range)
    Label(SynLabel),

    /// Source line of the instruction that follows
    LineNumber(u16),
    Instruction(CodeInstruction),
    Branch(BranchInstruction<SynLabel>),
}

/// Exception handler covering the range `[start, end)`
#[derive(Clone, Debug, PartialEq)]
pub struct TryCatchBlock {
    pub start: SynLabel,
    pub end: SynLabel,
    pub handler: SynLabel,

    /// `None` catches everything (as used by `finally`)
    pub catch_type: Option<BinaryName>,
}

/// Debug information about a local variable live in `[start, end)`
#[derive(Clone, Debug, PartialEq)]
pub struct LocalVariable {
    pub name: String,
    pub descriptor: FieldType<BinaryName>,

    /// Generic signature, from `LocalVariableTypeTable`
    pub signature: Option<String>,
    pub start: SynLabel,
    pub end: SynLabel,
    pub index: u16,
}

/// Method body
///
/// Maximum stack and locals are not stored: they are recomputed whenever the code is written.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Code {
    pub elements: Vec<CodeElement>,
    pub try_catch_blocks: Vec<TryCatchBlock>,
    pub local_variables: Vec<LocalVariable>,
}

impl Code {
    /// Labels placed in the body
    pub fn labels(&self) -> impl Iterator<Item = &SynLabel> {
        self.elements.iter().filter_map(|element| match element {
            CodeElement::Label(label) => Some(label),
            _ => None,
        })
    }

    /// Generator for labels that are not yet used anywhere in the body
    pub fn label_generator(&self) -> SynLabelGenerator {
        let referenced = self
            .try_catch_blocks
            .iter()
            .flat_map(|block| [&block.start, &block.end, &block.handler])
            .chain(
                self.local_variables
                    .iter()
                    .flat_map(|local| [&local.start, &local.end]),
            );
        SynLabelGenerator::after(self.labels().chain(referenced))
    }

    /// Number of real instructions (labels and line numbers excluded)
    pub fn instruction_count(&self) -> usize {
        self.elements
            .iter()
            .filter(|element| {
                matches!(
                    element,
                    CodeElement::Instruction(_) | CodeElement::Branch(_)
                )
            })
            .count()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::LabelGenerator;

    #[test]
    fn wide_constants_use_ldc2() {
        assert!(matches!(
            CodeInstruction::ldc(ConstantValue::Long(1)),
            Instruction::Ldc2(_)
        ));
        assert!(matches!(
            CodeInstruction::ldc(ConstantValue::String(String::from("x"))),
            Instruction::Ldc(_)
        ));
    }

    #[test]
    fn fresh_labels_avoid_handler_labels() {
        let mut generator = SynLabelGenerator::default();
        let start = generator.fresh_label();
        let end = generator.fresh_label();
        let handler = generator.fresh_label();
        let code = Code {
            elements: vec![
                CodeElement::Label(start),
                CodeElement::Branch(BranchInstruction::Return),
                CodeElement::Label(end),
            ],
            try_catch_blocks: vec![TryCatchBlock {
                start,
                end,
                handler,
                catch_type: None,
            }],
            local_variables: vec![],
        };
        assert!(code.label_generator().fresh_label() > handler);
        assert_eq!(code.instruction_count(), 1);
    }

    #[test]
    fn abstract_methods_have_no_code() {
        let header = MethodHeader::new(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::ABSTRACT,
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        );
        assert!(!header.has_code());
        assert!(!header.is_static());
    }
}
