//! Small snippets of bytecode shared by the passes that synthesize code

use crate::jvm::code::{BranchInstruction, Instruction, InvokeType, SynLabel};
use crate::jvm::model::{CodeElement, CodeInstruction, MethodRef};
use crate::jvm::{BaseType, BinaryName, FieldType, MethodDescriptor, UnqualifiedName};
use crate::util::Width;

/// Load a local variable of the given type
pub fn load(field_type: &FieldType<BinaryName>, slot: u16) -> CodeInstruction {
    match field_type {
        FieldType::Ref(_) => Instruction::ALoad(slot),
        FieldType::Base(BaseType::Long) => Instruction::LLoad(slot),
        FieldType::Base(BaseType::Float) => Instruction::FLoad(slot),
        FieldType::Base(BaseType::Double) => Instruction::DLoad(slot),
        FieldType::Base(_) => Instruction::ILoad(slot),
    }
}

/// Push every argument of a method, starting with `this` for instance methods
pub fn load_arguments(
    descriptor: &MethodDescriptor<BinaryName>,
    is_static: bool,
) -> Vec<CodeElement> {
    let mut elements = vec![];
    let mut slot: u16 = 0;
    if !is_static {
        elements.push(CodeElement::Instruction(Instruction::ALoad(0)));
        slot += 1;
    }
    for parameter in &descriptor.parameters {
        elements.push(CodeElement::Instruction(load(parameter, slot)));
        slot += parameter.width() as u16;
    }
    elements
}

/// Return instruction for a method with this return type
pub fn return_instruction(
    return_type: Option<&FieldType<BinaryName>>,
) -> BranchInstruction<SynLabel> {
    match return_type {
        None => BranchInstruction::Return,
        Some(FieldType::Ref(_)) => BranchInstruction::AReturn,
        Some(FieldType::Base(BaseType::Long)) => BranchInstruction::LReturn,
        Some(FieldType::Base(BaseType::Float)) => BranchInstruction::FReturn,
        Some(FieldType::Base(BaseType::Double)) => BranchInstruction::DReturn,
        Some(FieldType::Base(_)) => BranchInstruction::IReturn,
    }
}

/// Zero value of a type (`0`, `0L`, `0.0f`, `0.0`, `false`, or `null`)
pub fn default_value(field_type: &FieldType<BinaryName>) -> CodeInstruction {
    match field_type {
        FieldType::Ref(_) => Instruction::AConstNull,
        FieldType::Base(BaseType::Long) => Instruction::LConst0,
        FieldType::Base(BaseType::Float) => Instruction::FConst0,
        FieldType::Base(BaseType::Double) => Instruction::DConst0,
        FieldType::Base(_) => Instruction::IConst0,
    }
}

/// Body that returns the default value of the return type
pub fn default_return(descriptor: &MethodDescriptor<BinaryName>) -> Vec<CodeElement> {
    let mut elements = vec![];
    if let Some(return_type) = &descriptor.return_type {
        elements.push(CodeElement::Instruction(default_value(return_type)));
    }
    elements.push(CodeElement::Branch(return_instruction(
        descriptor.return_type.as_ref(),
    )));
    elements
}

/// Call a static method
pub fn invoke_static(method: MethodRef) -> CodeElement {
    CodeElement::Instruction(Instruction::Invoke(InvokeType::Static, method))
}

/// `valueOf` boxing a primitive into its wrapper class
pub fn box_primitive(base_type: BaseType) -> CodeInstruction {
    let boxed = base_type.boxed_class();
    Instruction::Invoke(
        InvokeType::Static,
        MethodRef::new(
            boxed.clone(),
            UnqualifiedName::VALUEOF,
            MethodDescriptor {
                parameters: vec![FieldType::Base(base_type)],
                return_type: Some(FieldType::object(boxed)),
            },
        ),
    )
}

/// `xxxValue` unboxing a wrapper class (which must already be on the stack) into a primitive
pub fn unbox_primitive(base_type: BaseType) -> CodeInstruction {
    let method = match base_type {
        BaseType::Int => UnqualifiedName::INTVALUE,
        BaseType::Long => UnqualifiedName::LONGVALUE,
        BaseType::Float => UnqualifiedName::FLOATVALUE,
        BaseType::Double => UnqualifiedName::DOUBLEVALUE,
        BaseType::Boolean => UnqualifiedName::BOOLEANVALUE,
        BaseType::Byte => UnqualifiedName::BYTEVALUE,
        BaseType::Char => UnqualifiedName::CHARVALUE,
        BaseType::Short => UnqualifiedName::SHORTVALUE,
    };
    Instruction::Invoke(
        InvokeType::Virtual,
        MethodRef::new(
            base_type.boxed_class(),
            method,
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::Base(base_type)),
            },
        ),
    )
}
