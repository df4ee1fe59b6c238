use crate::jvm::class_file::HandleKind;
use crate::jvm::code::InvokeType;
use crate::jvm::{BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName};

/// Symbolic reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
}

/// Symbolic reference to a method
///
/// The owner is a reference type since methods can be invoked on arrays (eg. `[I.clone()`).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: RefType<BinaryName>,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,

    /// Whether the owner is an interface (`InterfaceMethodref` vs. `Methodref`)
    pub is_interface: bool,
}

impl MethodRef {
    /// Method declared on a class
    pub fn new(
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodRef {
        MethodRef {
            owner: RefType::Object(owner),
            name,
            descriptor,
            is_interface: false,
        }
    }

    /// Method declared on an interface
    pub fn interface(
        owner: BinaryName,
        name: UnqualifiedName,
        descriptor: MethodDescriptor<BinaryName>,
    ) -> MethodRef {
        MethodRef {
            is_interface: true,
            ..MethodRef::new(owner, name, descriptor)
        }
    }

    /// Invoke type for calling this method through `invokeinterface`
    ///
    /// The count includes the receiver and counts `long`/`double` arguments twice.
    pub fn interface_invoke_type(&self) -> InvokeType {
        InvokeType::Interface(self.descriptor.parameter_length(true) as u8)
    }

    /// Class name of the owner, if it is not an array type
    pub fn owner_class(&self) -> Option<&BinaryName> {
        match &self.owner {
            RefType::Object(name) => Some(name),
            _ => None,
        }
    }
}

/// Member targeted by a method handle
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemberRef {
    Field(FieldRef),
    Method(MethodRef),
}

/// Constant `java.lang.invoke.MethodHandle`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub member: MemberRef,
}

/// Bootstrap method and its static arguments, as used by `invokedynamic` and dynamic constants
#[derive(Clone, Debug, PartialEq)]
pub struct BootstrapMethod {
    pub handle: Handle,
    pub arguments: Vec<ConstantValue>,
}

/// Dynamically-computed constant (`CONSTANT_Dynamic`)
#[derive(Clone, Debug, PartialEq)]
pub struct DynamicConstant {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub bootstrap: BootstrapMethod,
}

/// Dynamically-computed call site (`CONSTANT_InvokeDynamic`)
#[derive(Clone, Debug, PartialEq)]
pub struct InvokeDynamic {
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
    pub bootstrap: BootstrapMethod,
}

/// Loadable constant, as used by `ldc`, field initial values, and bootstrap arguments
#[derive(Clone, Debug)]
pub enum ConstantValue {
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    String(String),
    Class(RefType<BinaryName>),
    MethodType(MethodDescriptor<BinaryName>),
    MethodHandle(Handle),
    Dynamic(Box<DynamicConstant>),
}

/// Floating point constants compare by bit pattern, so `NaN` constants equal themselves
impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        use ConstantValue::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Long(a), Long(b)) => a == b,
            (Double(a), Double(b)) => a.to_bits() == b.to_bits(),
            (String(a), String(b)) => a == b,
            (Class(a), Class(b)) => a == b,
            (MethodType(a), MethodType(b)) => a == b,
            (MethodHandle(a), MethodHandle(b)) => a == b,
            (Dynamic(a), Dynamic(b)) => a == b,
            _ => false,
        }
    }
}

impl ConstantValue {
    /// Whether loading the constant takes two stack slots (and `ldc2_w`)
    pub fn is_wide(&self) -> bool {
        match self {
            ConstantValue::Long(_) | ConstantValue::Double(_) => true,
            ConstantValue::Dynamic(dynamic) => matches!(
                dynamic.descriptor,
                FieldType::Base(crate::jvm::BaseType::Long)
                    | FieldType::Base(crate::jvm::BaseType::Double)
            ),
            _ => false,
        }
    }

    /// Type of the value pushed when the constant is loaded
    pub fn field_type(&self) -> FieldType<BinaryName> {
        match self {
            ConstantValue::Integer(_) => FieldType::int(),
            ConstantValue::Float(_) => FieldType::float(),
            ConstantValue::Long(_) => FieldType::long(),
            ConstantValue::Double(_) => FieldType::double(),
            ConstantValue::String(_) => FieldType::object(BinaryName::STRING),
            ConstantValue::Class(_) => FieldType::object(BinaryName::CLASS),
            ConstantValue::MethodType(_) => FieldType::object(BinaryName::METHODTYPE),
            ConstantValue::MethodHandle(_) => FieldType::object(BinaryName::METHODHANDLE),
            ConstantValue::Dynamic(dynamic) => dynamic.descriptor.clone(),
        }
    }
}
