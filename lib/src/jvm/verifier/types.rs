use crate::jvm::class_file::{ClassConstantIndex, Serialize};
use crate::jvm::{BaseType, BinaryName, FieldType, RefType};
use crate::util::Width;
use byteorder::WriteBytesExt;

/// These types are from [this hierarchy][0]
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.10.1.2
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub enum VerificationType<Cls, U> {
    /// Unusable slot: never written, the second half of a `long`/`double`, or the merge of
    /// incompatible types
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,

    /// In the constructor, the `this` parameter starts with this type then turns into an object
    /// type after `<init>` is called
    UninitializedThis,

    /// Object type
    Object(Cls),

    /// State of an object after `new` has been called but `<init>` has not been called
    ///
    ///   - during analysis, `U` is an [`UninitializedObject`], tracking which `new` produced the
    ///     value (and the type it will have once initialized)
    ///   - when serializing into a class file, `U` is the `u16` offset of that `new` instruction
    Uninitialized(U),
}

/// Verification type used while analyzing a method body
pub type AnalysisType = VerificationType<RefType<BinaryName>, UninitializedObject>;

/// Verification type, ready to be written out in a `StackMapTable`
pub type SerializableType = VerificationType<ClassConstantIndex, u16>;

/// Object allocated by `new` which has not been initialized yet
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct UninitializedObject {
    /// Index of the `new` instruction in the method's code elements
    pub created_at: usize,

    /// Type of the object once initialized
    pub class: RefType<BinaryName>,
}

impl<Cls, U> VerificationType<Cls, U> {
    /// Is this type is a reference type?
    pub fn is_reference(&self) -> bool {
        match self {
            VerificationType::Top
            | VerificationType::Integer
            | VerificationType::Float
            | VerificationType::Double
            | VerificationType::Long => false,

            VerificationType::Null
            | VerificationType::UninitializedThis
            | VerificationType::Object(_)
            | VerificationType::Uninitialized(_) => true,
        }
    }

    /// Map the class and uninitialized components, stopping at the first error
    pub fn try_map<C2, U2, E>(
        &self,
        map_class: impl FnOnce(&Cls) -> Result<C2, E>,
        map_uninitialized: impl FnOnce(&U) -> Result<U2, E>,
    ) -> Result<VerificationType<C2, U2>, E> {
        Ok(match self {
            VerificationType::Top => VerificationType::Top,
            VerificationType::Integer => VerificationType::Integer,
            VerificationType::Float => VerificationType::Float,
            VerificationType::Long => VerificationType::Long,
            VerificationType::Double => VerificationType::Double,
            VerificationType::Null => VerificationType::Null,
            VerificationType::UninitializedThis => VerificationType::UninitializedThis,
            VerificationType::Object(cls) => VerificationType::Object(map_class(cls)?),
            VerificationType::Uninitialized(uninit) => {
                VerificationType::Uninitialized(map_uninitialized(uninit)?)
            }
        })
    }
}

impl<C, U> From<FieldType<C>> for VerificationType<RefType<C>, U> {
    fn from(field_type: FieldType<C>) -> Self {
        match field_type {
            FieldType::Base(BaseType::Int)
            | FieldType::Base(BaseType::Char)
            | FieldType::Base(BaseType::Short)
            | FieldType::Base(BaseType::Byte)
            | FieldType::Base(BaseType::Boolean) => VerificationType::Integer,
            FieldType::Base(BaseType::Float) => VerificationType::Float,
            FieldType::Base(BaseType::Long) => VerificationType::Long,
            FieldType::Base(BaseType::Double) => VerificationType::Double,
            FieldType::Ref(ref_type) => VerificationType::Object(ref_type),
        }
    }
}

impl Serialize for SerializableType {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            VerificationType::Top => 0u8.serialize(writer)?,
            VerificationType::Integer => 1u8.serialize(writer)?,
            VerificationType::Float => 2u8.serialize(writer)?,
            VerificationType::Double => 3u8.serialize(writer)?,
            VerificationType::Long => 4u8.serialize(writer)?,
            VerificationType::Null => 5u8.serialize(writer)?,
            VerificationType::UninitializedThis => 6u8.serialize(writer)?,
            VerificationType::Object(cls) => {
                7u8.serialize(writer)?;
                cls.serialize(writer)?;
            }
            VerificationType::Uninitialized(off) => {
                8u8.serialize(writer)?;
                off.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl<Cls, U> Width for VerificationType<Cls, U> {
    fn width(&self) -> usize {
        match self {
            VerificationType::Double | VerificationType::Long => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;

    #[test]
    fn field_types_collapse_to_int() {
        for field_type in [FieldType::boolean(), FieldType::int()] {
            assert_eq!(
                AnalysisType::from(field_type.clone()),
                VerificationType::Integer
            );
        }
        assert_eq!(AnalysisType::from(FieldType::long()).width(), 2);
        assert!(AnalysisType::from(FieldType::object(BinaryName::STRING)).is_reference());
        assert!(!AnalysisType::Top.is_reference());
    }

    #[test]
    fn serialized_tags() {
        let mut out = vec![];
        for vtype in [
            SerializableType::Top,
            SerializableType::Object(ClassConstantIndex(ConstantIndex(3))),
            SerializableType::Uninitialized(258),
        ] {
            vtype.serialize(&mut out).unwrap();
        }
        assert_eq!(out, vec![0, 7, 0, 3, 8, 1, 2]);
    }
}
