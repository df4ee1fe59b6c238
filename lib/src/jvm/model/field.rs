use crate::jvm::class_file::{
    self, ConstantsPool, ConstantsWriter, Deprecated, Signature, Synthetic,
};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{Annotations, ConstantValue};
use crate::jvm::{BinaryName, Error, FieldAccessFlags, FieldType, Name, UnqualifiedName};

/// In-memory representation of a field
#[derive(Clone, Debug, PartialEq)]
pub struct FieldNode {
    pub access_flags: FieldAccessFlags,
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,

    /// Generic signature
    ///
    /// [Format](https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.9.1)
    pub signature: Option<String>,

    /// Initial value of a static field
    pub constant_value: Option<ConstantValue>,
    pub annotations: Annotations,
    pub deprecated: bool,
    pub synthetic: bool,
}

impl FieldNode {
    pub fn new(
        access_flags: FieldAccessFlags,
        name: UnqualifiedName,
        descriptor: FieldType<BinaryName>,
    ) -> FieldNode {
        FieldNode {
            access_flags,
            name,
            descriptor,
            signature: None,
            constant_value: None,
            annotations: Annotations::default(),
            deprecated: false,
            synthetic: false,
        }
    }

    pub(crate) fn serialize_field(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::Field, Error> {
        let name_index = constants.get_utf8(self.name.as_str())?;
        let descriptor_index = constants.get_utf8(self.descriptor.render())?;

        let mut attributes = vec![];
        if let Some(value) = &self.constant_value {
            let value = value.constant_index(constants)?;
            attributes.push(constants.get_attribute(class_file::ConstantValue(value))?);
        }
        if let Some(signature) = &self.signature {
            let signature = constants.get_utf8(signature.as_str())?;
            attributes.push(constants.get_attribute(Signature(signature))?);
        }
        self.annotations.serialize_into(constants, &mut attributes)?;
        if self.deprecated {
            attributes.push(constants.get_attribute(Deprecated)?);
        }
        if self.synthetic {
            attributes.push(constants.get_attribute(Synthetic)?);
        }

        Ok(class_file::Field {
            access_flags: self.access_flags,
            name_index,
            descriptor_index,
            attributes,
        })
    }
}
