use crate::jvm::class_file::{
    self, Attribute, ConstantsPool, ConstantsWriter, Deprecated, EnclosingMethod as RawEnclosing,
    InnerClasses, NestHost, NestMembers, PermittedSubclasses, Record, Signature,
    SourceDebugExtension, SourceFile, Synthetic, Version,
};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{Annotations, FieldNode, MethodNode};
use crate::jvm::{
    BinaryName, ClassAccessFlags, Error, FieldType, InnerClassAccessFlags, MethodDescriptor, Name,
    UnqualifiedName,
};

/// Everything about a class except for its fields and methods
#[derive(Clone, Debug, PartialEq)]
pub struct ClassHeader {
    pub version: Version,
    pub access_flags: ClassAccessFlags,
    pub name: BinaryName,

    /// Only `java/lang/Object` has no super class
    pub super_name: Option<BinaryName>,
    pub interfaces: Vec<BinaryName>,

    /// Generic signature
    pub signature: Option<String>,
    pub source_file: Option<String>,
    pub source_debug_extension: Option<Vec<u8>>,
    pub inner_classes: Vec<InnerClass>,
    pub enclosing_method: Option<EnclosingMethod>,
    pub nest_host: Option<BinaryName>,
    pub nest_members: Vec<BinaryName>,
    pub permitted_subclasses: Vec<BinaryName>,

    /// Present only on records (and possibly empty even then)
    pub record_components: Option<Vec<RecordComponent>>,
    pub annotations: Annotations,
    pub deprecated: bool,
    pub synthetic: bool,
}

impl ClassHeader {
    /// Header with no attributes
    pub fn new(
        version: Version,
        access_flags: ClassAccessFlags,
        name: BinaryName,
        super_name: Option<BinaryName>,
    ) -> ClassHeader {
        ClassHeader {
            version,
            access_flags,
            name,
            super_name,
            interfaces: vec![],
            signature: None,
            source_file: None,
            source_debug_extension: None,
            inner_classes: vec![],
            enclosing_method: None,
            nest_host: None,
            nest_members: vec![],
            permitted_subclasses: vec![],
            record_components: None,
            annotations: Annotations::default(),
            deprecated: false,
            synthetic: false,
        }
    }

    pub fn is_interface(&self) -> bool {
        self.access_flags.contains(ClassAccessFlags::INTERFACE)
    }

    /// Class attributes, except for `BootstrapMethods` (which can only be known once every method
    /// has been serialized)
    pub(crate) fn serialize_attributes(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<Vec<Attribute>, Error> {
        let mut attributes = vec![];

        if let Some(signature) = &self.signature {
            let signature = constants.get_utf8(signature.as_str())?;
            attributes.push(constants.get_attribute(Signature(signature))?);
        }
        if let Some(source_file) = &self.source_file {
            let source_file = constants.get_utf8(source_file.as_str())?;
            attributes.push(constants.get_attribute(SourceFile(source_file))?);
        }
        if let Some(extension) = &self.source_debug_extension {
            attributes.push(constants.get_attribute(SourceDebugExtension(extension.clone()))?);
        }
        if !self.inner_classes.is_empty() {
            let inner_classes = self
                .inner_classes
                .iter()
                .map(|inner_class| inner_class.serialize_inner_class(constants))
                .collect::<Result<_, Error>>()?;
            attributes.push(constants.get_attribute(InnerClasses(inner_classes))?);
        }
        if let Some(enclosing) = &self.enclosing_method {
            let class = enclosing.class.constant_index(constants)?;
            let method = match &enclosing.method {
                Some((name, descriptor)) => {
                    Some(constants.get_name_and_type(name.as_str(), &descriptor.render())?)
                }
                None => None,
            };
            attributes.push(constants.get_attribute(RawEnclosing { class, method })?);
        }
        if let Some(nest_host) = &self.nest_host {
            let nest_host = nest_host.constant_index(constants)?;
            attributes.push(constants.get_attribute(NestHost(nest_host))?);
        }
        if !self.nest_members.is_empty() {
            let members = class_indices(&self.nest_members, constants)?;
            attributes.push(constants.get_attribute(NestMembers(members))?);
        }
        if !self.permitted_subclasses.is_empty() {
            let permitted = class_indices(&self.permitted_subclasses, constants)?;
            attributes.push(constants.get_attribute(PermittedSubclasses(permitted))?);
        }
        if let Some(components) = &self.record_components {
            let components = components
                .iter()
                .map(|component| component.serialize_component(constants))
                .collect::<Result<_, Error>>()?;
            attributes.push(constants.get_attribute(Record(components))?);
        }
        self.annotations.serialize_into(constants, &mut attributes)?;
        if self.deprecated {
            attributes.push(constants.get_attribute(Deprecated)?);
        }
        if self.synthetic {
            attributes.push(constants.get_attribute(Synthetic)?);
        }

        Ok(attributes)
    }
}

fn class_indices(
    names: &[BinaryName],
    constants: &mut ConstantsPool,
) -> Result<Vec<class_file::ClassConstantIndex>, Error> {
    names
        .iter()
        .map(|name| Ok(name.constant_index(constants)?))
        .collect()
}

/// Entry of the `InnerClasses` attribute
#[derive(Clone, Debug, PartialEq)]
pub struct InnerClass {
    pub inner_class: BinaryName,

    /// Absent for local and anonymous classes
    pub outer_class: Option<BinaryName>,

    /// Absent for anonymous classes
    pub inner_name: Option<String>,
    pub access_flags: InnerClassAccessFlags,
}

impl InnerClass {
    fn serialize_inner_class(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::InnerClass, Error> {
        Ok(class_file::InnerClass {
            inner_class: self.inner_class.constant_index(constants)?,
            outer_class: match &self.outer_class {
                Some(outer) => Some(outer.constant_index(constants)?),
                None => None,
            },
            inner_name: match &self.inner_name {
                Some(name) => Some(constants.get_utf8(name.as_str())?),
                None => None,
            },
            access_flags: self.access_flags,
        })
    }
}

/// Method (or just class) enclosing a local or anonymous class
#[derive(Clone, Debug, PartialEq)]
pub struct EnclosingMethod {
    pub class: BinaryName,
    pub method: Option<(UnqualifiedName, MethodDescriptor<BinaryName>)>,
}

/// Component of a record class
#[derive(Clone, Debug, PartialEq)]
pub struct RecordComponent {
    pub name: UnqualifiedName,
    pub descriptor: FieldType<BinaryName>,
    pub signature: Option<String>,
    pub annotations: Annotations,
}

impl RecordComponent {
    fn serialize_component(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::RecordComponent, Error> {
        let name_index = constants.get_utf8(self.name.as_str())?;
        let descriptor_index = constants.get_utf8(self.descriptor.render())?;
        let mut attributes = vec![];
        if let Some(signature) = &self.signature {
            let signature = constants.get_utf8(signature.as_str())?;
            attributes.push(constants.get_attribute(Signature(signature))?);
        }
        self.annotations.serialize_into(constants, &mut attributes)?;
        Ok(class_file::RecordComponent {
            name_index,
            descriptor_index,
            attributes,
        })
    }
}

/// Fully materialized class
#[derive(Clone, Debug, PartialEq)]
pub struct ClassNode {
    pub header: ClassHeader,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
}

impl ClassNode {
    pub fn new(header: ClassHeader) -> ClassNode {
        ClassNode {
            header,
            fields: vec![],
            methods: vec![],
        }
    }

    /// Find a method by name and descriptor
    pub fn method(
        &self,
        name: &UnqualifiedName,
        descriptor: &MethodDescriptor<BinaryName>,
    ) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|method| method.header.name == *name && method.header.descriptor == *descriptor)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{ConstantIndex, Utf8ConstantIndex};

    #[test]
    fn attributes_follow_header_fields() {
        let mut header = ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            BinaryName::from_str("a/Outer").unwrap(),
            Some(BinaryName::OBJECT),
        );
        header.source_file = Some(String::from("Outer.java"));
        header.inner_classes.push(InnerClass {
            inner_class: BinaryName::from_str("a/Outer$1").unwrap(),
            outer_class: None,
            inner_name: None,
            access_flags: InnerClassAccessFlags::empty(),
        });
        header.deprecated = true;

        let mut pool = ConstantsPool::new();
        let attributes = header.serialize_attributes(&mut pool).unwrap();
        assert_eq!(attributes.len(), 3);

        // source file name is interned before the attribute name
        assert_eq!(attributes[0].name_index, Utf8ConstantIndex(ConstantIndex(2)));
        assert_eq!(attributes[0].info, vec![0, 1]);

        // anonymous class: outer and inner name are both zero
        assert_eq!(&attributes[1].info[4..], &[0, 0, 0, 0, 0, 0]);
        assert!(attributes[2].info.is_empty());
    }
}
