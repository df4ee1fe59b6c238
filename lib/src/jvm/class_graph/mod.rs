//! Just enough of the class hierarchy to merge types
//!
//! Computing stack map frames occasionally requires merging two object types into their nearest
//! common ancestor. Doing that by loading classes is not an option (the classes being merged may
//! be the very classes in the middle of being transformed), so the hierarchy is described by
//! [`ClassDescriptor`]s: a name, a super class, and a list of interfaces. Descriptors come from a
//! [`DescriptorLocator`], which can be layered (see [`ChainedLocator`], [`CachingLocator`],
//! [`FallbackLocator`]) to combine several sources of class information.

use crate::jvm::model::ClassHeader;
use crate::jvm::{BinaryName, ClassAccessFlags, Error};
use std::hash::{Hash, Hasher};

mod ancestors;
mod locators;
mod platform;

pub use ancestors::*;
pub use locators::*;
pub use platform::*;

/// Position of a class or interface in the hierarchy
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    pub name: BinaryName,

    /// Super class (`java/lang/Object` is its own super class)
    pub super_name: BinaryName,

    /// Directly implemented (or extended, for interfaces) interfaces
    pub interfaces: Vec<BinaryName>,
    pub is_interface: bool,
}

impl ClassDescriptor {
    pub fn new(
        name: BinaryName,
        super_name: BinaryName,
        interfaces: Vec<BinaryName>,
        is_interface: bool,
    ) -> ClassDescriptor {
        ClassDescriptor {
            name,
            super_name,
            interfaces,
            is_interface,
        }
    }

    /// Descriptor of `java/lang/Object`
    pub fn object() -> ClassDescriptor {
        ClassDescriptor::new(BinaryName::OBJECT, BinaryName::OBJECT, vec![], false)
    }

    /// Descriptor of a class from its header
    pub fn from_header(header: &ClassHeader) -> ClassDescriptor {
        if header.name == BinaryName::OBJECT {
            return ClassDescriptor::object();
        }
        ClassDescriptor::new(
            header.name.clone(),
            header.super_name.clone().unwrap_or(BinaryName::OBJECT),
            header.interfaces.clone(),
            header.access_flags.contains(ClassAccessFlags::INTERFACE),
        )
    }

    /// Same position in the hierarchy, under a different name
    pub fn renamed(&self, name: BinaryName) -> ClassDescriptor {
        ClassDescriptor {
            name,
            ..self.clone()
        }
    }

    /// Is this the root of the hierarchy?
    pub fn is_object(&self) -> bool {
        self.name == BinaryName::OBJECT
    }
}

impl PartialEq for ClassDescriptor {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for ClassDescriptor {}

impl Hash for ClassDescriptor {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state)
    }
}

/// Source of class descriptors
///
/// Locators report classes they know nothing about with [`Error::ClassNotFound`], which is what
/// lets them be chained. Other errors (eg. a class file that exists but is corrupt) stop the
/// lookup.
pub trait DescriptorLocator: Send + Sync {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error>;
}

impl<L: DescriptorLocator + ?Sized> DescriptorLocator for &L {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        (**self).locate(name)
    }
}

impl<L: DescriptorLocator + ?Sized> DescriptorLocator for Box<L> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        (**self).locate(name)
    }
}

impl<L: DescriptorLocator + ?Sized> DescriptorLocator for std::sync::Arc<L> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        (**self).locate(name)
    }
}

/// Locator which never resolves anything, answering `java/lang/Object` for every name
pub struct ObjectLocator;

impl DescriptorLocator for ObjectLocator {
    fn locate(&self, _name: &BinaryName) -> Result<ClassDescriptor, Error> {
        Ok(ClassDescriptor::object())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::Name;
    use std::collections::HashSet;

    #[test]
    fn identity_is_the_name() {
        let list = BinaryName::from_str("java/util/List").unwrap();
        let first = ClassDescriptor::new(list.clone(), BinaryName::OBJECT, vec![], true);
        let second = ClassDescriptor::new(
            list,
            BinaryName::OBJECT,
            vec![BinaryName::from_str("java/util/Collection").unwrap()],
            true,
        );
        assert_eq!(first, second);
        assert_eq!(HashSet::from([first, second]).len(), 1);
    }

    #[test]
    fn renaming_keeps_the_hierarchy() {
        let original = ClassDescriptor::new(
            BinaryName::from_str("a/Widget").unwrap(),
            BinaryName::from_str("a/View").unwrap(),
            vec![BinaryName::SERIALIZABLE],
            false,
        );
        let renamed = original.renamed(BinaryName::from_str("b/Widget").unwrap());
        assert_ne!(renamed, original);
        assert_eq!(renamed.super_name, original.super_name);
        assert_eq!(renamed.interfaces, original.interfaces);
        assert!(!renamed.is_interface);
    }

    #[test]
    fn header_descriptors() {
        let mut header = ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
            BinaryName::from_str("a/Listener").unwrap(),
            Some(BinaryName::OBJECT),
        );
        header.interfaces.push(BinaryName::from_str("a/Base").unwrap());
        let descriptor = ClassDescriptor::from_header(&header);
        assert!(descriptor.is_interface);
        assert_eq!(descriptor.interfaces, header.interfaces);

        let object = ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            BinaryName::OBJECT,
            None,
        );
        let descriptor = ClassDescriptor::from_header(&object);
        assert!(descriptor.is_object());
        assert_eq!(descriptor.super_name, BinaryName::OBJECT);
    }
}
