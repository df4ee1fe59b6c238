use super::{ClassDescriptor, DescriptorLocator};
use crate::jvm::verifier::SuperClassResolver;
use crate::jvm::{BinaryName, Error};
use std::collections::HashSet;

/// Nearest common ancestor of two classes or interfaces
///
/// This matches what the JVM verifier expects when two object types meet:
///
///   - if one type is a super class of the other, that is the answer
///   - if one type is an interface implemented by the other, that interface is the answer
///   - two classes meet at their closest shared super class
///   - anything else (eg. unrelated interfaces) meets at `java/lang/Object`
///
/// Descriptors are located lazily, and only as far up the hierarchy as needed.
pub fn nearest_common_ancestor(
    first: &ClassDescriptor,
    second: &ClassDescriptor,
    locator: &dyn DescriptorLocator,
) -> Result<ClassDescriptor, Error> {
    if first == second || first.is_object() {
        return Ok(first.clone());
    }
    if second.is_object() {
        return Ok(second.clone());
    }

    if is_subclass_of(second, first, locator)? {
        return Ok(first.clone());
    }
    if is_subclass_of(first, second, locator)? {
        return Ok(second.clone());
    }

    if first.is_interface && implements(second, first, locator)? {
        return Ok(first.clone());
    }
    if second.is_interface && implements(first, second, locator)? {
        return Ok(second.clone());
    }

    if !first.is_interface && !second.is_interface {
        let mut visited = HashSet::from([first.name.clone()]);
        let mut candidate = super_class(first, locator)?;
        loop {
            if is_subclass_of(second, &candidate, locator)? || candidate.is_object() {
                return Ok(candidate);
            }
            if !visited.insert(candidate.name.clone()) {
                return Err(cycle(&candidate.name));
            }
            candidate = super_class(&candidate, locator)?;
        }
    }

    Ok(ClassDescriptor::object())
}

/// Is `class` equal to `ancestor`, or does `ancestor` appear in its super class chain?
pub fn is_subclass_of(
    class: &ClassDescriptor,
    ancestor: &ClassDescriptor,
    locator: &dyn DescriptorLocator,
) -> Result<bool, Error> {
    let mut visited = HashSet::new();
    let mut current = class.clone();
    loop {
        if current == *ancestor {
            return Ok(true);
        }
        if current.is_object() {
            return Ok(false);
        }
        if !visited.insert(current.name.clone()) {
            return Err(cycle(&current.name));
        }
        current = super_class(&current, locator)?;
    }
}

/// Does `interface` appear among the interfaces of `class` (directly, through super classes, or
/// through super interfaces)?
pub fn implements(
    class: &ClassDescriptor,
    interface: &ClassDescriptor,
    locator: &dyn DescriptorLocator,
) -> Result<bool, Error> {
    let mut to_visit: Vec<BinaryName> = vec![];

    // Direct interfaces of the class and all of its super classes
    let mut visited_classes = HashSet::new();
    let mut current = class.clone();
    loop {
        to_visit.extend(current.interfaces.iter().cloned());
        if current.is_object() {
            break;
        }
        if !visited_classes.insert(current.name.clone()) {
            return Err(cycle(&current.name));
        }
        current = super_class(&current, locator)?;
    }

    // Super interfaces of those
    let mut visited_interfaces = HashSet::new();
    while let Some(name) = to_visit.pop() {
        if name == interface.name {
            return Ok(true);
        }
        if visited_interfaces.insert(name.clone()) {
            to_visit.extend(locator.locate(&name)?.interfaces);
        }
    }

    Ok(false)
}

/// Super class descriptor, without consulting the locator for `java/lang/Object`
fn super_class(
    class: &ClassDescriptor,
    locator: &dyn DescriptorLocator,
) -> Result<ClassDescriptor, Error> {
    if class.super_name == BinaryName::OBJECT {
        Ok(ClassDescriptor::object())
    } else {
        locator.locate(&class.super_name)
    }
}

fn cycle(name: &BinaryName) -> Error {
    Error::Malformed(format!("cyclic class hierarchy through {}", name))
}

/// Resolves common ancestors by name, locating descriptors as needed
pub struct CommonAncestorResolver<'l> {
    locator: &'l dyn DescriptorLocator,
}

impl<'l> CommonAncestorResolver<'l> {
    pub fn new(locator: &'l dyn DescriptorLocator) -> CommonAncestorResolver<'l> {
        CommonAncestorResolver { locator }
    }

    pub fn nearest_common_ancestor(
        &self,
        first: &ClassDescriptor,
        second: &ClassDescriptor,
    ) -> Result<ClassDescriptor, Error> {
        nearest_common_ancestor(first, second, self.locator)
    }

    /// Name of the nearest common ancestor of two named classes
    pub fn common_super_class(
        &self,
        first: &BinaryName,
        second: &BinaryName,
    ) -> Result<BinaryName, Error> {
        if first == second {
            return Ok(first.clone());
        }
        let first = self.locate(first)?;
        let second = self.locate(second)?;
        Ok(self.nearest_common_ancestor(&first, &second)?.name)
    }

    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        if *name == BinaryName::OBJECT {
            Ok(ClassDescriptor::object())
        } else {
            self.locator.locate(name)
        }
    }
}

impl<'l> SuperClassResolver for CommonAncestorResolver<'l> {
    fn common_super_class(
        &self,
        first: &BinaryName,
        second: &BinaryName,
    ) -> Result<BinaryName, Error> {
        CommonAncestorResolver::common_super_class(self, first, second)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::DefinedClassesLocator;
    use crate::jvm::Name;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn class(class: &str, super_class: &str, interfaces: &[&str]) -> ClassDescriptor {
        ClassDescriptor::new(
            name(class),
            name(super_class),
            interfaces.iter().map(|i| name(i)).collect(),
            false,
        )
    }

    fn interface(interface: &str, interfaces: &[&str]) -> ClassDescriptor {
        ClassDescriptor::new(
            name(interface),
            BinaryName::OBJECT,
            interfaces.iter().map(|i| name(i)).collect(),
            true,
        )
    }

    /// Counts lookups on their way through
    struct Counting<L> {
        inner: L,
        lookups: AtomicUsize,
    }

    impl<L: DescriptorLocator> DescriptorLocator for Counting<L> {
        fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
            self.lookups.fetch_add(1, Ordering::Relaxed);
            self.inner.locate(name)
        }
    }

    ///  Object
    ///    ├── View ── TextView ── Button ── CheckBox
    ///    │             └── EditText (implements Editable)
    ///    └── Drawable (implements Callback)
    ///
    ///  Editable extends CharSequence, Spannable extends Editable
    fn hierarchy() -> Counting<DefinedClassesLocator> {
        let locator = DefinedClassesLocator::new();
        locator.register(class("ui/View", "java/lang/Object", &[]));
        locator.register(class("ui/TextView", "ui/View", &[]));
        locator.register(class("ui/Button", "ui/TextView", &[]));
        locator.register(class("ui/CheckBox", "ui/Button", &[]));
        locator.register(class("ui/EditText", "ui/TextView", &["ui/Spannable"]));
        locator.register(class("ui/Drawable", "java/lang/Object", &["ui/Callback"]));
        locator.register(interface("ui/Editable", &["java/lang/CharSequence"]));
        locator.register(interface("ui/Spannable", &["ui/Editable"]));
        locator.register(interface("ui/Callback", &[]));
        locator.register(interface("java/lang/CharSequence", &[]));
        Counting {
            inner: locator,
            lookups: AtomicUsize::new(0),
        }
    }

    fn common(locator: &dyn DescriptorLocator, first: &str, second: &str) -> String {
        CommonAncestorResolver::new(locator)
            .common_super_class(&name(first), &name(second))
            .unwrap()
            .to_string()
    }

    #[test]
    fn subclasses_meet_at_the_super_class() {
        let locator = hierarchy();
        assert_eq!(common(&locator, "ui/CheckBox", "ui/TextView"), "ui/TextView");
        assert_eq!(common(&locator, "ui/View", "ui/Button"), "ui/View");
        assert_eq!(common(&locator, "ui/Button", "ui/Button"), "ui/Button");
    }

    #[test]
    fn siblings_meet_at_the_shared_ancestor() {
        let locator = hierarchy();
        assert_eq!(common(&locator, "ui/CheckBox", "ui/EditText"), "ui/TextView");
        assert_eq!(common(&locator, "ui/Button", "ui/Drawable"), "java/lang/Object");
    }

    #[test]
    fn implemented_interfaces_are_ancestors() {
        let locator = hierarchy();

        // Transitively, through super interfaces
        assert_eq!(common(&locator, "ui/EditText", "ui/Editable"), "ui/Editable");
        assert_eq!(
            common(&locator, "java/lang/CharSequence", "ui/EditText"),
            "java/lang/CharSequence"
        );

        // Not implemented
        assert_eq!(common(&locator, "ui/Button", "ui/Callback"), "java/lang/Object");
    }

    #[test]
    fn unrelated_interfaces_meet_at_object() {
        let locator = hierarchy();
        assert_eq!(common(&locator, "ui/Callback", "ui/Editable"), "java/lang/Object");
    }

    #[test]
    fn object_needs_no_lookups() {
        let locator = hierarchy();
        assert_eq!(common(&locator, "java/lang/Object", "ui/Button"), "java/lang/Object");
        assert_eq!(common(&locator, "ui/Button", "java/lang/Object"), "java/lang/Object");
        assert_eq!(locator.lookups.load(Ordering::Relaxed), 1 + 1);
    }

    #[test]
    fn lookups_stop_at_the_answer() {
        let locator = hierarchy();
        let button = locator.locate(&name("ui/Button")).unwrap();
        let text_view = locator.locate(&name("ui/TextView")).unwrap();
        locator.lookups.store(0, Ordering::Relaxed);
        let ancestor = nearest_common_ancestor(&text_view, &button, &locator).unwrap();
        assert_eq!(ancestor, text_view);

        // `Button`'s super class is `TextView`, so one lookup is enough
        assert_eq!(locator.lookups.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn missing_classes_are_reported() {
        let locator = hierarchy();
        let resolver = CommonAncestorResolver::new(&locator);
        assert!(matches!(
            resolver.common_super_class(&name("ui/Button"), &name("ui/Missing")),
            Err(Error::ClassNotFound(_))
        ));
    }

    #[test]
    fn cycles_are_malformed() {
        let locator = DefinedClassesLocator::new();
        locator.register(class("a/A", "a/B", &[]));
        locator.register(class("a/B", "a/A", &[]));
        locator.register(class("a/C", "java/lang/Object", &[]));
        let resolver = CommonAncestorResolver::new(&locator);
        assert!(matches!(
            resolver.common_super_class(&name("a/A"), &name("a/C")),
            Err(Error::Malformed(_))
        ));
    }
}
