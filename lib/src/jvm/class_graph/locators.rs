use super::{ClassDescriptor, DescriptorLocator};
use crate::jvm::reader::ClassReader;
use crate::jvm::{BinaryName, Error, Name};
use dashmap::{DashMap, DashSet};
use elsa::sync::FrozenMap;
use log::{debug, warn};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

/// Source of raw class file bytes
pub trait ClassBytesProvider: Send + Sync {
    /// Bytes of the class file for a class (`None` if the provider has no such class)
    fn class_bytes(&self, name: &BinaryName) -> Result<Option<Vec<u8>>, Error>;
}

/// Class files laid out in a directory tree, one per class (`a/b/C.class`)
pub struct ClassDirectory {
    root: PathBuf,
}

impl ClassDirectory {
    pub fn new(root: impl Into<PathBuf>) -> ClassDirectory {
        ClassDirectory { root: root.into() }
    }
}

impl ClassBytesProvider for ClassDirectory {
    fn class_bytes(&self, name: &BinaryName) -> Result<Option<Vec<u8>>, Error> {
        let mut path = self.root.clone();
        path.extend(name.as_str().split('/'));
        path.set_extension("class");
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(Error::IoError(err)),
        }
    }
}

impl ClassBytesProvider for HashMap<BinaryName, Vec<u8>> {
    fn class_bytes(&self, name: &BinaryName) -> Result<Option<Vec<u8>>, Error> {
        Ok(self.get(name).cloned())
    }
}

/// Locator which reads just the header of class files
pub struct ClassBytesLocator<P> {
    provider: P,
}

impl<P: ClassBytesProvider> ClassBytesLocator<P> {
    pub fn new(provider: P) -> ClassBytesLocator<P> {
        ClassBytesLocator { provider }
    }
}

impl<P: ClassBytesProvider> DescriptorLocator for ClassBytesLocator<P> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        let bytes = self
            .provider
            .class_bytes(name)?
            .ok_or_else(|| Error::ClassNotFound(name.clone()))?;
        let descriptor = ClassReader::descriptor(&bytes)?;
        if descriptor.name != *name {
            return Err(Error::Malformed(format!(
                "class file for {} declares {}",
                name, descriptor.name
            )));
        }
        Ok(descriptor)
    }
}

/// Registry of classes which have already been defined
///
/// Once a class is defined, its bytes are usually gone but its position in the hierarchy is
/// still needed when merging types in classes defined later.
#[derive(Default)]
pub struct DefinedClassesLocator {
    classes: DashMap<BinaryName, ClassDescriptor>,
}

impl DefinedClassesLocator {
    pub fn new() -> DefinedClassesLocator {
        DefinedClassesLocator::default()
    }

    /// Register a class (replacing any previous registration under the same name)
    pub fn register(&self, descriptor: ClassDescriptor) {
        self.classes.insert(descriptor.name.clone(), descriptor);
    }

    pub fn unregister(&self, name: &BinaryName) -> Option<ClassDescriptor> {
        self.classes.remove(name).map(|(_, descriptor)| descriptor)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl DescriptorLocator for DefinedClassesLocator {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        self.classes
            .get(name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| Error::ClassNotFound(name.clone()))
    }
}

/// Locators consulted in order, until one of them knows about the class
#[derive(Default)]
pub struct ChainedLocator {
    locators: Vec<Box<dyn DescriptorLocator>>,
}

impl ChainedLocator {
    pub fn new(locators: Vec<Box<dyn DescriptorLocator>>) -> ChainedLocator {
        ChainedLocator { locators }
    }

    /// Add a locator to the end of the chain
    pub fn then(mut self, locator: impl DescriptorLocator + 'static) -> ChainedLocator {
        self.locators.push(Box::new(locator));
        self
    }
}

impl DescriptorLocator for ChainedLocator {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        for locator in &self.locators {
            match locator.locate(name) {
                Err(Error::ClassNotFound(_)) => continue,
                result => return result,
            }
        }
        Err(Error::ClassNotFound(name.clone()))
    }
}

/// Memoizes every descriptor successfully located
///
/// Entries are never evicted. Lookups in flight on different threads may both reach the inner
/// locator, but only the first answer is kept.
pub struct CachingLocator<L> {
    inner: L,
    cache: FrozenMap<BinaryName, Box<ClassDescriptor>>,
}

impl<L: DescriptorLocator> CachingLocator<L> {
    pub fn new(inner: L) -> CachingLocator<L> {
        CachingLocator {
            inner,
            cache: FrozenMap::new(),
        }
    }
}

impl<L: DescriptorLocator> DescriptorLocator for CachingLocator<L> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        if let Some(descriptor) = self.cache.get(name) {
            return Ok(descriptor.clone());
        }
        let descriptor = self.inner.locate(name)?;
        Ok(self
            .cache
            .insert(name.clone(), Box::new(descriptor))
            .clone())
    }
}

/// Treats every class no one knows about as a direct subclass of `java/lang/Object`
///
/// This makes the locator total, at the cost of merging unknown types too eagerly (which the
/// JVM verifier will then reject at load time, exactly as it would have if the class was really
/// missing).
pub struct FallbackLocator<L> {
    inner: L,
    warned: DashSet<BinaryName>,
}

impl<L: DescriptorLocator> FallbackLocator<L> {
    pub fn new(inner: L) -> FallbackLocator<L> {
        FallbackLocator {
            inner,
            warned: DashSet::new(),
        }
    }
}

impl<L: DescriptorLocator> DescriptorLocator for FallbackLocator<L> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        match self.inner.locate(name) {
            Err(Error::ClassNotFound(missing)) => {
                if self.warned.insert(missing.clone()) {
                    warn!("Cannot locate {}, assuming it extends java/lang/Object", missing);
                }
                Ok(ClassDescriptor::object().renamed(name.clone()))
            }
            result => result,
        }
    }
}

/// Resolves some names through other names
///
/// Useful when the same class is known under two names (eg. once repackaged), but only one of
/// them can be located.
pub struct AliasingLocator<L> {
    inner: L,
    aliases: HashMap<BinaryName, BinaryName>,
}

impl<L: DescriptorLocator> AliasingLocator<L> {
    pub fn new(inner: L, aliases: HashMap<BinaryName, BinaryName>) -> AliasingLocator<L> {
        AliasingLocator { inner, aliases }
    }
}

impl<L: DescriptorLocator> DescriptorLocator for AliasingLocator<L> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        match self.aliases.get(name) {
            Some(target) => {
                debug!("Locating {} through {}", name, target);
                Ok(self.inner.locate(target)?.renamed(name.clone()))
            }
            None => self.inner.locate(name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::ObjectLocator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn defined(classes: &[(&str, &str)]) -> DefinedClassesLocator {
        let locator = DefinedClassesLocator::new();
        for (class, super_class) in classes {
            locator.register(ClassDescriptor::new(
                name(class),
                name(super_class),
                vec![],
                false,
            ));
        }
        locator
    }

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

    #[test]
    fn object_locator_never_fails() {
        let descriptor = ObjectLocator.locate(&name("a/Anything")).unwrap();
        assert!(descriptor.is_object());
    }

    #[test]
    fn defined_classes_can_be_unregistered() {
        let locator = defined(&[("a/A", "java/lang/Object")]);
        assert_eq!(locator.len(), 1);
        assert_eq!(locator.locate(&name("a/A")).unwrap().name, name("a/A"));
        assert!(locator.unregister(&name("a/A")).is_some());
        assert!(matches!(
            locator.locate(&name("a/A")),
            Err(Error::ClassNotFound(_))
        ));
        assert!(locator.is_empty());
    }

    #[test]
    fn chains_stop_at_the_first_answer() {
        let chain = ChainedLocator::default()
            .then(defined(&[("a/A", "a/Base")]))
            .then(defined(&[("a/A", "a/Other"), ("a/B", "a/Base")]));
        assert_eq!(chain.locate(&name("a/A")).unwrap().super_name, name("a/Base"));
        assert_eq!(chain.locate(&name("a/B")).unwrap().super_name, name("a/Base"));
        assert!(matches!(
            chain.locate(&name("a/C")),
            Err(Error::ClassNotFound(missing)) if missing == name("a/C")
        ));
    }

    #[test]
    fn caches_only_hit_the_inner_locator_once() {
        let locator = CachingLocator::new(Counting {
            inner: defined(&[("a/A", "java/lang/Object")]),
            lookups: AtomicUsize::new(0),
        });
        for _ in 0..3 {
            assert_eq!(locator.locate(&name("a/A")).unwrap().name, name("a/A"));
        }
        assert_eq!(locator.inner.lookups.load(Ordering::Relaxed), 1);

        // Failures are not cached
        assert!(locator.locate(&name("a/B")).is_err());
        assert!(locator.locate(&name("a/B")).is_err());
        assert_eq!(locator.inner.lookups.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn fallback_makes_unknown_classes_objects() {
        let locator = FallbackLocator::new(defined(&[("a/A", "a/Base")]));
        assert_eq!(locator.locate(&name("a/A")).unwrap().super_name, name("a/Base"));
        let unknown = locator.locate(&name("a/Unknown")).unwrap();
        assert_eq!(unknown.name, name("a/Unknown"));
        assert_eq!(unknown.super_name, BinaryName::OBJECT);
        assert!(!unknown.is_object());
        assert!(!unknown.is_interface);
    }

    #[test]
    fn aliases_are_renamed() {
        let aliases = HashMap::from([(name("b/Widget"), name("a/Widget"))]);
        let locator = AliasingLocator::new(defined(&[("a/Widget", "a/View")]), aliases);
        let widget = locator.locate(&name("b/Widget")).unwrap();
        assert_eq!(widget.name, name("b/Widget"));
        assert_eq!(widget.super_name, name("a/View"));
        assert_eq!(locator.locate(&name("a/Widget")).unwrap().name, name("a/Widget"));
    }

    #[test]
    fn missing_class_bytes_are_not_found() {
        let locator = ClassBytesLocator::new(HashMap::<BinaryName, Vec<u8>>::new());
        assert!(matches!(
            locator.locate(&name("a/A")),
            Err(Error::ClassNotFound(_))
        ));

        let directory = ClassBytesLocator::new(ClassDirectory::new("/nonexistent/classes"));
        assert!(matches!(
            directory.locate(&name("a/A")),
            Err(Error::ClassNotFound(_))
        ));
    }
}
