use super::{ClassDescriptor, DescriptorLocator};
use crate::jvm::{BinaryName, Error};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Built-in descriptors for commonly merged platform classes
///
/// These are the types which show up most in frames (exceptions in handlers, boxed primitives,
/// collections), so knowing them up front avoids going to disk for the JDK.
#[derive(Default)]
pub struct PlatformLocator;

impl PlatformLocator {
    pub fn new() -> PlatformLocator {
        PlatformLocator
    }

    fn classes() -> &'static HashMap<BinaryName, ClassDescriptor> {
        static CLASSES: OnceLock<HashMap<BinaryName, ClassDescriptor>> = OnceLock::new();
        CLASSES.get_or_init(|| {
            PLATFORM_CLASSES
                .iter()
                .map(|class| {
                    let descriptor = class.descriptor();
                    (descriptor.name.clone(), descriptor)
                })
                .collect()
        })
    }
}

impl DescriptorLocator for PlatformLocator {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, Error> {
        if *name == BinaryName::OBJECT {
            return Ok(ClassDescriptor::object());
        }
        PlatformLocator::classes()
            .get(name)
            .cloned()
            .ok_or_else(|| Error::ClassNotFound(name.clone()))
    }
}

struct PlatformClass {
    name: &'static str,
    super_name: &'static str,
    interfaces: &'static [&'static str],
    is_interface: bool,
}

impl PlatformClass {
    fn descriptor(&self) -> ClassDescriptor {
        ClassDescriptor::new(
            BinaryName::from_static(self.name),
            BinaryName::from_static(self.super_name),
            self.interfaces
                .iter()
                .map(|interface| BinaryName::from_static(interface))
                .collect(),
            self.is_interface,
        )
    }
}

const fn class(
    name: &'static str,
    super_name: &'static str,
    interfaces: &'static [&'static str],
) -> PlatformClass {
    PlatformClass {
        name,
        super_name,
        interfaces,
        is_interface: false,
    }
}

const fn interface(name: &'static str, interfaces: &'static [&'static str]) -> PlatformClass {
    PlatformClass {
        name,
        super_name: OBJECT,
        interfaces,
        is_interface: true,
    }
}

const OBJECT: &str = "java/lang/Object";
const SERIALIZABLE: &str = "java/io/Serializable";
const COMPARABLE: &str = "java/lang/Comparable";

static PLATFORM_CLASSES: &[PlatformClass] = &[
    // java.lang
    interface(COMPARABLE, &[]),
    interface("java/lang/CharSequence", &[]),
    interface("java/lang/Cloneable", &[]),
    interface("java/lang/Runnable", &[]),
    interface("java/lang/Iterable", &[]),
    interface("java/lang/AutoCloseable", &[]),
    interface("java/lang/Appendable", &[]),
    class(
        "java/lang/String",
        OBJECT,
        &[SERIALIZABLE, COMPARABLE, "java/lang/CharSequence"],
    ),
    class(
        "java/lang/AbstractStringBuilder",
        OBJECT,
        &["java/lang/Appendable", "java/lang/CharSequence"],
    ),
    class(
        "java/lang/StringBuilder",
        "java/lang/AbstractStringBuilder",
        &[SERIALIZABLE, "java/lang/CharSequence"],
    ),
    class("java/lang/Class", OBJECT, &[SERIALIZABLE]),
    class("java/lang/Thread", OBJECT, &["java/lang/Runnable"]),
    class("java/lang/ThreadLocal", OBJECT, &[]),
    class("java/lang/Enum", OBJECT, &[COMPARABLE, SERIALIZABLE]),
    class("java/lang/Record", OBJECT, &[]),
    class("java/lang/Number", OBJECT, &[SERIALIZABLE]),
    class("java/lang/Boolean", OBJECT, &[SERIALIZABLE, COMPARABLE]),
    class("java/lang/Character", OBJECT, &[SERIALIZABLE, COMPARABLE]),
    class("java/lang/Byte", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Short", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Integer", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Long", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Float", "java/lang/Number", &[COMPARABLE]),
    class("java/lang/Double", "java/lang/Number", &[COMPARABLE]),
    // Exceptions
    class("java/lang/Throwable", OBJECT, &[SERIALIZABLE]),
    class("java/lang/Exception", "java/lang/Throwable", &[]),
    class("java/lang/Error", "java/lang/Throwable", &[]),
    class("java/lang/RuntimeException", "java/lang/Exception", &[]),
    class("java/lang/ReflectiveOperationException", "java/lang/Exception", &[]),
    class(
        "java/lang/ClassNotFoundException",
        "java/lang/ReflectiveOperationException",
        &[],
    ),
    class("java/lang/InterruptedException", "java/lang/Exception", &[]),
    class("java/lang/CloneNotSupportedException", "java/lang/Exception", &[]),
    class("java/lang/IllegalArgumentException", "java/lang/RuntimeException", &[]),
    class(
        "java/lang/NumberFormatException",
        "java/lang/IllegalArgumentException",
        &[],
    ),
    class("java/lang/IllegalStateException", "java/lang/RuntimeException", &[]),
    class("java/lang/NullPointerException", "java/lang/RuntimeException", &[]),
    class("java/lang/ClassCastException", "java/lang/RuntimeException", &[]),
    class("java/lang/ArithmeticException", "java/lang/RuntimeException", &[]),
    class("java/lang/SecurityException", "java/lang/RuntimeException", &[]),
    class(
        "java/lang/UnsupportedOperationException",
        "java/lang/RuntimeException",
        &[],
    ),
    class("java/lang/IndexOutOfBoundsException", "java/lang/RuntimeException", &[]),
    class(
        "java/lang/ArrayIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
        &[],
    ),
    class(
        "java/lang/StringIndexOutOfBoundsException",
        "java/lang/IndexOutOfBoundsException",
        &[],
    ),
    class("java/lang/LinkageError", "java/lang/Error", &[]),
    class("java/lang/AssertionError", "java/lang/Error", &[]),
    class("java/lang/VirtualMachineError", "java/lang/Error", &[]),
    class("java/lang/OutOfMemoryError", "java/lang/VirtualMachineError", &[]),
    class("java/lang/StackOverflowError", "java/lang/VirtualMachineError", &[]),
    class("java/lang/NoClassDefFoundError", "java/lang/LinkageError", &[]),
    class("java/io/IOException", "java/lang/Exception", &[]),
    class("java/io/FileNotFoundException", "java/io/IOException", &[]),
    class("java/io/UncheckedIOException", "java/lang/RuntimeException", &[]),
    class(
        "java/util/NoSuchElementException",
        "java/lang/RuntimeException",
        &[],
    ),
    class(
        "java/util/ConcurrentModificationException",
        "java/lang/RuntimeException",
        &[],
    ),
    // java.io
    interface(SERIALIZABLE, &[]),
    interface("java/io/Closeable", &["java/lang/AutoCloseable"]),
    interface("java/io/Flushable", &[]),
    class("java/io/InputStream", OBJECT, &["java/io/Closeable"]),
    class(
        "java/io/OutputStream",
        OBJECT,
        &["java/io/Closeable", "java/io/Flushable"],
    ),
    class(
        "java/io/Reader",
        OBJECT,
        &["java/lang/Readable", "java/io/Closeable"],
    ),
    class(
        "java/io/Writer",
        OBJECT,
        &["java/lang/Appendable", "java/io/Closeable", "java/io/Flushable"],
    ),
    interface("java/lang/Readable", &[]),
    // java.util
    interface("java/util/Collection", &["java/lang/Iterable"]),
    interface("java/util/List", &["java/util/Collection"]),
    interface("java/util/Set", &["java/util/Collection"]),
    interface("java/util/Queue", &["java/util/Collection"]),
    interface("java/util/Deque", &["java/util/Queue"]),
    interface("java/util/Map", &[]),
    interface("java/util/Iterator", &[]),
    interface("java/util/RandomAccess", &[]),
    class("java/util/AbstractCollection", OBJECT, &["java/util/Collection"]),
    class(
        "java/util/AbstractList",
        "java/util/AbstractCollection",
        &["java/util/List"],
    ),
    class(
        "java/util/ArrayList",
        "java/util/AbstractList",
        &[
            "java/util/List",
            "java/util/RandomAccess",
            "java/lang/Cloneable",
            SERIALIZABLE,
        ],
    ),
    class(
        "java/util/AbstractSequentialList",
        "java/util/AbstractList",
        &[],
    ),
    class(
        "java/util/LinkedList",
        "java/util/AbstractSequentialList",
        &[
            "java/util/List",
            "java/util/Deque",
            "java/lang/Cloneable",
            SERIALIZABLE,
        ],
    ),
    class(
        "java/util/AbstractSet",
        "java/util/AbstractCollection",
        &["java/util/Set"],
    ),
    class(
        "java/util/HashSet",
        "java/util/AbstractSet",
        &["java/util/Set", "java/lang/Cloneable", SERIALIZABLE],
    ),
    class("java/util/AbstractMap", OBJECT, &["java/util/Map"]),
    class(
        "java/util/HashMap",
        "java/util/AbstractMap",
        &["java/util/Map", "java/lang/Cloneable", SERIALIZABLE],
    ),
    class(
        "java/util/LinkedHashMap",
        "java/util/HashMap",
        &["java/util/Map"],
    ),
    // java.lang.invoke
    class("java/lang/invoke/MethodHandle", OBJECT, &[]),
    class("java/lang/invoke/MethodType", OBJECT, &[SERIALIZABLE]),
    class("java/lang/invoke/MethodHandles", OBJECT, &[]),
    class("java/lang/invoke/MethodHandles$Lookup", OBJECT, &[]),
    class("java/lang/invoke/CallSite", OBJECT, &[]),
    class(
        "java/lang/invoke/ConstantCallSite",
        "java/lang/invoke/CallSite",
        &[],
    ),
];

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_graph::CommonAncestorResolver;
    use crate::jvm::Name;

    fn common(first: &str, second: &str) -> String {
        CommonAncestorResolver::new(&PlatformLocator)
            .common_super_class(
                &BinaryName::from_str(first).unwrap(),
                &BinaryName::from_str(second).unwrap(),
            )
            .unwrap()
            .to_string()
    }

    #[test]
    fn every_super_class_is_known() {
        for class in PLATFORM_CLASSES {
            let descriptor = class.descriptor();
            assert!(
                PlatformLocator.locate(&descriptor.super_name).is_ok(),
                "super class of {}",
                class.name
            );
            for interface in &descriptor.interfaces {
                let interface = PlatformLocator.locate(interface).unwrap();
                assert!(interface.is_interface, "{} of {}", interface.name, class.name);
            }
        }
    }

    #[test]
    fn common_platform_merges() {
        assert_eq!(
            common("java/lang/IllegalStateException", "java/lang/NullPointerException"),
            "java/lang/RuntimeException"
        );
        assert_eq!(
            common("java/io/IOException", "java/lang/RuntimeException"),
            "java/lang/Exception"
        );
        assert_eq!(
            common("java/lang/Integer", "java/lang/Long"),
            "java/lang/Number"
        );
        assert_eq!(
            common("java/util/ArrayList", "java/util/LinkedList"),
            "java/util/AbstractList"
        );
        assert_eq!(
            common("java/util/List", "java/util/ArrayList"),
            "java/util/List"
        );
        assert_eq!(
            common("java/lang/String", "java/lang/StringBuilder"),
            "java/lang/Object"
        );
    }
}
