use std::borrow::Cow;
use std::fmt::{Debug, Display, Error as FmtError, Formatter};

/// Names of methods, fields
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.2>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct UnqualifiedName(Cow<'static, str>);

/// Names of classes and interfaces, in their internal form (`java/lang/Object`)
///
/// See <https://docs.oracle.com/javase/specs/jvms/se16/html/jvms-4.html#jvms-4.2.1>
#[derive(Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BinaryName(Cow<'static, str>);

impl AsRef<str> for UnqualifiedName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

impl AsRef<str> for BinaryName {
    fn as_ref(&self) -> &str {
        self.0.as_ref()
    }
}

pub trait Name: Sized {
    /// Check if a string would be a valid name
    fn check_valid(name: impl AsRef<str>) -> Result<(), String>;

    /// Extract the raw underlying string data
    fn as_cow(&self) -> &Cow<'static, str>;

    /// Extract the raw underlying string name
    fn as_str(&self) -> &str {
        self.as_cow().as_ref()
    }

    /// Try to construct a name from a string
    fn from_string(name: String) -> Result<Self, String>;

    /// Try to construct a name from a string slice
    fn from_str(name: &str) -> Result<Self, String> {
        Self::from_string(name.to_owned())
    }
}

impl Name for UnqualifiedName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.contains(&['.', ';', '[', '/'][..]) {
            Err(format!(
                "Unqualified name '{}' contains an illegal character",
                name
            ))
        } else if name.is_empty() {
            Err(String::from("Unqualified name is empty"))
        } else {
            Ok(())
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(UnqualifiedName(Cow::Owned(name)))
    }
}

impl Name for BinaryName {
    fn check_valid(name: impl AsRef<str>) -> Result<(), String> {
        let name = name.as_ref();
        if name.is_empty() {
            Err(String::from("Binary name is empty"))
        } else {
            name.split('/').try_for_each(UnqualifiedName::check_valid)
        }
    }

    fn as_cow(&self) -> &Cow<'static, str> {
        &self.0
    }

    fn from_string(name: String) -> Result<Self, String> {
        Self::check_valid(&name)?;
        Ok(BinaryName(Cow::Owned(name)))
    }
}

impl Debug for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Debug for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for UnqualifiedName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl Display for BinaryName {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result<(), FmtError> {
        f.write_str(self.0.as_ref())
    }
}

impl UnqualifiedName {
    /// Concatenate the contents of two unqualified names to produce a third
    pub fn concat(&self, suffix: &str) -> UnqualifiedName {
        UnqualifiedName(Cow::Owned(format!("{}{}", self.as_str(), suffix)))
    }

    /// Is this one of the two special initializer names?
    pub fn is_initializer(&self) -> bool {
        *self == UnqualifiedName::INIT || *self == UnqualifiedName::CLINIT
    }

    const fn name(value: &'static str) -> UnqualifiedName {
        UnqualifiedName(Cow::Borrowed(value))
    }

    /// Name from a string known ahead of time to be valid
    pub(crate) const fn from_static(value: &'static str) -> UnqualifiedName {
        UnqualifiedName::name(value)
    }

    // Special unqualified names - only these are allowed to have angle brackets in them
    pub const INIT: Self = Self::name("<init>");
    pub const CLINIT: Self = Self::name("<clinit>");

    // JDK names
    pub const BOOLEANVALUE: Self = Self::name("booleanValue");
    pub const BYTEVALUE: Self = Self::name("byteValue");
    pub const CHARVALUE: Self = Self::name("charValue");
    pub const CONTAINS: Self = Self::name("contains");
    pub const DOUBLEVALUE: Self = Self::name("doubleValue");
    pub const FLOATVALUE: Self = Self::name("floatValue");
    pub const INTVALUE: Self = Self::name("intValue");
    pub const LONGVALUE: Self = Self::name("longValue");
    pub const SHORTVALUE: Self = Self::name("shortValue");
    pub const STARTSWITH: Self = Self::name("startsWith");
    pub const VALUEOF: Self = Self::name("valueOf");
}

impl BinaryName {
    /// Join segments from the other name onto the end of this binary name
    pub fn join(&self, other: impl Name) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}/{}", self.as_str(), other.as_str())))
    }

    /// Prepend a package prefix (which should end in `/`) to this name
    pub fn with_prefix(&self, prefix: &str) -> BinaryName {
        BinaryName(Cow::Owned(format!("{}{}", prefix, self.as_str())))
    }

    /// Package portion of the name (everything before the last `/`, empty for the default
    /// package)
    pub fn package(&self) -> &str {
        match self.as_str().rfind('/') {
            Some(idx) => &self.as_str()[..idx],
            None => "",
        }
    }

    const fn name(value: &'static str) -> BinaryName {
        BinaryName(Cow::Borrowed(value))
    }

    /// Name from a string known ahead of time to be valid
    pub(crate) const fn from_static(value: &'static str) -> BinaryName {
        BinaryName::name(value)
    }

    // JDK names
    pub const BOOLEAN: Self = Self::name("java/lang/Boolean");
    pub const BYTE: Self = Self::name("java/lang/Byte");
    pub const CHARACTER: Self = Self::name("java/lang/Character");
    pub const CHARSEQUENCE: Self = Self::name("java/lang/CharSequence");
    pub const CLASS: Self = Self::name("java/lang/Class");
    pub const CLONEABLE: Self = Self::name("java/lang/Cloneable");
    pub const DOUBLE: Self = Self::name("java/lang/Double");
    pub const ERROR: Self = Self::name("java/lang/Error");
    pub const EXCEPTION: Self = Self::name("java/lang/Exception");
    pub const FLOAT: Self = Self::name("java/lang/Float");
    pub const INTEGER: Self = Self::name("java/lang/Integer");
    pub const LONG: Self = Self::name("java/lang/Long");
    pub const METHODHANDLE: Self = Self::name("java/lang/invoke/MethodHandle");
    pub const METHODTYPE: Self = Self::name("java/lang/invoke/MethodType");
    pub const NUMBER: Self = Self::name("java/lang/Number");
    pub const OBJECT: Self = Self::name("java/lang/Object");
    pub const RUNTIMEEXCEPTION: Self = Self::name("java/lang/RuntimeException");
    pub const SERIALIZABLE: Self = Self::name("java/io/Serializable");
    pub const SHORT: Self = Self::name("java/lang/Short");
    pub const STRING: Self = Self::name("java/lang/String");
    pub const THREADLOCAL: Self = Self::name("java/lang/ThreadLocal");
    pub const THROWABLE: Self = Self::name("java/lang/Throwable");
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn binary_name_validation() {
        assert!(BinaryName::from_str("java/lang/Object").is_ok());
        assert!(BinaryName::from_str("Outer$Inner").is_ok());
        assert!(BinaryName::from_str("").is_err());
        assert!(BinaryName::from_str("java//Object").is_err());
        assert!(BinaryName::from_str("java.lang.Object").is_err());
        assert!(BinaryName::from_str("[I").is_err());
    }

    #[test]
    fn packages_and_prefixes() {
        let name = BinaryName::from_str("com/example/Widget").unwrap();
        assert_eq!(name.package(), "com/example");
        assert_eq!(
            name.with_prefix("shaded/").as_str(),
            "shaded/com/example/Widget"
        );
        assert_eq!(BinaryName::from_str("Widget").unwrap().package(), "");
    }

    #[test]
    fn initializer_names() {
        assert!(UnqualifiedName::INIT.is_initializer());
        assert!(UnqualifiedName::CLINIT.is_initializer());
        assert!(!UnqualifiedName::VALUEOF.is_initializer());
        assert_eq!(
            UnqualifiedName::from_str("onDraw").unwrap().concat("$original").as_str(),
            "onDraw$original"
        );
    }
}
