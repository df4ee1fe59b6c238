use super::{Error, RemappingVisitor};
use crate::jvm::{BinaryName, ClassVisitor, Name};

type PrefixMap = dyn Fn(&BinaryName) -> Option<BinaryName> + Send + Sync;

/// Move classes under a new root package
///
/// Every internal name starting with one of the configured prefixes gets the new prefix prepended
/// (so `lib/Foo` becomes `shaded/lib/Foo` for prefix `lib/` and new prefix `shaded/`). The new
/// prefix may not itself start with a configured prefix, which makes repackaging idempotent.
pub struct Repackage {
    prefixes: Vec<String>,
    new_prefix: String,
    map: Box<PrefixMap>,
}

impl Repackage {
    pub fn new(mut prefixes: Vec<String>, new_prefix: String) -> Result<Repackage, Error> {
        let valid_prefix = |prefix: &str| {
            prefix.ends_with('/') && BinaryName::check_valid(&prefix[..prefix.len() - 1]).is_ok()
        };
        if !valid_prefix(&new_prefix) {
            return Err(Error::InvalidSetting(format!(
                "new package prefix '{}' should be a package name ending in '/'",
                new_prefix
            )));
        }
        for prefix in &prefixes {
            if prefix.is_empty() || BinaryName::check_valid(prefix.trim_end_matches('/')).is_err() {
                return Err(Error::InvalidSetting(format!(
                    "'{}' is not a valid class name prefix",
                    prefix
                )));
            }
            if new_prefix.starts_with(prefix.as_str()) {
                return Err(Error::InvalidSetting(format!(
                    "new package prefix '{}' is itself matched by prefix '{}'",
                    new_prefix, prefix
                )));
            }
        }
        prefixes.sort();
        prefixes.dedup();

        let map = {
            let prefixes = prefixes.clone();
            let new_prefix = new_prefix.clone();
            move |name: &BinaryName| -> Option<BinaryName> {
                prefixes
                    .iter()
                    .any(|prefix| name.as_str().starts_with(prefix.as_str()))
                    .then(|| name.with_prefix(&new_prefix))
            }
        };
        Ok(Repackage {
            prefixes,
            new_prefix,
            map: Box::new(map),
        })
    }

    pub fn key(&self) -> String {
        format!("repackage:{}:{}", self.new_prefix, self.prefixes.join(","))
    }

    /// New name of a class (`None` if it keeps its name)
    pub fn rename(&self, name: &BinaryName) -> Option<BinaryName> {
        (self.map)(name)
    }

    /// Name a repackaged class had before (`None` if the name was never produced by this pass)
    pub fn original(&self, name: &BinaryName) -> Option<BinaryName> {
        let stripped = name.as_str().strip_prefix(self.new_prefix.as_str())?;
        self.prefixes
            .iter()
            .any(|prefix| stripped.starts_with(prefix.as_str()))
            .then(|| BinaryName::from_str(stripped).ok())
            .flatten()
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(RemappingVisitor::new(&*self.map, next))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::model::{ClassHeader, ClassNode, FieldNode};
    use crate::jvm::{
        ClassAccessFlags, ClassCollector, FieldAccessFlags, FieldType, UnqualifiedName,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn repackage() -> Repackage {
        Repackage::new(vec![String::from("lib/")], String::from("shaded/")).unwrap()
    }

    fn apply(pass: &Repackage, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn renames_matching_classes() {
        let pass = repackage();
        assert_eq!(pass.rename(&name("lib/Foo")), Some(name("shaded/lib/Foo")));
        assert_eq!(pass.rename(&name("library/Foo")), None);
        assert_eq!(pass.rename(&name("shaded/lib/Foo")), None);
        assert_eq!(pass.original(&name("shaded/lib/Foo")), Some(name("lib/Foo")));
        assert_eq!(pass.original(&name("shaded/other/Foo")), None);
        assert_eq!(pass.original(&name("lib/Foo")), None);
    }

    #[test]
    fn repackaging_is_idempotent() {
        let pass = repackage();
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            name("lib/Foo"),
            Some(name("lib/Base")),
        ));
        class.fields.push(FieldNode::new(
            FieldAccessFlags::PRIVATE,
            UnqualifiedName::from_str("next").unwrap(),
            FieldType::object(name("lib/Foo")),
        ));

        let once = apply(&pass, class);
        assert_eq!(once.header.name, name("shaded/lib/Foo"));
        assert_eq!(once.header.super_name, Some(name("shaded/lib/Base")));
        assert_eq!(once.fields[0].descriptor, FieldType::object(name("shaded/lib/Foo")));
        assert_eq!(apply(&pass, once.clone()), once);
    }

    #[test]
    fn invalid_prefixes() {
        assert!(Repackage::new(vec![String::from("lib/")], String::from("shaded")).is_err());
        assert!(Repackage::new(vec![String::from("lib/")], String::from("lib/shaded/")).is_err());
        assert!(Repackage::new(vec![String::new()], String::from("shaded/")).is_err());
    }

    #[test]
    fn keys_ignore_prefix_order() {
        let first = Repackage::new(
            vec![String::from("a/"), String::from("b/")],
            String::from("x/"),
        )
        .unwrap();
        let second = Repackage::new(
            vec![String::from("b/"), String::from("a/"), String::from("a/")],
            String::from("x/"),
        )
        .unwrap();
        assert_eq!(first.key(), second.key());
    }
}
