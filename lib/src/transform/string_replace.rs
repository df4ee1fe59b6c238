use super::{digest, Error};
use crate::jvm::code::Instruction;
use crate::jvm::model::{ClassHeader, CodeElement, ConstantValue, FieldNode, MethodNode};
use crate::jvm::{self, BinaryName, ClassVisitor, FieldAccessFlags, Name};
use log::trace;
use std::collections::BTreeMap;

/// Replace string constants, per declaring class
///
/// Only exact matches of a whole constant are replaced: strings loaded with `ldc` and the initial
/// values of static fields. Strings built at runtime are out of reach.
pub struct StringReplace {
    table: BTreeMap<BinaryName, BTreeMap<String, String>>,
}

impl StringReplace {
    pub fn new(table: BTreeMap<BinaryName, BTreeMap<String, String>>) -> StringReplace {
        StringReplace { table }
    }

    /// Table keyed by class names in internal form (`com/example/Foo`)
    pub fn from_names<'s>(
        table: impl IntoIterator<Item = (&'s str, Vec<(&'s str, &'s str)>)>,
    ) -> Result<StringReplace, Error> {
        let mut parsed: BTreeMap<BinaryName, BTreeMap<String, String>> = BTreeMap::new();
        for (class, replacements) in table {
            let class = BinaryName::from_str(class).map_err(Error::InvalidSetting)?;
            parsed.entry(class).or_default().extend(
                replacements
                    .into_iter()
                    .map(|(old, new)| (old.to_owned(), new.to_owned())),
            );
        }
        Ok(StringReplace::new(parsed))
    }

    pub fn key(&self) -> String {
        let entries = self.table.iter().flat_map(|(class, replacements)| {
            replacements
                .iter()
                .flat_map(move |(old, new)| [class.as_str(), old.as_str(), new.as_str()])
        });
        format!("string-replace:{}", digest(entries))
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(StringReplaceVisitor {
            pass: self,
            next,
            replacements: None,
        })
    }
}

struct StringReplaceVisitor<'a> {
    pass: &'a StringReplace,
    next: Box<dyn ClassVisitor + 'a>,

    /// Replacements for the class being visited
    replacements: Option<&'a BTreeMap<String, String>>,
}

impl<'a> StringReplaceVisitor<'a> {
    fn replace(&self, value: &mut ConstantValue) {
        if let (Some(replacements), ConstantValue::String(string)) = (self.replacements, value) {
            if let Some(replacement) = replacements.get(string.as_str()) {
                trace!("Replacing string constant {:?} with {:?}", string, replacement);
                *string = replacement.clone();
            }
        }
    }
}

impl<'a> ClassVisitor for StringReplaceVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.replacements = self.pass.table.get(&header.name);
        self.next.visit_header(header)
    }

    fn visit_field(&mut self, mut field: FieldNode) -> Result<(), jvm::Error> {
        if field.access_flags.contains(FieldAccessFlags::STATIC) {
            if let Some(value) = &mut field.constant_value {
                self.replace(value);
            }
        }
        self.next.visit_field(field)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        if self.replacements.is_some() {
            if let Some(code) = &mut method.code {
                for element in &mut code.elements {
                    if let CodeElement::Instruction(Instruction::Ldc(value)) = element {
                        self.replace(value);
                    }
                }
            }
        }
        self.next.visit_method(method)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::BranchInstruction;
    use crate::jvm::model::{ClassNode, Code, MethodHeader};
    use crate::jvm::{
        ClassAccessFlags, ClassCollector, FieldType, MethodAccessFlags, MethodDescriptor,
        UnqualifiedName,
    };

    fn class(name: &str) -> ClassNode {
        let mut class = ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            BinaryName::from_str(name).unwrap(),
            Some(BinaryName::OBJECT),
        ));
        let mut field = FieldNode::new(
            FieldAccessFlags::STATIC | FieldAccessFlags::FINAL,
            UnqualifiedName::from_str("GREETING").unwrap(),
            FieldType::object(BinaryName::STRING),
        );
        field.constant_value = Some(ConstantValue::String(String::from("old")));
        class.fields.push(field);

        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("greeting").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::Ldc(ConstantValue::String(String::from(
                    "old",
                )))),
                CodeElement::Branch(BranchInstruction::AReturn),
            ],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    fn apply(pass: &StringReplace, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn replaces_constants_of_listed_class() {
        let pass = StringReplace::from_names([("ClassX", vec![("old", "new")])]).unwrap();
        let replaced = apply(&pass, class("ClassX"));
        let new = ConstantValue::String(String::from("new"));
        assert_eq!(replaced.fields[0].constant_value, Some(new.clone()));
        assert_eq!(
            replaced.methods[0].code.as_ref().unwrap().elements[0],
            CodeElement::Instruction(Instruction::Ldc(new))
        );
    }

    #[test]
    fn other_classes_are_untouched() {
        let pass = StringReplace::from_names([("ClassX", vec![("old", "new")])]).unwrap();
        let original = class("ClassY");
        assert_eq!(apply(&pass, original.clone()), original);
    }

    #[test]
    fn keys_follow_table() {
        let first = StringReplace::from_names([("ClassX", vec![("old", "new")])]).unwrap();
        let second = StringReplace::from_names([("ClassX", vec![("old", "newer")])]).unwrap();
        assert_ne!(first.key(), second.key());
        assert!(StringReplace::from_names([("a.b", vec![])]).is_err());
    }
}
