//! Common ancestors and frames, over descriptors read from class file bytes

mod common;

use classmorph::jvm::class_graph::{
    ClassDescriptor, CommonAncestorResolver, DefinedClassesLocator, DescriptorLocator,
    FallbackLocator,
};
use classmorph::jvm::code::{BranchInstruction, Instruction, InvokeType, OrdComparison};
use classmorph::jvm::model::MethodRef;
use classmorph::jvm::{
    write_class, BinaryName, ClassBuilder, Error, FieldType, MethodAccessFlags, MethodDescriptor,
    Name, RefType, UnqualifiedName,
};
use common::*;

fn common_super_class(locator: &dyn DescriptorLocator, first: &str, second: &str) -> BinaryName {
    CommonAncestorResolver::new(locator)
        .common_super_class(&name(first), &name(second))
        .unwrap_or_else(|err| panic!("merging {} and {} failed: {}", first, second, err))
}

#[test]
fn diamond() {
    // Object <- A <- B, Object <- A <- C
    let a = bytes(class("shapes/A", "java/lang/Object", &[]));
    let b = bytes(class("shapes/B", "shapes/A", &[]));
    let c = bytes(class("shapes/C", "shapes/A", &[]));
    let locator = classpath(&[&a, &b, &c]);

    assert_eq!(common_super_class(&locator, "shapes/B", "shapes/C"), name("shapes/A"));
    assert_eq!(common_super_class(&locator, "shapes/C", "shapes/B"), name("shapes/A"));
    assert_eq!(common_super_class(&locator, "shapes/B", "shapes/A"), name("shapes/A"));
}

#[test]
fn chain() {
    // Leaf -> Mid -> Base -> Object
    let base = bytes(class("chain/Base", "java/lang/Object", &[]));
    let mid = bytes(class("chain/Mid", "chain/Base", &[]));
    let leaf = bytes(class("chain/Leaf", "chain/Mid", &[]));
    let locator = classpath(&[&base, &mid, &leaf]);

    assert_eq!(common_super_class(&locator, "chain/Leaf", "chain/Base"), name("chain/Base"));
    assert_eq!(common_super_class(&locator, "chain/Leaf", "chain/Mid"), name("chain/Mid"));
    assert_eq!(common_super_class(&locator, "chain/Leaf", "chain/Leaf"), name("chain/Leaf"));
}

#[test]
fn interfaces() {
    let readable = bytes(interface("io/Readable", &[]));
    let closeable = bytes(interface("io/Closeable", &[]));
    let stream = bytes(interface("io/Stream", &["io/Readable"]));
    let file = bytes(class("io/File", "java/lang/Object", &["io/Stream"]));
    let locator = classpath(&[&readable, &closeable, &stream, &file]);

    assert_eq!(
        common_super_class(&locator, "io/Readable", "io/Closeable"),
        BinaryName::OBJECT,
        "unrelated interfaces only share Object"
    );
    assert_eq!(
        common_super_class(&locator, "io/File", "io/Readable"),
        name("io/Readable"),
        "an interface implemented through a super interface is an ancestor"
    );
    assert_eq!(common_super_class(&locator, "io/Closeable", "io/File"), BinaryName::OBJECT);
}

#[test]
fn object_on_either_side() {
    let locator = DefinedClassesLocator::new();
    let resolver = CommonAncestorResolver::new(&locator);
    let unknown = ClassDescriptor::new(name("not/Registered"), BinaryName::OBJECT, vec![], false);

    assert!(resolver
        .nearest_common_ancestor(&ClassDescriptor::object(), &unknown)
        .unwrap()
        .is_object());
    assert!(resolver
        .nearest_common_ancestor(&unknown, &ClassDescriptor::object())
        .unwrap()
        .is_object());
}

#[test]
fn renamed_descriptors() {
    let original = ClassDescriptor::new(
        name("lib/Widget"),
        name("lib/Base"),
        vec![name("java/io/Serializable")],
        false,
    );
    let renamed = original.renamed(name("shaded/lib/Widget"));
    assert_ne!(original, renamed);
    assert_eq!(original.super_name, renamed.super_name);
    assert_eq!(original.interfaces, renamed.interfaces);
    assert_eq!(original.is_interface, renamed.is_interface);
}

/// `static A pick(boolean)` returning either a fresh `B` or a fresh `C`
fn picker() -> ClassBuilder {
    let mut picker = class("shapes/Picker", "java/lang/Object", &[]);
    let mut method = picker.start_method(
        MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
        UnqualifiedName::from_str("pick").unwrap(),
        MethodDescriptor {
            parameters: vec![FieldType::boolean()],
            return_type: Some(FieldType::object(name("shapes/A"))),
        },
    );
    let construct = |class: &str| {
        [
            Instruction::New(RefType::Object(name(class))),
            Instruction::Dup,
            Instruction::Invoke(
                InvokeType::Special,
                MethodRef::new(name(class), UnqualifiedName::INIT, void_descriptor()),
            ),
        ]
    };
    let code = &mut method.code;
    let other = code.fresh_label();
    let done = code.fresh_label();
    code.push_instruction(Instruction::ILoad(0));
    code.push_branch_instruction(BranchInstruction::If(OrdComparison::EQ, other));
    construct("shapes/B").into_iter().for_each(|insn| code.push_instruction(insn));
    code.push_branch_instruction(BranchInstruction::Goto(done));
    code.place_label(other).unwrap();
    construct("shapes/C").into_iter().for_each(|insn| code.push_instruction(insn));
    code.place_label(done).unwrap();
    code.push_branch_instruction(BranchInstruction::AReturn);
    method.finish().unwrap();
    picker
}

#[test]
fn frames_merge_through_the_locator() {
    let a = bytes(class("shapes/A", "java/lang/Object", &[]));
    let b = bytes(class("shapes/B", "shapes/A", &[]));
    let c = bytes(class("shapes/C", "shapes/A", &[]));
    let locator = classpath(&[&a, &b, &c]);

    let written = write_class(&picker().result(), &locator).expect("hierarchy is known");
    let read_back = read(&written);
    let pick = method(&read_back, "pick");
    assert!(pick.code.is_some());
}

#[test]
fn unknown_types_fail_unless_falling_back() {
    let strict = DefinedClassesLocator::new();
    match write_class(&picker().result(), &strict) {
        Err(Error::ClassNotFound(_)) | Err(Error::VerifierError { .. }) => (),
        other => panic!("expected a resolution failure, got {:?}", other.map(|b| b.len())),
    }

    let lenient = FallbackLocator::new(DefinedClassesLocator::new());
    assert!(write_class(&picker().result(), &lenient).is_ok());
}
