//! Class fixtures shared by the integration tests
//!
//! Every fixture is built with the crate's own class builder and written to real class file
//! bytes, so tests exercise the reader and writer exactly as a class loader would.

#![allow(dead_code)]

use classmorph::jvm::class_graph::{ClassBytesLocator, PlatformLocator};
use classmorph::jvm::code::{BranchInstruction, Instruction, InvokeType};
use classmorph::jvm::model::{ClassNode, CodeElement, MethodNode, MethodRef};
use classmorph::jvm::{
    write_class, BinaryName, ClassAccessFlags, ClassBuilder, ClassReader, MethodAccessFlags,
    MethodDescriptor, Name, UnqualifiedName,
};
use std::collections::HashMap;

pub fn name(name: &str) -> BinaryName {
    BinaryName::from_str(name).unwrap()
}

pub fn void_descriptor() -> MethodDescriptor<BinaryName> {
    MethodDescriptor {
        parameters: vec![],
        return_type: None,
    }
}

/// Public class with a no-argument constructor
pub fn class(class: &str, super_class: &str, interfaces: &[&str]) -> ClassBuilder {
    let mut builder = ClassBuilder::new(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
        name(class),
        name(super_class),
        interfaces.iter().map(|interface| name(interface)).collect(),
    );
    let super_init = MethodRef::new(name(super_class), UnqualifiedName::INIT, void_descriptor());
    let mut constructor =
        builder.start_method(MethodAccessFlags::PUBLIC, UnqualifiedName::INIT, void_descriptor());
    constructor.code.push_instruction(Instruction::ALoad(0));
    constructor
        .code
        .push_instruction(Instruction::Invoke(InvokeType::Special, super_init));
    constructor
        .code
        .push_branch_instruction(BranchInstruction::Return);
    constructor.finish().unwrap();
    builder
}

/// Public interface without any methods
pub fn interface(interface: &str, super_interfaces: &[&str]) -> ClassBuilder {
    ClassBuilder::new(
        ClassAccessFlags::PUBLIC | ClassAccessFlags::INTERFACE | ClassAccessFlags::ABSTRACT,
        name(interface),
        BinaryName::OBJECT,
        super_interfaces.iter().map(|interface| name(interface)).collect(),
    )
}

/// Class file bytes of a finished class (its code may only merge platform types)
pub fn bytes(builder: ClassBuilder) -> Vec<u8> {
    write_class(&builder.result(), &PlatformLocator).expect("fixture should be writable")
}

pub fn read(bytes: &[u8]) -> ClassNode {
    ClassReader::new(bytes).expect("class should be readable").read_node()
}

/// Locator over the headers of class files held in memory
pub fn classpath(classes: &[&[u8]]) -> ClassBytesLocator<HashMap<BinaryName, Vec<u8>>> {
    let classes = classes
        .iter()
        .map(|bytes| {
            let descriptor = ClassReader::descriptor(bytes).unwrap();
            (descriptor.name, bytes.to_vec())
        })
        .collect();
    ClassBytesLocator::new(classes)
}

pub fn method<'c>(class: &'c ClassNode, method: &str) -> &'c MethodNode {
    class
        .methods
        .iter()
        .find(|candidate| candidate.header.name.as_str() == method)
        .unwrap_or_else(|| panic!("{} should have a method {}", class.header.name, method))
}

/// Number of calls to a method in a method body
pub fn calls_to(method: &MethodNode, target: &MethodRef) -> usize {
    let code = method.code.as_ref().expect("method should have a body");
    code.elements
        .iter()
        .filter(|element| match element {
            CodeElement::Instruction(Instruction::Invoke(_, called)) => called == target,
            _ => false,
        })
        .count()
}
