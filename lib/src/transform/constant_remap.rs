use super::{codegen, digest, Error, HookMethod, RuntimeHooks, TransformSettings};
use crate::jvm::class_file::Version;
use crate::jvm::code::{Instruction, InvokeType};
use crate::jvm::model::{ClassHeader, CodeElement, CodeInstruction, ConstantValue, MethodNode};
use crate::jvm::{self, BaseType, BinaryName, ClassVisitor, Name, RefType};
use crate::runtime::{ConstantLiteral, ConstantRemapper, LoaderId};
use log::{debug, trace};
use std::collections::{BTreeMap, BTreeSet};

/// Route registered constant loads through the remap lookup helper
///
/// The set of rewritten loads is a snapshot of what was registered in the [`ConstantRemapper`]
/// when the pass was built. At runtime, the helper receives the class, source file, method name,
/// and original (boxed) value, and returns whatever value is current.
///
/// Classes older than Java 5 are skipped, since they cannot load class literals with `ldc`.
pub struct ConstantRemap {
    loader: LoaderId,
    hook: HookMethod,

    /// Remapped literals, by class then method
    registered: BTreeMap<String, BTreeMap<String, BTreeSet<ConstantLiteral>>>,
}

impl ConstantRemap {
    pub fn new(
        remapper: &ConstantRemapper,
        loader: LoaderId,
        settings: &TransformSettings,
    ) -> Result<ConstantRemap, Error> {
        let hook = settings.hooks.constant_lookup.clone();
        hook.expect_descriptor(&RuntimeHooks::constant_lookup_descriptor())?;

        let mut registered: BTreeMap<String, BTreeMap<String, BTreeSet<ConstantLiteral>>> =
            BTreeMap::new();
        for key in remapper.registered_keys(loader) {
            registered
                .entry(key.class)
                .or_default()
                .entry(key.method)
                .or_default()
                .insert(key.original);
        }
        Ok(ConstantRemap {
            loader,
            hook,
            registered,
        })
    }

    pub fn key(&self) -> String {
        let entries = self.registered.iter().flat_map(|(class, methods)| {
            methods.iter().flat_map(move |(method, literals)| {
                literals
                    .iter()
                    .map(move |literal| format!("{}.{}={:?}", class, method, literal))
            })
        });
        format!(
            "constant-remap:{}:{}:{}",
            self.loader.0,
            digest(entries),
            self.hook
        )
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(ConstantRemapVisitor {
            pass: self,
            next,
            class: None,
        })
    }

    /// Load of a literal, followed by a lookup of its current value
    fn remapped_load(
        &self,
        class: &RemappedClass,
        method: &str,
        literal: &ConstantLiteral,
        load: CodeInstruction,
    ) -> Vec<CodeElement> {
        let mut elements = vec![
            CodeInstruction::ldc(ConstantValue::Class(RefType::Object(class.name.clone()))),
            CodeInstruction::ldc(ConstantValue::String(class.source_file.clone())),
            CodeInstruction::ldc(ConstantValue::String(method.to_owned())),
            load,
        ];
        let base_type = match literal {
            ConstantLiteral::Integer(_) => Some(BaseType::Int),
            ConstantLiteral::Long(_) => Some(BaseType::Long),
            ConstantLiteral::Float(_) => Some(BaseType::Float),
            ConstantLiteral::Double(_) => Some(BaseType::Double),
            ConstantLiteral::String(_) => None,
        };
        match base_type {
            Some(base_type) => {
                elements.push(codegen::box_primitive(base_type));
                elements.push(Instruction::Invoke(
                    InvokeType::Static,
                    self.hook.method_ref(),
                ));
                elements.push(Instruction::CheckCast(RefType::Object(
                    base_type.boxed_class(),
                )));
                elements.push(codegen::unbox_primitive(base_type));
            }
            None => {
                elements.push(Instruction::Invoke(
                    InvokeType::Static,
                    self.hook.method_ref(),
                ));
                elements.push(Instruction::CheckCast(RefType::Object(BinaryName::STRING)));
            }
        }
        elements.into_iter().map(CodeElement::Instruction).collect()
    }
}

/// Literal loaded by an instruction, if it loads one that can be remapped
fn loaded_literal(instruction: &CodeInstruction) -> Option<ConstantLiteral> {
    let literal = match instruction {
        Instruction::IConstM1 => ConstantLiteral::Integer(-1),
        Instruction::IConst0 => ConstantLiteral::Integer(0),
        Instruction::IConst1 => ConstantLiteral::Integer(1),
        Instruction::IConst2 => ConstantLiteral::Integer(2),
        Instruction::IConst3 => ConstantLiteral::Integer(3),
        Instruction::IConst4 => ConstantLiteral::Integer(4),
        Instruction::IConst5 => ConstantLiteral::Integer(5),
        Instruction::LConst0 => ConstantLiteral::Long(0),
        Instruction::LConst1 => ConstantLiteral::Long(1),
        Instruction::FConst0 => ConstantLiteral::float(0.0),
        Instruction::FConst1 => ConstantLiteral::float(1.0),
        Instruction::FConst2 => ConstantLiteral::float(2.0),
        Instruction::DConst0 => ConstantLiteral::double(0.0),
        Instruction::DConst1 => ConstantLiteral::double(1.0),
        Instruction::BiPush(value) => ConstantLiteral::Integer(*value as i32),
        Instruction::SiPush(value) => ConstantLiteral::Integer(*value as i32),
        Instruction::Ldc(value) | Instruction::Ldc2(value) => match value {
            ConstantValue::Integer(value) => ConstantLiteral::Integer(*value),
            ConstantValue::Long(value) => ConstantLiteral::Long(*value),
            ConstantValue::Float(value) => ConstantLiteral::float(*value),
            ConstantValue::Double(value) => ConstantLiteral::double(*value),
            ConstantValue::String(value) => ConstantLiteral::String(value.clone()),
            _ => return None,
        },
        _ => return None,
    };
    Some(literal)
}

/// Class being visited, when it has remapped constants
struct RemappedClass {
    name: BinaryName,
    source_file: String,
}

struct ConstantRemapVisitor<'a> {
    pass: &'a ConstantRemap,
    next: Box<dyn ClassVisitor + 'a>,
    class: Option<(RemappedClass, &'a BTreeMap<String, BTreeSet<ConstantLiteral>>)>,
}

impl<'a> ClassVisitor for ConstantRemapVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        self.class = match self.pass.registered.get(header.name.as_str()) {
            Some(_) if header.version.major_version < Version::JAVA5.major_version => {
                debug!(
                    "Not remapping constants of {} (class file version {})",
                    header.name, header.version.major_version
                );
                None
            }
            Some(methods) => Some((
                RemappedClass {
                    name: header.name.clone(),
                    source_file: header.source_file.clone().unwrap_or_default(),
                },
                methods,
            )),
            None => None,
        };
        self.next.visit_header(header)
    }

    fn visit_method(&mut self, mut method: MethodNode) -> Result<(), jvm::Error> {
        let literals = self.class.as_ref().and_then(|(class, methods)| {
            methods
                .get(method.header.name.as_str())
                .map(|literals| (class, literals))
        });
        if let (Some((class, literals)), Some(code)) = (literals, &mut method.code) {
            let method_name = method.header.name.as_str();
            let mut elements = Vec::with_capacity(code.elements.len());
            for element in code.elements.drain(..) {
                let literal = match &element {
                    CodeElement::Instruction(instruction) => loaded_literal(instruction)
                        .filter(|literal| literals.contains(literal))
                        .map(|literal| (literal, instruction.clone())),
                    _ => None,
                };
                match literal {
                    Some((literal, load)) => {
                        trace!("Remapping {} in {}.{}", literal, class.name, method_name);
                        let remapped = self.pass.remapped_load(class, method_name, &literal, load);
                        elements.extend(remapped);
                    }
                    None => elements.push(element),
                }
            }
            code.elements = elements;
        }
        self.next.visit_method(method)
    }
}
