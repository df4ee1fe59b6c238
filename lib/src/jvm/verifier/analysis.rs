use super::*;
use crate::jvm::code::SynLabel;
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{Code, CodeElement, MethodHeader};
use crate::jvm::{BinaryName, Error, FieldType, Name, RefType, VerifierErrorKind};
use crate::util::Width;
use std::collections::HashMap;

/// Source of the class hierarchy information needed to merge two object types
pub trait SuperClassResolver {
    /// Most specific class that both classes are assignable to
    ///
    /// Interfaces are treated like `java/lang/Object`, as the verifier itself does.
    fn common_super_class(&self, first: &BinaryName, second: &BinaryName)
        -> Result<BinaryName, Error>;
}

/// Result of inferring frames for a method body
#[derive(Debug)]
pub struct FrameAnalysis {
    /// Frame on entry to every reachable instruction, indexed like the code elements
    ///
    /// Labels, line numbers, and unreachable instructions have no frame.
    pub frames: Vec<Option<AnalysisFrame>>,
    pub max_stack: u16,
    pub max_locals: u16,
}

impl FrameAnalysis {
    pub fn is_live(&self, element: usize) -> bool {
        matches!(self.frames.get(element), Some(Some(_)))
    }
}

/// Infer the frame at every instruction of a method by iterating to a fix point
pub fn analyze_method(
    this_class: &BinaryName,
    header: &MethodHeader,
    code: &Code,
    resolver: &dyn SuperClassResolver,
) -> Result<FrameAnalysis, Error> {
    let method = format!(
        "{}.{}{}",
        this_class,
        header.name.as_str(),
        header.descriptor.render()
    );
    let elements = &code.elements;

    // For every element, the first instruction at or after it
    let mut next_instruction = vec![None; elements.len() + 1];
    for index in (0..elements.len()).rev() {
        next_instruction[index] = match elements[index] {
            CodeElement::Instruction(_) | CodeElement::Branch(_) => Some(index),
            CodeElement::Label(_) | CodeElement::LineNumber(_) => next_instruction[index + 1],
        };
    }
    let label_positions: HashMap<SynLabel, usize> = elements
        .iter()
        .enumerate()
        .filter_map(|(index, element)| match element {
            CodeElement::Label(label) => Some((*label, index)),
            _ => None,
        })
        .collect();

    let mut analyzer = Analyzer {
        method,
        this_class,
        elements,
        next_instruction,
        label_positions,
        handlers: vec![],
        resolver,
        frames: vec![None; elements.len()],
        worklist: vec![],
        max_stack: 0,
        max_locals: 0,
    };

    for block in &code.try_catch_blocks {
        let start = analyzer.label_position(&block.start, 0)?;
        let end = analyzer.label_position(&block.end, 0)?;
        let handler_position = analyzer.label_position(&block.handler, 0)?;
        let target = analyzer.instruction_at(handler_position)?;
        let catch_type = block.catch_type.clone().unwrap_or(BinaryName::THROWABLE);
        analyzer.handlers.push(Handler {
            start,
            end,
            target,
            catch_type: VerificationType::Object(RefType::Object(catch_type)),
        });
    }

    let entry_frame = AnalysisFrame::method_entry(
        this_class,
        header.is_static(),
        &header.name,
        &header.descriptor.parameters,
    );
    let entry = analyzer.instruction_at(0)?;
    analyzer.record_maximums(&entry_frame);
    analyzer.merge_into(entry, entry_frame)?;
    analyzer.run()?;

    let max_stack = u16::try_from(analyzer.max_stack)
        .map_err(|_| Error::MethodCodeMaxStackOverflow(analyzer.method.clone()))?;
    let max_locals = u16::try_from(analyzer.max_locals)
        .map_err(|_| Error::MethodCodeMaxLocalsOverflow(analyzer.method.clone()))?;

    Ok(FrameAnalysis {
        frames: analyzer.frames,
        max_stack,
        max_locals,
    })
}

/// Exception handler covering elements `[start, end)`
struct Handler {
    start: usize,
    end: usize,
    target: usize,
    catch_type: AnalysisType,
}

struct Analyzer<'a> {
    method: String,
    this_class: &'a BinaryName,
    elements: &'a [CodeElement],
    next_instruction: Vec<Option<usize>>,
    label_positions: HashMap<SynLabel, usize>,
    handlers: Vec<Handler>,
    resolver: &'a dyn SuperClassResolver,
    frames: Vec<Option<AnalysisFrame>>,
    worklist: Vec<usize>,
    max_stack: usize,
    max_locals: usize,
}

impl<'a> Analyzer<'a> {
    fn error(&self, instruction: usize, kind: VerifierErrorKind) -> Error {
        Error::VerifierError {
            method: self.method.clone(),
            instruction,
            kind,
        }
    }

    fn label_position(&self, label: &SynLabel, at: usize) -> Result<usize, Error> {
        self.label_positions
            .get(label)
            .copied()
            .ok_or_else(|| self.error(at, VerifierErrorKind::UnplacedLabel(*label)))
    }

    /// First instruction at or after an element
    fn instruction_at(&self, position: usize) -> Result<usize, Error> {
        self.next_instruction
            .get(position)
            .copied()
            .flatten()
            .ok_or_else(|| self.error(position, VerifierErrorKind::FallsOffEnd))
    }

    fn record_maximums(&mut self, frame: &AnalysisFrame) {
        self.max_stack = self.max_stack.max(frame.stack_slots());
        self.max_locals = self.max_locals.max(frame.locals.len());
    }

    fn run(&mut self) -> Result<(), Error> {
        while let Some(index) = self.worklist.pop() {
            let frame_in = match &self.frames[index] {
                Some(frame) => frame.clone(),
                None => continue,
            };

            let covering: Vec<(usize, AnalysisType)> = self
                .handlers
                .iter()
                .filter(|handler| handler.start <= index && index < handler.end)
                .map(|handler| (handler.target, handler.catch_type.clone()))
                .collect();
            for (target, catch_type) in covering {
                let handler_frame = Frame {
                    locals: frame_in.locals.clone(),
                    stack: vec![catch_type],
                };
                self.record_maximums(&handler_frame);
                self.merge_into(target, handler_frame)?;
            }

            let elements = self.elements;
            let mut frame_out = frame_in;
            match &elements[index] {
                CodeElement::Instruction(insn) => {
                    frame_out
                        .execute(insn, index, self.this_class)
                        .map_err(|kind| self.error(index, kind))?;
                    self.record_maximums(&frame_out);
                    let next = self.instruction_at(index + 1)?;
                    self.merge_into(next, frame_out)?;
                }
                CodeElement::Branch(branch) => {
                    frame_out
                        .execute_branch(branch)
                        .map_err(|kind| self.error(index, kind))?;
                    for target in branch.jump_targets() {
                        let position = self.label_position(target, index)?;
                        let target = self.instruction_at(position)?;
                        self.merge_into(target, frame_out.clone())?;
                    }
                    if branch.falls_through() {
                        let next = self.instruction_at(index + 1)?;
                        self.merge_into(next, frame_out)?;
                    }
                }
                CodeElement::Label(_) | CodeElement::LineNumber(_) => (),
            }
        }
        Ok(())
    }

    /// Merge a frame into the frame at an instruction, queueing it up if anything changed
    fn merge_into(&mut self, target: usize, incoming: AnalysisFrame) -> Result<(), Error> {
        let merged = match &self.frames[target] {
            None => incoming,
            Some(existing) => {
                let merged = self.merge_frames(existing, &incoming, target)?;
                if merged == *existing {
                    return Ok(());
                }
                merged
            }
        };
        self.frames[target] = Some(merged);
        if !self.worklist.contains(&target) {
            self.worklist.push(target);
        }
        Ok(())
    }

    fn merge_frames(
        &self,
        existing: &AnalysisFrame,
        incoming: &AnalysisFrame,
        at: usize,
    ) -> Result<AnalysisFrame, Error> {
        if existing.stack.len() != incoming.stack.len() {
            let msg = format!(
                "stack heights {} and {}",
                existing.stack.len(),
                incoming.stack.len()
            );
            return Err(self.error(at, VerifierErrorKind::IncompatibleStacks(msg)));
        }
        let stack = existing
            .stack
            .iter()
            .zip(&incoming.stack)
            .map(|(first, second)| match self.merge_types(first, second)? {
                Some(merged) => Ok(merged),
                None => {
                    let msg = format!("{:?} and {:?}", first, second);
                    Err(self.error(at, VerifierErrorKind::IncompatibleStacks(msg)))
                }
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let locals_len = existing.locals.len().max(incoming.locals.len());
        let mut locals = Vec::with_capacity(locals_len);
        for slot in 0..locals_len {
            let first = existing.locals.get(slot).unwrap_or(&VerificationType::Top);
            let second = incoming.locals.get(slot).unwrap_or(&VerificationType::Top);
            let merged = self
                .merge_types(first, second)?
                .unwrap_or(VerificationType::Top);
            locals.push(merged);
        }

        // A wide local only survives if its second half did too
        for slot in 0..locals.len() {
            if locals[slot].width() == 2 && locals.get(slot + 1) != Some(&VerificationType::Top) {
                locals[slot] = VerificationType::Top;
            }
        }

        Ok(Frame { locals, stack })
    }

    /// Least upper bound of two types (or `None` if there is none short of `Top`)
    fn merge_types(
        &self,
        first: &AnalysisType,
        second: &AnalysisType,
    ) -> Result<Option<AnalysisType>, Error> {
        use VerificationType::*;

        Ok(match (first, second) {
            _ if first == second => Some(first.clone()),
            (Null, Object(class)) | (Object(class), Null) => Some(Object(class.clone())),
            (Object(first), Object(second)) => Some(Object(self.merge_ref_types(first, second)?)),
            _ => None,
        })
    }

    fn merge_ref_types(
        &self,
        first: &RefType<BinaryName>,
        second: &RefType<BinaryName>,
    ) -> Result<RefType<BinaryName>, Error> {
        if first == second {
            return Ok(first.clone());
        }
        if let (RefType::Object(first), RefType::Object(second)) = (first, second) {
            return Ok(RefType::Object(
                self.resolver.common_super_class(first, second)?,
            ));
        }
        match (first.element_type(), second.element_type()) {
            (Some(FieldType::Ref(first)), Some(FieldType::Ref(second))) => Ok(RefType::array(
                FieldType::Ref(self.merge_ref_types(&first, &second)?),
            )),
            _ => Ok(RefType::Object(BinaryName::OBJECT)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{
        BranchInstruction, Instruction, LabelGenerator, OrdComparison, SynLabelGenerator,
    };
    use crate::jvm::model::{CodeInstruction, TryCatchBlock};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, UnqualifiedName};

    /// Every pair of distinct classes only shares `java/lang/Object`, except for exceptions
    struct FlatHierarchy;

    impl SuperClassResolver for FlatHierarchy {
        fn common_super_class(
            &self,
            first: &BinaryName,
            second: &BinaryName,
        ) -> Result<BinaryName, Error> {
            let exception = |name: &BinaryName| name.as_str().ends_with("Exception");
            if exception(first) && exception(second) {
                Ok(BinaryName::EXCEPTION)
            } else {
                Ok(BinaryName::OBJECT)
            }
        }
    }

    fn class(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn static_method(parameters: Vec<FieldType<BinaryName>>) -> MethodHeader {
        MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("test").unwrap(),
            MethodDescriptor {
                parameters,
                return_type: None,
            },
        )
    }

    fn insn(instruction: CodeInstruction) -> CodeElement {
        CodeElement::Instruction(instruction)
    }

    fn analyze(header: &MethodHeader, code: &Code) -> Result<FrameAnalysis, Error> {
        analyze_method(&class("a/Test"), header, code, &FlatHierarchy)
    }

    #[test]
    fn straight_line_maximums() {
        let header = static_method(vec![FieldType::long()]);
        let code = Code {
            elements: vec![
                insn(Instruction::LLoad(0)),
                insn(Instruction::LLoad(0)),
                insn(Instruction::LAdd),
                insn(Instruction::LStore(2)),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        };
        let analysis = analyze(&header, &code).unwrap();
        assert_eq!(analysis.max_stack, 4);
        assert_eq!(analysis.max_locals, 4);
        assert!(analysis.frames.iter().all(Option::is_some));
    }

    #[test]
    fn branches_merge_locals_and_skip_dead_code() {
        let mut labels = SynLabelGenerator::default();
        let join = labels.fresh_label();
        let header = static_method(vec![FieldType::int()]);
        let code = Code {
            elements: vec![
                insn(Instruction::ILoad(0)),
                CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, join)),
                insn(CodeInstruction::ldc(crate::jvm::model::ConstantValue::String(
                    String::from("x"),
                ))),
                insn(Instruction::AStore(1)),
                CodeElement::Label(join),
                CodeElement::Branch(BranchInstruction::Return),
                insn(Instruction::Nop),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        };
        let analysis = analyze(&header, &code).unwrap();
        let at_join = analysis.frames[5].as_ref().unwrap();
        assert_eq!(at_join.locals, vec![VerificationType::Integer, VerificationType::Top]);
        assert!(!analysis.is_live(6));
        assert!(!analysis.is_live(7));
        assert!(!analysis.is_live(4));
    }

    #[test]
    fn incompatible_stacks_are_rejected() {
        let mut labels = SynLabelGenerator::default();
        let join = labels.fresh_label();
        let header = static_method(vec![FieldType::int()]);
        let code = Code {
            elements: vec![
                insn(Instruction::IConst0),
                insn(Instruction::ILoad(0)),
                CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, join)),
                insn(Instruction::Pop),
                insn(Instruction::FConst0),
                CodeElement::Label(join),
                insn(Instruction::Pop),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        };
        assert!(matches!(
            analyze(&header, &code),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::IncompatibleStacks(_),
                ..
            })
        ));
    }

    #[test]
    fn object_types_merge_through_resolver() {
        let mut labels = SynLabelGenerator::default();
        let other = labels.fresh_label();
        let join = labels.fresh_label();
        let header = static_method(vec![FieldType::int()]);
        let new_exception = |name: &str| {
            insn(Instruction::CheckCast(RefType::Object(class(name))))
        };
        let code = Code {
            elements: vec![
                insn(Instruction::ILoad(0)),
                CodeElement::Branch(BranchInstruction::If(OrdComparison::EQ, other)),
                insn(Instruction::AConstNull),
                new_exception("a/FooException"),
                CodeElement::Branch(BranchInstruction::Goto(join)),
                CodeElement::Label(other),
                insn(Instruction::AConstNull),
                new_exception("a/BarException"),
                CodeElement::Label(join),
                CodeElement::Branch(BranchInstruction::AThrow),
            ],
            ..Code::default()
        };
        let analysis = analyze(&header, &code).unwrap();
        assert_eq!(
            analysis.frames[9].as_ref().unwrap().stack,
            vec![VerificationType::Object(RefType::Object(BinaryName::EXCEPTION))]
        );
    }

    #[test]
    fn handlers_see_incoming_locals() {
        let mut labels = SynLabelGenerator::default();
        let start = labels.fresh_label();
        let end = labels.fresh_label();
        let handler = labels.fresh_label();
        let header = static_method(vec![]);
        let code = Code {
            elements: vec![
                CodeElement::Label(start),
                insn(Instruction::IConst1),
                insn(Instruction::IStore(0)),
                insn(Instruction::Nop),
                CodeElement::Label(end),
                CodeElement::Branch(BranchInstruction::Return),
                CodeElement::Label(handler),
                CodeElement::Branch(BranchInstruction::AThrow),
            ],
            try_catch_blocks: vec![TryCatchBlock {
                start,
                end,
                handler,
                catch_type: None,
            }],
            local_variables: vec![],
        };
        let analysis = analyze(&header, &code).unwrap();
        let handler_frame = analysis.frames[7].as_ref().unwrap();
        assert_eq!(
            handler_frame.stack,
            vec![VerificationType::Object(RefType::Object(BinaryName::THROWABLE))]
        );

        // Merged from before and after the store
        assert_eq!(handler_frame.locals, vec![VerificationType::Top]);
    }

    #[test]
    fn running_off_the_end_is_an_error() {
        let header = static_method(vec![]);
        let code = Code {
            elements: vec![insn(Instruction::Nop)],
            ..Code::default()
        };
        assert!(matches!(
            analyze(&header, &code),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::FallsOffEnd,
                ..
            })
        ));
    }

    #[test]
    fn unplaced_labels_are_reported() {
        let mut labels = SynLabelGenerator::default();
        let nowhere = labels.fresh_label();
        let header = static_method(vec![]);
        let code = Code {
            elements: vec![CodeElement::Branch(BranchInstruction::Goto(nowhere))],
            ..Code::default()
        };
        assert!(matches!(
            analyze(&header, &code),
            Err(Error::VerifierError {
                kind: VerifierErrorKind::UnplacedLabel(_),
                ..
            })
        ));
    }
}
