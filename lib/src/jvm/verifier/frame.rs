use super::*;
use crate::jvm::class_file::{ClassConstantIndex, StackMapFrame};
use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
use crate::jvm::model::CodeInstruction;
use crate::jvm::{BinaryName, FieldType, RefType, UnqualifiedName, VerifierErrorKind};
use crate::util::Width;

/// Snapshot of the stack and local variables at a point in the bytecode
///
/// Locals are indexed by slot: a `long` or `double` in slot `n` is followed by [`Top`] in slot
/// `n + 1`. The stack holds one entry per value, whatever its width.
///
/// [`Top`]: VerificationType::Top
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Frame<Cls, U> {
    /// Local variables in scope
    pub locals: Vec<VerificationType<Cls, U>>,

    /// Types of values on the stack
    pub stack: Vec<VerificationType<Cls, U>>,
}

/// Frame tracked while analyzing a method body
pub type AnalysisFrame = Frame<RefType<BinaryName>, UninitializedObject>;

/// Frame ready to be written into a `StackMapTable`
pub type SerializableFrame = Frame<ClassConstantIndex, u16>;

impl<Cls, U> Default for Frame<Cls, U> {
    fn default() -> Self {
        Frame {
            locals: vec![],
            stack: vec![],
        }
    }
}

impl<Cls, U> Frame<Cls, U> {
    /// Size of the stack, counting `long` and `double` twice
    pub fn stack_slots(&self) -> usize {
        self.stack.iter().map(Width::width).sum()
    }
}

impl AnalysisFrame {
    /// Frame on entry to a method
    ///
    /// In constructors (other than that of `java/lang/Object`), `this` starts uninitialized.
    pub fn method_entry(
        this_class: &BinaryName,
        is_static: bool,
        name: &UnqualifiedName,
        parameters: &[FieldType<BinaryName>],
    ) -> AnalysisFrame {
        let mut frame = Frame::default();
        if !is_static {
            let this = if *name == UnqualifiedName::INIT && *this_class != BinaryName::OBJECT {
                VerificationType::UninitializedThis
            } else {
                VerificationType::Object(RefType::Object(this_class.clone()))
            };
            frame.locals.push(this);
        }
        for parameter in parameters {
            frame.push_local(VerificationType::from(parameter.clone()));
        }
        frame
    }

    fn push_local(&mut self, vtype: AnalysisType) {
        let wide = vtype.width() == 2;
        self.locals.push(vtype);
        if wide {
            self.locals.push(VerificationType::Top);
        }
    }

    fn pop(&mut self) -> Result<AnalysisType, VerifierErrorKind> {
        self.stack.pop().ok_or(VerifierErrorKind::EmptyStack)
    }

    fn pop_n(&mut self, count: usize) -> Result<(), VerifierErrorKind> {
        for _ in 0..count {
            self.pop()?;
        }
        Ok(())
    }

    fn pop_width(&mut self, expected_width: usize) -> Result<AnalysisType, VerifierErrorKind> {
        let vtype = self.pop()?;
        let found_width = vtype.width();
        if found_width == expected_width {
            Ok(vtype)
        } else {
            Err(VerifierErrorKind::InvalidWidth(found_width))
        }
    }

    fn load(&self, index: u16) -> Result<AnalysisType, VerifierErrorKind> {
        match self.locals.get(index as usize) {
            None | Some(VerificationType::Top) => Err(VerifierErrorKind::InvalidIndex(index)),
            Some(vtype) => Ok(vtype.clone()),
        }
    }

    /// Write a local, invalidating any `long`/`double` that gets partially overwritten
    fn store(&mut self, index: u16, vtype: AnalysisType) {
        let index = index as usize;
        let width = vtype.width();
        if self.locals.len() < index + width {
            self.locals.resize(index + width, VerificationType::Top);
        }
        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = VerificationType::Top;
        }
        if width == 1 && self.locals[index].width() == 2 {
            if let Some(next) = self.locals.get_mut(index + 1) {
                *next = VerificationType::Top;
            }
        }
        self.locals[index] = vtype;
        if width == 2 {
            self.locals[index + 1] = VerificationType::Top;
        }
    }

    /// Replace every occurrence of an uninitialized value once its `<init>` has been called
    fn initialize(&mut self, uninitialized: &AnalysisType, initialized: AnalysisType) {
        for slot in self.locals.iter_mut().chain(self.stack.iter_mut()) {
            if slot == uninitialized {
                *slot = initialized.clone();
            }
        }
    }

    /// Update the frame to reflect the effects of the given (non-branching) instruction
    ///
    /// Inference is lenient: operand types are trusted rather than checked, except where the
    /// output depends on them (eg. the element type of `aaload`).
    pub fn execute(
        &mut self,
        insn: &CodeInstruction,
        element_index: usize,
        this_class: &BinaryName,
    ) -> Result<(), VerifierErrorKind> {
        use Instruction::*;
        use VerificationType::*;

        match insn {
            Nop => (),
            AConstNull => self.stack.push(Null),
            IConstM1 | IConst0 | IConst1 | IConst2 | IConst3 | IConst4 | IConst5 | BiPush(_)
            | SiPush(_) => self.stack.push(Integer),
            LConst0 | LConst1 => self.stack.push(Long),
            FConst0 | FConst1 | FConst2 => self.stack.push(Float),
            DConst0 | DConst1 => self.stack.push(Double),
            Ldc(constant) | Ldc2(constant) => {
                self.stack.push(VerificationType::from(constant.field_type()))
            }

            ILoad(index) => {
                self.load(*index)?;
                self.stack.push(Integer);
            }
            LLoad(index) => {
                self.load(*index)?;
                self.stack.push(Long);
            }
            FLoad(index) => {
                self.load(*index)?;
                self.stack.push(Float);
            }
            DLoad(index) => {
                self.load(*index)?;
                self.stack.push(Double);
            }
            ALoad(index) => {
                let vtype = self.load(*index)?;
                self.stack.push(vtype);
            }

            IALoad | BALoad | CALoad | SALoad => {
                self.pop_n(2)?;
                self.stack.push(Integer);
            }
            LALoad => {
                self.pop_n(2)?;
                self.stack.push(Long);
            }
            FALoad => {
                self.pop_n(2)?;
                self.stack.push(Float);
            }
            DALoad => {
                self.pop_n(2)?;
                self.stack.push(Double);
            }
            AALoad => {
                self.pop()?;
                let element = match self.pop()? {
                    Null => Null,
                    Object(array) => match array.element_type() {
                        Some(FieldType::Ref(element)) => Object(element),
                        _ => return Err(VerifierErrorKind::NotArrayType),
                    },
                    _ => return Err(VerifierErrorKind::NotArrayType),
                };
                self.stack.push(element);
            }

            IStore(index) => {
                self.pop()?;
                self.store(*index, Integer);
            }
            LStore(index) => {
                self.pop()?;
                self.store(*index, Long);
            }
            FStore(index) => {
                self.pop()?;
                self.store(*index, Float);
            }
            DStore(index) => {
                self.pop()?;
                self.store(*index, Double);
            }
            AStore(index) => {
                let vtype = self.pop()?;
                self.store(*index, vtype);
            }

            IAStore | LAStore | FAStore | DAStore | AAStore | BAStore | CAStore | SAStore => {
                self.pop_n(3)?
            }

            Pop => {
                self.pop_width(1)?;
            }
            Pop2 => {
                if self.pop()?.width() == 1 {
                    self.pop_width(1)?;
                }
            }
            Dup => {
                let arg1 = self.pop_width(1)?;
                self.stack.push(arg1.clone());
                self.stack.push(arg1);
            }
            DupX1 => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop_width(1)?;
                self.stack.extend([arg1.clone(), arg2, arg1]);
            }
            DupX2 => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop()?;
                if arg2.width() == 1 {
                    let arg3 = self.pop_width(1)?;
                    self.stack.extend([arg1.clone(), arg3, arg2, arg1]);
                } else {
                    self.stack.extend([arg1.clone(), arg2, arg1]);
                }
            }
            Dup2 => {
                let arg1 = self.pop()?;
                if arg1.width() == 1 {
                    let arg2 = self.pop_width(1)?;
                    self.stack
                        .extend([arg2.clone(), arg1.clone(), arg2, arg1]);
                } else {
                    self.stack.extend([arg1.clone(), arg1]);
                }
            }
            Dup2X1 => {
                let arg1 = self.pop()?;
                if arg1.width() == 1 {
                    let arg2 = self.pop_width(1)?;
                    let arg3 = self.pop_width(1)?;
                    self.stack
                        .extend([arg2.clone(), arg1.clone(), arg3, arg2, arg1]);
                } else {
                    let arg2 = self.pop_width(1)?;
                    self.stack.extend([arg1.clone(), arg2, arg1]);
                }
            }
            Dup2X2 => {
                let arg1 = self.pop()?;
                if arg1.width() == 1 {
                    let arg2 = self.pop_width(1)?;
                    let arg3 = self.pop()?;
                    if arg3.width() == 1 {
                        let arg4 = self.pop_width(1)?;
                        self.stack
                            .extend([arg2.clone(), arg1.clone(), arg4, arg3, arg2, arg1]);
                    } else {
                        self.stack
                            .extend([arg2.clone(), arg1.clone(), arg3, arg2, arg1]);
                    }
                } else {
                    let arg2 = self.pop()?;
                    if arg2.width() == 1 {
                        let arg3 = self.pop_width(1)?;
                        self.stack.extend([arg1.clone(), arg3, arg2, arg1]);
                    } else {
                        self.stack.extend([arg1.clone(), arg2, arg1]);
                    }
                }
            }
            Swap => {
                let arg1 = self.pop_width(1)?;
                let arg2 = self.pop_width(1)?;
                self.stack.extend([arg1, arg2]);
            }

            IAdd | ISub | IMul | IDiv | IRem | IAnd | IOr | IXor | ISh(_) => {
                self.pop_n(2)?;
                self.stack.push(Integer);
            }
            LAdd | LSub | LMul | LDiv | LRem | LAnd | LOr | LXor | LSh(_) => {
                self.pop_n(2)?;
                self.stack.push(Long);
            }
            FAdd | FSub | FMul | FDiv | FRem => {
                self.pop_n(2)?;
                self.stack.push(Float);
            }
            DAdd | DSub | DMul | DDiv | DRem => {
                self.pop_n(2)?;
                self.stack.push(Double);
            }
            INeg | I2B | I2C | I2S | L2I | F2I | D2I => {
                self.pop()?;
                self.stack.push(Integer);
            }
            LNeg | I2L | F2L | D2L => {
                self.pop()?;
                self.stack.push(Long);
            }
            FNeg | I2F | L2F | D2F => {
                self.pop()?;
                self.stack.push(Float);
            }
            DNeg | I2D | L2D | F2D => {
                self.pop()?;
                self.stack.push(Double);
            }
            IInc(index, _) => {
                self.load(*index)?;
            }
            LCmp | FCmp(_) | DCmp(_) => {
                self.pop_n(2)?;
                self.stack.push(Integer);
            }

            GetStatic(field) => self.stack.push(field.descriptor.clone().into()),
            PutStatic(_) => {
                self.pop()?;
            }
            GetField(field) => {
                self.pop()?;
                self.stack.push(field.descriptor.clone().into());
            }
            PutField(_) => self.pop_n(2)?,

            Invoke(invoke_type, method) => {
                self.pop_n(method.descriptor.parameters.len())?;
                if *invoke_type != InvokeType::Static {
                    let receiver = self.pop()?;
                    if *invoke_type == InvokeType::Special && method.name == UnqualifiedName::INIT {
                        let initialized = match &receiver {
                            UninitializedThis => Object(RefType::Object(this_class.clone())),
                            Uninitialized(object) => Object(object.class.clone()),
                            _ => return Err(VerifierErrorKind::NotUninitialized),
                        };
                        self.initialize(&receiver, initialized);
                    }
                }
                if let Some(return_type) = &method.descriptor.return_type {
                    self.stack.push(return_type.clone().into());
                }
            }
            InvokeDynamic(indy) => {
                self.pop_n(indy.descriptor.parameters.len())?;
                if let Some(return_type) = &indy.descriptor.return_type {
                    self.stack.push(return_type.clone().into());
                }
            }

            New(class) => self.stack.push(Uninitialized(UninitializedObject {
                created_at: element_index,
                class: class.clone(),
            })),
            NewArray(base_type) => {
                self.pop()?;
                self.stack
                    .push(Object(RefType::array(FieldType::Base(*base_type))));
            }
            ANewArray(element) => {
                self.pop()?;
                self.stack
                    .push(Object(RefType::array(FieldType::Ref(element.clone()))));
            }
            MultiANewArray(array, dimensions) => {
                self.pop_n(*dimensions as usize)?;
                self.stack.push(Object(array.clone()));
            }
            ArrayLength | InstanceOf(_) => {
                self.pop()?;
                self.stack.push(Integer);
            }
            CheckCast(class) => {
                self.pop()?;
                self.stack.push(Object(class.clone()));
            }
            MonitorEnter | MonitorExit => {
                self.pop()?;
            }
        }

        Ok(())
    }

    /// Update the frame to reflect the operands popped by a branching instruction
    pub fn execute_branch<Lbl>(
        &mut self,
        insn: &BranchInstruction<Lbl>,
    ) -> Result<(), VerifierErrorKind> {
        use BranchInstruction::*;

        match insn {
            If(..) | IfNull(..) | TableSwitch { .. } | LookupSwitch { .. } => self.pop_n(1),
            IfICmp(..) | IfACmp(..) => self.pop_n(2),
            Goto(_) | Return => Ok(()),
            IReturn | LReturn | FReturn | DReturn | AReturn | AThrow => self.pop_n(1),
        }
    }
}

impl SerializableFrame {
    /// Locals as listed in a stack map frame: trailing `Top`s dropped and the `Top` following
    /// every `long`/`double` left implicit
    pub fn compressed_locals(&self) -> Vec<SerializableType> {
        let used = self
            .locals
            .iter()
            .rposition(|local| *local != VerificationType::Top)
            .map_or(0, |last| last + 1);
        let mut compressed = vec![];
        let mut slot = 0;
        while slot < used {
            let local = &self.locals[slot];
            compressed.push(local.clone());
            slot += local.width();
        }
        compressed
    }

    /// Compute a stack map frame for this frame, given the previous frame
    ///
    /// This will fall back to the `Full` option using [`Self::full_stack_map_frame`] only if none
    /// of the other stack map frame variants are enough to encode the transition.
    pub fn stack_map_frame(&self, offset_delta: u16, previous_frame: &Self) -> StackMapFrame {
        let locals = self.compressed_locals();
        let previous_locals = previous_frame.compressed_locals();

        match self.stack.len() {
            0 if locals.len() <= previous_locals.len() => {
                let chopped = previous_locals.len() - locals.len();
                if chopped < 4 && previous_locals.starts_with(&locals) {
                    return if chopped == 0 {
                        StackMapFrame::SameLocalsNoStack { offset_delta }
                    } else {
                        StackMapFrame::ChopLocalsNoStack {
                            offset_delta,
                            chopped_k: chopped as u8,
                        }
                    };
                }
            }
            0 => {
                let appended = locals.len() - previous_locals.len();
                if appended < 4 && locals.starts_with(&previous_locals) {
                    return StackMapFrame::AppendLocalsNoStack {
                        offset_delta,
                        locals: locals[previous_locals.len()..].to_vec(),
                    };
                }
            }
            1 if locals == previous_locals => {
                return StackMapFrame::SameLocalsOneStack {
                    offset_delta,
                    stack: self.stack[0].clone(),
                };
            }
            _ => (),
        }

        self.full_stack_map_frame(offset_delta)
    }

    /// Compute a `Full` stack map frame
    pub fn full_stack_map_frame(&self, offset_delta: u16) -> StackMapFrame {
        StackMapFrame::Full {
            offset_delta,
            locals: self.compressed_locals(),
            stack: self.stack.clone(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::ConstantIndex;
    use crate::jvm::model::{ConstantValue, MethodRef};
    use crate::jvm::{MethodDescriptor, Name};
    use VerificationType::*;

    fn class(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn frame(locals: Vec<AnalysisType>, stack: Vec<AnalysisType>) -> AnalysisFrame {
        Frame { locals, stack }
    }

    #[test]
    fn method_entry_frames() {
        let entry = AnalysisFrame::method_entry(
            &class("a/B"),
            false,
            &UnqualifiedName::INIT,
            &[FieldType::long(), FieldType::object(BinaryName::STRING)],
        );
        assert_eq!(
            entry.locals,
            vec![
                UninitializedThis,
                Long,
                Top,
                Object(RefType::Object(BinaryName::STRING))
            ]
        );

        let object_init = AnalysisFrame::method_entry(
            &BinaryName::OBJECT,
            false,
            &UnqualifiedName::INIT,
            &[],
        );
        assert_eq!(object_init.locals, vec![Object(RefType::Object(BinaryName::OBJECT))]);
    }

    #[test]
    fn arithmetic() {
        let this = class("a/B");
        let binops = [
            (Integer, vec![Instruction::IAdd, Instruction::IXor]),
            (Long, vec![Instruction::LMul, Instruction::LAnd]),
            (Float, vec![Instruction::FDiv]),
            (Double, vec![Instruction::DRem]),
        ];
        for (typ, instructions) in binops {
            for instruction in instructions {
                let mut frame_in = frame(vec![], vec![typ.clone(), typ.clone()]);
                frame_in.execute(&instruction, 0, &this).unwrap();
                assert_eq!(frame_in, frame(vec![], vec![typ.clone()]), "{:?}", instruction);

                let mut too_small = frame(vec![], vec![typ.clone()]);
                assert!(matches!(
                    too_small.execute(&instruction, 0, &this),
                    Err(VerifierErrorKind::EmptyStack)
                ));
            }
        }
    }

    #[test]
    fn stores_invalidate_wide_locals() {
        let this = class("a/B");
        let mut frame_in = frame(vec![Long, Top, Integer], vec![Integer]);
        frame_in.execute(&Instruction::IStore(1), 0, &this).unwrap();
        assert_eq!(frame_in.locals, vec![Top, Integer, Integer]);

        let mut frame_in = frame(vec![], vec![Double]);
        frame_in.execute(&Instruction::DStore(2), 0, &this).unwrap();
        assert_eq!(frame_in.locals, vec![Top, Top, Double, Top]);

        let mut frame_in = frame(vec![Top], vec![]);
        assert!(matches!(
            frame_in.execute(&Instruction::ALoad(0), 0, &this),
            Err(VerifierErrorKind::InvalidIndex(0))
        ));
    }

    #[test]
    fn dup_forms_respect_widths() {
        let this = class("a/B");
        let mut frame_in = frame(vec![], vec![Integer, Long]);
        frame_in.execute(&Instruction::Dup2X1, 0, &this).unwrap();
        assert_eq!(frame_in.stack, vec![Long, Integer, Long]);

        let mut frame_in = frame(vec![], vec![Long]);
        assert!(matches!(
            frame_in.execute(&Instruction::Dup, 0, &this),
            Err(VerifierErrorKind::InvalidWidth(2))
        ));
    }

    #[test]
    fn constructor_call_initializes_every_copy() {
        let this = class("a/B");
        let builder = RefType::Object(class("java/lang/StringBuilder"));
        let mut frame_in = frame(vec![], vec![]);
        frame_in.execute(&Instruction::New(builder.clone()), 4, &this).unwrap();
        frame_in.execute(&Instruction::Dup, 5, &this).unwrap();
        frame_in.execute(&Instruction::AStore(0), 6, &this).unwrap();
        frame_in.execute(&Instruction::ALoad(0), 7, &this).unwrap();
        assert_eq!(frame_in.stack.len(), 2);

        let init = MethodRef {
            owner: builder.clone(),
            name: UnqualifiedName::INIT,
            descriptor: MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            is_interface: false,
        };
        frame_in
            .execute(&Instruction::Invoke(InvokeType::Special, init.clone()), 8, &this)
            .unwrap();
        assert_eq!(frame_in.stack, vec![Object(builder.clone())]);
        assert_eq!(frame_in.locals, vec![Object(builder)]);

        let mut not_new = frame(vec![], vec![Null]);
        assert!(matches!(
            not_new.execute(&Instruction::Invoke(InvokeType::Special, init), 0, &this),
            Err(VerifierErrorKind::NotUninitialized)
        ));
    }

    #[test]
    fn constants_push_their_types() {
        let this = class("a/B");
        let mut frame_in = frame(vec![], vec![]);
        frame_in
            .execute(&CodeInstruction::ldc(ConstantValue::Long(3)), 0, &this)
            .unwrap();
        frame_in
            .execute(
                &CodeInstruction::ldc(ConstantValue::String(String::from("x"))),
                1,
                &this,
            )
            .unwrap();
        assert_eq!(frame_in.stack_slots(), 3);
    }

    #[test]
    fn compressed_frames() {
        let class_index = VerificationType::Object(ClassConstantIndex(ConstantIndex(2)));
        let previous = SerializableFrame {
            locals: vec![class_index.clone()],
            stack: vec![],
        };
        let appended = SerializableFrame {
            locals: vec![class_index.clone(), Long, Top, Integer, Top, Top],
            stack: vec![],
        };
        assert_eq!(appended.compressed_locals().len(), 3);
        assert!(matches!(
            appended.stack_map_frame(4, &previous),
            StackMapFrame::AppendLocalsNoStack { offset_delta: 4, ref locals } if locals.len() == 2
        ));
        assert!(matches!(
            previous.stack_map_frame(0, &appended),
            StackMapFrame::ChopLocalsNoStack { chopped_k: 2, .. }
        ));

        let one_stack = SerializableFrame {
            locals: vec![class_index.clone()],
            stack: vec![Integer],
        };
        assert!(matches!(
            one_stack.stack_map_frame(70, &previous),
            StackMapFrame::SameLocalsOneStack { offset_delta: 70, .. }
        ));

        let replaced = SerializableFrame {
            locals: vec![Integer],
            stack: vec![],
        };
        assert!(matches!(
            replaced.stack_map_frame(1, &previous),
            StackMapFrame::Full { .. }
        ));
    }
}
