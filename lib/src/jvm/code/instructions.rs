//! Typed JVM bytecode instructions
//!
//! The representation is slightly different from the usual presentation to make it more
//! convenient to rewrite bytecode:
//!
//!   - The "wide" instruction doesn't show up at all, but instead gets merged into the
//!     instructions it is allowed to modify. Likewise `ldc`/`ldc_w`, `iload_0`/`iload`, and
//!     `goto`/`goto_w` are not distinguished (the encoding is picked when laying out the code).
//!
//!   - Some instructions (like the branches) get abstracted into one instruction with a field.
//!     This helps with repetitive pattern matches and also simplifies tasks like inverting a
//!     branch condition.
//!
//!   - `jsr` and `ret` are not representable. They cannot appear in class files of version 51 or
//!     later and methods using them are rejected as unsupported.

use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex, Serialize,
};
use crate::jvm::BaseType;
use crate::util::Width;
use byteorder::WriteBytesExt;
use std::convert::TryFrom;
use std::io::Result;
use std::ops::Not;

/// Non-branching JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Instruction<Class, Constant, Field, Method, IndyMethod> {
    Nop,
    AConstNull,
    IConstM1,
    IConst0,
    IConst1,
    IConst2,
    IConst3,
    IConst4,
    IConst5,
    LConst0,
    LConst1,
    FConst0,
    FConst1,
    FConst2,
    DConst0,
    DConst1,
    BiPush(i8),
    SiPush(i16),
    Ldc(Constant), // covers both `ldc` and `ldc_w`
    Ldc2(Constant),
    ILoad(u16), // covers `iload`, `iload{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IStore(u16), // covers `istore`, `istore{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishr`, `ishl`, and `iushr`
    LSh(ShiftType), // covers `lshr`, `lshl`, and `lushr`
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,
    IInc(u16, i16), // covers `iinc` and `wide iinc`
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`
    GetStatic(Field),
    PutStatic(Field),
    GetField(Field),
    PutField(Field),
    Invoke(InvokeType, Method),
    InvokeDynamic(IndyMethod),
    New(Class),
    NewArray(BaseType),
    ANewArray(Class),
    ArrayLength,
    CheckCast(Class),
    InstanceOf(Class),
    MonitorEnter,
    MonitorExit,
    MultiANewArray(Class, u8),
}

/// Instruction with all operands resolved to constant pool indices
pub type SerializableInstruction = Instruction<
    ClassConstantIndex,
    ConstantIndex,
    FieldRefConstantIndex,
    MethodRefConstantIndex,
    InvokeDynamicConstantIndex,
>;

impl<Class, Constant, Field, Method, IndyMethod>
    Instruction<Class, Constant, Field, Method, IndyMethod>
{
    /// Map every operand which refers to the constant pool
    pub fn map<Class2, Constant2, Field2, Method2, IndyMethod2, E>(
        &self,
        mut map_class: impl FnMut(&Class) -> std::result::Result<Class2, E>,
        map_constant: impl FnOnce(&Constant) -> std::result::Result<Constant2, E>,
        map_field: impl FnOnce(&Field) -> std::result::Result<Field2, E>,
        map_method: impl FnOnce(&Method) -> std::result::Result<Method2, E>,
        map_indy_method: impl FnOnce(&IndyMethod) -> std::result::Result<IndyMethod2, E>,
    ) -> std::result::Result<Instruction<Class2, Constant2, Field2, Method2, IndyMethod2>, E> {
        self.map_with(
            &mut (),
            |_, class| map_class(class),
            |_, constant| map_constant(constant),
            |_, field| map_field(field),
            |_, method| map_method(method),
            |_, indy_method| map_indy_method(indy_method),
        )
    }

    /// Same as [`Self::map`], but threading some mutable context (eg. a constant pool) through
    /// the mapping functions
    pub fn map_with<Ctx, Class2, Constant2, Field2, Method2, IndyMethod2, E>(
        &self,
        ctx: &mut Ctx,
        mut map_class: impl FnMut(&mut Ctx, &Class) -> std::result::Result<Class2, E>,
        map_constant: impl FnOnce(&mut Ctx, &Constant) -> std::result::Result<Constant2, E>,
        map_field: impl FnOnce(&mut Ctx, &Field) -> std::result::Result<Field2, E>,
        map_method: impl FnOnce(&mut Ctx, &Method) -> std::result::Result<Method2, E>,
        map_indy_method: impl FnOnce(&mut Ctx, &IndyMethod) -> std::result::Result<IndyMethod2, E>,
    ) -> std::result::Result<Instruction<Class2, Constant2, Field2, Method2, IndyMethod2>, E> {
        use Instruction::*;
        if let Some(simple) = self.simple_opcode().and_then(Instruction::from_simple_opcode) {
            return Ok(simple);
        }
        Ok(match self {
            BiPush(b) => BiPush(*b),
            SiPush(s) => SiPush(*s),
            Ldc(constant) => Ldc(map_constant(ctx, constant)?),
            Ldc2(constant) => Ldc2(map_constant(ctx, constant)?),
            ILoad(idx) => ILoad(*idx),
            LLoad(idx) => LLoad(*idx),
            FLoad(idx) => FLoad(*idx),
            DLoad(idx) => DLoad(*idx),
            ALoad(idx) => ALoad(*idx),
            IStore(idx) => IStore(*idx),
            LStore(idx) => LStore(*idx),
            FStore(idx) => FStore(*idx),
            DStore(idx) => DStore(*idx),
            AStore(idx) => AStore(*idx),
            IInc(idx, by) => IInc(*idx, *by),
            GetStatic(field) => GetStatic(map_field(ctx, field)?),
            PutStatic(field) => PutStatic(map_field(ctx, field)?),
            GetField(field) => GetField(map_field(ctx, field)?),
            PutField(field) => PutField(map_field(ctx, field)?),
            Invoke(typ, method) => Invoke(*typ, map_method(ctx, method)?),
            InvokeDynamic(indy_method) => InvokeDynamic(map_indy_method(ctx, indy_method)?),
            New(class) => New(map_class(ctx, class)?),
            NewArray(bt) => NewArray(*bt),
            ANewArray(class) => ANewArray(map_class(ctx, class)?),
            CheckCast(class) => CheckCast(map_class(ctx, class)?),
            InstanceOf(class) => InstanceOf(map_class(ctx, class)?),
            MultiANewArray(class, dims) => MultiANewArray(map_class(ctx, class)?, *dims),
            _ => unreachable!("instruction without operands has a simple opcode"),
        })
    }

    /// Opcode of an instruction that is encoded as just that one byte (with no operands)
    pub fn simple_opcode(&self) -> Option<u8> {
        use Instruction::*;
        Some(match self {
            Nop => 0x00,
            AConstNull => 0x01,
            IConstM1 => 0x02,
            IConst0 => 0x03,
            IConst1 => 0x04,
            IConst2 => 0x05,
            IConst3 => 0x06,
            IConst4 => 0x07,
            IConst5 => 0x08,
            LConst0 => 0x09,
            LConst1 => 0x0a,
            FConst0 => 0x0b,
            FConst1 => 0x0c,
            FConst2 => 0x0d,
            DConst0 => 0x0e,
            DConst1 => 0x0f,
            IALoad => 0x2e,
            LALoad => 0x2f,
            FALoad => 0x30,
            DALoad => 0x31,
            AALoad => 0x32,
            BALoad => 0x33,
            CALoad => 0x34,
            SALoad => 0x35,
            IAStore => 0x4f,
            LAStore => 0x50,
            FAStore => 0x51,
            DAStore => 0x52,
            AAStore => 0x53,
            BAStore => 0x54,
            CAStore => 0x55,
            SAStore => 0x56,
            Pop => 0x57,
            Pop2 => 0x58,
            Dup => 0x59,
            DupX1 => 0x5a,
            DupX2 => 0x5b,
            Dup2 => 0x5c,
            Dup2X1 => 0x5d,
            Dup2X2 => 0x5e,
            Swap => 0x5f,
            IAdd => 0x60,
            LAdd => 0x61,
            FAdd => 0x62,
            DAdd => 0x63,
            ISub => 0x64,
            LSub => 0x65,
            FSub => 0x66,
            DSub => 0x67,
            IMul => 0x68,
            LMul => 0x69,
            FMul => 0x6a,
            DMul => 0x6b,
            IDiv => 0x6c,
            LDiv => 0x6d,
            FDiv => 0x6e,
            DDiv => 0x6f,
            IRem => 0x70,
            LRem => 0x71,
            FRem => 0x72,
            DRem => 0x73,
            INeg => 0x74,
            LNeg => 0x75,
            FNeg => 0x76,
            DNeg => 0x77,
            ISh(ShiftType::Left) => 0x78,
            LSh(ShiftType::Left) => 0x79,
            ISh(ShiftType::ArithmeticRight) => 0x7a,
            LSh(ShiftType::ArithmeticRight) => 0x7b,
            ISh(ShiftType::LogicalRight) => 0x7c,
            LSh(ShiftType::LogicalRight) => 0x7d,
            IAnd => 0x7e,
            LAnd => 0x7f,
            IOr => 0x80,
            LOr => 0x81,
            IXor => 0x82,
            LXor => 0x83,
            I2L => 0x85,
            I2F => 0x86,
            I2D => 0x87,
            L2I => 0x88,
            L2F => 0x89,
            L2D => 0x8a,
            F2I => 0x8b,
            F2L => 0x8c,
            F2D => 0x8d,
            D2I => 0x8e,
            D2L => 0x8f,
            D2F => 0x90,
            I2B => 0x91,
            I2C => 0x92,
            I2S => 0x93,
            LCmp => 0x94,
            FCmp(CompareMode::L) => 0x95,
            FCmp(CompareMode::G) => 0x96,
            DCmp(CompareMode::L) => 0x97,
            DCmp(CompareMode::G) => 0x98,
            ArrayLength => 0xbe,
            MonitorEnter => 0xc2,
            MonitorExit => 0xc3,
            _ => return None,
        })
    }

    /// Inverse of [`Self::simple_opcode`]
    pub fn from_simple_opcode(opcode: u8) -> Option<Self> {
        use Instruction::*;
        Some(match opcode {
            0x00 => Nop,
            0x01 => AConstNull,
            0x02 => IConstM1,
            0x03 => IConst0,
            0x04 => IConst1,
            0x05 => IConst2,
            0x06 => IConst3,
            0x07 => IConst4,
            0x08 => IConst5,
            0x09 => LConst0,
            0x0a => LConst1,
            0x0b => FConst0,
            0x0c => FConst1,
            0x0d => FConst2,
            0x0e => DConst0,
            0x0f => DConst1,
            0x2e => IALoad,
            0x2f => LALoad,
            0x30 => FALoad,
            0x31 => DALoad,
            0x32 => AALoad,
            0x33 => BALoad,
            0x34 => CALoad,
            0x35 => SALoad,
            0x4f => IAStore,
            0x50 => LAStore,
            0x51 => FAStore,
            0x52 => DAStore,
            0x53 => AAStore,
            0x54 => BAStore,
            0x55 => CAStore,
            0x56 => SAStore,
            0x57 => Pop,
            0x58 => Pop2,
            0x59 => Dup,
            0x5a => DupX1,
            0x5b => DupX2,
            0x5c => Dup2,
            0x5d => Dup2X1,
            0x5e => Dup2X2,
            0x5f => Swap,
            0x60 => IAdd,
            0x61 => LAdd,
            0x62 => FAdd,
            0x63 => DAdd,
            0x64 => ISub,
            0x65 => LSub,
            0x66 => FSub,
            0x67 => DSub,
            0x68 => IMul,
            0x69 => LMul,
            0x6a => FMul,
            0x6b => DMul,
            0x6c => IDiv,
            0x6d => LDiv,
            0x6e => FDiv,
            0x6f => DDiv,
            0x70 => IRem,
            0x71 => LRem,
            0x72 => FRem,
            0x73 => DRem,
            0x74 => INeg,
            0x75 => LNeg,
            0x76 => FNeg,
            0x77 => DNeg,
            0x78 => ISh(ShiftType::Left),
            0x79 => LSh(ShiftType::Left),
            0x7a => ISh(ShiftType::ArithmeticRight),
            0x7b => LSh(ShiftType::ArithmeticRight),
            0x7c => ISh(ShiftType::LogicalRight),
            0x7d => LSh(ShiftType::LogicalRight),
            0x7e => IAnd,
            0x7f => LAnd,
            0x80 => IOr,
            0x81 => LOr,
            0x82 => IXor,
            0x83 => LXor,
            0x85 => I2L,
            0x86 => I2F,
            0x87 => I2D,
            0x88 => L2I,
            0x89 => L2F,
            0x8a => L2D,
            0x8b => F2I,
            0x8c => F2L,
            0x8d => F2D,
            0x8e => D2I,
            0x8f => D2L,
            0x90 => D2F,
            0x91 => I2B,
            0x92 => I2C,
            0x93 => I2S,
            0x94 => LCmp,
            0x95 => FCmp(CompareMode::L),
            0x96 => FCmp(CompareMode::G),
            0x97 => DCmp(CompareMode::L),
            0x98 => DCmp(CompareMode::G),
            0xbe => ArrayLength,
            0xc2 => MonitorEnter,
            0xc3 => MonitorExit,
            _ => return None,
        })
    }
}

impl Width for SerializableInstruction {
    fn width(&self) -> usize {
        use Instruction::*;
        if self.simple_opcode().is_some() {
            return 1;
        }
        match self {
            ILoad(0..=3) | LLoad(0..=3) | FLoad(0..=3) | DLoad(0..=3) | ALoad(0..=3) => 1,
            IStore(0..=3) | LStore(0..=3) | FStore(0..=3) | DStore(0..=3) | AStore(0..=3) => 1,

            BiPush(_) | NewArray(_) | Ldc(ConstantIndex(0..=255)) => 2,
            ILoad(0..=255) | LLoad(0..=255) | FLoad(0..=255) | DLoad(0..=255) | ALoad(0..=255) => 2,
            IStore(0..=255)
            | LStore(0..=255)
            | FStore(0..=255)
            | DStore(0..=255)
            | AStore(0..=255) => 2,

            SiPush(_)
            | Ldc(_)
            | Ldc2(_) // always wide, unlike `ldc` vs. `ldc_w`
            | IInc(0..=255, -128..=127)
            | GetStatic(_)
            | PutStatic(_)
            | GetField(_)
            | PutField(_)
            | Invoke(InvokeType::Special, _)
            | Invoke(InvokeType::Static, _)
            | Invoke(InvokeType::Virtual, _)
            | New(_)
            | ANewArray(_)
            | CheckCast(_)
            | InstanceOf(_) => 3,

            ILoad(_) | LLoad(_) | FLoad(_) | DLoad(_) | ALoad(_) => 4,
            IStore(_) | LStore(_) | FStore(_) | DStore(_) | AStore(_) => 4,
            MultiANewArray(_, _) => 4,

            Invoke(InvokeType::Interface(_), _) | InvokeDynamic(_) => 5,

            IInc(_, _) => 6,

            _ => 1,
        }
    }
}

impl Serialize for SerializableInstruction {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> Result<()> {
        /* The load/store instructions follow the same pattern:
         *
         *   - short form (0-3) have special bytes
         *   - normal form (0-255) use `iload` plus a byte operand
         *   - wide form (255-65535) use `wide iload` plus two byte operands
         */
        fn serialize_load_or_store<W: WriteBytesExt>(
            idx: u16,
            short_form_start: u8,
            normal_form: u8,
            writer: &mut W,
        ) -> Result<()> {
            match u8::try_from(idx) {
                Ok(n @ 0..=3) => (short_form_start + n).serialize(writer),
                Ok(n) => {
                    normal_form.serialize(writer)?;
                    n.serialize(writer)
                }
                Err(_) => {
                    WIDE.serialize(writer)?;
                    normal_form.serialize(writer)?;
                    idx.serialize(writer)
                }
            }
        }

        fn opcode_and_index<W: WriteBytesExt>(opcode: u8, idx: u16, writer: &mut W) -> Result<()> {
            opcode.serialize(writer)?;
            idx.serialize(writer)
        }

        if let Some(opcode) = self.simple_opcode() {
            return opcode.serialize(writer);
        }

        use Instruction::*;
        match self {
            BiPush(b) => {
                0x10u8.serialize(writer)?;
                b.serialize(writer)?;
            }
            SiPush(s) => {
                0x11u8.serialize(writer)?;
                s.serialize(writer)?;
            }
            Ldc(ConstantIndex(idx)) => match u8::try_from(*idx) {
                Ok(b) => {
                    0x12u8.serialize(writer)?;
                    b.serialize(writer)?;
                }
                Err(_) => opcode_and_index(0x13, *idx, writer)?,
            },
            Ldc2(ConstantIndex(idx)) => opcode_and_index(0x14, *idx, writer)?,
            ILoad(idx) => serialize_load_or_store(*idx, 0x1a, 0x15, writer)?,
            LLoad(idx) => serialize_load_or_store(*idx, 0x1e, 0x16, writer)?,
            FLoad(idx) => serialize_load_or_store(*idx, 0x22, 0x17, writer)?,
            DLoad(idx) => serialize_load_or_store(*idx, 0x26, 0x18, writer)?,
            ALoad(idx) => serialize_load_or_store(*idx, 0x2a, 0x19, writer)?,
            IStore(idx) => serialize_load_or_store(*idx, 0x3b, 0x36, writer)?,
            LStore(idx) => serialize_load_or_store(*idx, 0x3f, 0x37, writer)?,
            FStore(idx) => serialize_load_or_store(*idx, 0x43, 0x38, writer)?,
            DStore(idx) => serialize_load_or_store(*idx, 0x47, 0x39, writer)?,
            AStore(idx) => serialize_load_or_store(*idx, 0x4b, 0x3a, writer)?,
            IInc(idx, diff) => match (u8::try_from(*idx), i8::try_from(*diff)) {
                (Ok(b), Ok(d)) => {
                    0x84u8.serialize(writer)?;
                    b.serialize(writer)?;
                    d.serialize(writer)?;
                }
                _ => {
                    WIDE.serialize(writer)?;
                    0x84u8.serialize(writer)?;
                    idx.serialize(writer)?;
                    diff.serialize(writer)?;
                }
            },
            GetStatic(idx) => opcode_and_index(0xb2, idx.0 .0, writer)?,
            PutStatic(idx) => opcode_and_index(0xb3, idx.0 .0, writer)?,
            GetField(idx) => opcode_and_index(0xb4, idx.0 .0, writer)?,
            PutField(idx) => opcode_and_index(0xb5, idx.0 .0, writer)?,
            Invoke(InvokeType::Virtual, idx) => opcode_and_index(0xb6, idx.0 .0, writer)?,
            Invoke(InvokeType::Special, idx) => opcode_and_index(0xb7, idx.0 .0, writer)?,
            Invoke(InvokeType::Static, idx) => opcode_and_index(0xb8, idx.0 .0, writer)?,
            Invoke(InvokeType::Interface(cnt), idx) => {
                opcode_and_index(0xb9, idx.0 .0, writer)?;
                cnt.serialize(writer)?;
                0u8.serialize(writer)?;
            }
            InvokeDynamic(idx) => {
                opcode_and_index(0xba, idx.0 .0, writer)?;
                0u16.serialize(writer)?;
            }
            New(idx) => opcode_and_index(0xbb, idx.0 .0, writer)?,
            NewArray(basetype) => {
                0xbcu8.serialize(writer)?;
                array_type_code(*basetype).serialize(writer)?;
            }
            ANewArray(idx) => opcode_and_index(0xbd, idx.0 .0, writer)?,
            CheckCast(idx) => opcode_and_index(0xc0, idx.0 .0, writer)?,
            InstanceOf(idx) => opcode_and_index(0xc1, idx.0 .0, writer)?,
            MultiANewArray(idx, dimensions) => {
                opcode_and_index(0xc5, idx.0 .0, writer)?;
                dimensions.serialize(writer)?;
            }
            _ => unreachable!("instruction without operands has a simple opcode"),
        }
        Ok(())
    }
}

/// Prefix opcode for the wide form of local variable instructions
pub const WIDE: u8 = 0xc4;

/// `atype` operand of `newarray`
pub fn array_type_code(base_type: BaseType) -> u8 {
    match base_type {
        BaseType::Boolean => 4,
        BaseType::Char => 5,
        BaseType::Float => 6,
        BaseType::Double => 7,
        BaseType::Byte => 8,
        BaseType::Short => 9,
        BaseType::Int => 10,
        BaseType::Long => 11,
    }
}

/// Inverse of [`array_type_code`]
pub fn array_type_from_code(code: u8) -> Option<BaseType> {
    Some(match code {
        4 => BaseType::Boolean,
        5 => BaseType::Char,
        6 => BaseType::Float,
        7 => BaseType::Double,
        8 => BaseType::Byte,
        9 => BaseType::Short,
        10 => BaseType::Int,
        11 => BaseType::Long,
        _ => return None,
    })
}

/// Branching JVM bytecode instruction
///
/// Jump targets are abstract labels. Whether a jump needs a wide encoding (`goto_w`, or an
/// inverted conditional over a `goto_w`) and how much padding a switch needs are decided only when
/// the code is laid out (see [`super::jump_encoding`]).
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum BranchInstruction<Lbl> {
    If(OrdComparison, Lbl), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, Lbl), // covers `if_icmpeq`, `if_icmpne`, `if_icmplt`, ... `if_icmple`
    IfACmp(EqComparison, Lbl), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, Lbl), // covers `ifnull`, `ifnonnull`
    Goto(Lbl),                 // covers `goto` and `goto_w`
    TableSwitch {
        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len() - 1`
        default: Lbl,

        /// Value associated with the first jump target
        low: i32,

        /// Jump targets
        targets: Vec<Lbl>,
    },
    LookupSwitch {
        /// Jump target if there is no corresponding key
        default: Lbl,

        /// Jump targets (sorted so that the keys are ascending)
        targets: Vec<(i32, Lbl)>,
    },
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl<Lbl> BranchInstruction<Lbl> {
    /// Can execution continue with the next instruction?
    pub fn falls_through(&self) -> bool {
        matches!(
            self,
            BranchInstruction::If(..)
                | BranchInstruction::IfICmp(..)
                | BranchInstruction::IfACmp(..)
                | BranchInstruction::IfNull(..)
        )
    }

    /// Is this a conditional jump or `goto` (the instructions that have 16-bit offsets)?
    pub fn is_short_jump(&self) -> bool {
        self.falls_through() || matches!(self, BranchInstruction::Goto(_))
    }

    /// Every label this instruction can jump to (not including fall through)
    pub fn jump_targets(&self) -> Vec<&Lbl> {
        match self {
            BranchInstruction::If(_, lbl)
            | BranchInstruction::IfICmp(_, lbl)
            | BranchInstruction::IfACmp(_, lbl)
            | BranchInstruction::IfNull(_, lbl)
            | BranchInstruction::Goto(lbl) => vec![lbl],
            BranchInstruction::TableSwitch {
                default, targets, ..
            } => std::iter::once(default).chain(targets.iter()).collect(),
            BranchInstruction::LookupSwitch { default, targets } => std::iter::once(default)
                .chain(targets.iter().map(|(_, target)| target))
                .collect(),
            BranchInstruction::IReturn
            | BranchInstruction::LReturn
            | BranchInstruction::FReturn
            | BranchInstruction::DReturn
            | BranchInstruction::AReturn
            | BranchInstruction::Return
            | BranchInstruction::AThrow => vec![],
        }
    }

    pub fn map_labels<Lbl2, E>(
        &self,
        mut map_label: impl FnMut(&Lbl) -> std::result::Result<Lbl2, E>,
    ) -> std::result::Result<BranchInstruction<Lbl2>, E> {
        use BranchInstruction::*;

        Ok(match self {
            If(op, lbl) => If(*op, map_label(lbl)?),
            IfICmp(op, lbl) => IfICmp(*op, map_label(lbl)?),
            IfACmp(op, lbl) => IfACmp(*op, map_label(lbl)?),
            IfNull(op, lbl) => IfNull(*op, map_label(lbl)?),
            Goto(lbl) => Goto(map_label(lbl)?),
            TableSwitch {
                default,
                low,
                targets,
            } => TableSwitch {
                default: map_label(default)?,
                low: *low,
                targets: targets
                    .iter()
                    .map(&mut map_label)
                    .collect::<std::result::Result<_, E>>()?,
            },
            LookupSwitch { default, targets } => LookupSwitch {
                default: map_label(default)?,
                targets: targets
                    .iter()
                    .map(|(key, lbl)| Ok((*key, map_label(lbl)?)))
                    .collect::<std::result::Result<_, E>>()?,
            },
            IReturn => IReturn,
            LReturn => LReturn,
            FReturn => FReturn,
            DReturn => DReturn,
            AReturn => AReturn,
            Return => Return,
            AThrow => AThrow,
        })
    }

    /// Same condition, but jumping when it is not satisfied
    ///
    /// Only conditional jumps can be inverted.
    pub fn inverted_condition(&self) -> Option<BranchInstruction<()>> {
        Some(match self {
            BranchInstruction::If(op, _) => BranchInstruction::If(!*op, ()),
            BranchInstruction::IfICmp(op, _) => BranchInstruction::IfICmp(!*op, ()),
            BranchInstruction::IfACmp(op, _) => BranchInstruction::IfACmp(!*op, ()),
            BranchInstruction::IfNull(op, _) => BranchInstruction::IfNull(!*op, ()),
            _ => return None,
        })
    }

    /// Opcode of the instruction (switches and returns included)
    pub fn opcode(&self) -> u8 {
        match self {
            BranchInstruction::If(comp, _) => match comp {
                OrdComparison::EQ => 0x99,
                OrdComparison::NE => 0x9a,
                OrdComparison::LT => 0x9b,
                OrdComparison::GE => 0x9c,
                OrdComparison::GT => 0x9d,
                OrdComparison::LE => 0x9e,
            },
            BranchInstruction::IfICmp(comp, _) => match comp {
                OrdComparison::EQ => 0x9f,
                OrdComparison::NE => 0xa0,
                OrdComparison::LT => 0xa1,
                OrdComparison::GE => 0xa2,
                OrdComparison::GT => 0xa3,
                OrdComparison::LE => 0xa4,
            },
            BranchInstruction::IfACmp(EqComparison::EQ, _) => 0xa5,
            BranchInstruction::IfACmp(EqComparison::NE, _) => 0xa6,
            BranchInstruction::Goto(_) => 0xa7,
            BranchInstruction::TableSwitch { .. } => 0xaa,
            BranchInstruction::LookupSwitch { .. } => 0xab,
            BranchInstruction::IReturn => 0xac,
            BranchInstruction::LReturn => 0xad,
            BranchInstruction::FReturn => 0xae,
            BranchInstruction::DReturn => 0xaf,
            BranchInstruction::AReturn => 0xb0,
            BranchInstruction::Return => 0xb1,
            BranchInstruction::AThrow => 0xbf,
            BranchInstruction::IfNull(EqComparison::EQ, _) => 0xc6,
            BranchInstruction::IfNull(EqComparison::NE, _) => 0xc7,
        }
    }
}

/// Possible bit shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality/inequality comparison operators
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}

/// Type of method to invoke
///
/// Note: `InvokeDynamic` is kept separate because the constant argument it expects is not to a
/// `Constant::MethodRef`.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface(u8), // `count` is of total arguments, where `long`/`double` count for 2
}

#[cfg(test)]
mod test {
    use super::*;

    fn encode(insn: SerializableInstruction) -> Vec<u8> {
        let mut out = vec![];
        insn.serialize(&mut out).unwrap();
        assert_eq!(out.len(), insn.width(), "width of {:?}", insn);
        out
    }

    #[test]
    fn local_variable_forms() {
        assert_eq!(encode(Instruction::ILoad(2)), vec![0x1c]);
        assert_eq!(encode(Instruction::ALoad(7)), vec![0x19, 7]);
        assert_eq!(encode(Instruction::DStore(300)), vec![0xc4, 0x39, 1, 44]);
        assert_eq!(encode(Instruction::IInc(3, -1)), vec![0x84, 3, 0xff]);
        assert_eq!(encode(Instruction::IInc(3, 1000)), vec![0xc4, 0x84, 0, 3, 3, 232]);
    }

    #[test]
    fn constant_loads_pick_narrowest_form() {
        let idx = |n| ConstantIndex(n);
        assert_eq!(encode(Instruction::Ldc(idx(4))), vec![0x12, 4]);
        assert_eq!(encode(Instruction::Ldc(idx(256))), vec![0x13, 1, 0]);
        assert_eq!(encode(Instruction::Ldc2(idx(4))), vec![0x14, 0, 4]);
    }

    #[test]
    fn simple_opcodes_round_trip() {
        for opcode in 0..=255u8 {
            if let Some(insn) = SerializableInstruction::from_simple_opcode(opcode) {
                assert_eq!(insn.simple_opcode(), Some(opcode));
                assert_eq!(encode(insn), vec![opcode]);
            }
        }
    }

    #[test]
    fn inverting_conditions() {
        let branch = BranchInstruction::IfICmp(OrdComparison::LT, 0usize);
        assert_eq!(
            branch.inverted_condition(),
            Some(BranchInstruction::IfICmp(OrdComparison::GE, ()))
        );
        assert_eq!(BranchInstruction::Goto(0usize).inverted_condition(), None);
    }
}
