use super::{
    array_type_from_code, BranchInstruction, EqComparison, Instruction, InvokeType, OrdComparison,
    SerializableInstruction, WIDE,
};
use crate::jvm::class_file::{
    ClassConstantIndex, ConstantIndex, FieldRefConstantIndex, InvokeDynamicConstantIndex,
    MethodRefConstantIndex,
};
use crate::jvm::Error;

/// Instruction decoded from a code array
#[derive(Clone, Debug, PartialEq)]
pub enum DecodedInstruction {
    Instruction(SerializableInstruction),

    /// Branch whose targets are absolute offsets into the code array
    Branch(BranchInstruction<usize>),
}

/// Decode a full code array into instructions, each paired with its offset
///
/// Every jump target is checked to be inside the code array (but not necessarily at the start of
/// an instruction - that is left to the caller, which has to map offsets to labels anyway).
pub fn decode_code_array(code: &[u8]) -> Result<Vec<(usize, DecodedInstruction)>, Error> {
    let mut cursor = CodeCursor { code, pc: 0 };
    let mut decoded = vec![];
    while cursor.pc < code.len() {
        let start = cursor.pc;
        let instruction = cursor.decode_one()?;
        if let DecodedInstruction::Branch(branch) = &instruction {
            if let Some(target) = branch.jump_targets().into_iter().find(|t| **t >= code.len()) {
                return Err(Error::Malformed(format!(
                    "jump from {} to {} is outside of the code array",
                    start, target
                )));
            }
        }
        decoded.push((start, instruction));
    }
    Ok(decoded)
}

struct CodeCursor<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> CodeCursor<'a> {
    fn truncated(&self) -> Error {
        Error::Malformed(format!("truncated instruction at offset {}", self.pc))
    }

    fn bytes<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let end = self.pc + N;
        let slice = self.code.get(self.pc..end).ok_or_else(|| self.truncated())?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        self.pc = end;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8, Error> {
        Ok(self.bytes::<1>()?[0])
    }

    fn i8(&mut self) -> Result<i8, Error> {
        Ok(i8::from_be_bytes(self.bytes()?))
    }

    fn u16(&mut self) -> Result<u16, Error> {
        Ok(u16::from_be_bytes(self.bytes()?))
    }

    fn i16(&mut self) -> Result<i16, Error> {
        Ok(i16::from_be_bytes(self.bytes()?))
    }

    fn i32(&mut self) -> Result<i32, Error> {
        Ok(i32::from_be_bytes(self.bytes()?))
    }

    fn decode_one(&mut self) -> Result<DecodedInstruction, Error> {
        use DecodedInstruction::{Branch as B, Instruction as I};
        use Instruction::*;

        let start = self.pc;
        let opcode = self.u8()?;
        if let Some(simple) = SerializableInstruction::from_simple_opcode(opcode) {
            return Ok(I(simple));
        }

        Ok(match opcode {
            0x10 => I(BiPush(self.i8()?)),
            0x11 => I(SiPush(self.i16()?)),
            0x12 => I(Ldc(ConstantIndex(self.u8()? as u16))),
            0x13 => I(Ldc(ConstantIndex(self.u16()?))),
            0x14 => I(Ldc2(ConstantIndex(self.u16()?))),
            0x15..=0x19 => I(load(opcode - 0x15, self.u8()? as u16)),
            0x1a..=0x2d => I(load((opcode - 0x1a) / 4, ((opcode - 0x1a) % 4) as u16)),
            0x36..=0x3a => I(store(opcode - 0x36, self.u8()? as u16)),
            0x3b..=0x4e => I(store((opcode - 0x3b) / 4, ((opcode - 0x3b) % 4) as u16)),
            0x84 => {
                let index = self.u8()? as u16;
                I(IInc(index, self.i8()? as i16))
            }
            0x99..=0x9e => B(BranchInstruction::If(
                ord_comparison(opcode - 0x99),
                jump_target(start, self.i16()? as i64)?,
            )),
            0x9f..=0xa4 => B(BranchInstruction::IfICmp(
                ord_comparison(opcode - 0x9f),
                jump_target(start, self.i16()? as i64)?,
            )),
            0xa5 | 0xa6 => B(BranchInstruction::IfACmp(
                eq_comparison(opcode == 0xa5),
                jump_target(start, self.i16()? as i64)?,
            )),
            0xa7 => B(BranchInstruction::Goto(jump_target(start, self.i16()? as i64)?)),
            0xa8 | 0xa9 | 0xc9 => {
                return Err(Error::Unsupported(format!(
                    "subroutine instruction 0x{:02x} at offset {}",
                    opcode, start
                )))
            }
            0xaa => {
                self.skip_switch_padding()?;
                let default = jump_target(start, self.i32()? as i64)?;
                let low = self.i32()?;
                let high = self.i32()?;
                if high < low {
                    return Err(Error::Malformed(format!(
                        "tableswitch at {} has high {} below low {}",
                        start, high, low
                    )));
                }
                let count = (high as i64 - low as i64 + 1) as usize;
                if count * 4 > self.code.len() - self.pc {
                    return Err(self.truncated());
                }
                let mut targets = Vec::with_capacity(count);
                for _ in 0..count {
                    targets.push(jump_target(start, self.i32()? as i64)?);
                }
                B(BranchInstruction::TableSwitch {
                    default,
                    low,
                    targets,
                })
            }
            0xab => {
                self.skip_switch_padding()?;
                let default = jump_target(start, self.i32()? as i64)?;
                let npairs = self.i32()?;
                if npairs < 0 || npairs as usize * 8 > self.code.len() - self.pc {
                    return Err(self.truncated());
                }
                let mut targets = Vec::with_capacity(npairs as usize);
                for _ in 0..npairs {
                    let key = self.i32()?;
                    targets.push((key, jump_target(start, self.i32()? as i64)?));
                }
                B(BranchInstruction::LookupSwitch { default, targets })
            }
            0xac => B(BranchInstruction::IReturn),
            0xad => B(BranchInstruction::LReturn),
            0xae => B(BranchInstruction::FReturn),
            0xaf => B(BranchInstruction::DReturn),
            0xb0 => B(BranchInstruction::AReturn),
            0xb1 => B(BranchInstruction::Return),
            0xb2 => I(GetStatic(self.field()?)),
            0xb3 => I(PutStatic(self.field()?)),
            0xb4 => I(GetField(self.field()?)),
            0xb5 => I(PutField(self.field()?)),
            0xb6 => I(Invoke(InvokeType::Virtual, self.method()?)),
            0xb7 => I(Invoke(InvokeType::Special, self.method()?)),
            0xb8 => I(Invoke(InvokeType::Static, self.method()?)),
            0xb9 => {
                let method = self.method()?;
                let count = self.u8()?;
                let _zero = self.u8()?;
                I(Invoke(InvokeType::Interface(count), method))
            }
            0xba => {
                let index = InvokeDynamicConstantIndex(ConstantIndex(self.u16()?));
                let _zeros = self.u16()?;
                I(InvokeDynamic(index))
            }
            0xbb => I(New(self.class()?)),
            0xbc => {
                let code = self.u8()?;
                let base_type = array_type_from_code(code).ok_or_else(|| {
                    Error::Malformed(format!("invalid newarray type {} at {}", code, start))
                })?;
                I(NewArray(base_type))
            }
            0xbd => I(ANewArray(self.class()?)),
            0xbf => B(BranchInstruction::AThrow),
            0xc0 => I(CheckCast(self.class()?)),
            0xc1 => I(InstanceOf(self.class()?)),
            WIDE => {
                let modified = self.u8()?;
                match modified {
                    0x15..=0x19 => I(load(modified - 0x15, self.u16()?)),
                    0x36..=0x3a => I(store(modified - 0x36, self.u16()?)),
                    0x84 => {
                        let index = self.u16()?;
                        I(IInc(index, self.i16()?))
                    }
                    0xa9 => {
                        return Err(Error::Unsupported(format!(
                            "subroutine instruction wide ret at offset {}",
                            start
                        )))
                    }
                    other => {
                        return Err(Error::Malformed(format!(
                            "wide cannot modify opcode 0x{:02x} at offset {}",
                            other, start
                        )))
                    }
                }
            }
            0xc5 => {
                let class = self.class()?;
                I(MultiANewArray(class, self.u8()?))
            }
            0xc6 | 0xc7 => B(BranchInstruction::IfNull(
                eq_comparison(opcode == 0xc6),
                jump_target(start, self.i16()? as i64)?,
            )),
            0xc8 => B(BranchInstruction::Goto(jump_target(start, self.i32()? as i64)?)),
            other => {
                return Err(Error::Malformed(format!(
                    "unknown opcode 0x{:02x} at offset {}",
                    other, start
                )))
            }
        })
    }

    /// Switch operands are aligned to 4 bytes from the start of the code array
    fn skip_switch_padding(&mut self) -> Result<(), Error> {
        while self.pc % 4 != 0 {
            self.u8()?;
        }
        Ok(())
    }

    fn class(&mut self) -> Result<ClassConstantIndex, Error> {
        Ok(ClassConstantIndex(ConstantIndex(self.u16()?)))
    }

    fn field(&mut self) -> Result<FieldRefConstantIndex, Error> {
        Ok(FieldRefConstantIndex(ConstantIndex(self.u16()?)))
    }

    fn method(&mut self) -> Result<MethodRefConstantIndex, Error> {
        Ok(MethodRefConstantIndex(ConstantIndex(self.u16()?)))
    }
}

fn jump_target(start: usize, delta: i64) -> Result<usize, Error> {
    let target = start as i64 + delta;
    if target < 0 {
        return Err(Error::Malformed(format!(
            "jump from {} to negative offset {}",
            start, target
        )));
    }
    Ok(target as usize)
}

/// Load instruction by type (in `ILoad`, `LLoad`, `FLoad`, `DLoad`, `ALoad` order)
fn load(kind: u8, index: u16) -> SerializableInstruction {
    match kind {
        0 => Instruction::ILoad(index),
        1 => Instruction::LLoad(index),
        2 => Instruction::FLoad(index),
        3 => Instruction::DLoad(index),
        _ => Instruction::ALoad(index),
    }
}

fn store(kind: u8, index: u16) -> SerializableInstruction {
    match kind {
        0 => Instruction::IStore(index),
        1 => Instruction::LStore(index),
        2 => Instruction::FStore(index),
        3 => Instruction::DStore(index),
        _ => Instruction::AStore(index),
    }
}

/// Opcode order of the `if<cond>` and `if_icmp<cond>` families
fn ord_comparison(offset: u8) -> OrdComparison {
    match offset {
        0 => OrdComparison::EQ,
        1 => OrdComparison::NE,
        2 => OrdComparison::LT,
        3 => OrdComparison::GE,
        4 => OrdComparison::GT,
        _ => OrdComparison::LE,
    }
}

fn eq_comparison(is_eq: bool) -> EqComparison {
    if is_eq {
        EqComparison::EQ
    } else {
        EqComparison::NE
    }
}
