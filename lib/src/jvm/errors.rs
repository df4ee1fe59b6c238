use super::code::SynLabel;
use super::BinaryName;
use crate::jvm::class_file::{Constant, ConstantPoolOverflow};
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),

    /// Bytes do not follow the class file format
    Malformed(String),

    /// Well-formed class using a feature that cannot be rewritten (eg. `jsr`, module descriptors)
    Unsupported(String),

    /// A locator could not produce a descriptor for this class
    ClassNotFound(BinaryName),

    ConstantPoolOverflow {
        constant: Constant,
        offset: u16,
    },
    MethodCodeOverflow {
        method: String,
        size: usize,
    },
    MethodCodeMaxStackOverflow(String),
    MethodCodeMaxLocalsOverflow(String),

    /// Frame computation rejected a method body
    VerifierError {
        method: String,
        instruction: usize,
        kind: VerifierErrorKind,
    },

    InvalidDescriptor(String),
    InvalidName(String),
}

#[derive(Debug)]
pub enum VerifierErrorKind {
    EmptyStack,
    InvalidWidth(usize),
    InvalidIndex(u16),
    NotArrayType,

    /// Two paths reach the same instruction with stacks that cannot be merged
    IncompatibleStacks(String),

    /// Execution can run past the last instruction
    FallsOffEnd,

    /// Jump or exception range refers to a label that is never placed
    UnplacedLabel(SynLabel),

    /// `<init>` invoked on a value that is not uninitialized
    NotUninitialized,
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}

impl From<ConstantPoolOverflow> for Error {
    fn from(overflow: ConstantPoolOverflow) -> Error {
        Error::ConstantPoolOverflow {
            constant: overflow.constant,
            offset: overflow.offset,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::IoError(err) => write!(f, "I/O error: {}", err),
            Error::Malformed(msg) => write!(f, "malformed class file: {}", msg),
            Error::Unsupported(msg) => write!(f, "unsupported class file feature: {}", msg),
            Error::ClassNotFound(name) => write!(f, "class not found: {}", name),
            Error::ConstantPoolOverflow { constant, offset } => write!(
                f,
                "constant pool overflow at {} while adding {:?}",
                offset, constant
            ),
            Error::MethodCodeOverflow { method, size } => {
                write!(f, "code of {} is too large ({} bytes)", method, size)
            }
            Error::MethodCodeMaxStackOverflow(method) => {
                write!(f, "operand stack of {} exceeds 65535 slots", method)
            }
            Error::MethodCodeMaxLocalsOverflow(method) => {
                write!(f, "locals of {} exceed 65535 slots", method)
            }
            Error::VerifierError {
                method,
                instruction,
                kind,
            } => write!(
                f,
                "cannot compute frames for {} at instruction {}: {:?}",
                method, instruction, kind
            ),
            Error::InvalidDescriptor(msg) => write!(f, "invalid descriptor: {}", msg),
            Error::InvalidName(msg) => write!(f, "invalid name: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(err) => Some(err),
            _ => None,
        }
    }
}
