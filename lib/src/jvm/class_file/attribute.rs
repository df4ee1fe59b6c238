use crate::jvm::class_file::{
    read_bytes, ClassConstantIndex, ConstantIndex, Deserialize, NameAndTypeConstantIndex,
    Serialize, Utf8ConstantIndex,
};
use crate::jvm::verifier::VerificationType;
use crate::jvm::{Error, InnerClassAccessFlags, ParameterAccessFlags};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::ErrorKind;

/// Attributes (used in classes, fields, methods, and even on some attributes)
///
/// The representation is designed to be easily extended with custom attributes.
/// While some attributes aren't essential, others are really important (eg. the
/// code attribute for including the actual bytecode).
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7
#[derive(Debug, Clone)]
pub struct Attribute {
    pub name_index: Utf8ConstantIndex,
    pub info: Vec<u8>,
}

impl Attribute {
    /// Decode the attribute body as a known attribute type
    ///
    /// The body must be consumed exactly.
    pub fn decode<A: AttributeLike + Deserialize>(&self) -> Result<A, Error> {
        let mut reader: &[u8] = &self.info;
        let attribute = A::deserialize(&mut reader)
            .map_err(|err| Error::Malformed(format!("{} attribute: {}", A::NAME, err)))?;
        if !reader.is_empty() {
            return Err(Error::Malformed(format!(
                "{} attribute has {} trailing bytes",
                A::NAME,
                reader.len()
            )));
        }
        Ok(attribute)
    }
}

impl Serialize for Attribute {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;

        // Attribute info length is 4 bytes
        (self.info.len() as u32).serialize(writer)?;
        writer.write_all(&self.info)?;

        Ok(())
    }
}

impl Deserialize for Attribute {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let name_index = Utf8ConstantIndex::deserialize(reader)?;
        let len = u32::deserialize(reader)?;
        let info = read_bytes(reader, len as usize)?;
        Ok(Attribute { name_index, info })
    }
}

/// Attributes are all stored in the same way (see `Attribute`), but internally
/// they represent very different things. This trait is implemented by things
/// which can be turned into attributes.
pub trait AttributeLike: Serialize {
    /// Name of the attribute
    const NAME: &'static str;
}

/// Attribute whose body is a single constant index
macro_rules! index_attribute {
    ($(#[$meta:meta])* $name:ident($index:ty) = $attr_name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name(pub $index);

        impl AttributeLike for $name {
            const NAME: &'static str = $attr_name;
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $name {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($name(<$index>::deserialize(reader)?))
            }
        }
    };
}

/// Attribute whose body is a `u16`-prefixed list
macro_rules! list_attribute {
    ($(#[$meta:meta])* $name:ident($elem:ty) = $attr_name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone)]
        pub struct $name(pub Vec<$elem>);

        impl AttributeLike for $name {
            const NAME: &'static str = $attr_name;
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $name {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($name(Vec::deserialize(reader)?))
            }
        }
    };
}

/// Attribute with an empty body
macro_rules! marker_attribute {
    ($(#[$meta:meta])* $name:ident = $attr_name:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy)]
        pub struct $name;

        impl AttributeLike for $name {
            const NAME: &'static str = $attr_name;
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, _writer: &mut W) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl Deserialize for $name {
            fn deserialize<R: ReadBytesExt>(_reader: &mut R) -> std::io::Result<Self> {
                Ok($name)
            }
        }
    };
}

index_attribute!(
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.2
    ConstantValue(ConstantIndex) = "ConstantValue"
);
index_attribute!(
    /// Generic signature, see [`crate::jvm::signatures`]
    Signature(Utf8ConstantIndex) = "Signature"
);
index_attribute!(SourceFile(Utf8ConstantIndex) = "SourceFile");
index_attribute!(
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.28
    NestHost(ClassConstantIndex) = "NestHost"
);

list_attribute!(
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.29
    NestMembers(ClassConstantIndex) = "NestMembers"
);
list_attribute!(PermittedSubclasses(ClassConstantIndex) = "PermittedSubclasses");
list_attribute!(
    /// Checked exceptions declared by a method
    Exceptions(ClassConstantIndex) = "Exceptions"
);
list_attribute!(
    /// Every inner class referenced in a class' constant pool must be included in the inner
    /// classes attribute on the class.
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.6
    InnerClasses(InnerClass) = "InnerClasses"
);
list_attribute!(
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.23
    BootstrapMethods(BootstrapMethod) = "BootstrapMethods"
);
list_attribute!(LineNumberTable(LineNumber) = "LineNumberTable");
list_attribute!(LocalVariableTable(LocalVariable) = "LocalVariableTable");
list_attribute!(
    /// Same layout as `LocalVariableTable`, but the descriptor index points to a signature
    LocalVariableTypeTable(LocalVariable) = "LocalVariableTypeTable"
);
list_attribute!(RuntimeVisibleAnnotations(Annotation) = "RuntimeVisibleAnnotations");
list_attribute!(RuntimeInvisibleAnnotations(Annotation) = "RuntimeInvisibleAnnotations");
list_attribute!(Record(RecordComponent) = "Record");
list_attribute!(
    /// Stack map frames (only ever written, since frames are always recomputed)
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.4
    StackMapTable(StackMapFrame) = "StackMapTable"
);

marker_attribute!(Deprecated = "Deprecated");
marker_attribute!(Synthetic = "Synthetic");

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.3
#[derive(Debug, Clone)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub code_array: BytecodeArray,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<Attribute>,
}

impl Serialize for Code {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.max_stack.serialize(writer)?;
        self.max_locals.serialize(writer)?;
        self.code_array.serialize(writer)?;
        self.exception_table.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Code {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(Code {
            max_stack: u16::deserialize(reader)?,
            max_locals: u16::deserialize(reader)?,
            code_array: BytecodeArray::deserialize(reader)?,
            exception_table: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

impl AttributeLike for Code {
    const NAME: &'static str = "Code";
}

#[derive(Debug, Clone)]
pub struct ExceptionHandler {
    /// Start of exception handler range (inclusive)
    pub start_pc: BytecodeIndex,

    /// End of exception handler range (exclusive)
    pub end_pc: BytecodeIndex,

    /// Start of the exception handler
    pub handler_pc: BytecodeIndex,

    /// Class of exceptions caught (`None` catches everything)
    pub catch_type: Option<ClassConstantIndex>,
}

impl Serialize for ExceptionHandler {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.end_pc.serialize(writer)?;
        self.handler_pc.serialize(writer)?;
        match self.catch_type {
            Some(catch_type) => catch_type.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        Ok(())
    }
}

impl Deserialize for ExceptionHandler {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ExceptionHandler {
            start_pc: BytecodeIndex::deserialize(reader)?,
            end_pc: BytecodeIndex::deserialize(reader)?,
            handler_pc: BytecodeIndex::deserialize(reader)?,
            catch_type: optional_index(reader)?.map(ClassConstantIndex),
        })
    }
}

/// Encoded bytecode instructions
#[derive(Debug, Clone)]
pub struct BytecodeArray(pub Vec<u8>);

impl Serialize for BytecodeArray {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let len = self.0.len() as u32;
        len.serialize(writer)?;
        writer.write_all(&self.0)?;
        Ok(())
    }
}

impl Deserialize for BytecodeArray {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let len = u32::deserialize(reader)?;
        if len == 0 || len > u16::MAX as u32 {
            let msg = format!("code array length {} out of range", len);
            return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
        }
        Ok(BytecodeArray(read_bytes(reader, len as usize)?))
    }
}

/// Index into `BytecodeArray`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BytecodeIndex(pub u16);

impl Serialize for BytecodeIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for BytecodeIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(BytecodeIndex(u16::deserialize(reader)?))
    }
}

#[derive(Debug, Clone)]
pub enum StackMapFrame {
    /// Frame has the same locals as the previous frame and number of stack items is zero
    /// Tags: 0-63 or 251
    SameLocalsNoStack { offset_delta: u16 },

    /// Frame has the same locals as the previous frame and number of stack items is one
    /// Tags: 64-127 or 247
    SameLocalsOneStack {
        offset_delta: u16,
        stack: VerificationType<ClassConstantIndex, u16>,
    },

    /// Frame is like the previous frame, but without the last `chopped_k` locals
    ///
    /// Note: `chopped_k` must be in the range 1 to 3 inclusive
    /// Tags: 248-250
    ChopLocalsNoStack { offset_delta: u16, chopped_k: u8 },

    /// Frame is like the previous frame, but with extra locals
    /// Tags: 252-254
    AppendLocalsNoStack {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
    },

    /// Frame has exactly the locals and stack specified
    /// Tag: 255
    Full {
        offset_delta: u16,
        locals: Vec<VerificationType<ClassConstantIndex, u16>>,
        stack: Vec<VerificationType<ClassConstantIndex, u16>>,
    },
}

impl Serialize for StackMapFrame {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            // `same_frame` and `same_frame_extended`
            StackMapFrame::SameLocalsNoStack { offset_delta } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8).serialize(writer)?;
                } else {
                    251u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
            }

            // `same_locals_1_stack_item_frame` and `same_locals_1_stack_item_frame_extended`
            StackMapFrame::SameLocalsOneStack {
                offset_delta,
                stack,
            } => {
                if *offset_delta <= 63 {
                    (*offset_delta as u8 + 64).serialize(writer)?;
                } else {
                    247u8.serialize(writer)?;
                    offset_delta.serialize(writer)?;
                }
                stack.serialize(writer)?;
            }

            // `chop_frame`
            StackMapFrame::ChopLocalsNoStack {
                offset_delta,
                chopped_k,
            } => {
                if !(1..=3).contains(chopped_k) {
                    let msg = "chop frames remove 1 to 3 locals";
                    return Err(std::io::Error::new(ErrorKind::InvalidInput, msg));
                }
                (251 - chopped_k).serialize(writer)?;
                offset_delta.serialize(writer)?;
            }

            // `append_frame`
            StackMapFrame::AppendLocalsNoStack {
                offset_delta,
                locals,
            } => {
                let added_k = locals.len();
                if !(1..=3).contains(&added_k) {
                    let msg = "append frames add 1 to 3 locals";
                    return Err(std::io::Error::new(ErrorKind::InvalidInput, msg));
                }
                (251 + added_k as u8).serialize(writer)?;
                offset_delta.serialize(writer)?;
                for local in locals {
                    local.serialize(writer)?;
                }
            }

            // `full_frame`
            StackMapFrame::Full {
                offset_delta,
                locals,
                stack,
            } => {
                255u8.serialize(writer)?;
                offset_delta.serialize(writer)?;
                locals.serialize(writer)?;
                stack.serialize(writer)?;
            }
        };
        Ok(())
    }
}

/// Stack map tables are never read back, frames are recomputed from the code instead
impl Deserialize for StackMapFrame {
    fn deserialize<R: ReadBytesExt>(_reader: &mut R) -> std::io::Result<Self> {
        let msg = "stack map frames are not decoded";
        Err(std::io::Error::new(ErrorKind::Unsupported, msg))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BootstrapMethod {
    pub bootstrap_method: ConstantIndex,
    pub bootstrap_arguments: Vec<ConstantIndex>,
}

impl Serialize for BootstrapMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.bootstrap_method.serialize(writer)?;
        self.bootstrap_arguments.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for BootstrapMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(BootstrapMethod {
            bootstrap_method: ConstantIndex::deserialize(reader)?,
            bootstrap_arguments: Vec::deserialize(reader)?,
        })
    }
}

#[derive(Debug, Clone)]
pub struct InnerClass {
    pub inner_class: ClassConstantIndex,
    pub outer_class: Option<ClassConstantIndex>,
    pub inner_name: Option<Utf8ConstantIndex>,
    pub access_flags: InnerClassAccessFlags,
}

impl Serialize for InnerClass {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.inner_class.serialize(writer)?;
        serialize_optional_index(self.outer_class.map(|idx| idx.0), writer)?;
        serialize_optional_index(self.inner_name.map(|idx| idx.0), writer)?;
        self.access_flags.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for InnerClass {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(InnerClass {
            inner_class: ClassConstantIndex::deserialize(reader)?,
            outer_class: optional_index(reader)?.map(ClassConstantIndex),
            inner_name: optional_index(reader)?.map(Utf8ConstantIndex),
            access_flags: InnerClassAccessFlags::deserialize(reader)?,
        })
    }
}

/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.7
#[derive(Debug, Clone, Copy)]
pub struct EnclosingMethod {
    pub class: ClassConstantIndex,
    pub method: Option<NameAndTypeConstantIndex>,
}

impl AttributeLike for EnclosingMethod {
    const NAME: &'static str = "EnclosingMethod";
}

impl Serialize for EnclosingMethod {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.class.serialize(writer)?;
        serialize_optional_index(self.method.map(|idx| idx.0), writer)
    }
}

impl Deserialize for EnclosingMethod {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(EnclosingMethod {
            class: ClassConstantIndex::deserialize(reader)?,
            method: optional_index(reader)?.map(NameAndTypeConstantIndex),
        })
    }
}

/// Raw bytes of the (modified UTF-8) debug extension string
#[derive(Debug, Clone)]
pub struct SourceDebugExtension(pub Vec<u8>);

impl AttributeLike for SourceDebugExtension {
    const NAME: &'static str = "SourceDebugExtension";
}

impl Serialize for SourceDebugExtension {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&self.0)
    }
}

impl Deserialize for SourceDebugExtension {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let mut bytes = vec![];
        reader.read_to_end(&mut bytes)?;
        Ok(SourceDebugExtension(bytes))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LineNumber {
    pub start_pc: BytecodeIndex,
    pub line_number: u16,
}

impl Serialize for LineNumber {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.line_number.serialize(writer)
    }
}

impl Deserialize for LineNumber {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LineNumber {
            start_pc: BytecodeIndex::deserialize(reader)?,
            line_number: u16::deserialize(reader)?,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LocalVariable {
    pub start_pc: BytecodeIndex,
    pub length: u16,
    pub name_index: Utf8ConstantIndex,

    /// Descriptor (in `LocalVariableTable`) or signature (in `LocalVariableTypeTable`)
    pub descriptor_index: Utf8ConstantIndex,
    pub index: u16,
}

impl Serialize for LocalVariable {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.start_pc.serialize(writer)?;
        self.length.serialize(writer)?;
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.index.serialize(writer)
    }
}

impl Deserialize for LocalVariable {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(LocalVariable {
            start_pc: BytecodeIndex::deserialize(reader)?,
            length: u16::deserialize(reader)?,
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            index: u16::deserialize(reader)?,
        })
    }
}

/// Method parameters (note the count is a single byte)
#[derive(Debug, Clone)]
pub struct MethodParameters(pub Vec<MethodParameter>);

#[derive(Debug, Clone, Copy)]
pub struct MethodParameter {
    pub name: Option<Utf8ConstantIndex>,
    pub access_flags: ParameterAccessFlags,
}

impl AttributeLike for MethodParameters {
    const NAME: &'static str = "MethodParameters";
}

impl Serialize for MethodParameters {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u8).serialize(writer)?;
        for parameter in &self.0 {
            serialize_optional_index(parameter.name.map(|idx| idx.0), writer)?;
            parameter.access_flags.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for MethodParameters {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let count = u8::deserialize(reader)?;
        let mut parameters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            parameters.push(MethodParameter {
                name: optional_index(reader)?.map(Utf8ConstantIndex),
                access_flags: ParameterAccessFlags::deserialize(reader)?,
            });
        }
        Ok(MethodParameters(parameters))
    }
}

/// Annotation as stored in `Runtime*Annotations` attributes
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.16
#[derive(Debug, Clone)]
pub struct Annotation {
    pub type_index: Utf8ConstantIndex,
    pub element_value_pairs: Vec<(Utf8ConstantIndex, ElementValue)>,
}

impl Serialize for Annotation {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.type_index.serialize(writer)?;
        (self.element_value_pairs.len() as u16).serialize(writer)?;
        for (name, value) in &self.element_value_pairs {
            name.serialize(writer)?;
            value.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for Annotation {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let type_index = Utf8ConstantIndex::deserialize(reader)?;
        let count = u16::deserialize(reader)?;
        let mut element_value_pairs = Vec::with_capacity(count as usize);
        for _ in 0..count {
            let name = Utf8ConstantIndex::deserialize(reader)?;
            element_value_pairs.push((name, ElementValue::deserialize(reader)?));
        }
        Ok(Annotation {
            type_index,
            element_value_pairs,
        })
    }
}

#[derive(Debug, Clone)]
pub enum ElementValue {
    /// Primitive or string constant (the tag is one of `BCDFIJSZs`)
    Const { tag: u8, value: ConstantIndex },
    Enum {
        type_name: Utf8ConstantIndex,
        const_name: Utf8ConstantIndex,
    },
    Class(Utf8ConstantIndex),
    Annotation(Box<Annotation>),
    Array(Vec<ElementValue>),
}

impl Serialize for ElementValue {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            ElementValue::Const { tag, value } => {
                tag.serialize(writer)?;
                value.serialize(writer)?;
            }
            ElementValue::Enum {
                type_name,
                const_name,
            } => {
                b'e'.serialize(writer)?;
                type_name.serialize(writer)?;
                const_name.serialize(writer)?;
            }
            ElementValue::Class(class_info) => {
                b'c'.serialize(writer)?;
                class_info.serialize(writer)?;
            }
            ElementValue::Annotation(annotation) => {
                b'@'.serialize(writer)?;
                annotation.serialize(writer)?;
            }
            ElementValue::Array(values) => {
                b'['.serialize(writer)?;
                values.serialize(writer)?;
            }
        }
        Ok(())
    }
}

impl Deserialize for ElementValue {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        Ok(match tag {
            b'B' | b'C' | b'D' | b'F' | b'I' | b'J' | b'S' | b'Z' | b's' => ElementValue::Const {
                tag,
                value: ConstantIndex::deserialize(reader)?,
            },
            b'e' => ElementValue::Enum {
                type_name: Utf8ConstantIndex::deserialize(reader)?,
                const_name: Utf8ConstantIndex::deserialize(reader)?,
            },
            b'c' => ElementValue::Class(Utf8ConstantIndex::deserialize(reader)?),
            b'@' => ElementValue::Annotation(Box::new(Annotation::deserialize(reader)?)),
            b'[' => ElementValue::Array(Vec::deserialize(reader)?),
            other => {
                let msg = format!("unknown element value tag {:?}", other as char);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        })
    }
}

/// Default value of an annotation interface element
#[derive(Debug, Clone)]
pub struct AnnotationDefault(pub ElementValue);

impl AttributeLike for AnnotationDefault {
    const NAME: &'static str = "AnnotationDefault";
}

impl Serialize for AnnotationDefault {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for AnnotationDefault {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(AnnotationDefault(ElementValue::deserialize(reader)?))
    }
}

/// Per-parameter annotations (note the parameter count is a single byte)
#[derive(Debug, Clone)]
pub struct ParameterAnnotations(pub Vec<Vec<Annotation>>);

/// `RuntimeVisibleParameterAnnotations`
#[derive(Debug, Clone)]
pub struct RuntimeVisibleParameterAnnotations(pub ParameterAnnotations);

/// `RuntimeInvisibleParameterAnnotations`
#[derive(Debug, Clone)]
pub struct RuntimeInvisibleParameterAnnotations(pub ParameterAnnotations);

impl Serialize for ParameterAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        (self.0.len() as u8).serialize(writer)?;
        for annotations in &self.0 {
            annotations.serialize(writer)?;
        }
        Ok(())
    }
}

impl Deserialize for ParameterAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let count = u8::deserialize(reader)?;
        let mut parameters = Vec::with_capacity(count as usize);
        for _ in 0..count {
            parameters.push(Vec::deserialize(reader)?);
        }
        Ok(ParameterAnnotations(parameters))
    }
}

impl AttributeLike for RuntimeVisibleParameterAnnotations {
    const NAME: &'static str = "RuntimeVisibleParameterAnnotations";
}

impl Serialize for RuntimeVisibleParameterAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeVisibleParameterAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RuntimeVisibleParameterAnnotations(
            ParameterAnnotations::deserialize(reader)?,
        ))
    }
}

impl AttributeLike for RuntimeInvisibleParameterAnnotations {
    const NAME: &'static str = "RuntimeInvisibleParameterAnnotations";
}

impl Serialize for RuntimeInvisibleParameterAnnotations {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for RuntimeInvisibleParameterAnnotations {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RuntimeInvisibleParameterAnnotations(
            ParameterAnnotations::deserialize(reader)?,
        ))
    }
}

/// Component of a record class
#[derive(Debug, Clone)]
pub struct RecordComponent {
    pub name_index: Utf8ConstantIndex,
    pub descriptor_index: Utf8ConstantIndex,
    pub attributes: Vec<Attribute>,
}

impl Serialize for RecordComponent {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.name_index.serialize(writer)?;
        self.descriptor_index.serialize(writer)?;
        self.attributes.serialize(writer)
    }
}

impl Deserialize for RecordComponent {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(RecordComponent {
            name_index: Utf8ConstantIndex::deserialize(reader)?,
            descriptor_index: Utf8ConstantIndex::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
        })
    }
}

/// Constant pool index where `0` means "absent"
fn optional_index<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Option<ConstantIndex>> {
    let index = u16::deserialize(reader)?;
    Ok(if index == 0 {
        None
    } else {
        Some(ConstantIndex(index))
    })
}

fn serialize_optional_index<W: WriteBytesExt>(
    index: Option<ConstantIndex>,
    writer: &mut W,
) -> std::io::Result<()> {
    match index {
        Some(index) => index.serialize(writer),
        None => 0u16.serialize(writer),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn stack_map_frame_tags() {
        let mut out = vec![];
        StackMapFrame::SameLocalsNoStack { offset_delta: 5 }
            .serialize(&mut out)
            .unwrap();
        StackMapFrame::SameLocalsNoStack { offset_delta: 300 }
            .serialize(&mut out)
            .unwrap();
        StackMapFrame::ChopLocalsNoStack {
            offset_delta: 1,
            chopped_k: 2,
        }
        .serialize(&mut out)
        .unwrap();
        assert_eq!(out, vec![5, 251, 1, 44, 249, 0, 1]);
    }

    #[test]
    fn invalid_append_frame_is_an_error() {
        let frame = StackMapFrame::AppendLocalsNoStack {
            offset_delta: 0,
            locals: vec![],
        };
        assert!(frame.serialize(&mut vec![]).is_err());
    }

    #[test]
    fn decode_rejects_trailing_bytes() {
        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 3, 0],
        };
        assert!(attribute.decode::<SourceFile>().is_err());

        let attribute = Attribute {
            name_index: Utf8ConstantIndex(ConstantIndex(1)),
            info: vec![0, 3],
        };
        assert_eq!(attribute.decode::<SourceFile>().unwrap().0 .0, ConstantIndex(3));
    }

    #[test]
    fn nested_element_values() {
        let value = ElementValue::Array(vec![
            ElementValue::Const {
                tag: b'I',
                value: ConstantIndex(7),
            },
            ElementValue::Enum {
                type_name: Utf8ConstantIndex(ConstantIndex(8)),
                const_name: Utf8ConstantIndex(ConstantIndex(9)),
            },
        ]);
        let mut out = vec![];
        value.serialize(&mut out).unwrap();
        assert_eq!(out, vec![b'[', 0, 2, b'I', 0, 7, b'e', 0, 8, 0, 9]);
        assert!(matches!(
            ElementValue::deserialize(&mut &out[..]).unwrap(),
            ElementValue::Array(values) if values.len() == 2
        ));
    }
}
