use crate::jvm::class_file::{
    read_bytes, Attribute, AttributeLike, BootstrapMethod as BootstrapMethodEntry, Deserialize,
    Serialize,
};
use crate::jvm::descriptors::RenderDescriptor;
use crate::jvm::model::{
    BootstrapMethod, ConstantValue, DynamicConstant, FieldRef, Handle, InvokeDynamic, MemberRef,
    MethodRef,
};
use crate::jvm::names::Name;
use crate::jvm::{BinaryName, Error, RefType};
use crate::util::{Offset, OffsetVec, Width};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::borrow::{Borrow, Cow};
use std::collections::HashMap;
use std::io::ErrorKind;
use std::result::Result;

/// Class file constants pool builder
///
/// The pool is append only and deduplicates every entry by value. Only after the pool is fully
/// built up can it be consumed into a regular [`OffsetVec`] (along with the bootstrap methods that
/// `invokedynamic` and dynamic constants refer to). The [`ConstantsWriter`] trait exposes
/// inserting model values into the constants pool.
#[derive(Default)]
pub struct ConstantsPool {
    constants: OffsetVec<Constant>,

    classes: HashMap<String, ClassConstantIndex>,
    fieldrefs: HashMap<(ClassConstantIndex, NameAndTypeConstantIndex), FieldRefConstantIndex>,
    methodrefs:
        HashMap<(ClassConstantIndex, NameAndTypeConstantIndex, bool), MethodRefConstantIndex>,
    strings: HashMap<Utf8ConstantIndex, StringConstantIndex>,
    integers: HashMap<i32, ConstantIndex>,
    floats: HashMap<u32, ConstantIndex>,
    longs: HashMap<i64, ConstantIndex>,
    doubles: HashMap<u64, ConstantIndex>,
    name_and_types: HashMap<(Utf8ConstantIndex, Utf8ConstantIndex), NameAndTypeConstantIndex>,
    utf8s: HashMap<String, Utf8ConstantIndex>,
    method_handles: HashMap<(HandleKind, ConstantIndex), ConstantIndex>,
    method_types: HashMap<Utf8ConstantIndex, ConstantIndex>,
    invoke_dynamics: HashMap<(u16, NameAndTypeConstantIndex), InvokeDynamicConstantIndex>,
    dynamics: HashMap<(u16, NameAndTypeConstantIndex), ConstantIndex>,

    bootstrap_methods: Vec<BootstrapMethodEntry>,
    bootstrap_method_indices: HashMap<BootstrapMethodEntry, u16>,
}

impl ConstantsPool {
    /// Make a fresh empty constants pool
    pub fn new() -> ConstantsPool {
        ConstantsPool {
            constants: OffsetVec::new_starting_at(Offset(1)),
            ..ConstantsPool::default()
        }
    }

    /// Push a constant into the constant pool, provided there is space for it
    ///
    /// Note: the largest valid index is 65535, indexing starts at 1, and some constants take two
    /// spaces.
    fn push_constant(&mut self, constant: Constant) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let offset = self.constants.offset_len().0;
        if offset + constant.width() > u16::MAX as usize {
            return Err(ConstantPoolOverflow {
                constant,
                offset: offset as u16,
            });
        }

        self.constants.push(constant);
        Ok(ConstantIndex(offset as u16))
    }

    /// Whether any `invokedynamic` or dynamic constant needed a bootstrap method
    pub fn has_bootstrap_methods(&self) -> bool {
        !self.bootstrap_methods.is_empty()
    }

    /// Consume the pool and return the final vector of constants and bootstrap methods
    pub fn into_parts(self) -> (OffsetVec<Constant>, Vec<BootstrapMethodEntry>) {
        (self.constants, self.bootstrap_methods)
    }

    /// Get or insert a utf8 constant from the constant pool
    pub fn get_utf8<'a, S: Into<Cow<'a, str>>>(
        &mut self,
        utf8: S,
    ) -> Result<Utf8ConstantIndex, ConstantPoolOverflow> {
        let cow = utf8.into();

        if let Some(idx) = self.utf8s.get::<str>(cow.borrow()) {
            Ok(*idx)
        } else {
            let owned = cow.into_owned();
            let idx = Utf8ConstantIndex(self.push_constant(Constant::Utf8(owned.clone()))?);
            self.utf8s.insert(owned, idx);
            Ok(idx)
        }
    }

    /// Get or insert a string constant from the constant pool
    pub fn get_string(
        &mut self,
        string: &str,
    ) -> Result<StringConstantIndex, ConstantPoolOverflow> {
        let utf8 = self.get_utf8(string)?;
        if let Some(idx) = self.strings.get(&utf8) {
            Ok(*idx)
        } else {
            let idx = StringConstantIndex(self.push_constant(Constant::String(utf8))?);
            self.strings.insert(utf8, idx);
            Ok(idx)
        }
    }

    /// Get or insert a class constant from its internal name (the full descriptor for arrays)
    pub fn get_class(
        &mut self,
        internal_name: &str,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.classes.get(internal_name) {
            Ok(*idx)
        } else {
            let name = self.get_utf8(internal_name)?;
            let idx = ClassConstantIndex(self.push_constant(Constant::Class(name))?);
            self.classes.insert(internal_name.to_owned(), idx);
            Ok(idx)
        }
    }

    /// Get or insert a name & type constant from the constant pool
    pub fn get_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<NameAndTypeConstantIndex, ConstantPoolOverflow> {
        let name = self.get_utf8(name)?;
        let descriptor = self.get_utf8(descriptor)?;
        let name_and_type_key = (name, descriptor);
        if let Some(idx) = self.name_and_types.get(&name_and_type_key) {
            Ok(*idx)
        } else {
            let constant = Constant::NameAndType { name, descriptor };
            let idx = NameAndTypeConstantIndex(self.push_constant(constant)?);
            self.name_and_types.insert(name_and_type_key, idx);
            Ok(idx)
        }
    }

    fn get_integer(&mut self, integer: i32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.integers.get(&integer) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Integer(integer))?;
        self.integers.insert(integer, idx);
        Ok(idx)
    }

    fn get_float(&mut self, float: f32) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.floats.get(&float.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Float(float))?;
        self.floats.insert(float.to_bits(), idx);
        Ok(idx)
    }

    fn get_long(&mut self, long: i64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.longs.get(&long) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Long(long))?;
        self.longs.insert(long, idx);
        Ok(idx)
    }

    fn get_double(&mut self, double: f64) -> Result<ConstantIndex, ConstantPoolOverflow> {
        if let Some(idx) = self.doubles.get(&double.to_bits()) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::Double(double))?;
        self.doubles.insert(double.to_bits(), idx);
        Ok(idx)
    }

    fn get_method_type(&mut self, descriptor: &str) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let descriptor = self.get_utf8(descriptor)?;
        if let Some(idx) = self.method_types.get(&descriptor) {
            return Ok(*idx);
        }
        let idx = self.push_constant(Constant::MethodType { descriptor })?;
        self.method_types.insert(descriptor, idx);
        Ok(idx)
    }

    /// Get or insert a method handle constant from the constant pool
    fn get_method_handle(
        &mut self,
        handle_kind: HandleKind,
        member: ConstantIndex,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let handle_key = (handle_kind, member);
        if let Some(idx) = self.method_handles.get(&handle_key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodHandle {
                handle_kind,
                member,
            };
            let idx = self.push_constant(constant)?;
            self.method_handles.insert(handle_key, idx);
            Ok(idx)
        }
    }

    /// Get or insert an entry in the bootstrap methods table
    fn get_bootstrap_method(
        &mut self,
        entry: BootstrapMethodEntry,
    ) -> Result<u16, ConstantPoolOverflow> {
        if let Some(idx) = self.bootstrap_method_indices.get(&entry) {
            return Ok(*idx);
        }
        let idx = match u16::try_from(self.bootstrap_methods.len()) {
            Ok(idx) => idx,
            Err(_) => {
                return Err(ConstantPoolOverflow {
                    constant: Constant::MethodHandle {
                        handle_kind: HandleKind::InvokeStatic,
                        member: entry.bootstrap_method,
                    },
                    offset: u16::MAX,
                })
            }
        };
        self.bootstrap_methods.push(entry.clone());
        self.bootstrap_method_indices.insert(entry, idx);
        Ok(idx)
    }

    /// Get or insert an invoke dynamic constant from the constant pool
    pub fn get_invoke_dynamic(
        &mut self,
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    ) -> Result<InvokeDynamicConstantIndex, ConstantPoolOverflow> {
        let indy_key = (bootstrap_method, method_descriptor);
        if let Some(idx) = self.invoke_dynamics.get(&indy_key) {
            Ok(*idx)
        } else {
            let constant = Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            };
            let idx = InvokeDynamicConstantIndex(self.push_constant(constant)?);
            self.invoke_dynamics.insert(indy_key, idx);
            Ok(idx)
        }
    }

    fn get_dynamic(
        &mut self,
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let key = (bootstrap_method, name_and_type);
        if let Some(idx) = self.dynamics.get(&key) {
            return Ok(*idx);
        }
        let constant = Constant::Dynamic {
            bootstrap_method,
            name_and_type,
        };
        let idx = self.push_constant(constant)?;
        self.dynamics.insert(key, idx);
        Ok(idx)
    }

    /// Add an attribute to the constant pool
    pub fn get_attribute<A: AttributeLike>(&mut self, attribute: A) -> Result<Attribute, Error> {
        let name_index = self.get_utf8(A::NAME)?;
        let mut info = vec![];

        attribute.serialize(&mut info).map_err(Error::IoError)?;

        Ok(Attribute { name_index, info })
    }
}

#[derive(Debug)]
pub struct ConstantPoolOverflow {
    pub constant: Constant,
    pub offset: u16,
}

/// Constants as in the constant pool
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4
#[derive(Debug, Clone)]
pub enum Constant {
    /// Class or an interface
    Class(Utf8ConstantIndex),

    /// Field
    FieldRef(ClassConstantIndex, NameAndTypeConstantIndex),

    /// Method (this combines `Methodref` and `InterfaceMethodref`
    MethodRef {
        class: ClassConstantIndex,
        name_and_type: NameAndTypeConstantIndex,
        is_interface: bool,
    },

    /// Constant object of type `java.lang.String`
    String(Utf8ConstantIndex),

    /// Constant primitive of type `int`
    Integer(i32),

    /// Constant primitive of type `float`
    Float(f32),

    /// Constant primitive of type `long`
    Long(i64),

    /// Constant primitive of type `double`
    Double(f64),

    /// Name and a type (eg. for a field or a method)
    NameAndType {
        name: Utf8ConstantIndex,
        descriptor: Utf8ConstantIndex,
    },

    /// Constant UTF-8 encoded raw string value
    ///
    /// Despite the name, the encoding is not quite UTF-8 (the encoding of the
    /// null character `\u{0000}` and the encoding of supplementary characters
    /// is different).
    Utf8(String),

    /// Constant object of type `java.lang.invoke.MethodHandle`
    MethodHandle {
        handle_kind: HandleKind,

        /// Depending on the method kind, this points to different things:
        ///
        ///   - `FieldRef` for `GetField`, `GetStatic`, `PutField`, `PutStatic`
        ///   - `MethodRef` for the rest
        member: ConstantIndex,
    },

    /// Method type
    MethodType { descriptor: Utf8ConstantIndex },

    /// Dynamically-computed constant
    Dynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        name_and_type: NameAndTypeConstantIndex,
    },

    /// Dynamically-computed call site
    InvokeDynamic {
        /// Index into the `BootstrapMethods` attribute
        bootstrap_method: u16,
        method_descriptor: NameAndTypeConstantIndex,
    },

    /// Module (only valid in `module-info` classes)
    Module(Utf8ConstantIndex),

    /// Package (only valid in `module-info` classes)
    Package(Utf8ConstantIndex),
}

impl Serialize for Constant {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        match self {
            Constant::Utf8(string) => {
                1u8.serialize(writer)?;
                let buffer: Vec<u8> = encode_modified_utf8(string);
                if buffer.len() > u16::MAX as usize {
                    let msg = "UTF-8 constant is longer than 65535 bytes";
                    return Err(std::io::Error::new(ErrorKind::InvalidInput, msg));
                }
                (buffer.len() as u16).serialize(writer)?;
                writer.write_all(&buffer)?;
            }
            Constant::Integer(integer) => {
                3u8.serialize(writer)?;
                integer.serialize(writer)?;
            }
            Constant::Float(float) => {
                4u8.serialize(writer)?;
                float.serialize(writer)?;
            }
            Constant::Long(long) => {
                5u8.serialize(writer)?;
                long.serialize(writer)?;
            }
            Constant::Double(double) => {
                6u8.serialize(writer)?;
                double.serialize(writer)?;
            }
            Constant::Class(name) => {
                7u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::String(bytes) => {
                8u8.serialize(writer)?;
                bytes.serialize(writer)?;
            }
            Constant::FieldRef(class, name_and_type) => {
                9u8.serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::MethodRef {
                class,
                name_and_type,
                is_interface,
            } => {
                (if !is_interface { 10u8 } else { 11u8 }).serialize(writer)?;
                class.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::NameAndType { name, descriptor } => {
                12u8.serialize(writer)?;
                name.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::MethodHandle {
                handle_kind,
                member,
            } => {
                15u8.serialize(writer)?;
                handle_kind.serialize(writer)?;
                member.serialize(writer)?;
            }
            Constant::MethodType { descriptor } => {
                16u8.serialize(writer)?;
                descriptor.serialize(writer)?;
            }
            Constant::Dynamic {
                bootstrap_method,
                name_and_type,
            } => {
                17u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                name_and_type.serialize(writer)?;
            }
            Constant::InvokeDynamic {
                bootstrap_method,
                method_descriptor,
            } => {
                18u8.serialize(writer)?;
                bootstrap_method.serialize(writer)?;
                method_descriptor.serialize(writer)?;
            }
            Constant::Module(name) => {
                19u8.serialize(writer)?;
                name.serialize(writer)?;
            }
            Constant::Package(name) => {
                20u8.serialize(writer)?;
                name.serialize(writer)?;
            }
        };
        Ok(())
    }
}

impl Deserialize for Constant {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let tag = u8::deserialize(reader)?;
        let constant = match tag {
            1 => {
                let len = u16::deserialize(reader)?;
                let bytes = read_bytes(reader, len as usize)?;
                let string = decode_modified_utf8(&bytes)
                    .map_err(|msg| std::io::Error::new(ErrorKind::InvalidData, msg))?;
                Constant::Utf8(string)
            }
            3 => Constant::Integer(i32::deserialize(reader)?),
            4 => Constant::Float(f32::deserialize(reader)?),
            5 => Constant::Long(i64::deserialize(reader)?),
            6 => Constant::Double(f64::deserialize(reader)?),
            7 => Constant::Class(Utf8ConstantIndex::deserialize(reader)?),
            8 => Constant::String(Utf8ConstantIndex::deserialize(reader)?),
            9 => Constant::FieldRef(
                ClassConstantIndex::deserialize(reader)?,
                NameAndTypeConstantIndex::deserialize(reader)?,
            ),
            10 | 11 => Constant::MethodRef {
                class: ClassConstantIndex::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
                is_interface: tag == 11,
            },
            12 => Constant::NameAndType {
                name: Utf8ConstantIndex::deserialize(reader)?,
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            15 => Constant::MethodHandle {
                handle_kind: HandleKind::deserialize(reader)?,
                member: ConstantIndex::deserialize(reader)?,
            },
            16 => Constant::MethodType {
                descriptor: Utf8ConstantIndex::deserialize(reader)?,
            },
            17 => Constant::Dynamic {
                bootstrap_method: u16::deserialize(reader)?,
                name_and_type: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            18 => Constant::InvokeDynamic {
                bootstrap_method: u16::deserialize(reader)?,
                method_descriptor: NameAndTypeConstantIndex::deserialize(reader)?,
            },
            19 => Constant::Module(Utf8ConstantIndex::deserialize(reader)?),
            20 => Constant::Package(Utf8ConstantIndex::deserialize(reader)?),
            other => {
                let msg = format!("unknown constant pool tag {}", other);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        };
        Ok(constant)
    }
}

/// Modified UTF-8 format used in class files.
///
/// See [this `DataInput` section for details][0]. Quoting from that section:
///
/// > The differences between this format and the standard UTF-8 format are the following:
/// >
/// >  * The null byte `\u0000` is encoded in 2-byte format rather than 1-byte, so that the encoded
/// >    strings never have embedded nulls.
/// >  * Only the 1-byte, 2-byte, and 3-byte formats are used.
/// >  * Supplementary characters are represented in the form of surrogate pairs.
///
/// [0]: https://docs.oracle.com/en/java/javase/17/docs/api/java.base/java/io/DataInput.html#modified-utf-8
pub fn encode_modified_utf8(string: &str) -> Vec<u8> {
    let mut buffer: Vec<u8> = Vec::with_capacity(string.len());
    for unit in string.encode_utf16() {
        match unit {
            0x0001..=0x007F => buffer.push(unit as u8),
            0x0000 | 0x0080..=0x07FF => {
                buffer.push((unit >> 6 & 0x1F) as u8 | 0b1100_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
            _ => {
                buffer.push((unit >> 12 & 0x0F) as u8 | 0b1110_0000);
                buffer.push((unit >> 6 & 0x3F) as u8 | 0b1000_0000);
                buffer.push((unit & 0x3F) as u8 | 0b1000_0000);
            }
        }
    }
    buffer
}

/// Inverse of [`encode_modified_utf8`]
///
/// Strings that don't decode to valid UTF-16 (eg. unpaired surrogates) are rejected.
pub fn decode_modified_utf8(bytes: &[u8]) -> Result<String, String> {
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut idx = 0;
    let continuation = |idx: usize| -> Result<u16, String> {
        match bytes.get(idx) {
            Some(b) if b & 0b1100_0000 == 0b1000_0000 => Ok((b & 0x3F) as u16),
            Some(b) => Err(format!("invalid continuation byte {:#x} at {}", b, idx)),
            None => Err(String::from("truncated multi-byte sequence")),
        }
    };

    while idx < bytes.len() {
        let byte = bytes[idx];
        match byte {
            0x01..=0x7F => {
                units.push(byte as u16);
                idx += 1;
            }
            0xC0..=0xDF => {
                let low = continuation(idx + 1)?;
                units.push(((byte & 0x1F) as u16) << 6 | low);
                idx += 2;
            }
            0xE0..=0xEF => {
                let mid = continuation(idx + 1)?;
                let low = continuation(idx + 2)?;
                units.push(((byte & 0x0F) as u16) << 12 | mid << 6 | low);
                idx += 3;
            }
            _ => return Err(format!("invalid byte {:#x} at {}", byte, idx)),
        }
    }

    String::from_utf16(&units).map_err(|err| err.to_string())
}


/// Almost all constants have width 1, except for `Constant::Long` and `Constant::Double`. Quoting
/// the JVM specification:
///
/// > All 8-byte constants take up two entries in the constant_pool table of the class file. If a
/// > CONSTANT_Long_info or CONSTANT_Double_info structure is the item in the constant_pool table
/// > at index n, then the next usable item in the pool is located at index n+2. The constant_pool
/// > index n+1 must be valid but is considered unusable.
impl Width for Constant {
    fn width(&self) -> usize {
        match self {
            Constant::Long(_) | Constant::Double(_) => 2,
            _ => 1,
        }
    }
}

#[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
pub struct ConstantIndex(pub u16);

impl Serialize for ConstantIndex {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.0.serialize(writer)
    }
}

impl Deserialize for ConstantIndex {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(ConstantIndex(u16::deserialize(reader)?))
    }
}

/// Declare a constant index specialized to one kind of constant
macro_rules! typed_constant_index {
    ($name:ident) => {
        #[derive(Copy, Clone, Hash, Eq, PartialEq, Debug)]
        pub struct $name(pub ConstantIndex);

        impl From<$name> for ConstantIndex {
            fn from(index: $name) -> ConstantIndex {
                index.0
            }
        }

        impl Serialize for $name {
            fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
                self.0.serialize(writer)
            }
        }

        impl Deserialize for $name {
            fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
                Ok($name(ConstantIndex::deserialize(reader)?))
            }
        }
    };
}

typed_constant_index!(Utf8ConstantIndex);
typed_constant_index!(StringConstantIndex);
typed_constant_index!(NameAndTypeConstantIndex);
typed_constant_index!(ClassConstantIndex);
typed_constant_index!(FieldRefConstantIndex);
typed_constant_index!(MethodRefConstantIndex);
typed_constant_index!(InvokeDynamicConstantIndex);

/// Type of method handle
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-5.html#jvms-5.4.3.5-220
#[derive(Copy, Clone, Debug, Hash, Eq, PartialEq)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    /// Does the handle refer to a field (as opposed to a method)?
    pub fn is_field(&self) -> bool {
        matches!(
            self,
            HandleKind::GetField
                | HandleKind::GetStatic
                | HandleKind::PutField
                | HandleKind::PutStatic
        )
    }
}

impl Serialize for HandleKind {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        let byte: u8 = match self {
            HandleKind::GetField => 1,
            HandleKind::GetStatic => 2,
            HandleKind::PutField => 3,
            HandleKind::PutStatic => 4,
            HandleKind::InvokeVirtual => 5,
            HandleKind::InvokeStatic => 6,
            HandleKind::InvokeSpecial => 7,
            HandleKind::NewInvokeSpecial => 8,
            HandleKind::InvokeInterface => 9,
        };
        byte.serialize(writer)
    }
}

impl Deserialize for HandleKind {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        Ok(match u8::deserialize(reader)? {
            1 => HandleKind::GetField,
            2 => HandleKind::GetStatic,
            3 => HandleKind::PutField,
            4 => HandleKind::PutStatic,
            5 => HandleKind::InvokeVirtual,
            6 => HandleKind::InvokeStatic,
            7 => HandleKind::InvokeSpecial,
            8 => HandleKind::NewInvokeSpecial,
            9 => HandleKind::InvokeInterface,
            other => {
                let msg = format!("unknown method handle kind {}", other);
                return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
            }
        })
    }
}

pub trait ConstantsWriter<Index = ConstantIndex> {
    /// Get or insert a constant into the constant pool and return the associated index
    fn constant_index(
        &self,
        constants_pool: &mut ConstantsPool,
    ) -> Result<Index, ConstantPoolOverflow>;
}

/// When making a `CONSTANT_Class_info`, reference types are almost always objects. However,
/// there are a handful of places where an array type needs to be fit in (eg. for a `checkcast`
/// to an array type). See [this section of the JVM specification][0] for more.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
impl ConstantsWriter<ClassConstantIndex> for RefType<BinaryName> {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        match self {
            RefType::Object(class) => constants.get_class(class.as_str()),
            other => constants.get_class(&other.render()),
        }
    }
}

impl ConstantsWriter<ClassConstantIndex> for BinaryName {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ClassConstantIndex, ConstantPoolOverflow> {
        constants.get_class(self.as_str())
    }
}

/// Write a `CONSTANT_Fieldref_info`
impl ConstantsWriter<FieldRefConstantIndex> for FieldRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<FieldRefConstantIndex, ConstantPoolOverflow> {
        let class_idx = self.owner.constant_index(constants)?;
        let name_and_type_idx =
            constants.get_name_and_type(self.name.as_str(), &self.descriptor.render())?;
        let key = (class_idx, name_and_type_idx);
        if let Some(idx) = constants.fieldrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::FieldRef(class_idx, name_and_type_idx);
            let idx = FieldRefConstantIndex(constants.push_constant(constant)?);
            constants.fieldrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Write a `CONSTANT_Methodref_info` or `CONSTANT_InterfaceMethodref_info`
impl ConstantsWriter<MethodRefConstantIndex> for MethodRef {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<MethodRefConstantIndex, ConstantPoolOverflow> {
        let class_idx = self.owner.constant_index(constants)?;
        let name_and_type_idx =
            constants.get_name_and_type(self.name.as_str(), &self.descriptor.render())?;
        let key = (class_idx, name_and_type_idx, self.is_interface);
        if let Some(idx) = constants.methodrefs.get(&key) {
            Ok(*idx)
        } else {
            let constant = Constant::MethodRef {
                class: class_idx,
                name_and_type: name_and_type_idx,
                is_interface: self.is_interface,
            };
            let idx = MethodRefConstantIndex(constants.push_constant(constant)?);
            constants.methodrefs.insert(key, idx);
            Ok(idx)
        }
    }
}

/// Write a `CONSTANT_MethodHandle_info`
impl ConstantsWriter<ConstantIndex> for Handle {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let member_idx: ConstantIndex = match &self.member {
            MemberRef::Field(field) => field.constant_index(constants)?.into(),
            MemberRef::Method(method) => method.constant_index(constants)?.into(),
        };
        constants.get_method_handle(self.kind, member_idx)
    }
}

/// Write an entry in the `BootstrapMethods` attribute, returning its index in that table
impl ConstantsWriter<u16> for BootstrapMethod {
    fn constant_index(&self, constants: &mut ConstantsPool) -> Result<u16, ConstantPoolOverflow> {
        let bootstrap_method = self.handle.constant_index(constants)?;
        let bootstrap_arguments = self
            .arguments
            .iter()
            .map(|argument| argument.constant_index(constants))
            .collect::<Result<Vec<ConstantIndex>, _>>()?;
        constants.get_bootstrap_method(BootstrapMethodEntry {
            bootstrap_method,
            bootstrap_arguments,
        })
    }
}

/// Write a `CONSTANT_InvokeDynamic_info`
impl ConstantsWriter<InvokeDynamicConstantIndex> for InvokeDynamic {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<InvokeDynamicConstantIndex, ConstantPoolOverflow> {
        let bootstrap_method = self.bootstrap.constant_index(constants)?;
        let name_and_type =
            constants.get_name_and_type(self.name.as_str(), &self.descriptor.render())?;
        constants.get_invoke_dynamic(bootstrap_method, name_and_type)
    }
}

/// Write a `CONSTANT_Dynamic_info`
impl ConstantsWriter<ConstantIndex> for DynamicConstant {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        let bootstrap_method = self.bootstrap.constant_index(constants)?;
        let name_and_type =
            constants.get_name_and_type(self.name.as_str(), &self.descriptor.render())?;
        constants.get_dynamic(bootstrap_method, name_and_type)
    }
}

/// Write a constant which can be loaded up using `ldc` or `ldc2_w`
impl ConstantsWriter<ConstantIndex> for ConstantValue {
    fn constant_index(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<ConstantIndex, ConstantPoolOverflow> {
        match self {
            ConstantValue::Integer(integer) => constants.get_integer(*integer),
            ConstantValue::Float(float) => constants.get_float(*float),
            ConstantValue::Long(long) => constants.get_long(*long),
            ConstantValue::Double(double) => constants.get_double(*double),
            ConstantValue::String(string) => Ok(constants.get_string(string)?.into()),
            ConstantValue::Class(class) => Ok(class.constant_index(constants)?.into()),
            ConstantValue::MethodType(descriptor) => {
                constants.get_method_type(&descriptor.render())
            }
            ConstantValue::MethodHandle(handle) => handle.constant_index(constants),
            ConstantValue::Dynamic(dynamic) => dynamic.constant_index(constants),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::{FieldType, MethodDescriptor, UnqualifiedName};

    #[test]
    fn pool_deduplicates_by_value() {
        let mut pool = ConstantsPool::new();
        let object = BinaryName::OBJECT.constant_index(&mut pool).unwrap();
        let object_again = RefType::Object(BinaryName::OBJECT)
            .constant_index(&mut pool)
            .unwrap();
        assert_eq!(object, object_again);

        let nan1 = ConstantValue::Float(f32::NAN).constant_index(&mut pool).unwrap();
        let nan2 = ConstantValue::Float(f32::NAN).constant_index(&mut pool).unwrap();
        assert_eq!(nan1, nan2);

        let string = ConstantValue::String(String::from("java/lang/Object"))
            .constant_index(&mut pool)
            .unwrap();
        let (constants, _) = pool.into_parts();

        // utf8 for the class name is shared with the string constant
        assert_eq!(constants.len(), 4);
        assert!(matches!(
            constants.get_offset(Offset(string.0 as usize)).ok(),
            Some(Constant::String(Utf8ConstantIndex(ConstantIndex(1))))
        ));
    }

    #[test]
    fn wide_constants_take_two_slots() {
        let mut pool = ConstantsPool::new();
        let long = ConstantValue::Long(5).constant_index(&mut pool).unwrap();
        let int = ConstantValue::Integer(5).constant_index(&mut pool).unwrap();
        assert_eq!(long, ConstantIndex(1));
        assert_eq!(int, ConstantIndex(3));
    }

    #[test]
    fn bootstrap_methods_are_shared() {
        let mut pool = ConstantsPool::new();
        let bootstrap = BootstrapMethod {
            handle: Handle {
                kind: HandleKind::InvokeStatic,
                member: MemberRef::Method(MethodRef::new(
                    BinaryName::from_str("java/lang/invoke/StringConcatFactory").unwrap(),
                    UnqualifiedName::from_str("makeConcatWithConstants").unwrap(),
                    MethodDescriptor {
                        parameters: vec![],
                        return_type: Some(FieldType::object(BinaryName::OBJECT)),
                    },
                )),
            },
            arguments: vec![ConstantValue::String(String::from("\u{1}!"))],
        };
        let indy = |name: &str| InvokeDynamic {
            name: UnqualifiedName::from_str(name).unwrap(),
            descriptor: MethodDescriptor {
                parameters: vec![FieldType::int()],
                return_type: Some(FieldType::object(BinaryName::STRING)),
            },
            bootstrap: bootstrap.clone(),
        };
        let first = indy("a").constant_index(&mut pool).unwrap();
        let second = indy("b").constant_index(&mut pool).unwrap();
        assert_ne!(first, second);

        let (_, bootstrap_methods) = pool.into_parts();
        assert_eq!(bootstrap_methods.len(), 1);
        assert_eq!(bootstrap_methods[0].bootstrap_arguments.len(), 1);
    }

    #[test]
    fn constant_round_trip_through_bytes() {
        let constants = vec![
            Constant::Utf8(String::from("héllo\u{0}")),
            Constant::Long(-7),
            Constant::MethodRef {
                class: ClassConstantIndex(ConstantIndex(4)),
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(9)),
                is_interface: true,
            },
            Constant::Dynamic {
                bootstrap_method: 2,
                name_and_type: NameAndTypeConstantIndex(ConstantIndex(3)),
            },
        ];
        for constant in constants {
            let mut bytes = vec![];
            constant.serialize(&mut bytes).unwrap();
            let decoded = Constant::deserialize(&mut &bytes[..]).unwrap();
            assert_eq!(format!("{:?}", decoded), format!("{:?}", constant));
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert!(Constant::deserialize(&mut &[2u8, 0, 0][..]).is_err());
    }
}
