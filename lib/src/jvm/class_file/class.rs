use crate::jvm::class_file::{
    Attribute, ClassConstantIndex, Constant, ConstantIndex, Deserialize, Field, Method,
    NameAndTypeConstantIndex, Serialize, Utf8ConstantIndex, Version,
};
use crate::jvm::{ClassAccessFlags, Error};
use crate::util::{Offset, OffsetResult, OffsetVec};
use byteorder::{ReadBytesExt, WriteBytesExt};
use std::io::ErrorKind;

/// Representation of the [`class` file format of the JVM][0]
///
/// This is the raw structure, with every name and type still an index into the constant pool.
///
/// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html
#[derive(Debug)]
pub struct ClassFile {
    pub version: Version,
    pub constants: OffsetVec<Constant>,
    pub access_flags: ClassAccessFlags,
    pub this_class: ClassConstantIndex,

    /// Only `java/lang/Object` has no super class
    pub super_class: Option<ClassConstantIndex>,
    pub interfaces: Vec<ClassConstantIndex>,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    pub attributes: Vec<Attribute>,
}

impl ClassFile {
    /// Magic header bytes that go at the front of the serialized class file
    const MAGIC: [u8; 4] = [0xCA, 0xFE, 0xBA, 0xBE];

    /// Parse a class file from its bytes
    pub fn parse(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        let class_file = ClassFile::deserialize(&mut reader).map_err(|err| match err.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => {
                Error::Malformed(err.to_string())
            }
            _ => Error::IoError(err),
        })?;
        if !reader.is_empty() {
            return Err(Error::Malformed(format!(
                "{} trailing bytes after class file",
                reader.len()
            )));
        }
        Ok(class_file)
    }

    /// Parse only the part of a class file before the fields
    ///
    /// The result has no fields, methods, or attributes. This is enough to know the name, super
    /// class, and interfaces of the class without looking at any code.
    pub fn parse_header(bytes: &[u8]) -> Result<ClassFile, Error> {
        let mut reader = bytes;
        ClassFile::deserialize_header(&mut reader).map_err(|err| match err.kind() {
            ErrorKind::InvalidData | ErrorKind::UnexpectedEof => Error::Malformed(err.to_string()),
            _ => Error::IoError(err),
        })
    }

    /// Serialize the class file into a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        let mut bytes = vec![];
        self.serialize(&mut bytes)?;
        Ok(bytes)
    }

    /// Look up an entry in the constant pool
    pub fn constant(&self, index: ConstantIndex) -> Result<&Constant, Error> {
        match self.constants.get_offset(Offset(index.0 as usize)) {
            OffsetResult::Ok(_, constant) => Ok(constant),
            OffsetResult::InvalidOffset(_) | OffsetResult::TooLarge => Err(Error::Malformed(
                format!("invalid constant pool index {}", index.0),
            )),
        }
    }

    /// Look up a `CONSTANT_Utf8_info`
    pub fn utf8(&self, index: Utf8ConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Utf8(string) => Ok(string),
            other => Err(unexpected_constant("Utf8", index.0, other)),
        }
    }

    /// Look up the internal name in a `CONSTANT_Class_info`
    pub fn class_name(&self, index: ClassConstantIndex) -> Result<&str, Error> {
        match self.constant(index.0)? {
            Constant::Class(name) => self.utf8(*name),
            other => Err(unexpected_constant("Class", index.0, other)),
        }
    }

    /// Look up the name and descriptor in a `CONSTANT_NameAndType_info`
    pub fn name_and_type(&self, index: NameAndTypeConstantIndex) -> Result<(&str, &str), Error> {
        match self.constant(index.0)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            other => Err(unexpected_constant("NameAndType", index.0, other)),
        }
    }

    /// Name of an attribute
    pub fn attribute_name(&self, attribute: &Attribute) -> Result<&str, Error> {
        self.utf8(attribute.name_index)
    }
}

fn unexpected_constant(expected: &str, index: ConstantIndex, found: &Constant) -> Error {
    Error::Malformed(format!(
        "expected {} constant at index {}, found {:?}",
        expected, index.0, found
    ))
}

impl Serialize for ClassFile {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(&ClassFile::MAGIC)?;
        self.version.serialize(writer)?;
        self.constants.serialize(writer)?;
        self.access_flags.serialize(writer)?;
        self.this_class.serialize(writer)?;
        match self.super_class {
            Some(super_class) => super_class.serialize(writer)?,
            None => 0u16.serialize(writer)?,
        }
        self.interfaces.serialize(writer)?;
        self.fields.serialize(writer)?;
        self.methods.serialize(writer)?;
        self.attributes.serialize(writer)?;
        Ok(())
    }
}

impl ClassFile {
    fn deserialize_header<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<ClassFile> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != ClassFile::MAGIC {
            let msg = "missing 0xCAFEBABE magic header";
            return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
        }

        let version = Version::deserialize(reader)?;

        let constant_pool_count = u16::deserialize(reader)? as usize;
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        while constants.offset_len().0 < constant_pool_count {
            constants.push(Constant::deserialize(reader)?);
        }
        if constants.offset_len().0 != constant_pool_count.max(1) {
            let msg = "wide constant overruns the constant pool";
            return Err(std::io::Error::new(ErrorKind::InvalidData, msg));
        }

        let access_flags = ClassAccessFlags::deserialize(reader)?;
        let this_class = ClassConstantIndex::deserialize(reader)?;
        let super_class = match u16::deserialize(reader)? {
            0 => None,
            idx => Some(ClassConstantIndex(ConstantIndex(idx))),
        };

        Ok(ClassFile {
            version,
            constants,
            access_flags,
            this_class,
            super_class,
            interfaces: Vec::deserialize(reader)?,
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        })
    }
}

impl Deserialize for ClassFile {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let header = ClassFile::deserialize_header(reader)?;
        Ok(ClassFile {
            fields: Vec::deserialize(reader)?,
            methods: Vec::deserialize(reader)?,
            attributes: Vec::deserialize(reader)?,
            ..header
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn minimal_class_file() -> ClassFile {
        let mut constants = OffsetVec::new_starting_at(Offset(1));
        constants.push(Constant::Utf8(String::from("Foo")));
        constants.push(Constant::Class(Utf8ConstantIndex(ConstantIndex(1))));
        constants.push(Constant::Long(3));
        constants.push(Constant::Utf8(String::from("java/lang/Object")));
        constants.push(Constant::Class(Utf8ConstantIndex(ConstantIndex(5))));
        ClassFile {
            version: Version::JAVA8,
            constants,
            access_flags: ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            this_class: ClassConstantIndex(ConstantIndex(2)),
            super_class: Some(ClassConstantIndex(ConstantIndex(6))),
            interfaces: vec![],
            fields: vec![],
            methods: vec![],
            attributes: vec![],
        }
    }

    #[test]
    fn parse_what_was_serialized() {
        let bytes = minimal_class_file().to_bytes().unwrap();
        assert_eq!(&bytes[0..4], &[0xCA, 0xFE, 0xBA, 0xBE]);

        let parsed = ClassFile::parse(&bytes).unwrap();
        assert_eq!(parsed.version, Version::JAVA8);
        assert_eq!(parsed.class_name(parsed.this_class).unwrap(), "Foo");
        let super_class = parsed.super_class.unwrap();
        assert_eq!(parsed.class_name(super_class).unwrap(), "java/lang/Object");
    }

    #[test]
    fn header_only_parse_skips_members() {
        let mut class_file = minimal_class_file();
        class_file.interfaces.push(ClassConstantIndex(ConstantIndex(6)));
        let bytes = class_file.to_bytes().unwrap();

        // Chop off everything after the interfaces
        let header = ClassFile::parse_header(&bytes[..bytes.len() - 6]).unwrap();
        assert_eq!(header.class_name(header.this_class).unwrap(), "Foo");
        assert_eq!(header.interfaces.len(), 1);
        assert!(header.methods.is_empty());
    }

    #[test]
    fn lookups_check_constant_kinds() {
        let class_file = minimal_class_file();
        assert!(class_file.utf8(Utf8ConstantIndex(ConstantIndex(2))).is_err());
        assert!(class_file.constant(ConstantIndex(4)).is_err(), "second slot of a long");
        assert!(class_file.constant(ConstantIndex(40)).is_err());
    }

    #[test]
    fn rejects_bad_magic_and_truncation() {
        let mut bytes = minimal_class_file().to_bytes().unwrap();
        assert!(matches!(
            ClassFile::parse(&bytes[..bytes.len() - 1]),
            Err(Error::Malformed(_))
        ));
        bytes[0] = 0;
        assert!(matches!(ClassFile::parse(&bytes), Err(Error::Malformed(_))));
    }
}
