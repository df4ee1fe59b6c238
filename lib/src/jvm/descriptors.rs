use super::{BinaryName, Name};
use crate::util::Width;
use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Utility trait for converting descriptors to string representations
pub trait RenderDescriptor {
    /// Turn the descriptor into a string
    fn render(&self) -> String {
        let mut string = String::new();
        self.render_to(&mut string);
        string
    }

    /// Write the descriptor to a string
    fn render_to(&self, write_to: &mut String);
}

pub trait ParseDescriptor: Sized {
    /// Parse a descriptor from a string
    fn parse(source: &str) -> Result<Self> {
        let mut chars = source.chars().peekable();
        let ret = Self::parse_from(&mut chars)?;
        match chars.next() {
            None => Ok(ret),
            Some(c) => {
                let msg = format!("Unexpected leftover input '{}' in '{}'", c, source);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    /// Read the descriptor from a character buffer
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self>;
}

/// Primitive value types
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum BaseType {
    Byte,
    Char,
    Double,
    Float,
    Int,
    Long,
    Short,
    Boolean,
}

impl BaseType {
    /// Wrapper class used when boxing this primitive
    pub fn boxed_class(&self) -> BinaryName {
        match self {
            BaseType::Byte => BinaryName::BYTE,
            BaseType::Char => BinaryName::CHARACTER,
            BaseType::Double => BinaryName::DOUBLE,
            BaseType::Float => BinaryName::FLOAT,
            BaseType::Int => BinaryName::INTEGER,
            BaseType::Long => BinaryName::LONG,
            BaseType::Short => BinaryName::SHORT,
            BaseType::Boolean => BinaryName::BOOLEAN,
        }
    }
}

impl Width for BaseType {
    fn width(&self) -> usize {
        match self {
            BaseType::Byte
            | BaseType::Char
            | BaseType::Float
            | BaseType::Int
            | BaseType::Short
            | BaseType::Boolean => 1,
            BaseType::Double | BaseType::Long => 2,
        }
    }
}

impl RenderDescriptor for BaseType {
    fn render_to(&self, write_to: &mut String) {
        let c = match self {
            BaseType::Byte => 'B',
            BaseType::Char => 'C',
            BaseType::Double => 'D',
            BaseType::Float => 'F',
            BaseType::Int => 'I',
            BaseType::Long => 'J',
            BaseType::Short => 'S',
            BaseType::Boolean => 'Z',
        };
        write_to.push(c);
    }
}

impl ParseDescriptor for BaseType {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        let typ = match source.next() {
            Some('B') => BaseType::Byte,
            Some('C') => BaseType::Char,
            Some('D') => BaseType::Double,
            Some('F') => BaseType::Float,
            Some('I') => BaseType::Int,
            Some('J') => BaseType::Long,
            Some('S') => BaseType::Short,
            Some('Z') => BaseType::Boolean,
            Some(c) => {
                let msg = format!("Invalid base type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing base type character";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        };
        Ok(typ)
    }
}

/// Reference type
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum RefType<Class> {
    Object(Class),
    ObjectArray(ArrayType<Class>),
    PrimitiveArray(ArrayType<BaseType>),
}

/// Generic array type
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct ArrayType<T> {
    /// Additional dimensions (`A[]` has 0 additional dimensions, `A[][][][]` has 3)
    pub additional_dimensions: usize,

    /// Underlying element type (`A` is the underlying element type of `A[][]`)
    pub element_type: T,
}

impl<T> ArrayType<T> {
    pub fn map<T2>(&self, map_element: impl FnOnce(&T) -> T2) -> ArrayType<T2> {
        ArrayType {
            additional_dimensions: self.additional_dimensions,
            element_type: map_element(&self.element_type),
        }
    }
}

impl<T: RenderDescriptor> RenderDescriptor for ArrayType<T> {
    fn render_to(&self, write_to: &mut String) {
        for _ in 0..=self.additional_dimensions {
            write_to.push('[');
        }
        self.element_type.render_to(write_to);
    }
}

impl RenderDescriptor for BinaryName {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('L');
        write_to.push_str(self.as_str());
        write_to.push(';');
    }
}

impl ParseDescriptor for BinaryName {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if let Some('L') = source.next() {
            let mut class_name = String::new();
            loop {
                let c: char = source.next().ok_or_else(|| {
                    let msg = format!("Missing terminator for 'L{}'", class_name);
                    Error::new(ErrorKind::UnexpectedEof, msg)
                })?;
                if c == ';' {
                    return BinaryName::from_string(class_name)
                        .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg));
                } else {
                    class_name.push(c)
                }
            }
        } else {
            Err(Error::new(
                ErrorKind::InvalidInput,
                "Expected object type to start with `L`",
            ))
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for RefType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            RefType::Object(cls) => cls.render_to(write_to),
            RefType::PrimitiveArray(arr) => arr.render_to(write_to),
            RefType::ObjectArray(arr) => arr.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for RefType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        Ok(match source.peek().copied() {
            Some('L') => RefType::Object(C::parse_from(source)?),
            Some('[') => {
                source.next();
                let mut additional_dimensions = 0;
                while source.next_if_eq(&'[').is_some() {
                    additional_dimensions += 1;
                }
                if let Some('L') = source.peek().copied() {
                    RefType::ObjectArray(ArrayType {
                        additional_dimensions,
                        element_type: C::parse_from(source)?,
                    })
                } else {
                    RefType::PrimitiveArray(ArrayType {
                        additional_dimensions,
                        element_type: BaseType::parse_from(source)?,
                    })
                }
            }
            Some(c) => {
                let msg = format!("Invalid reference type character '{}'", c);
                return Err(Error::new(ErrorKind::InvalidInput, msg));
            }
            None => {
                let msg = "Missing field type";
                return Err(Error::new(ErrorKind::UnexpectedEof, msg));
            }
        })
    }
}

impl<C> RefType<C> {
    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> RefType<C2> {
        match self {
            RefType::Object(cls) => RefType::Object(map_class(cls)),
            RefType::PrimitiveArray(arr) => RefType::PrimitiveArray(*arr),
            RefType::ObjectArray(arr) => RefType::ObjectArray(arr.map(map_class)),
        }
    }

    /// Type of arrays whose elements have the given type
    pub fn array(field_type: FieldType<C>) -> RefType<C> {
        match field_type {
            FieldType::Base(element_type) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::Object(element_type)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: 0,
                element_type,
            }),
            FieldType::Ref(RefType::PrimitiveArray(arr)) => RefType::PrimitiveArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
            FieldType::Ref(RefType::ObjectArray(arr)) => RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions + 1,
                element_type: arr.element_type,
            }),
        }
    }

    /// If this is an array type, the type of its elements
    pub fn element_type(&self) -> Option<FieldType<C>>
    where
        C: Clone,
    {
        match self {
            RefType::Object(_) => None,
            RefType::PrimitiveArray(arr) if arr.additional_dimensions == 0 => {
                Some(FieldType::Base(arr.element_type))
            }
            RefType::PrimitiveArray(arr) => Some(FieldType::Ref(RefType::PrimitiveArray(
                ArrayType {
                    additional_dimensions: arr.additional_dimensions - 1,
                    element_type: arr.element_type,
                },
            ))),
            RefType::ObjectArray(arr) if arr.additional_dimensions == 0 => {
                Some(FieldType::object(arr.element_type.clone()))
            }
            RefType::ObjectArray(arr) => Some(FieldType::Ref(RefType::ObjectArray(ArrayType {
                additional_dimensions: arr.additional_dimensions - 1,
                element_type: arr.element_type.clone(),
            }))),
        }
    }
}

impl RefType<BinaryName> {
    /// Name as it appears in a `CONSTANT_Class_info`: plain internal name for classes, full
    /// descriptor for arrays
    ///
    /// [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.4.1
    pub fn internal_name(&self) -> String {
        match self {
            RefType::Object(name) => name.as_str().to_owned(),
            other => other.render(),
        }
    }

    /// Inverse of `internal_name`
    pub fn from_internal_name(name: &str) -> Result<RefType<BinaryName>> {
        if name.starts_with('[') {
            RefType::parse(name)
        } else {
            BinaryName::from_str(name)
                .map(RefType::Object)
                .map_err(|msg| Error::new(ErrorKind::InvalidInput, msg))
        }
    }
}

/// Type of a class, instance, or local variable
#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub enum FieldType<Class> {
    Base(BaseType),
    Ref(RefType<Class>),
}

impl<C> Width for FieldType<C> {
    fn width(&self) -> usize {
        match self {
            FieldType::Base(base_type) => base_type.width(),
            FieldType::Ref(_) => 1,
        }
    }
}

impl<C> FieldType<C> {
    pub fn array(field_type: FieldType<C>) -> FieldType<C> {
        FieldType::Ref(RefType::array(field_type))
    }

    pub fn map<C2>(&self, map_class: impl FnOnce(&C) -> C2) -> FieldType<C2> {
        match self {
            FieldType::Base(base) => FieldType::Base(*base),
            FieldType::Ref(ref_type) => FieldType::Ref(ref_type.map(map_class)),
        }
    }

    pub const fn object(class_name: C) -> FieldType<C> {
        FieldType::Ref(RefType::Object(class_name))
    }

    pub const fn int() -> FieldType<C> {
        FieldType::Base(BaseType::Int)
    }

    pub const fn long() -> FieldType<C> {
        FieldType::Base(BaseType::Long)
    }

    pub const fn float() -> FieldType<C> {
        FieldType::Base(BaseType::Float)
    }

    pub const fn double() -> FieldType<C> {
        FieldType::Base(BaseType::Double)
    }

    pub const fn boolean() -> FieldType<C> {
        FieldType::Base(BaseType::Boolean)
    }
}

impl<C: RenderDescriptor> RenderDescriptor for FieldType<C> {
    fn render_to(&self, write_to: &mut String) {
        match self {
            FieldType::Base(base_type) => base_type.render_to(write_to),
            FieldType::Ref(reference_type) => reference_type.render_to(write_to),
        }
    }
}

impl<C: ParseDescriptor> ParseDescriptor for FieldType<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        match source.peek().copied() {
            None => Err(Error::new(ErrorKind::UnexpectedEof, "Missing field type")),
            Some('B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z') => {
                BaseType::parse_from(source).map(FieldType::Base)
            }
            Some('L' | '[') => RefType::parse_from(source).map(FieldType::Ref),
            Some(c) => {
                let msg = format!("Invalid field type character '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }
}

/// Signature of a method
#[derive(PartialEq, Eq, Hash, Debug, Clone)]
pub struct MethodDescriptor<Class> {
    pub parameters: Vec<FieldType<Class>>,
    pub return_type: Option<FieldType<Class>>, // `None` is for `void` (ie. no return)
}

impl<C> MethodDescriptor<C> {
    /// Total length of parameters (not the same as the length of the vector),
    /// which must be 255 or less for it to be valid
    pub fn parameter_length(&self, has_this_param: bool) -> usize {
        let this_len = if has_this_param { 1 } else { 0 };
        this_len + self.parameters.iter().map(Width::width).sum::<usize>()
    }

    pub fn map<C2>(&self, map_class: impl Fn(&C) -> C2) -> MethodDescriptor<C2> {
        MethodDescriptor {
            parameters: self.parameters.iter().map(|p| p.map(&map_class)).collect(),
            return_type: self.return_type.as_ref().map(|r| r.map(&map_class)),
        }
    }
}

impl<C: RenderDescriptor> RenderDescriptor for MethodDescriptor<C> {
    fn render_to(&self, write_to: &mut String) {
        write_to.push('(');
        for parameter in &self.parameters {
            parameter.render_to(write_to);
        }
        write_to.push(')');
        match &self.return_type {
            None => write_to.push('V'),
            Some(typ) => typ.render_to(write_to),
        };
    }
}

impl<C: ParseDescriptor> ParseDescriptor for MethodDescriptor<C> {
    fn parse_from(source: &mut Peekable<Chars>) -> Result<Self> {
        if source.next() != Some('(') {
            let msg = "Expected '(' for method";
            return Err(Error::new(ErrorKind::InvalidInput, msg));
        }

        let mut parameters = vec![];
        loop {
            match source.peek().copied() {
                Some(')') => break,
                None => {
                    let msg = "Expected ')' for method";
                    return Err(Error::new(ErrorKind::UnexpectedEof, msg));
                }
                Some(_) => parameters.push(FieldType::<C>::parse_from(source)?),
            }
        }
        source.next();

        let return_type = if source.next_if_eq(&'V').is_some() {
            None
        } else {
            Some(FieldType::<C>::parse_from(source)?)
        };

        Ok(MethodDescriptor {
            parameters,
            return_type,
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::fmt::Debug;

    fn round_trip<T: RenderDescriptor + ParseDescriptor + Debug + Eq>(rendered: &str, parsed: T) {
        assert_eq!(rendered, parsed.render());
        assert_eq!(T::parse(rendered).unwrap(), parsed);
    }

    type FT = FieldType<BinaryName>;

    const INT: FT = FieldType::Base(BaseType::Int);
    const DOUBLE: FT = FieldType::Base(BaseType::Double);
    const OBJECT: FT = FieldType::object(BinaryName::OBJECT);
    const STRING: FT = FieldType::object(BinaryName::STRING);
    const INTEGER: FT = FieldType::object(BinaryName::INTEGER);

    #[test]
    fn field_types() {
        round_trip("I", INT);
        round_trip("Ljava/lang/Object;", OBJECT);
        round_trip(
            "[[[D",
            FieldType::array(FieldType::array(FieldType::array(DOUBLE))),
        );
        round_trip("[Ljava/lang/String;", FieldType::array(STRING));
    }

    #[test]
    fn method_descriptors() {
        round_trip(
            "(IDLjava/lang/Integer;)Ljava/lang/Object;",
            MethodDescriptor {
                parameters: vec![INT, DOUBLE, INTEGER],
                return_type: Some(OBJECT),
            },
        );
        round_trip(
            "()V",
            MethodDescriptor {
                parameters: Vec::<FT>::new(),
                return_type: None,
            },
        );
        assert!(MethodDescriptor::<BinaryName>::parse("(I").is_err());
        assert!(MethodDescriptor::<BinaryName>::parse("(I)VV").is_err());
    }

    #[test]
    fn parameter_lengths() {
        let desc = MethodDescriptor::<BinaryName>::parse("(JILjava/lang/String;D)V").unwrap();
        assert_eq!(desc.parameter_length(false), 6);
        assert_eq!(desc.parameter_length(true), 7);
    }

    #[test]
    fn internal_names() {
        let string = RefType::Object(BinaryName::STRING);
        assert_eq!(string.internal_name(), "java/lang/String");
        assert_eq!(
            RefType::from_internal_name("java/lang/String").unwrap(),
            string
        );

        let matrix = RefType::<BinaryName>::from_internal_name("[[I").unwrap();
        assert_eq!(matrix.internal_name(), "[[I");
        assert_eq!(
            matrix.element_type(),
            Some(FieldType::array(FieldType::int()))
        );
    }
}
