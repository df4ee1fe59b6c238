use crate::jvm::class_file::{
    self, Attribute, ConstantsPool, ConstantsWriter, RuntimeInvisibleAnnotations,
    RuntimeVisibleAnnotations,
};
use crate::jvm::model::ConstantValue;
use crate::jvm::Error;

/// Annotations attached to a class, field, method, or record component
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Annotations {
    /// From `RuntimeVisibleAnnotations`
    pub visible: Vec<Annotation>,

    /// From `RuntimeInvisibleAnnotations`
    pub invisible: Vec<Annotation>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.visible.is_empty() && self.invisible.is_empty()
    }

    /// Append the `Runtime*Annotations` attributes (only the non-empty ones)
    pub(crate) fn serialize_into(
        &self,
        constants: &mut ConstantsPool,
        attributes: &mut Vec<Attribute>,
    ) -> Result<(), Error> {
        if !self.visible.is_empty() {
            let visible = serialize_annotations(&self.visible, constants)?;
            attributes.push(constants.get_attribute(RuntimeVisibleAnnotations(visible))?);
        }
        if !self.invisible.is_empty() {
            let invisible = serialize_annotations(&self.invisible, constants)?;
            attributes.push(constants.get_attribute(RuntimeInvisibleAnnotations(invisible))?);
        }
        Ok(())
    }
}

/// Annotation, with its type still a descriptor string (eg. `Ljava/lang/Deprecated;`)
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub type_descriptor: String,
    pub elements: Vec<(String, ElementValue)>,
}

/// Value of an annotation element
#[derive(Clone, Debug, PartialEq)]
pub enum ElementValue {
    /// Primitive or string constant along with its tag (one of `BCDFIJSZs`)
    ///
    /// Tags `B`, `C`, `S`, `Z`, and `I` all carry [`ConstantValue::Integer`].
    Const(u8, ConstantValue),
    Enum {
        type_descriptor: String,
        constant_name: String,
    },

    /// Class literal as a return descriptor (eg. `V` or `Ljava/lang/String;`)
    Class(String),
    Annotation(Annotation),
    Array(Vec<ElementValue>),
}

impl Annotation {
    pub(crate) fn serialize_annotation(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::Annotation, Error> {
        let type_index = constants.get_utf8(self.type_descriptor.as_str())?;
        let element_value_pairs = self
            .elements
            .iter()
            .map(|(name, value)| -> Result<_, Error> {
                let name = constants.get_utf8(name.as_str())?;
                Ok((name, value.serialize_element(constants)?))
            })
            .collect::<Result<_, _>>()?;
        Ok(class_file::Annotation {
            type_index,
            element_value_pairs,
        })
    }
}

impl ElementValue {
    pub(crate) fn serialize_element(
        &self,
        constants: &mut ConstantsPool,
    ) -> Result<class_file::ElementValue, Error> {
        Ok(match self {
            // String element values point straight at a `Utf8`, not a `String` constant
            ElementValue::Const(b's', ConstantValue::String(string)) => {
                class_file::ElementValue::Const {
                    tag: b's',
                    value: constants.get_utf8(string.as_str())?.0,
                }
            }
            ElementValue::Const(tag, value) => class_file::ElementValue::Const {
                tag: *tag,
                value: value.constant_index(constants)?,
            },
            ElementValue::Enum {
                type_descriptor,
                constant_name,
            } => class_file::ElementValue::Enum {
                type_name: constants.get_utf8(type_descriptor.as_str())?,
                const_name: constants.get_utf8(constant_name.as_str())?,
            },
            ElementValue::Class(descriptor) => {
                class_file::ElementValue::Class(constants.get_utf8(descriptor.as_str())?)
            }
            ElementValue::Annotation(annotation) => class_file::ElementValue::Annotation(
                Box::new(annotation.serialize_annotation(constants)?),
            ),
            ElementValue::Array(values) => class_file::ElementValue::Array(
                values
                    .iter()
                    .map(|value| value.serialize_element(constants))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

pub(crate) fn serialize_annotations(
    annotations: &[Annotation],
    constants: &mut ConstantsPool,
) -> Result<Vec<class_file::Annotation>, Error> {
    annotations
        .iter()
        .map(|annotation| annotation.serialize_annotation(constants))
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::{Constant, ConstantIndex, Utf8ConstantIndex};
    use crate::util::Offset;

    #[test]
    fn string_elements_use_utf8_constants() {
        let annotation = Annotation {
            type_descriptor: String::from("Lfoo/Marker;"),
            elements: vec![(
                String::from("value"),
                ElementValue::Const(b's', ConstantValue::String(String::from("hi"))),
            )],
        };
        let mut pool = ConstantsPool::new();
        let raw = annotation.serialize_annotation(&mut pool).unwrap();
        let (constants, _) = pool.into_parts();

        assert_eq!(raw.type_index, Utf8ConstantIndex(ConstantIndex(1)));
        match &raw.element_value_pairs[0].1 {
            class_file::ElementValue::Const { tag: b's', value } => assert!(matches!(
                constants.get_offset(Offset(value.0 as usize)).ok(),
                Some(Constant::Utf8(s)) if s == "hi"
            )),
            other => panic!("unexpected element value {:?}", other),
        }
        assert!(
            !constants.iter().any(|(_, _, c)| matches!(c, Constant::String(_))),
            "no String constant is needed"
        );
    }

    #[test]
    fn empty_annotations_add_no_attributes() {
        let mut pool = ConstantsPool::new();
        let mut attributes = vec![];
        Annotations::default()
            .serialize_into(&mut pool, &mut attributes)
            .unwrap();
        assert!(attributes.is_empty());
    }
}
