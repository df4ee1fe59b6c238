//! Generic signatures (the `Signature` attribute)
//!
//! Signatures are only ever rewritten, never interpreted, so rather than building a full AST we
//! walk the grammar from [the JVM specification][0] and copy it to an output buffer, substituting
//! class names along the way.
//!
//! [0]: https://docs.oracle.com/javase/specs/jvms/se17/html/jvms-4.html#jvms-4.7.9.1

use std::io::{Error, ErrorKind, Result};
use std::iter::Peekable;
use std::str::Chars;

/// Which grammar production the signature string follows
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SignatureKind {
    Class,
    Method,
    Field,
}

/// Rewrite every class name mentioned in a signature
///
/// The callback receives internal names (`java/util/List`, or `java/util/Map$Entry` for the
/// member classes written `Ljava/util/Map<TK;TV;>.Entry;`) and returns a replacement if the name
/// should change.
pub fn map_signature(
    signature: &str,
    kind: SignatureKind,
    map_class: &dyn Fn(&str) -> Option<String>,
) -> Result<String> {
    let mut mapper = SignatureMapper {
        source: signature.chars().peekable(),
        output: String::with_capacity(signature.len()),
        map_class,
    };
    match kind {
        SignatureKind::Class => {
            mapper.type_parameters()?;
            while mapper.source.peek().is_some() {
                mapper.class_type()?;
            }
        }
        SignatureKind::Method => {
            mapper.type_parameters()?;
            mapper.expect('(')?;
            while mapper.peek()? != ')' {
                mapper.java_type()?;
            }
            mapper.expect(')')?;
            if mapper.peek()? == 'V' {
                mapper.copy_char()?;
            } else {
                mapper.java_type()?;
            }
            while mapper.source.peek() == Some(&'^') {
                mapper.copy_char()?;
                mapper.reference_type()?;
            }
        }
        SignatureKind::Field => mapper.reference_type()?,
    }
    match mapper.source.next() {
        None => Ok(mapper.output),
        Some(c) => {
            let msg = format!("Unexpected leftover input '{}' in signature", c);
            Err(Error::new(ErrorKind::InvalidInput, msg))
        }
    }
}

struct SignatureMapper<'s, 'f> {
    source: Peekable<Chars<'s>>,
    output: String,
    map_class: &'f dyn Fn(&str) -> Option<String>,
}

impl<'s, 'f> SignatureMapper<'s, 'f> {
    fn peek(&mut self) -> Result<char> {
        self.source
            .peek()
            .copied()
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "Truncated signature"))
    }

    fn copy_char(&mut self) -> Result<char> {
        let c = self
            .source
            .next()
            .ok_or_else(|| Error::new(ErrorKind::UnexpectedEof, "Truncated signature"))?;
        self.output.push(c);
        Ok(c)
    }

    fn expect(&mut self, expected: char) -> Result<()> {
        let found = self.copy_char()?;
        if found == expected {
            Ok(())
        } else {
            let msg = format!("Expected '{}' in signature but found '{}'", expected, found);
            Err(Error::new(ErrorKind::InvalidInput, msg))
        }
    }

    /// Read an identifier up to (but excluding) one of the terminators
    fn identifier(&mut self, terminators: &[char]) -> Result<String> {
        let mut ident = String::new();
        loop {
            let c = self.peek()?;
            if terminators.contains(&c) {
                return Ok(ident);
            }
            ident.push(c);
            self.source.next();
        }
    }

    fn type_parameters(&mut self) -> Result<()> {
        if self.source.peek() != Some(&'<') {
            return Ok(());
        }
        self.copy_char()?;
        while self.peek()? != '>' {
            let name = self.identifier(&[':'])?;
            self.output.push_str(&name);
            while self.source.peek() == Some(&':') {
                self.copy_char()?;
                if matches!(self.peek()?, 'L' | 'T' | '[') {
                    self.reference_type()?;
                }
            }
        }
        self.copy_char()?;
        Ok(())
    }

    fn java_type(&mut self) -> Result<()> {
        match self.peek()? {
            'B' | 'C' | 'D' | 'F' | 'I' | 'J' | 'S' | 'Z' => self.copy_char().map(|_| ()),
            _ => self.reference_type(),
        }
    }

    fn reference_type(&mut self) -> Result<()> {
        match self.peek()? {
            'L' => self.class_type(),
            'T' => {
                while self.copy_char()? != ';' {}
                Ok(())
            }
            '[' => {
                self.copy_char()?;
                self.java_type()
            }
            c => {
                let msg = format!("Invalid reference type signature start '{}'", c);
                Err(Error::new(ErrorKind::InvalidInput, msg))
            }
        }
    }

    fn class_type(&mut self) -> Result<()> {
        self.expect('L')?;
        let mut original = self.identifier(&['<', '.', ';'])?;
        let mut mapped = (self.map_class)(&original).unwrap_or_else(|| original.clone());
        self.output.push_str(&mapped);
        self.type_arguments()?;

        while self.source.peek() == Some(&'.') {
            self.copy_char()?;
            let simple = self.identifier(&['<', '.', ';'])?;
            let inner_original = format!("{}${}", original, simple);
            let inner_mapped = (self.map_class)(&inner_original)
                .unwrap_or_else(|| format!("{}${}", mapped, simple));

            // Emit the mapped simple name only if it still nests under the mapped outer name
            let outer_prefix = format!("{}$", mapped);
            match inner_mapped.strip_prefix(&outer_prefix) {
                Some(suffix) => self.output.push_str(suffix),
                None => self.output.push_str(&simple),
            }
            original = inner_original;
            mapped = inner_mapped;
            self.type_arguments()?;
        }
        self.expect(';')
    }

    fn type_arguments(&mut self) -> Result<()> {
        if self.source.peek() != Some(&'<') {
            return Ok(());
        }
        self.copy_char()?;
        while self.peek()? != '>' {
            match self.peek()? {
                '*' => {
                    self.copy_char()?;
                }
                '+' | '-' => {
                    self.copy_char()?;
                    self.reference_type()?;
                }
                _ => self.reference_type()?,
            }
        }
        self.copy_char()?;
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn shade(name: &str) -> Option<String> {
        name.strip_prefix("com/lib/")
            .map(|rest| format!("shaded/com/lib/{}", rest))
    }

    fn no_change(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn unchanged_signatures_render_identically() {
        let signatures = [
            ("<T:Ljava/lang/Object;>Ljava/util/AbstractList<TT;>;Ljava/util/RandomAccess;", SignatureKind::Class),
            ("<K::Ljava/lang/Comparable<-TK;>;>(Ljava/util/Map<TK;*>;[[I)TK;^Ljava/io/IOException;", SignatureKind::Method),
            ("Ljava/util/Map<Ljava/lang/String;+Ljava/util/List<[J>;>.Entry<TX;>;", SignatureKind::Field),
        ];
        for (signature, kind) in signatures {
            assert_eq!(
                map_signature(signature, kind, &no_change).unwrap(),
                signature,
                "round trip of {}",
                signature
            );
        }
    }

    #[test]
    fn class_names_are_mapped_everywhere() {
        let mapped = map_signature(
            "<T:Lcom/lib/Base;>(Ljava/util/List<Lcom/lib/Item;>;)Lcom/lib/Outer<TT;>.Inner;",
            SignatureKind::Method,
            &shade,
        )
        .unwrap();
        assert_eq!(
            mapped,
            "<T:Lshaded/com/lib/Base;>(Ljava/util/List<Lshaded/com/lib/Item;>;)Lshaded/com/lib/Outer<TT;>.Inner;"
        );
    }

    #[test]
    fn truncated_signatures_are_errors() {
        assert!(map_signature("Ljava/util/List<", SignatureKind::Field, &no_change).is_err());
        assert!(map_signature("(I", SignatureKind::Method, &no_change).is_err());
    }
}
