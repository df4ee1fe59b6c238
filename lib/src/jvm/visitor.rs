//! Visitor streams over the structural class model
//!
//! A class flows through a chain of [`ClassVisitor`]s: the header first, then every field, then
//! every method, and finally [`ClassVisitor::visit_end`]. Every callback has a default
//! implementation that forwards to [`ClassVisitor::delegate`], so a decorator only overrides the
//! callbacks it cares about and a sink (see [`ClassCollector`], or the class writer) overrides all
//! of them.
//!
//! Method bodies get the same treatment at a finer granularity: [`Code::accept`] replays code
//! elements, try/catch blocks, and local variables into a [`MethodVisitor`] chain which usually
//! ends in a [`CodeCollector`].

use crate::jvm::model::{
    ClassHeader, ClassNode, Code, CodeElement, FieldNode, LocalVariable, MethodNode, TryCatchBlock,
};
use crate::jvm::Error;

pub trait ClassVisitor {
    /// Next visitor in the chain, if any
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        None
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_header(header),
            None => Ok(()),
        }
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_field(field),
            None => Ok(()),
        }
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_method(method),
            None => Ok(()),
        }
    }

    /// Called once, after every member has been visited
    fn visit_end(&mut self) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_end(),
            None => Ok(()),
        }
    }
}

impl<T: ClassVisitor + ?Sized> ClassVisitor for &mut T {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        (**self).delegate()
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        (**self).visit_header(header)
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        (**self).visit_field(field)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        (**self).visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

impl<T: ClassVisitor + ?Sized> ClassVisitor for Box<T> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        (**self).delegate()
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        (**self).visit_header(header)
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        (**self).visit_field(field)
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        (**self).visit_method(method)
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        (**self).visit_end()
    }
}

impl ClassNode {
    /// Replay the class into a visitor
    pub fn accept(self, visitor: &mut dyn ClassVisitor) -> Result<(), Error> {
        visitor.visit_header(self.header)?;
        for field in self.fields {
            visitor.visit_field(field)?;
        }
        for method in self.methods {
            visitor.visit_method(method)?;
        }
        visitor.visit_end()
    }
}

/// Sink which materializes the stream back into a [`ClassNode`]
#[derive(Default)]
pub struct ClassCollector {
    header: Option<ClassHeader>,
    fields: Vec<FieldNode>,
    methods: Vec<MethodNode>,
}

impl ClassCollector {
    pub fn new() -> ClassCollector {
        ClassCollector::default()
    }

    /// Collected class (fails if no header was ever visited)
    pub fn into_node(self) -> Result<ClassNode, Error> {
        let header = self
            .header
            .ok_or_else(|| Error::Malformed(String::from("class stream has no header")))?;
        Ok(ClassNode {
            header,
            fields: self.fields,
            methods: self.methods,
        })
    }
}

impl ClassVisitor for ClassCollector {
    fn visit_header(&mut self, header: ClassHeader) -> Result<(), Error> {
        self.header = Some(header);
        Ok(())
    }

    fn visit_field(&mut self, field: FieldNode) -> Result<(), Error> {
        self.fields.push(field);
        Ok(())
    }

    fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
        self.methods.push(method);
        Ok(())
    }

    fn visit_end(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

/// Stream of the contents of one method body
///
/// Code elements arrive in order, followed by try/catch blocks and local variables (which only
/// refer to labels, so they come after every label has been seen).
pub trait MethodVisitor {
    /// Next visitor in the chain, if any
    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        None
    }

    fn visit_element(&mut self, element: CodeElement) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_element(element),
            None => Ok(()),
        }
    }

    fn visit_try_catch_block(&mut self, block: TryCatchBlock) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_try_catch_block(block),
            None => Ok(()),
        }
    }

    fn visit_local_variable(&mut self, variable: LocalVariable) -> Result<(), Error> {
        match self.delegate() {
            Some(next) => next.visit_local_variable(variable),
            None => Ok(()),
        }
    }
}

impl<T: MethodVisitor + ?Sized> MethodVisitor for &mut T {
    fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
        (**self).delegate()
    }

    fn visit_element(&mut self, element: CodeElement) -> Result<(), Error> {
        (**self).visit_element(element)
    }

    fn visit_try_catch_block(&mut self, block: TryCatchBlock) -> Result<(), Error> {
        (**self).visit_try_catch_block(block)
    }

    fn visit_local_variable(&mut self, variable: LocalVariable) -> Result<(), Error> {
        (**self).visit_local_variable(variable)
    }
}

impl Code {
    /// Replay the method body into a visitor
    pub fn accept(self, visitor: &mut dyn MethodVisitor) -> Result<(), Error> {
        for element in self.elements {
            visitor.visit_element(element)?;
        }
        for block in self.try_catch_blocks {
            visitor.visit_try_catch_block(block)?;
        }
        for variable in self.local_variables {
            visitor.visit_local_variable(variable)?;
        }
        Ok(())
    }
}

/// Sink which materializes a method visitor stream back into [`Code`]
#[derive(Default)]
pub struct CodeCollector {
    code: Code,
}

impl CodeCollector {
    pub fn new() -> CodeCollector {
        CodeCollector::default()
    }

    pub fn into_code(self) -> Code {
        self.code
    }
}

impl MethodVisitor for CodeCollector {
    fn visit_element(&mut self, element: CodeElement) -> Result<(), Error> {
        self.code.elements.push(element);
        Ok(())
    }

    fn visit_try_catch_block(&mut self, block: TryCatchBlock) -> Result<(), Error> {
        self.code.try_catch_blocks.push(block);
        Ok(())
    }

    fn visit_local_variable(&mut self, variable: LocalVariable) -> Result<(), Error> {
        self.code.local_variables.push(variable);
        Ok(())
    }
}

/// Rewrite a method body through a method visitor adapter
///
/// This is the usual way for a class-level pass to apply an instruction-level rewrite: `adapter`
/// receives the collector at the end of the chain and returns the head of the chain.
pub fn rewrite_code<F>(code: Code, adapter: F) -> Result<Code, Error>
where
    F: for<'c> FnOnce(&'c mut CodeCollector) -> Box<dyn MethodVisitor + 'c>,
{
    let mut collector = CodeCollector::new();
    {
        let mut head = adapter(&mut collector);
        code.accept(&mut *head)?;
    }
    Ok(collector.into_code())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::code::{BranchInstruction, Instruction};
    use crate::jvm::model::MethodHeader;
    use crate::jvm::{
        BinaryName, ClassAccessFlags, MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName,
    };

    /// Counts methods on their way through
    struct MethodCounter<'a> {
        next: &'a mut dyn ClassVisitor,
        count: usize,
    }

    impl<'a> ClassVisitor for MethodCounter<'a> {
        fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
            Some(&mut *self.next)
        }

        fn visit_method(&mut self, method: MethodNode) -> Result<(), Error> {
            self.count += 1;
            self.next.visit_method(method)
        }
    }

    /// Drops `nop` instructions
    struct DropNops<'a> {
        next: &'a mut CodeCollector,
    }

    impl<'a> MethodVisitor for DropNops<'a> {
        fn delegate(&mut self) -> Option<&mut dyn MethodVisitor> {
            Some(&mut *self.next)
        }

        fn visit_element(&mut self, element: CodeElement) -> Result<(), Error> {
            match element {
                CodeElement::Instruction(Instruction::Nop) => Ok(()),
                other => self.next.visit_element(other),
            }
        }
    }

    fn sample_class() -> ClassNode {
        let header = ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC,
            BinaryName::from_str("a/Sample").unwrap(),
            Some(BinaryName::OBJECT),
        );
        let mut class = ClassNode::new(header);
        let mut method = MethodNode::new(MethodHeader::new(
            MethodAccessFlags::STATIC,
            UnqualifiedName::from_str("run").unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
        ));
        method.code = Some(Code {
            elements: vec![
                CodeElement::Instruction(Instruction::Nop),
                CodeElement::Branch(BranchInstruction::Return),
            ],
            ..Code::default()
        });
        class.methods.push(method);
        class
    }

    #[test]
    fn decorators_forward_to_the_sink() {
        let class = sample_class();
        let mut collector = ClassCollector::new();
        let mut counter = MethodCounter {
            next: &mut collector,
            count: 0,
        };
        class.clone().accept(&mut counter).unwrap();
        assert_eq!(counter.count, 1);
        assert_eq!(collector.into_node().unwrap(), class);
    }

    #[test]
    fn code_adapters_rewrite_elements() {
        let code = sample_class().methods.remove(0).code.unwrap();
        let rewritten = rewrite_code(code, |next| Box::new(DropNops { next })).unwrap();
        assert_eq!(
            rewritten.elements,
            vec![CodeElement::Branch(BranchInstruction::Return)]
        );
    }

    #[test]
    fn missing_header_is_an_error() {
        assert!(ClassCollector::new().into_node().is_err());
    }
}
