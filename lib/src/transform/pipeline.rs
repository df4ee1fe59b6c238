use super::{Error, Repackage, Transform};
use crate::jvm::class_graph::{ClassDescriptor, DescriptorLocator};
use crate::jvm::model::ClassNode;
use crate::jvm::{self, BinaryName, ClassReader, ClassVisitor, ClassWriter};
use log::{debug, warn};

/// Ordered composition of passes
///
/// The first pass sees the class as it was read, the last one feeds the writer. A pipeline holds
/// no per-class state, so one pipeline can transform any number of classes, concurrently.
#[derive(Default)]
pub struct TransformPipeline {
    passes: Vec<Transform>,
}

impl TransformPipeline {
    /// Pipeline applying the passes in exactly the given order
    pub fn new(passes: Vec<Transform>) -> TransformPipeline {
        TransformPipeline { passes }
    }

    /// Pipeline applying the passes in catalogue order
    ///
    /// Passes of the same kind keep their relative order.
    pub fn catalogue(mut passes: Vec<Transform>) -> TransformPipeline {
        passes.sort_by_key(Transform::catalogue_index);
        TransformPipeline { passes }
    }

    /// Pipeline applying the passes of `self`, then those of `other`
    pub fn then(mut self, other: TransformPipeline) -> TransformPipeline {
        self.passes.extend(other.passes);
        self
    }

    pub fn passes(&self) -> &[Transform] {
        &self.passes
    }

    pub fn is_empty(&self) -> bool {
        self.passes.is_empty()
    }

    pub fn key(&self) -> String {
        if self.passes.is_empty() {
            return String::from("identity");
        }
        self.passes
            .iter()
            .map(Transform::key)
            .collect::<Vec<_>>()
            .join("|")
    }

    /// Decorate `sink` with every pass
    pub fn wrap<'a>(&'a self, sink: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        self.passes
            .iter()
            .rev()
            .fold(sink, |next, pass| pass.wrap(next))
    }

    /// Classes that rewritten code may depend on, and which must be defined alongside it
    pub fn generated_classes(&self) -> Vec<&ClassNode> {
        self.passes
            .iter()
            .flat_map(Transform::generated_classes)
            .collect()
    }

    /// Rewrite one class
    ///
    /// A class which comes out of the passes unchanged is returned as the exact input bytes.
    pub fn transform(
        &self,
        bytes: &[u8],
        locator: &dyn DescriptorLocator,
    ) -> Result<Vec<u8>, Error> {
        let reader = ClassReader::new(bytes)?;
        debug!("Transforming {} with {}", reader.class_name(), self.key());

        let locator = PipelineLocator {
            pipeline: self,
            inner: locator,
        };
        let mut writer = ClassWriter::with_source(&reader, &locator);
        {
            let mut visitor = self.wrap(Box::new(&mut writer));
            reader.accept(&mut *visitor)?;
        }
        Ok(writer.into_bytes()?)
    }

    /// Rewrite one class, falling back to the input bytes if that fails
    pub fn transform_or_passthrough(
        &self,
        bytes: &[u8],
        locator: &dyn DescriptorLocator,
    ) -> Vec<u8> {
        match self.transform(bytes, locator) {
            Ok(transformed) => transformed,
            Err(err) => {
                let class = ClassReader::descriptor(bytes)
                    .map(|descriptor| descriptor.name.to_string())
                    .unwrap_or_else(|_| String::from("<unreadable class>"));
                warn!("Leaving {} untouched: {}", class, err);
                bytes.to_vec()
            }
        }
    }
}

/// Locator used while writing classes coming out of a pipeline
///
/// On top of `inner`, this knows about the classes generated by the passes and about classes
/// under the names repackaging gave them.
struct PipelineLocator<'a> {
    pipeline: &'a TransformPipeline,
    inner: &'a dyn DescriptorLocator,
}

impl<'a> PipelineLocator<'a> {
    fn repackaged(&self, name: &BinaryName) -> Option<ClassDescriptor> {
        self.pipeline.passes.iter().find_map(|pass| match pass {
            Transform::Repackage(repackage) => {
                let original = repackage.original(name)?;
                let descriptor = self.inner.locate(&original).ok()?;
                debug!("Locating {} through {}", name, original);
                Some(rename_descriptor(repackage, descriptor))
            }
            _ => None,
        })
    }
}

fn rename_descriptor(repackage: &Repackage, descriptor: ClassDescriptor) -> ClassDescriptor {
    let rename = |name: BinaryName| repackage.rename(&name).unwrap_or(name);
    ClassDescriptor::new(
        rename(descriptor.name),
        rename(descriptor.super_name),
        descriptor.interfaces.into_iter().map(rename).collect(),
        descriptor.is_interface,
    )
}

impl<'a> DescriptorLocator for PipelineLocator<'a> {
    fn locate(&self, name: &BinaryName) -> Result<ClassDescriptor, jvm::Error> {
        let generated = self
            .pipeline
            .generated_classes()
            .into_iter()
            .find(|class| class.header.name == *name);
        if let Some(class) = generated {
            return Ok(ClassDescriptor::from_header(&class.header));
        }
        match self.repackaged(name) {
            Some(descriptor) => Ok(descriptor),
            None => self.inner.locate(name),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::class_graph::{DefinedClassesLocator, ObjectLocator};
    use crate::jvm::code::{BranchInstruction, Instruction, InvokeType};
    use crate::jvm::model::{Code, CodeElement, MethodRef};
    use crate::jvm::{
        write_class, ClassAccessFlags, ClassBuilder, MethodAccessFlags, Name, UnqualifiedName,
    };
    use crate::transform::{
        CooperativeInterrupt, LifecycleOwnerFallback, ReplaceClass, TransformSettings,
        VersionClamp,
    };

    fn name(name: &str) -> BinaryName {
        BinaryName::from_str(name).unwrap()
    }

    fn empty_class(class: &str, version: Version) -> Vec<u8> {
        let mut builder = ClassBuilder::new(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            name(class),
            BinaryName::OBJECT,
            vec![],
        );
        builder.set_version(version);
        write_class(&builder.result(), &ObjectLocator).unwrap()
    }

    #[test]
    fn pipeline_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Transform>();
        assert_send_sync::<TransformPipeline>();
    }

    #[test]
    fn keys() -> Result<(), Error> {
        let settings = TransformSettings::default();
        assert_eq!(TransformPipeline::default().key(), "identity");

        let clamp = || VersionClamp::new(52, 61);
        let unordered = TransformPipeline::new(vec![
            CooperativeInterrupt::new(100, &settings)?.into(),
            clamp()?.into(),
        ]);
        let ordered = TransformPipeline::catalogue(vec![
            CooperativeInterrupt::new(100, &settings)?.into(),
            clamp()?.into(),
        ]);
        assert_ne!(unordered.key(), ordered.key());
        assert!(ordered.key().starts_with("version-clamp:52-61|"));

        let concatenated = TransformPipeline::new(vec![clamp()?.into()])
            .then(TransformPipeline::new(vec![ReplaceClass::new("a/A", "a/B")?.into()]));
        assert_eq!(concatenated.key(), "version-clamp:52-61|replace-class:a/A->a/B");
        assert_eq!(concatenated.passes().len(), 2);
        Ok(())
    }

    #[test]
    fn clamps_version_end_to_end() -> Result<(), Error> {
        let pipeline = TransformPipeline::new(vec![VersionClamp::new(52, 61)?.into()]);
        let bytes = empty_class("app/Modern", Version::JAVA21);

        let transformed = pipeline.transform(&bytes, &ObjectLocator)?;
        let reader = ClassReader::new(&transformed)?;
        assert_eq!(reader.node().header.version, Version::JAVA17);
        Ok(())
    }

    #[test]
    fn unchanged_classes_keep_their_bytes() -> Result<(), Error> {
        let pipeline = TransformPipeline::new(vec![VersionClamp::new(52, 61)?.into()]);
        let bytes = empty_class("app/Current", Version::JAVA11);
        assert_eq!(pipeline.transform(&bytes, &ObjectLocator)?, bytes);
        assert_eq!(TransformPipeline::default().transform(&bytes, &ObjectLocator)?, bytes);
        Ok(())
    }

    #[test]
    fn malformed_classes_pass_through() {
        let pipeline = TransformPipeline::default();
        let garbage = vec![0xCA, 0xFE, 0xBA, 0xBE, 0x00];
        assert!(pipeline.transform(&garbage, &ObjectLocator).is_err());
        assert_eq!(pipeline.transform_or_passthrough(&garbage, &ObjectLocator), garbage);
    }

    #[test]
    fn generated_classes_are_locatable() -> Result<(), Error> {
        let settings = TransformSettings::default();
        let accessor = settings.lifecycle.clone();
        let pipeline = TransformPipeline::new(vec![LifecycleOwnerFallback::new(&settings)?.into()]);
        assert_eq!(pipeline.generated_classes().len(), 1);
        assert_eq!(
            pipeline.generated_classes()[0].header.name,
            accessor.fallback_class
        );

        // `get(View)` returning whatever `lookup(View)` finds
        let lookup = MethodRef::new(
            accessor.owner.clone(),
            UnqualifiedName::from_str("lookup").unwrap(),
            accessor.getter_descriptor(),
        );
        let mut owner = ClassBuilder::new(
            ClassAccessFlags::PUBLIC | ClassAccessFlags::SUPER,
            accessor.owner.clone(),
            BinaryName::OBJECT,
            vec![],
        );
        owner.add_method(
            MethodAccessFlags::PUBLIC | MethodAccessFlags::STATIC,
            accessor.getter.clone(),
            accessor.getter_descriptor(),
            Some(Code {
                elements: vec![
                    CodeElement::Instruction(Instruction::ALoad(0)),
                    CodeElement::Instruction(Instruction::Invoke(InvokeType::Static, lookup)),
                    CodeElement::Branch(BranchInstruction::AReturn),
                ],
                ..Code::default()
            }),
        );
        let bytes = write_class(&owner.result(), &ObjectLocator)?;

        // Only the interface is known up front: the fallback must come from the pipeline
        let locator = DefinedClassesLocator::new();
        locator.register(ClassDescriptor::new(
            accessor.owner_interface.clone(),
            BinaryName::OBJECT,
            vec![],
            true,
        ));
        let transformed = pipeline.transform(&bytes, &locator)?;
        assert_ne!(transformed, bytes);

        let reader = ClassReader::new(&transformed)?;
        let getter = reader
            .node()
            .methods
            .iter()
            .find(|method| method.header.name == accessor.getter)
            .expect("getter should survive");
        let news: Vec<_> = getter
            .code
            .as_ref()
            .unwrap()
            .elements
            .iter()
            .filter(|element| matches!(element, CodeElement::Instruction(Instruction::New(_))))
            .collect();
        assert_eq!(news.len(), 1);
        Ok(())
    }

    #[test]
    fn repackaged_names_are_locatable() -> Result<(), Error> {
        let repackage = Repackage::new(vec![String::from("lib/")], String::from("shaded/"))?;
        let pipeline = TransformPipeline::new(vec![repackage.into()]);

        let locator = DefinedClassesLocator::new();
        locator.register(ClassDescriptor::new(
            name("lib/Widget"),
            name("lib/Base"),
            vec![name("java/io/Serializable")],
            false,
        ));
        let pipeline_locator = PipelineLocator {
            pipeline: &pipeline,
            inner: &locator,
        };

        let widget = pipeline_locator.locate(&name("shaded/lib/Widget"))?;
        assert_eq!(widget.name, name("shaded/lib/Widget"));
        assert_eq!(widget.super_name, name("shaded/lib/Base"));
        assert_eq!(widget.interfaces, vec![name("java/io/Serializable")]);
        assert!(pipeline_locator.locate(&name("shaded/lib/Missing")).is_err());
        Ok(())
    }
}
