use super::TransformSettings;
use crate::jvm::model::ClassHeader;
use crate::jvm::{self, BinaryName, ClassVisitor, FieldType, RenderDescriptor};
use log::debug;

type FoundCallback = dyn Fn(&BinaryName) + Send + Sync;

/// Report classes compiled with live literals support, without touching them
///
/// The Compose compiler marks each class holding live literals with a file info annotation.
/// Whenever a class carrying that marker streams through, the callback gets its name. The class
/// itself is forwarded unchanged. The pass comes last in the catalogue, so the marker is matched
/// under the names the other passes leave behind.
pub struct LiveLiteralsDetection {
    marker: BinaryName,
    on_found: Box<FoundCallback>,
}

impl LiveLiteralsDetection {
    pub fn new(
        settings: &TransformSettings,
        on_found: impl Fn(&BinaryName) + Send + Sync + 'static,
    ) -> LiveLiteralsDetection {
        LiveLiteralsDetection {
            marker: settings.live_literals_marker.clone(),
            on_found: Box::new(on_found),
        }
    }

    pub fn key(&self) -> String {
        format!("live-literals-detection:{}", self.marker)
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(LiveLiteralsVisitor {
            pass: self,
            descriptor: FieldType::object(self.marker.clone()).render(),
            next,
        })
    }
}

struct LiveLiteralsVisitor<'a> {
    pass: &'a LiveLiteralsDetection,
    descriptor: String,
    next: Box<dyn ClassVisitor + 'a>,
}

impl<'a> ClassVisitor for LiveLiteralsVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, header: ClassHeader) -> Result<(), jvm::Error> {
        let annotations = &header.annotations;
        let marked = annotations
            .visible
            .iter()
            .chain(&annotations.invisible)
            .any(|annotation| annotation.type_descriptor == self.descriptor);
        if marked {
            debug!("Found live literals in {}", header.name);
            (self.pass.on_found)(&header.name);
        }
        self.next.visit_header(header)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::class_file::Version;
    use crate::jvm::model::{Annotation, ClassNode};
    use crate::jvm::{ClassAccessFlags, ClassCollector, Name};
    use std::sync::{Arc, Mutex};

    fn class(name: &str) -> ClassNode {
        ClassNode::new(ClassHeader::new(
            Version::JAVA8,
            ClassAccessFlags::PUBLIC | ClassAccessFlags::FINAL,
            BinaryName::from_str(name).unwrap(),
            Some(BinaryName::OBJECT),
        ))
    }

    fn annotation(class: &str) -> Annotation {
        Annotation {
            type_descriptor: format!("L{};", class),
            elements: vec![],
        }
    }

    fn detector() -> (LiveLiteralsDetection, Arc<Mutex<Vec<BinaryName>>>) {
        let found = Arc::new(Mutex::new(vec![]));
        let sink = found.clone();
        let pass = LiveLiteralsDetection::new(&TransformSettings::default(), move |name| {
            sink.lock().unwrap().push(name.clone())
        });
        (pass, found)
    }

    fn apply(pass: &LiveLiteralsDetection, class: ClassNode) -> ClassNode {
        let mut collector = ClassCollector::new();
        {
            let mut visitor = pass.wrap(Box::new(&mut collector));
            class.accept(&mut *visitor).unwrap();
        }
        collector.into_node().unwrap()
    }

    #[test]
    fn marked_classes_are_reported() {
        let (pass, found) = detector();
        let mut literals = class("app/LiveLiterals$MainKt");
        literals
            .header
            .annotations
            .invisible
            .push(annotation("androidx/compose/runtime/internal/LiveLiteralFileInfo"));

        assert_eq!(apply(&pass, literals.clone()), literals);
        assert_eq!(
            *found.lock().unwrap(),
            vec![BinaryName::from_str("app/LiveLiterals$MainKt").unwrap()]
        );
    }

    #[test]
    fn other_classes_are_not_reported() {
        let (pass, found) = detector();
        let mut plain = class("app/MainKt");
        plain
            .header
            .annotations
            .visible
            .push(annotation("kotlin/Metadata"));

        assert_eq!(apply(&pass, plain.clone()), plain);
        assert!(found.lock().unwrap().is_empty());
    }

    #[test]
    fn keys_name_the_marker() {
        let (pass, _) = detector();
        assert_eq!(
            pass.key(),
            "live-literals-detection:androidx/compose/runtime/internal/LiveLiteralFileInfo"
        );
    }
}
