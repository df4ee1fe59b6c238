use super::Error;
use crate::jvm::model::MethodRef;
use crate::jvm::{
    BinaryName, FieldType, MethodDescriptor, Name, ParseDescriptor, RenderDescriptor,
    UnqualifiedName,
};

/// Configuration shared by the passes of a pipeline
///
/// Start from [`TransformSettings::default`] and override what needs overriding. Nothing is
/// validated here: each pass checks the parts it uses when it is constructed.
pub struct TransformSettings {
    /// Static helpers called by injected code
    pub hooks: RuntimeHooks,

    /// Seed for sampled instrumentation
    ///
    /// Which sites get instrumented is a function of the seed, the class, and the method, so the
    /// same seed always produces the same bytes.
    pub sampling_seed: u64,

    /// Package prefixes (eg. `java/`) of classes that are never instrumented
    pub trusted_prefixes: Vec<String>,

    /// Void callbacks whose failures get swallowed
    pub wrapped_callbacks: Vec<(UnqualifiedName, MethodDescriptor<BinaryName>)>,

    /// Accessor which gets a fallback owner when it would return `null`
    pub lifecycle: LifecycleAccessor,

    /// Class substituted for `java/lang/ThreadLocal`
    pub tracked_thread_local: BinaryName,

    /// Annotation the Compose compiler puts on classes holding live literals
    pub live_literals_marker: BinaryName,
}

impl Default for TransformSettings {
    fn default() -> TransformSettings {
        fn callback(
            name: &'static str,
            parameters: Vec<FieldType<BinaryName>>,
        ) -> (UnqualifiedName, MethodDescriptor<BinaryName>) {
            let descriptor = MethodDescriptor {
                parameters,
                return_type: None,
            };
            (UnqualifiedName::from_static(name), descriptor)
        }
        let canvas = FieldType::object(BinaryName::from_static("android/graphics/Canvas"));

        TransformSettings {
            hooks: RuntimeHooks::default(),
            sampling_seed: 0,
            trusted_prefixes: ["java/", "javax/", "jdk/", "sun/", "kotlin/", "android/"]
                .iter()
                .map(|prefix| prefix.to_string())
                .collect(),
            wrapped_callbacks: vec![
                callback("onDraw", vec![canvas.clone()]),
                callback("dispatchDraw", vec![canvas]),
                callback("onMeasure", vec![FieldType::int(), FieldType::int()]),
                callback(
                    "onLayout",
                    vec![
                        FieldType::boolean(),
                        FieldType::int(),
                        FieldType::int(),
                        FieldType::int(),
                        FieldType::int(),
                    ],
                ),
                callback(
                    "onSizeChanged",
                    vec![FieldType::int(), FieldType::int(), FieldType::int(), FieldType::int()],
                ),
                callback("onAttachedToWindow", vec![]),
                callback("onDetachedFromWindow", vec![]),
                callback("onFinishInflate", vec![]),
            ],
            lifecycle: LifecycleAccessor::default(),
            tracked_thread_local: BinaryName::from_static("classmorph/runtime/TrackedThreadLocal"),
            live_literals_marker: BinaryName::from_static(
                "androidx/compose/runtime/internal/LiveLiteralFileInfo",
            ),
        }
    }
}

impl TransformSettings {
    /// Whether classes with this name are off limits for instrumentation
    pub fn is_trusted(&self, class: &BinaryName) -> bool {
        self.hooks.is_helper_class(class)
            || self
                .trusted_prefixes
                .iter()
                .any(|prefix| class.as_str().starts_with(prefix.as_str()))
    }
}

/// Static method called from rewritten code
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct HookMethod {
    pub owner: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor<BinaryName>,
}

impl HookMethod {
    /// Parse a method written as `owner/Class.name(descriptor)`
    pub fn parse(method: &str) -> Result<HookMethod, Error> {
        let invalid = |msg: String| Error::InvalidSetting(format!("hook '{}': {}", method, msg));
        let paren = method
            .find('(')
            .ok_or_else(|| invalid(String::from("missing descriptor")))?;
        let dot = method[..paren]
            .rfind('.')
            .ok_or_else(|| invalid(String::from("missing method name")))?;
        Ok(HookMethod {
            owner: BinaryName::from_str(&method[..dot]).map_err(invalid)?,
            name: UnqualifiedName::from_str(&method[dot + 1..paren]).map_err(invalid)?,
            descriptor: MethodDescriptor::parse(&method[paren..])
                .map_err(|err| invalid(err.to_string()))?,
        })
    }

    pub fn method_ref(&self) -> MethodRef {
        MethodRef::new(
            self.owner.clone(),
            self.name.clone(),
            self.descriptor.clone(),
        )
    }

    /// Check that the hook has the descriptor injected code calls it with
    pub(crate) fn expect_descriptor(
        &self,
        expected: &MethodDescriptor<BinaryName>,
    ) -> Result<(), Error> {
        if self.descriptor == *expected {
            Ok(())
        } else {
            Err(Error::InvalidSetting(format!(
                "hook {} should have descriptor {}",
                self,
                expected.render()
            )))
        }
    }
}

impl std::fmt::Display for HookMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor.render())
    }
}

/// Helpers that injected code calls back into
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RuntimeHooks {
    /// `()V`, throws if the current unit of work was interrupted
    pub interrupt_check: HookMethod,

    /// `()V`, throws if the current unit of work allocated too much
    pub allocation_check: HookMethod,

    /// `(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;`,
    /// current value of a constant given its class, source file, method, and original value
    pub constant_lookup: HookMethod,

    /// `(Ljava/lang/Throwable;)V`, reports an exception swallowed by a wrapped callback
    pub callback_failure: HookMethod,
}

impl RuntimeHooks {
    /// Whether a class lives in the package of one of the helpers (or a subpackage)
    pub fn is_helper_class(&self, class: &BinaryName) -> bool {
        [
            &self.interrupt_check,
            &self.allocation_check,
            &self.constant_lookup,
            &self.callback_failure,
        ]
        .iter()
        .any(|hook| {
            let package = hook.owner.package();
            let class_package = class.package();
            class_package == package
                || (!package.is_empty()
                    && class_package.starts_with(package)
                    && class_package[package.len()..].starts_with('/'))
        })
    }

    pub(crate) fn no_arguments() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![],
            return_type: None,
        }
    }

    pub(crate) fn constant_lookup_descriptor() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![
                FieldType::object(BinaryName::CLASS),
                FieldType::object(BinaryName::STRING),
                FieldType::object(BinaryName::STRING),
                FieldType::object(BinaryName::OBJECT),
            ],
            return_type: Some(FieldType::object(BinaryName::OBJECT)),
        }
    }

    pub(crate) fn callback_failure_descriptor() -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![FieldType::object(BinaryName::THROWABLE)],
            return_type: None,
        }
    }
}

impl Default for RuntimeHooks {
    fn default() -> RuntimeHooks {
        let hook = |name: &'static str, descriptor| HookMethod {
            owner: BinaryName::from_static("classmorph/runtime/SandboxHooks"),
            name: UnqualifiedName::from_static(name),
            descriptor,
        };
        RuntimeHooks {
            interrupt_check: hook("checkInterrupted", RuntimeHooks::no_arguments()),
            allocation_check: hook("onAllocation", RuntimeHooks::no_arguments()),
            constant_lookup: hook("remapConstant", RuntimeHooks::constant_lookup_descriptor()),
            callback_failure: hook(
                "onCallbackFailure",
                RuntimeHooks::callback_failure_descriptor(),
            ),
        }
    }
}

/// Static accessor returning the lifecycle owner attached to some target object
///
/// The accessor is `owner.getter(Ltarget;)Lowner_interface;` and its companion setter is
/// `owner.setter(Ltarget;Lowner_interface;)V`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LifecycleAccessor {
    pub owner: BinaryName,
    pub getter: UnqualifiedName,
    pub setter: UnqualifiedName,
    pub target: BinaryName,
    pub owner_interface: BinaryName,

    /// Lifecycle implementation held by the fallback (`LifecycleRegistry`)
    pub registry: BinaryName,

    /// Return type of the owner interface's accessor (`Lifecycle`)
    pub lifecycle: BinaryName,

    /// Enum of lifecycle states (`Lifecycle$State`)
    pub state: BinaryName,

    /// Name of the generated fallback owner
    pub fallback_class: BinaryName,
}

impl LifecycleAccessor {
    pub fn getter_descriptor(&self) -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![FieldType::object(self.target.clone())],
            return_type: Some(FieldType::object(self.owner_interface.clone())),
        }
    }

    pub fn setter_descriptor(&self) -> MethodDescriptor<BinaryName> {
        MethodDescriptor {
            parameters: vec![
                FieldType::object(self.target.clone()),
                FieldType::object(self.owner_interface.clone()),
            ],
            return_type: None,
        }
    }
}

impl Default for LifecycleAccessor {
    fn default() -> LifecycleAccessor {
        LifecycleAccessor {
            owner: BinaryName::from_static("androidx/lifecycle/ViewTreeLifecycleOwner"),
            getter: UnqualifiedName::from_static("get"),
            setter: UnqualifiedName::from_static("set"),
            target: BinaryName::from_static("android/view/View"),
            owner_interface: BinaryName::from_static("androidx/lifecycle/LifecycleOwner"),
            registry: BinaryName::from_static("androidx/lifecycle/LifecycleRegistry"),
            lifecycle: BinaryName::from_static("androidx/lifecycle/Lifecycle"),
            state: BinaryName::from_static("androidx/lifecycle/Lifecycle$State"),
            fallback_class: BinaryName::from_static("classmorph/runtime/FallbackLifecycleOwner"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn hooks_parse_and_render() {
        let hooks = RuntimeHooks::default();
        let rendered = hooks.constant_lookup.to_string();
        assert_eq!(
            rendered,
            "classmorph/runtime/SandboxHooks.remapConstant(Ljava/lang/Class;Ljava/lang/String;Ljava/lang/String;Ljava/lang/Object;)Ljava/lang/Object;"
        );
        assert_eq!(HookMethod::parse(&rendered).unwrap(), hooks.constant_lookup);

        assert!(HookMethod::parse("a/B.run").is_err());
        assert!(HookMethod::parse("run()V").is_err());
        assert!(HookMethod::parse("a/B.run(Q)V").is_err());
    }

    #[test]
    fn trusted_classes() {
        let settings = TransformSettings::default();
        let name = |name: &str| BinaryName::from_str(name).unwrap();
        assert!(settings.is_trusted(&name("java/util/ArrayList")));
        assert!(settings.is_trusted(&name("classmorph/runtime/TrackedThreadLocal")));
        assert!(settings.is_trusted(&name("classmorph/runtime/sub/Other")));
        assert!(!settings.is_trusted(&name("classmorph/runtimes/Other")));
        assert!(!settings.is_trusted(&name("com/example/Widget")));
    }

    #[test]
    fn default_hooks_have_expected_descriptors() {
        let hooks = RuntimeHooks::default();
        assert!(hooks
            .interrupt_check
            .expect_descriptor(&RuntimeHooks::no_arguments())
            .is_ok());
        assert!(hooks
            .callback_failure
            .expect_descriptor(&RuntimeHooks::no_arguments())
            .is_err());
    }
}
