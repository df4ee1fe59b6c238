use classmorph::jvm::class_graph::{
    CachingLocator, ChainedLocator, ClassBytesLocator, ClassDescriptor, ClassDirectory,
    DefinedClassesLocator, DescriptorLocator, FallbackLocator, PlatformLocator,
};
use classmorph::jvm::{self, ClassReader, Name};
use classmorph::transform::*;

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use walkdir::WalkDir;

fn main() -> Result<(), Error> {
    env_logger::init();

    let matches = Command::new("Sandbox class transformer")
        .version(clap::crate_version!())
        .about("Apply sandbox rewriting passes to class files")
        .arg(
            Arg::new("INPUT")
                .help("Class file, or directory of class files, to transform")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .index(1),
        )
        .arg(
            Arg::new("output")
                .long("output")
                .short('o')
                .value_name("DIR")
                .required(true)
                .value_parser(value_parser!(PathBuf))
                .help("Directory where transformed classes are written"),
        )
        .arg(
            Arg::new("classpath")
                .long("classpath")
                .value_name("DIR")
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Directory of already compiled classes that the inputs depend on"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Fail classes referencing unknown types instead of assuming `Object`"),
        )
        .arg(
            Arg::new("min-version")
                .long("min-version")
                .value_name("MAJOR")
                .value_parser(value_parser!(u16))
                .help("Raise class file versions to at least this major version"),
        )
        .arg(
            Arg::new("max-version")
                .long("max-version")
                .value_name("MAJOR")
                .value_parser(value_parser!(u16))
                .help("Lower class file versions to at most this major version"),
        )
        .arg(
            Arg::new("wrap-callbacks")
                .long("wrap-callbacks")
                .action(ArgAction::SetTrue)
                .help("Swallow exceptions thrown by view callbacks (`onDraw`, `onMeasure`, ...)"),
        )
        .arg(
            Arg::new("lifecycle-fallback")
                .long("lifecycle-fallback")
                .action(ArgAction::SetTrue)
                .help("Attach a fallback lifecycle owner when the accessor would return `null`"),
        )
        .arg(
            Arg::new("replace-class")
                .long("replace-class")
                .value_name("FROM=TO")
                .action(ArgAction::Append)
                .help("Extend and instantiate class `TO` wherever `FROM` was"),
        )
        .arg(
            Arg::new("track-thread-locals")
                .long("track-thread-locals")
                .action(ArgAction::SetTrue)
                .help("Substitute a tracked variant for `java/lang/ThreadLocal`"),
        )
        .arg(
            Arg::new("repackage")
                .long("repackage")
                .value_name("PREFIX")
                .action(ArgAction::Append)
                .requires("new-prefix")
                .help("Package prefix (eg. `com/lib/`) of classes to move under `--new-prefix`"),
        )
        .arg(
            Arg::new("new-prefix")
                .long("new-prefix")
                .value_name("PREFIX")
                .help("Package prefix that repackaged classes are moved under"),
        )
        .arg(
            Arg::new("allocation-sampling")
                .long("allocation-sampling")
                .value_name("PERCENT")
                .value_parser(value_parser!(u8))
                .help("Percentage of allocation sites reporting to the allocation limiter"),
        )
        .arg(
            Arg::new("interrupt-sampling")
                .long("interrupt-sampling")
                .value_name("PERCENT")
                .value_parser(value_parser!(u8))
                .help("Percentage of loop back edges checking for interruption"),
        )
        .arg(
            Arg::new("detect-live-literals")
                .long("detect-live-literals")
                .action(ArgAction::SetTrue)
                .help("Report classes compiled with Compose live literals"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_name("SEED")
                .value_parser(value_parser!(u64))
                .help("Seed deciding which sites are sampled"),
        )
        .arg(
            Arg::new("trusted")
                .long("trusted")
                .value_name("PREFIX")
                .action(ArgAction::Append)
                .help("Additional package prefix that is never instrumented"),
        )
        .get_matches();

    let mut settings = TransformSettings::default();
    if let Some(seed) = matches.get_one::<u64>("seed") {
        settings.sampling_seed = *seed;
    }
    settings
        .trusted_prefixes
        .extend(strings(&matches, "trusted").map(String::from));

    let pipeline = TransformPipeline::catalogue(passes(&matches, &settings)?);
    log::info!("Transforming with {}", pipeline.key());

    let input = matches
        .get_one::<PathBuf>("INPUT")
        .ok_or_else(|| Error::InvalidSetting(String::from("missing input")))?;
    let output = matches
        .get_one::<PathBuf>("output")
        .ok_or_else(|| Error::InvalidSetting(String::from("missing output directory")))?;

    let classes = read_classes(input)?;
    let locator = locator(&matches, &classes);

    for (relative, bytes) in &classes {
        let transformed = pipeline.transform_or_passthrough(bytes, &*locator);
        let path = match ClassReader::descriptor(&transformed) {
            Ok(descriptor) => class_path(output, &descriptor),
            Err(_) => output.join(relative),
        };
        write_file(&path, &transformed)?;
    }
    for class in pipeline.generated_classes() {
        let bytes = jvm::write_class(class, &*locator)?;
        let path = class_path(output, &ClassDescriptor::from_header(&class.header));
        write_file(&path, &bytes)?;
    }

    log::info!(
        "Transformed {} classes into '{}'",
        classes.len(),
        output.display()
    );
    Ok(())
}

fn strings<'m>(matches: &'m ArgMatches, id: &str) -> impl Iterator<Item = &'m str> {
    matches
        .get_many::<String>(id)
        .into_iter()
        .flatten()
        .map(String::as_str)
}

/// Passes selected on the command line
fn passes(matches: &ArgMatches, settings: &TransformSettings) -> Result<Vec<Transform>, Error> {
    let mut passes: Vec<Transform> = vec![];

    let min_version = matches.get_one::<u16>("min-version").copied();
    let max_version = matches.get_one::<u16>("max-version").copied();
    if min_version.is_some() || max_version.is_some() {
        let clamp = VersionClamp::new(min_version.unwrap_or(0), max_version.unwrap_or(u16::MAX))?;
        passes.push(clamp.into());
    }
    if matches.get_flag("wrap-callbacks") {
        passes.push(ExceptionWrap::new(settings)?.into());
    }
    if matches.get_flag("lifecycle-fallback") {
        passes.push(LifecycleOwnerFallback::new(settings)?.into());
    }
    for replacement in strings(matches, "replace-class") {
        let (from, to) = replacement.split_once('=').ok_or_else(|| {
            Error::InvalidSetting(format!("expected `FROM=TO`, got '{}'", replacement))
        })?;
        passes.push(ReplaceClass::new(from, to)?.into());
    }
    if matches.get_flag("track-thread-locals") {
        passes.push(ThreadLocalSubstitution::new(settings)?.into());
    }
    let prefixes: Vec<String> = strings(matches, "repackage").map(String::from).collect();
    if let Some(new_prefix) = matches.get_one::<String>("new-prefix") {
        passes.push(Repackage::new(prefixes, new_prefix.clone())?.into());
    }
    if let Some(percentage) = matches.get_one::<u8>("allocation-sampling") {
        passes.push(AllocationLimit::new(*percentage, settings)?.into());
    }
    if let Some(percentage) = matches.get_one::<u8>("interrupt-sampling") {
        passes.push(CooperativeInterrupt::new(*percentage, settings)?.into());
    }
    if matches.get_flag("detect-live-literals") {
        let detection = LiveLiteralsDetection::new(settings, |class| {
            log::info!("Found live literals in {}", class)
        });
        passes.push(detection.into());
    }

    Ok(passes)
}

/// Every `.class` file under the input, along with its path relative to the input
fn read_classes(input: &Path) -> Result<Vec<(PathBuf, Vec<u8>)>, Error> {
    let mut classes = vec![];
    for entry in WalkDir::new(input).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
        let entry = entry.map_err(|err| jvm::Error::IoError(err.into()))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().map_or(true, |ext| ext != "class") {
            continue;
        }
        log::debug!("Reading '{}'", path.display());
        let bytes = fs::read(path).map_err(jvm::Error::IoError)?;
        let relative = match path.strip_prefix(input) {
            Ok(relative) if relative.as_os_str().is_empty() => PathBuf::from(entry.file_name()),
            Ok(relative) => relative.to_path_buf(),
            Err(_) => PathBuf::from(entry.file_name()),
        };
        classes.push((relative, bytes));
    }
    Ok(classes)
}

/// Locator over the inputs, then the classpath, then the platform classes
fn locator(matches: &ArgMatches, classes: &[(PathBuf, Vec<u8>)]) -> Arc<dyn DescriptorLocator> {
    let inputs = DefinedClassesLocator::new();
    for (path, bytes) in classes {
        match ClassReader::descriptor(bytes) {
            Ok(descriptor) => inputs.register(descriptor),
            Err(err) => log::warn!("Cannot describe '{}': {}", path.display(), err),
        }
    }

    let mut chain = ChainedLocator::default().then(inputs);
    for directory in matches.get_many::<PathBuf>("classpath").into_iter().flatten() {
        chain = chain.then(ClassBytesLocator::new(ClassDirectory::new(directory.clone())));
    }
    let chain = CachingLocator::new(chain.then(PlatformLocator));

    if matches.get_flag("strict") {
        Arc::new(chain)
    } else {
        Arc::new(FallbackLocator::new(chain))
    }
}

fn class_path(output: &Path, descriptor: &ClassDescriptor) -> PathBuf {
    let mut path = output.to_path_buf();
    path.extend(descriptor.name.as_str().split('/'));
    path.set_extension("class");
    path
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), Error> {
    log::info!("Writing '{}'", path.display());
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(jvm::Error::IoError)?;
    }
    fs::write(path, bytes).map_err(jvm::Error::IoError)?;
    Ok(())
}
