use super::Error;
use crate::jvm::class_file::Version;
use crate::jvm::model::ClassHeader;
use crate::jvm::{self, ClassVisitor};
use log::debug;

/// Keep class file versions within `[min, max]`
///
/// Only the major version is compared. When it changes, the minor version is reset to 0 (so
/// preview features of a newer release never survive a downgrade).
pub struct VersionClamp {
    min: u16,
    max: u16,
}

impl VersionClamp {
    pub fn new(min: u16, max: u16) -> Result<VersionClamp, Error> {
        if min > max {
            return Err(Error::InvalidSetting(format!(
                "minimum class version {} is above maximum {}",
                min, max
            )));
        }
        Ok(VersionClamp { min, max })
    }

    pub fn key(&self) -> String {
        format!("version-clamp:{}-{}", self.min, self.max)
    }

    /// Version a class of the given version is rewritten to
    pub fn clamp(&self, version: Version) -> Version {
        let major = version.major_version.clamp(self.min, self.max);
        if major == version.major_version {
            version
        } else {
            Version::major(major)
        }
    }

    pub fn wrap<'a>(&'a self, next: Box<dyn ClassVisitor + 'a>) -> Box<dyn ClassVisitor + 'a> {
        Box::new(VersionClampVisitor { pass: self, next })
    }
}

struct VersionClampVisitor<'a> {
    pass: &'a VersionClamp,
    next: Box<dyn ClassVisitor + 'a>,
}

impl<'a> ClassVisitor for VersionClampVisitor<'a> {
    fn delegate(&mut self) -> Option<&mut dyn ClassVisitor> {
        Some(&mut *self.next)
    }

    fn visit_header(&mut self, mut header: ClassHeader) -> Result<(), jvm::Error> {
        let clamped = self.pass.clamp(header.version);
        if clamped != header.version {
            debug!(
                "Clamping version of {} from {} to {}",
                header.name, header.version.major_version, clamped.major_version
            );
            header.version = clamped;
        }
        self.next.visit_header(header)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn clamps_major_version() {
        let clamp = VersionClamp::new(52, 61).unwrap();
        assert_eq!(clamp.clamp(Version::JAVA21), Version::JAVA17);
        assert_eq!(clamp.clamp(Version::JAVA6), Version::JAVA8);

        let preview = Version {
            major_version: 55,
            minor_version: 0xffff,
        };
        assert_eq!(clamp.clamp(preview), preview);

        let newer_preview = Version {
            major_version: 65,
            minor_version: 0xffff,
        };
        assert_eq!(clamp.clamp(newer_preview), Version::JAVA17);
    }

    #[test]
    fn empty_range_is_rejected() {
        assert!(VersionClamp::new(61, 52).is_err());
        assert!(VersionClamp::new(52, 52).is_ok());
    }
}
