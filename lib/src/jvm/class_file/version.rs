use crate::jvm::class_file::{Deserialize, Serialize};
use byteorder::{ReadBytesExt, WriteBytesExt};

/// Class file format version
///
/// Ordering compares the major version first.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version {
    pub major_version: u16,
    pub minor_version: u16,
}

impl Version {
    pub const JAVA5: Version = Version::major(49);
    pub const JAVA6: Version = Version::major(50);
    pub const JAVA7: Version = Version::major(51);
    pub const JAVA8: Version = Version::major(52);
    pub const JAVA11: Version = Version::major(55);
    pub const JAVA17: Version = Version::major(61);
    pub const JAVA21: Version = Version::major(65);

    pub const fn major(major_version: u16) -> Version {
        Version {
            major_version,
            minor_version: 0,
        }
    }

    /// Whether methods of this version need a `StackMapTable`
    pub fn requires_stack_map_frames(&self) -> bool {
        self.major_version >= 50
    }
}

impl Serialize for Version {
    fn serialize<W: WriteBytesExt>(&self, writer: &mut W) -> std::io::Result<()> {
        self.minor_version.serialize(writer)?;
        self.major_version.serialize(writer)?;
        Ok(())
    }
}

impl Deserialize for Version {
    fn deserialize<R: ReadBytesExt>(reader: &mut R) -> std::io::Result<Self> {
        let minor_version = u16::deserialize(reader)?;
        let major_version = u16::deserialize(reader)?;
        Ok(Version {
            major_version,
            minor_version,
        })
    }
}
