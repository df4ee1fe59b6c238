use crate::jvm;
use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum Error {
    /// Reading, rewriting, or writing the class failed
    Jvm(jvm::Error),

    /// A pass was constructed with parameters it cannot work with
    InvalidSetting(String),
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Jvm(err)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::Jvm(err) => write!(f, "{}", err),
            Error::InvalidSetting(msg) => write!(f, "invalid setting: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Jvm(err) => Some(err),
            Error::InvalidSetting(_) => None,
        }
    }
}
