use crate::error::{Error, Result};

use std::fmt;
use std::str::FromStr;

/// Protocol versions a session can speak.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Version {
    /// 1.0
    V1_0,
    /// 1.1
    V1_1,
    /// 1.2
    V1_2,
}

impl Version {
    /// Every known version, oldest first.
    pub const ALL: [Self; 3] = [Self::V1_0, Self::V1_1, Self::V1_2];

    /// The version string as it appears on the wire.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::V1_0 => "1.0",
            Self::V1_1 => "1.1",
            Self::V1_2 => "1.2",
        }
    }

    /// Whether heart-beating is part of this version.
    #[must_use]
    pub const fn supports_heartbeat(self) -> bool {
        !matches!(self, Self::V1_0)
    }

    /// Picks the highest version present both in the client's
    /// `accept-version` header and in `supported`.
    ///
    /// A missing header means the client only speaks 1.0. Unknown entries in
    /// the header are ignored.
    ///
    /// # Errors
    /// Returns [`Error::UnsupportedVersion`] when there is no common version.
    pub fn negotiate(accept_version: Option<&str>, supported: &[Self]) -> Result<Self> {
        let offered = accept_version.unwrap_or("1.0");
        offered
            .split(',')
            .filter_map(|v| v.trim().parse::<Self>().ok())
            .filter(|v| supported.contains(v))
            .max()
            .ok_or_else(|| Error::UnsupportedVersion(offered.to_string()))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Version {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0" => Ok(Self::V1_0),
            "1.1" => Ok(Self::V1_1),
            "1.2" => Ok(Self::V1_2),
            other => Err(Error::UnsupportedVersion(other.to_string())),
        }
    }
}
