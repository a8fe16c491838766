#[cfg(feature = "sea-orm")]
use sea_orm::prelude::StringLen;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Kind of node in an owner's namespace.
///
/// When the `sea-orm` feature is enabled, this enum can be used directly in SeaORM entities.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "file"))]
    File,
    /// Folders never carry entities.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "folder"))]
    Folder,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a physical blob attached to a file.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// A content version; the newest completed one is the file's primary entity.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "version"))]
    Version,
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "thumbnail"))]
    Thumbnail,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Version => "version",
            Self::Thumbnail => "thumbnail",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend family a storage policy talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(
    feature = "sea-orm",
    derive(sea_orm::DeriveActiveEnum, sea_orm::EnumIter),
    sea_orm(rs_type = "String", db_type = "String(StringLen::None)")
)]
#[serde(rename_all = "snake_case")]
pub enum PolicyType {
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "local"))]
    Local,
    /// Any S3-compatible object store.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "s3"))]
    S3,
    /// Another node of this service reached over RPC.
    #[cfg_attr(feature = "sea-orm", sea_orm(string_value = "remote"))]
    Remote,
}

impl PolicyType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::S3 => "s3",
            Self::Remote => "remote",
        }
    }
}

impl fmt::Display for PolicyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error when parsing an unknown kind string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid {kind} '{invalid}'")]
pub struct ParseKindError {
    kind: &'static str,
    invalid: String,
}

impl FromStr for EntityType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "version" => Ok(Self::Version),
            "thumbnail" => Ok(Self::Thumbnail),
            _ => Err(ParseKindError {
                kind: "entity type",
                invalid: s.to_string(),
            }),
        }
    }
}

impl FromStr for PolicyType {
    type Err = ParseKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(Self::Local),
            "s3" => Ok(Self::S3),
            "remote" => Ok(Self::Remote),
            _ => Err(ParseKindError {
                kind: "policy type",
                invalid: s.to_string(),
            }),
        }
    }
}
