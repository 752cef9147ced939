//! Resource model: typed descriptors for the package and files we manage
//!
//! Descriptors are plain data. They are built fresh on every run by the
//! planner and handed to the apply resources in `crate::resource`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{PlanError, Result};

/// Target state of a managed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PackageTarget {
    Present,
    Absent,
    Version(String),
}

impl fmt::Display for PackageTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
            Self::Version(v) => write!(f, "{v}"),
        }
    }
}

/// A package the host must (or must not) have
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedPackage {
    pub name: String,
    pub desired_state: PackageTarget,
    pub noop: bool,
}

/// Presence of a managed file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Presence {
    Present,
    Absent,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Present => write!(f, "present"),
            Self::Absent => write!(f, "absent"),
        }
    }
}

/// Whether a managed path is a single file or a mirrored directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    File,
    Directory,
}

/// Where the content of a managed file comes from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Render a named template with extra options
    InlineTemplate {
        template: String,
        options: BTreeMap<String, String>,
    },
    /// Copy from a source URI (file or directory)
    RemoteSource(String),
    /// Let a named content provider produce the content
    CustomProvider(String),
    /// The module's built-in template
    Default,
}

impl ContentSource {
    fn label(&self) -> String {
        match self {
            Self::InlineTemplate { template, .. } => format!("template {template}"),
            Self::RemoteSource(uri) => format!("source {uri}"),
            Self::CustomProvider(class) => format!("class {class}"),
            Self::Default => "default".to_string(),
        }
    }
}

/// Ownership and permissions applied to managed files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileAttributes {
    pub mode: String,
    pub owner: String,
    pub group: String,
}

impl Default for FileAttributes {
    fn default() -> Self {
        Self {
            mode: "0644".to_string(),
            owner: "root".to_string(),
            group: "root".to_string(),
        }
    }
}

/// A file or directory the host must (or must not) have
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManagedFile {
    /// Catalog name, e.g. "shorewall.conf"
    pub title: String,
    pub path: String,
    pub desired_state: Presence,
    pub kind: FileKind,
    pub content_source: ContentSource,
    /// Rendered content for template, provider and default sources
    pub content: Option<String>,
    pub purge: bool,
    pub force: bool,
    pub noop: bool,
    pub attributes: FileAttributes,
}

impl ManagedFile {
    /// Set the catalog name (defaults to the path)
    pub fn titled(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn with_content(mut self, content: String) -> Self {
        self.content = Some(content);
        self
    }

    pub fn with_noop(mut self, noop: bool) -> Self {
        self.noop = noop;
        self
    }

    pub fn with_attributes(mut self, attributes: FileAttributes) -> Self {
        self.attributes = attributes;
        self
    }

    /// Whether this file mirrors a remote directory
    pub fn is_mirror(&self) -> bool {
        self.kind == FileKind::Directory
            && matches!(self.content_source, ContentSource::RemoteSource(_))
    }
}

/// Build a package descriptor
///
/// A `Version` target must carry a non-empty version without whitespace.
pub fn describe_package(name: &str, target: PackageTarget, noop: bool) -> Result<ManagedPackage> {
    if let PackageTarget::Version(v) = &target
        && (v.trim().is_empty() || v.chars().any(char::is_whitespace))
    {
        return Err(PlanError::InvalidVersionFormat(v.clone()));
    }

    Ok(ManagedPackage {
        name: name.to_string(),
        desired_state: target,
        noop,
    })
}

/// Build a file descriptor
///
/// At most one content source may be supplied; none means the module
/// default. `purge` and `force` only survive for directory mirrors of a
/// remote source and are cleared otherwise.
pub fn describe_file(
    path: &str,
    presence: Presence,
    kind: FileKind,
    sources: impl IntoIterator<Item = ContentSource>,
    purge: bool,
    force: bool,
) -> Result<ManagedFile> {
    let mut sources: Vec<ContentSource> = sources.into_iter().collect();
    if sources.len() > 1 {
        return Err(PlanError::ConflictingContentSource {
            path: path.to_string(),
            sources: sources
                .iter()
                .map(ContentSource::label)
                .collect::<Vec<_>>()
                .join(", "),
        });
    }
    let content_source = sources.pop().unwrap_or(ContentSource::Default);

    let mut file = ManagedFile {
        title: path.to_string(),
        path: path.to_string(),
        desired_state: presence,
        kind,
        content_source,
        content: None,
        purge,
        force,
        noop: false,
        attributes: FileAttributes::default(),
    };

    if !file.is_mirror() && (purge || force) {
        log::debug!("Ignoring purge/force on {path}: not a remote directory mirror");
        file.purge = false;
        file.force = false;
    }

    Ok(file)
}
