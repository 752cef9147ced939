//! Source URI resolution
//!
//! Supported forms:
//! - `puppet:///modules/<module>/<path>` -> `<module_path>/<module>/files/<path>`
//! - `file:///abs/path` and plain absolute paths

use anyhow::{Result, bail};
use std::path::{Component, Path, PathBuf};

/// Maps source URIs onto local paths
#[derive(Debug, Clone, Default)]
pub struct SourceResolver {
    module_path: Option<PathBuf>,
}

impl SourceResolver {
    pub fn new(module_path: Option<PathBuf>) -> Self {
        Self { module_path }
    }

    /// Resolve a URI to the local path holding its content
    ///
    /// The path is not required to exist.
    pub fn resolve(&self, uri: &str) -> Result<PathBuf> {
        if let Some(rest) = uri.strip_prefix("puppet:///modules/") {
            let Some(root) = &self.module_path else {
                bail!("Cannot resolve {uri}: no module_path configured");
            };
            let Some((module, file)) = rest.split_once('/') else {
                bail!("Source {uri} does not name a file inside a module");
            };
            let relative = Path::new(file);
            if module.is_empty() || !is_plain_relative(relative) {
                bail!("Source {uri} escapes its module");
            }
            return Ok(root.join(module).join("files").join(relative));
        }

        let local = uri.strip_prefix("file://").unwrap_or(uri);
        let path = Path::new(local);
        if path.is_absolute() {
            return Ok(path.to_path_buf());
        }

        bail!("Unsupported source: {uri}")
    }
}

pub(crate) fn is_plain_relative(path: &Path) -> bool {
    !path.as_os_str().is_empty() && path.components().all(|c| matches!(c, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SourceResolver {
        SourceResolver::new(Some(PathBuf::from("/srv/modules")))
    }

    #[test]
    fn test_module_uri() {
        assert_eq!(
            resolver()
                .resolve("puppet:///modules/shorewall/dir/spec")
                .unwrap(),
            PathBuf::from("/srv/modules/shorewall/files/dir/spec")
        );
    }

    #[test]
    fn test_local_paths() {
        assert_eq!(
            resolver().resolve("file:///tmp/shorewall.conf").unwrap(),
            PathBuf::from("/tmp/shorewall.conf")
        );
        assert_eq!(
            resolver().resolve("/tmp/shorewall.conf").unwrap(),
            PathBuf::from("/tmp/shorewall.conf")
        );
    }

    #[test]
    fn test_rejected_sources() {
        assert!(resolver().resolve("puppet:///modules/shorewall").is_err());
        assert!(resolver().resolve("puppet:///modules/shorewall/../etc").is_err());
        assert!(resolver().resolve("https://example.com/spec").is_err());
        assert!(resolver().resolve("relative/path").is_err());
        assert!(
            SourceResolver::default()
                .resolve("puppet:///modules/shorewall/spec")
                .is_err()
        );
    }
}
