//! Managed file and mirrored directory resource

use anyhow::{Context, Result, bail};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::{ApplyContext, ApplyResult, Resource, ResourceState};
use crate::model::{ContentSource, FileKind, ManagedFile, Presence};
use crate::source::SourceResolver;

/// Observed state of the managed path
#[derive(Debug, PartialEq, Eq)]
enum FileState {
    Missing,
    Correct,
    /// Path exists with other content; `stale` lists what differs
    Differs { stale: Vec<PathBuf>, extra: Vec<PathBuf> },
    /// A file where a directory belongs or the other way round
    WrongType,
}

/// A planned file brought to its desired state on disk
#[derive(Debug, Clone)]
pub struct FileResource {
    pub file: ManagedFile,
    resolver: SourceResolver,
    /// Paths managed by other resources, never copied over or purged
    keep: BTreeSet<PathBuf>,
}

impl FileResource {
    pub fn new(file: ManagedFile, resolver: SourceResolver) -> Self {
        Self {
            file,
            resolver,
            keep: BTreeSet::new(),
        }
    }

    /// Leave these paths alone when mirroring a directory
    pub fn with_keep(mut self, keep: BTreeSet<PathBuf>) -> Self {
        self.keep = keep;
        self
    }

    fn path(&self) -> PathBuf {
        crate::paths::expand(&self.file.path)
    }

    fn source_path(&self) -> Result<Option<PathBuf>> {
        match &self.file.content_source {
            ContentSource::RemoteSource(uri) => Ok(Some(self.resolver.resolve(uri)?)),
            _ => Ok(None),
        }
    }

    /// Bytes the single file must hold
    fn desired_bytes(&self) -> Result<Vec<u8>> {
        if let Some(content) = &self.file.content {
            return Ok(content.clone().into_bytes());
        }
        match self.source_path()? {
            Some(source) => fs::read(&source)
                .with_context(|| format!("Failed to read source {}", source.display())),
            None => bail!("No content planned for {}", self.file.title),
        }
    }

    fn check_current(&self) -> Result<FileState> {
        let path = self.path();
        if !path.exists() && !path.is_symlink() {
            return Ok(FileState::Missing);
        }

        match self.file.kind {
            FileKind::File => {
                if path.is_dir() {
                    return Ok(FileState::WrongType);
                }
                let current = fs::read(&path)
                    .with_context(|| format!("Failed to read {}", path.display()))?;
                if blake3::hash(&current) == blake3::hash(&self.desired_bytes()?)
                    && self.mode_matches(&path)?
                {
                    Ok(FileState::Correct)
                } else {
                    Ok(FileState::Differs {
                        stale: vec![path],
                        extra: Vec::new(),
                    })
                }
            }
            FileKind::Directory => {
                if !path.is_dir() {
                    return Ok(FileState::WrongType);
                }
                let source = self.mirror_source()?;
                let (stale, extra) = mirror_diff(&source, &path, self.file.purge, &self.keep)?;
                if stale.is_empty() && extra.is_empty() {
                    Ok(FileState::Correct)
                } else {
                    Ok(FileState::Differs { stale, extra })
                }
            }
        }
    }

    fn mirror_source(&self) -> Result<PathBuf> {
        let Some(source) = self.source_path()? else {
            bail!("Directory {} has no source to mirror", self.file.title);
        };
        if !source.is_dir() {
            bail!("Source {} is not a directory", source.display());
        }
        Ok(source)
    }

    fn write_file(&self) -> Result<()> {
        let path = self.path();
        if path.is_dir() {
            if !self.file.force {
                bail!("{} is a directory; refusing to replace it", path.display());
            }
            fs::remove_dir_all(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create parent directory: {}", parent.display())
            })?;
        }
        fs::write(&path, self.desired_bytes()?)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        self.set_mode(&path)
    }

    fn sync_directory(&self) -> Result<()> {
        let path = self.path();
        let source = self.mirror_source()?;

        if path.exists() && !path.is_dir() {
            if !self.file.force {
                bail!("{} is not a directory; refusing to replace it", path.display());
            }
            fs::remove_file(&path)
                .with_context(|| format!("Failed to remove {}", path.display()))?;
        }
        fs::create_dir_all(&path)
            .with_context(|| format!("Failed to create {}", path.display()))?;

        let (stale, extra) = mirror_diff(&source, &path, self.file.purge, &self.keep)?;

        for relative in extra {
            let target = path.join(&relative);
            let removed = if target.is_dir() {
                fs::remove_dir_all(&target)
            } else if target.exists() || target.is_symlink() {
                fs::remove_file(&target)
            } else {
                // Already gone with its parent
                continue;
            };
            removed.with_context(|| format!("Failed to purge {}", target.display()))?;
            log::debug!("Purged {}", target.display());
        }

        for relative in stale {
            let from = source.join(&relative);
            let to = path.join(&relative);
            if from.is_dir() {
                if to.exists() && !to.is_dir() {
                    fs::remove_file(&to)?;
                }
                fs::create_dir_all(&to)
                    .with_context(|| format!("Failed to create {}", to.display()))?;
                continue;
            }
            if to.is_dir() {
                fs::remove_dir_all(&to)
                    .with_context(|| format!("Failed to replace {}", to.display()))?;
            }
            if let Some(parent) = to.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::copy(&from, &to)
                .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
            log::debug!("Copied {}", to.display());
        }

        Ok(())
    }

    fn remove(&self) -> Result<()> {
        let path = self.path();
        let removed = if path.is_dir() {
            if self.file.force {
                fs::remove_dir_all(&path)
            } else {
                fs::remove_dir(&path)
            }
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("Failed to remove {}", path.display()))
    }

    #[cfg(unix)]
    fn wanted_mode(&self) -> Result<u32> {
        u32::from_str_radix(&self.file.attributes.mode, 8)
            .with_context(|| format!("Invalid file mode '{}'", self.file.attributes.mode))
    }

    #[cfg(unix)]
    fn set_mode(&self, path: &Path) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        fs::set_permissions(path, fs::Permissions::from_mode(self.wanted_mode()?))
            .with_context(|| format!("Failed to set mode on {}", path.display()))
    }

    #[cfg(unix)]
    fn mode_matches(&self, path: &Path) -> Result<bool> {
        use std::os::unix::fs::PermissionsExt;

        let meta = fs::metadata(path)
            .with_context(|| format!("Failed to stat {}", path.display()))?;
        Ok(meta.permissions().mode() & 0o7777 == self.wanted_mode()?)
    }

    #[cfg(not(unix))]
    fn set_mode(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    #[cfg(not(unix))]
    fn mode_matches(&self, _path: &Path) -> Result<bool> {
        Ok(true)
    }
}

/// Compare a source tree with a local mirror
///
/// Returns relative paths that must be (re)copied and, when purging,
/// local paths that do not exist in the source. Both are sorted, so a
/// purged directory always precedes its children. Paths in `keep`, and
/// directories holding them, appear in neither list.
fn mirror_diff(
    source: &Path,
    local: &Path,
    purge: bool,
    keep: &BTreeSet<PathBuf>,
) -> Result<(Vec<PathBuf>, Vec<PathBuf>)> {
    let mut wanted = BTreeSet::new();
    let mut stale = Vec::new();

    for entry in WalkDir::new(source).min_depth(1).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", source.display()))?;
        let relative = entry.path().strip_prefix(source)?.to_path_buf();
        let target = local.join(&relative);
        if keep.contains(&target) {
            wanted.insert(relative);
            continue;
        }

        let up_to_date = if entry.file_type().is_dir() {
            target.is_dir()
        } else {
            target.is_file() && same_content(entry.path(), &target)?
        };
        if !up_to_date {
            stale.push(relative.clone());
        }
        wanted.insert(relative);
    }

    let mut extra = Vec::new();
    if purge && local.is_dir() {
        for entry in WalkDir::new(local).min_depth(1).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", local.display()))?;
            let relative = entry.path().strip_prefix(local)?.to_path_buf();
            let parent_purged = extra.iter().any(|p: &PathBuf| relative.starts_with(p));
            let target = local.join(&relative);
            let holds_kept = keep.iter().any(|k| k.starts_with(&target));
            if !wanted.contains(&relative) && !parent_purged && !holds_kept {
                extra.push(relative);
            }
        }
    }

    Ok((stale, extra))
}

fn same_content(a: &Path, b: &Path) -> Result<bool> {
    let hash = |p: &Path| -> Result<blake3::Hash> {
        let bytes = fs::read(p).with_context(|| format!("Failed to read {}", p.display()))?;
        Ok(blake3::hash(&bytes))
    };
    Ok(hash(a)? == hash(b)?)
}

impl Resource for FileResource {
    fn id(&self) -> String {
        self.file.title.clone()
    }

    fn description(&self) -> String {
        match self.file.kind {
            FileKind::File => format!("Ensure file {} is {}", self.file.path, self.file.desired_state),
            FileKind::Directory => format!(
                "Mirror directory {}{}",
                self.file.path,
                if self.file.purge { " (purge)" } else { "" }
            ),
        }
    }

    fn resource_type(&self) -> &'static str {
        "file"
    }

    fn noop(&self) -> bool {
        self.file.noop
    }

    fn current_state(&self) -> Result<ResourceState> {
        if self.file.desired_state == Presence::Absent {
            let path = self.path();
            return Ok(if path.exists() || path.is_symlink() {
                ResourceState::Present { details: None }
            } else {
                ResourceState::Absent
            });
        }

        Ok(match self.check_current()? {
            FileState::Missing => ResourceState::Absent,
            FileState::Correct => ResourceState::Present { details: None },
            FileState::Differs { stale, extra } => ResourceState::Modified {
                from: format!("{} stale, {} extra", stale.len(), extra.len()),
                to: "in sync".to_string(),
            },
            FileState::WrongType => ResourceState::Modified {
                from: "wrong file type".to_string(),
                to: match self.file.kind {
                    FileKind::File => "file".to_string(),
                    FileKind::Directory => "directory".to_string(),
                },
            },
        })
    }

    fn desired_state(&self) -> ResourceState {
        match self.file.desired_state {
            Presence::Present => ResourceState::Present { details: None },
            Presence::Absent => ResourceState::Absent,
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let path = self.path();

        if self.file.desired_state == Presence::Absent {
            if !path.exists() && !path.is_symlink() {
                return Ok(ApplyResult::NoChange);
            }
            if let Some(reason) = ctx.skip_reason() {
                return Ok(ApplyResult::Skipped {
                    reason: format!("{reason}: would remove {}", path.display()),
                });
            }
            self.remove()?;
            return Ok(ApplyResult::Removed);
        }

        let state = self.check_current()?;
        if state == FileState::Correct {
            return Ok(ApplyResult::NoChange);
        }
        if let Some(reason) = ctx.skip_reason() {
            let verb = if state == FileState::Missing { "create" } else { "update" };
            return Ok(ApplyResult::Skipped {
                reason: format!("{reason}: would {verb} {}", path.display()),
            });
        }

        match self.file.kind {
            FileKind::File => self.write_file()?,
            FileKind::Directory => self.sync_directory()?,
        }

        Ok(if state == FileState::Missing {
            ApplyResult::Created
        } else {
            ApplyResult::Modified
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{FileAttributes, describe_file};
    use tempfile::TempDir;

    fn conf(path: &Path, content: Option<&str>, presence: Presence) -> FileResource {
        let mut file = describe_file(
            path.to_str().unwrap(),
            presence,
            FileKind::File,
            None::<ContentSource>,
            false,
            false,
        )
        .unwrap()
        .titled("shorewall.conf");
        if let Some(c) = content {
            file = file.with_content(c.to_string());
        }
        FileResource::new(file, SourceResolver::default())
    }

    fn mirror(modules: &Path, local: &Path, purge: bool) -> FileResource {
        let file = describe_file(
            local.to_str().unwrap(),
            Presence::Present,
            FileKind::Directory,
            Some(ContentSource::RemoteSource(
                "puppet:///modules/shorewall/dir/spec".into(),
            )),
            purge,
            true,
        )
        .unwrap()
        .titled("shorewall.dir");
        FileResource::new(file, SourceResolver::new(Some(modules.to_path_buf())))
    }

    fn ctx() -> ApplyContext {
        ApplyContext::new(false, false)
    }

    #[test]
    fn test_write_then_converged() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("etc").join("shorewall.conf");
        let res = conf(&path, Some("fqdn: rspec.example42.com\n"), Presence::Present);

        assert_eq!(res.current_state().unwrap(), ResourceState::Absent);
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Created);
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "fqdn: rspec.example42.com\n"
        );
        assert!(!res.needs_apply().unwrap());
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::NoChange);
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_is_applied() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shorewall.conf");
        let mut res = conf(&path, Some("x"), Presence::Present);
        res.file = res.file.clone().with_attributes(FileAttributes {
            mode: "0600".into(),
            ..Default::default()
        });
        res.apply(&ctx()).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[cfg(unix)]
    #[test]
    fn test_mode_drift_is_corrected() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shorewall.conf");
        let res = conf(&path, Some("managed\n"), Presence::Present);
        fs::write(&path, "managed\n").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).unwrap();

        assert!(res.needs_apply().unwrap());
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o7777;
        assert_eq!(mode, 0o644);
        assert!(!res.needs_apply().unwrap());
    }

    #[test]
    fn test_rewrite_changed_content() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shorewall.conf");
        fs::write(&path, "hand edited").unwrap();
        let res = conf(&path, Some("managed"), Presence::Present);

        assert!(matches!(
            res.current_state().unwrap(),
            ResourceState::Modified { .. }
        ));
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);
        assert_eq!(fs::read_to_string(&path).unwrap(), "managed");
    }

    #[test]
    fn test_remove_when_absent() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shorewall.conf");
        fs::write(&path, "old").unwrap();
        let res = conf(&path, None, Presence::Absent);

        assert!(res.needs_apply().unwrap());
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Removed);
        assert!(!path.exists());
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::NoChange);
    }

    #[test]
    fn test_noop_leaves_file_alone() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("shorewall.conf");
        fs::write(&path, "old").unwrap();
        let res = conf(&path, None, Presence::Absent);

        let result = res.apply(&ctx().with_noop(true)).unwrap();
        assert!(matches!(result, ApplyResult::Skipped { ref reason } if reason.starts_with("noop: would remove")));
        assert!(path.exists());
    }

    #[test]
    fn test_copy_remote_file() {
        let tmp = TempDir::new().unwrap();
        let files = tmp.path().join("modules").join("shorewall").join("files");
        fs::create_dir_all(&files).unwrap();
        fs::write(files.join("spec"), "from source\n").unwrap();

        let target = tmp.path().join("shorewall.conf");
        let file = describe_file(
            target.to_str().unwrap(),
            Presence::Present,
            FileKind::File,
            Some(ContentSource::RemoteSource(
                "puppet:///modules/shorewall/spec".into(),
            )),
            false,
            false,
        )
        .unwrap();
        let res = FileResource::new(file, SourceResolver::new(Some(tmp.path().join("modules"))));

        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Created);
        assert_eq!(fs::read_to_string(&target).unwrap(), "from source\n");
    }

    fn seed_source(modules: &Path) {
        let source = modules
            .join("shorewall")
            .join("files")
            .join("dir")
            .join("spec");
        fs::create_dir_all(source.join("zones.d")).unwrap();
        fs::write(source.join("rules"), "ACCEPT all all\n").unwrap();
        fs::write(source.join("zones.d").join("net"), "net ipv4\n").unwrap();
    }

    #[test]
    fn test_mirror_with_purge() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join("modules");
        seed_source(&modules);

        let local = tmp.path().join("etc-shorewall");
        fs::create_dir_all(local.join("old.d")).unwrap();
        fs::write(local.join("old.d").join("leftover"), "x").unwrap();
        fs::write(local.join("rules"), "DROP all all\n").unwrap();

        let res = mirror(&modules, &local, true);
        assert!(res.needs_apply().unwrap());
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);

        assert_eq!(
            fs::read_to_string(local.join("rules")).unwrap(),
            "ACCEPT all all\n"
        );
        assert_eq!(
            fs::read_to_string(local.join("zones.d").join("net")).unwrap(),
            "net ipv4\n"
        );
        assert!(!local.join("old.d").exists());
        assert!(!res.needs_apply().unwrap());
    }

    #[test]
    fn test_purge_spares_kept_paths() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join("modules");
        seed_source(&modules);
        let source = modules.join("shorewall/files/dir/spec");
        fs::write(source.join("shorewall.conf"), "from source dir\n").unwrap();

        let local = tmp.path().join("etc-shorewall");
        fs::create_dir_all(local.join("managed.d")).unwrap();
        let conf_path = local.join("shorewall.conf");
        let nested = local.join("managed.d").join("extra");
        fs::write(&conf_path, "managed elsewhere\n").unwrap();
        fs::write(&nested, "also managed\n").unwrap();
        fs::write(local.join("stray"), "x").unwrap();

        let res = mirror(&modules, &local, true)
            .with_keep(BTreeSet::from([conf_path.clone(), nested.clone()]));
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);

        assert_eq!(fs::read_to_string(&conf_path).unwrap(), "managed elsewhere\n");
        assert!(nested.exists());
        assert!(!local.join("stray").exists());
        assert!(local.join("rules").exists());
        assert!(!res.needs_apply().unwrap());
    }

    #[test]
    fn test_mirror_without_purge_keeps_local_extras() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join("modules");
        seed_source(&modules);

        let local = tmp.path().join("etc-shorewall");
        fs::create_dir_all(&local).unwrap();
        fs::write(local.join("local-only"), "keep me").unwrap();

        let res = mirror(&modules, &local, false);
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);
        assert!(local.join("local-only").exists());
        assert!(local.join("rules").exists());
        assert!(!res.needs_apply().unwrap());
    }

    #[test]
    fn test_mirror_force_replaces_file() {
        let tmp = TempDir::new().unwrap();
        let modules = tmp.path().join("modules");
        seed_source(&modules);

        let local = tmp.path().join("etc-shorewall");
        fs::write(&local, "not a directory").unwrap();

        let res = mirror(&modules, &local, false);
        assert_eq!(res.apply(&ctx()).unwrap(), ApplyResult::Modified);
        assert!(local.is_dir());
        assert!(local.join("zones.d").join("net").is_file());
    }

    #[test]
    fn test_mirror_diff_skips_children_of_purged_dirs() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("src");
        let local = tmp.path().join("dst");
        fs::create_dir_all(&source).unwrap();
        fs::create_dir_all(local.join("gone").join("deeper")).unwrap();
        fs::write(local.join("gone").join("deeper").join("f"), "x").unwrap();

        let (stale, extra) = mirror_diff(&source, &local, true, &BTreeSet::new()).unwrap();
        assert!(stale.is_empty());
        assert_eq!(extra, vec![PathBuf::from("gone")]);
    }
}
