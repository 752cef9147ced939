//! System package resource

use anyhow::{Context, Result, bail};
use std::fmt;
use std::process::{Command, Output};
use std::rc::Rc;

use super::{ApplyContext, ApplyResult, Resource, ResourceState};
use crate::model::{ManagedPackage, PackageTarget};

/// Narrow interface to the host package manager
pub trait PackageBackend: fmt::Debug {
    /// Installed version, or `None` when the package is not installed
    fn installed_version(&self, name: &str) -> Result<Option<String>>;

    /// Install the package, at an exact version when given
    fn install(&self, name: &str, version: Option<&str>) -> Result<()>;

    /// Remove the package
    fn remove(&self, name: &str) -> Result<()>;
}

fn run(cmd: &str, args: &[&str]) -> Result<Output> {
    log::debug!("Running {cmd} {}", args.join(" "));
    Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("Failed to run {cmd}"))
}

fn run_checked(cmd: &str, args: &[&str]) -> Result<()> {
    let output = run(cmd, args)?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{cmd} {} failed: {}", args.join(" "), stderr.trim());
    }
    Ok(())
}

/// Debian family: dpkg-query and apt-get
#[derive(Debug, Clone, Copy)]
pub struct Apt;

impl PackageBackend for Apt {
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = run("dpkg-query", &["-W", "-f=${Status}\t${Version}", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        Ok(parse_dpkg_query(&String::from_utf8_lossy(&output.stdout)))
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let spec = match version {
            Some(v) => format!("{name}={v}"),
            None => name.to_string(),
        };
        run_checked(
            "apt-get",
            &["install", "-y", "--allow-downgrades", "-q", &spec],
        )
    }

    fn remove(&self, name: &str) -> Result<()> {
        run_checked("apt-get", &["remove", "-y", "-q", name])
    }
}

/// `dpkg-query -W -f='${Status}\t${Version}'` output to a version
///
/// Packages that were removed but kept their config report
/// "deinstall ok config-files" and count as not installed.
fn parse_dpkg_query(stdout: &str) -> Option<String> {
    let (status, version) = stdout.trim().split_once('\t')?;
    if status.split_whitespace().last() == Some("installed") && !version.is_empty() {
        Some(version.to_string())
    } else {
        None
    }
}

/// Red Hat family: rpm and dnf
#[derive(Debug, Clone, Copy)]
pub struct Dnf;

impl PackageBackend for Dnf {
    fn installed_version(&self, name: &str) -> Result<Option<String>> {
        let output = run("rpm", &["-q", "--qf", "%{VERSION}-%{RELEASE}", name])?;
        if !output.status.success() {
            return Ok(None);
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!version.is_empty()).then_some(version))
    }

    fn install(&self, name: &str, version: Option<&str>) -> Result<()> {
        let spec = match version {
            Some(v) => format!("{name}-{v}"),
            None => name.to_string(),
        };
        run_checked("dnf", &["install", "-y", "-q", &spec])
    }

    fn remove(&self, name: &str) -> Result<()> {
        run_checked("dnf", &["remove", "-y", "-q", name])
    }
}

/// What converging the package would do
#[derive(Debug, Clone, PartialEq, Eq)]
enum PackageAction {
    Nothing,
    Install,
    Change { from: String },
    Remove,
}

/// A package brought to its planned state through a backend
#[derive(Debug, Clone)]
pub struct PackageResource {
    pub package: ManagedPackage,
    backend: Rc<dyn PackageBackend>,
}

impl PackageResource {
    pub fn new(package: ManagedPackage, backend: Rc<dyn PackageBackend>) -> Self {
        Self { package, backend }
    }

    fn action(&self) -> Result<PackageAction> {
        let installed = self.backend.installed_version(&self.package.name)?;
        let action = match (&self.package.desired_state, installed) {
            (PackageTarget::Absent, None) => PackageAction::Nothing,
            (PackageTarget::Absent, Some(_)) => PackageAction::Remove,
            (PackageTarget::Present, Some(_)) => PackageAction::Nothing,
            (PackageTarget::Present | PackageTarget::Version(_), None) => PackageAction::Install,
            (PackageTarget::Version(want), Some(have)) if *want == have => PackageAction::Nothing,
            (PackageTarget::Version(_), Some(have)) => PackageAction::Change { from: have },
        };
        Ok(action)
    }

    fn wanted_version(&self) -> Option<&str> {
        match &self.package.desired_state {
            PackageTarget::Version(v) => Some(v),
            _ => None,
        }
    }
}

impl Resource for PackageResource {
    fn id(&self) -> String {
        self.package.name.clone()
    }

    fn description(&self) -> String {
        format!("Ensure package {} is {}", self.package.name, self.package.desired_state)
    }

    fn resource_type(&self) -> &'static str {
        "package"
    }

    fn noop(&self) -> bool {
        self.package.noop
    }

    fn current_state(&self) -> Result<ResourceState> {
        Ok(match self.backend.installed_version(&self.package.name)? {
            Some(version) => ResourceState::Version(version),
            None => ResourceState::Absent,
        })
    }

    fn desired_state(&self) -> ResourceState {
        match &self.package.desired_state {
            PackageTarget::Present => ResourceState::Present { details: None },
            PackageTarget::Absent => ResourceState::Absent,
            PackageTarget::Version(v) => ResourceState::Version(v.clone()),
        }
    }

    fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
        let action = self.action()?;
        let name = &self.package.name;

        let plan = match &action {
            PackageAction::Nothing => return Ok(ApplyResult::NoChange),
            PackageAction::Install => format!("install {name}"),
            PackageAction::Change { from } => {
                format!("change {name} from {from} to {}", self.package.desired_state)
            }
            PackageAction::Remove => format!("remove {name}"),
        };

        if let Some(reason) = ctx.skip_reason() {
            return Ok(ApplyResult::Skipped {
                reason: format!("{reason}: would {plan}"),
            });
        }

        match action {
            PackageAction::Nothing => Ok(ApplyResult::NoChange),
            PackageAction::Install => {
                self.backend.install(name, self.wanted_version())?;
                Ok(ApplyResult::Created)
            }
            PackageAction::Change { .. } => {
                self.backend.install(name, self.wanted_version())?;
                Ok(ApplyResult::Modified)
            }
            PackageAction::Remove => {
                self.backend.remove(name)?;
                Ok(ApplyResult::Removed)
            }
        }
    }
}
