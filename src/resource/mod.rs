//! Apply-side resources
//!
//! Each planned descriptor becomes a `declarative::Resource` that can read
//! the host's current state and converge it. Package managers and source
//! files are reached through narrow collaborators so the resources can be
//! exercised against fakes and temporary directories.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::rc::Rc;

pub use declarative::{ApplyContext, ApplyResult, ExecutionPlan, Resource, ResourceState};

use crate::paths;
use crate::planner::Plan;
use crate::source::SourceResolver;

pub mod file;
pub mod package;

pub use file::FileResource;
pub use package::{Apt, Dnf, PackageBackend, PackageResource};

/// Package manager used on the managed host
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Apt,
    Dnf,
}

impl Provider {
    pub fn backend(self) -> Rc<dyn PackageBackend> {
        match self {
            Provider::Apt => Rc::new(Apt),
            Provider::Dnf => Rc::new(Dnf),
        }
    }
}

/// Turn a plan into resources, package first so its files land afterwards
///
/// On removal the order flips: files go first, then the package. A
/// mirrored directory never touches the other managed files inside it.
pub fn build_execution_plan(
    plan: &Plan,
    backend: Rc<dyn PackageBackend>,
    resolver: &SourceResolver,
) -> ExecutionPlan {
    let package: Box<dyn Resource> =
        Box::new(PackageResource::new(plan.package.clone(), backend));
    let managed: BTreeSet<PathBuf> = plan.files().map(|f| paths::expand(&f.path)).collect();
    let files: Vec<Box<dyn Resource>> = plan
        .files()
        .map(|f| {
            let mut keep = managed.clone();
            keep.remove(&paths::expand(&f.path));
            Box::new(FileResource::new(f.clone(), resolver.clone()).with_keep(keep))
                as Box<dyn Resource>
        })
        .collect();

    let mut execution = ExecutionPlan::new();
    if plan.package.desired_state == crate::model::PackageTarget::Absent {
        files.into_iter().for_each(|f| execution.add_resource(f));
        execution.add_resource(package);
    } else {
        execution.add_resource(package);
        files.into_iter().for_each(|f| execution.add_resource(f));
    }
    execution
}
