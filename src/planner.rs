//! Convergence planner
//!
//! Turns module parameters into resource descriptors. Planning is pure:
//! it reads templates but never touches the package manager or the managed
//! files, and the same inputs always give the same plan.

use serde::Serialize;

use crate::config::{ModuleSettings, Node, Parameters};
use crate::error::{PlanWarning, Result};
use crate::model::{
    ContentSource, FileKind, ManagedFile, ManagedPackage, PackageTarget, Presence,
    describe_file, describe_package,
};
use crate::template::{ProviderRegistry, RenderContext, TemplateRegistry, render_template};

/// Catalog name of the main configuration file
pub const CONF_FILE_TITLE: &str = "shorewall.conf";

/// Catalog name of the mirrored configuration directory
pub const DIR_FILE_TITLE: &str = "shorewall.dir";

/// Resource descriptors for one convergence run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub package: ManagedPackage,
    pub conf_file: ManagedFile,
    pub dir_file: Option<ManagedFile>,
    pub warnings: Vec<PlanWarning>,
}

impl Plan {
    /// All file descriptors, configuration file first
    pub fn files(&self) -> impl Iterator<Item = &ManagedFile> {
        std::iter::once(&self.conf_file).chain(self.dir_file.as_ref())
    }
}

/// Builds plans against a fixed set of module settings and collaborators
pub struct Planner<'a> {
    settings: &'a ModuleSettings,
    templates: &'a TemplateRegistry,
    providers: &'a ProviderRegistry,
}

impl<'a> Planner<'a> {
    pub fn new(
        settings: &'a ModuleSettings,
        templates: &'a TemplateRegistry,
        providers: &'a ProviderRegistry,
    ) -> Self {
        Self {
            settings,
            templates,
            providers,
        }
    }

    /// Compute the plan for a node
    ///
    /// `absent` wins over `version`. Content comes from the first of
    /// `source`, `my_class`, `template` that is set, else the module
    /// default. `noop` is copied onto every descriptor.
    pub fn plan(&self, params: &Parameters, node: &Node) -> Result<Plan> {
        let mut warnings = Vec::new();

        let package = describe_package(
            &self.settings.package,
            package_target(params),
            params.noop,
        )?;

        let presence = if params.absent {
            Presence::Absent
        } else {
            Presence::Present
        };

        let source = select_content(params, &mut warnings);
        let mut conf_file = describe_file(
            &self.settings.config_file,
            presence,
            FileKind::File,
            Some(source),
            false,
            false,
        )?
        .titled(CONF_FILE_TITLE)
        .with_attributes(self.settings.attributes.clone())
        .with_noop(params.noop);

        if presence == Presence::Present {
            let ctx = RenderContext::new(&node.fqdn)
                .with_options(params.options.clone())?
                .with_facts(node.facts.clone())?
                .with_custom_class(non_empty(&params.my_class));
            if let Some(content) = self.render_content(&conf_file.content_source, &ctx)? {
                conf_file = conf_file.with_content(content);
            }
        }

        let source_dir = non_empty(&params.source_dir);
        if source_dir.is_none() && params.source_dir_purge {
            log::warn!("{}", PlanWarning::PurgeWithoutSourceDir);
            warnings.push(PlanWarning::PurgeWithoutSourceDir);
        }

        let dir_file = match source_dir {
            Some(uri) if !params.absent => Some(
                describe_file(
                    &self.settings.config_dir,
                    Presence::Present,
                    FileKind::Directory,
                    Some(ContentSource::RemoteSource(uri)),
                    params.source_dir_purge,
                    true,
                )?
                .titled(DIR_FILE_TITLE)
                .with_attributes(self.settings.attributes.clone())
                .with_noop(params.noop),
            ),
            _ => None,
        };

        log::debug!(
            "Planned {} {}, {} {}",
            package.name,
            package.desired_state,
            conf_file.title,
            conf_file.desired_state
        );

        Ok(Plan {
            package,
            conf_file,
            dir_file,
            warnings,
        })
    }

    /// Render file content for sources that produce text
    fn render_content(&self, source: &ContentSource, ctx: &RenderContext) -> Result<Option<String>> {
        let content = match source {
            ContentSource::RemoteSource(_) => return Ok(None),
            ContentSource::CustomProvider(class) => {
                self.providers.get(class)?.render(ctx, self.templates)?
            }
            ContentSource::InlineTemplate { template, .. } => {
                render_template(self.templates, template, ctx)?
            }
            ContentSource::Default => {
                render_template(self.templates, &self.settings.default_template, ctx)?
            }
        };
        Ok(Some(content))
    }
}

fn package_target(params: &Parameters) -> PackageTarget {
    if params.absent {
        PackageTarget::Absent
    } else if let Some(version) = &params.version {
        PackageTarget::Version(version.clone())
    } else {
        PackageTarget::Present
    }
}

/// Pick the configuration file content source, first match wins
fn select_content(params: &Parameters, warnings: &mut Vec<PlanWarning>) -> ContentSource {
    let candidates = [
        ("source", non_empty(&params.source).map(ContentSource::RemoteSource)),
        (
            "my_class",
            non_empty(&params.my_class).map(ContentSource::CustomProvider),
        ),
        (
            "template",
            non_empty(&params.template).map(|template| ContentSource::InlineTemplate {
                template,
                options: params.options.clone(),
            }),
        ),
    ];

    let mut set = candidates
        .into_iter()
        .filter_map(|(name, source)| source.map(|s| (name, s)));

    let Some((chosen, source)) = set.next() else {
        return ContentSource::Default;
    };

    let ignored: Vec<&'static str> = set.map(|(name, _)| name).collect();
    if !ignored.is_empty() {
        let warning = PlanWarning::AmbiguousContentSource { chosen, ignored };
        log::warn!("{warning}");
        warnings.push(warning);
    }

    source
}

/// Empty strings count as unset
fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_ref().filter(|v| !v.trim().is_empty()).cloned()
}
