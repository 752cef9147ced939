//! `shorewall render` - print the configuration file content

use anyhow::{Context as _, Result, bail};
use std::fs;

use super::Session;
use crate::Context;
use crate::cli::ParamArgs;
use crate::model::{ContentSource, Presence};
use crate::source::SourceResolver;

pub fn run(ctx: &Context, args: ParamArgs) -> Result<()> {
    let session = Session::load(ctx, &args)?;
    let plan = session.plan()?;
    let conf = &plan.conf_file;

    if conf.desired_state == Presence::Absent {
        bail!("Nothing to render: {} is planned absent", conf.path);
    }

    let content = match (&conf.content, &conf.content_source) {
        (Some(content), _) => content.clone(),
        (None, ContentSource::RemoteSource(uri)) => {
            let path = SourceResolver::new(session.config.module_path()).resolve(uri)?;
            fs::read_to_string(&path)
                .with_context(|| format!("Could not read source {}", path.display()))?
        }
        (None, other) => bail!("No content planned for {} ({other:?})", conf.path),
    };

    print!("{content}");
    Ok(())
}
