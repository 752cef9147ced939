//! `shorewall apply` - converge the host to the plan

use anyhow::{Result, bail};

use super::Session;
use crate::Context;
use crate::cli::ApplyArgs;
use crate::engine::{self, ExecuteOptions};
use crate::model::Presence;
use crate::report;
use crate::resource;
use crate::source::SourceResolver;
use crate::ui;

pub fn run(ctx: &Context, args: ApplyArgs) -> Result<()> {
    let session = Session::load(ctx, &args.params)?;
    let plan = session.plan()?;

    let resolver = SourceResolver::new(session.config.module_path());
    let backend = session.config.provider.backend();
    let execution = resource::build_execution_plan(&plan, backend, &resolver)
        .filter_by_target(args.target.as_deref());

    if execution.is_empty() {
        ui::warn("No resources match the target");
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Converging {}", session.node.fqdn));
        if ctx.verbose > 0
            && plan.conf_file.desired_state == Presence::Present
            && let Some(content) = &plan.conf_file.content
        {
            ui::section(&plan.conf_file.path);
            engine::differ::display_content_diff(
                std::path::Path::new(&plan.conf_file.path),
                content,
            );
        }
    }

    let opts = ExecuteOptions {
        dry_run: args.dry_run,
        yes: args.yes,
        verbose: ctx.verbose > 0,
        quiet: ctx.quiet || args.json,
    };
    let (summary, outcomes) = engine::execute(execution, &opts)?;

    let reports = report::with_outcomes(report::from_plan(&plan), &outcomes);
    if args.json {
        println!("{}", report::to_json(&reports)?);
    } else if !ctx.quiet {
        println!();
        report::print_table(&reports);
    }

    if summary.failed > 0 {
        bail!("{} of {} resources failed", summary.failed, summary.total());
    }
    Ok(())
}
