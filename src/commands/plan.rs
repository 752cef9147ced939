//! `shorewall plan` - show what would be managed

use anyhow::Result;
use serde::Serialize;

use super::Session;
use crate::Context;
use crate::cli::PlanArgs;
use crate::planner::Plan;
use crate::report::{self, ResourceReport};
use crate::ui;

#[derive(Serialize)]
struct PlanOutput<'a> {
    node: &'a str,
    plan: &'a Plan,
    report: Vec<ResourceReport>,
}

pub fn run(ctx: &Context, args: PlanArgs) -> Result<()> {
    let session = Session::load(ctx, &args.params)?;
    let plan = session.plan()?;

    if args.json {
        let output = PlanOutput {
            node: &session.node.fqdn,
            report: report::from_plan(&plan),
            plan: &plan,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    if !ctx.quiet {
        ui::header(&format!("Plan for {}", session.node.fqdn));
    }
    report::print_table(&report::from_plan(&plan));

    if !ctx.quiet && plan.conf_file.content.is_some() {
        println!();
        ui::dim("Run 'shorewall render' to see the configuration file");
    }
    Ok(())
}
