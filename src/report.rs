//! Per-resource report printed by `plan` and `apply`

use colored::Colorize;
use serde::Serialize;
use std::collections::HashMap;

use crate::model::FileKind;
use crate::planner::Plan;
use crate::resource::ApplyResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Package,
    File,
}

/// One line of the report
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceReport {
    pub kind: Kind,
    pub name: String,
    pub desired_state: String,
    pub noop: bool,
    /// "planned" until apply ran, then the apply outcome
    pub applied_or_planned: String,
}

/// Report every planned resource as "planned"
pub fn from_plan(plan: &Plan) -> Vec<ResourceReport> {
    let package = ResourceReport {
        kind: Kind::Package,
        name: plan.package.name.clone(),
        desired_state: plan.package.desired_state.to_string(),
        noop: plan.package.noop,
        applied_or_planned: "planned".to_string(),
    };

    std::iter::once(package)
        .chain(plan.files().map(|f| ResourceReport {
            kind: Kind::File,
            name: f.title.clone(),
            desired_state: match (f.kind, f.desired_state) {
                (FileKind::Directory, crate::model::Presence::Present) => "directory".to_string(),
                (_, presence) => presence.to_string(),
            },
            noop: f.noop,
            applied_or_planned: "planned".to_string(),
        }))
        .collect()
}

/// Replace "planned" with the outcome of each resource that was applied
pub fn with_outcomes(
    mut reports: Vec<ResourceReport>,
    outcomes: &HashMap<String, ApplyResult>,
) -> Vec<ResourceReport> {
    for report in &mut reports {
        if let Some(result) = outcomes.get(&report.name) {
            report.applied_or_planned = result.to_string();
        }
    }
    reports
}

pub fn to_json(reports: &[ResourceReport]) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(reports)?)
}

/// Print reports as an aligned table
pub fn print_table(reports: &[ResourceReport]) {
    let name_width = reports.iter().map(|r| r.name.len()).max().unwrap_or(4).max(4);
    let state_width = reports
        .iter()
        .map(|r| r.desired_state.len())
        .max()
        .unwrap_or(5)
        .max(5);

    println!(
        "  {:<8} {:<name_width$} {:<state_width$} {:<5} {}",
        "KIND".dimmed(),
        "NAME".dimmed(),
        "STATE".dimmed(),
        "NOOP".dimmed(),
        "RESULT".dimmed(),
    );
    for r in reports {
        let kind = match r.kind {
            Kind::Package => "package",
            Kind::File => "file",
        };
        let state = match r.desired_state.as_str() {
            "absent" => r.desired_state.red(),
            _ => r.desired_state.green(),
        };
        let outcome = if r.applied_or_planned.starts_with("failed") {
            r.applied_or_planned.red()
        } else if r.applied_or_planned.starts_with("skipped") {
            r.applied_or_planned.yellow()
        } else {
            r.applied_or_planned.normal()
        };
        println!(
            "  {:<8} {:<name_width$} {:<state_width$} {:<5} {}",
            kind,
            r.name.bold(),
            state,
            r.noop,
            outcome
        );
    }
}
