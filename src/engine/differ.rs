//! Diff display - terminal rendering of pending changes

use colored::Colorize;
use declarative::{DiffSummary, ResourceDiff, ResourceState, group_by_type};
use std::fs;
use std::path::Path;

/// Display a list of diffs in a user-friendly format
pub fn display_diff(diffs: &[ResourceDiff]) {
    let summary = DiffSummary::from_diffs(diffs);
    if !summary.has_changes() {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!(
        "┌─ {} ─────────────────────────────────────────┐",
        "Configuration Diff".bold()
    );
    println!("│");

    for (resource_type, type_diffs) in group_by_type(diffs) {
        let type_name = match resource_type.as_str() {
            "package" => "Packages",
            "file" => "Files",
            other => other,
        };
        println!("│ {}", type_name.bold());

        for diff in type_diffs {
            let symbol = if diff.is_addition() {
                "+".green()
            } else if diff.is_removal() {
                "-".red()
            } else {
                "~".yellow()
            };

            let noop_indicator = if diff.noop {
                " [noop]".yellow().to_string()
            } else {
                String::new()
            };

            let state_desc = match (&diff.current, &diff.desired) {
                (ResourceState::Absent, desired) => format!("(not present) → {desired}"),
                (_, ResourceState::Absent) => "(will remove)".to_string(),
                (ResourceState::Modified { from, to }, _) => format!("{from} → {to}"),
                (current, desired) => format!("{current} → {desired}"),
            };

            println!(
                "│   {} {:<30} {}{}",
                symbol,
                diff.resource_id,
                state_desc.dimmed(),
                noop_indicator
            );
        }
        println!("│");
    }

    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} add, {} remove, {} modify, {} noop)",
        summary.total().to_string().bold(),
        summary.additions.to_string().green(),
        summary.removals.to_string().red(),
        summary.modifications.to_string().yellow(),
        summary.noop.to_string().yellow()
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Show a line diff between a file on disk and the content planned for it
///
/// A missing file is treated as empty.
pub fn display_content_diff(path: &Path, planned: &str) {
    let current = fs::read_to_string(path).unwrap_or_default();
    let diff = similar::TextDiff::from_lines(current.as_str(), planned);
    let mut has_changes = false;

    for change in diff.iter_all_changes() {
        match change.tag() {
            similar::ChangeTag::Delete => {
                has_changes = true;
                print!("    {}", format!("- {change}").red());
            }
            similar::ChangeTag::Insert => {
                has_changes = true;
                print!("    {}", format!("+ {change}").green());
            }
            similar::ChangeTag::Equal => {}
        }
    }

    if !has_changes {
        println!("    {}", "(content is identical)".dimmed());
    }
}
