//! Execution engine - shorewall executor with UI integration

use anyhow::Result;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;

use declarative::{
    ApplyResult, ConfirmCallback, ExecuteOptions as EngineOptions, ExecuteSummary,
    ExecutionPlan, ProgressCallback, compute_diffs,
};

use super::differ::display_diff;

/// Options for execution, adds `yes` for confirmation skip
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    /// Don't make changes, just show what would happen
    pub dry_run: bool,
    /// Skip confirmation prompts
    pub yes: bool,
    /// Verbose output
    pub verbose: bool,
    /// Hide the diff and progress output
    pub quiet: bool,
}

/// Progress bar that also remembers each resource outcome
struct UiProgress {
    bar: Option<ProgressBar>,
    quiet: bool,
    outcomes: HashMap<String, ApplyResult>,
}

impl ProgressCallback for UiProgress {
    fn on_batch_start(&mut self, count: usize) {
        if self.quiet {
            return;
        }
        let bar = ProgressBar::new(count as u64);
        if let Ok(style) = ProgressStyle::with_template("  {spinner} [{pos}/{len}] {msg}") {
            bar.set_style(style);
        }
        self.bar = Some(bar);
    }

    fn on_resource_start(&mut self, id: &str, description: &str) {
        if let Some(bar) = &self.bar {
            bar.set_message(format!("{id}: {description}"));
        }
    }

    fn on_resource_complete(&mut self, id: &str, result: &ApplyResult) {
        if let Some(bar) = &self.bar {
            let symbol = match result {
                ApplyResult::NoChange => "○",
                ApplyResult::Created | ApplyResult::Modified | ApplyResult::Removed => "✓",
                ApplyResult::Failed { .. } => "✗",
                ApplyResult::Skipped { .. } => "⊘",
            };
            bar.println(format!("    {symbol} {id}: {result}"));
            bar.inc(1);
        }
        self.outcomes.insert(id.to_string(), result.clone());
    }

    fn on_batch_complete(&mut self) {
        if let Some(bar) = self.bar.take() {
            bar.finish_and_clear();
        }
    }
}

/// Interactive confirmation unless `--yes`
struct PromptConfirm {
    yes: bool,
}

impl ConfirmCallback for PromptConfirm {
    fn confirm(&mut self, prompt: &str) -> Result<bool> {
        if self.yes {
            return Ok(true);
        }
        let confirmed = dialoguer::Confirm::new()
            .with_prompt(prompt)
            .default(true)
            .interact()?;
        Ok(confirmed)
    }
}

/// Execute the plan with diff display, confirmation and progress
///
/// Returns the summary and the outcome of every resource, keyed by id.
pub fn execute(
    plan: ExecutionPlan,
    opts: &ExecuteOptions,
) -> Result<(ExecuteSummary, HashMap<String, ApplyResult>)> {
    if !opts.quiet {
        display_diff(&compute_diffs(&plan.resources));
    }

    let mut progress = UiProgress {
        bar: None,
        quiet: opts.quiet,
        outcomes: HashMap::new(),
    };
    let mut confirm = PromptConfirm { yes: opts.yes };

    let summary = declarative::execute(
        plan,
        EngineOptions {
            dry_run: opts.dry_run,
            noop: false,
            verbose: opts.verbose,
        },
        &mut progress,
        &mut confirm,
    )?;

    if !opts.quiet {
        if opts.dry_run {
            println!();
            println!("  {} Dry run - no changes made", "ℹ".blue());
        }
        print_summary(&summary);
    }

    Ok((summary, progress.outcomes))
}

/// Print final summary
fn print_summary(summary: &ExecuteSummary) {
    println!();
    if summary.is_success() && summary.total_changes() == 0 && summary.skipped == 0 {
        println!("  {} Already converged", "✓".green().bold());
    } else if summary.is_success() {
        println!("  {} Converged", "✓".green().bold());
    } else {
        println!("  {} Converged with errors", "⚠".yellow().bold());
    }

    if summary.created > 0 {
        println!("    • {} resources created", summary.created);
    }
    if summary.modified > 0 {
        println!("    • {} resources modified", summary.modified);
    }
    if summary.removed > 0 {
        println!("    • {} resources removed", summary.removed);
    }
    if summary.skipped > 0 {
        println!("    • {} resources skipped", summary.skipped);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
