//! Execution engine - applies resources in plan order

use crate::context::{ApplyContext, ConfirmCallback, ProgressCallback};
use crate::diff::ResourceDiff;
use crate::planner::ExecutionPlan;
use crate::resource::Resource;
use crate::types::{ApplyResult, ExecuteOptions, ExecuteSummary};
use anyhow::Result;

/// Execute a plan with the given options and callbacks
///
/// Resources are applied one at a time, in plan order. Resources already in
/// their desired state are counted as `no_change` and never applied.
/// Noop resources (or every resource when `opts.noop` is set) are still
/// handed to `apply` with a noop context so they can report what they would
/// do; they never count as a change.
///
/// Confirmation is only requested when at least one change would really be
/// applied.
pub fn execute<P, C>(
    plan: ExecutionPlan,
    opts: ExecuteOptions,
    progress: &mut P,
    confirm: &mut C,
) -> Result<ExecuteSummary>
where
    P: ProgressCallback,
    C: ConfirmCallback,
{
    let mut summary = ExecuteSummary::default();
    let mut pending: Vec<&dyn Resource> = Vec::new();

    for resource in &plan.resources {
        let needs_apply = match ResourceDiff::from_resource(resource.as_ref()) {
            Ok(diff) => diff.is_some(),
            Err(e) => {
                // Let apply surface the real failure
                log::debug!("State check failed for {}: {e:#}", resource.id());
                true
            }
        };
        if needs_apply {
            pending.push(resource.as_ref());
        } else {
            log::debug!("{} already converged", resource.id());
            progress.on_resource_complete(&resource.id(), &ApplyResult::NoChange);
            summary.add_result(&ApplyResult::NoChange);
        }
    }

    if pending.is_empty() {
        return Ok(summary);
    }

    let real_changes = pending
        .iter()
        .filter(|r| !(opts.noop || r.noop()))
        .count();

    if real_changes > 0 && !opts.dry_run && !confirm.confirm("Apply changes?")? {
        summary.skipped += pending.len();
        return Ok(summary);
    }

    progress.on_batch_start(pending.len());
    for resource in pending {
        progress.on_resource_start(&resource.id(), &resource.description());
        let result = apply_resource(resource, &opts);
        log::info!("{} {}: {}", resource.resource_type(), resource.id(), result);
        progress.on_resource_complete(&resource.id(), &result);
        summary.add_result(&result);
    }
    progress.on_batch_complete();

    Ok(summary)
}

/// Apply a single resource
fn apply_resource(resource: &dyn Resource, opts: &ExecuteOptions) -> ApplyResult {
    let ctx = ApplyContext::new(opts.dry_run, opts.verbose).with_noop(opts.noop || resource.noop());

    match resource.apply(&ctx) {
        Ok(result) => result,
        Err(e) => ApplyResult::Failed {
            error: format!("{e:#}"),
        },
    }
}

/// Simple execution without callbacks
///
/// For basic use cases where you don't need progress or confirmation.
pub fn execute_simple(plan: ExecutionPlan, opts: ExecuteOptions) -> Result<ExecuteSummary> {
    use crate::context::{AutoConfirm, NoProgress};

    execute(plan, opts, &mut NoProgress, &mut AutoConfirm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{AutoConfirm, AutoDecline, NoProgress};
    use crate::types::ResourceState;
    use std::cell::Cell;

    #[derive(Debug)]
    struct TestResource {
        id: String,
        should_change: bool,
        noop: bool,
        applied: Cell<bool>,
    }

    impl TestResource {
        fn new(id: &str, should_change: bool, noop: bool) -> Self {
            Self {
                id: id.into(),
                should_change,
                noop,
                applied: Cell::new(false),
            }
        }
    }

    impl Resource for TestResource {
        fn id(&self) -> String {
            self.id.clone()
        }

        fn description(&self) -> String {
            format!("Test resource {}", self.id)
        }

        fn resource_type(&self) -> &'static str {
            "test"
        }

        fn noop(&self) -> bool {
            self.noop
        }

        fn current_state(&self) -> Result<ResourceState> {
            if self.should_change {
                Ok(ResourceState::Absent)
            } else {
                Ok(ResourceState::Present { details: None })
            }
        }

        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }

        fn apply(&self, ctx: &ApplyContext) -> Result<ApplyResult> {
            if let Some(reason) = ctx.skip_reason() {
                return Ok(ApplyResult::Skipped {
                    reason: reason.into(),
                });
            }
            self.applied.set(true);
            if self.should_change {
                Ok(ApplyResult::Created)
            } else {
                Ok(ApplyResult::NoChange)
            }
        }
    }

    #[derive(Debug)]
    struct Failing;

    impl Resource for Failing {
        fn id(&self) -> String {
            "broken".into()
        }
        fn description(&self) -> String {
            "Always fails".into()
        }
        fn resource_type(&self) -> &'static str {
            "test"
        }
        fn current_state(&self) -> Result<ResourceState> {
            Ok(ResourceState::Absent)
        }
        fn desired_state(&self) -> ResourceState {
            ResourceState::Present { details: None }
        }
        fn apply(&self, _ctx: &ApplyContext) -> Result<ApplyResult> {
            anyhow::bail!("package manager exploded")
        }
    }

    /// Confirm callback that panics if asked
    struct NeverAsk;

    impl ConfirmCallback for NeverAsk {
        fn confirm(&mut self, prompt: &str) -> Result<bool> {
            panic!("unexpected confirmation: {prompt}")
        }
    }

    #[test]
    fn test_execute_empty_plan() {
        let plan = ExecutionPlan::new();
        let result = execute_simple(plan, ExecuteOptions::default()).unwrap();
        assert_eq!(result.total(), 0);
    }

    #[test]
    fn test_execute_no_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", false, false)));

        let result = execute_simple(plan, ExecuteOptions::default()).unwrap();
        assert_eq!(result.no_change, 1);
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn test_execute_with_changes() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", true, false)));

        let result = execute_simple(plan, ExecuteOptions::default()).unwrap();
        assert_eq!(result.created, 1);
    }

    #[test]
    fn test_noop_resource_is_skipped_without_confirmation() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", true, true)));

        let result = execute(plan, ExecuteOptions::default(), &mut NoProgress, &mut NeverAsk)
            .unwrap();
        assert_eq!(result.skipped, 1);
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn test_global_noop_overrides_resources() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("test1", true, false)));

        let opts = ExecuteOptions {
            noop: true,
            ..Default::default()
        };
        let result = execute(plan, opts, &mut NoProgress, &mut NeverAsk).unwrap();
        assert_eq!(result.skipped, 1);
    }

    #[test]
    fn test_declined_confirmation_skips_everything() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(TestResource::new("a", true, false)));
        plan.add_resource(Box::new(TestResource::new("b", true, false)));

        let result = execute(
            plan,
            ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoDecline,
        )
        .unwrap();
        assert_eq!(result.skipped, 2);
        assert_eq!(result.total_changes(), 0);
    }

    #[test]
    fn test_failure_is_counted_not_propagated() {
        let mut plan = ExecutionPlan::new();
        plan.add_resource(Box::new(Failing));
        plan.add_resource(Box::new(TestResource::new("after", true, false)));

        let result = execute(
            plan,
            ExecuteOptions::default(),
            &mut NoProgress,
            &mut AutoConfirm,
        )
        .unwrap();
        assert_eq!(result.failed, 1);
        assert_eq!(result.created, 1);
        assert!(!result.is_success());
    }
}
