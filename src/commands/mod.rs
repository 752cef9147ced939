//! Command implementations
//!
//! Every command starts the same way: load the config file, layer the
//! command-line parameters over it and plan.

pub mod apply;
pub mod plan;
pub mod render;

use anyhow::{Context as _, Result};

use crate::Context;
use crate::cli::ParamArgs;
use crate::config::{self, Config, Node, Parameters};
use crate::planner::{Plan, Planner};

/// Loaded config plus the effective parameters and node
pub struct Session {
    pub config: Config,
    pub params: Parameters,
    pub node: Node,
}

impl Session {
    pub fn load(ctx: &Context, args: &ParamArgs) -> Result<Self> {
        let config = Config::load(ctx.config.as_deref())?;
        let params = merge_params(config.params.clone(), args)?;
        let mut node = config.node(args.node.as_deref());
        node.facts
            .extend(config::parse_pairs(&args.facts).context("Invalid --fact")?);

        log::info!("Planning for node {}", node.fqdn);
        Ok(Self {
            config,
            params,
            node,
        })
    }

    pub fn plan(&self) -> Result<Plan> {
        let templates = self.config.templates();
        let providers = self.config.providers();
        let plan = Planner::new(&self.config.module, &templates, &providers)
            .plan(&self.params, &self.node)?;
        Ok(plan)
    }
}

/// Layer command-line parameters over the ones from the config file
///
/// Values given on the command line win; switches can only turn a
/// setting on, and options are merged key by key.
fn merge_params(mut params: Parameters, args: &ParamArgs) -> Result<Parameters> {
    if let Some(version) = &args.pkg_version {
        params.version = Some(version.clone());
    }
    params.absent |= args.absent;
    params.noop |= args.noop;
    if let Some(template) = &args.template {
        params.template = Some(template.clone());
    }
    params
        .options
        .extend(config::parse_pairs(&args.options).context("Invalid --option")?);
    if let Some(source) = &args.source {
        params.source = Some(source.clone());
    }
    if let Some(source_dir) = &args.source_dir {
        params.source_dir = Some(source_dir.clone());
    }
    params.source_dir_purge |= args.source_dir_purge;
    if let Some(class) = &args.my_class {
        params.my_class = Some(class.clone());
    }
    Ok(params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_cli_wins_over_config() {
        let from_config = Parameters {
            version: Some("1.0.0".into()),
            template: Some("shorewall/spec.erb".into()),
            options: BTreeMap::from([
                ("opt_a".to_string(), "config".to_string()),
                ("opt_b".to_string(), "kept".to_string()),
            ]),
            ..Default::default()
        };
        let args = ParamArgs {
            pkg_version: Some("1.0.42".into()),
            noop: true,
            options: vec!["opt_a=cli".into()],
            ..Default::default()
        };

        let params = merge_params(from_config, &args).unwrap();
        assert_eq!(params.version.as_deref(), Some("1.0.42"));
        assert_eq!(params.template.as_deref(), Some("shorewall/spec.erb"));
        assert!(params.noop);
        assert!(!params.absent);
        assert_eq!(params.options["opt_a"], "cli");
        assert_eq!(params.options["opt_b"], "kept");
    }

    #[test]
    fn test_switches_do_not_clear_config() {
        let from_config = Parameters {
            absent: true,
            source_dir_purge: true,
            ..Default::default()
        };
        let params = merge_params(from_config, &ParamArgs::default()).unwrap();
        assert!(params.absent);
        assert!(params.source_dir_purge);
    }

    #[test]
    fn test_bad_option_pair() {
        let args = ParamArgs {
            options: vec!["no-equals-sign".into()],
            ..Default::default()
        };
        assert!(merge_params(Parameters::default(), &args).is_err());
    }
}
