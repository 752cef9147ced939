//! Template resolution and rendering
//!
//! Templates use `{{ name }}` placeholders. A name is looked up as:
//! - `fqdn`: the managed node
//! - `options.<key>` / `facts.<key>`: explicit namespace
//! - `<key>`: options first, then facts
//! - `options`: every option as a `key: value` line, sorted by key
//!
//! Content providers sit on top of templates: the default provider renders
//! the module template, custom providers are looked up by class name.

use regex::{Captures, Regex};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::error::{PlanError, Result};
use crate::source::is_plain_relative;

/// Reference of the template used when nothing else is configured
pub const DEFAULT_TEMPLATE: &str = "shorewall/shorewall.conf.erb";

/// Class name of the built-in test content provider
pub const SPEC_CLASS: &str = "shorewall::spec";

const DEFAULT_TEMPLATE_BODY: &str = "\
# This file is managed by shorewall. Local changes will be overwritten.
# fqdn: {{ fqdn }}
STARTUP_ENABLED=Yes
VERBOSITY=1
LOGFILE=/var/log/messages
LOGFORMAT=\"Shorewall:%s:%s:\"
IP_FORWARDING=Keep
ADMINISABSENTMINDED=Yes
";

const SPEC_TEMPLATE_BODY: &str = "\
# Template used to check custom templates and options
fqdn: {{ fqdn }}
ipaddress: {{ facts.ipaddress }}

# Custom options
{{ options }}
";

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_.-]+)\s*\}\}").expect("placeholder regex is valid")
});

static OPTION_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("option key regex is valid"));

/// Everything a template or content provider can see
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    /// Name of the managed node
    pub fqdn: String,
    pub options: BTreeMap<String, String>,
    pub facts: BTreeMap<String, String>,
    /// Alternate content provider requested by the configuration
    pub custom_class_ref: Option<String>,
}

impl RenderContext {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            ..Default::default()
        }
    }

    /// Replace the options, rejecting keys placeholders cannot address
    pub fn with_options(mut self, options: BTreeMap<String, String>) -> Result<Self> {
        validate_keys(&options)?;
        if options.contains_key("fqdn") {
            log::debug!("Option 'fqdn' is shadowed by the node name");
        }
        self.options = options;
        Ok(self)
    }

    pub fn with_facts(mut self, facts: BTreeMap<String, String>) -> Result<Self> {
        validate_keys(&facts)?;
        self.facts = facts;
        Ok(self)
    }

    pub fn with_custom_class(mut self, class: Option<String>) -> Self {
        self.custom_class_ref = class;
        self
    }

    /// Resolve a placeholder name
    fn lookup(&self, name: &str) -> Option<String> {
        if name == "fqdn" {
            return Some(self.fqdn.clone());
        }
        if name == "options" {
            return Some(
                self.options
                    .iter()
                    .map(|(k, v)| format!("{k}: {v}"))
                    .collect::<Vec<_>>()
                    .join("\n"),
            );
        }
        if let Some(key) = name.strip_prefix("options.") {
            return self.options.get(key).cloned();
        }
        if let Some(key) = name.strip_prefix("facts.") {
            return self.facts.get(key).cloned();
        }
        self.options
            .get(name)
            .or_else(|| self.facts.get(name))
            .cloned()
    }
}

fn validate_keys(map: &BTreeMap<String, String>) -> Result<()> {
    for key in map.keys() {
        if !OPTION_KEY.is_match(key) {
            return Err(PlanError::InvalidOption {
                key: key.clone(),
                reason: "keys may only contain letters, digits, '_' and '-'".to_string(),
            });
        }
    }
    Ok(())
}

/// Substitute placeholders in a template body
///
/// Unknown placeholders render as an empty string.
pub fn render_str(body: &str, ctx: &RenderContext) -> String {
    PLACEHOLDER
        .replace_all(body, |caps: &Captures| {
            let name = &caps[1];
            ctx.lookup(name).unwrap_or_else(|| {
                log::warn!("Template variable '{name}' is not defined");
                String::new()
            })
        })
        .into_owned()
}

/// Resolves template references to template bodies
///
/// In-memory templates win over files. A reference `<module>/<file>` falls
/// back to `<module_path>/<module>/templates/<file>`.
#[derive(Debug, Clone, Default)]
pub struct TemplateRegistry {
    templates: HashMap<String, String>,
    module_path: Option<PathBuf>,
}

impl TemplateRegistry {
    /// Empty registry with no module path
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the module's own templates
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(DEFAULT_TEMPLATE, DEFAULT_TEMPLATE_BODY);
        registry.register("shorewall/spec.erb", SPEC_TEMPLATE_BODY);
        registry
    }

    pub fn with_module_path(mut self, path: Option<PathBuf>) -> Self {
        self.module_path = path;
        self
    }

    pub fn register(&mut self, name: impl Into<String>, body: impl Into<String>) {
        self.templates.insert(name.into(), body.into());
    }

    /// Look up a template body by reference
    pub fn resolve(&self, name: &str) -> Result<String> {
        if let Some(body) = self.templates.get(name) {
            return Ok(body.clone());
        }

        let Some(path) = self.template_path(name) else {
            return Err(PlanError::TemplateNotFound(name.to_string()));
        };
        if !path.is_file() {
            log::debug!("No template at {}", path.display());
            return Err(PlanError::TemplateNotFound(name.to_string()));
        }

        log::debug!("Loading template {name} from {}", path.display());
        fs::read_to_string(&path).map_err(|e| PlanError::TemplateUnreadable {
            name: name.to_string(),
            message: e.to_string(),
        })
    }

    fn template_path(&self, name: &str) -> Option<PathBuf> {
        let root = self.module_path.as_ref()?;
        let (module, file) = name.split_once('/')?;
        if !is_plain_relative(Path::new(module)) || !is_plain_relative(Path::new(file)) {
            return None;
        }
        Some(root.join(module).join("templates").join(file))
    }
}

/// Resolve and render a template
pub fn render_template(
    registry: &TemplateRegistry,
    template_ref: &str,
    ctx: &RenderContext,
) -> Result<String> {
    let body = registry.resolve(template_ref)?;
    Ok(render_str(&body, ctx))
}

/// Something that can produce the content of the configuration file
pub trait ContentProvider: std::fmt::Debug {
    fn render(&self, ctx: &RenderContext, templates: &TemplateRegistry) -> Result<String>;
}

/// Provider backed by a single template reference
#[derive(Debug, Clone)]
pub struct TemplateProvider {
    pub template: String,
}

impl TemplateProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

impl ContentProvider for TemplateProvider {
    fn render(&self, ctx: &RenderContext, templates: &TemplateRegistry) -> Result<String> {
        render_template(templates, &self.template, ctx)
    }
}

/// Content providers addressable by class name
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: HashMap<String, Box<dyn ContentProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the module's own classes
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(SPEC_CLASS, Box::new(TemplateProvider::new("shorewall/spec.erb")));
        registry
    }

    pub fn register(&mut self, class: impl Into<String>, provider: Box<dyn ContentProvider>) {
        self.providers.insert(class.into(), provider);
    }

    pub fn get(&self, class: &str) -> Result<&dyn ContentProvider> {
        self.providers
            .get(class)
            .map(|provider| &**provider)
            .ok_or_else(|| PlanError::ProviderNotFound(class.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn ctx() -> RenderContext {
        let options = BTreeMap::from([("opt_a".to_string(), "value_a".to_string())]);
        let facts = BTreeMap::from([("ipaddress".to_string(), "10.42.42.42".to_string())]);
        RenderContext::new("rspec.example42.com")
            .with_options(options)
            .unwrap()
            .with_facts(facts)
            .unwrap()
    }

    #[test]
    fn test_default_template_has_fqdn() {
        let out = render_template(&TemplateRegistry::with_builtins(), DEFAULT_TEMPLATE, &ctx())
            .unwrap();
        assert!(out.contains("fqdn: rspec.example42.com"));
    }

    #[test]
    fn test_spec_template_has_options_and_facts() {
        let out = render_template(&TemplateRegistry::with_builtins(), "shorewall/spec.erb", &ctx())
            .unwrap();
        assert!(out.contains("fqdn: rspec.example42.com"));
        assert!(out.contains("ipaddress: 10.42.42.42"));
        assert!(out.contains("opt_a: value_a"));
    }

    #[test]
    fn test_placeholder_lookup_order() {
        let out = render_str(
            "{{ opt_a }}|{{options.opt_a}}|{{ facts.ipaddress }}|{{ ipaddress }}|{{ missing }}",
            &ctx(),
        );
        assert_eq!(out, "value_a|value_a|10.42.42.42|10.42.42.42|");
    }

    #[test]
    fn test_fqdn_cannot_be_overridden_by_options() {
        let options = BTreeMap::from([("fqdn".to_string(), "evil.example.com".to_string())]);
        let ctx = RenderContext::new("rspec.example42.com")
            .with_options(options)
            .unwrap();
        assert_eq!(render_str("{{ fqdn }}", &ctx), "rspec.example42.com");
    }

    #[test]
    fn test_invalid_option_key() {
        let options = BTreeMap::from([("bad key".to_string(), "x".to_string())]);
        let err = RenderContext::new("node").with_options(options).unwrap_err();
        assert!(matches!(err, PlanError::InvalidOption { .. }));
    }

    #[test]
    fn test_template_not_found() {
        let err = render_template(&TemplateRegistry::with_builtins(), "shorewall/nope.erb", &ctx())
            .unwrap_err();
        assert_eq!(err, PlanError::TemplateNotFound("shorewall/nope.erb".into()));
    }

    #[test]
    fn test_template_from_module_path() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("site").join("templates");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("fw.erb"), "host={{ fqdn }} a={{ opt_a }}\n").unwrap();

        let registry =
            TemplateRegistry::with_builtins().with_module_path(Some(tmp.path().to_path_buf()));
        let out = render_template(&registry, "site/fw.erb", &ctx()).unwrap();
        assert_eq!(out, "host=rspec.example42.com a=value_a\n");

        let err = render_template(&registry, "site/../site/templates/fw.erb", &ctx()).unwrap_err();
        assert!(matches!(err, PlanError::TemplateNotFound(_)));
    }

    #[test]
    fn test_template_reference_stays_in_module_path() {
        let tmp = TempDir::new().unwrap();
        let outside = tmp.path().join("outside.erb");
        fs::write(&outside, "secret\n").unwrap();
        let modules = tmp.path().join("modules");
        fs::create_dir_all(modules.join("site").join("templates")).unwrap();

        let registry = TemplateRegistry::with_builtins().with_module_path(Some(modules));
        for reference in [
            format!("site/{}", outside.display()),
            "../outside.erb".to_string(),
            "./site/x.erb".to_string(),
        ] {
            let err = render_template(&registry, &reference, &ctx()).unwrap_err();
            assert!(
                matches!(err, PlanError::TemplateNotFound(_)),
                "{reference} resolved"
            );
        }
    }

    #[test]
    fn test_provider_registry() {
        let registry = ProviderRegistry::with_builtins();
        let out = registry
            .get(SPEC_CLASS)
            .unwrap()
            .render(&ctx(), &TemplateRegistry::with_builtins())
            .unwrap();
        assert!(out.contains("rspec.example42.com"));

        let err = registry.get("site::missing").unwrap_err();
        assert_eq!(err, PlanError::ProviderNotFound("site::missing".into()));
    }
}
