//! Recipes: ordered resource declarations, one concern each.
//!
//! A recipe reads the attribute tree (and may derive values into it), then
//! declares resources on the engine. Recipes compose through
//! `RecipeContext::include_recipe`, which compiles each recipe at most once
//! per run.

pub mod config;
pub mod default;
pub mod install;
pub mod java;
pub mod services;
pub mod user;

use tracing::info;

use crate::convergence::Engine;
use crate::data::attributes::AttributeTree;
use crate::data::settings::normalize_recipe;
use crate::error::ConvergeError;
use crate::infrastructure::NodeSearch;
use crate::resources::Resource;
use crate::resources::file::Metadata;
use crate::types::resource::{Action, ResourceId, Timing};

pub type RecipeFn = fn(&mut RecipeContext<'_>) -> Result<(), ConvergeError>;

/// Every recipe name this crate knows.
pub const RECIPES: &[&str] = &[
    "hbase::default",
    "hbase::java",
    "hbase::user",
    "hbase::limits",
    "hbase::install",
    "hbase::config",
    "hbase::master",
    "hbase::regionserver",
    "hbase::backup_master",
    "hbase::thrift",
    "hbase::rest",
];

/// Resolve a recipe name. A bare cookbook name means its default recipe.
pub fn lookup(name: &str) -> Option<RecipeFn> {
    let f: RecipeFn = match canonical(name).as_str() {
        "hbase::default" => default::default,
        "hbase::java" => java::java,
        "hbase::user" => user::user,
        "hbase::limits" => user::limits,
        "hbase::install" => install::install,
        "hbase::config" => config::config,
        "hbase::master" => services::master,
        "hbase::regionserver" => services::regionserver,
        "hbase::backup_master" => services::backup_master,
        "hbase::thrift" => services::thrift,
        "hbase::rest" => services::rest,
        _ => return None,
    };
    Some(f)
}

fn canonical(name: &str) -> String {
    let name = normalize_recipe(name);
    if name.contains("::") {
        name
    } else {
        format!("{}::default", name)
    }
}

/// State shared by the recipes of one run.
pub struct RecipeContext<'a> {
    pub attrs: &'a mut AttributeTree,
    pub engine: &'a mut Engine,
    pub search: &'a dyn NodeSearch,
    /// Scope for peer discovery.
    pub environment: String,
    /// Services this run converges; config changes notify their restart.
    pub restart_targets: Vec<String>,
    included: Vec<String>,
}

impl<'a> RecipeContext<'a> {
    pub fn new(
        attrs: &'a mut AttributeTree,
        engine: &'a mut Engine,
        search: &'a dyn NodeSearch,
        environment: &str,
    ) -> Self {
        RecipeContext {
            attrs,
            engine,
            search,
            environment: environment.to_string(),
            restart_targets: Vec::new(),
            included: Vec::new(),
        }
    }

    /// Compile `name` unless it already ran. Returns whether it ran now.
    pub fn include_recipe(&mut self, name: &str) -> Result<bool, ConvergeError> {
        let name = canonical(name);
        if self.included.contains(&name) {
            return Ok(false);
        }
        let recipe = lookup(&name).ok_or_else(|| ConvergeError::UnknownRecipe(name.clone()))?;
        info!(recipe = %name, "including recipe");
        self.included.push(name);
        recipe(self)?;
        Ok(true)
    }

    /// Recipes compiled so far, in inclusion order.
    pub fn included(&self) -> &[String] {
        &self.included
    }

    pub fn declare(&mut self, resource: Resource) -> Result<ResourceId, ConvergeError> {
        self.engine.declare(resource)
    }

    /// Declare unless the identity already exists (shared directories).
    pub fn declare_once(&mut self, resource: Resource) -> Result<Option<ResourceId>, ConvergeError> {
        if self.engine.contains(&resource.id()) {
            return Ok(None);
        }
        self.engine.declare(resource).map(Some)
    }

    /// Owner, group and mode for files owned by the service account.
    pub fn owned(&self, mode: u32) -> Metadata {
        Metadata::new(
            &self.attrs.str(&["hbase", "user"]),
            &self.attrs.str(&["hbase", "group"]),
            mode,
        )
    }

    /// Add a delayed restart of every restart target to `resource`.
    pub fn with_restarts(&self, resource: Resource) -> Resource {
        self.restart_targets.iter().fold(resource, |r, svc| {
            r.notifies(Action::Restart, ResourceId::service(svc), Timing::Delayed)
        })
    }
}

/// Compile a run list. Every name is resolved first, so a typo fails before
/// anything is declared.
pub fn compile_run_list(ctx: &mut RecipeContext<'_>, run_list: &[String]) -> Result<(), ConvergeError> {
    for name in run_list {
        if lookup(name).is_none() {
            return Err(ConvergeError::UnknownRecipe(canonical(name)));
        }
    }
    for name in run_list {
        ctx.include_recipe(name)?;
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::compile;
    use super::*;
    use crate::infrastructure::mock::MockSearch;
    use serde_json::json;

    #[test]
    fn lookup_accepts_run_list_spellings() {
        assert!(lookup("hbase").is_some());
        assert!(lookup("recipe[hbase::thrift]").is_some());
        assert!(lookup("hbase::zookeeper").is_none());
        for name in RECIPES {
            assert!(lookup(name).is_some(), "{}", name);
        }
    }

    #[test]
    fn unknown_recipe_fails_before_declaring() {
        let err = compile(json!({}), &MockSearch::default(), &["hbase::java", "hbase::zookeper"])
            .err()
            .unwrap();
        assert_eq!(err.to_string(), "unknown recipe 'hbase::zookeper'");
    }

    #[test]
    fn include_is_idempotent() {
        let (_, engine) = compile(
            json!({}),
            &MockSearch::default(),
            &["hbase::user", "hbase::limits", "hbase::user"],
        )
        .unwrap();
        // group, user, limits template
        assert_eq!(engine.len(), 3);
    }

    #[test]
    fn restart_targets_become_delayed_notifications() {
        let mut attrs = AttributeTree::new();
        let mut engine = Engine::new();
        let search = MockSearch::default();
        let mut ctx = RecipeContext::new(&mut attrs, &mut engine, &search, "_default");
        ctx.restart_targets = vec!["master".into(), "thrift".into()];
        let r = ctx.with_restarts(Resource::new("x", crate::resources::ExecuteSpec::new("true")));
        assert_eq!(r.notifications.len(), 2);
        assert!(r.notifications.iter().all(|n| n.timing == Timing::Delayed));
        assert!(ctx.included().is_empty());
    }
}
