//! Manager-module configuration controller (`ceph_mgr_module_config`)
//!
//! Option values come back from the Manager as whatever JSON type the option
//! declares; state keeps them as formatted strings.

use crate::client::{Api, CephClient, MgrModuleOption};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::domain::value::{deserialize_string_map, format_value, ScalarValue};
use crate::error::{Error, Result};
use crate::reconcile::drift::{self, DriftAction};
use crate::reconcile::import;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_mgr_module_config";

/// Options of one manager module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MgrModuleConfig {
    /// Module name such as `dashboard`; changing it replaces the resource
    pub module_name: String,
    /// Option name → value, stored in formatted string form
    #[serde(default, deserialize_with = "deserialize_string_map")]
    pub configs: BTreeMap<String, String>,
}

impl MgrModuleConfig {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            configs: BTreeMap::new(),
        }
    }

    pub fn with(mut self, option: &str, value: &str) -> Self {
        self.configs.insert(option.to_string(), value.to_string());
        self
    }
}

fn option_path(option: &str) -> AttrPath {
    AttrPath::attr("configs").key(option)
}

/// Formatted published default, `None` when the option has no usable default
fn formatted_default(option: &MgrModuleOption) -> Option<String> {
    let value = ScalarValue::from(option.default_value.clone());
    if value.is_null() {
        return None;
    }
    value.format().ok()
}

pub struct MgrModuleConfigController {
    client: Arc<CephClient>,
}

impl MgrModuleConfigController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// Re-fetch the module config and keep only `keys`
    async fn project(
        &self,
        api: &Api<'_>,
        module: &str,
        keys: impl Iterator<Item = &String>,
    ) -> Result<(MgrModuleConfig, Diagnostics)> {
        let current = api.get_mgr_module_config(module).await?;
        let mut state = MgrModuleConfig::new(module);
        let mut diagnostics = Diagnostics::new();

        for key in keys {
            match current.get(key) {
                Some(value) => {
                    let formatted = format_value(value).map_err(|e| e.at(option_path(key)))?;
                    state.configs.insert(key.clone(), formatted);
                }
                None => drift::drop_cell(
                    &mut diagnostics,
                    KIND,
                    option_path(key),
                    &format!("option {} of manager module {}", key, module),
                ),
            }
        }
        Ok((state, diagnostics))
    }

    /// Published defaults for `keys`; options without one are skipped with
    /// a warning
    async fn defaults_for<'k>(
        &self,
        api: &Api<'_>,
        module: &str,
        keys: impl Iterator<Item = &'k String>,
        diagnostics: &mut Diagnostics,
    ) -> Result<BTreeMap<String, String>> {
        let options = api.get_mgr_module_options(module).await?;
        let mut defaults = BTreeMap::new();

        for key in keys {
            match options.get(key).and_then(formatted_default) {
                Some(default) => {
                    defaults.insert(key.clone(), default);
                }
                None => {
                    warn!(
                        "Option {} of manager module {} has no published default, leaving it as is",
                        key, module
                    );
                    diagnostics.warn_at(
                        option_path(key),
                        format!("unable to reset {} to its default", key),
                        "the module publishes no default value for this option",
                    );
                }
            }
        }
        Ok(defaults)
    }
}

#[async_trait]
impl ResourceController for MgrModuleConfigController {
    type Model = MgrModuleConfig;

    fn kind(&self) -> ResourceKind {
        ResourceKind::MgrModuleConfig
    }

    fn validate(&self, plan: &MgrModuleConfig) -> Result<()> {
        if plan.module_name.trim().is_empty() {
            return Err(Error::validation_at(
                AttrPath::attr("module_name"),
                "module_name must not be empty",
            ));
        }
        Ok(())
    }

    fn replace_triggers(&self, prior: &MgrModuleConfig, plan: &MgrModuleConfig) -> Vec<&'static str> {
        if prior.module_name != plan.module_name {
            vec!["module_name"]
        } else {
            Vec::new()
        }
    }

    async fn create(&self, ctx: &OpContext, plan: &MgrModuleConfig) -> Result<Applied<MgrModuleConfig>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());

        info!(
            "Setting {} options of manager module {}",
            plan.configs.len(),
            plan.module_name
        );
        api.set_mgr_module_config(&plan.module_name, &plan.configs).await?;

        let (state, diagnostics) = self.project(&api, &plan.module_name, plan.configs.keys()).await?;
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }

    async fn read(&self, ctx: &OpContext, state: &MgrModuleConfig) -> Result<Applied<MgrModuleConfig>> {
        let api = self.client.bind(ctx.cancel_token());
        let result = self
            .project(&api, &state.module_name, state.configs.keys())
            .await
            .map(|(s, d)| Applied::present(s).with_diagnostics(d));
        drift::on_missing(result, DriftAction::RemoveResource, KIND, &state.module_name)
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &MgrModuleConfig,
        plan: &MgrModuleConfig,
    ) -> Result<Applied<MgrModuleConfig>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        let removed: Vec<&String> = prior
            .configs
            .keys()
            .filter(|k| !plan.configs.contains_key(*k))
            .collect();
        let mut request = if removed.is_empty() {
            BTreeMap::new()
        } else {
            debug!(
                "Resetting {} options of manager module {} to their defaults",
                removed.len(),
                plan.module_name
            );
            self.defaults_for(&api, &plan.module_name, removed.into_iter(), &mut diagnostics)
                .await?
        };
        request.extend(plan.configs.clone());

        info!("Updating options of manager module {}", plan.module_name);
        api.set_mgr_module_config(&plan.module_name, &request).await?;

        let (state, projected) = self.project(&api, &plan.module_name, plan.configs.keys()).await?;
        diagnostics.extend(projected);
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }

    async fn delete(&self, ctx: &OpContext, state: &MgrModuleConfig) -> Result<Diagnostics> {
        let mut diagnostics = Diagnostics::new();
        if state.configs.is_empty() {
            return Ok(diagnostics);
        }
        let api = self.client.bind(ctx.cancel_token());

        let defaults = self
            .defaults_for(&api, &state.module_name, state.configs.keys(), &mut diagnostics)
            .await?;
        if !defaults.is_empty() {
            info!(
                "Resetting {} options of manager module {} to their defaults",
                defaults.len(),
                state.module_name
            );
            api.set_mgr_module_config(&state.module_name, &defaults).await?;
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<MgrModuleConfig>> {
        let module = import::parse_name(KIND, id)?;
        let api = self.client.bind(ctx.cancel_token());

        info!("Importing options of manager module {}", module);
        let current = api.get_mgr_module_config(module).await?;
        let options = api.get_mgr_module_options(module).await?;

        let mut state = MgrModuleConfig::new(module);
        let mut diagnostics = Diagnostics::new();
        for (name, value) in current {
            // options the module does not publish are ignored
            let Some(option) = options.get(&name) else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            let formatted = match format_value(&value) {
                Ok(formatted) => formatted,
                Err(e) => {
                    diagnostics.warn_at(
                        option_path(&name),
                        format!("option {} was not imported", name),
                        e.to_string(),
                    );
                    continue;
                }
            };
            if formatted_default(option).as_deref() != Some(formatted.as_str()) {
                state.configs.insert(name, formatted);
            }
        }
        Ok(Applied::present(state).with_diagnostics(diagnostics))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use httptest::matchers::{all_of, eq, json_decoded, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;

    #[tokio::test]
    async fn test_values_are_stored_formatted() {
        let server = Server::run();
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/mgr/module/dashboard"),
                request::body(json_decoded(eq(json!({
                    "config": {"server_port": "8080", "ssl": "false"}
                })))),
            ])
            .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard"))
                .respond_with(json_encoded(json!({
                    "ssl": false,
                    "server_port": 8080.0,
                    "server_addr": "::"
                }))),
        );

        let plan: MgrModuleConfig = serde_yaml::from_str(
            "module_name: dashboard\nconfigs:\n  ssl: false\n  server_port: 8080\n",
        )
        .unwrap();
        let controller = MgrModuleConfigController::new(client_for(&server));
        let state = controller
            .create(&OpContext::default(), &plan)
            .await
            .unwrap()
            .state
            .unwrap();

        assert_eq!(state.configs["ssl"], "false");
        assert_eq!(state.configs["server_port"], "8080");
        assert_eq!(state.configs.len(), 2);
    }

    #[tokio::test]
    async fn test_import_excludes_defaults() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard"))
                .respond_with(json_encoded(json!({
                    "ssl": true,
                    "server_port": 8443,
                    "jwt_token_ttl": 28800.0,
                    "ghost": "x"
                }))),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard/options"))
                .respond_with(json_encoded(json!({
                    "ssl": {"default_value": true},
                    "server_port": {"default_value": 8080},
                    "jwt_token_ttl": {"default_value": 28800}
                }))),
        );

        let controller = MgrModuleConfigController::new(client_for(&server));
        let state = controller
            .import(&OpContext::default(), "dashboard")
            .await
            .unwrap()
            .state
            .unwrap();

        assert_eq!(state, MgrModuleConfig::new("dashboard").with("server_port", "8443"));
    }

    #[tokio::test]
    async fn test_delete_resets_to_defaults() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard/options"))
                .respond_with(json_encoded(json!({
                    "ssl": {"default_value": true},
                    "server_port": {"default_value": 8080},
                    "crt_file": {"default_value": null}
                }))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/mgr/module/dashboard"),
                request::body(json_decoded(eq(json!({
                    "config": {"server_port": "8080", "ssl": "true"}
                })))),
            ])
            .respond_with(status_code(200)),
        );

        let controller = MgrModuleConfigController::new(client_for(&server));
        let state = MgrModuleConfig::new("dashboard")
            .with("ssl", "false")
            .with("server_port", "9000")
            .with("crt_file", "/etc/cert.pem");
        let diagnostics = controller.delete(&OpContext::default(), &state).await.unwrap();
        assert_eq!(diagnostics.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_without_options_is_noop() {
        let server = Server::run();
        let controller = MgrModuleConfigController::new(client_for(&server));
        let diagnostics = controller
            .delete(&OpContext::default(), &MgrModuleConfig::new("dashboard"))
            .await
            .unwrap();
        assert!(diagnostics.is_empty());
    }

    #[tokio::test]
    async fn test_update_resets_removed_options() {
        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard/options"))
                .respond_with(json_encoded(json!({"ssl": {"default_value": true}}))),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("PUT", "/api/mgr/module/dashboard"),
                request::body(json_decoded(eq(json!({
                    "config": {"server_port": "9000", "ssl": "true"}
                })))),
            ])
            .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/mgr/module/dashboard"))
                .respond_with(json_encoded(json!({"ssl": true, "server_port": 9000}))),
        );

        let controller = MgrModuleConfigController::new(client_for(&server));
        let prior = MgrModuleConfig::new("dashboard")
            .with("ssl", "false")
            .with("server_port", "8080");
        let plan = MgrModuleConfig::new("dashboard").with("server_port", "9000");
        let state = controller
            .update(&OpContext::default(), &prior, &plan)
            .await
            .unwrap()
            .state
            .unwrap();
        assert_eq!(state, plan);
    }

    #[test]
    fn test_module_rename_replaces() {
        let controller = MgrModuleConfigController::new(offline_client());
        let prior = MgrModuleConfig::new("dashboard");
        let plan = MgrModuleConfig::new("prometheus");
        assert_eq!(controller.replace_triggers(&prior, &plan), vec!["module_name"]);
        assert!(controller.replace_triggers(&prior, &prior).is_empty());
    }
}
