//! Cluster configuration controller (`ceph_config`)
//!
//! One resource holds a group of cells, `section → name → value`. Cells are
//! written one at a time; a failed create unwinds the cells it already wrote
//! so the cluster is left as it was found.
//!
//! Several resources may manage the same `(section, name)` cell. Nothing
//! detects this; whichever resource is applied last wins.

use crate::client::{Api, CephClient, ConfigOption};
use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::{Applied, OpContext, ResourceController, ResourceKind};
use crate::domain::value::deserialize_nested_string_map;
use crate::error::{Error, Result};
use crate::reconcile::diff::{self, CellKey};
use crate::reconcile::drift;
use crate::reconcile::import;
use crate::reconcile::rollback::RollbackLog;
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

const KIND: &str = "ceph_config";

/// Option prefix owned by manager modules
const MGR_PREFIX: &str = "mgr/";

// =============================================================================
// Model
// =============================================================================

/// A group of cluster configuration cells
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ClusterConfig {
    /// `section → option name → value`; values are kept as strings
    #[serde(deserialize_with = "deserialize_nested_string_map")]
    pub config: BTreeMap<String, BTreeMap<String, String>>,
}

impl ClusterConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, section: &str, name: &str, value: &str) -> Self {
        self.config
            .entry(section.to_string())
            .or_default()
            .insert(name.to_string(), value.to_string());
        self
    }

    fn cells(&self) -> BTreeMap<CellKey, String> {
        diff::flatten(&self.config)
    }

    fn from_cells(cells: BTreeMap<CellKey, String>) -> Self {
        Self {
            config: diff::group(cells),
        }
    }
}

/// Attribute path of one cell, `config["<section>"]["<name>"]`
pub fn cell_path(cell: &CellKey) -> AttrPath {
    AttrPath::attr("config").key(&cell.section).key(&cell.name)
}

/// A cell written during create and the value it had before
#[derive(Debug, Clone)]
struct AppliedCell {
    cell: CellKey,
    previous: Option<String>,
}

// =============================================================================
// Controller
// =============================================================================

pub struct ClusterConfigController {
    client: Arc<CephClient>,
}

impl ClusterConfigController {
    pub fn new(client: Arc<CephClient>) -> Self {
        Self { client }
    }

    /// Write every cell, unwinding already written cells on the first failure
    ///
    /// A cell enters the rollback log before its write is sent, so a write
    /// whose response never arrives is still undone.
    async fn apply_with_rollback(
        &self,
        api: &Api<'_>,
        cells: &BTreeMap<CellKey, String>,
    ) -> Result<()> {
        let mut log = RollbackLog::new();

        for (cell, value) in cells {
            let previous = match current_value(api, cell).await {
                Ok(previous) => previous,
                Err(e) => return Err(self.abort(log, cell, e).await),
            };
            log.record(AppliedCell {
                cell: cell.clone(),
                previous,
            });

            match api.set_cluster_config(&cell.section, &cell.name, value).await {
                Ok(()) => debug!("Set cluster configuration {} = {}", cell, value),
                Err(e) => {
                    // the server answered, so the cell was not written
                    if e.status().is_some() {
                        log.discard_last();
                    }
                    return Err(self.abort(log, cell, e).await);
                }
            }
        }
        Ok(())
    }

    async fn abort(&self, log: RollbackLog<AppliedCell>, cell: &CellKey, e: Error) -> Error {
        if matches!(e, Error::Cancelled { .. }) {
            warn!(
                "Cluster configuration apply cancelled at {}; rolling back {} cells",
                cell,
                log.len()
            );
        } else {
            warn!(
                "Cluster configuration apply failed at {}; rolling back {} cells",
                cell,
                log.len()
            );
        }
        let cause = e.at(cell_path(cell));
        self.rollback(log, cause).await
    }

    async fn rollback(&self, log: RollbackLog<AppliedCell>, cause: Error) -> Error {
        // rollback runs even when the operation itself was cancelled
        let detached = tokio_util::sync::CancellationToken::new();
        let api = self.client.bind(&detached);

        let outcome = log
            .unwind(|applied| {
                let api = api;
                async move {
                    match &applied.previous {
                        Some(value) => {
                            info!("Restoring cluster configuration {} = {}", applied.cell, value);
                            api.set_cluster_config(&applied.cell.section, &applied.cell.name, value)
                                .await
                        }
                        None => {
                            info!("Removing cluster configuration {}", applied.cell);
                            api.delete_cluster_config(&applied.cell.section, &applied.cell.name)
                                .await
                        }
                    }
                }
            })
            .await;

        if outcome.is_clean() {
            cause
        } else {
            Error::RollbackFailed {
                operation: "unable to apply cluster configuration".to_string(),
                cause: Box::new(cause),
                failures: outcome.failures,
            }
        }
    }

    /// Read back the given cells; missing ones are dropped with a warning
    async fn refresh(
        &self,
        api: &Api<'_>,
        cells: impl Iterator<Item = &CellKey>,
    ) -> Result<(BTreeMap<CellKey, String>, Diagnostics)> {
        let mut options: BTreeMap<String, Option<ConfigOption>> = BTreeMap::new();
        let mut refreshed = BTreeMap::new();
        let mut diagnostics = Diagnostics::new();

        for cell in cells {
            if !options.contains_key(&cell.name) {
                let option = match api.get_cluster_config(&cell.name).await {
                    Ok(option) => Some(option),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => return Err(e.at(cell_path(cell))),
                };
                options.insert(cell.name.clone(), option);
            }
            let value = options
                .get(&cell.name)
                .and_then(Option::as_ref)
                .and_then(|o| o.section_value(&cell.section));
            match value {
                Some(value) => {
                    refreshed.insert(cell.clone(), value.to_string());
                }
                None => drift::drop_cell(&mut diagnostics, KIND, cell_path(cell), &cell.to_string()),
            }
        }
        Ok((refreshed, diagnostics))
    }

    async fn import_all(&self, api: &Api<'_>) -> Result<BTreeMap<CellKey, String>> {
        let cells: BTreeMap<CellKey, String> = api
            .list_cluster_config()
            .await?
            .into_iter()
            .filter(|o| !o.name.starts_with(MGR_PREFIX))
            .flat_map(|o| {
                let name = o.name;
                o.value
                    .into_iter()
                    .map(move |v| (CellKey::new(v.section, name.clone()), v.value))
            })
            .collect();
        if cells.is_empty() {
            return Err(Error::NotFound {
                message: "unable to import cluster configuration: no options are set".to_string(),
            });
        }
        Ok(cells)
    }

    async fn import_listed(&self, api: &Api<'_>, id: &str) -> Result<BTreeMap<CellKey, String>> {
        let mut cells = BTreeMap::new();
        for cell in import::parse_cells(id)? {
            reject_mgr_option(&cell)?;
            let option = api.get_cluster_config(&cell.name).await.map_err(|e| e.at(cell_path(&cell)))?;
            let value = option.section_value(&cell.section).ok_or_else(|| Error::NotFound {
                message: format!(
                    "unable to import cluster configuration: {} is not set in section {}",
                    cell.name, cell.section
                ),
            })?;
            cells.insert(cell.clone(), value.to_string());
        }
        Ok(cells)
    }
}

async fn current_value(api: &Api<'_>, cell: &CellKey) -> Result<Option<String>> {
    match api.get_cluster_config(&cell.name).await {
        Ok(option) => Ok(option.section_value(&cell.section).map(str::to_string)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn reject_mgr_option(cell: &CellKey) -> Result<()> {
    if cell.name.starts_with(MGR_PREFIX) {
        return Err(Error::validation_at(
            cell_path(cell),
            format!(
                "{} cannot be managed via ceph_config; use ceph_mgr_module_config instead",
                cell.name
            ),
        ));
    }
    Ok(())
}

#[async_trait]
impl ResourceController for ClusterConfigController {
    type Model = ClusterConfig;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Config
    }

    fn validate(&self, plan: &ClusterConfig) -> Result<()> {
        let cells = plan.cells();
        if cells.is_empty() {
            return Err(Error::validation_at(
                AttrPath::attr("config"),
                "at least one configuration cell is required",
            ));
        }
        for cell in cells.keys() {
            reject_mgr_option(cell)?;
        }
        Ok(())
    }

    async fn create(&self, ctx: &OpContext, plan: &ClusterConfig) -> Result<Applied<ClusterConfig>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());
        let cells = plan.cells();

        info!("Applying {} cluster configuration cells", cells.len());
        self.apply_with_rollback(&api, &cells).await?;

        let (refreshed, diagnostics) = self.refresh(&api, cells.keys()).await?;
        Ok(Applied::present(ClusterConfig::from_cells(refreshed)).with_diagnostics(diagnostics))
    }

    async fn read(&self, ctx: &OpContext, state: &ClusterConfig) -> Result<Applied<ClusterConfig>> {
        let api = self.client.bind(ctx.cancel_token());
        let cells = state.cells();
        let (refreshed, diagnostics) = self.refresh(&api, cells.keys()).await?;

        if refreshed.is_empty() {
            warn!("{} drift: every managed cell is gone, removing the resource", KIND);
            return Ok(Applied::removed(diagnostics));
        }
        Ok(Applied::present(ClusterConfig::from_cells(refreshed)).with_diagnostics(diagnostics))
    }

    async fn update(
        &self,
        ctx: &OpContext,
        prior: &ClusterConfig,
        plan: &ClusterConfig,
    ) -> Result<Applied<ClusterConfig>> {
        self.validate(plan)?;
        let api = self.client.bind(ctx.cancel_token());
        let changes = diff::diff(&prior.cells(), &plan.cells());

        info!(
            "Updating cluster configuration: {} new, {} changed, {} removed",
            changes.create.len(),
            changes.update.len(),
            changes.delete.len()
        );
        for (cell, value) in changes.upserts() {
            api.set_cluster_config(&cell.section, &cell.name, value)
                .await
                .map_err(|e| e.at(cell_path(cell)))?;
        }
        for cell in &changes.delete {
            match api.delete_cluster_config(&cell.section, &cell.name).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    debug!("Cluster configuration {} already removed", cell);
                }
                Err(e) => return Err(e.at(cell_path(cell))),
            }
        }

        let cells = plan.cells();
        let (refreshed, diagnostics) = self.refresh(&api, cells.keys()).await?;
        Ok(Applied::present(ClusterConfig::from_cells(refreshed)).with_diagnostics(diagnostics))
    }

    async fn delete(&self, ctx: &OpContext, state: &ClusterConfig) -> Result<Diagnostics> {
        let api = self.client.bind(ctx.cancel_token());
        let mut diagnostics = Diagnostics::new();

        for cell in state.cells().keys() {
            info!("Removing cluster configuration {}", cell);
            if let Err(e) = api.delete_cluster_config(&cell.section, &cell.name).await {
                if matches!(e, Error::Cancelled { .. }) {
                    return Err(e);
                }
                warn!("Failed to remove cluster configuration {}: {}", cell, e);
                diagnostics.warn_at(
                    cell_path(cell),
                    format!("unable to delete cluster configuration {}", cell),
                    e.to_string(),
                );
            }
        }
        Ok(diagnostics)
    }

    async fn import(&self, ctx: &OpContext, id: &str) -> Result<Applied<ClusterConfig>> {
        let api = self.client.bind(ctx.cancel_token());
        let cells = if import::is_bulk(id) {
            info!("Importing every explicitly set cluster configuration option");
            self.import_all(&api).await?
        } else {
            info!("Importing cluster configuration {}", id);
            self.import_listed(&api, id).await?
        };
        Ok(Applied::present(ClusterConfig::from_cells(cells)))
    }
}
