//! Sequential reconciliation engine
//!
//! Drives the controllers over a manifest and a state store, one resource at
//! a time in declaration order. State is committed after every successful
//! mutation. A failing resource is reported and the run moves on to the next
//! one unless the error is fatal for the whole run.

use crate::domain::diagnostics::{Diagnostic, Diagnostics};
use crate::domain::ports::OpContext;
use crate::error::{Error, Result};
use crate::provider::Provider;
use crate::runtime::dispatch::{controller_for, DynController, Planned};
use crate::runtime::manifest::{Address, Manifest, ResourceDecl};
use crate::runtime::state::StateStore;
use serde_json::Value;
use std::fmt;
use tracing::{debug, error, info, warn};

// =============================================================================
// Report
// =============================================================================

/// What happened to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Replaced,
    Deleted,
    Unchanged,
    Refreshed,
    /// The object disappeared outside the reconciler
    Drifted,
    Imported,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Replaced => "replaced",
            Action::Deleted => "deleted",
            Action::Unchanged => "unchanged",
            Action::Refreshed => "refreshed",
            Action::Drifted => "drifted",
            Action::Imported => "imported",
        };
        f.write_str(name)
    }
}

/// Summary of a run
#[derive(Debug, Default)]
pub struct Report {
    pub actions: Vec<(Address, Action)>,
    pub diagnostics: Vec<(Address, Diagnostic)>,
    pub failures: Vec<(Address, Error)>,
}

impl Report {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn count(&self, action: Action) -> usize {
        self.actions.iter().filter(|(_, a)| *a == action).count()
    }

    pub fn action_of(&self, address: &Address) -> Option<Action> {
        self.actions
            .iter()
            .rev()
            .find(|(a, _)| a == address)
            .map(|(_, action)| *action)
    }

    fn record(&mut self, address: &Address, action: Action) {
        info!("{}: {}", address, action);
        self.actions.push((address.clone(), action));
    }

    fn note(&mut self, address: &Address, diagnostics: Diagnostics) {
        for diagnostic in diagnostics {
            warn!("{}: {}", address, diagnostic);
            self.diagnostics.push((address.clone(), diagnostic));
        }
    }
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine<'a> {
    provider: &'a Provider,
    store: &'a mut StateStore,
    ctx: OpContext,
}

impl<'a> Engine<'a> {
    pub fn new(provider: &'a Provider, store: &'a mut StateStore, ctx: OpContext) -> Self {
        Self {
            provider,
            store,
            ctx,
        }
    }

    /// Converge the cluster on the manifest, then delete resources that are
    /// in state but no longer declared
    pub async fn apply(&mut self, manifest: &Manifest) -> Result<Report> {
        manifest.validate()?;
        let mut report = Report::default();

        for decl in &manifest.resources {
            let address = decl.address()?;
            if let Err(e) = self.apply_one(&address, decl, &mut report).await {
                self.fail(&address, e, &mut report)?;
            }
        }

        let declared = manifest.addresses()?;
        let orphans: Vec<Address> = self
            .store
            .state()
            .addresses()?
            .into_iter()
            .filter(|a| !declared.contains(a))
            .collect();
        for address in orphans.iter().rev() {
            if let Err(e) = self.destroy_one(address, &mut report).await {
                self.fail(address, e, &mut report)?;
            }
        }

        Ok(report)
    }

    /// Re-read every resource in state
    pub async fn refresh(&mut self) -> Result<Report> {
        let mut report = Report::default();
        for address in self.store.state().addresses()? {
            match self.refresh_one(&address, &mut report).await {
                Ok(Some(_)) => report.record(&address, Action::Refreshed),
                Ok(None) => {}
                Err(e) => self.fail(&address, e, &mut report)?,
            }
        }
        Ok(report)
    }

    /// Adopt an existing object under `address`
    pub async fn import(&mut self, address: &Address, id: &str) -> Result<Report> {
        if self.store.state().contains(address) {
            return Err(Error::validation(format!(
                "{} is already managed; remove it from state before importing",
                address
            )));
        }
        let controller = self.controller(address);
        let mut report = Report::default();

        info!("Importing {} from id {}", address, id);
        let outcome = controller.import(&self.ctx, id).await?;
        report.note(address, outcome.diagnostics);
        let state = outcome.state.ok_or_else(|| Error::NotFound {
            message: format!("{} not found for import id {}", address.kind, id),
        })?;
        self.store.state_mut().put(address, state);
        self.store.commit()?;
        report.record(address, Action::Imported);
        Ok(report)
    }

    /// Delete every resource in state, newest first
    pub async fn destroy(&mut self) -> Result<Report> {
        let mut report = Report::default();
        let addresses = self.store.state().addresses()?;
        for address in addresses.iter().rev() {
            if let Err(e) = self.destroy_one(address, &mut report).await {
                self.fail(address, e, &mut report)?;
            }
        }
        Ok(report)
    }

    // =========================================================================
    // Steps
    // =========================================================================

    fn controller(&self, address: &Address) -> Box<dyn DynController> {
        controller_for(self.provider, address.kind)
    }

    fn fail(&self, address: &Address, e: Error, report: &mut Report) -> Result<()> {
        if e.is_fatal() {
            return Err(e);
        }
        error!("{}: {}", address, e);
        report.failures.push((address.clone(), e));
        Ok(())
    }

    async fn apply_one(
        &mut self,
        address: &Address,
        decl: &ResourceDecl,
        report: &mut Report,
    ) -> Result<()> {
        let controller = self.controller(address);
        controller.validate(&decl.spec)?;

        let prior = if self.store.state().contains(address) {
            self.refresh_one(address, report).await?
        } else {
            None
        };

        let Some(prior) = prior else {
            return self.create(controller.as_ref(), address, &decl.spec, Action::Created, report).await;
        };

        match controller.plan(&prior, &decl.spec)? {
            Planned::NoChange => {
                report.record(address, Action::Unchanged);
                Ok(())
            }
            Planned::Update => {
                debug!("Updating {} in place", address);
                let outcome = controller.update(&self.ctx, &prior, &decl.spec).await?;
                report.note(address, outcome.diagnostics);
                self.store_outcome(address, outcome.state)?;
                report.record(address, Action::Updated);
                Ok(())
            }
            Planned::Replace(triggers) => {
                info!("Replacing {}: {} changed", address, triggers.join(", "));
                let diagnostics = controller.delete(&self.ctx, &prior).await?;
                report.note(address, diagnostics);
                self.store.state_mut().remove(address);
                self.store.commit()?;
                self.create(controller.as_ref(), address, &decl.spec, Action::Replaced, report)
                    .await
            }
        }
    }

    async fn create(
        &mut self,
        controller: &dyn DynController,
        address: &Address,
        spec: &Value,
        action: Action,
        report: &mut Report,
    ) -> Result<()> {
        let outcome = controller.create(&self.ctx, spec).await?;
        report.note(address, outcome.diagnostics);
        self.store_outcome(address, outcome.state)?;
        report.record(address, action);
        Ok(())
    }

    /// Read the stored resource back; `None` when it drifted away
    async fn refresh_one(&mut self, address: &Address, report: &mut Report) -> Result<Option<Value>> {
        let Some(stored) = self.store.state().get(address).cloned() else {
            return Ok(None);
        };
        let controller = self.controller(address);

        let outcome = controller.read(&self.ctx, &stored).await?;
        report.note(address, outcome.diagnostics);
        match outcome.state {
            Some(state) => {
                if state != stored {
                    self.store.state_mut().put(address, state.clone());
                    self.store.commit()?;
                }
                Ok(Some(state))
            }
            None => {
                self.store.state_mut().remove(address);
                self.store.commit()?;
                report.record(address, Action::Drifted);
                Ok(None)
            }
        }
    }

    async fn destroy_one(&mut self, address: &Address, report: &mut Report) -> Result<()> {
        let Some(state) = self.store.state().get(address).cloned() else {
            return Ok(());
        };
        let controller = self.controller(address);

        let diagnostics = controller.delete(&self.ctx, &state).await?;
        report.note(address, diagnostics);
        self.store.state_mut().remove(address);
        self.store.commit()?;
        report.record(address, Action::Deleted);
        Ok(())
    }

    fn store_outcome(&mut self, address: &Address, state: Option<Value>) -> Result<()> {
        match state {
            Some(state) => self.store.state_mut().put(address, state),
            None => {
                self.store.state_mut().remove(address);
            }
        }
        self.store.commit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::*;
    use crate::domain::ports::ResourceKind;
    use httptest::matchers::{all_of, eq, json_decoded, request};
    use httptest::responders::{json_encoded, status_code};
    use httptest::{Expectation, Server};
    use serde_json::json;
    use tempfile::TempDir;

    fn manifest(resources: &str) -> Manifest {
        let text = format!(
            "provider:\n  endpoint: https://mgr:8443\n  token: t\nresources:\n{}",
            resources
        );
        Manifest::from_yaml(&text).unwrap()
    }

    const BUCKET_ALICE: &str =
        "  - kind: ceph_rgw_bucket\n    name: backups\n    spec:\n      bucket: backups\n      owner: alice\n";

    fn bucket(owner: &str) -> serde_json::Value {
        json!({"bucket": "backups", "owner": owner, "zonegroup": "zg1", "id": "zg1.1"})
    }

    fn expect_bucket_read(server: &Server, owner: &str) {
        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rgw/bucket/backups"))
                .respond_with(json_encoded(bucket(owner))),
        );
    }

    fn address() -> Address {
        Address::new(ResourceKind::RgwBucket, "backups")
    }

    #[tokio::test]
    async fn test_create_then_converged() {
        let mut server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();

        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rgw/bucket"))
                .respond_with(status_code(200)),
        );
        expect_bucket_read(&server, "alice");
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .apply(&manifest(BUCKET_ALICE))
            .await
            .unwrap();
        assert_eq!(report.action_of(&address()), Some(Action::Created));
        assert_eq!(store.state().get(&address()).unwrap()["zonegroup"], "zg1");
        server.verify_and_clear();

        expect_bucket_read(&server, "alice");
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .apply(&manifest(BUCKET_ALICE))
            .await
            .unwrap();
        assert_eq!(report.action_of(&address()), Some(Action::Unchanged));
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn test_owner_change_replaces() {
        let server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();
        store.state_mut().put(&address(), bucket("alice"));

        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rgw/bucket/backups"))
                .times(2)
                .respond_with(httptest::cycle![
                    json_encoded(bucket("alice")),
                    json_encoded(bucket("bob")),
                ]),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/rgw/bucket/backups"))
                .respond_with(status_code(204)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("POST", "/api/rgw/bucket"),
                request::body(json_decoded(eq(json!({"bucket": "backups", "uid": "bob"})))),
            ])
            .respond_with(status_code(201)),
        );

        let resources = BUCKET_ALICE.replace("owner: alice", "owner: bob");
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .apply(&manifest(&resources))
            .await
            .unwrap();
        assert_eq!(report.action_of(&address()), Some(Action::Replaced));
        assert_eq!(store.state().get(&address()).unwrap()["owner"], "bob");
    }

    #[tokio::test]
    async fn test_orphans_deleted_and_drift_recreated() {
        let server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();

        let orphan = Address::new(ResourceKind::RgwUser, "carol");
        store.state_mut().put(&orphan, json!({"uid": "carol"}));
        store.state_mut().put(&address(), bucket("alice"));

        server.expect(
            Expectation::matching(request::method_path("GET", "/api/rgw/bucket/backups"))
                .times(2)
                .respond_with(httptest::cycle![
                    status_code(404),
                    json_encoded(bucket("alice")),
                ]),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rgw/bucket"))
                .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/rgw/user/carol"))
                .respond_with(status_code(204)),
        );

        let report = Engine::new(&provider, &mut store, OpContext::default())
            .apply(&manifest(BUCKET_ALICE))
            .await
            .unwrap();
        assert_eq!(report.count(Action::Drifted), 1);
        assert_eq!(report.action_of(&address()), Some(Action::Created));
        assert_eq!(report.action_of(&orphan), Some(Action::Deleted));
        assert!(!report.diagnostics.is_empty());
        assert!(!store.state().contains(&orphan));
    }

    #[tokio::test]
    async fn test_failure_is_reported_and_run_continues() {
        let server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();

        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rgw/user"))
                .respond_with(json_status(500, json!({"detail": "boom"}))),
        );
        server.expect(
            Expectation::matching(request::method_path("POST", "/api/rgw/bucket"))
                .respond_with(status_code(200)),
        );
        expect_bucket_read(&server, "alice");

        let resources = format!(
            "  - kind: ceph_rgw_user\n    name: alice\n    spec:\n      uid: alice\n{}",
            BUCKET_ALICE
        );
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .apply(&manifest(&resources))
            .await
            .unwrap();
        assert!(!report.is_success());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.action_of(&address()), Some(Action::Created));
        assert_eq!(store.state().len(), 1);
    }

    #[tokio::test]
    async fn test_import_and_destroy() {
        let mut server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();

        expect_bucket_read(&server, "alice");
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .import(&address(), "backups")
            .await
            .unwrap();
        assert_eq!(report.action_of(&address()), Some(Action::Imported));

        let err = Engine::new(&provider, &mut store, OpContext::default())
            .import(&address(), "backups")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already managed"));
        server.verify_and_clear();

        server.expect(
            Expectation::matching(request::method_path("DELETE", "/api/rgw/bucket/backups"))
                .respond_with(status_code(204)),
        );
        let report = Engine::new(&provider, &mut store, OpContext::default())
            .destroy()
            .await
            .unwrap();
        assert_eq!(report.count(Action::Deleted), 1);
        assert!(store.state().is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_stops() {
        let server = Server::run();
        let dir = TempDir::new().unwrap();
        let provider = Provider::from_client(client_for(&server));
        let mut store = StateStore::open(dir.path().join("state.json")).unwrap();

        let ctx = OpContext::default();
        ctx.cancel_token().cancel();
        let err = Engine::new(&provider, &mut store, ctx)
            .apply(&manifest(BUCKET_ALICE))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Cancelled);
    }
}
