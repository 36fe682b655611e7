//! Drift classification
//!
//! A read that finds the target object missing never panics or retries. It
//! becomes one of three state transitions, chosen by the controller.

use crate::domain::diagnostics::{AttrPath, Diagnostics};
use crate::domain::ports::Applied;
use crate::error::{Error, Result};
use tracing::warn;

/// What to do with a missing object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftAction {
    /// A child cell is gone; drop it and keep the resource
    DropFromState,
    /// The whole object is gone; remove the resource from state
    RemoveResource,
    /// The object must exist (import, lookup); fail the operation
    Fail,
}

/// Record a dropped child cell
pub fn drop_cell(diagnostics: &mut Diagnostics, kind: &str, path: AttrPath, what: &str) {
    warn!("{} drift: {} no longer exists, dropping it from state", kind, what);
    diagnostics.warn_at(
        path,
        format!("{} was removed outside of the reconciler", what),
        "it has been dropped from state and will be recreated on the next apply",
    );
}

/// Resource-level outcome for a missing object
pub fn classify<M>(action: DriftAction, kind: &str, what: &str, cause: Error) -> Result<Applied<M>> {
    match action {
        DriftAction::RemoveResource => {
            warn!("{} drift: {} no longer exists, removing it from state", kind, what);
            let mut diagnostics = Diagnostics::new();
            diagnostics.warn(
                format!("{} {} was removed outside of the reconciler", kind, what),
                "it has been removed from state",
            );
            Ok(Applied::removed(diagnostics))
        }
        DriftAction::Fail => Err(cause),
        // a resource-level miss has no cell to drop
        DriftAction::DropFromState => Err(Error::Internal(format!(
            "{} {}: cell drift cannot remove a whole resource",
            kind, what
        ))),
    }
}

/// Convert a not-found read into drift; other errors pass through
pub fn on_missing<M>(
    result: Result<Applied<M>>,
    action: DriftAction,
    kind: &str,
    what: &str,
) -> Result<Applied<M>> {
    match result {
        Err(e) if e.is_not_found() => classify(action, kind, what, e),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn not_found() -> Error {
        Error::Api {
            operation: "unable to read rgw user alice".into(),
            status: 404,
            body: "{}".into(),
        }
    }

    #[test]
    fn test_remove_resource() {
        let applied: Applied<u8> =
            on_missing(Err(not_found()), DriftAction::RemoveResource, "ceph_rgw_user", "alice")
                .unwrap();
        assert!(applied.is_removed());
        assert!(applied.diagnostics.has_warnings());
    }

    #[test]
    fn test_fail_keeps_cause() {
        let err = on_missing::<u8>(Err(not_found()), DriftAction::Fail, "ceph_rgw_user", "alice")
            .unwrap_err();
        assert_eq!(err.status(), Some(404));
    }

    #[test]
    fn test_other_errors_pass_through() {
        let err = Error::Api {
            operation: "unable to read pool".into(),
            status: 500,
            body: "boom".into(),
        };
        let result =
            on_missing::<u8>(Err(err), DriftAction::RemoveResource, "ceph_pool", "rbd");
        assert_matches!(result, Err(Error::Api { status: 500, .. }));
    }

    #[test]
    fn test_drop_cell_records_path() {
        let mut diagnostics = Diagnostics::new();
        let path = AttrPath::attr("config").key("global").key("x");
        drop_cell(&mut diagnostics, "ceph_config", path.clone(), "global/x");
        let diag = diagnostics.iter().next().unwrap();
        assert_eq!(diag.path.as_ref(), Some(&path));
    }
}
