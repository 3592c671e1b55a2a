//! Undo log for a multi-step attach.
//!
//! Every step that creates host-visible state pushes its inverse. On failure
//! the log unwinds in reverse; undo failures are collected, never dropped.

use tracing::{info, warn};

use crate::error::{ProvisionError, Step};
use crate::host::{Bridge, Netlink, Qos};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Undo {
    DeleteLink(String),
    RenameLink { from: String, to: String },
    RemovePort { bridge: String, port: String },
    ClearBandwidth(String),
}

/// Host handles an unwind needs.
pub struct UndoContext<'a> {
    pub sandbox_id: &'a str,
    pub links: &'a dyn Netlink,
    pub bridge: &'a dyn Bridge,
    pub qos: &'a dyn Qos,
}

#[derive(Debug, Default)]
#[must_use]
pub struct CleanupStack {
    actions: Vec<Undo>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, undo: Undo) {
        self.actions.push(undo);
    }

    /// Drop a pending undo that no longer applies, e.g. a rename whose link
    /// has since left the host namespace.
    pub fn retire(&mut self, undo: &Undo) {
        if let Some(pos) = self.actions.iter().rposition(|a| a == undo) {
            self.actions.remove(pos);
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// The attach succeeded; nothing will be undone.
    pub fn commit(mut self) {
        self.actions.clear();
    }

    /// Run every pending undo, newest first. Returns the failures.
    pub async fn unwind(mut self, ctx: &UndoContext<'_>) -> Vec<ProvisionError> {
        let mut failures = Vec::new();
        while let Some(undo) = self.actions.pop() {
            info!(sandbox_id = %ctx.sandbox_id, ?undo, "rolling back");
            if let Err(e) = run_undo(&undo, ctx).await {
                warn!(sandbox_id = %ctx.sandbox_id, ?undo, error = %e, "rollback step failed");
                failures.push(e);
            }
        }
        failures
    }
}

async fn run_undo(undo: &Undo, ctx: &UndoContext<'_>) -> Result<(), ProvisionError> {
    let id = ctx.sandbox_id;
    match undo {
        Undo::DeleteLink(name) => match ctx.links.delete_link(name).await {
            Err(e) if !e.is_not_found() => Err(ProvisionError::os(Step::DeleteLink, id, name)(e)),
            _ => Ok(()),
        },
        Undo::RenameLink { from, to } => ctx
            .links
            .rename_link(from, to)
            .await
            .map_err(ProvisionError::os(Step::RenameLink, id, from)),
        Undo::RemovePort { bridge, port } => ctx
            .bridge
            .remove_port(bridge, port)
            .await
            .map_err(ProvisionError::bridge(Step::RemovePort, id, port)),
        Undo::ClearBandwidth(iface_id) => ctx
            .qos
            .clear_bandwidth(iface_id)
            .await
            .map_err(ProvisionError::bridge(Step::ClearBandwidth, id, iface_id)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retire_removes_latest_matching_entry() {
        let mut stack = CleanupStack::new();
        let rename = Undo::RenameLink {
            from: "abc_c".into(),
            to: "eth3".into(),
        };
        stack.push(Undo::DeleteLink("abc_h".into()));
        stack.push(rename.clone());
        stack.retire(&rename);
        assert_eq!(stack.len(), 1);
        stack.retire(&rename);
        assert_eq!(stack.len(), 1);
        stack.commit();
    }

    #[test]
    fn new_stack_is_empty() {
        let stack = CleanupStack::new();
        assert!(stack.is_empty());
        stack.commit();
    }
}
