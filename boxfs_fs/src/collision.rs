use boxfs_core::{CollisionStrategy, NodeKind, RemoteNode, RemoteStore, StoreResult};
use std::collections::HashSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::resolver::cancellable;

/// What a create or upload should do about the target name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Create under this name.
    UseName(String),
    /// Reuse the existing object with this ID instead of creating one.
    UseExisting(String),
}

/// Applies collision strategies, falling back to a configured default.
///
/// Never touches the path cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollisionResolver {
    default_strategy: CollisionStrategy,
}

impl CollisionResolver {
    pub fn new(default_strategy: CollisionStrategy) -> Self {
        Self { default_strategy }
    }

    pub fn default_strategy(&self) -> CollisionStrategy {
        self.default_strategy
    }

    pub fn strategy_for(&self, call: Option<CollisionStrategy>) -> CollisionStrategy {
        CollisionStrategy::or_default(call, self.default_strategy)
    }

    pub fn resolve(
        &self,
        desired: &str,
        kind: NodeKind,
        strategy: CollisionStrategy,
        siblings: &[RemoteNode],
    ) -> Outcome {
        resolve_create_name(desired, kind, strategy, siblings)
    }

    /// Lists the children of `parent_id` unless `strategy` does not need
    /// them (`Overwrite`), in which case the listing is empty.
    pub async fn siblings_for(
        &self,
        store: &dyn RemoteStore,
        parent_id: &str,
        strategy: CollisionStrategy,
        cancel: &CancellationToken,
    ) -> StoreResult<Vec<RemoteNode>> {
        if strategy == CollisionStrategy::Overwrite {
            return Ok(Vec::new());
        }
        list_siblings(store, parent_id, cancel).await
    }
}

pub async fn list_siblings(
    store: &dyn RemoteStore,
    parent_id: &str,
    cancel: &CancellationToken,
) -> StoreResult<Vec<RemoteNode>> {
    debug!(parent_id, "listing siblings for collision check");
    cancellable(cancel, store.list_folder(parent_id)).await
}

/// Decides the effective name for creating `desired` among `siblings`.
///
/// `Rename` treats a sibling of either kind as taken and tries
/// `name (1)`, `name (2)`, ... against this one listing. At most
/// `siblings.len() + 1` candidates are tried, which always suffices.
pub fn resolve_create_name(
    desired: &str,
    kind: NodeKind,
    strategy: CollisionStrategy,
    siblings: &[RemoteNode],
) -> Outcome {
    match strategy {
        CollisionStrategy::Overwrite => Outcome::UseName(desired.to_owned()),
        CollisionStrategy::Skip => match siblings
            .iter()
            .find(|n| n.kind == kind && n.name == desired)
        {
            Some(existing) => Outcome::UseExisting(existing.id.clone()),
            None => Outcome::UseName(desired.to_owned()),
        },
        CollisionStrategy::Rename => {
            let taken: HashSet<&str> = siblings.iter().map(|n| n.name.as_str()).collect();
            if !taken.contains(desired) {
                return Outcome::UseName(desired.to_owned());
            }
            let bound = siblings.len() + 1;
            let name = (1..=bound)
                .map(|n| numbered_name(desired, kind, n))
                .find(|candidate| !taken.contains(candidate.as_str()))
                .unwrap_or_else(|| numbered_name(desired, kind, bound + 1));
            Outcome::UseName(name)
        }
    }
}

/// `report.pdf` becomes `report (n).pdf`; folders and names without an
/// extension get the suffix appended. A leading dot does not start an
/// extension.
pub fn numbered_name(name: &str, kind: NodeKind, n: usize) -> String {
    if kind == NodeKind::File {
        if let Some(idx) = name.rfind('.').filter(|&idx| idx > 0) {
            let (stem, ext) = name.split_at(idx);
            return format!("{stem} ({n}){ext}");
        }
    }
    format!("{name} ({n})")
}
