//! Selection resolution - turns `IdSelectionOptions` into a concrete,
//! deterministically ordered set of entity references.

use std::collections::BTreeSet;

use tracing::debug;

use crate::error::{Result, StatsError};
use crate::hierarchy::HierarchySnapshot;
use crate::types::{EntityReference, HierarchyQueryScope, IdSelectionOptions};

/// Outcome of resolving a selection against one hierarchy snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedScope {
    pub scope: EntityReference,
    /// Every node reached by the traversal, scope included. Sorted.
    pub nodes: Vec<EntityReference>,
    /// Nodes that pass the entity-kind filter; their values are fetched and
    /// counted. Sorted.
    pub members: Vec<EntityReference>,
}

impl ResolvedScope {
    pub fn is_member(&self, entity: &EntityReference) -> bool {
        self.members.binary_search(entity).is_ok()
    }
}

pub struct SelectionResolver<'a> {
    snapshot: &'a HierarchySnapshot,
}

impl<'a> SelectionResolver<'a> {
    pub fn new(snapshot: &'a HierarchySnapshot) -> Self {
        Self { snapshot }
    }

    /// The selected member set, sorted by kind then id.
    pub fn resolve(&self, options: &IdSelectionOptions) -> Result<Vec<EntityReference>> {
        Ok(self.resolve_scope(options)?.members)
    }

    pub fn resolve_scope(&self, options: &IdSelectionOptions) -> Result<ResolvedScope> {
        options.validate()?;
        let scope = options.scope;

        let related = match options.scope_direction {
            HierarchyQueryScope::Exact => Ok(Vec::new()),
            HierarchyQueryScope::Children => self.snapshot.descendants(&scope),
            HierarchyQueryScope::Parents => self.snapshot.ancestors(&scope),
        };

        // An entity the hierarchy has never seen is an isolated leaf.
        let related = match related {
            Ok(related) => related,
            Err(StatsError::UnknownEntity(missing)) => {
                debug!(entity = %missing, "selection scope absent from hierarchy, treating as leaf");
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let nodes: BTreeSet<EntityReference> =
            std::iter::once(scope).chain(related).collect();
        let nodes: Vec<EntityReference> = nodes.into_iter().collect();
        let members = match options.entity_kind {
            Some(kind) => nodes.iter().filter(|r| r.kind == kind).copied().collect(),
            None => nodes.clone(),
        };

        Ok(ResolvedScope {
            scope,
            nodes,
            members,
        })
    }
}
