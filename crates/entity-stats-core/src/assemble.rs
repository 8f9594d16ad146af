//! Tally pack assembly - pure formatting of per-node accumulations.

use std::collections::HashMap;

use crate::rollup::NodeTally;
use crate::types::{EntityReference, StringTally, TallyPack};

/// Tallies ordered by count descending, ties by value ascending.
pub fn sorted_tallies(tally: &NodeTally) -> Vec<StringTally> {
    let mut tallies: Vec<StringTally> = tally
        .counts()
        .iter()
        .map(|(value, count)| StringTally {
            id: value.clone(),
            count: *count,
        })
        .collect();
    tallies.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.id.cmp(&b.id)));
    tallies
}

pub fn to_tally_pack(entity: EntityReference, tally: Option<&NodeTally>) -> TallyPack<String> {
    TallyPack {
        entity_reference: entity,
        tallies: tally.map(sorted_tallies).unwrap_or_default(),
        last_updated: tally.and_then(NodeTally::last_updated),
    }
}

/// One pack per requested entity, sorted by kind then id. Entities without
/// an accumulation get an empty pack.
pub fn assemble(
    requested: &[EntityReference],
    per_node: &HashMap<EntityReference, NodeTally>,
) -> Vec<TallyPack<String>> {
    let mut entities = requested.to_vec();
    entities.sort_unstable();
    entities.dedup();
    debug_assert!(
        per_node.keys().all(|k| entities.binary_search(k).is_ok()),
        "accumulation for an entity that was not requested"
    );
    entities
        .into_iter()
        .map(|entity| to_tally_pack(entity, per_node.get(&entity)))
        .collect()
}
