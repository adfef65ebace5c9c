//! Reset ordering derived from the foreign key graph.

use std::collections::{BTreeMap, BTreeSet};

use crate::{ForeignKey, TableName};

/// Orders `tables` so every table appears before the tables it references.
///
/// Kahn's algorithm over the child -> parent edges. Ties are broken by name.
/// Self-references and edges to tables outside `tables` are ignored. Tables caught
/// in a reference cycle cannot be ordered; they are appended in name order and
/// rely on deferred constraints (or a single `TRUNCATE`) at reset time.
pub fn children_first(tables: &[TableName], foreign_keys: &[ForeignKey]) -> Vec<TableName> {
    let known: BTreeSet<&TableName> = tables.iter().collect();

    // parent -> distinct children still waiting to be emitted
    let mut pending_children: BTreeMap<&TableName, BTreeSet<&TableName>> =
        known.iter().map(|t| (*t, BTreeSet::new())).collect();
    // child -> distinct parents it references
    let mut parents_of: BTreeMap<&TableName, BTreeSet<&TableName>> = BTreeMap::new();

    for fk in foreign_keys {
        if fk.is_self_reference() || !known.contains(&fk.child) || !known.contains(&fk.parent) {
            continue;
        }
        if let Some(children) = pending_children.get_mut(&fk.parent) {
            children.insert(&fk.child);
        }
        parents_of.entry(&fk.child).or_default().insert(&fk.parent);
    }

    let mut ready: BTreeSet<&TableName> = pending_children
        .iter()
        .filter(|(_, children)| children.is_empty())
        .map(|(table, _)| *table)
        .collect();

    let mut ordered = Vec::with_capacity(known.len());
    while let Some(table) = ready.pop_first() {
        ordered.push(table.clone());
        pending_children.remove(table);

        for parent in parents_of.get(table).into_iter().flatten() {
            if let Some(children) = pending_children.get_mut(parent) {
                children.remove(table);
                if children.is_empty() {
                    ready.insert(*parent);
                }
            }
        }
    }

    // Whatever is left sits on (or behind) a cycle
    ordered.extend(pending_children.into_keys().cloned());
    ordered
}
