//! Relational schema model
//!
//! Tables are kept in a name-indexed map and reference each other by name,
//! so the foreign-key graph can be walked without owning pointers.

pub mod ddl;

pub use ddl::{parse_ddl, quote_ident, render_ddl};

use crate::types::TableSchema;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

/// Order tables so that every table follows all tables it references.
///
/// Tables are visited in lexicographic order, recursing into each foreign-key
/// target before the table itself is appended. References to unknown tables
/// are skipped. A reference back to a table that is still being visited
/// (a cycle) is not expanded.
pub fn resolve_table_order(tables: &BTreeMap<String, TableSchema>) -> Vec<String> {
    let mut visited = BTreeSet::new();
    let mut visiting = BTreeSet::new();
    let mut order = Vec::with_capacity(tables.len());

    for name in tables.keys() {
        visit(name, tables, &mut visited, &mut visiting, &mut order);
    }

    order
}

fn visit<'a>(
    name: &'a str,
    tables: &'a BTreeMap<String, TableSchema>,
    visited: &mut BTreeSet<&'a str>,
    visiting: &mut BTreeSet<&'a str>,
    order: &mut Vec<String>,
) {
    if visited.contains(name) {
        return;
    }
    let Some(table) = tables.get(name) else {
        return;
    };
    if !visiting.insert(name) {
        warn!(table = name, "foreign key cycle, reference not expanded");
        return;
    }

    for target in table.foreign_keys.values() {
        visit(target, tables, visited, visiting, order);
    }

    visiting.remove(name);
    visited.insert(name);
    order.push(name.to_string());
}
