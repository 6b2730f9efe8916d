// SPDX-License-Identifier: MIT OR Apache-2.0
//! The process-wide query database.
//!
//! Entities from every merged `IndexFile` live in slot-allocated vectors;
//! a slot's index is the entity's global id. Slots are assigned by the USR
//! tables (their own lock, so id-map workers never contend with readers of
//! the main structure) and never reused. The single apply worker owns all
//! mutation; readers see whatever update was applied last.

use crate::index_file::{IndexFile, IndexFuncRef};
use crate::types::{ClangSymbolKind, Diagnostic, IndexInclude, LanguageId, Range};
use crate::usr::{hash_usr, Usr};
use serde::{Deserialize, Serialize};
use std::sync::RwLock;

macro_rules! query_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl From<usize> for $name {
            fn from(value: usize) -> Self {
                $name(value as u32)
            }
        }
    };
}

query_id!(
    /// Slot index into `QueryDatabase::files`. Stable for the process
    /// lifetime.
    QueryFileId
);
query_id!(QueryTypeId);
query_id!(QueryFuncId);
query_id!(QueryVarId);

/// A range plus the file it lives in. Index-side ranges are implicitly in
/// their own file; query-side locations are always fully qualified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QueryLocation {
    pub file: QueryFileId,
    pub range: Range,
}

/// A query-side call reference: caller/callee id plus a fully qualified
/// location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryCallRef {
    pub id: Option<QueryFuncId>,
    pub loc: QueryLocation,
    pub is_implicit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    File,
    Type,
    Func,
    Var,
}

/// A type-erased reference to any indexed symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolIdx {
    pub kind: SymbolKind,
    pub idx: u32,
}

/// One symbol occurrence inside a file, used for point queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SymbolRef {
    pub idx: SymbolIdx,
    pub range: Range,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryTypeDef {
    pub short_name: String,
    pub detailed_name: String,
    pub hover: Option<String>,
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    pub definition_spelling: Option<QueryLocation>,
    pub definition_extent: Option<QueryLocation>,
    pub alias_of: Option<QueryTypeId>,
    pub parents: Vec<QueryTypeId>,
    pub types: Vec<QueryTypeId>,
    pub funcs: Vec<QueryFuncId>,
    pub vars: Vec<QueryVarId>,
}

#[derive(Debug, Clone)]
pub struct QueryType {
    pub usr: Usr,
    /// Absent while every file defining this type is unloaded.
    pub def: Option<QueryTypeDef>,
    pub derived: Vec<QueryTypeId>,
    pub instances: Vec<QueryVarId>,
    pub uses: Vec<QueryLocation>,
    symbol_idx: Option<usize>,
}

impl QueryType {
    fn new(usr: Usr) -> Self {
        Self {
            usr,
            def: None,
            derived: Vec::new(),
            instances: Vec::new(),
            uses: Vec::new(),
            symbol_idx: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFuncDef {
    pub short_name: String,
    pub detailed_name: String,
    pub hover: Option<String>,
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    pub is_operator: bool,
    pub definition_spelling: Option<QueryLocation>,
    pub definition_extent: Option<QueryLocation>,
    pub declaring_type: Option<QueryTypeId>,
    pub base: Vec<QueryFuncId>,
}

#[derive(Debug, Clone)]
pub struct QueryFunc {
    pub usr: Usr,
    pub def: Option<QueryFuncDef>,
    pub declarations: Vec<QueryLocation>,
    pub derived: Vec<QueryFuncId>,
    pub callers: Vec<QueryCallRef>,
    pub callees: Vec<QueryCallRef>,
    symbol_idx: Option<usize>,
}

impl QueryFunc {
    fn new(usr: Usr) -> Self {
        Self {
            usr,
            def: None,
            declarations: Vec::new(),
            derived: Vec::new(),
            callers: Vec::new(),
            callees: Vec::new(),
            symbol_idx: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryVarDef {
    pub short_name: String,
    pub detailed_name: String,
    pub hover: Option<String>,
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    pub definition_spelling: Option<QueryLocation>,
    pub definition_extent: Option<QueryLocation>,
    pub declaration: Option<QueryLocation>,
    pub variable_type: Option<QueryTypeId>,
    pub declaring_type: Option<QueryTypeId>,
    pub is_local: bool,
    pub is_macro: bool,
}

#[derive(Debug, Clone)]
pub struct QueryVar {
    pub usr: Usr,
    pub def: Option<QueryVarDef>,
    pub uses: Vec<QueryLocation>,
    symbol_idx: Option<usize>,
}

impl QueryVar {
    fn new(usr: Usr) -> Self {
        Self {
            usr,
            def: None,
            uses: Vec::new(),
            symbol_idx: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryFileDef {
    pub path: String,
    pub language: LanguageId,
    pub includes: Vec<IndexInclude>,
    pub inactive_regions: Vec<Range>,
    pub diagnostics: Vec<Diagnostic>,
    /// Every symbol occurrence in the file, sorted by start position then
    /// span size so point queries can binary-search.
    pub all_symbols: Vec<SymbolRef>,
}

#[derive(Debug, Clone)]
pub struct QueryFile {
    pub path: String,
    pub def: Option<QueryFileDef>,
}

/// usr → global id assignment for every entity kind. Separately locked so
/// id-map workers only ever touch this, never the main database.
#[derive(Default)]
pub struct UsrTables {
    inner: RwLock<UsrTablesInner>,
}

#[derive(Default)]
struct UsrTablesInner {
    file_ids: gxhash::HashMap<String, QueryFileId>,
    file_paths: Vec<String>,
    type_ids: gxhash::HashMap<Usr, QueryTypeId>,
    type_usrs: Vec<Usr>,
    func_ids: gxhash::HashMap<Usr, QueryFuncId>,
    func_usrs: Vec<Usr>,
    var_ids: gxhash::HashMap<Usr, QueryVarId>,
    var_usrs: Vec<Usr>,
}

impl UsrTables {
    pub fn file_id(&self, path: &str) -> QueryFileId {
        if let Some(&id) = self.inner.read().unwrap().file_ids.get(path) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.file_ids.get(path) {
            return id;
        }
        let id = QueryFileId::from(inner.file_paths.len());
        inner.file_ids.insert(path.to_string(), id);
        inner.file_paths.push(path.to_string());
        id
    }

    pub fn lookup_file_id(&self, path: &str) -> Option<QueryFileId> {
        self.inner.read().unwrap().file_ids.get(path).copied()
    }

    pub fn type_id(&self, usr: Usr) -> QueryTypeId {
        if let Some(&id) = self.inner.read().unwrap().type_ids.get(&usr) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.type_ids.get(&usr) {
            return id;
        }
        let id = QueryTypeId::from(inner.type_usrs.len());
        inner.type_ids.insert(usr, id);
        inner.type_usrs.push(usr);
        id
    }

    pub fn func_id(&self, usr: Usr) -> QueryFuncId {
        if let Some(&id) = self.inner.read().unwrap().func_ids.get(&usr) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.func_ids.get(&usr) {
            return id;
        }
        let id = QueryFuncId::from(inner.func_usrs.len());
        inner.func_ids.insert(usr, id);
        inner.func_usrs.push(usr);
        id
    }

    pub fn var_id(&self, usr: Usr) -> QueryVarId {
        if let Some(&id) = self.inner.read().unwrap().var_ids.get(&usr) {
            return id;
        }
        let mut inner = self.inner.write().unwrap();
        if let Some(&id) = inner.var_ids.get(&usr) {
            return id;
        }
        let id = QueryVarId::from(inner.var_usrs.len());
        inner.var_ids.insert(usr, id);
        inner.var_usrs.push(usr);
        id
    }

    pub fn lookup_type_id(&self, usr: Usr) -> Option<QueryTypeId> {
        self.inner.read().unwrap().type_ids.get(&usr).copied()
    }
    pub fn lookup_func_id(&self, usr: Usr) -> Option<QueryFuncId> {
        self.inner.read().unwrap().func_ids.get(&usr).copied()
    }
    pub fn lookup_var_id(&self, usr: Usr) -> Option<QueryVarId> {
        self.inner.read().unwrap().var_ids.get(&usr).copied()
    }

    /// Snapshot of allocated slots, used by the apply worker to grow the
    /// database vectors before applying an update.
    fn snapshot(&self) -> (Vec<String>, Vec<Usr>, Vec<Usr>, Vec<Usr>) {
        let inner = self.inner.read().unwrap();
        (
            inner.file_paths.clone(),
            inner.type_usrs.clone(),
            inner.func_usrs.clone(),
            inner.var_usrs.clone(),
        )
    }
}

/// Translation from one `IndexFile`'s local ids to global ids. Built by the
/// id-map pipeline stage holding only the USR tables' lock; lives exactly
/// as long as the merge that needs it.
#[derive(Debug, Clone)]
pub struct IdMap {
    pub primary_file: QueryFileId,
    types: Vec<QueryTypeId>,
    funcs: Vec<QueryFuncId>,
    vars: Vec<QueryVarId>,
}

impl IdMap {
    pub fn build(tables: &UsrTables, index: &IndexFile) -> IdMap {
        IdMap {
            primary_file: tables.file_id(&index.path),
            types: index.types.iter().map(|t| tables.type_id(t.usr)).collect(),
            funcs: index.funcs.iter().map(|f| tables.func_id(f.usr)).collect(),
            vars: index.vars.iter().map(|v| tables.var_id(v.usr)).collect(),
        }
    }

    pub fn ty(&self, id: crate::types::TypeId) -> QueryTypeId {
        self.types[id.index()]
    }
    pub fn func(&self, id: crate::types::FuncId) -> QueryFuncId {
        self.funcs[id.index()]
    }
    pub fn var(&self, id: crate::types::VarId) -> QueryVarId {
        self.vars[id.index()]
    }

    pub fn loc(&self, range: Range) -> QueryLocation {
        QueryLocation {
            file: self.primary_file,
            range,
        }
    }

    pub fn call_ref(&self, reference: &IndexFuncRef) -> QueryCallRef {
        QueryCallRef {
            id: reference.id.map(|id| self.func(id)),
            loc: self.loc(reference.loc),
            is_implicit: reference.is_implicit,
        }
    }
}

/// Add/remove delta for one entity's list-valued relation.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeableUpdate<TId, TValue> {
    pub id: TId,
    pub to_add: Vec<TValue>,
    pub to_remove: Vec<TValue>,
}

/// The packed output of one merge: everything the apply worker needs to
/// bring the database from the previous version of one file to the
/// current one.
#[derive(Debug, Clone, Default)]
pub struct IndexUpdate {
    pub files_def_update: Vec<(QueryFileId, QueryFileDef)>,
    pub types_removed: Vec<QueryTypeId>,
    pub types_def_update: Vec<(QueryTypeId, QueryTypeDef)>,
    pub types_derived: Vec<MergeableUpdate<QueryTypeId, QueryTypeId>>,
    pub types_instances: Vec<MergeableUpdate<QueryTypeId, QueryVarId>>,
    pub types_uses: Vec<MergeableUpdate<QueryTypeId, QueryLocation>>,
    pub funcs_removed: Vec<QueryFuncId>,
    pub funcs_def_update: Vec<(QueryFuncId, QueryFuncDef)>,
    pub funcs_declarations: Vec<MergeableUpdate<QueryFuncId, QueryLocation>>,
    pub funcs_derived: Vec<MergeableUpdate<QueryFuncId, QueryFuncId>>,
    pub funcs_callers: Vec<MergeableUpdate<QueryFuncId, QueryCallRef>>,
    pub funcs_callees: Vec<MergeableUpdate<QueryFuncId, QueryCallRef>>,
    pub vars_removed: Vec<QueryVarId>,
    pub vars_def_update: Vec<(QueryVarId, QueryVarDef)>,
    pub vars_uses: Vec<MergeableUpdate<QueryVarId, QueryLocation>>,
}

fn diff<T: PartialEq + Clone>(previous: &[T], current: &[T]) -> (Vec<T>, Vec<T>) {
    let added = current
        .iter()
        .filter(|value| !previous.contains(value))
        .cloned()
        .collect();
    let removed = previous
        .iter()
        .filter(|value| !current.contains(value))
        .cloned()
        .collect();
    (added, removed)
}

fn push_merge<TId: Copy, TValue>(
    out: &mut Vec<MergeableUpdate<TId, TValue>>,
    id: TId,
    to_add: Vec<TValue>,
    to_remove: Vec<TValue>,
) {
    if !to_add.is_empty() || !to_remove.is_empty() {
        out.push(MergeableUpdate {
            id,
            to_add,
            to_remove,
        });
    }
}

fn map_type_def(map: &IdMap, def: &crate::index_file::IndexTypeDef) -> QueryTypeDef {
    QueryTypeDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        kind: def.kind,
        definition_spelling: def.definition_spelling.map(|r| map.loc(r)),
        definition_extent: def.definition_extent.map(|r| map.loc(r)),
        alias_of: def.alias_of.map(|id| map.ty(id)),
        parents: def.parents.iter().map(|&id| map.ty(id)).collect(),
        types: def.types.iter().map(|&id| map.ty(id)).collect(),
        funcs: def.funcs.iter().map(|&id| map.func(id)).collect(),
        vars: def.vars.iter().map(|&id| map.var(id)).collect(),
    }
}

fn map_func_def(map: &IdMap, def: &crate::index_file::IndexFuncDef) -> QueryFuncDef {
    QueryFuncDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        kind: def.kind,
        is_operator: def.is_operator,
        definition_spelling: def.definition_spelling.map(|r| map.loc(r)),
        definition_extent: def.definition_extent.map(|r| map.loc(r)),
        declaring_type: def.declaring_type.map(|id| map.ty(id)),
        base: def.base.iter().map(|&id| map.func(id)).collect(),
    }
}

fn map_var_def(map: &IdMap, def: &crate::index_file::IndexVarDef) -> QueryVarDef {
    QueryVarDef {
        short_name: def.short_name.clone(),
        detailed_name: def.detailed_name.clone(),
        hover: def.hover.clone(),
        comments: def.comments.clone(),
        kind: def.kind,
        definition_spelling: def.definition_spelling.map(|r| map.loc(r)),
        definition_extent: def.definition_extent.map(|r| map.loc(r)),
        declaration: def.declaration.map(|r| map.loc(r)),
        variable_type: def.variable_type.map(|id| map.ty(id)),
        declaring_type: def.declaring_type.map(|id| map.ty(id)),
        is_local: def.is_local,
        is_macro: def.is_macro,
    }
}

/// A def is importable once the indexer has given it a name; bare id
/// allocations (a type referenced but never declared in this file) stay
/// def-less.
fn type_def_is_filled(def: &crate::index_file::IndexTypeDef) -> bool {
    !def.detailed_name.is_empty() || def.definition_spelling.is_some()
}
fn func_def_is_filled(def: &crate::index_file::IndexFuncDef) -> bool {
    !def.detailed_name.is_empty() || def.definition_spelling.is_some()
}
fn var_def_is_filled(def: &crate::index_file::IndexVarDef) -> bool {
    !def.detailed_name.is_empty() || def.definition_spelling.is_some()
}

/// Build the file-level def: path metadata plus the sorted symbol table
/// for point queries.
fn build_file_def(map: &IdMap, index: &IndexFile) -> QueryFileDef {
    let mut all_symbols: Vec<SymbolRef> = Vec::new();

    for (ty, &global) in index.types.iter().zip(&map.types) {
        let idx = SymbolIdx {
            kind: SymbolKind::Type,
            idx: global.0,
        };
        if let Some(spelling) = ty.def.definition_spelling {
            all_symbols.push(SymbolRef {
                idx,
                range: spelling,
            });
        }
        for &range in &ty.uses {
            all_symbols.push(SymbolRef { idx, range });
        }
    }
    for (func, &global) in index.funcs.iter().zip(&map.funcs) {
        let idx = SymbolIdx {
            kind: SymbolKind::Func,
            idx: global.0,
        };
        if let Some(spelling) = func.def.definition_spelling {
            all_symbols.push(SymbolRef {
                idx,
                range: spelling,
            });
        }
        for declaration in &func.declarations {
            all_symbols.push(SymbolRef {
                idx,
                range: declaration.spelling,
            });
        }
        for caller in &func.callers {
            all_symbols.push(SymbolRef {
                idx,
                range: caller.loc,
            });
        }
    }
    for (var, &global) in index.vars.iter().zip(&map.vars) {
        let idx = SymbolIdx {
            kind: SymbolKind::Var,
            idx: global.0,
        };
        for &range in &var.uses {
            all_symbols.push(SymbolRef { idx, range });
        }
    }

    all_symbols.sort_by(|a, b| {
        a.range
            .start
            .cmp(&b.range.start)
            .then_with(|| a.range.size().cmp(&b.range.size()))
    });
    all_symbols.dedup();

    QueryFileDef {
        path: index.path.clone(),
        language: index.language,
        includes: index.includes.clone(),
        inactive_regions: index.skipped_by_preprocessor.clone(),
        diagnostics: index.diagnostics.clone(),
        all_symbols,
    }
}

impl IndexUpdate {
    /// Compute the delta that takes the database from `previous` (the
    /// version of this file applied earlier, if any) to `current`.
    pub fn create(
        previous: Option<(&IdMap, &IndexFile)>,
        current: (&IdMap, &IndexFile),
    ) -> IndexUpdate {
        let (current_map, current_index) = current;
        let mut update = IndexUpdate::default();

        update
            .files_def_update
            .push((current_map.primary_file, build_file_def(current_map, current_index)));

        // Previous entities keyed by usr for the remove side of the diff.
        let previous_types: gxhash::HashMap<Usr, (&crate::index_file::IndexType, QueryTypeId)> =
            previous
                .map(|(map, index)| {
                    index
                        .types
                        .iter()
                        .map(|t| (t.usr, (t, map.ty(t.id))))
                        .collect()
                })
                .unwrap_or_default();
        let previous_funcs: gxhash::HashMap<Usr, (&crate::index_file::IndexFunc, QueryFuncId)> =
            previous
                .map(|(map, index)| {
                    index
                        .funcs
                        .iter()
                        .map(|f| (f.usr, (f, map.func(f.id))))
                        .collect()
                })
                .unwrap_or_default();
        let previous_vars: gxhash::HashMap<Usr, (&crate::index_file::IndexVar, QueryVarId)> =
            previous
                .map(|(map, index)| {
                    index
                        .vars
                        .iter()
                        .map(|v| (v.usr, (v, map.var(v.id))))
                        .collect()
                })
                .unwrap_or_default();

        let previous_map = previous.map(|(map, _)| map);

        // Types.
        for ty in &current_index.types {
            let global = current_map.ty(ty.id);
            let prev = previous_types.get(&ty.usr);

            if type_def_is_filled(&ty.def) {
                let mapped = map_type_def(current_map, &ty.def);
                let prev_mapped = prev
                    .filter(|(p, _)| type_def_is_filled(&p.def))
                    .map(|(p, _)| map_type_def(previous_map.unwrap(), &p.def));
                if prev_mapped.as_ref() != Some(&mapped) {
                    update.types_def_update.push((global, mapped));
                }
            }

            let prev_derived: Vec<QueryTypeId> = prev
                .map(|(p, _)| p.derived.iter().map(|&d| previous_map.unwrap().ty(d)).collect())
                .unwrap_or_default();
            let curr_derived: Vec<QueryTypeId> =
                ty.derived.iter().map(|&d| current_map.ty(d)).collect();
            let (added, removed) = diff(&prev_derived, &curr_derived);
            push_merge(&mut update.types_derived, global, added, removed);

            let prev_instances: Vec<QueryVarId> = prev
                .map(|(p, _)| {
                    p.instances
                        .iter()
                        .map(|&v| previous_map.unwrap().var(v))
                        .collect()
                })
                .unwrap_or_default();
            let curr_instances: Vec<QueryVarId> =
                ty.instances.iter().map(|&v| current_map.var(v)).collect();
            let (added, removed) = diff(&prev_instances, &curr_instances);
            push_merge(&mut update.types_instances, global, added, removed);

            let prev_uses: Vec<QueryLocation> = prev
                .map(|(p, _)| p.uses.iter().map(|&r| previous_map.unwrap().loc(r)).collect())
                .unwrap_or_default();
            let curr_uses: Vec<QueryLocation> =
                ty.uses.iter().map(|&r| current_map.loc(r)).collect();
            let (added, removed) = diff(&prev_uses, &curr_uses);
            push_merge(&mut update.types_uses, global, added, removed);
        }
        for (usr, (prev, global)) in &previous_types {
            if current_index.id_cache.usr_to_type_id.contains_key(usr) {
                continue;
            }
            if type_def_is_filled(&prev.def) {
                update.types_removed.push(*global);
            }
            let prev_uses: Vec<QueryLocation> = prev
                .uses
                .iter()
                .map(|&r| previous_map.unwrap().loc(r))
                .collect();
            push_merge(&mut update.types_uses, *global, Vec::new(), prev_uses);
        }

        // Funcs.
        for func in &current_index.funcs {
            let global = current_map.func(func.id);
            let prev = previous_funcs.get(&func.usr);

            if func_def_is_filled(&func.def) {
                let mapped = map_func_def(current_map, &func.def);
                let prev_mapped = prev
                    .filter(|(p, _)| func_def_is_filled(&p.def))
                    .map(|(p, _)| map_func_def(previous_map.unwrap(), &p.def));
                if prev_mapped.as_ref() != Some(&mapped) {
                    update.funcs_def_update.push((global, mapped));
                }
            }

            let prev_declarations: Vec<QueryLocation> = prev
                .map(|(p, _)| {
                    p.declarations
                        .iter()
                        .map(|d| previous_map.unwrap().loc(d.spelling))
                        .collect()
                })
                .unwrap_or_default();
            let curr_declarations: Vec<QueryLocation> = func
                .declarations
                .iter()
                .map(|d| current_map.loc(d.spelling))
                .collect();
            let (added, removed) = diff(&prev_declarations, &curr_declarations);
            push_merge(&mut update.funcs_declarations, global, added, removed);

            let prev_derived: Vec<QueryFuncId> = prev
                .map(|(p, _)| {
                    p.derived
                        .iter()
                        .map(|&d| previous_map.unwrap().func(d))
                        .collect()
                })
                .unwrap_or_default();
            let curr_derived: Vec<QueryFuncId> =
                func.derived.iter().map(|&d| current_map.func(d)).collect();
            let (added, removed) = diff(&prev_derived, &curr_derived);
            push_merge(&mut update.funcs_derived, global, added, removed);

            let prev_callers: Vec<QueryCallRef> = prev
                .map(|(p, _)| {
                    p.callers
                        .iter()
                        .map(|r| previous_map.unwrap().call_ref(r))
                        .collect()
                })
                .unwrap_or_default();
            let curr_callers: Vec<QueryCallRef> = func
                .callers
                .iter()
                .map(|r| current_map.call_ref(r))
                .collect();
            let (added, removed) = diff(&prev_callers, &curr_callers);
            push_merge(&mut update.funcs_callers, global, added, removed);

            let prev_callees: Vec<QueryCallRef> = prev
                .map(|(p, _)| {
                    p.def
                        .callees
                        .iter()
                        .map(|r| previous_map.unwrap().call_ref(r))
                        .collect()
                })
                .unwrap_or_default();
            let curr_callees: Vec<QueryCallRef> = func
                .def
                .callees
                .iter()
                .map(|r| current_map.call_ref(r))
                .collect();
            let (added, removed) = diff(&prev_callees, &curr_callees);
            push_merge(&mut update.funcs_callees, global, added, removed);
        }
        for (usr, (prev, global)) in &previous_funcs {
            if current_index.id_cache.usr_to_func_id.contains_key(usr) {
                continue;
            }
            if func_def_is_filled(&prev.def) {
                update.funcs_removed.push(*global);
            }
            let map = previous_map.unwrap();
            let prev_declarations: Vec<QueryLocation> = prev
                .declarations
                .iter()
                .map(|d| map.loc(d.spelling))
                .collect();
            push_merge(
                &mut update.funcs_declarations,
                *global,
                Vec::new(),
                prev_declarations,
            );
            let prev_callers: Vec<QueryCallRef> =
                prev.callers.iter().map(|r| map.call_ref(r)).collect();
            push_merge(&mut update.funcs_callers, *global, Vec::new(), prev_callers);
        }

        // Vars.
        for var in &current_index.vars {
            let global = current_map.var(var.id);
            let prev = previous_vars.get(&var.usr);

            if var_def_is_filled(&var.def) {
                let mapped = map_var_def(current_map, &var.def);
                let prev_mapped = prev
                    .filter(|(p, _)| var_def_is_filled(&p.def))
                    .map(|(p, _)| map_var_def(previous_map.unwrap(), &p.def));
                if prev_mapped.as_ref() != Some(&mapped) {
                    update.vars_def_update.push((global, mapped));
                }
            }

            let prev_uses: Vec<QueryLocation> = prev
                .map(|(p, _)| p.uses.iter().map(|&r| previous_map.unwrap().loc(r)).collect())
                .unwrap_or_default();
            let curr_uses: Vec<QueryLocation> =
                var.uses.iter().map(|&r| current_map.loc(r)).collect();
            let (added, removed) = diff(&prev_uses, &curr_uses);
            push_merge(&mut update.vars_uses, global, added, removed);
        }
        for (usr, (prev, global)) in &previous_vars {
            if current_index.id_cache.usr_to_var_id.contains_key(usr) {
                continue;
            }
            if var_def_is_filled(&prev.def) {
                update.vars_removed.push(*global);
            }
            let prev_uses: Vec<QueryLocation> = prev
                .uses
                .iter()
                .map(|&r| previous_map.unwrap().loc(r))
                .collect();
            push_merge(&mut update.vars_uses, *global, Vec::new(), prev_uses);
        }

        update
    }
}

fn merge_list<TId, T: PartialEq>(list: &mut Vec<T>, update: MergeableUpdate<TId, T>) {
    for value in update.to_remove {
        if let Some(position) = list.iter().position(|existing| *existing == value) {
            list.remove(position);
        }
    }
    for value in update.to_add {
        if !list.contains(&value) {
            list.push(value);
        }
    }
}

/// The merged, process-wide symbol graph. Single writer (the apply
/// worker), many readers.
#[derive(Default)]
pub struct QueryDatabase {
    pub files: Vec<QueryFile>,
    pub types: Vec<QueryType>,
    pub funcs: Vec<QueryFunc>,
    pub vars: Vec<QueryVar>,
    /// Flat listing of every indexed symbol; `detailed_names` is parallel
    /// and drives workspace symbol search.
    pub symbols: Vec<SymbolIdx>,
    pub detailed_names: Vec<String>,
}

impl QueryDatabase {
    /// Grow the slot vectors to cover every id the USR tables have handed
    /// out. Called by the apply worker before each update; slots for
    /// removed files stay allocated but def-less.
    pub fn ensure_capacity(&mut self, tables: &UsrTables) {
        let (file_paths, type_usrs, func_usrs, var_usrs) = tables.snapshot();
        for path in &file_paths[self.files.len()..] {
            self.files.push(QueryFile {
                path: path.clone(),
                def: None,
            });
        }
        for &usr in &type_usrs[self.types.len()..] {
            self.types.push(QueryType::new(usr));
        }
        for &usr in &func_usrs[self.funcs.len()..] {
            self.funcs.push(QueryFunc::new(usr));
        }
        for &usr in &var_usrs[self.vars.len()..] {
            self.vars.push(QueryVar::new(usr));
        }
    }

    fn register_symbol(
        symbols: &mut Vec<SymbolIdx>,
        detailed_names: &mut Vec<String>,
        slot: &mut Option<usize>,
        idx: SymbolIdx,
        detailed_name: &str,
    ) {
        match *slot {
            Some(existing) => detailed_names[existing] = detailed_name.to_string(),
            None => {
                *slot = Some(symbols.len());
                symbols.push(idx);
                detailed_names.push(detailed_name.to_string());
            }
        }
    }

    /// Apply one update atomically. The caller holds the exclusive lock;
    /// this is the only mutation path in the whole process.
    pub fn apply_index_update(&mut self, tables: &UsrTables, update: IndexUpdate) {
        self.ensure_capacity(tables);

        for (id, def) in update.files_def_update {
            self.files[id.index()].def = Some(def);
        }

        for id in update.types_removed {
            self.types[id.index()].def = None;
            if let Some(slot) = self.types[id.index()].symbol_idx {
                self.detailed_names[slot].clear();
            }
        }
        for (id, def) in update.types_def_update {
            let detailed_name = def.detailed_name.clone();
            let ty = &mut self.types[id.index()];
            ty.def = Some(def);
            Self::register_symbol(
                &mut self.symbols,
                &mut self.detailed_names,
                &mut ty.symbol_idx,
                SymbolIdx {
                    kind: SymbolKind::Type,
                    idx: id.0,
                },
                &detailed_name,
            );
        }
        for merge in update.types_derived {
            merge_list(&mut self.types[merge.id.index()].derived, merge);
        }
        for merge in update.types_instances {
            merge_list(&mut self.types[merge.id.index()].instances, merge);
        }
        for merge in update.types_uses {
            merge_list(&mut self.types[merge.id.index()].uses, merge);
        }

        for id in update.funcs_removed {
            self.funcs[id.index()].def = None;
            if let Some(slot) = self.funcs[id.index()].symbol_idx {
                self.detailed_names[slot].clear();
            }
        }
        for (id, def) in update.funcs_def_update {
            let detailed_name = def.detailed_name.clone();
            let func = &mut self.funcs[id.index()];
            func.def = Some(def);
            Self::register_symbol(
                &mut self.symbols,
                &mut self.detailed_names,
                &mut func.symbol_idx,
                SymbolIdx {
                    kind: SymbolKind::Func,
                    idx: id.0,
                },
                &detailed_name,
            );
        }
        for merge in update.funcs_declarations {
            merge_list(&mut self.funcs[merge.id.index()].declarations, merge);
        }
        for merge in update.funcs_derived {
            merge_list(&mut self.funcs[merge.id.index()].derived, merge);
        }
        for merge in update.funcs_callers {
            merge_list(&mut self.funcs[merge.id.index()].callers, merge);
        }
        for merge in update.funcs_callees {
            merge_list(&mut self.funcs[merge.id.index()].callees, merge);
        }

        for id in update.vars_removed {
            self.vars[id.index()].def = None;
            if let Some(slot) = self.vars[id.index()].symbol_idx {
                self.detailed_names[slot].clear();
            }
        }
        for (id, def) in update.vars_def_update {
            let detailed_name = def.detailed_name.clone();
            let var = &mut self.vars[id.index()];
            var.def = Some(def);
            Self::register_symbol(
                &mut self.symbols,
                &mut self.detailed_names,
                &mut var.symbol_idx,
                SymbolIdx {
                    kind: SymbolKind::Var,
                    idx: id.0,
                },
                &detailed_name,
            );
        }
        for merge in update.vars_uses {
            merge_list(&mut self.vars[merge.id.index()].uses, merge);
        }

        debug_assert_eq!(self.symbols.len(), self.detailed_names.len());
    }

    pub fn find_type(&self, tables: &UsrTables, usr_text: &str) -> Option<&QueryType> {
        let id = tables.lookup_type_id(hash_usr(usr_text))?;
        self.types.get(id.index())
    }
    pub fn find_func(&self, tables: &UsrTables, usr_text: &str) -> Option<&QueryFunc> {
        let id = tables.lookup_func_id(hash_usr(usr_text))?;
        self.funcs.get(id.index())
    }
    pub fn find_var(&self, tables: &UsrTables, usr_text: &str) -> Option<&QueryVar> {
        let id = tables.lookup_var_id(hash_usr(usr_text))?;
        self.vars.get(id.index())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::usr::hash_usr;

    fn single_file_index() -> IndexFile {
        let mut index = IndexFile::new("a.cc");
        let type_id = index.type_id(hash_usr("c:@S@A"));
        {
            let ty = index.ty_mut(type_id);
            ty.def.short_name = "A".to_string();
            ty.def.detailed_name = "A".to_string();
            ty.def.kind = ClangSymbolKind::Struct;
            ty.def.definition_spelling = Some(Range::spanning(1, 8, 1, 9));
            ty.uses.push(Range::spanning(1, 8, 1, 9));
        }
        index
    }

    #[test]
    fn usr_tables_assign_each_usr_one_id_per_kind() {
        let tables = UsrTables::default();
        let a = tables.type_id(hash_usr("c:@S@A"));
        let b = tables.type_id(hash_usr("c:@S@B"));
        assert_ne!(a, b);
        assert_eq!(tables.type_id(hash_usr("c:@S@A")), a);
        // A func may share a usr hash value with a type without clashing.
        let f = tables.func_id(hash_usr("c:@S@A"));
        assert_eq!(f, QueryFuncId(0));
    }

    #[test]
    fn first_apply_imports_defs_and_symbols() {
        let tables = UsrTables::default();
        let mut db = QueryDatabase::default();

        let index = single_file_index();
        let map = IdMap::build(&tables, &index);
        let update = IndexUpdate::create(None, (&map, &index));
        db.apply_index_update(&tables, update);

        let ty = db.find_type(&tables, "c:@S@A").unwrap();
        let def = ty.def.as_ref().unwrap();
        assert_eq!(def.short_name, "A");
        assert_eq!(ty.uses.len(), 1);
        assert_eq!(db.symbols.len(), 1);
        assert_eq!(db.detailed_names, vec!["A".to_string()]);

        let file = &db.files[map.primary_file.index()];
        let file_def = file.def.as_ref().unwrap();
        assert_eq!(file_def.path, "a.cc");
        assert!(!file_def.all_symbols.is_empty());
    }

    #[test]
    fn reapplying_the_same_update_is_idempotent() {
        let tables = UsrTables::default();
        let mut db = QueryDatabase::default();

        let index = single_file_index();
        let map = IdMap::build(&tables, &index);
        let update = IndexUpdate::create(None, (&map, &index));
        db.apply_index_update(&tables, update.clone());
        db.apply_index_update(&tables, update);

        let ty = db.find_type(&tables, "c:@S@A").unwrap();
        assert_eq!(ty.uses.len(), 1);
        assert_eq!(db.symbols.len(), 1);
    }

    #[test]
    fn reload_removes_stale_uses_and_defs() {
        let tables = UsrTables::default();
        let mut db = QueryDatabase::default();

        let previous = single_file_index();
        let previous_map = IdMap::build(&tables, &previous);
        db.apply_index_update(
            &tables,
            IndexUpdate::create(None, (&previous_map, &previous)),
        );

        // New version of the file: type A is gone, type B appears.
        let mut current = IndexFile::new("a.cc");
        let b = current.type_id(hash_usr("c:@S@B"));
        {
            let ty = current.ty_mut(b);
            ty.def.short_name = "B".to_string();
            ty.def.detailed_name = "B".to_string();
            ty.def.definition_spelling = Some(Range::spanning(1, 8, 1, 9));
            ty.uses.push(Range::spanning(1, 8, 1, 9));
        }
        let current_map = IdMap::build(&tables, &current);
        db.apply_index_update(
            &tables,
            IndexUpdate::create(Some((&previous_map, &previous)), (&current_map, &current)),
        );

        let a = db.find_type(&tables, "c:@S@A").unwrap();
        assert!(a.def.is_none());
        assert!(a.uses.is_empty());
        let b = db.find_type(&tables, "c:@S@B").unwrap();
        assert!(b.def.is_some());
        assert_eq!(b.uses.len(), 1);
    }

    #[test]
    fn global_ids_survive_file_reload() {
        let tables = UsrTables::default();
        let mut db = QueryDatabase::default();

        let previous = single_file_index();
        let previous_map = IdMap::build(&tables, &previous);
        db.apply_index_update(
            &tables,
            IndexUpdate::create(None, (&previous_map, &previous)),
        );
        let id_before = tables.lookup_type_id(hash_usr("c:@S@A")).unwrap();

        let current = single_file_index();
        let current_map = IdMap::build(&tables, &current);
        db.apply_index_update(
            &tables,
            IndexUpdate::create(Some((&previous_map, &previous)), (&current_map, &current)),
        );

        assert_eq!(tables.lookup_type_id(hash_usr("c:@S@A")).unwrap(), id_before);
        assert_eq!(db.types.len(), 1);
    }

    #[test]
    fn caller_callee_edges_stay_symmetric_after_apply() {
        use crate::index_file::add_func_ref;

        let tables = UsrTables::default();
        let mut db = QueryDatabase::default();

        let mut index = IndexFile::new("a.cc");
        let called = index.func_id(hash_usr("c:@F@called#"));
        let caller = index.func_id(hash_usr("c:@F@caller#"));
        index.func_mut(called).def.short_name = "called".to_string();
        index.func_mut(called).def.detailed_name = "void called()".to_string();
        index.func_mut(caller).def.short_name = "caller".to_string();
        index.func_mut(caller).def.detailed_name = "void caller()".to_string();

        let site = Range::spanning(3, 3, 3, 9);
        add_func_ref(
            &mut index.func_mut(caller).def.callees,
            IndexFuncRef::new(Some(called), site, false),
        );
        add_func_ref(
            &mut index.func_mut(called).callers,
            IndexFuncRef::new(Some(caller), site, false),
        );

        let map = IdMap::build(&tables, &index);
        db.apply_index_update(&tables, IndexUpdate::create(None, (&map, &index)));

        let called = db.find_func(&tables, "c:@F@called#").unwrap();
        let caller = db.find_func(&tables, "c:@F@caller#").unwrap();
        assert_eq!(called.callers.len(), 1);
        assert_eq!(caller.callees.len(), 1);
        assert_eq!(called.callers[0].loc, caller.callees[0].loc);
        assert_eq!(called.callers[0].is_implicit, caller.callees[0].is_implicit);
    }
}
