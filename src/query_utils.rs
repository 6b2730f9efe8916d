// SPDX-License-Identifier: MIT OR Apache-2.0
//! Read-side helpers over the query database, shared by the request
//! handlers. Everything here is best-effort: an entity whose file is
//! unloaded simply has no def and drops out of the result.

use crate::query::{
    QueryCallRef, QueryDatabase, QueryFuncId, QueryLocation, QueryTypeId, QueryVarId, SymbolIdx,
    SymbolKind,
};
use crate::types::Position;

pub fn definition_spelling_of_type(db: &QueryDatabase, id: QueryTypeId) -> Option<QueryLocation> {
    db.types[id.index()].def.as_ref()?.definition_spelling
}

pub fn definition_spelling_of_func(db: &QueryDatabase, id: QueryFuncId) -> Option<QueryLocation> {
    db.funcs[id.index()].def.as_ref()?.definition_spelling
}

pub fn definition_spelling_of_var(db: &QueryDatabase, id: QueryVarId) -> Option<QueryLocation> {
    db.vars[id.index()].def.as_ref()?.definition_spelling
}

pub fn definition_spelling_of_symbol(
    db: &QueryDatabase,
    symbol: SymbolIdx,
) -> Option<QueryLocation> {
    match symbol.kind {
        SymbolKind::Type => definition_spelling_of_type(db, QueryTypeId(symbol.idx)),
        SymbolKind::Func => definition_spelling_of_func(db, QueryFuncId(symbol.idx)),
        SymbolKind::Var => definition_spelling_of_var(db, QueryVarId(symbol.idx)),
        SymbolKind::File => None,
    }
}

pub fn definition_extent_of_symbol(db: &QueryDatabase, symbol: SymbolIdx) -> Option<QueryLocation> {
    match symbol.kind {
        SymbolKind::Type => db.types[symbol.idx as usize].def.as_ref()?.definition_extent,
        SymbolKind::Func => db.funcs[symbol.idx as usize].def.as_ref()?.definition_extent,
        SymbolKind::Var => db.vars[symbol.idx as usize].def.as_ref()?.definition_extent,
        SymbolKind::File => Some(QueryLocation {
            file: crate::query::QueryFileId(symbol.idx),
            range: crate::types::Range::spanning(1, 1, 1, 1),
        }),
    }
}

/// Hover text: the detailed name, falling back to nothing for unloaded
/// entities.
pub fn hover_of_symbol(db: &QueryDatabase, symbol: SymbolIdx) -> Option<String> {
    match symbol.kind {
        SymbolKind::Type => {
            let def = db.types[symbol.idx as usize].def.as_ref()?;
            Some(def.hover.clone().unwrap_or_else(|| def.detailed_name.clone()))
        }
        SymbolKind::Func => {
            let def = db.funcs[symbol.idx as usize].def.as_ref()?;
            Some(def.hover.clone().unwrap_or_else(|| def.detailed_name.clone()))
        }
        SymbolKind::Var => {
            let def = db.vars[symbol.idx as usize].def.as_ref()?;
            Some(def.hover.clone().unwrap_or_else(|| def.detailed_name.clone()))
        }
        SymbolKind::File => None,
    }
}

/// The file a symbol is declared in: first declaration for functions, the
/// definition otherwise.
pub fn declaration_file_of_symbol(
    db: &QueryDatabase,
    symbol: SymbolIdx,
) -> Option<crate::query::QueryFileId> {
    match symbol.kind {
        SymbolKind::Type => Some(definition_spelling_of_type(db, QueryTypeId(symbol.idx))?.file),
        SymbolKind::Func => {
            let func = &db.funcs[symbol.idx as usize];
            if let Some(first) = func.declarations.first() {
                return Some(first.file);
            }
            Some(definition_spelling_of_func(db, QueryFuncId(symbol.idx))?.file)
        }
        SymbolKind::Var => Some(definition_spelling_of_var(db, QueryVarId(symbol.idx))?.file),
        SymbolKind::File => Some(crate::query::QueryFileId(symbol.idx)),
    }
}

pub fn locations_of_type_ids(db: &QueryDatabase, ids: &[QueryTypeId]) -> Vec<QueryLocation> {
    ids.iter()
        .filter_map(|&id| definition_spelling_of_type(db, id))
        .collect()
}

pub fn locations_of_func_ids(db: &QueryDatabase, ids: &[QueryFuncId]) -> Vec<QueryLocation> {
    ids.iter()
        .filter_map(|&id| definition_spelling_of_func(db, id))
        .collect()
}

pub fn locations_of_var_ids(db: &QueryDatabase, ids: &[QueryVarId]) -> Vec<QueryLocation> {
    ids.iter()
        .filter_map(|&id| definition_spelling_of_var(db, id))
        .collect()
}

pub fn locations_of_call_refs(refs: &[QueryCallRef]) -> Vec<QueryLocation> {
    refs.iter().map(|r| r.loc).collect()
}

/// Symbols whose span covers `position`, tightest span first. Backed by
/// the file's sorted symbol table.
pub fn symbols_at_position(
    db: &QueryDatabase,
    file: crate::query::QueryFileId,
    position: Position,
) -> Vec<SymbolIdx> {
    let Some(def) = db.files.get(file.index()).and_then(|f| f.def.as_ref()) else {
        return Vec::new();
    };

    // all_symbols is sorted by start; find the first entry starting past
    // the point and scan left while ranges can still cover it.
    let upper = def
        .all_symbols
        .partition_point(|symbol| symbol.range.start <= position);

    let mut hits: Vec<_> = def.all_symbols[..upper]
        .iter()
        .filter(|symbol| symbol.range.contains(position.line, position.column))
        .collect();
    hits.sort_by_key(|symbol| symbol.range.size());
    hits.iter().map(|symbol| symbol.idx).collect()
}
