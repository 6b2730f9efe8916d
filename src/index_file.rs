// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-translation-unit index output.
//!
//! One `IndexFile` is a self-contained symbol graph for a single source or
//! header file: three parallel entity tables (types, funcs, vars) keyed by
//! small local ids, plus includes, dependencies and diagnostics. It is
//! built once by an indexer worker, never mutated afterwards, and consumed
//! exactly once by the merge stage (or round-tripped through the on-disk
//! cache).

use crate::types::{
    ClangSymbolKind, Diagnostic, FuncId, FuncRef, IndexInclude, LanguageId, Range, TypeId, VarId,
};
use crate::usr::Usr;
use gxhash::HashMap;
use serde::{Deserialize, Serialize};

/// Bump whenever the serialized shape changes; artifacts with a different
/// version are discarded on load.
pub const INDEX_FILE_VERSION: i32 = 9;

/// A call-site reference between local func ids.
pub type IndexFuncRef = FuncRef<FuncId>;

/// Append `value` unless it is already present. Preserves insertion order;
/// lists stay small so the linear scan is fine.
pub fn unique_add<T: PartialEq>(values: &mut Vec<T>, value: T) {
    if !values.contains(&value) {
        values.push(value);
    }
}

/// Append a call reference, coalescing consecutive duplicates. The callers
/// and callees lists are run-compressed multisets, not sets: the same site
/// may legitimately appear again later, but the front end frequently emits
/// the same reference twice in a row.
pub fn add_func_ref(refs: &mut Vec<IndexFuncRef>, value: IndexFuncRef) {
    if refs.last() == Some(&value) {
        return;
    }
    refs.push(value);
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexTypeDef {
    pub short_name: String,
    pub detailed_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_spelling: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_extent: Option<Range>,
    /// For `typedef X Y;` and `using Y = X;`, the type this aliases.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias_of: Option<TypeId>,
    #[serde(default)]
    pub parents: Vec<TypeId>,
    /// Types, functions and variables declared inside this type.
    #[serde(default)]
    pub types: Vec<TypeId>,
    #[serde(default)]
    pub funcs: Vec<FuncId>,
    #[serde(default)]
    pub vars: Vec<VarId>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexType {
    pub id: TypeId,
    pub usr: Usr,
    pub def: IndexTypeDef,
    #[serde(default)]
    pub derived: Vec<TypeId>,
    /// Variables whose declared type is this type.
    #[serde(default)]
    pub instances: Vec<VarId>,
    #[serde(default)]
    pub uses: Vec<Range>,
}

impl IndexType {
    pub fn new(id: TypeId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: IndexTypeDef::default(),
            derived: Vec::new(),
            instances: Vec::new(),
            uses: Vec::new(),
        }
    }
}

/// One non-defining declaration of a function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncDeclaration {
    pub spelling: Range,
    pub extent: Range,
    /// The declaration text, used for signature help.
    pub content: String,
    #[serde(default)]
    pub param_spellings: Vec<Range>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexFuncDef {
    pub short_name: String,
    /// Fully qualified signature: return type, qualified name, parameters.
    pub detailed_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    #[serde(default)]
    pub is_operator: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_spelling: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_extent: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaring_type: Option<TypeId>,
    /// Functions this one overrides.
    #[serde(default)]
    pub base: Vec<FuncId>,
    /// Calls made from inside this function's body.
    #[serde(default)]
    pub callees: Vec<IndexFuncRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFunc {
    pub id: FuncId,
    pub usr: Usr,
    pub def: IndexFuncDef,
    #[serde(default)]
    pub declarations: Vec<FuncDeclaration>,
    /// Functions overriding this one.
    #[serde(default)]
    pub derived: Vec<FuncId>,
    /// Call sites that invoke this function.
    #[serde(default)]
    pub callers: Vec<IndexFuncRef>,
}

impl IndexFunc {
    pub fn new(id: FuncId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: IndexFuncDef::default(),
            declarations: Vec::new(),
            derived: Vec::new(),
            callers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IndexVarDef {
    pub short_name: String,
    /// Type spelling followed by the qualified name, e.g. `int ns::x`.
    pub detailed_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comments: Option<String>,
    pub kind: ClangSymbolKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_spelling: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub definition_extent: Option<Range>,
    /// Set for non-defining declarations (`extern int x;`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaration: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variable_type: Option<TypeId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub declaring_type: Option<TypeId>,
    /// Function-local variable or parameter; excluded from workspace
    /// symbol search.
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub is_macro: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexVar {
    pub id: VarId,
    pub usr: Usr,
    pub def: IndexVarDef,
    #[serde(default)]
    pub uses: Vec<Range>,
}

impl IndexVar {
    pub fn new(id: VarId, usr: Usr) -> Self {
        Self {
            id,
            usr,
            def: IndexVarDef::default(),
            uses: Vec::new(),
        }
    }
}

/// Bidirectional usr ↔ local id table, persisted with the index so a
/// reloaded artifact keeps its id assignment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IdCache {
    pub primary_file: String,
    #[serde(default)]
    pub usr_to_type_id: HashMap<Usr, TypeId>,
    #[serde(default)]
    pub usr_to_func_id: HashMap<Usr, FuncId>,
    #[serde(default)]
    pub usr_to_var_id: HashMap<Usr, VarId>,
    #[serde(default)]
    pub type_id_to_usr: HashMap<TypeId, Usr>,
    #[serde(default)]
    pub func_id_to_usr: HashMap<FuncId, Usr>,
    #[serde(default)]
    pub var_id_to_usr: HashMap<VarId, Usr>,
}

impl IdCache {
    pub fn new(primary_file: impl Into<String>) -> Self {
        Self {
            primary_file: primary_file.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexFile {
    pub path: String,
    /// The translation unit whose parse produced this index (equal to
    /// `path` for the primary file, the including TU for headers).
    pub import_file: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub language: LanguageId,
    #[serde(default)]
    pub last_modification_time: i64,
    /// Every other file seen while indexing the owning translation unit;
    /// never contains `path` itself.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default)]
    pub includes: Vec<IndexInclude>,
    #[serde(default)]
    pub skipped_by_preprocessor: Vec<Range>,
    #[serde(default)]
    pub diagnostics: Vec<Diagnostic>,
    #[serde(default)]
    pub types: Vec<IndexType>,
    #[serde(default)]
    pub funcs: Vec<IndexFunc>,
    #[serde(default)]
    pub vars: Vec<IndexVar>,
    pub id_cache: IdCache,
}

impl IndexFile {
    pub fn new(path: impl Into<String>) -> Self {
        let path = path.into();
        Self {
            id_cache: IdCache::new(path.clone()),
            language: LanguageId::from_path(&path),
            path,
            import_file: String::new(),
            args: Vec::new(),
            last_modification_time: 0,
            dependencies: Vec::new(),
            includes: Vec::new(),
            skipped_by_preprocessor: Vec::new(),
            diagnostics: Vec::new(),
            types: Vec::new(),
            funcs: Vec::new(),
            vars: Vec::new(),
        }
    }

    /// Local id for `usr`, allocating a fresh slot on first sight.
    pub fn type_id(&mut self, usr: Usr) -> TypeId {
        if let Some(&id) = self.id_cache.usr_to_type_id.get(&usr) {
            return id;
        }
        let id = TypeId::from(self.types.len());
        self.types.push(IndexType::new(id, usr));
        self.id_cache.usr_to_type_id.insert(usr, id);
        self.id_cache.type_id_to_usr.insert(id, usr);
        id
    }

    pub fn func_id(&mut self, usr: Usr) -> FuncId {
        if let Some(&id) = self.id_cache.usr_to_func_id.get(&usr) {
            return id;
        }
        let id = FuncId::from(self.funcs.len());
        self.funcs.push(IndexFunc::new(id, usr));
        self.id_cache.usr_to_func_id.insert(usr, id);
        self.id_cache.func_id_to_usr.insert(id, usr);
        id
    }

    pub fn var_id(&mut self, usr: Usr) -> VarId {
        if let Some(&id) = self.id_cache.usr_to_var_id.get(&usr) {
            return id;
        }
        let id = VarId::from(self.vars.len());
        self.vars.push(IndexVar::new(id, usr));
        self.id_cache.usr_to_var_id.insert(usr, id);
        self.id_cache.var_id_to_usr.insert(id, usr);
        id
    }

    pub fn ty(&self, id: TypeId) -> &IndexType {
        &self.types[id.index()]
    }
    pub fn ty_mut(&mut self, id: TypeId) -> &mut IndexType {
        &mut self.types[id.index()]
    }
    pub fn func(&self, id: FuncId) -> &IndexFunc {
        &self.funcs[id.index()]
    }
    pub fn func_mut(&mut self, id: FuncId) -> &mut IndexFunc {
        &mut self.funcs[id.index()]
    }
    pub fn var(&self, id: VarId) -> &IndexVar {
        &self.vars[id.index()]
    }
    pub fn var_mut(&mut self, id: VarId) -> &mut IndexVar {
        &mut self.vars[id.index()]
    }

    /// Look up an already-built entity by name, for tests and tools.
    pub fn find_type(&self, short_name: &str) -> Option<&IndexType> {
        self.types.iter().find(|t| t.def.short_name == short_name)
    }
    pub fn find_func(&self, short_name: &str) -> Option<&IndexFunc> {
        self.funcs.iter().find(|f| f.def.short_name == short_name)
    }
    pub fn find_var(&self, short_name: &str) -> Option<&IndexVar> {
        self.vars.iter().find(|v| v.def.short_name == short_name)
    }
}
