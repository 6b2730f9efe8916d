// SPDX-License-Identifier: MIT OR Apache-2.0
//! Contract with the external C/C++/Objective-C parse front end.
//!
//! This crate does not parse anything itself. A host embeds a Clang-style
//! front end that, given a path, compiler arguments and unsaved buffers,
//! produces a [`TranslationUnit`]: an ordered stream of declaration,
//! reference, include and diagnostic events plus a trailing macro pass.
//! Everything the indexer needs from the AST is carried on the events as
//! plain data, so indexing logic stays testable without a compiler
//! installed.

use crate::error::SemindexError;
use crate::types::{Diagnostic, Range};
use serde::{Deserialize, Serialize};

/// Entity taxonomy as the front end reports it, before normalization into
/// [`crate::types::ClangSymbolKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntityKind {
    Unknown,
    Enum,
    Struct,
    Union,
    Typedef,
    TypeAlias,
    Function,
    Variable,
    Field,
    ObjCIvar,
    EnumConstant,
    CxxClass,
    ObjCClass,
    CxxInterface,
    ObjCProtocol,
    ObjCCategory,
    CxxInstanceMethod,
    ObjCInstanceMethod,
    ObjCClassMethod,
    CxxStaticMethod,
    ObjCProperty,
    CxxStaticVariable,
    CxxNamespace,
    CxxNamespaceAlias,
    CxxConstructor,
    CxxDestructor,
    CxxConversionFunction,
}

impl EntityKind {
    pub fn is_type(self) -> bool {
        matches!(
            self,
            EntityKind::Enum
                | EntityKind::Struct
                | EntityKind::Union
                | EntityKind::Typedef
                | EntityKind::TypeAlias
                | EntityKind::CxxClass
                | EntityKind::ObjCClass
                | EntityKind::CxxInterface
                | EntityKind::ObjCProtocol
                | EntityKind::ObjCCategory
        )
    }

    pub fn is_func(self) -> bool {
        matches!(
            self,
            EntityKind::Function
                | EntityKind::CxxInstanceMethod
                | EntityKind::ObjCInstanceMethod
                | EntityKind::ObjCClassMethod
                | EntityKind::CxxStaticMethod
                | EntityKind::CxxConstructor
                | EntityKind::CxxDestructor
                | EntityKind::CxxConversionFunction
        )
    }

    pub fn is_var(self) -> bool {
        matches!(
            self,
            EntityKind::Variable
                | EntityKind::Field
                | EntityKind::ObjCIvar
                | EntityKind::EnumConstant
                | EntityKind::CxxStaticVariable
                | EntityKind::ObjCProperty
        )
    }

    /// Kinds that may be invoked without the call being spelled in the
    /// source: constructors, destructors, conversions.
    pub fn can_be_called_implicitly(self) -> bool {
        matches!(
            self,
            EntityKind::CxxConstructor
                | EntityKind::CxxDestructor
                | EntityKind::CxxConversionFunction
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LanguageKind {
    Unknown,
    C,
    Cpp,
    ObjC,
}

/// One link of the semantic-container chain, innermost first. The chain
/// ends at the translation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub kind: ContainerKind,
    pub usr: String,
    /// Empty for anonymous namespaces, structs, unions, lambdas.
    pub name: String,
    pub parent: Option<Box<Container>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContainerKind {
    TranslationUnit,
    Namespace,
    Class,
    Struct,
    Union,
    Enum,
    ObjCInterface,
    Function,
    Other,
}

impl Container {
    /// True for containers whose members live inside a type definition
    /// (fields, methods).
    pub fn is_type_definition(&self) -> bool {
        matches!(
            self.kind,
            ContainerKind::Class | ContainerKind::Struct | ContainerKind::Union | ContainerKind::Enum
        )
    }

    /// True for containers that contribute to a qualified name.
    pub fn forms_scope(&self) -> bool {
        !matches!(self.kind, ContainerKind::Function | ContainerKind::Other)
    }
}

/// A `TypeRef`/`TemplateRef` child of a declaration cursor, in visit order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeRefChild {
    /// USR of the referenced declaration after collapsing template
    /// specializations to the template definition. Empty when the front
    /// end could not resolve one.
    pub usr: String,
    pub spelling: Range,
}

/// What a variable's declared type looks like.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VarTypeInfo {
    /// Type spelling, e.g. `const Foo *`. May contain `(lambda at ...)`.
    pub spelling: String,
    /// USR of the declaration of the type, after stripping qualifiers and
    /// collapsing template specializations.
    pub declaration_usr: String,
    /// False for function pointers, arrays and `auto`; gates hover
    /// synthesis.
    pub is_plain: bool,
}

/// Value of an enumerator, signed or unsigned per the enum's underlying
/// type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnumValue {
    Signed(i64),
    Unsigned(u64),
}

/// A variable referenced from an initializer expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitializerUse {
    pub usr: String,
    pub spelling: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamInfo {
    pub spelling: Range,
    /// Empty for unnamed parameters.
    pub name: String,
}

/// Declaration event payload. One per declaration the front end indexes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeclEvent {
    pub file: String,
    pub usr: String,
    /// `None` for anonymous declarations.
    pub name: Option<String>,
    pub kind: EntityKind,
    pub language: LanguageKind,
    pub is_definition: bool,
    pub is_redeclaration: bool,
    /// The declaration is an implicit template instantiation (its cursor
    /// differs from the template definition); such declarations are not
    /// indexed.
    pub is_implicit_instantiation: bool,
    /// Set when this declaration is a template specialization of another
    /// entity; holds the template definition's USR. Specializations index
    /// as declarations of the definition.
    pub specialization_of: Option<String>,
    pub spelling: Range,
    pub extent: Range,
    pub comments: Option<String>,
    pub semantic_container: Option<Container>,
    pub lexical_container: Option<Container>,
    /// `TypeRef`/`TemplateRef` children, in visit order.
    pub type_refs: Vec<TypeRefChild>,
    /// The cursor is spelled as a parameter declaration.
    pub is_parameter: bool,
    /// Variable-only payload.
    pub var_type: Option<VarTypeInfo>,
    pub enum_value: Option<EnumValue>,
    pub initializer_uses: Vec<InitializerUse>,
    /// Function-only payload.
    pub func_type_desc: Option<String>,
    pub params: Vec<ParamInfo>,
    pub is_virtual: bool,
    /// USRs of the methods this one overrides.
    pub overridden_usrs: Vec<String>,
    /// Constructor-only: spellings of the parameter types, used to match
    /// `make_*` factory calls back to a constructor.
    pub ctor_param_type_descs: Vec<String>,
    /// Type-only: resolved base classes.
    pub bases: Vec<BaseClassInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaseClassInfo {
    /// USR of the base's declaration; empty when unresolved (dependent
    /// bases).
    pub declaration_usr: String,
    pub type_refs: Vec<TypeRefChild>,
}

impl DeclEvent {
    /// Minimal valid event; tests fill in the rest field by field.
    pub fn named(file: &str, usr: &str, name: &str, kind: EntityKind) -> Self {
        Self {
            file: file.to_string(),
            usr: usr.to_string(),
            name: Some(name.to_string()),
            kind,
            language: LanguageKind::Cpp,
            is_definition: false,
            is_redeclaration: false,
            is_implicit_instantiation: false,
            specialization_of: None,
            spelling: Range::spanning(1, 1, 1, 1),
            extent: Range::spanning(1, 1, 1, 1),
            comments: None,
            semantic_container: None,
            lexical_container: None,
            type_refs: Vec::new(),
            is_parameter: false,
            var_type: None,
            enum_value: None,
            initializer_uses: Vec::new(),
            func_type_desc: None,
            params: Vec::new(),
            is_virtual: false,
            overridden_usrs: Vec::new(),
            ctor_param_type_descs: Vec::new(),
            bases: Vec::new(),
        }
    }
}

/// Reference event payload: a non-declaration mention of an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefEvent {
    pub file: String,
    pub referenced_usr: String,
    pub referenced_kind: EntityKind,
    pub referenced_name: Option<String>,
    pub referenced_is_template: bool,
    pub spelling: Range,
    pub extent: Range,
    /// A member reference whose spelling the front end could not resolve
    /// (dependent members of templates); such references fall back to the
    /// extent.
    pub spelling_is_empty: bool,
    /// The container the reference occurs in. Function-like containers
    /// become the caller of call references.
    pub container: Option<RefContainer>,
    /// For lambda parameters and similar entities that never received a
    /// declaration event: where the referenced entity is declared.
    pub referenced_decl: Option<ReferencedDecl>,
    /// For call references whose callee name starts with `make`: the first
    /// `TypeRef` under the call, i.e. the constructed type.
    pub first_type_ref_usr: Option<String>,
    /// Spellings of the call's argument types, for constructor matching.
    pub call_arg_type_descs: Vec<String>,
}

/// The enclosing context of a reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefContainer {
    pub usr: String,
    /// True when the container is itself a function (function, method,
    /// constructor, destructor, conversion, lambda): a call inside it gets
    /// a caller edge.
    pub is_function_like: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferencedDecl {
    pub file: String,
    pub name: String,
    pub spelling: Range,
    pub extent: Range,
    pub var_type: Option<VarTypeInfo>,
}

impl RefEvent {
    pub fn to_entity(file: &str, usr: &str, kind: EntityKind, spelling: Range) -> Self {
        Self {
            file: file.to_string(),
            referenced_usr: usr.to_string(),
            referenced_kind: kind,
            referenced_name: None,
            referenced_is_template: false,
            spelling,
            extent: spelling,
            spelling_is_empty: false,
            container: None,
            referenced_decl: None,
            first_type_ref_usr: None,
            call_arg_type_descs: Vec::new(),
        }
    }
}

/// An `#include` directive observed while preprocessing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncludeEvent {
    /// The file containing the directive.
    pub file: String,
    /// 1-based line of the `#`.
    pub line: u32,
    /// Resolved path of the included file; empty when resolution failed.
    pub resolved_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub file: String,
    pub diagnostic: Diagnostic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MacroEventKind {
    Definition,
    Expansion,
}

/// Macro definitions and expansion sites, visited after the callback
/// stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MacroEvent {
    pub kind: MacroEventKind,
    pub file: String,
    /// USR of the definition (for expansions, of the referenced
    /// definition).
    pub usr: String,
    pub name: String,
    pub spelling: Range,
    pub extent: Range,
    pub comments: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParseEvent {
    Declaration(DeclEvent),
    Reference(RefEvent),
    Include(IncludeEvent),
    Diagnostic(DiagnosticEvent),
}

/// The front end's output for one parse: an event stream plus per-file
/// preprocessor information.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TranslationUnit {
    pub events: Vec<ParseEvent>,
    pub macros: Vec<MacroEvent>,
    /// Ranges disabled by the preprocessor, per file. Starts are reported
    /// one column after the `#`, exactly as the front end hands them out.
    pub skipped_ranges: Vec<(String, Range)>,
}

/// A parse request as the import pipeline hands it to the front end.
#[derive(Debug, Clone)]
pub struct ParseRequest {
    pub path: String,
    pub args: Vec<String>,
    /// Unsaved editor buffers, path → contents.
    pub unsaved: Vec<(String, String)>,
}

/// The external parsing front end. Implementations wrap libclang or any
/// equivalent indexing API; tests implement it with canned event streams.
pub trait ParseFrontEnd: Send + Sync {
    fn parse(&self, request: &ParseRequest) -> Result<TranslationUnit, SemindexError>;
}

/// A front end that replays serialized translation units from disk: the
/// events for `foo.cc` live next to it in `foo.cc.tu.json`. Used by the
/// binary's replay mode and by integration tests; a production host
/// substitutes its compiler-backed implementation.
pub struct ReplayFrontEnd;

impl ParseFrontEnd for ReplayFrontEnd {
    fn parse(&self, request: &ParseRequest) -> Result<TranslationUnit, SemindexError> {
        let events_path = format!("{}.tu.json", request.path);
        let bytes = std::fs::read(&events_path).map_err(|e| {
            tracing::debug!("no replay events at {}: {}", events_path, e);
            SemindexError::Parse {
                path: request.path.clone(),
            }
        })?;
        serde_json::from_slice(&bytes).map_err(|e| {
            tracing::warn!("malformed replay events at {}: {}", events_path, e);
            SemindexError::Parse {
                path: request.path.clone(),
            }
        })
    }
}
