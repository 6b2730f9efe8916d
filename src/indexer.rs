// SPDX-License-Identifier: MIT OR Apache-2.0
//! The per-translation-unit indexer.
//!
//! Consumes the front end's event stream for one parse and builds one
//! `IndexFile` per file this translation unit owns (see
//! [`crate::file_consumer`]). All cross-references resolve through USR
//! hashes into local ids; nothing here touches the query database.

use crate::file_consumer::{Claim, FileConsumer, FileConsumerSharedState};
use crate::frontend::{
    Container, ContainerKind, DeclEvent, DiagnosticEvent, EntityKind, EnumValue, IncludeEvent,
    LanguageKind, MacroEvent, MacroEventKind, ParseEvent, ParseFrontEnd, ParseRequest, RefEvent,
    TranslationUnit, TypeRefChild,
};
use crate::index_file::{add_func_ref, unique_add, IndexFile, IndexFuncRef};
use crate::perf::PerformanceImportFile;
use crate::text_utils::{concat_type_and_name, matching_prefix_score, FileContents, FileContentsMap};
use crate::types::{
    ClangSymbolKind, DiagnosticSeverity, IndexInclude, LanguageId, Position, Range, TypeId, VarId,
};
use crate::usr::{hash_usr, Usr};
use std::sync::Arc;
use std::time::Instant;

/// For typedef/using spanning no more than this many lines, synthesize a
/// hover from the declaration text.
const MAX_LINES_DISPLAY_TYPE_ALIAS_DECLARATIONS: u16 = 3;

/// Normalize the front end's entity taxonomy into the closed symbol set.
pub fn symbol_kind_for_entity(kind: EntityKind, is_parameter: bool) -> ClangSymbolKind {
    match kind {
        EntityKind::Enum => ClangSymbolKind::Enum,
        EntityKind::Struct => ClangSymbolKind::Struct,
        EntityKind::Union => ClangSymbolKind::Union,
        EntityKind::Typedef | EntityKind::TypeAlias => ClangSymbolKind::TypeAlias,
        EntityKind::Function => ClangSymbolKind::Function,
        EntityKind::Variable => {
            if is_parameter {
                ClangSymbolKind::Parameter
            } else {
                ClangSymbolKind::Variable
            }
        }
        EntityKind::Field | EntityKind::ObjCIvar => ClangSymbolKind::Field,
        EntityKind::EnumConstant => ClangSymbolKind::EnumConstant,
        EntityKind::CxxClass | EntityKind::ObjCClass => ClangSymbolKind::Class,
        EntityKind::CxxInterface | EntityKind::ObjCProtocol => ClangSymbolKind::Protocol,
        EntityKind::ObjCCategory => ClangSymbolKind::Extension,
        EntityKind::CxxInstanceMethod | EntityKind::ObjCInstanceMethod => {
            ClangSymbolKind::InstanceMethod
        }
        EntityKind::ObjCClassMethod => ClangSymbolKind::ClassMethod,
        EntityKind::CxxStaticMethod => ClangSymbolKind::StaticMethod,
        EntityKind::ObjCProperty => ClangSymbolKind::InstanceProperty,
        EntityKind::CxxStaticVariable => ClangSymbolKind::StaticProperty,
        EntityKind::CxxNamespace => ClangSymbolKind::Namespace,
        EntityKind::CxxNamespaceAlias => ClangSymbolKind::NamespaceAlias,
        EntityKind::CxxConstructor => ClangSymbolKind::Constructor,
        EntityKind::CxxDestructor => ClangSymbolKind::Destructor,
        EntityKind::CxxConversionFunction => ClangSymbolKind::ConversionFunction,
        EntityKind::Unknown => ClangSymbolKind::Unknown,
    }
}

fn language_id(kind: LanguageKind) -> LanguageId {
    match kind {
        LanguageKind::C => LanguageId::C,
        LanguageKind::Cpp => LanguageId::Cpp,
        LanguageKind::ObjC => LanguageId::ObjC,
        LanguageKind::Unknown => LanguageId::Unknown,
    }
}

/// Builds qualified names from semantic-container chains. Prefixes are
/// memoized per container USR; anonymous containers contribute a
/// placeholder.
#[derive(Default)]
pub struct NamespaceHelper {
    prefixes: gxhash::HashMap<String, String>,
}

impl NamespaceHelper {
    pub fn qualified_name(&mut self, container: Option<&Container>, short_name: &str) -> String {
        let Some(container) = container else {
            return short_name.to_string();
        };
        let mut qualified = self.prefix_of(container);
        qualified.push_str(short_name);
        qualified
    }

    fn prefix_of(&mut self, container: &Container) -> String {
        // Walk up until a memoized ancestor or a non-scope container, then
        // fill prefixes back in top-down.
        let mut chain: Vec<&Container> = Vec::new();
        let mut qualifier = String::new();
        let mut cursor = Some(container);
        while let Some(node) = cursor {
            if node.kind == ContainerKind::TranslationUnit || !node.forms_scope() {
                break;
            }
            if let Some(cached) = self.prefixes.get(&node.usr) {
                qualifier = cached.clone();
                break;
            }
            chain.push(node);
            cursor = node.parent.as_deref();
        }

        for node in chain.into_iter().rev() {
            if !node.name.is_empty() {
                qualifier.push_str(&node.name);
            } else {
                qualifier.push_str(match node.kind {
                    ContainerKind::Class => "(anon class)",
                    ContainerKind::Enum => "(anon enum)",
                    ContainerKind::Struct => "(anon struct)",
                    ContainerKind::Union => "(anon union)",
                    _ => "(anon)",
                });
            }
            qualifier.push_str("::");
            self.prefixes.insert(node.usr.clone(), qualifier.clone());
        }
        qualifier
    }
}

#[derive(Debug, Clone)]
struct CachedConstructor {
    usr: Usr,
    param_type_descs: Vec<String>,
}

/// Records every constructor declaration seen during one parse, indexed or
/// not, so `make_*` factory calls can be attributed to the constructor
/// whose parameter types best match the call.
#[derive(Default)]
pub struct ConstructorCache {
    constructors: gxhash::HashMap<Usr, Vec<CachedConstructor>>,
}

impl ConstructorCache {
    pub fn notify_constructor(
        &mut self,
        declaring_type_usr: Usr,
        ctor_usr: Usr,
        param_type_descs: Vec<String>,
    ) {
        self.constructors
            .entry(declaring_type_usr)
            .or_default()
            .push(CachedConstructor {
                usr: ctor_usr,
                param_type_descs,
            });
    }

    /// Best-match constructor for a call with the given argument type
    /// spellings. Matching arity dominates; ties break on common type
    /// prefixes (clang appends qualifiers, so `Foo` vs `Foo *&&` still
    /// scores).
    pub fn try_find_constructor(&self, type_usr: Usr, call_type_descs: &[String]) -> Option<Usr> {
        let ctors = self.constructors.get(&type_usr)?;
        let mut best_usr = ctors.first()?.usr;
        let mut best_score = i32::MIN;

        for ctor in ctors {
            if call_type_descs.is_empty() && ctor.param_type_descs.is_empty() {
                return Some(ctor.usr);
            }

            let mut score = 0;
            if call_type_descs.len() == ctor.param_type_descs.len() {
                score += call_type_descs.len() as i32 * 1000;
            }
            for (call, param) in call_type_descs.iter().zip(&ctor.param_type_descs) {
                score += matching_prefix_score(call, param);
            }

            if score > best_score {
                best_usr = ctor.usr;
                best_score = score;
            }
        }

        Some(best_usr)
    }
}

/// Splice a qualified name into a function type description, which looks
/// like `void (int) const`: the name goes right before the first `(`.
pub fn function_signature(type_desc: &str, qualified_name: &str) -> String {
    match type_desc.find('(') {
        Some(paren) => {
            let mut signature = type_desc[..paren].trim_end().to_string();
            concat_type_and_name(&mut signature, qualified_name);
            signature.push_str(&type_desc[paren..]);
            signature
        }
        None => {
            let mut signature = type_desc.to_string();
            concat_type_and_name(&mut signature, qualified_name);
            signature
        }
    }
}

/// Whether the source text contains `name` as a whole identifier token.
/// Used to distinguish spelled-out calls from implicit ones.
fn tokens_contain_name(source: &str, name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    let mut start = None;
    for (i, c) in source.char_indices() {
        if c.is_alphanumeric() || c == '_' {
            start.get_or_insert(i);
        } else {
            if let Some(s) = start.take() {
                if &source[s..i] == name {
                    return true;
                }
            }
        }
    }
    matches!(start, Some(s) if &source[s..] == name)
}

/// Mutable state threaded through every callback of one parse, apart from
/// the file consumer (kept separate so an index borrow does not lock the
/// rest of the state).
struct IndexContext {
    ns: NamespaceHelper,
    ctors: ConstructorCache,
    file_contents: FileContentsMap,
}

struct IndexParam {
    consumer: FileConsumer,
    ctx: IndexContext,
    seen_files: Vec<String>,
    file_modification_times: gxhash::HashMap<String, i64>,
}

impl IndexParam {
    /// Route an event's file through ownership arbitration. Returns true
    /// when this TU owns the file and events for it should be indexed.
    fn consume_file(&mut self, tu: &TranslationUnit, path: &str) -> bool {
        if path.is_empty() {
            return false;
        }

        if !self.seen_files.iter().any(|seen| seen == path) {
            self.seen_files.push(path.to_string());
            match crate::cache::modification_time(std::path::Path::new(path)) {
                Some(mtime) => {
                    self.file_modification_times.insert(path.to_string(), mtime);
                }
                None => tracing::debug!("no modification time for {}", path),
            }
        }

        match self.consumer.claim(path) {
            Claim::NotOwned => false,
            Claim::AlreadyOwned => true,
            Claim::NewlyOwned => {
                // First ownership: capture contents (unless an unsaved
                // buffer already provided them) and the preprocessor-skipped
                // ranges, moving each start back onto the '#'.
                if !self.ctx.file_contents.contains_key(path) {
                    match std::fs::read_to_string(path) {
                        Ok(content) => {
                            self.ctx
                                .file_contents
                                .insert(path.to_string(), FileContents::new(path, content));
                        }
                        Err(e) => tracing::warn!("failed to read contents of {}: {}", path, e),
                    }
                }

                let index = self.consumer.file_mut(path).unwrap();
                for (skip_file, range) in &tu.skipped_ranges {
                    if skip_file == path {
                        let mut adjusted = *range;
                        adjusted.start.column = adjusted.start.column.saturating_sub(1).max(1);
                        index.skipped_by_preprocessor.push(adjusted);
                    }
                }
                true
            }
        }
    }
}

/// Add a `uses` entry on every type referenced from a declaration's
/// `TypeRef`/`TemplateRef` children and return the first referenced type.
///
/// The last child is skipped for members defined out-of-line with respect
/// to their parent type (`S1* Foo::foo() {}` ends with an uninteresting
/// `TypeRef class Foo`).
fn add_decl_type_usages(
    index: &mut IndexFile,
    type_refs: &[TypeRefChild],
    semantic_container: Option<&Container>,
    lexical_container: Option<&Container>,
) -> Option<TypeId> {
    let semantic_is_type = semantic_container.is_some_and(Container::is_type_definition);
    let lexical_is_type = lexical_container.is_some_and(Container::is_type_definition);
    let process_last = !(semantic_is_type && !lexical_is_type);

    let count = if process_last {
        type_refs.len()
    } else {
        type_refs.len().saturating_sub(1)
    };

    let mut initial_type = None;
    for child in &type_refs[..count] {
        if child.usr.is_empty() {
            continue;
        }
        let type_id = index.type_id(hash_usr(&child.usr));
        initial_type.get_or_insert(type_id);
        unique_add(&mut index.ty_mut(type_id).uses, child.spelling);
    }
    initial_type
}

/// Fill in the name/type detail of a variable: detailed name, hover and,
/// on first sight, the variable-type edge and instance backlink.
#[allow(clippy::too_many_arguments)]
fn set_var_detail(
    index: &mut IndexFile,
    ctx: &mut IndexContext,
    var_id: VarId,
    event_file: &str,
    spelling: Range,
    extent: Range,
    var_type: Option<&crate::frontend::VarTypeInfo>,
    enum_value: Option<EnumValue>,
    semantic_container: Option<&Container>,
    is_first_seen: bool,
) {
    let short_name = index.var(var_id).def.short_name.clone();

    let mut type_name = var_type.map(|t| t.spelling.clone()).unwrap_or_default();
    // clang reports "(lambda at foo.cc:12:3)"; shorten to just "lambda".
    if type_name.contains("(lambda at") {
        type_name = "lambda".to_string();
    }

    let qualified_name = ctx.ns.qualified_name(semantic_container, &short_name);

    let is_enum_member =
        semantic_container.is_some_and(|container| container.kind == ContainerKind::Enum);

    if is_enum_member && enum_value.is_some() {
        let value_text = match enum_value.unwrap() {
            EnumValue::Signed(v) => v.to_string(),
            EnumValue::Unsigned(v) => v.to_string(),
        };
        let var = index.var_mut(var_id);
        var.def.hover = Some(format!("{} = {}", qualified_name, value_text));
        var.def.detailed_name = qualified_name;
    } else {
        let mut detailed_name = type_name;
        concat_type_and_name(&mut detailed_name, &qualified_name);

        // Hover carries the initializer tail for plainly-typed variables
        // only; function pointers, arrays and `auto` read inside-out and
        // splice badly.
        let mut hover = None;
        if var_type.is_some_and(|t| t.is_plain) {
            if let Some(contents) = ctx.file_contents.get(event_file) {
                if let Some(tail) = contents.slice_between(spelling, extent) {
                    hover = Some(format!("{}{}", detailed_name, tail));
                }
            }
        }

        let var = index.var_mut(var_id);
        var.def.detailed_name = detailed_name;
        if hover.is_some() {
            var.def.hover = hover;
        }
    }

    if is_first_seen {
        if let Some(type_usr) = var_type.map(|t| t.declaration_usr.as_str()) {
            if !type_usr.is_empty() {
                let type_id = index.type_id(hash_usr(type_usr));
                // Enum definition variables are not instantiations of the
                // enum.
                if !is_enum_member {
                    index.ty_mut(type_id).instances.push(var_id);
                }
                index.var_mut(var_id).def.variable_type = Some(type_id);
            }
        }
    }
}

fn on_var_declaration(index: &mut IndexFile, ctx: &mut IndexContext, decl: &DeclEvent) {
    let var_id = index.var_id(hash_usr(&decl.usr));

    {
        let var = index.var_mut(var_id);
        var.def.short_name = decl.name.clone().unwrap_or_default();
        var.def.kind = symbol_kind_for_entity(decl.kind, decl.is_parameter);
        var.def.comments = decl.comments.clone();
        var.def.is_local = decl.is_parameter
            || decl
                .semantic_container
                .as_ref()
                .is_some_and(|c| c.kind == ContainerKind::Function);
    }

    set_var_detail(
        index,
        ctx,
        var_id,
        &decl.file,
        decl.spelling,
        decl.extent,
        decl.var_type.as_ref(),
        decl.enum_value,
        decl.semantic_container.as_ref(),
        !decl.is_redeclaration,
    );

    {
        let var = index.var_mut(var_id);
        if decl.is_definition {
            var.def.definition_spelling = Some(decl.spelling);
            var.def.definition_extent = Some(decl.extent);
        } else {
            var.def.declaration = Some(decl.spelling);
        }
        unique_add(&mut var.uses, decl.spelling);
    }

    // Initializer expressions reference other variables; record a use on
    // each.
    for init_use in &decl.initializer_uses {
        if init_use.usr.is_empty() {
            continue;
        }
        let ref_id = index.var_id(hash_usr(&init_use.usr));
        unique_add(&mut index.var_mut(ref_id).uses, init_use.spelling);
    }

    add_decl_type_usages(
        index,
        &decl.type_refs,
        decl.semantic_container.as_ref(),
        decl.lexical_container.as_ref(),
    );

    if decl.is_definition
        && decl
            .semantic_container
            .as_ref()
            .is_some_and(Container::is_type_definition)
    {
        let container = decl.semantic_container.as_ref().unwrap();
        let declaring_type_id = index.type_id(hash_usr(&container.usr));
        index.var_mut(var_id).def.declaring_type = Some(declaring_type_id);
        index.ty_mut(declaring_type_id).def.vars.push(var_id);
    }
}

fn on_func_declaration(index: &mut IndexFile, ctx: &mut IndexContext, decl: &DeclEvent) {
    let is_template_specialization = decl.specialization_of.is_some();
    let resolved_usr = decl.specialization_of.as_deref().unwrap_or(&decl.usr);
    let func_id = index.func_id(hash_usr(resolved_usr));

    {
        let func = index.func_mut(func_id);
        func.def.comments = decl.comments.clone();
        func.def.kind = symbol_kind_for_entity(decl.kind, false);
    }

    // The return type is not stored, but it is an interesting usage.
    add_decl_type_usages(
        index,
        &decl.type_refs,
        decl.semantic_container.as_ref(),
        decl.lexical_container.as_ref(),
    );

    // Template specializations are linked as declarations even though they
    // are technically definitions.
    if decl.is_definition && !is_template_specialization {
        let func = index.func_mut(func_id);
        func.def.definition_spelling = Some(decl.spelling);
        func.def.definition_extent = Some(decl.extent);
    } else {
        let content = ctx
            .file_contents
            .get(&decl.file)
            .and_then(|contents| contents.slice(decl.extent))
            .unwrap_or_default()
            .to_string();

        let mut param_spellings = Vec::new();
        for param in &decl.params {
            let mut spelling = param.spelling;
            // Unnamed parameters come back with a 1-column range; shrink it
            // to a point.
            if param.name.is_empty()
                && spelling.start.line == spelling.end.line
                && spelling.start.column + 1 == spelling.end.column
            {
                spelling.end.column -= 1;
            }
            param_spellings.push(spelling);
        }

        index
            .func_mut(func_id)
            .declarations
            .push(crate::index_file::FuncDeclaration {
                spelling: decl.spelling,
                extent: decl.extent,
                content,
                param_spellings,
            });
    }

    if !is_template_specialization {
        let short_name = decl.name.clone().unwrap_or_default();
        let qualified_name = ctx
            .ns
            .qualified_name(decl.semantic_container.as_ref(), &short_name);

        {
            let func = index.func_mut(func_id);
            func.def.is_operator = short_name.starts_with("operator");
            func.def.short_name = short_name;
            func.def.detailed_name = function_signature(
                decl.func_type_desc.as_deref().unwrap_or(""),
                &qualified_name,
            );
        }

        if decl
            .semantic_container
            .as_ref()
            .is_some_and(Container::is_type_definition)
        {
            let container = decl.semantic_container.as_ref().unwrap();
            let declaring_type_id = index.type_id(hash_usr(&container.usr));
            index.func_mut(func_id).def.declaring_type = Some(declaring_type_id);

            // A constructor or destructor name is also a reference to the
            // declaring type; skip the leading '~' for destructors.
            if decl.kind == EntityKind::CxxConstructor {
                unique_add(&mut index.ty_mut(declaring_type_id).uses, decl.spelling);
            }
            if decl.kind == EntityKind::CxxDestructor {
                let mut dtor_type_range = decl.spelling;
                dtor_type_range.start.column += 1;
                unique_add(&mut index.ty_mut(declaring_type_id).uses, dtor_type_range);
            }

            unique_add(&mut index.ty_mut(declaring_type_id).def.funcs, func_id);
        }

        if decl.is_virtual {
            for overridden in &decl.overridden_usrs {
                let parent_id = index.func_id(hash_usr(overridden));
                index.func_mut(func_id).def.base.push(parent_id);
                index.func_mut(parent_id).derived.push(func_id);
            }
        }
    }
}

fn on_type_declaration(index: &mut IndexFile, ctx: &mut IndexContext, decl: &DeclEvent) {
    let is_alias = matches!(decl.kind, EntityKind::Typedef | EntityKind::TypeAlias);

    if is_alias {
        // The first TypeRef child is what the alias refers to.
        let alias_of = add_decl_type_usages(
            index,
            &decl.type_refs,
            decl.semantic_container.as_ref(),
            decl.lexical_container.as_ref(),
        );

        let type_id = index.type_id(hash_usr(&decl.usr));
        let short_name = decl.name.clone().unwrap_or_default();
        let detailed_name = ctx
            .ns
            .qualified_name(decl.semantic_container.as_ref(), &short_name);

        // For short aliases, hover shows the declaration with the spelled
        // name replaced by the qualified name.
        let mut hover = None;
        if decl.extent.end.line - decl.extent.start.line < MAX_LINES_DISPLAY_TYPE_ALIAS_DECLARATIONS
        {
            if let Some(contents) = ctx.file_contents.get(&decl.file) {
                let offsets = (
                    contents.to_offset(decl.extent.start),
                    contents.to_offset(decl.spelling.start),
                    contents.to_offset(decl.spelling.end),
                    contents.to_offset(decl.extent.end),
                );
                if let (Some(extent_start), Some(spell_start), Some(spell_end), Some(extent_end)) =
                    offsets
                {
                    if extent_start <= spell_start && spell_end <= extent_end {
                        hover = Some(format!(
                            "{}{}{}",
                            &contents.content[extent_start..spell_start],
                            detailed_name,
                            &contents.content[spell_end..extent_end]
                        ));
                    }
                }
            }
        }

        let ty = index.ty_mut(type_id);
        ty.def.alias_of = alias_of;
        ty.def.short_name = short_name;
        ty.def.detailed_name = detailed_name;
        ty.def.kind = symbol_kind_for_entity(decl.kind, false);
        ty.def.comments = decl.comments.clone();
        ty.def.definition_spelling = Some(decl.spelling);
        ty.def.definition_extent = Some(decl.extent);
        if hover.is_some() {
            ty.def.hover = hover;
        }
        unique_add(&mut ty.uses, decl.spelling);
        return;
    }

    let type_id = index.type_id(hash_usr(&decl.usr));
    let short_name = decl
        .name
        .clone()
        .unwrap_or_else(|| "<anonymous>".to_string());
    let detailed_name = ctx
        .ns
        .qualified_name(decl.semantic_container.as_ref(), &short_name);

    {
        let ty = index.ty_mut(type_id);
        ty.def.short_name = short_name;
        ty.def.detailed_name = detailed_name;
        ty.def.kind = symbol_kind_for_entity(decl.kind, false);
        ty.def.comments = decl.comments.clone();
        if decl.is_definition {
            ty.def.definition_spelling = Some(decl.spelling);
            ty.def.definition_extent = Some(decl.extent);
        }
        unique_add(&mut ty.uses, decl.spelling);
    }

    for base in &decl.bases {
        add_decl_type_usages(
            index,
            &base.type_refs,
            decl.semantic_container.as_ref(),
            decl.lexical_container.as_ref(),
        );
        if base.declaration_usr.is_empty() {
            continue;
        }
        let parent_type_id = index.type_id(hash_usr(&base.declaration_usr));
        index.ty_mut(parent_type_id).derived.push(type_id);
        index.ty_mut(type_id).def.parents.push(parent_type_id);
    }
}

fn on_declaration(param: &mut IndexParam, tu: &TranslationUnit, decl: &DeclEvent) {
    // Constructor declarations feed the make_* matcher whether or not this
    // TU owns the declaring file.
    if decl.kind == EntityKind::CxxConstructor {
        if let Some(container) = &decl.semantic_container {
            param.ctx.ctors.notify_constructor(
                hash_usr(&container.usr),
                hash_usr(&decl.usr),
                decl.ctor_param_type_descs.clone(),
            );
        }
    }

    if !param.consume_file(tu, &decl.file) {
        return;
    }

    // Language upgrades monotonically; a header first seen from C stays
    // Cpp once any C++ declaration lands in it.
    let decl_language = language_id(decl.language);
    {
        let index = param.consumer.file_mut(&decl.file).unwrap();
        if decl_language > index.language {
            index.language = decl_language;
        }
    }

    let IndexParam { consumer, ctx, .. } = param;
    let index = consumer.file_mut(&decl.file).unwrap();

    match decl.kind {
        EntityKind::CxxNamespace | EntityKind::CxxNamespaceAlias => {}
        _ if decl.kind.is_var() => {
            // Implicit template instantiations shadow their template
            // definition; skip them.
            if decl.is_implicit_instantiation {
                return;
            }
            on_var_declaration(index, ctx, decl);
        }
        _ if decl.kind.is_func() => on_func_declaration(index, ctx, decl),
        _ if decl.kind.is_type() => on_type_declaration(index, ctx, decl),
        _ => {
            tracing::debug!(
                "unhandled declaration kind {:?} for {} at {}",
                decl.kind,
                decl.usr,
                decl.spelling
            );
        }
    }
}

fn on_var_reference(index: &mut IndexFile, ctx: &mut IndexContext, event: &RefEvent) {
    // Dependent member accesses have no useful spelling range; fall back to
    // the wider extent, which later, more specific references override.
    let loc = if event.spelling_is_empty {
        event.extent
    } else {
        event.spelling
    };

    let var_id = index.var_id(hash_usr(&event.referenced_usr));

    // Lambda parameters never get a declaration event; promote the first
    // same-file reference to a definition.
    if index.var(var_id).def.short_name.is_empty() {
        if let Some(decl) = &event.referenced_decl {
            if decl.file == event.file {
                {
                    let var = index.var_mut(var_id);
                    var.def.definition_spelling = Some(decl.spelling);
                    var.def.definition_extent = Some(decl.extent);
                    var.def.short_name = decl.name.clone();
                    var.def.kind = ClangSymbolKind::Parameter;
                    var.def.is_local = true;
                }
                set_var_detail(
                    index,
                    ctx,
                    var_id,
                    &decl.file,
                    decl.spelling,
                    decl.extent,
                    decl.var_type.as_ref(),
                    None,
                    None,
                    true,
                );
                let spelling = decl.spelling;
                unique_add(&mut index.var_mut(var_id).uses, spelling);
            }
        }
    }

    unique_add(&mut index.var_mut(var_id).uses, loc);
}

fn on_func_reference(index: &mut IndexFile, ctx: &mut IndexContext, event: &RefEvent) {
    let called_id = index.func_id(hash_usr(&event.referenced_usr));
    let called_short_name = index.func(called_id).def.short_name.clone();

    // The front end only flags implicit calls for Objective-C, so decide
    // ourselves: the callee kind must permit implicit invocation and its
    // name must not be spelled at the call site. An empty short name (an
    // implicit move constructor, say) is always implicit; an explicit
    // destructor call spells `~` while the short name is `~A`, which is
    // not a token match, so destructors are exempted from the token scan.
    let tokens = ctx
        .file_contents
        .get(&event.file)
        .and_then(|contents| contents.slice(event.extent))
        .unwrap_or("");
    let is_implicit = event.referenced_kind.can_be_called_implicitly()
        && (called_short_name.is_empty()
            || (!called_short_name.starts_with('~')
                && !tokens_contain_name(tokens, &called_short_name)));

    let loc = if is_implicit || event.spelling_is_empty {
        event.extent
    } else {
        event.spelling
    };

    match event.container.as_ref().filter(|c| c.is_function_like) {
        Some(container) => {
            let caller_id = index.func_id(hash_usr(&container.usr));
            add_func_ref(
                &mut index.func_mut(caller_id).def.callees,
                IndexFuncRef::new(Some(called_id), loc, is_implicit),
            );
            add_func_ref(
                &mut index.func_mut(called_id).callers,
                IndexFuncRef::new(Some(caller_id), loc, is_implicit),
            );
        }
        None => {
            add_func_ref(
                &mut index.func_mut(called_id).callers,
                IndexFuncRef::new(None, loc, is_implicit),
            );
        }
    }

    // make_unique<T>(...) and friends: attribute an implicit call to the
    // best-matching constructor of the constructed type.
    let is_make_call = event
        .referenced_name
        .as_deref()
        .is_some_and(|name| name.len() >= 4 && name[..4].eq_ignore_ascii_case("make"));
    if event.referenced_is_template && is_make_call {
        if let Some(ctor_type_usr) = event.first_type_ref_usr.as_deref() {
            if let Some(ctor_usr) = ctx
                .ctors
                .try_find_constructor(hash_usr(ctor_type_usr), &event.call_arg_type_descs)
            {
                let ctor_id = index.func_id(ctor_usr);
                add_func_ref(
                    &mut index.func_mut(ctor_id).callers,
                    IndexFuncRef::new(None, loc, true),
                );
            }
        }
    }
}

fn on_reference(param: &mut IndexParam, tu: &TranslationUnit, event: &RefEvent) {
    if !param.consume_file(tu, &event.file) {
        return;
    }
    let IndexParam { consumer, ctx, .. } = param;
    let index = consumer.file_mut(&event.file).unwrap();

    match event.referenced_kind {
        // Namespace usages are not indexed.
        EntityKind::CxxNamespace | EntityKind::CxxNamespaceAlias => {}
        kind if kind.is_var() => on_var_reference(index, ctx, event),
        kind if kind.is_func() => on_func_reference(index, ctx, event),
        kind if kind.is_type() => {
            let type_id = index.type_id(hash_usr(&event.referenced_usr));
            unique_add(&mut index.ty_mut(type_id).uses, event.spelling);
        }
        kind => {
            tracing::debug!(
                "unhandled reference kind {:?} for {} at {}",
                kind,
                event.referenced_usr,
                event.spelling
            );
        }
    }
}

fn on_include(param: &mut IndexParam, tu: &TranslationUnit, event: &IncludeEvent) {
    if !param.consume_file(tu, &event.file) {
        return;
    }
    if event.resolved_path.is_empty() {
        return;
    }
    let index = param.consumer.file_mut(&event.file).unwrap();
    index.includes.push(IndexInclude {
        line: event.line,
        resolved_path: event.resolved_path.clone(),
    });
}

fn on_diagnostic(param: &mut IndexParam, tu: &TranslationUnit, event: &DiagnosticEvent) {
    // Skip diagnostics with no position; they cannot be attributed.
    let range = event.diagnostic.range;
    if range.start.line == 0 && range.start.column == 0 {
        return;
    }
    if !param.consume_file(tu, &event.file) {
        return;
    }
    let index = param.consumer.file_mut(&event.file).unwrap();
    index.diagnostics.push(event.diagnostic.clone());
}

fn on_macro(param: &mut IndexParam, tu: &TranslationUnit, event: &MacroEvent) {
    if !param.consume_file(tu, &event.file) {
        return;
    }
    let IndexParam { consumer, ctx, .. } = param;
    let index = consumer.file_mut(&event.file).unwrap();

    let var_id = index.var_id(hash_usr(&event.usr));
    unique_add(&mut index.var_mut(var_id).uses, event.spelling);

    if event.kind == MacroEventKind::Definition {
        let body = ctx
            .file_contents
            .get(&event.file)
            .and_then(|contents| contents.slice(event.extent))
            .unwrap_or(&event.name);
        let hover = format!("#define {}", body);

        let var = index.var_mut(var_id);
        var.def.short_name = event.name.clone();
        var.def.detailed_name = event.name.clone();
        var.def.hover = Some(hover);
        var.def.kind = ClangSymbolKind::Macro;
        var.def.is_macro = true;
        var.def.comments = event.comments.clone();
        var.def.definition_spelling = Some(event.spelling);
        var.def.definition_extent = Some(event.extent);
    }
}

/// Run the indexer over one parsed translation unit and return the indexes
/// of every file this TU owns.
pub fn index_translation_unit(
    file_consumer_shared: &Arc<FileConsumerSharedState>,
    request: &ParseRequest,
    tu: &TranslationUnit,
) -> Vec<IndexFile> {
    let mut param = IndexParam {
        consumer: FileConsumer::new(file_consumer_shared.clone(), request.path.clone()),
        ctx: IndexContext {
            ns: NamespaceHelper::default(),
            ctors: ConstructorCache::default(),
            file_contents: FileContentsMap::default(),
        },
        seen_files: Vec::new(),
        file_modification_times: gxhash::HashMap::default(),
    };

    for (path, content) in &request.unsaved {
        param
            .ctx
            .file_contents
            .insert(path.clone(), FileContents::new(path, content.clone()));
    }

    // Claim the primary file up front so this TU owns its own index even
    // when the event stream leads with a header.
    param.consume_file(tu, &request.path);

    for event in &tu.events {
        match event {
            ParseEvent::Declaration(decl) => on_declaration(&mut param, tu, decl),
            ParseEvent::Reference(reference) => on_reference(&mut param, tu, reference),
            ParseEvent::Include(include) => on_include(&mut param, tu, include),
            ParseEvent::Diagnostic(diagnostic) => on_diagnostic(&mut param, tu, diagnostic),
        }
    }

    for macro_event in &tu.macros {
        on_macro(&mut param, tu, macro_event);
    }

    finalize(param, request)
}

fn finalize(param: IndexParam, request: &ParseRequest) -> Vec<IndexFile> {
    let IndexParam {
        consumer,
        seen_files,
        file_modification_times,
        ..
    } = param;

    let mut result = consumer.take_local_state();

    // Map resolved include targets back to the include line in the primary
    // file so header errors can be surfaced there.
    let include_lines: gxhash::HashMap<String, u32> = result
        .iter()
        .find(|index| index.path == request.path)
        .map(|primary| {
            primary
                .includes
                .iter()
                .map(|include| (include.resolved_path.clone(), include.line))
                .collect()
        })
        .unwrap_or_default();

    let mut surfaced: Vec<crate::types::Diagnostic> = Vec::new();
    for index in &result {
        if index.path == request.path {
            continue;
        }
        let Some(&line) = include_lines.get(&index.path) else {
            continue;
        };
        // One representative error per include is enough.
        if let Some(diagnostic) = index
            .diagnostics
            .iter()
            .find(|d| d.severity == DiagnosticSeverity::Error)
        {
            let mut at_include = diagnostic.clone();
            at_include.range = Range::new(
                Position::new(line as u16, 10),
                Position::new(line as u16, 10),
            );
            surfaced.push(at_include);
        }
    }

    for index in &mut result {
        index.import_file = request.path.clone();
        index.args = request.args.clone();
        if let Some(&mtime) = file_modification_times.get(&index.path) {
            index.last_modification_time = mtime;
        }
        index.dependencies = seen_files
            .iter()
            .filter(|seen| **seen != index.path)
            .cloned()
            .collect();
        if index.path == request.path {
            index.diagnostics.extend(surfaced.iter().cloned());
        }
    }

    result
}

/// Parse and index one request end to end. Parse failures log and yield an
/// empty result; the request is otherwise a no-op.
pub fn parse_and_index(
    front_end: &dyn ParseFrontEnd,
    file_consumer_shared: &Arc<FileConsumerSharedState>,
    request: &ParseRequest,
    perf: &mut PerformanceImportFile,
) -> Vec<IndexFile> {
    let start = Instant::now();
    let tu = match front_end.parse(request) {
        Ok(tu) => tu,
        Err(e) => {
            tracing::warn!("front end failed to parse {}: {}", request.path, e);
            return Vec::new();
        }
    };
    perf.index_parse_us = start.elapsed().as_micros() as u64;

    let build_start = Instant::now();
    let result = index_translation_unit(file_consumer_shared, request, &tu);
    perf.index_build_us = build_start.elapsed().as_micros() as u64;
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::VarTypeInfo;

    fn container(kind: ContainerKind, usr: &str, name: &str) -> Container {
        Container {
            kind,
            usr: usr.to_string(),
            name: name.to_string(),
            parent: None,
        }
    }

    #[test]
    fn symbol_kinds_normalize() {
        assert_eq!(
            symbol_kind_for_entity(EntityKind::Typedef, false),
            ClangSymbolKind::TypeAlias
        );
        assert_eq!(
            symbol_kind_for_entity(EntityKind::TypeAlias, false),
            ClangSymbolKind::TypeAlias
        );
        assert_eq!(
            symbol_kind_for_entity(EntityKind::ObjCIvar, false),
            ClangSymbolKind::Field
        );
        assert_eq!(
            symbol_kind_for_entity(EntityKind::Variable, true),
            ClangSymbolKind::Parameter
        );
        assert_eq!(
            symbol_kind_for_entity(EntityKind::CxxStaticVariable, false),
            ClangSymbolKind::StaticProperty
        );
    }

    #[test]
    fn qualified_names_memoize_and_handle_anonymous_containers() {
        let mut ns = NamespaceHelper::default();

        let inner = Container {
            kind: ContainerKind::Struct,
            usr: "c:@N@outer@S@Inner".to_string(),
            name: "Inner".to_string(),
            parent: Some(Box::new(container(
                ContainerKind::Namespace,
                "c:@N@outer",
                "outer",
            ))),
        };
        assert_eq!(ns.qualified_name(Some(&inner), "x"), "outer::Inner::x");
        // Memoized prefix reused.
        assert_eq!(ns.qualified_name(Some(&inner), "y"), "outer::Inner::y");

        let anon = Container {
            kind: ContainerKind::Union,
            usr: "c:@Ua".to_string(),
            name: String::new(),
            parent: None,
        };
        assert_eq!(ns.qualified_name(Some(&anon), "u"), "(anon union)::u");

        // Function containers do not form scopes.
        let func = container(ContainerKind::Function, "c:@F@f", "f");
        assert_eq!(ns.qualified_name(Some(&func), "local"), "local");
    }

    #[test]
    fn constructor_cache_prefers_matching_arity() {
        let mut ctors = ConstructorCache::default();
        let type_usr = hash_usr("c:@S@Foo");
        let default_ctor = hash_usr("c:@S@Foo@F@Foo#");
        let int_ctor = hash_usr("c:@S@Foo@F@Foo#I#");
        ctors.notify_constructor(type_usr, default_ctor, vec![]);
        ctors.notify_constructor(type_usr, int_ctor, vec!["int".to_string()]);

        assert_eq!(ctors.try_find_constructor(type_usr, &[]), Some(default_ctor));
        assert_eq!(
            ctors.try_find_constructor(type_usr, &["int".to_string()]),
            Some(int_ctor)
        );
        assert_eq!(ctors.try_find_constructor(hash_usr("c:@S@Bar"), &[]), None);
    }

    #[test]
    fn function_signature_splices_before_paren() {
        assert_eq!(
            function_signature("void () const", "Foo::foo"),
            "void Foo::foo() const"
        );
        assert_eq!(
            function_signature("int (int, char)", "max"),
            "int max(int, char)"
        );
        assert_eq!(function_signature("Foo *()", "get"), "Foo *get()");
    }

    #[test]
    fn token_scan_matches_whole_identifiers_only() {
        assert!(tokens_contain_name("Type foo;", "Type"));
        assert!(!tokens_contain_name("TypeX foo;", "Type"));
        assert!(tokens_contain_name("auto x = Type()", "Type"));
        assert!(!tokens_contain_name("auto x = f()", "Type"));
    }

    #[test]
    fn decl_type_usages_skip_last_ref_for_out_of_line_members() {
        // For `T1* Foo::foo() {}` the children are a TypeRef to T1 then a
        // TypeRef to Foo; the trailing Foo ref is uninteresting.
        let mut index = IndexFile::new("a.cc");
        let refs = vec![
            TypeRefChild {
                usr: "c:@S@T1".to_string(),
                spelling: Range::spanning(5, 1, 5, 3),
            },
            TypeRefChild {
                usr: "c:@S@Foo".to_string(),
                spelling: Range::spanning(5, 5, 5, 8),
            },
        ];
        let semantic = container(ContainerKind::Struct, "c:@S@Foo", "Foo");
        let lexical = container(ContainerKind::TranslationUnit, "", "");

        let initial = add_decl_type_usages(&mut index, &refs, Some(&semantic), Some(&lexical));
        let t1 = index.find_type("").unwrap(); // no names set; look up by usr
        assert_eq!(t1.usr, hash_usr("c:@S@T1"));
        assert_eq!(initial, Some(t1.id));
        assert_eq!(t1.uses, vec![Range::spanning(5, 1, 5, 3)]);
        // The trailing Foo ref was skipped entirely, so only T1 has a slot.
        assert_eq!(index.types.len(), 1);
    }

    #[test]
    fn var_type_info_lambda_spellings_collapse() {
        let mut index = IndexFile::new("a.cc");
        let mut ctx = IndexContext {
            ns: NamespaceHelper::default(),
            ctors: ConstructorCache::default(),
            file_contents: FileContentsMap::default(),
        };
        let var_id = index.var_id(hash_usr("c:@x"));
        index.var_mut(var_id).def.short_name = "f".to_string();
        set_var_detail(
            &mut index,
            &mut ctx,
            var_id,
            "a.cc",
            Range::spanning(1, 6, 1, 7),
            Range::spanning(1, 1, 1, 20),
            Some(&VarTypeInfo {
                spelling: "(lambda at a.cc:1:9)".to_string(),
                declaration_usr: String::new(),
                is_plain: false,
            }),
            None,
            None,
            true,
        );
        assert_eq!(index.var(var_id).def.detailed_name, "lambda f");
    }
}
