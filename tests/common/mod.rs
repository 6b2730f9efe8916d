// SPDX-License-Identifier: MIT OR Apache-2.0
//! Shared fixtures for the indexer and pipeline integration tests.

#![allow(dead_code)]

use semindex::file_consumer::FileConsumerSharedState;
use semindex::frontend::{
    Container, ContainerKind, DeclEvent, EntityKind, ParseEvent, ParseRequest, RefContainer,
    RefEvent, TranslationUnit,
};
use semindex::indexer;
use semindex::types::Range;
use semindex::IndexFile;

/// Index one canned translation unit with its source provided as an
/// unsaved buffer, the way an interactive request would.
pub fn index_tu(path: &str, source: &str, tu: TranslationUnit) -> Vec<IndexFile> {
    let shared = FileConsumerSharedState::new();
    let request = ParseRequest {
        path: path.to_string(),
        args: vec!["-xc++".to_string()],
        unsaved: vec![(path.to_string(), source.to_string())],
    };
    indexer::index_translation_unit(&shared, &request, &tu)
}

/// The single owned index for `path` out of an indexing result.
pub fn index_for<'a>(indexes: &'a [IndexFile], path: &str) -> &'a IndexFile {
    indexes
        .iter()
        .find(|index| index.path == path)
        .unwrap_or_else(|| panic!("no index produced for {path}"))
}

pub fn type_container(usr: &str, name: &str, kind: ContainerKind) -> Container {
    Container {
        kind,
        usr: usr.to_string(),
        name: name.to_string(),
        parent: None,
    }
}

pub fn function_container(usr: &str) -> RefContainer {
    RefContainer {
        usr: usr.to_string(),
        is_function_like: true,
    }
}

/// A definition event for a class/struct.
pub fn class_def(file: &str, usr: &str, name: &str, spelling: Range, extent: Range) -> DeclEvent {
    let mut decl = DeclEvent::named(file, usr, name, EntityKind::CxxClass);
    decl.is_definition = true;
    decl.spelling = spelling;
    decl.extent = extent;
    decl
}

/// A free-function definition event.
pub fn function_def(
    file: &str,
    usr: &str,
    name: &str,
    type_desc: &str,
    spelling: Range,
    extent: Range,
) -> DeclEvent {
    let mut decl = DeclEvent::named(file, usr, name, EntityKind::Function);
    decl.is_definition = true;
    decl.func_type_desc = Some(type_desc.to_string());
    decl.spelling = spelling;
    decl.extent = extent;
    decl
}

/// A call reference inside the body of `caller_usr`.
pub fn call_ref(
    file: &str,
    callee_usr: &str,
    callee_kind: EntityKind,
    callee_name: &str,
    caller_usr: &str,
    spelling: Range,
    extent: Range,
) -> RefEvent {
    let mut reference = RefEvent::to_entity(file, callee_usr, callee_kind, spelling);
    reference.extent = extent;
    reference.referenced_name = Some(callee_name.to_string());
    reference.container = Some(function_container(caller_usr));
    reference
}

pub fn events(decls: Vec<DeclEvent>, refs: Vec<RefEvent>) -> TranslationUnit {
    TranslationUnit {
        events: decls
            .into_iter()
            .map(ParseEvent::Declaration)
            .chain(refs.into_iter().map(ParseEvent::Reference))
            .collect(),
        ..Default::default()
    }
}
