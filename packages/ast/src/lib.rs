//! # MiniScript AST
//!
//! Syntax tree consumed by the inference engine. Trees come from an external
//! parser, either in-process through [`AstBuilder`] or as JSON through
//! [`from_json`].

pub mod ast;
pub mod block;
pub mod builder;
pub mod error;
pub mod id_generator;
pub mod visitor;

pub use ast::*;
pub use block::{collect_blocks, Binding, Block, BlockContents};
pub use builder::AstBuilder;
pub use error::{AstError, AstResult};
pub use id_generator::{document_uri, get_document_id, IdGenerator};
pub use visitor::Visitor;

use std::collections::HashSet;

/// Deserialize a chunk handed over by a parser as JSON.
///
/// Block ids must be unique since they key per-block scopes.
pub fn from_json(source: &str) -> AstResult<Chunk> {
    let chunk: Chunk = serde_json::from_str(source)?;
    let mut seen = HashSet::new();
    for (block, _) in collect_blocks(&chunk) {
        if !seen.insert(block.id()) {
            return Err(AstError::DuplicateBlockId(block.id().to_string()));
        }
    }
    Ok(chunk)
}

pub fn to_json(chunk: &Chunk) -> AstResult<String> {
    Ok(serde_json::to_string(chunk)?)
}
