//! # MiniScript Inference Engine
//!
//! Best-effort, flow-insensitive type inference over MiniScript syntax trees
//! for editor tooling: hover, completion and go-to-definition.
//!
//! ## Features
//!
//! - **Structural entities**: every value is an [`Entity`] carrying a set of
//!   type tags, named and type-keyed members, and a prototype (`isa`) link
//! - **Lexical scopes**: one [`Scope`] per block, with `locals`, `outer`,
//!   `globals` and `self` pseudo-roots
//! - **Catalog fallback**: members missing from source come from the type
//!   catalog through the [`TypeManager`]; ambiguous matches are unioned
//! - **Never fails on input**: unresolvable expressions degrade to `any`
//! - **Structural hashing**: [`StructuralHasher`] gives each access chain a
//!   canonical id, so `locals.x` and `x` name the same binding
//!
//! ## Example
//!
//! ```rust
//! use miniscript_ast::AstBuilder;
//! use miniscript_inference::{Document, InferenceOptions, Property};
//!
//! let mut ast = AstBuilder::new("/main.src");
//! let target = ast.identifier("test");
//! let init = ast.map(vec![]);
//! let create = ast.assign(target, init);
//! let target = ast.path("test.foo");
//! let init = ast.number(123.0);
//! let assign = ast.assign(target, init);
//! let chunk = ast.chunk(vec![create, assign]);
//!
//! let mut document = Document::with_intrinsics(&chunk, InferenceOptions::default()).unwrap();
//! document.analyze().unwrap();
//!
//! let test = document.resolve(document.root_id(), "test").unwrap();
//! let foo = test.resolve_property(&Property::Identifier("foo"), false, document.type_manager());
//! assert!(foo.has_type("number"));
//! ```

pub mod aggregator;
pub mod cache;
pub mod document;
pub mod entity;
pub mod error;
pub mod hash_set;
pub mod hasher;
pub mod namespace;
pub mod options;
pub mod scope;
pub mod type_manager;

// Re-export main types for convenience
pub use aggregator::{access_chain, Aggregator, Hop, HopKind};
pub use cache::RecencyCache;
pub use document::{Definition, Document};
pub use entity::{
    CompletionItem, CopyOptions, Entity, EntityInfo, EntityKind, EntryKey, ExtendOptions, Property,
};
pub use error::{InferenceError, InferenceResult};
pub use hash_set::{ContentHash, HashConsedSet};
pub use hasher::StructuralHasher;
pub use namespace::Namespace;
pub use options::InferenceOptions;
pub use scope::Scope;
pub use type_manager::TypeManager;
