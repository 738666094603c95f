//! # MiniScript type catalog
//!
//! Read-only description of the built-in primitive types and of named
//! library types: for each type, the members it defines and, for callable
//! members, their arguments and return types.
//!
//! ```rust
//! use miniscript_catalog::{tags, Container};
//!
//! let catalog = Container::intrinsics().unwrap();
//! let upper = catalog.get(tags::STRING).unwrap().definition("upper").unwrap();
//! assert_eq!(upper.returns(), ["string".to_string()]);
//! ```

pub mod container;
pub mod error;
pub mod signature;
pub mod tags;

pub use container::Container;
pub use error::{CatalogError, CatalogResult};
pub use signature::{Signature, SignatureArgument, SignatureDefinition};
