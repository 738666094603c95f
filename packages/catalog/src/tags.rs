//! Type tags shared by the catalog and the inference engine.

pub const ANY: &str = "any";
pub const STRING: &str = "string";
pub const NUMBER: &str = "number";
pub const MAP: &str = "map";
pub const LIST: &str = "list";
pub const FUNCTION: &str = "function";
pub const NULL: &str = "null";
/// Universal root type holding type-independent intrinsics
pub const GENERAL: &str = "general";

/// Base types every catalog is expected to describe
pub const PRIMITIVE_TYPES: [&str; 8] = [GENERAL, ANY, STRING, NUMBER, MAP, LIST, FUNCTION, NULL];

pub fn is_primitive(type_name: &str) -> bool {
    PRIMITIVE_TYPES.contains(&type_name)
}
