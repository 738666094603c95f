use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::tags;

/// Argument descriptor of a callable member
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignatureArgument {
    pub label: String,
    pub types: Vec<String>,
    #[serde(default)]
    pub optional: bool,
}

impl SignatureArgument {
    pub fn new(label: impl Into<String>, types: Vec<String>) -> Self {
        Self {
            label: label.into(),
            types,
            optional: false,
        }
    }

    pub fn optional(label: impl Into<String>, types: Vec<String>) -> Self {
        Self {
            label: label.into(),
            types,
            optional: true,
        }
    }
}

#[derive(Serialize)]
struct CanonicalDefinition<'a> {
    #[serde(rename = "type")]
    type_: &'a str,
    arguments: &'a [SignatureArgument],
    returns: &'a [String],
}

/// One member definition of a catalog type.
///
/// Value members only carry a type tag. Callable members have the
/// `function` tag plus ordered arguments and a return type set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SignatureDefinition {
    #[serde(rename = "type")]
    type_: String,
    arguments: Vec<SignatureArgument>,
    returns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip)]
    hash: u32,
}

impl SignatureDefinition {
    /// Non-callable member of the given type
    pub fn value(type_: impl Into<String>) -> Self {
        Self::build(type_.into(), Vec::new(), Vec::new(), None)
    }

    /// Callable member; an empty return set means `any`
    pub fn function(arguments: Vec<SignatureArgument>, returns: Vec<String>) -> Self {
        let returns = if returns.is_empty() {
            vec![tags::ANY.to_string()]
        } else {
            returns
        };
        Self::build(tags::FUNCTION.to_string(), arguments, returns, None)
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn build(
        type_: String,
        arguments: Vec<SignatureArgument>,
        returns: Vec<String>,
        description: Option<String>,
    ) -> Self {
        let hash = content_hash(&CanonicalDefinition {
            type_: &type_,
            arguments: &arguments,
            returns: &returns,
        });
        Self {
            type_,
            arguments,
            returns,
            description,
            hash,
        }
    }

    pub fn type_name(&self) -> &str {
        &self.type_
    }

    pub fn is_function(&self) -> bool {
        self.type_ == tags::FUNCTION
    }

    pub fn arguments(&self) -> &[SignatureArgument] {
        &self.arguments
    }

    pub fn returns(&self) -> &[String] {
        &self.returns
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Structural content hash: CRC32 of the canonical JSON form.
    /// The description does not take part.
    pub fn content_hash(&self) -> u32 {
        self.hash
    }

    /// Number of arguments that must be supplied
    pub fn required_arity(&self) -> usize {
        self.arguments.iter().filter(|arg| !arg.optional).count()
    }
}

fn content_hash<T: Serialize>(value: &T) -> u32 {
    // Serializing plain strings and vectors cannot fail
    let json = serde_json::to_vec(value).unwrap_or_default();
    crc32fast::hash(&json)
}

/// Member table of one catalog type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Signature {
    type_name: String,
    definitions: BTreeMap<String, SignatureDefinition>,
    /// key type tag -> element types produced by indexing with that key
    indexes: BTreeMap<String, Vec<String>>,
}

impl Signature {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            definitions: BTreeMap::new(),
            indexes: BTreeMap::new(),
        }
    }

    pub fn with_definition(mut self, name: impl Into<String>, definition: SignatureDefinition) -> Self {
        self.definitions.insert(name.into(), definition);
        self
    }

    pub fn with_index(mut self, key_type: impl Into<String>, types: Vec<String>) -> Self {
        self.indexes.insert(key_type.into(), types);
        self
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn definition(&self, name: &str) -> Option<&SignatureDefinition> {
        self.definitions.get(name)
    }

    pub fn definitions(&self) -> impl Iterator<Item = (&str, &SignatureDefinition)> {
        self.definitions
            .iter()
            .map(|(name, definition)| (name.as_str(), definition))
    }

    pub fn indexes(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.indexes
            .iter()
            .map(|(key, types)| (key.as_str(), types.as_slice()))
    }

    /// Element types for indexing with `key_type`; an `any` entry acts as
    /// the fallback for key types without their own entry
    pub fn index_types(&self, key_type: &str) -> Option<&[String]> {
        self.indexes
            .get(key_type)
            .or_else(|| self.indexes.get(tags::ANY))
            .map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_ignores_description() {
        let plain = SignatureDefinition::function(vec![], vec!["number".to_string()]);
        let described = SignatureDefinition::function(vec![], vec!["number".to_string()])
            .with_description("Length of the value");
        assert_eq!(plain.content_hash(), described.content_hash());
    }

    #[test]
    fn test_content_hash_tracks_shape() {
        let number = SignatureDefinition::function(vec![], vec!["number".to_string()]);
        let string = SignatureDefinition::function(vec![], vec!["string".to_string()]);
        assert_ne!(number.content_hash(), string.content_hash());
        assert_ne!(
            SignatureDefinition::value("number").content_hash(),
            number.content_hash()
        );
    }

    #[test]
    fn test_function_without_returns_yields_any() {
        let definition = SignatureDefinition::function(vec![], vec![]);
        assert_eq!(definition.returns(), ["any".to_string()]);
        assert!(definition.is_function());
    }

    #[test]
    fn test_required_arity() {
        let definition = SignatureDefinition::function(
            vec![
                SignatureArgument::new("value", vec!["any".to_string()]),
                SignatureArgument::optional("delimiter", vec!["string".to_string()]),
            ],
            vec!["null".to_string()],
        );
        assert_eq!(definition.required_arity(), 1);
        assert_eq!(definition.arguments().len(), 2);
    }

    #[test]
    fn test_index_types_fall_back_to_any() {
        let signature = Signature::new("map").with_index("any", vec!["any".to_string()]);
        assert_eq!(signature.index_types("number"), Some(&["any".to_string()][..]));

        let signature = Signature::new("string").with_index("number", vec!["string".to_string()]);
        assert_eq!(signature.index_types("string"), None);
    }
}
