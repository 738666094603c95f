use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

use crate::error::{CatalogError, CatalogResult};
use crate::signature::{Signature, SignatureArgument, SignatureDefinition};
use crate::tags;

const INTRINSICS: &str = include_str!("../data/intrinsics.json");

#[derive(Deserialize)]
struct RawSignature {
    #[serde(default)]
    definitions: BTreeMap<String, RawDefinition>,
    #[serde(default)]
    indexes: BTreeMap<String, Vec<String>>,
}

#[derive(Deserialize)]
struct RawDefinition {
    #[serde(rename = "type")]
    type_: Option<String>,
    #[serde(default)]
    arguments: Vec<RawArgument>,
    #[serde(default)]
    returns: Vec<String>,
    description: Option<String>,
}

#[derive(Deserialize)]
struct RawArgument {
    label: Option<String>,
    #[serde(default)]
    types: Vec<String>,
    #[serde(default)]
    optional: bool,
}

/// Registry of the built-in primitive types and named library types
#[derive(Debug, Clone, Default)]
pub struct Container {
    primitives: BTreeMap<String, Signature>,
    types: BTreeMap<String, Signature>,
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// The bundled MiniScript intrinsics
    pub fn intrinsics() -> CatalogResult<Self> {
        Self::from_json(INTRINSICS)
    }

    /// Load a catalog from its JSON form: an object mapping type names to
    /// `{ "definitions": {..}, "indexes": {..} }`
    pub fn from_json(source: &str) -> CatalogResult<Self> {
        let mut container = Self::new();
        container.extend_from_json(source)?;
        Ok(container)
    }

    pub fn from_path(path: impl AsRef<Path>) -> CatalogResult<Self> {
        let source = std::fs::read_to_string(path)?;
        Self::from_json(&source)
    }

    /// Add the types of another JSON catalog; later entries replace earlier
    /// ones of the same name
    pub fn extend_from_json(&mut self, source: &str) -> CatalogResult<()> {
        let raw: BTreeMap<String, RawSignature> = serde_json::from_str(source)?;
        for (type_name, raw_signature) in raw {
            let signature = convert_signature(&type_name, raw_signature)?;
            self.insert(signature);
        }
        Ok(())
    }

    pub fn insert(&mut self, signature: Signature) {
        let name = signature.type_name().to_string();
        if tags::is_primitive(&name) {
            self.primitives.insert(name, signature);
        } else {
            self.types.insert(name, signature);
        }
    }

    pub fn get(&self, type_name: &str) -> Option<&Signature> {
        self.primitives
            .get(type_name)
            .or_else(|| self.types.get(type_name))
    }

    pub fn primitive(&self, type_name: &str) -> Option<&Signature> {
        self.primitives.get(type_name)
    }

    pub fn primitives(&self) -> impl Iterator<Item = &Signature> {
        self.primitives.values()
    }

    /// Named, non-primitive library types
    pub fn types(&self) -> impl Iterator<Item = &Signature> {
        self.types.values()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.primitives
            .keys()
            .chain(self.types.keys())
            .map(String::as_str)
    }
}

fn convert_signature(type_name: &str, raw: RawSignature) -> CatalogResult<Signature> {
    let mut signature = Signature::new(type_name);

    for (member, definition) in raw.definitions {
        let definition = convert_definition(type_name, &member, definition)?;
        signature = signature.with_definition(member, definition);
    }

    for (key_type, types) in raw.indexes {
        signature = signature.with_index(key_type, types);
    }

    Ok(signature)
}

fn convert_definition(
    type_name: &str,
    member: &str,
    raw: RawDefinition,
) -> CatalogResult<SignatureDefinition> {
    let type_ = raw
        .type_
        .filter(|type_| !type_.is_empty())
        .ok_or_else(|| CatalogError::missing_type(type_name, member))?;

    let definition = if type_ == tags::FUNCTION {
        let arguments = raw
            .arguments
            .into_iter()
            .enumerate()
            .map(|(position, argument)| {
                let label = argument.label.ok_or_else(|| CatalogError::MissingArgumentLabel {
                    type_name: type_name.to_string(),
                    member: member.to_string(),
                    argument: position,
                })?;
                let types = if argument.types.is_empty() {
                    vec![tags::ANY.to_string()]
                } else {
                    argument.types
                };
                Ok(SignatureArgument {
                    label,
                    types,
                    optional: argument.optional,
                })
            })
            .collect::<CatalogResult<Vec<_>>>()?;
        SignatureDefinition::function(arguments, raw.returns)
    } else {
        SignatureDefinition::value(type_)
    };

    Ok(match raw.description {
        Some(description) => definition.with_description(description),
        None => definition,
    })
}
