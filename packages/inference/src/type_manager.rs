use miniscript_catalog::{tags, CatalogResult, Container};
use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;
use tracing::debug;

use crate::entity::{CompletionItem, CopyOptions, Entity, EntityKind, EntryKey, Property};

/// Gateway between resolution and the type catalog.
///
/// Holds one seeded entity per catalog type plus the types registered at
/// runtime. A type name, once registered, is never replaced.
#[derive(Debug)]
pub struct TypeManager {
    container: Rc<Container>,
    primitives: BTreeMap<String, Entity>,
    types: RefCell<BTreeMap<String, Entity>>,
    custom_types: RefCell<BTreeSet<String>>,
}

impl TypeManager {
    pub fn new(container: Rc<Container>) -> Self {
        let mut primitives = BTreeMap::new();
        let mut types = BTreeMap::new();

        for signature in container.primitives() {
            let entity = Entity::from_signature(signature);
            primitives.insert(signature.type_name().to_string(), entity.clone());
            types.insert(signature.type_name().to_string(), entity);
        }
        for signature in container.types() {
            types.insert(
                signature.type_name().to_string(),
                Entity::from_signature(signature),
            );
        }

        Self {
            container,
            primitives,
            types: RefCell::new(types),
            custom_types: RefCell::new(BTreeSet::new()),
        }
    }

    /// Gateway over the bundled intrinsics
    pub fn with_intrinsics() -> CatalogResult<Self> {
        Ok(Self::new(Rc::new(Container::intrinsics()?)))
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn primitive(&self, name: &str) -> Option<Entity> {
        self.primitives.get(name).cloned()
    }

    pub fn get_type(&self, name: &str) -> Option<Entity> {
        self.types.borrow().get(name).cloned()
    }

    pub fn type_names(&self) -> Vec<String> {
        self.types.borrow().keys().cloned().collect()
    }

    pub fn is_custom_type(&self, name: &str) -> bool {
        self.custom_types.borrow().contains(name)
    }

    pub fn custom_types(&self) -> Vec<String> {
        self.custom_types.borrow().iter().cloned().collect()
    }

    /// Register a runtime type. Returns false, leaving the registry
    /// untouched, when the name is already taken.
    pub fn set_custom_type(&self, name: &str, entity: Entity) -> bool {
        let mut types = self.types.borrow_mut();
        if types.contains_key(name) {
            debug!(type_name = %name, "Type already registered, keeping the first registration");
            return false;
        }
        types.insert(name.to_string(), entity);
        self.custom_types.borrow_mut().insert(name.to_string());
        true
    }

    /// Copy the custom types of `other` into this registry. Entries are
    /// deep-copied so the two documents never share nodes.
    pub fn merge_custom_types(&self, other: &TypeManager) {
        if std::ptr::eq(self, other) {
            return;
        }
        let incoming: Vec<(String, Entity)> = {
            let types = other.types.borrow();
            other
                .custom_types
                .borrow()
                .iter()
                .filter_map(|name| types.get(name).map(|entity| (name.clone(), entity.clone())))
                .collect()
        };
        for (name, entity) in incoming {
            self.set_custom_type(&name, entity.copy(&CopyOptions::deep()));
        }
    }

    /// Seeded entities to consult for `types`; every registered type when
    /// the set contains `any`
    fn candidates(&self, types: &BTreeSet<String>) -> Vec<(String, Entity)> {
        let registry = self.types.borrow();
        if types.contains(tags::ANY) {
            return registry
                .iter()
                .map(|(name, entity)| (name.clone(), entity.clone()))
                .collect();
        }
        types
            .iter()
            .filter_map(|name| registry.get(name).map(|entity| (name.clone(), entity.clone())))
            .collect()
    }

    /// Definition of `property` on any type of `types`.
    ///
    /// Several matching types are settled in this order: the `any` type's
    /// definition, then the general definition, then the union of every match.
    pub fn get_definition(
        &self,
        types: &BTreeSet<String>,
        property: &str,
        suppress_invoke: bool,
    ) -> Option<Entity> {
        let candidates = self.candidates(types);
        let key = Property::Identifier(property);
        let matches = candidates
            .iter()
            .filter_map(|(name, entity)| {
                entity
                    .resolve_member(&key, suppress_invoke)
                    .map(|found| (name.clone(), detach(&found)))
            })
            .collect();
        settle(candidates.len(), matches, property, || {
            self.get_general_definition(property, suppress_invoke)
        })
    }

    /// Definition of `property` on the general type only
    pub fn get_general_definition(&self, property: &str, suppress_invoke: bool) -> Option<Entity> {
        self.get_type(tags::GENERAL)?
            .resolve_member(&Property::Identifier(property), suppress_invoke)
            .map(|found| detach(&found))
    }

    /// Element produced by indexing a value of `types` with `key`: stored
    /// type-keyed members of runtime types first, then the catalog's index
    /// table
    pub fn get_index_definition(&self, types: &BTreeSet<String>, key: &Entity) -> Option<Entity> {
        let candidates = self.candidates(types);
        let key_types = key.types();
        let matches = candidates
            .iter()
            .filter_map(|(name, entity)| {
                entity
                    .lookup(&Property::Value(key))
                    .map(|found| detach(&found))
                    .or_else(|| self.catalog_index(name, &key_types))
                    .map(|found| (name.clone(), found))
            })
            .collect();
        settle(candidates.len(), matches, "index", || None)
    }

    fn catalog_index(&self, type_name: &str, key_types: &BTreeSet<String>) -> Option<Entity> {
        let signature = self.container.get(type_name)?;
        let element_types: BTreeSet<String> = if key_types.contains(tags::ANY) {
            signature
                .indexes()
                .flat_map(|(_, types)| types.iter().cloned())
                .collect()
        } else {
            key_types
                .iter()
                .filter_map(|key_type| signature.index_types(key_type))
                .flat_map(|types| types.iter().cloned())
                .collect()
        };
        if element_types.is_empty() {
            return None;
        }
        Some(
            Entity::new(EntityKind::Internal)
                .with_label(format!("{}[]", type_name))
                .with_types(element_types),
        )
    }

    /// Catalog members visible on a value of `types`
    pub fn get_identifiers(&self, types: &BTreeSet<String>) -> BTreeMap<String, CompletionItem> {
        let mut items = BTreeMap::new();
        for (_, entity) in self.candidates(types) {
            for (key, member) in entity.entries() {
                if let EntryKey::Identifier(name) = key {
                    items
                        .entry(name)
                        .or_insert_with(|| CompletionItem::from_entity(&member));
                }
            }
        }
        items
    }

    /// Intrinsics reachable without a receiver (`print`, `len`, ...)
    pub fn get_general_identifiers(&self) -> BTreeMap<String, CompletionItem> {
        let general = BTreeSet::from([tags::GENERAL.to_string()]);
        self.get_identifiers(&general)
    }
}

/// Catalog entities are never handed out directly
fn detach(entity: &Entity) -> Entity {
    entity.copy(&CopyOptions::shallow())
}

fn settle(
    candidate_count: usize,
    mut matches: Vec<(String, Entity)>,
    label: &str,
    general: impl FnOnce() -> Option<Entity>,
) -> Option<Entity> {
    if matches.is_empty() {
        return None;
    }
    if candidate_count == 1 {
        return matches.pop().map(|(_, found)| found);
    }
    if let Some(position) = matches.iter().position(|(name, _)| name == tags::ANY) {
        return Some(matches.swap_remove(position).1);
    }
    if let Some(general) = general() {
        return Some(general);
    }
    if matches.len() == 1 {
        return matches.pop().map(|(_, found)| found);
    }
    let kind = matches[0].1.kind();
    let members: Vec<Entity> = matches.into_iter().map(|(_, found)| found).collect();
    Some(Entity::union(kind, label, &members))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn types(tags: &[&str]) -> BTreeSet<String> {
        tags.iter().map(|tag| tag.to_string()).collect()
    }

    fn manager(catalog: &str) -> TypeManager {
        TypeManager::new(Rc::new(Container::from_json(catalog).unwrap()))
    }

    const CATALOG: &str = r#"{
        "general": { "definitions": {
            "describe": { "type": "function", "returns": ["string"] }
        } },
        "any": { "definitions": {} },
        "string": { "definitions": {
            "describe": { "type": "function", "returns": ["number"] },
            "len": { "type": "function", "returns": ["number"] }
        }, "indexes": { "number": ["string"] } },
        "number": { "definitions": {} },
        "map": { "definitions": {} },
        "Shell": { "definitions": {
            "host": { "type": "string" },
            "files": { "type": "function", "returns": ["list"] }
        } },
        "Computer": { "definitions": {
            "host": { "type": "number" },
            "ports": { "type": "function", "returns": ["list"] }
        } }
    }"#;

    #[test]
    fn test_single_type_match() {
        let manager = manager(CATALOG);
        let found = manager
            .get_definition(&types(&["string"]), "describe", false)
            .unwrap();
        assert_eq!(found.types(), types(&["number"]));
    }

    #[test]
    fn test_general_definition_wins_over_type_specific() {
        let manager = manager(CATALOG);
        let found = manager
            .get_definition(&types(&["number", "string"]), "describe", false)
            .unwrap();
        assert_eq!(found.types(), types(&["string"]));
    }

    #[test]
    fn test_any_type_definition_wins() {
        let manager = manager(
            r#"{
                "general": { "definitions": { "x": { "type": "number" } } },
                "any": { "definitions": { "x": { "type": "list" } } },
                "string": { "definitions": { "x": { "type": "string" } } }
            }"#,
        );
        let found = manager.get_definition(&types(&["any"]), "x", false).unwrap();
        assert_eq!(found.types(), types(&["list"]));
    }

    #[test]
    fn test_ambiguous_matches_merge() {
        let manager = manager(CATALOG);
        let found = manager
            .get_definition(&types(&["Computer", "Shell"]), "host", false)
            .unwrap();
        assert_eq!(found.label(), "host");
        assert_eq!(found.types(), types(&["number", "string"]));
    }

    #[test]
    fn test_miss_is_none() {
        let manager = manager(CATALOG);
        assert!(manager
            .get_definition(&types(&["number"]), "len", false)
            .is_none());
        assert!(manager
            .get_definition(&types(&["Unregistered"]), "len", false)
            .is_none());
    }

    #[test]
    fn test_suppressed_definition_is_callable() {
        let manager = manager(CATALOG);
        let found = manager
            .get_definition(&types(&["Shell"]), "files", true)
            .unwrap();
        assert!(found.is_callable());
        assert!(found.has_type(tags::FUNCTION));
    }

    #[test]
    fn test_returned_entities_are_detached() {
        let manager = manager(CATALOG);
        let found = manager
            .get_definition(&types(&["Shell"]), "host", false)
            .unwrap();
        found.add_type(["number"]);

        let again = manager
            .get_definition(&types(&["Shell"]), "host", false)
            .unwrap();
        assert_eq!(again.types(), types(&["string"]));
    }

    #[test]
    fn test_general_definition_only_consults_general() {
        let manager = manager(CATALOG);
        assert!(manager.get_general_definition("describe", false).is_some());
        assert!(manager.get_general_definition("len", false).is_none());
    }

    #[test]
    fn test_index_definition_uses_catalog_indexes() {
        let manager = manager(CATALOG);
        let key = Entity::of_type(EntityKind::Literal, tags::NUMBER);
        let element = manager
            .get_index_definition(&types(&["string"]), &key)
            .unwrap();
        assert_eq!(element.types(), types(&["string"]));

        let text_key = Entity::of_type(EntityKind::Literal, tags::STRING);
        assert!(manager
            .get_index_definition(&types(&["string"]), &text_key)
            .is_none());
    }

    #[test]
    fn test_custom_types_first_registration_wins() {
        let manager = manager(CATALOG);
        let first = Entity::of_type(EntityKind::Map, tags::MAP);
        let second = Entity::of_type(EntityKind::Map, tags::LIST);

        assert!(manager.set_custom_type("Point", first.clone()));
        assert!(!manager.set_custom_type("Point", second));
        assert!(!manager.set_custom_type("string", Entity::any()));

        assert!(manager.get_type("Point").unwrap().ptr_eq(&first));
        assert!(manager.is_custom_type("Point"));
        assert!(!manager.is_custom_type("string"));
    }

    #[test]
    fn test_merge_copies_only_custom_types_deeply() {
        let left = manager(CATALOG);
        let right = manager(CATALOG);
        let point = Entity::of_type(EntityKind::Map, tags::MAP);
        let x = Entity::of_type(EntityKind::Literal, tags::NUMBER);
        point.set_property(&Property::Identifier("x"), x.clone());
        right.set_custom_type("Point", point.clone());

        left.merge_custom_types(&right);

        let merged = left.get_type("Point").unwrap();
        assert!(!merged.ptr_eq(&point));
        let merged_x = merged.get_local(&EntryKey::identifier("x")).unwrap();
        assert!(!merged_x.ptr_eq(&x));
        assert_eq!(left.custom_types(), vec!["Point".to_string()]);
    }

    #[test]
    fn test_custom_types_take_part_in_lookups() {
        let manager = manager(CATALOG);
        let point = Entity::of_type(EntityKind::Map, tags::MAP).with_types(["Point"]);
        point.set_property(
            &Property::Identifier("x"),
            Entity::of_type(EntityKind::Literal, tags::NUMBER),
        );
        manager.set_custom_type("Point", point);

        let found = manager
            .get_definition(&types(&["Point"]), "x", false)
            .unwrap();
        assert_eq!(found.types(), types(&["number"]));
    }

    #[test]
    fn test_intrinsic_identifiers() {
        let manager = TypeManager::with_intrinsics().unwrap();
        let items = manager.get_general_identifiers();
        assert!(items.contains_key("print"));
        assert!(manager.primitive("general").is_some());
        assert!(manager.get_identifiers(&types(&["string"])).contains_key("upper"));
    }
}
