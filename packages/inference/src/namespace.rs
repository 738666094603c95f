use crate::entity::{Entity, EntryKey, Property};
use crate::type_manager::TypeManager;

/// Anything an assignment can bind into: an entity, or a scope's frame.
pub trait Namespace {
    fn add_type(&self, tags: &[&str]);

    fn set_return_entity(&self, entity: Entity);

    fn has_property(&self, key: &Property<'_>) -> bool;

    fn resolve_property(
        &self,
        key: &Property<'_>,
        suppress_invoke: bool,
        manager: &TypeManager,
    ) -> Entity;

    fn set_property(&self, key: &Property<'_>, entity: Entity) -> bool;

    /// Binding stored directly under `key`, without any fallback
    fn get_local(&self, key: &EntryKey) -> Option<Entity>;

    /// The entity that owns written members; methods bound here get it as
    /// their `self`
    fn owner(&self) -> Option<Entity>;

    fn extend(&self, other: &Entity);
}

impl Namespace for Entity {
    fn add_type(&self, tags: &[&str]) {
        Entity::add_type(self, tags.iter().copied());
    }

    fn set_return_entity(&self, entity: Entity) {
        Entity::set_return_entity(self, entity);
    }

    fn has_property(&self, key: &Property<'_>) -> bool {
        Entity::has_property(self, key)
    }

    fn resolve_property(
        &self,
        key: &Property<'_>,
        suppress_invoke: bool,
        manager: &TypeManager,
    ) -> Entity {
        Entity::resolve_property(self, key, suppress_invoke, manager)
    }

    fn set_property(&self, key: &Property<'_>, entity: Entity) -> bool {
        Entity::set_property(self, key, entity)
    }

    fn get_local(&self, key: &EntryKey) -> Option<Entity> {
        Entity::get_local(self, key)
    }

    fn owner(&self) -> Option<Entity> {
        Some(self.clone())
    }

    fn extend(&self, other: &Entity) {
        Entity::extend(self, other);
    }
}
