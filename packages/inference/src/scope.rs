use miniscript_catalog::tags;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::debug;

use crate::entity::{CompletionItem, Entity, EntityKind, EntryKey, Property};
use crate::namespace::Namespace;
use crate::type_manager::TypeManager;

/// Pseudo-identifiers that name scope roots instead of bindings
pub const RESERVED_NAMES: [&str; 4] = ["self", "locals", "outer", "globals"];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_NAMES.contains(&name)
}

/// Lexical binding frame.
///
/// At the root, locals and globals are the same entity: top-level bindings
/// are globals. Nested frames own their locals, share the document's
/// globals and chain to the enclosing frame.
#[derive(Debug)]
pub struct Scope {
    locals: Entity,
    parent: Option<Rc<Scope>>,
    globals: Entity,
    /// What `self` resolves to inside a method
    context: Option<Entity>,
}

impl Scope {
    /// Fresh globals entity for one document
    pub fn new_globals() -> Entity {
        Entity::of_type(EntityKind::Map, tags::MAP).with_label("globals")
    }

    pub fn root(globals: Entity) -> Self {
        Self {
            locals: globals.clone(),
            parent: None,
            globals,
            context: None,
        }
    }

    pub fn child(parent: Rc<Scope>) -> Self {
        Self {
            locals: Entity::of_type(EntityKind::Map, tags::MAP).with_label("locals"),
            globals: parent.globals.clone(),
            parent: Some(parent),
            context: None,
        }
    }

    pub fn with_context(mut self, context: Option<Entity>) -> Self {
        self.context = context;
        self
    }

    pub fn locals(&self) -> &Entity {
        &self.locals
    }

    pub fn globals(&self) -> &Entity {
        &self.globals
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    pub fn context(&self) -> Option<&Entity> {
        self.context.as_ref()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The enclosing frame's locals, or globals at the root
    pub fn outer(&self) -> Entity {
        match &self.parent {
            Some(parent) => parent.locals.clone(),
            None => self.globals.clone(),
        }
    }

    /// Root named by a pseudo-identifier. `self` only names something in a
    /// nested frame.
    pub fn resolve_reserved(&self, name: &str) -> Option<Entity> {
        match name {
            "locals" => Some(self.locals.clone()),
            "outer" => Some(self.outer()),
            "globals" => Some(self.globals.clone()),
            "self" if !self.is_root() => Some(
                self.context
                    .clone()
                    .unwrap_or_else(|| Entity::any().with_label("self")),
            ),
            _ => None,
        }
    }

    /// Stored binding for `name` in this frame, the enclosing frames or
    /// globals. Never invokes.
    pub fn lookup(&self, name: &str) -> Option<Entity> {
        self.find(name, true)
    }

    fn find(&self, name: &str, suppress_invoke: bool) -> Option<Entity> {
        let key = Property::Identifier(name);
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(found) = scope.locals.resolve_member(&key, suppress_invoke) {
                return Some(found);
            }
            frame = scope.parent.as_deref();
        }
        self.globals.resolve_member(&key, suppress_invoke)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.resolve_reserved(name).is_some() || self.lookup(name).is_some()
    }

    /// Resolve an identifier. Total: falls back to the general intrinsics
    /// and finally to a fresh `any`.
    pub fn resolve_property(
        &self,
        name: &str,
        suppress_invoke: bool,
        manager: &TypeManager,
    ) -> Entity {
        if let Some(root) = self.resolve_reserved(name) {
            return root;
        }
        if let Some(found) = self.find(name, suppress_invoke) {
            return found;
        }
        manager
            .get_general_definition(name, suppress_invoke)
            .unwrap_or_else(|| Entity::any().with_label(name))
    }

    /// Bind into this frame's locals; enclosing frames are never written.
    /// Reserved names are refused.
    pub fn set_property(&self, name: &str, entity: Entity) -> bool {
        if is_reserved(name) {
            debug!(name = %name, "Refusing to bind a reserved name");
            return false;
        }
        self.locals
            .set_property(&Property::Identifier(name), entity)
    }

    /// Merge `entity` into this frame's locals
    pub fn extend(&self, entity: &Entity) {
        self.locals.extend(entity);
    }

    /// Independent copy of the whole chain. Locals, globals and contexts
    /// are copied as one graph, so aliasing between them is preserved.
    pub fn copy(&self) -> Scope {
        let mut frames = vec![self];
        let mut cursor = self.parent.as_deref();
        while let Some(frame) = cursor {
            frames.push(frame);
            cursor = frame.parent.as_deref();
        }

        let mut roots = vec![self.globals.clone()];
        for frame in &frames {
            roots.push(frame.locals.clone());
            roots.extend(frame.context.clone());
        }
        let mut copies = Entity::copy_graph(&roots).into_iter();
        let globals = copies.next().unwrap_or_else(Scope::new_globals);

        let mut copied_frames = Vec::with_capacity(frames.len());
        for frame in &frames {
            let locals = copies.next().unwrap_or_else(Scope::new_globals);
            let context = match frame.context {
                Some(_) => copies.next(),
                None => None,
            };
            copied_frames.push((locals, context));
        }

        let mut parent: Option<Rc<Scope>> = None;
        let mut copied = None;
        for (index, (locals, context)) in copied_frames.into_iter().enumerate().rev() {
            let scope = Scope {
                locals,
                parent: parent.take(),
                globals: globals.clone(),
                context,
            };
            if index == 0 {
                copied = Some(scope);
            } else {
                parent = Some(Rc::new(scope));
            }
        }
        copied.unwrap_or_else(|| Scope::root(globals))
    }

    /// Every identifier visible from this frame: bindings from the
    /// innermost frame outwards, globals, the pseudo-identifiers and the
    /// general intrinsics. Inner bindings shadow outer ones.
    pub fn get_all_identifiers(&self, manager: &TypeManager) -> BTreeMap<String, CompletionItem> {
        let mut items = BTreeMap::new();
        let mut collect = |entity: &Entity| {
            for (key, value) in entity.entries() {
                if let EntryKey::Identifier(name) = key {
                    items
                        .entry(name)
                        .or_insert_with(|| CompletionItem::from_entity(&value));
                }
            }
        };

        let mut frame = Some(self);
        while let Some(scope) = frame {
            collect(&scope.locals);
            frame = scope.parent.as_deref();
        }
        collect(&self.globals);

        for name in RESERVED_NAMES {
            if let Some(root) = self.resolve_reserved(name) {
                items
                    .entry(name.to_string())
                    .or_insert_with(|| CompletionItem {
                        kind: EntityKind::Internal,
                        types: root.types().into_iter().collect(),
                        line: None,
                    });
            }
        }

        for (name, item) in manager.get_general_identifiers() {
            items.entry(name).or_insert(item);
        }
        items
    }
}

impl Namespace for Scope {
    fn add_type(&self, _tags: &[&str]) {
        panic!("add_type called on a scope: scopes carry no type tags");
    }

    fn set_return_entity(&self, _entity: Entity) {
        panic!("set_return_entity called on a scope: scopes have no return value");
    }

    fn has_property(&self, key: &Property<'_>) -> bool {
        match key {
            Property::Identifier(name) => Scope::has_property(self, name),
            Property::Value(_) => self.locals.has_property(key),
        }
    }

    fn resolve_property(
        &self,
        key: &Property<'_>,
        suppress_invoke: bool,
        manager: &TypeManager,
    ) -> Entity {
        match key {
            Property::Identifier(name) => Scope::resolve_property(self, name, suppress_invoke, manager),
            Property::Value(_) => self.locals.resolve_property(key, suppress_invoke, manager),
        }
    }

    fn set_property(&self, key: &Property<'_>, entity: Entity) -> bool {
        match key {
            Property::Identifier(name) => Scope::set_property(self, name, entity),
            Property::Value(_) => self.locals.set_property(key, entity),
        }
    }

    fn get_local(&self, key: &EntryKey) -> Option<Entity> {
        self.locals.get_local(key)
    }

    fn owner(&self) -> Option<Entity> {
        None
    }

    fn extend(&self, other: &Entity) {
        Scope::extend(self, other);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TypeManager {
        TypeManager::with_intrinsics().unwrap()
    }

    fn number() -> Entity {
        Entity::of_type(EntityKind::Literal, tags::NUMBER)
    }

    fn string() -> Entity {
        Entity::of_type(EntityKind::Literal, tags::STRING)
    }

    fn nested(depth: usize) -> (Rc<Scope>, Scope) {
        let root = Rc::new(Scope::root(Scope::new_globals()));
        let mut parent = root.clone();
        for _ in 1..depth {
            parent = Rc::new(Scope::child(parent));
        }
        (root, Scope::child(parent))
    }

    #[test]
    fn test_root_locals_are_globals() {
        let scope = Scope::root(Scope::new_globals());
        scope.set_property("x", number());

        assert!(scope.globals().has_local(&EntryKey::identifier("x")));
        assert!(scope.outer().ptr_eq(scope.globals()));
    }

    #[test]
    fn test_lookup_walks_entire_parent_chain() {
        let manager = manager();
        let (root, scope) = nested(3);
        root.set_property("deep", string());

        let found = scope.resolve_property("deep", false, &manager);
        assert!(found.has_type(tags::STRING));
    }

    #[test]
    fn test_globals_fallback() {
        let manager = manager();
        let (root, scope) = nested(2);
        root.globals().set_property(&Property::Identifier("shared"), number());

        assert!(scope.resolve_property("shared", false, &manager).has_type(tags::NUMBER));
    }

    #[test]
    fn test_inner_bindings_shadow_outer() {
        let manager = manager();
        let (root, scope) = nested(1);
        root.set_property("x", number());
        scope.set_property("x", string());

        assert!(scope.resolve_property("x", false, &manager).has_type(tags::STRING));
        assert!(root.resolve_property("x", false, &manager).has_type(tags::NUMBER));
    }

    #[test]
    fn test_set_property_only_writes_own_frame() {
        let (root, scope) = nested(1);
        root.set_property("x", number());
        scope.set_property("x", string());

        let outer_x = root.locals().get_local(&EntryKey::identifier("x")).unwrap();
        assert!(outer_x.has_type(tags::NUMBER));
    }

    #[test]
    fn test_reserved_names() {
        let manager = manager();
        let (root, scope) = nested(1);

        assert!(!scope.set_property("globals", number()));
        assert!(scope.resolve_property("locals", false, &manager).ptr_eq(scope.locals()));
        assert!(scope.resolve_property("outer", false, &manager).ptr_eq(root.locals()));
        assert!(scope.resolve_property("globals", false, &manager).ptr_eq(root.globals()));
    }

    #[test]
    fn test_self_requires_parent() {
        let manager = manager();
        let root = Scope::root(Scope::new_globals());
        assert!(root.resolve_reserved("self").is_none());
        assert!(root.resolve_property("self", false, &manager).has_type(tags::ANY));

        let receiver = Entity::of_type(EntityKind::Map, tags::MAP);
        let method = Scope::child(Rc::new(root)).with_context(Some(receiver.clone()));
        assert!(method.resolve_property("self", false, &manager).ptr_eq(&receiver));
    }

    #[test]
    fn test_miss_falls_back_to_intrinsics_then_any() {
        let manager = manager();
        let scope = Scope::root(Scope::new_globals());

        let print = scope.resolve_property("print", true, &manager);
        assert!(print.is_callable());

        let missing = scope.resolve_property("missing", false, &manager);
        assert!(missing.has_type(tags::ANY));
        assert_eq!(missing.label(), "missing");
    }

    #[test]
    fn test_copy_is_independent() {
        let manager = manager();
        let (root, scope) = nested(1);
        let shared = Entity::of_type(EntityKind::Map, tags::MAP);
        root.set_property("shared", shared.clone());
        scope.set_property("alias", shared.clone());

        let copy = scope.copy();
        copy.set_property("extra", number());
        shared.set_property(&Property::Identifier("late"), number());

        assert!(!scope.has_property("extra"));
        let copied_shared = copy.resolve_property("shared", false, &manager);
        let copied_alias = copy.resolve_property("alias", false, &manager);
        assert!(!copied_shared.ptr_eq(&shared));
        assert!(copied_shared.ptr_eq(&copied_alias));
        assert!(!copied_shared.has_local(&EntryKey::identifier("late")));
        assert!(copy.parent().unwrap().locals().ptr_eq(copy.globals()));
    }

    #[test]
    fn test_identifiers_include_chain_globals_and_intrinsics() {
        let manager = manager();
        let (root, scope) = nested(1);
        root.set_property("outerValue", number());
        scope.set_property("innerValue", string());

        let items = scope.get_all_identifiers(&manager);
        assert!(items.contains_key("outerValue"));
        assert!(items.contains_key("innerValue"));
        assert!(items.contains_key("print"));
        assert!(items.contains_key("self"));
        assert_eq!(items["innerValue"].types, vec!["string".to_string()]);
    }

    #[test]
    #[should_panic(expected = "add_type called on a scope")]
    fn test_add_type_on_scope_panics() {
        let scope = Scope::root(Scope::new_globals());
        Namespace::add_type(&scope, &["string"]);
    }

    #[test]
    #[should_panic(expected = "set_return_entity called on a scope")]
    fn test_set_return_entity_on_scope_panics() {
        let scope = Scope::root(Scope::new_globals());
        Namespace::set_return_entity(&scope, Entity::any());
    }
}
