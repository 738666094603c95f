use miniscript_catalog::{tags, Signature, SignatureDefinition};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;
use std::cell::{Ref, RefCell, RefMut};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::hash_set::HashConsedSet;
use crate::type_manager::TypeManager;

/// What an entity was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Variable,
    Property,
    Parameter,
    Function,
    Literal,
    Map,
    List,
    Expression,
    /// Seeded from the catalog
    Internal,
    Unknown,
}

/// Composite member key. Identifier keys come from `a.b` and string
/// literal keys, type keys from indexing with a non-string value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "namespace", content = "key", rename_all = "lowercase")]
pub enum EntryKey {
    Identifier(String),
    Type(String),
}

impl EntryKey {
    pub fn identifier(name: impl Into<String>) -> Self {
        EntryKey::Identifier(name.into())
    }

    pub fn type_tag(tag: impl Into<String>) -> Self {
        EntryKey::Type(tag.into())
    }

    pub fn as_identifier(&self) -> Option<&str> {
        match self {
            EntryKey::Identifier(name) => Some(name),
            EntryKey::Type(_) => None,
        }
    }
}

/// Property key as seen by lookups: a plain name or a value whose types
/// select the type-keyed members
#[derive(Debug, Clone, Copy)]
pub enum Property<'a> {
    Identifier(&'a str),
    Value(&'a Entity),
}

#[derive(Clone)]
struct EntityData {
    kind: EntityKind,
    label: String,
    types: BTreeSet<String>,
    values: BTreeMap<EntryKey, Entity>,
    signatures: HashConsedSet<SignatureDefinition>,
    isa: Option<Weak<RefCell<EntityData>>>,
    /// Strong handle on a prototype that nothing else owns
    owned_isa: Option<Entity>,
    context: Option<Weak<RefCell<EntityData>>>,
    return_entity: Option<Entity>,
    source: Option<String>,
    line: Option<usize>,
    /// Seeded from a catalog signature; holds members regardless of types
    shaped: bool,
}

type EntityPtr = *const RefCell<EntityData>;

/// Node of the type graph.
///
/// `Entity` is a shared handle: cloning it aliases the same node, which is
/// how map and list values keep reference semantics across bindings. Use
/// [`Entity::copy`] for a new node.
#[derive(Clone)]
pub struct Entity(Rc<RefCell<EntityData>>);

/// Overrides applied by [`Entity::copy`]
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    /// Copy members recursively instead of sharing their handles
    pub deep: bool,
    pub kind: Option<EntityKind>,
    pub label: Option<String>,
    pub line: Option<usize>,
    pub source: Option<String>,
}

impl CopyOptions {
    pub fn shallow() -> Self {
        Self::default()
    }

    pub fn deep() -> Self {
        Self {
            deep: true,
            ..Default::default()
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_kind(mut self, kind: EntityKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExtendOptions {
    pub include_signatures: bool,
    /// Deep-copy members that are new to the receiver
    pub deep_copy: bool,
}

impl Default for ExtendOptions {
    fn default() -> Self {
        Self {
            include_signatures: true,
            deep_copy: false,
        }
    }
}

/// Completion entry for one visible identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionItem {
    pub kind: EntityKind,
    pub types: Vec<String>,
    pub line: Option<usize>,
}

impl CompletionItem {
    pub fn from_entity(entity: &Entity) -> Self {
        let data = entity.data();
        Self {
            kind: data.kind,
            types: data.types.iter().cloned().collect(),
            line: data.line,
        }
    }
}

/// Serializable snapshot of an entity, for hover and debugging
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntityInfo {
    pub label: String,
    pub kind: EntityKind,
    pub types: Vec<String>,
    pub members: Vec<String>,
    pub indexes: Vec<String>,
    pub callable: bool,
    pub returns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub isa: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,
}

impl Entity {
    pub fn new(kind: EntityKind) -> Self {
        Self::from_data(EntityData {
            kind,
            label: String::new(),
            types: BTreeSet::new(),
            values: BTreeMap::new(),
            signatures: HashConsedSet::new(),
            isa: None,
            owned_isa: None,
            context: None,
            return_entity: None,
            source: None,
            line: None,
            shaped: false,
        })
    }

    /// Fresh entity of the universal type
    pub fn any() -> Self {
        Self::new(EntityKind::Unknown).with_types([tags::ANY])
    }

    /// Fresh entity of a single type
    pub fn of_type(kind: EntityKind, tag: &str) -> Self {
        Self::new(kind).with_types([tag])
    }

    /// Entity seeded from a catalog signature
    pub fn from_signature(signature: &Signature) -> Self {
        let entity = Self::new(EntityKind::Internal)
            .with_label(signature.type_name())
            .with_types([signature.type_name()]);
        entity.insert_signature(signature);
        entity
    }

    /// New entity holding the union of `members`' types, signatures and
    /// members; nothing is shared with the inputs
    pub fn union(kind: EntityKind, label: impl Into<String>, members: &[Entity]) -> Self {
        let merged = Self::new(kind).with_label(label);
        for member in members {
            merged.extend_with(
                member,
                ExtendOptions {
                    include_signatures: true,
                    deep_copy: true,
                },
            );
        }
        merged
    }

    fn from_data(data: EntityData) -> Self {
        Self(Rc::new(RefCell::new(data)))
    }

    fn data(&self) -> Ref<'_, EntityData> {
        self.0.borrow()
    }

    fn data_mut(&self) -> RefMut<'_, EntityData> {
        self.0.borrow_mut()
    }

    fn as_ptr(&self) -> EntityPtr {
        Rc::as_ptr(&self.0)
    }

    fn upgrade(link: &Option<Weak<RefCell<EntityData>>>) -> Option<Entity> {
        link.as_ref().and_then(Weak::upgrade).map(Entity)
    }

    pub fn with_label(self, label: impl Into<String>) -> Self {
        self.set_label(label);
        self
    }

    pub fn with_types<I, S>(self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.add_type(tags);
        self
    }

    pub fn with_line(self, line: usize) -> Self {
        self.set_line(Some(line));
        self
    }

    pub fn with_source(self, source: impl Into<String>) -> Self {
        self.data_mut().source = Some(source.into());
        self
    }

    /// Same node
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub fn kind(&self) -> EntityKind {
        self.data().kind
    }

    pub fn set_kind(&self, kind: EntityKind) {
        self.data_mut().kind = kind;
    }

    pub fn label(&self) -> String {
        self.data().label.clone()
    }

    pub fn set_label(&self, label: impl Into<String>) {
        self.data_mut().label = label.into();
    }

    pub fn line(&self) -> Option<usize> {
        self.data().line
    }

    pub fn set_line(&self, line: Option<usize>) {
        self.data_mut().line = line;
    }

    pub fn source(&self) -> Option<String> {
        self.data().source.clone()
    }

    pub fn types(&self) -> BTreeSet<String> {
        self.data().types.clone()
    }

    pub fn has_type(&self, tag: &str) -> bool {
        self.data().types.contains(tag)
    }

    pub fn add_type<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = self.data_mut();
        data.types.extend(tags.into_iter().map(Into::into));
    }

    /// Replace the type set
    pub fn set_types<I, S>(&self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut data = self.data_mut();
        data.types = tags.into_iter().map(Into::into).collect();
    }

    /// Can hold members of its own
    pub fn is_map_shaped(&self) -> bool {
        let data = self.data();
        data.shaped || holds_members(&data.types)
    }

    /// Takes part in member lookups when reached through an `isa` link
    pub fn is_inheritable(&self) -> bool {
        holds_members(&self.data().types)
    }

    /// Map and list values are shared by handle when bound
    pub fn is_reference_shaped(&self) -> bool {
        let data = self.data();
        data.types.contains(tags::MAP) || data.types.contains(tags::LIST)
    }

    pub fn signatures(&self) -> Vec<SignatureDefinition> {
        self.data().signatures.iter().cloned().collect()
    }

    /// Returns true when the signature was not already present
    pub fn add_signature(&self, definition: SignatureDefinition) -> bool {
        self.data_mut().signatures.add(definition)
    }

    pub fn is_callable(&self) -> bool {
        self.data()
            .signatures
            .iter()
            .any(SignatureDefinition::is_function)
    }

    /// Union of the declared return types of every callable signature
    pub fn return_types(&self) -> BTreeSet<String> {
        self.data()
            .signatures
            .iter()
            .filter(|definition| definition.is_function())
            .flat_map(|definition| definition.returns().iter().cloned())
            .collect()
    }

    /// Populate members from a catalog signature and mark the entity as
    /// able to hold them
    pub fn insert_signature(&self, signature: &Signature) {
        for (name, definition) in signature.definitions() {
            let kind = if definition.is_function() {
                EntityKind::Function
            } else {
                EntityKind::Property
            };
            let member = Entity::new(kind)
                .with_label(name)
                .with_types([definition.type_name()]);
            member.add_signature(definition.clone());
            self.data_mut()
                .values
                .insert(EntryKey::identifier(name), member);
        }
        self.data_mut().shaped = true;
    }

    pub fn isa(&self) -> Option<Entity> {
        Self::upgrade(&self.data().isa)
    }

    pub fn has_isa(&self) -> bool {
        self.isa().is_some()
    }

    /// Link the prototype. The link does not keep `prototype` alive.
    pub fn set_isa(&self, prototype: &Entity) {
        let mut data = self.data_mut();
        data.isa = Some(Rc::downgrade(&prototype.0));
        data.owned_isa = None;
    }

    /// Link the prototype, taking ownership of it when the caller holds the
    /// last handle (a prototype built inline, as in `new {"a": 1}`). Bound
    /// prototypes stay weakly linked.
    pub fn inherit(&self, prototype: Entity) {
        let mut data = self.data_mut();
        data.isa = Some(Rc::downgrade(&prototype.0));
        data.owned_isa = (Rc::strong_count(&prototype.0) == 1).then_some(prototype);
    }

    pub fn clear_isa(&self) {
        let mut data = self.data_mut();
        data.isa = None;
        data.owned_isa = None;
    }

    /// The entity followed by its prototypes, nearest first. Stops at the
    /// first repeated node, so cyclic links terminate.
    pub fn isa_chain(&self) -> Vec<Entity> {
        let mut chain = vec![self.clone()];
        let mut seen: FxHashSet<EntityPtr> = FxHashSet::default();
        seen.insert(self.as_ptr());

        let mut cursor = self.isa();
        while let Some(next) = cursor {
            if !seen.insert(next.as_ptr()) {
                break;
            }
            cursor = next.isa();
            chain.push(next);
        }
        chain
    }

    /// Object a method was attached to; what `self` means inside it
    pub fn context(&self) -> Option<Entity> {
        Self::upgrade(&self.data().context)
    }

    pub fn set_context(&self, context: &Entity) {
        self.data_mut().context = Some(Rc::downgrade(&context.0));
    }

    pub fn return_entity(&self) -> Option<Entity> {
        self.data().return_entity.clone()
    }

    pub fn set_return_entity(&self, entity: Entity) {
        self.data_mut().return_entity = Some(entity);
    }

    /// Own members, in key order
    pub fn entries(&self) -> Vec<(EntryKey, Entity)> {
        self.data()
            .values
            .iter()
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn get_local(&self, key: &EntryKey) -> Option<Entity> {
        self.data().values.get(key).cloned()
    }

    pub fn has_local(&self, key: &EntryKey) -> bool {
        self.data().values.contains_key(key)
    }

    /// This entity, if it holds members, followed by the prototypes that
    /// take part in lookups
    fn lookup_chain(&self) -> Vec<Entity> {
        let mut chain = Vec::new();
        for (depth, entity) in self.isa_chain().into_iter().enumerate() {
            let eligible = if depth == 0 {
                entity.is_map_shaped()
            } else {
                entity.is_inheritable()
            };
            if !eligible {
                break;
            }
            chain.push(entity);
        }
        chain
    }

    /// Type-keyed members of this node selected by `key`'s types
    fn local_value_matches(&self, key_types: &BTreeSet<String>) -> Vec<Entity> {
        let data = self.data();
        if key_types.contains(tags::ANY) {
            return data
                .values
                .iter()
                .filter(|(entry, _)| matches!(entry, EntryKey::Type(_)))
                .map(|(_, value)| value.clone())
                .collect();
        }
        key_types
            .iter()
            .filter_map(|tag| data.values.get(&EntryKey::Type(tag.clone())).cloned())
            .collect()
    }

    /// Stored member for `key`, searching the prototype chain. Never invokes.
    pub fn lookup(&self, key: &Property<'_>) -> Option<Entity> {
        match key {
            Property::Identifier(name) => {
                let entry = EntryKey::identifier(*name);
                self.lookup_chain()
                    .into_iter()
                    .find_map(|entity| entity.get_local(&entry))
            }
            Property::Value(key) => {
                let key_types = key.types();
                for entity in self.lookup_chain() {
                    let mut matches = entity.local_value_matches(&key_types);
                    match matches.len() {
                        0 => continue,
                        1 => return matches.pop(),
                        _ => {
                            dedup_handles(&mut matches);
                            if matches.len() == 1 {
                                return matches.pop();
                            }
                            let label = matches[0].label();
                            let kind = matches[0].kind();
                            return Some(Entity::union(kind, label, &matches));
                        }
                    }
                }
                None
            }
        }
    }

    pub fn has_property(&self, key: &Property<'_>) -> bool {
        self.lookup(key).is_some()
    }

    /// Stored member for `key` as read by an expression: callable members
    /// are invoked unless `suppress_invoke` is set
    pub fn resolve_member(&self, key: &Property<'_>, suppress_invoke: bool) -> Option<Entity> {
        self.lookup(key)
            .map(|found| read_member(found, suppress_invoke))
    }

    /// Resolve a property access. Total: falls back to the catalog through
    /// `manager` and finally to a fresh `any`.
    pub fn resolve_property(
        &self,
        key: &Property<'_>,
        suppress_invoke: bool,
        manager: &TypeManager,
    ) -> Entity {
        if let Some(found) = self.resolve_member(key, suppress_invoke) {
            return found;
        }
        let types = self.types();
        match key {
            Property::Identifier(name) => manager
                .get_definition(&types, name, suppress_invoke)
                .unwrap_or_else(|| Entity::any().with_label(*name)),
            Property::Value(key) => manager
                .get_index_definition(&types, key)
                .unwrap_or_else(Entity::any),
        }
    }

    /// Write a member. Fails on entities that cannot hold members and on
    /// value keys without types.
    pub fn set_property(&self, key: &Property<'_>, value: Entity) -> bool {
        if !self.is_map_shaped() {
            return false;
        }
        match key {
            Property::Identifier(name) => {
                self.data_mut()
                    .values
                    .insert(EntryKey::identifier(*name), value);
                true
            }
            Property::Value(key) => {
                let key_types = key.types();
                if key_types.is_empty() {
                    return false;
                }
                let mut data = self.data_mut();
                for tag in key_types {
                    data.values.insert(EntryKey::Type(tag), value.clone());
                }
                true
            }
        }
    }

    /// Result of calling this entity: a fresh entity typed by the declared
    /// return types, or a copy of the explicit return entity
    pub fn invoke(&self) -> Entity {
        if let Some(returned) = self.return_entity() {
            return returned.copy(&CopyOptions::shallow().with_kind(EntityKind::Expression));
        }
        let mut returns = self.return_types();
        if returns.is_empty() {
            returns.insert(tags::ANY.to_string());
        }
        Entity::new(EntityKind::Expression)
            .with_label(self.label())
            .with_types(returns)
    }

    /// Union `other` into this entity with the default options
    pub fn extend(&self, other: &Entity) {
        self.extend_with(other, ExtendOptions::default());
    }

    /// Union types, signatures and members of `other` into this entity.
    /// Members present on both sides are extended recursively. An entity
    /// without a live prototype or context takes `other`'s; when both have
    /// one, the receiver's is kept.
    pub fn extend_with(&self, other: &Entity, options: ExtendOptions) {
        let mut visited = FxHashSet::default();
        self.extend_inner(other, options, &mut visited);
    }

    fn extend_inner(
        &self,
        other: &Entity,
        options: ExtendOptions,
        visited: &mut FxHashSet<(EntityPtr, EntityPtr)>,
    ) {
        if self.ptr_eq(other) || !visited.insert((self.as_ptr(), other.as_ptr())) {
            return;
        }

        let (types, signatures, entries, shaped, links) = {
            let data = other.data();
            let signatures = options
                .include_signatures
                .then(|| data.signatures.clone());
            let links = (data.isa.clone(), data.owned_isa.clone(), data.context.clone());
            (data.types.clone(), signatures, other_entries(&data), data.shaped, links)
        };

        {
            let mut data = self.data_mut();
            data.types.extend(types);
            if let Some(signatures) = signatures {
                data.signatures.union(&signatures);
            }
            data.shaped |= shaped;

            let (isa, owned_isa, context) = links;
            if Self::upgrade(&data.isa).is_none() && Self::upgrade(&isa).is_some() {
                data.isa = isa;
                data.owned_isa = owned_isa;
            }
            if Self::upgrade(&data.context).is_none() && Self::upgrade(&context).is_some() {
                data.context = context;
            }
        }

        for (key, value) in entries {
            match self.get_local(&key) {
                Some(existing) => existing.extend_inner(&value, options, visited),
                None => {
                    let value = if options.deep_copy {
                        value.copy(&CopyOptions::deep())
                    } else {
                        value
                    };
                    self.data_mut().values.insert(key, value);
                }
            }
        }
    }

    /// New entity with the same contents. Shallow copies share member
    /// handles; deep copies share nothing reachable through members, and
    /// `isa`/context links into the copied subgraph are redirected to the
    /// corresponding copies.
    pub fn copy(&self, options: &CopyOptions) -> Entity {
        let copy = if options.deep {
            Self::copy_graph(std::slice::from_ref(self)).remove(0)
        } else {
            Entity::from_data(self.data().clone())
        };

        {
            let mut data = copy.data_mut();
            if let Some(kind) = options.kind {
                data.kind = kind;
            }
            if let Some(label) = &options.label {
                data.label = label.clone();
            }
            if let Some(line) = options.line {
                data.line = Some(line);
            }
            if let Some(source) = &options.source {
                data.source = Some(source.clone());
            }
        }
        copy
    }

    /// Deep-copy several entities as one graph: a node reachable from more
    /// than one of `roots` is copied once, and links between the roots
    /// survive in the copies
    pub fn copy_graph(roots: &[Entity]) -> Vec<Entity> {
        let mut memo = FxHashMap::default();
        let copies = roots
            .iter()
            .map(|root| root.deep_copy(&mut memo))
            .collect();
        for copied in memo.values() {
            if let Some(mapped) = copied.isa().and_then(|isa| memo.get(&isa.as_ptr())) {
                copied.set_isa(mapped);
            }
            if let Some(mapped) = copied
                .context()
                .and_then(|context| memo.get(&context.as_ptr()))
            {
                copied.set_context(mapped);
            }
        }
        copies
    }

    fn deep_copy(&self, memo: &mut FxHashMap<EntityPtr, Entity>) -> Entity {
        if let Some(copy) = memo.get(&self.as_ptr()) {
            return copy.clone();
        }
        // Registered before descending so cycles land on this copy
        let copy = Entity::from_data(self.data().clone());
        memo.insert(self.as_ptr(), copy.clone());

        let values = self
            .entries()
            .into_iter()
            .map(|(key, value)| (key, value.deep_copy(memo)))
            .collect();
        let return_entity = self.return_entity().map(|returned| returned.deep_copy(memo));

        let mut data = copy.data_mut();
        data.values = values;
        data.return_entity = return_entity;
        drop(data);
        copy
    }

    /// Every identifier reachable with `.` on this entity: own members,
    /// inherited members, then catalog members of its types
    pub fn get_all_identifiers(&self, manager: &TypeManager) -> BTreeMap<String, CompletionItem> {
        let mut items = BTreeMap::new();
        for entity in self.lookup_chain() {
            for (key, value) in entity.entries() {
                if let EntryKey::Identifier(name) = key {
                    items
                        .entry(name)
                        .or_insert_with(|| CompletionItem::from_entity(&value));
                }
            }
        }
        for (name, item) in manager.get_identifiers(&self.types()) {
            items.entry(name).or_insert(item);
        }
        items
    }

    pub fn describe(&self) -> EntityInfo {
        let isa = self.isa().map(|prototype| prototype.label());
        let callable = self.is_callable();
        let returns = self.return_types().into_iter().collect();
        let data = self.data();
        let (members, indexes) = data.values.keys().fold(
            (Vec::new(), Vec::new()),
            |(mut members, mut indexes), key| {
                match key {
                    EntryKey::Identifier(name) => members.push(name.clone()),
                    EntryKey::Type(tag) => indexes.push(tag.clone()),
                }
                (members, indexes)
            },
        );
        EntityInfo {
            label: data.label.clone(),
            kind: data.kind,
            types: data.types.iter().cloned().collect(),
            members,
            indexes,
            callable,
            returns,
            isa,
            line: data.line,
        }
    }
}

fn holds_members(types: &BTreeSet<String>) -> bool {
    types.contains(tags::MAP) || types.contains(tags::LIST) || types.contains(tags::ANY)
}

fn other_entries(data: &EntityData) -> Vec<(EntryKey, Entity)> {
    data.values
        .iter()
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}

fn dedup_handles(entities: &mut Vec<Entity>) {
    let mut seen = FxHashSet::default();
    entities.retain(|entity| seen.insert(entity.as_ptr()));
}

fn read_member(found: Entity, suppress_invoke: bool) -> Entity {
    if !suppress_invoke && found.is_callable() {
        found.invoke()
    } else {
        found
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Members are listed by key only; the graph may be cyclic
        match self.0.try_borrow() {
            Ok(data) => f
                .debug_struct("Entity")
                .field("kind", &data.kind)
                .field("label", &data.label)
                .field("types", &data.types)
                .field("members", &data.values.keys().collect::<Vec<_>>())
                .finish_non_exhaustive(),
            Err(_) => f.write_str("Entity(<borrowed>)"),
        }
    }
}
