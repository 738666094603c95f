use miniscript_ast::{Expression, ExpressionKind, ForLoop, FunctionDeclaration, MapField, Parameter, UnaryOp};
use miniscript_catalog::{tags, SignatureArgument, SignatureDefinition};
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::entity::{CopyOptions, Entity, EntityKind, EntryKey, Property};
use crate::namespace::Namespace;
use crate::options::InferenceOptions;
use crate::scope::Scope;
use crate::type_manager::TypeManager;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HopKind {
    /// Leading name, looked up in the scope
    Identifier,
    /// Leading literal or collection constructor
    Value,
    Member,
    Index,
    Call,
    Slice,
}

#[derive(Debug, Clone, Copy)]
pub enum Accessor<'e> {
    Name(&'e str),
    Node(&'e Expression),
    Arguments(&'e [Expression]),
    Range,
}

/// One step of an access chain
#[derive(Debug, Clone, Copy)]
pub struct Hop<'e> {
    pub kind: HopKind,
    pub accessor: Accessor<'e>,
    /// Prefixed with `@`: take the value itself, do not invoke it
    pub reference: bool,
}

impl<'e> Hop<'e> {
    fn new(kind: HopKind, accessor: Accessor<'e>, reference: bool) -> Self {
        Self {
            kind,
            accessor,
            reference,
        }
    }
}

/// Flatten an access expression into its hops, root first.
///
/// `a["b"]` becomes a member hop. Returns `None` when the root is neither a
/// name nor a literal/collection value.
pub fn access_chain(expr: &Expression) -> Option<Vec<Hop<'_>>> {
    let mut hops = Vec::new();
    let mut reference = false;
    let mut current = expr;

    loop {
        match &current.kind {
            ExpressionKind::Unary {
                operator: UnaryOp::Reference,
                argument,
            } => {
                reference = true;
                current = &**argument;
            }
            ExpressionKind::Member { base, identifier } => {
                let reference = std::mem::take(&mut reference);
                hops.push(Hop::new(HopKind::Member, Accessor::Name(identifier), reference));
                current = &**base;
            }
            ExpressionKind::Index { base, index } => {
                let reference = std::mem::take(&mut reference);
                let hop = match &index.kind {
                    ExpressionKind::String { value } => {
                        Hop::new(HopKind::Member, Accessor::Name(value), reference)
                    }
                    _ => Hop::new(HopKind::Index, Accessor::Node(index), reference),
                };
                hops.push(hop);
                current = &**base;
            }
            ExpressionKind::Slice { base, .. } => {
                let reference = std::mem::take(&mut reference);
                hops.push(Hop::new(HopKind::Slice, Accessor::Range, reference));
                current = &**base;
            }
            ExpressionKind::Call { base, arguments } => {
                let reference = std::mem::take(&mut reference);
                hops.push(Hop::new(HopKind::Call, Accessor::Arguments(arguments), reference));
                current = &**base;
            }
            ExpressionKind::Identifier { name } => {
                hops.push(Hop::new(HopKind::Identifier, Accessor::Name(name), reference));
                break;
            }
            _ if current.is_value() => {
                hops.push(Hop::new(HopKind::Value, Accessor::Node(current), reference));
                break;
            }
            _ => return None,
        }
    }

    hops.reverse();
    Some(hops)
}

/// Turns expressions into entities for one scope and binds assignment
/// targets back into the scope/entity graph.
pub struct Aggregator<'a> {
    scope: &'a Scope,
    manager: &'a TypeManager,
    options: &'a InferenceOptions,
    /// Function entities created here, by declaration id
    functions: FxHashMap<String, Entity>,
}

impl<'a> Aggregator<'a> {
    pub fn new(scope: &'a Scope, manager: &'a TypeManager, options: &'a InferenceOptions) -> Self {
        Self {
            scope,
            manager,
            options,
            functions: FxHashMap::default(),
        }
    }

    pub fn scope(&self) -> &Scope {
        self.scope
    }

    pub fn functions(&self) -> &FxHashMap<String, Entity> {
        &self.functions
    }

    pub fn into_functions(self) -> FxHashMap<String, Entity> {
        self.functions
    }

    /// Shallow dispatch on syntax: names go through the scope, literals get
    /// their primitive type, anything else is `any`
    pub fn resolve_type(&self, expr: &Expression, suppress_invoke: bool) -> Entity {
        let line = expr.span.line;
        match &expr.kind {
            ExpressionKind::Identifier { name } => {
                self.scope
                    .resolve_property(name, suppress_invoke, self.manager)
            }
            ExpressionKind::Nil => literal(tags::NULL, "null", line),
            ExpressionKind::String { value } => literal(tags::STRING, value, line),
            ExpressionKind::Number { value } => literal(tags::NUMBER, &value.0.to_string(), line),
            ExpressionKind::Boolean { value } => literal(tags::NUMBER, &value.to_string(), line),
            _ => Entity::of_type(EntityKind::Expression, tags::ANY).with_line(line),
        }
    }

    /// Entity for an initializer expression
    pub fn resolve(&mut self, expr: &Expression) -> Entity {
        match &expr.kind {
            ExpressionKind::Function { declaration } => self.resolve_function(declaration),
            ExpressionKind::Map { fields } => self.resolve_map(fields, expr.span.line),
            ExpressionKind::List { items } => self.resolve_list(items, expr.span.line),
            ExpressionKind::Unary {
                operator: UnaryOp::New,
                argument,
            } => self.resolve_new(argument, expr.span.line),
            ExpressionKind::Unary {
                operator: UnaryOp::Negate | UnaryOp::Not,
                ..
            } => Entity::of_type(EntityKind::Expression, tags::NUMBER).with_line(expr.span.line),
            ExpressionKind::Identifier { .. }
            | ExpressionKind::Member { .. }
            | ExpressionKind::Index { .. }
            | ExpressionKind::Slice { .. }
            | ExpressionKind::Call { .. }
            | ExpressionKind::Unary {
                operator: UnaryOp::Reference,
                ..
            } => self
                .resolve_namespace(expr)
                .unwrap_or_else(|| self.resolve_type(expr, false)),
            _ => self.resolve_type(expr, false),
        }
    }

    /// Resolve an access chain left to right
    pub fn resolve_namespace(&mut self, expr: &Expression) -> Option<Entity> {
        let hops = self.chain(expr)?;
        self.walk(&hops, hops.len())
    }

    /// Bind `value` at an assignment target. A single name binds into the
    /// scope's locals; a longer chain binds onto the container its prefix
    /// resolves to.
    pub fn define_namespace(&mut self, target: &Expression, value: Entity) -> bool {
        let line = target.span.line;
        let Some(hops) = self.chain(target) else {
            debug!(line, "Unsupported assignment target");
            return false;
        };
        let Some(last) = hops.last().copied() else {
            return false;
        };

        if hops.len() == 1 {
            return match (last.kind, last.accessor) {
                (HopKind::Identifier, Accessor::Name(name)) => {
                    self.bind(self.scope, Property::Identifier(name), value, line)
                }
                _ => false,
            };
        }

        let Some(container) = self.walk(&hops, hops.len() - 1) else {
            return false;
        };
        match (last.kind, last.accessor) {
            (HopKind::Member, Accessor::Name(name)) => {
                self.bind(&container, Property::Identifier(name), value, line)
            }
            (HopKind::Index, Accessor::Node(index)) => {
                let key = self.resolve_type(index, false);
                self.bind(&container, Property::Value(&key), value, line)
            }
            _ => {
                debug!(line, "Assignment target does not end in a member or index");
                false
            }
        }
    }

    /// Bind a function's parameters in its own scope
    pub fn define_parameters(&mut self, parameters: &[Parameter]) {
        for parameter in parameters {
            let value = match parameter.default_value() {
                Some(default) => self.resolve(default),
                None => Entity::any(),
            };
            let bound = value.copy(
                &CopyOptions::shallow()
                    .with_kind(EntityKind::Parameter)
                    .with_label(parameter.name())
                    .with_line(parameter.span().line),
            );
            self.scope.set_property(parameter.name(), bound);
        }
    }

    /// Bind a `for` loop variable to the iterated element type
    pub fn define_loop(&mut self, for_loop: &ForLoop) -> bool {
        let element = self.resolve_element(&for_loop.iterator);
        let bound = self.define_namespace(&for_loop.variable, element);

        if self.options.implicit_loop_index {
            if let Some(name) = for_loop.variable.as_identifier() {
                let index_name = format!("__{}_idx", name);
                let index = Entity::of_type(EntityKind::Variable, tags::NUMBER)
                    .with_label(index_name.as_str())
                    .with_line(for_loop.span.line);
                self.scope.set_property(&index_name, index);
            }
        }
        bound
    }

    fn chain<'e>(&self, expr: &'e Expression) -> Option<Vec<Hop<'e>>> {
        let hops = access_chain(expr)?;
        if hops.len() > self.options.max_chain_length {
            warn!(
                length = hops.len(),
                limit = self.options.max_chain_length,
                line = expr.span.line,
                "Access chain exceeds the configured bound, not resolving it"
            );
            return None;
        }
        Some(hops)
    }

    /// Resolve the first `count` hops. A hop followed by a call is read
    /// without invoking, so the call hop applies it exactly once.
    fn walk(&mut self, hops: &[Hop<'_>], count: usize) -> Option<Entity> {
        let suppress = |index: usize| {
            hops[index].reference
                || hops
                    .get(index + 1)
                    .is_some_and(|next| next.kind == HopKind::Call)
        };

        let first = hops.first()?;
        let mut current = self.resolve_root(first, suppress(0))?;
        for (index, hop) in hops.iter().enumerate().take(count).skip(1) {
            current = self.resolve_hop(&current, hop, suppress(index));
        }
        Some(current)
    }

    fn resolve_root(&mut self, hop: &Hop<'_>, suppress_invoke: bool) -> Option<Entity> {
        match (hop.kind, hop.accessor) {
            (HopKind::Identifier, Accessor::Name(name)) => Some(self.scope.resolve_property(
                name,
                suppress_invoke,
                self.manager,
            )),
            (HopKind::Value, Accessor::Node(node)) => Some(self.resolve(node)),
            _ => None,
        }
    }

    fn resolve_hop(&mut self, current: &Entity, hop: &Hop<'_>, suppress_invoke: bool) -> Entity {
        match (hop.kind, hop.accessor) {
            (HopKind::Member, Accessor::Name(name)) => {
                current.resolve_property(&Property::Identifier(name), suppress_invoke, self.manager)
            }
            (HopKind::Index, Accessor::Node(index)) => {
                let key = self.resolve_type(index, false);
                current.resolve_property(&Property::Value(&key), suppress_invoke, self.manager)
            }
            (HopKind::Call, _) => {
                if current.is_callable() && !hop.reference {
                    current.invoke()
                } else {
                    current.clone()
                }
            }
            (HopKind::Slice, _) => {
                current.copy(&CopyOptions::shallow().with_kind(EntityKind::Expression))
            }
            _ => Entity::any(),
        }
    }

    fn bind(
        &self,
        container: &dyn Namespace,
        key: Property<'_>,
        value: Entity,
        line: usize,
    ) -> bool {
        let name = match key {
            Property::Identifier(name) => Some(name),
            Property::Value(_) => None,
        };

        if value.kind() == EntityKind::Function {
            if let Some(owner) = container.owner() {
                value.set_context(&owner);
            }
        }

        let mut bound = prepare(value, name, line);
        if self.options.merge_reassignments {
            let slots = match key {
                Property::Identifier(name) => vec![EntryKey::identifier(name)],
                Property::Value(key) => key.types().into_iter().map(EntryKey::Type).collect(),
            };
            let mut members: Vec<Entity> = Vec::new();
            for slot in &slots {
                if let Some(existing) = container.get_local(slot) {
                    if !existing.ptr_eq(&bound) && !members.iter().any(|m| m.ptr_eq(&existing)) {
                        members.push(existing);
                    }
                }
            }
            if !members.is_empty() {
                let label = bound.label();
                members.push(bound.clone());
                bound = Entity::union(bound.kind(), label, &members);
            }
        }

        let types = bound.types();
        if container.set_property(&key, bound) {
            debug!(name = ?name, types = ?types, line, "Bound assignment");
            true
        } else {
            debug!(name = ?name, line, "Binding refused by target");
            false
        }
    }

    fn resolve_function(&mut self, declaration: &FunctionDeclaration) -> Entity {
        let mut arguments = Vec::with_capacity(declaration.parameters.len());
        for parameter in &declaration.parameters {
            let argument = match parameter.default_value() {
                Some(default) => {
                    let types = self.resolve(default).types().into_iter().collect();
                    SignatureArgument::optional(parameter.name(), types)
                }
                None => SignatureArgument::new(parameter.name(), vec![tags::ANY.to_string()]),
            };
            arguments.push(argument);
        }

        let function = Entity::of_type(EntityKind::Function, tags::FUNCTION)
            .with_label("function")
            .with_source(declaration.span.id.as_str())
            .with_line(declaration.span.line);
        function.add_signature(SignatureDefinition::function(arguments, Vec::new()));
        self.functions
            .insert(declaration.span.id.clone(), function.clone());
        function
    }

    fn resolve_map(&mut self, fields: &[MapField], line: usize) -> Entity {
        let map = Entity::of_type(EntityKind::Map, tags::MAP).with_line(line);
        for field in fields {
            let value = self.resolve(&field.value);
            if value.kind() == EntityKind::Function {
                value.set_context(&map);
            }
            match &field.key.kind {
                ExpressionKind::String { value: name } => {
                    let value = prepare(value, Some(name), field.key.span.line);
                    map.set_property(&Property::Identifier(name), value);
                }
                _ => {
                    let key = self.resolve_type(&field.key, false);
                    let value = prepare(value, None, field.key.span.line);
                    map.set_property(&Property::Value(&key), value);
                }
            }
        }
        map
    }

    fn resolve_list(&mut self, items: &[Expression], line: usize) -> Entity {
        let list = Entity::of_type(EntityKind::List, tags::LIST).with_line(line);
        let mut elements: Vec<Entity> = items.iter().map(|item| self.resolve(item)).collect();
        let element = match elements.len() {
            0 => return list,
            1 => elements.pop().map(|element| prepare(element, None, line)),
            _ => Some(Entity::union(EntityKind::Expression, "element", &elements)),
        };
        if let Some(element) = element {
            let key = Entity::of_type(EntityKind::Literal, tags::NUMBER);
            list.set_property(&Property::Value(&key), element);
        }
        list
    }

    fn resolve_new(&mut self, argument: &Expression, line: usize) -> Entity {
        let prototype = self
            .resolve_namespace(argument)
            .unwrap_or_else(|| self.resolve_type(argument, true));
        let instance = Entity::of_type(EntityKind::Map, tags::MAP).with_line(line);
        instance.inherit(prototype);
        instance
    }

    /// Element type produced by iterating `iterator`
    fn resolve_element(&mut self, iterator: &Expression) -> Entity {
        let collection = self.resolve(iterator);
        let mut parts = Vec::new();

        if collection.has_type(tags::LIST) {
            let key = Entity::of_type(EntityKind::Literal, tags::NUMBER);
            parts.push(collection.resolve_property(&Property::Value(&key), false, self.manager));
        }
        if collection.has_type(tags::STRING) {
            parts.push(Entity::of_type(EntityKind::Expression, tags::STRING));
        }
        if collection.has_type(tags::MAP) {
            let entry = Entity::of_type(EntityKind::Map, tags::MAP);
            entry.set_property(&Property::Identifier("key"), Entity::any());
            entry.set_property(&Property::Identifier("value"), Entity::any());
            parts.push(entry);
        }

        match parts.len() {
            0 => Entity::any(),
            1 => parts.pop().unwrap_or_else(Entity::any),
            _ => Entity::union(EntityKind::Expression, "element", &parts),
        }
    }
}

fn literal(tag: &str, label: &str, line: usize) -> Entity {
    Entity::of_type(EntityKind::Literal, tag)
        .with_label(label)
        .with_line(line)
}

/// Map and list values are bound by handle. Anything else is bound as a
/// copy carrying the binding's name and line.
fn prepare(value: Entity, name: Option<&str>, line: usize) -> Entity {
    if value.is_reference_shaped() {
        if let Some(name) = name {
            if value.label().is_empty() {
                value.set_label(name);
            }
        }
        return value;
    }

    let mut options = CopyOptions::shallow().with_line(line);
    if let Some(name) = name {
        options = options.with_label(name);
        if value.kind() != EntityKind::Function {
            options = options.with_kind(EntityKind::Variable);
        }
    }
    value.copy(&options)
}
