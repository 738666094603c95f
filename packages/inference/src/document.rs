use miniscript_ast::{collect_blocks, Binding, Block, Chunk, Expression, Span};
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, instrument};

use crate::aggregator::Aggregator;
use crate::entity::{CompletionItem, Entity};
use crate::error::{InferenceError, InferenceResult};
use crate::hasher::StructuralHasher;
use crate::options::InferenceOptions;
use crate::scope::Scope;
use crate::type_manager::TypeManager;

/// An assignment target or loop variable recorded during analysis
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Definition {
    /// Canonical structural id of the target
    pub id: String,
    /// Block the binding was made in
    pub block: String,
    pub span: Span,
}

/// Drives analysis of one parsed source file.
///
/// Every lexical block gets its own [`Scope`], chained to the scope of the
/// enclosing block by handle. Scopes are created on first use; analyzing a
/// block analyzes its enclosing blocks first so methods see their `self`.
pub struct Document<'a> {
    chunk: &'a Chunk,
    /// Block and enclosing block id, by block id
    blocks: FxHashMap<&'a str, (Block<'a>, Option<&'a str>)>,
    /// Block ids, parents first
    order: Vec<&'a str>,
    manager: TypeManager,
    options: InferenceOptions,
    hasher: StructuralHasher,
    globals: Entity,
    scopes: FxHashMap<String, Rc<Scope>>,
    /// Function entities by declaration id
    functions: FxHashMap<String, Entity>,
    /// Definitions bucketed by structural hash
    definitions: FxHashMap<u32, Vec<Definition>>,
    analyzed: FxHashSet<String>,
}

impl<'a> Document<'a> {
    pub fn new(chunk: &'a Chunk, manager: TypeManager, options: InferenceOptions) -> Self {
        let mut blocks = FxHashMap::default();
        let mut order = Vec::new();
        for (block, parent) in collect_blocks(chunk) {
            order.push(block.id());
            blocks.insert(block.id(), (block, parent));
        }

        Self {
            chunk,
            blocks,
            order,
            manager,
            hasher: StructuralHasher::new(options.hash_cache_capacity),
            options,
            globals: Scope::new_globals(),
            scopes: FxHashMap::default(),
            functions: FxHashMap::default(),
            definitions: FxHashMap::default(),
            analyzed: FxHashSet::default(),
        }
    }

    /// Document backed by the bundled intrinsic catalog
    pub fn with_intrinsics(chunk: &'a Chunk, options: InferenceOptions) -> InferenceResult<Self> {
        Ok(Self::new(chunk, TypeManager::with_intrinsics()?, options))
    }

    pub fn chunk(&self) -> &'a Chunk {
        self.chunk
    }

    pub fn type_manager(&self) -> &TypeManager {
        &self.manager
    }

    pub fn options(&self) -> &InferenceOptions {
        &self.options
    }

    pub fn globals(&self) -> &Entity {
        &self.globals
    }

    pub fn hasher(&self) -> &StructuralHasher {
        &self.hasher
    }

    pub fn root_id(&self) -> &'a str {
        &self.chunk.span.id
    }

    /// Ids of every block, parents first
    pub fn block_ids(&self) -> &[&'a str] {
        &self.order
    }

    pub fn is_analyzed(&self, block_id: &str) -> bool {
        self.analyzed.contains(block_id)
    }

    /// Analyze every block, parents first
    #[instrument(skip(self), fields(blocks = self.order.len()))]
    pub fn analyze(&mut self) -> InferenceResult<()> {
        for index in 0..self.order.len() {
            let id = self.order[index];
            self.analyze_block(id)?;
        }
        Ok(())
    }

    /// Analyze one block. Enclosing blocks that have not been analyzed yet
    /// are analyzed first; a block is only ever analyzed once.
    #[instrument(skip(self))]
    pub fn analyze_block(&mut self, block_id: &str) -> InferenceResult<()> {
        let pending: Vec<&'a str> = self
            .ancestors(block_id)?
            .into_iter()
            .rev()
            .filter(|id| !self.analyzed.contains(*id))
            .collect();

        for id in pending {
            self.run_block(id)?;
        }
        Ok(())
    }

    fn run_block(&mut self, id: &'a str) -> InferenceResult<()> {
        let (block, _) = self.block(id)?;
        let scope = self.scope_for(id)?;
        let contents = block.contents();

        let mut targets = Vec::with_capacity(contents.bindings.len());
        let functions = {
            let mut aggregator = Aggregator::new(&scope, &self.manager, &self.options);
            aggregator.define_parameters(block.parameters());
            for binding in &contents.bindings {
                match binding {
                    Binding::Assignment(assignment) => {
                        let value = aggregator.resolve(&assignment.init);
                        aggregator.define_namespace(&assignment.target, value);
                        targets.push(&assignment.target);
                    }
                    Binding::Loop(for_loop) => {
                        aggregator.define_loop(for_loop);
                        targets.push(&for_loop.variable);
                    }
                }
            }
            aggregator.into_functions()
        };

        for target in targets {
            self.record_definition(id, target);
        }
        let function_count = functions.len();
        self.functions.extend(functions);
        self.analyzed.insert(id.to_string());

        debug!(
            block = %id,
            bindings = contents.bindings.len(),
            functions = function_count,
            "Analyzed block"
        );
        Ok(())
    }

    fn record_definition(&mut self, block_id: &str, target: &Expression) {
        let definition = Definition {
            id: self.hasher.id(target).to_string(),
            block: block_id.to_string(),
            span: target.span.clone(),
        };
        self.definitions
            .entry(self.hasher.hash(target))
            .or_default()
            .push(definition);
    }

    fn block(&self, id: &str) -> InferenceResult<(Block<'a>, Option<&'a str>)> {
        self.blocks
            .get(id)
            .copied()
            .ok_or_else(|| InferenceError::UnknownBlock(id.to_string()))
    }

    /// `block_id` followed by its enclosing blocks, innermost first
    fn ancestors(&self, block_id: &str) -> InferenceResult<Vec<&'a str>> {
        let (block, mut parent) = self.block(block_id)?;
        let mut chain = vec![block.id()];
        while let Some(id) = parent {
            chain.push(id);
            parent = self.block(id)?.1;
        }
        Ok(chain)
    }

    fn scope_for(&mut self, id: &'a str) -> InferenceResult<Rc<Scope>> {
        if let Some(scope) = self.scopes.get(id) {
            return Ok(scope.clone());
        }

        let scope = match self.block(id)?.1 {
            None => Scope::root(self.globals.clone()),
            Some(parent) => {
                let parent = self.scope_for(parent)?;
                let context = self.functions.get(id).and_then(Entity::context);
                Scope::child(parent).with_context(context)
            }
        };
        let scope = Rc::new(scope);
        self.scopes.insert(id.to_string(), scope.clone());
        Ok(scope)
    }

    /// Scope of an analyzed block
    pub fn scope(&self, block_id: &str) -> InferenceResult<Rc<Scope>> {
        self.block(block_id)?;
        match self.scopes.get(block_id) {
            Some(scope) if self.analyzed.contains(block_id) => Ok(scope.clone()),
            _ => Err(InferenceError::BlockNotAnalyzed(block_id.to_string())),
        }
    }

    /// Type of `name` as seen from inside `block_id`
    pub fn resolve(&self, block_id: &str, name: &str) -> InferenceResult<Entity> {
        let scope = self.scope(block_id)?;
        Ok(scope.resolve_property(name, false, &self.manager))
    }

    /// Type of an arbitrary expression as seen from inside `block_id`
    pub fn resolve_expression(&self, block_id: &str, expr: &Expression) -> InferenceResult<Entity> {
        let scope = self.scope(block_id)?;
        let mut aggregator = Aggregator::new(&scope, &self.manager, &self.options);
        Ok(aggregator.resolve(expr))
    }

    /// Completion candidates visible inside `block_id`
    pub fn get_all_identifiers(
        &self,
        block_id: &str,
    ) -> InferenceResult<BTreeMap<String, CompletionItem>> {
        let scope = self.scope(block_id)?;
        Ok(scope.get_all_identifiers(&self.manager))
    }

    /// Bindings of `expr` visible from `block_id`: definitions made in the
    /// block or any enclosing block whose target is structurally the same
    /// expression. In source order within each block, innermost block first.
    pub fn find_definitions(
        &self,
        block_id: &str,
        expr: &Expression,
    ) -> InferenceResult<Vec<&Definition>> {
        let visible = self.ancestors(block_id)?;
        let Some(bucket) = self.definitions.get(&self.hasher.hash(expr)) else {
            return Ok(Vec::new());
        };

        let id = self.hasher.id(expr);
        let mut found = Vec::new();
        for block in visible {
            found.extend(
                bucket
                    .iter()
                    .filter(|definition| definition.block == block && definition.id == id),
            );
        }
        Ok(found)
    }

    /// Take over the custom types registered in `other`
    pub fn merge(&self, other: &Document<'_>) {
        self.manager.merge_custom_types(&other.manager);
    }
}
