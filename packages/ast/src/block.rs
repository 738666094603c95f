use crate::ast::*;
use crate::visitor::{walk_assignment, walk_for, walk_function, walk_parameter, Visitor};

/// A lexical block: the root chunk or a function body.
///
/// Blocks are the unit of scope creation. `id()` is the handle a driver uses
/// to associate a block with its scope.
#[derive(Debug, Clone, Copy)]
pub enum Block<'a> {
    Chunk(&'a Chunk),
    Function(&'a FunctionDeclaration),
}

/// Binding site inside a block, in source order
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    Assignment(&'a Assignment),
    Loop(&'a ForLoop),
}

/// Everything a block defines, gathered in one pass
#[derive(Debug, Default)]
pub struct BlockContents<'a> {
    pub bindings: Vec<Binding<'a>>,
    pub functions: Vec<&'a FunctionDeclaration>,
}

impl<'a> Block<'a> {
    pub fn id(&self) -> &'a str {
        &self.span().id
    }

    pub fn span(&self) -> &'a Span {
        match self {
            Block::Chunk(chunk) => &chunk.span,
            Block::Function(function) => &function.span,
        }
    }

    pub fn body(&self) -> &'a [Statement] {
        match self {
            Block::Chunk(chunk) => &chunk.body,
            Block::Function(function) => &function.body,
        }
    }

    pub fn parameters(&self) -> &'a [Parameter] {
        match self {
            Block::Chunk(_) => &[],
            Block::Function(function) => &function.parameters,
        }
    }

    /// Bindings and directly nested functions of this block.
    ///
    /// Statements nested in `if`/`while`/`for` belong to the enclosing block;
    /// function bodies do not.
    pub fn contents(&self) -> BlockContents<'a> {
        let mut collector = BlockCollector::default();
        for parameter in self.parameters() {
            collector.visit_parameter(parameter);
        }
        for statement in self.body() {
            collector.visit_statement(statement);
        }
        collector.contents
    }

    /// Assignment statements of this block, in source order
    pub fn assignments(&self) -> Vec<&'a Assignment> {
        self.contents()
            .bindings
            .into_iter()
            .filter_map(|binding| match binding {
                Binding::Assignment(assignment) => Some(assignment),
                Binding::Loop(_) => None,
            })
            .collect()
    }

    /// Function declarations directly nested in this block
    pub fn functions(&self) -> Vec<&'a FunctionDeclaration> {
        self.contents().functions
    }
}

#[derive(Default)]
struct BlockCollector<'a> {
    contents: BlockContents<'a>,
}

impl<'a> Visitor<'a> for BlockCollector<'a> {
    fn visit_assignment(&mut self, assignment: &'a Assignment) {
        self.contents.bindings.push(Binding::Assignment(assignment));
        walk_assignment(self, assignment);
    }

    fn visit_for(&mut self, for_loop: &'a ForLoop) {
        self.contents.bindings.push(Binding::Loop(for_loop));
        walk_for(self, for_loop);
    }

    fn visit_function(&mut self, function: &'a FunctionDeclaration) {
        // Only direct children; the nested block collects its own contents
        self.contents.functions.push(function);
    }

    fn visit_parameter(&mut self, parameter: &'a Parameter) {
        walk_parameter(self, parameter);
    }
}

/// Every block of a chunk paired with the id of its enclosing block,
/// parents before children.
pub fn collect_blocks(chunk: &Chunk) -> Vec<(Block<'_>, Option<&str>)> {
    let mut collector = NestedBlocks {
        blocks: vec![(Block::Chunk(chunk), None)],
        parents: vec![chunk.span.id.as_str()],
    };
    for statement in &chunk.body {
        collector.visit_statement(statement);
    }
    collector.blocks
}

struct NestedBlocks<'a> {
    blocks: Vec<(Block<'a>, Option<&'a str>)>,
    parents: Vec<&'a str>,
}

impl<'a> Visitor<'a> for NestedBlocks<'a> {
    fn visit_function(&mut self, function: &'a FunctionDeclaration) {
        let parent = self.parents.last().copied();
        self.blocks.push((Block::Function(function), parent));
        self.parents.push(function.span.id.as_str());
        walk_function(self, function);
        self.parents.pop();
    }
}
