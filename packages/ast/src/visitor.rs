use crate::ast::*;

/// Visitor pattern for traversing AST nodes immutably
///
/// Every `visit_*` method defaults to the matching `walk_*` function, which
/// walks the entire subtree. Override the methods you care about; call the
/// `walk_*` function from the override to keep descending.
pub trait Visitor<'ast>: Sized {
    fn visit_chunk(&mut self, chunk: &'ast Chunk) {
        walk_chunk(self, chunk);
    }

    fn visit_statement(&mut self, statement: &'ast Statement) {
        walk_statement(self, statement);
    }

    fn visit_assignment(&mut self, assignment: &'ast Assignment) {
        walk_assignment(self, assignment);
    }

    fn visit_for(&mut self, for_loop: &'ast ForLoop) {
        walk_for(self, for_loop);
    }

    fn visit_function(&mut self, function: &'ast FunctionDeclaration) {
        walk_function(self, function);
    }

    fn visit_parameter(&mut self, parameter: &'ast Parameter) {
        walk_parameter(self, parameter);
    }

    fn visit_expression(&mut self, expr: &'ast Expression) {
        walk_expression(self, expr);
    }
}

pub fn walk_chunk<'ast, V: Visitor<'ast>>(visitor: &mut V, chunk: &'ast Chunk) {
    for statement in &chunk.body {
        visitor.visit_statement(statement);
    }
}

pub fn walk_statement<'ast, V: Visitor<'ast>>(visitor: &mut V, statement: &'ast Statement) {
    match statement {
        Statement::Assignment(assignment) => visitor.visit_assignment(assignment),
        Statement::Expression { expression } => visitor.visit_expression(expression),
        Statement::If {
            clauses, else_body, ..
        } => {
            for clause in clauses {
                visitor.visit_expression(&clause.condition);
                for statement in &clause.body {
                    visitor.visit_statement(statement);
                }
            }
            if let Some(else_body) = else_body {
                for statement in else_body {
                    visitor.visit_statement(statement);
                }
            }
        }
        Statement::While {
            condition, body, ..
        } => {
            visitor.visit_expression(condition);
            for statement in body {
                visitor.visit_statement(statement);
            }
        }
        Statement::For(for_loop) => visitor.visit_for(for_loop),
        Statement::Return { argument, .. } => {
            if let Some(argument) = argument {
                visitor.visit_expression(argument);
            }
        }
        Statement::Break { .. } | Statement::Continue { .. } => {
            // Leaf nodes
        }
    }
}

pub fn walk_assignment<'ast, V: Visitor<'ast>>(visitor: &mut V, assignment: &'ast Assignment) {
    visitor.visit_expression(&assignment.target);
    visitor.visit_expression(&assignment.init);
}

pub fn walk_for<'ast, V: Visitor<'ast>>(visitor: &mut V, for_loop: &'ast ForLoop) {
    visitor.visit_expression(&for_loop.variable);
    visitor.visit_expression(&for_loop.iterator);
    for statement in &for_loop.body {
        visitor.visit_statement(statement);
    }
}

pub fn walk_function<'ast, V: Visitor<'ast>>(
    visitor: &mut V,
    function: &'ast FunctionDeclaration,
) {
    for parameter in &function.parameters {
        visitor.visit_parameter(parameter);
    }
    for statement in &function.body {
        visitor.visit_statement(statement);
    }
}

pub fn walk_parameter<'ast, V: Visitor<'ast>>(visitor: &mut V, parameter: &'ast Parameter) {
    if let Some(default) = parameter.default_value() {
        visitor.visit_expression(default);
    }
}

pub fn walk_expression<'ast, V: Visitor<'ast>>(visitor: &mut V, expr: &'ast Expression) {
    match &expr.kind {
        ExpressionKind::Nil
        | ExpressionKind::String { .. }
        | ExpressionKind::Number { .. }
        | ExpressionKind::Boolean { .. }
        | ExpressionKind::Identifier { .. }
        | ExpressionKind::Unknown { .. } => {
            // Leaf nodes
        }
        ExpressionKind::Member { base, .. } => {
            visitor.visit_expression(base);
        }
        ExpressionKind::Index { base, index } => {
            visitor.visit_expression(base);
            visitor.visit_expression(index);
        }
        ExpressionKind::Slice { base, left, right } => {
            visitor.visit_expression(base);
            if let Some(left) = left {
                visitor.visit_expression(left);
            }
            if let Some(right) = right {
                visitor.visit_expression(right);
            }
        }
        ExpressionKind::Call { base, arguments } => {
            visitor.visit_expression(base);
            for arg in arguments {
                visitor.visit_expression(arg);
            }
        }
        ExpressionKind::Unary { argument, .. } => {
            visitor.visit_expression(argument);
        }
        ExpressionKind::Binary { left, right, .. } => {
            visitor.visit_expression(left);
            visitor.visit_expression(right);
        }
        ExpressionKind::Map { fields } => {
            for field in fields {
                visitor.visit_expression(&field.key);
                visitor.visit_expression(&field.value);
            }
        }
        ExpressionKind::List { items } => {
            for item in items {
                visitor.visit_expression(item);
            }
        }
        ExpressionKind::Function { declaration } => {
            visitor.visit_function(declaration);
        }
    }
}
