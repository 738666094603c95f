use crate::ast::*;
use crate::id_generator::IdGenerator;
use ordered_float::OrderedFloat;

/// Programmatic AST construction.
///
/// Every node gets a fresh id from the document's [`IdGenerator`]; the line
/// counter starts at 1 and advances after each statement.
#[derive(Debug, Clone)]
pub struct AstBuilder {
    ids: IdGenerator,
    line: usize,
    offset: usize,
}

impl AstBuilder {
    pub fn new(path: &str) -> Self {
        Self {
            ids: IdGenerator::new(path),
            line: 1,
            offset: 0,
        }
    }

    pub fn current_line(&self) -> usize {
        self.line
    }

    /// Move the line counter; following nodes are placed on `line`
    pub fn at_line(&mut self, line: usize) -> &mut Self {
        self.line = line;
        self
    }

    fn span(&mut self) -> Span {
        let start = self.offset;
        self.offset += 1;
        Span::new(start, self.offset, self.line, self.ids.new_id())
    }

    fn expression(&mut self, kind: ExpressionKind) -> Expression {
        let span = self.span();
        Expression::new(kind, span)
    }

    fn statement_span(&mut self) -> Span {
        let span = self.span();
        self.line += 1;
        span
    }

    pub fn nil(&mut self) -> Expression {
        self.expression(ExpressionKind::Nil)
    }

    pub fn string(&mut self, value: impl Into<String>) -> Expression {
        self.expression(ExpressionKind::String {
            value: value.into(),
        })
    }

    pub fn number(&mut self, value: f64) -> Expression {
        self.expression(ExpressionKind::Number {
            value: OrderedFloat(value),
        })
    }

    pub fn boolean(&mut self, value: bool) -> Expression {
        self.expression(ExpressionKind::Boolean { value })
    }

    pub fn identifier(&mut self, name: impl Into<String>) -> Expression {
        self.expression(ExpressionKind::Identifier { name: name.into() })
    }

    pub fn member(&mut self, base: Expression, identifier: impl Into<String>) -> Expression {
        self.expression(ExpressionKind::Member {
            base: Box::new(base),
            identifier: identifier.into(),
        })
    }

    /// Dotted access path, `"a.b.c"` becomes `Member(Member(a, b), c)`
    pub fn path(&mut self, path: &str) -> Expression {
        let mut segments = path.split('.');
        let root = segments.next().unwrap_or_default();
        let mut expr = self.identifier(root);
        for segment in segments {
            expr = self.member(expr, segment);
        }
        expr
    }

    pub fn index(&mut self, base: Expression, index: Expression) -> Expression {
        self.expression(ExpressionKind::Index {
            base: Box::new(base),
            index: Box::new(index),
        })
    }

    pub fn slice(
        &mut self,
        base: Expression,
        left: Option<Expression>,
        right: Option<Expression>,
    ) -> Expression {
        self.expression(ExpressionKind::Slice {
            base: Box::new(base),
            left: left.map(Box::new),
            right: right.map(Box::new),
        })
    }

    pub fn call(&mut self, base: Expression, arguments: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::Call {
            base: Box::new(base),
            arguments,
        })
    }

    pub fn unary(&mut self, operator: UnaryOp, argument: Expression) -> Expression {
        self.expression(ExpressionKind::Unary {
            operator,
            argument: Box::new(argument),
        })
    }

    /// `@argument`
    pub fn reference(&mut self, argument: Expression) -> Expression {
        self.unary(UnaryOp::Reference, argument)
    }

    /// `new argument`
    pub fn new_instance(&mut self, argument: Expression) -> Expression {
        self.unary(UnaryOp::New, argument)
    }

    pub fn binary(&mut self, left: Expression, operator: BinaryOp, right: Expression) -> Expression {
        self.expression(ExpressionKind::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        })
    }

    pub fn map(&mut self, fields: Vec<(Expression, Expression)>) -> Expression {
        let fields = fields
            .into_iter()
            .map(|(key, value)| MapField { key, value })
            .collect();
        self.expression(ExpressionKind::Map { fields })
    }

    pub fn list(&mut self, items: Vec<Expression>) -> Expression {
        self.expression(ExpressionKind::List { items })
    }

    pub fn function(&mut self, parameters: Vec<Parameter>, body: Vec<Statement>) -> Expression {
        let declaration = FunctionDeclaration {
            parameters,
            body,
            span: self.span(),
        };
        self.expression(ExpressionKind::Function { declaration })
    }

    pub fn parameter(&mut self, name: impl Into<String>) -> Parameter {
        Parameter::Identifier {
            name: name.into(),
            span: self.span(),
        }
    }

    pub fn default_parameter(&mut self, name: impl Into<String>, default: Expression) -> Parameter {
        Parameter::Default {
            name: name.into(),
            default,
            span: self.span(),
        }
    }

    pub fn unknown(&mut self, kind: impl Into<String>) -> Expression {
        self.expression(ExpressionKind::Unknown { kind: kind.into() })
    }

    pub fn assign(&mut self, target: Expression, init: Expression) -> Statement {
        Statement::Assignment(Assignment {
            target,
            init,
            span: self.statement_span(),
        })
    }

    pub fn expression_statement(&mut self, expression: Expression) -> Statement {
        self.line += 1;
        Statement::Expression { expression }
    }

    pub fn if_statement(
        &mut self,
        clauses: Vec<(Expression, Vec<Statement>)>,
        else_body: Option<Vec<Statement>>,
    ) -> Statement {
        let clauses = clauses
            .into_iter()
            .map(|(condition, body)| IfClause { condition, body })
            .collect();
        Statement::If {
            clauses,
            else_body,
            span: self.statement_span(),
        }
    }

    pub fn while_loop(&mut self, condition: Expression, body: Vec<Statement>) -> Statement {
        Statement::While {
            condition,
            body,
            span: self.statement_span(),
        }
    }

    pub fn for_loop(
        &mut self,
        variable: impl Into<String>,
        iterator: Expression,
        body: Vec<Statement>,
    ) -> Statement {
        let variable = self.identifier(variable);
        Statement::For(ForLoop {
            variable,
            iterator,
            body,
            span: self.statement_span(),
        })
    }

    pub fn return_statement(&mut self, argument: Option<Expression>) -> Statement {
        Statement::Return {
            argument,
            span: self.statement_span(),
        }
    }

    pub fn chunk(&mut self, body: Vec<Statement>) -> Chunk {
        Chunk {
            body,
            span: self.span(),
        }
    }
}
