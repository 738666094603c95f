use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cell::OnceCell;
use std::fmt;

/// Span information for source location tracking
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    /// 1-based source line the node starts on
    pub line: usize,
    pub id: String,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, id: String) -> Self {
        Self {
            start,
            end,
            line,
            id,
        }
    }
}

/// Per-node memo for the structural hash and the canonical id.
///
/// Filled lazily by whoever hashes the tree; never serialized and never
/// taken into account by equality.
#[derive(Default, Clone)]
pub struct NodeMemo {
    hash: OnceCell<u32>,
    id: OnceCell<String>,
}

impl NodeMemo {
    pub fn hash(&self) -> Option<u32> {
        self.hash.get().copied()
    }

    pub fn id(&self) -> Option<&str> {
        self.id.get().map(String::as_str)
    }

    pub fn hash_or_init(&self, init: impl FnOnce() -> u32) -> u32 {
        *self.hash.get_or_init(init)
    }

    pub fn id_or_init(&self, init: impl FnOnce() -> String) -> &str {
        self.id.get_or_init(init)
    }
}

impl fmt::Debug for NodeMemo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeMemo")
            .field("hash", &self.hash.get())
            .finish_non_exhaustive()
    }
}

impl PartialEq for NodeMemo {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// Root block of a source file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub body: Vec<Statement>,
    pub span: Span,
}

/// Function literal; introduces its own lexical block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDeclaration {
    pub parameters: Vec<Parameter>,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Parameter {
    /// Plain parameter (`a`)
    Identifier { name: String, span: Span },

    /// Parameter with a default value (`a = 1`)
    Default {
        name: String,
        default: Expression,
        span: Span,
    },
}

impl Parameter {
    pub fn name(&self) -> &str {
        match self {
            Parameter::Identifier { name, .. } | Parameter::Default { name, .. } => name,
        }
    }

    pub fn default_value(&self) -> Option<&Expression> {
        match self {
            Parameter::Identifier { .. } => None,
            Parameter::Default { default, .. } => Some(default),
        }
    }

    pub fn span(&self) -> &Span {
        match self {
            Parameter::Identifier { span, .. } | Parameter::Default { span, .. } => span,
        }
    }
}

/// `target = init`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub target: Expression,
    pub init: Expression,
    pub span: Span,
}

/// `for variable in iterator`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForLoop {
    pub variable: Expression,
    pub iterator: Expression,
    pub body: Vec<Statement>,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IfClause {
    pub condition: Expression,
    pub body: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Statement {
    Assignment(Assignment),

    /// Bare expression (usually a call)
    Expression { expression: Expression },

    If {
        clauses: Vec<IfClause>,
        else_body: Option<Vec<Statement>>,
        span: Span,
    },

    While {
        condition: Expression,
        body: Vec<Statement>,
        span: Span,
    },

    For(ForLoop),

    Return {
        argument: Option<Expression>,
        span: Span,
    },

    Break { span: Span },

    Continue { span: Span },
}

/// Expression node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub kind: ExpressionKind,
    pub span: Span,
    #[serde(skip)]
    pub memo: NodeMemo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ExpressionKind {
    Nil,

    String { value: String },

    Number { value: OrderedFloat<f64> },

    Boolean { value: bool },

    Identifier { name: String },

    /// `base.identifier`
    Member {
        base: Box<Expression>,
        identifier: String,
    },

    /// `base[index]`
    Index {
        base: Box<Expression>,
        index: Box<Expression>,
    },

    /// `base[left:right]`
    Slice {
        base: Box<Expression>,
        left: Option<Box<Expression>>,
        right: Option<Box<Expression>>,
    },

    /// `base(arguments)`
    Call {
        base: Box<Expression>,
        arguments: Vec<Expression>,
    },

    Unary {
        operator: UnaryOp,
        argument: Box<Expression>,
    },

    Binary {
        left: Box<Expression>,
        operator: BinaryOp,
        right: Box<Expression>,
    },

    /// `{ key: value, ... }`
    Map { fields: Vec<MapField> },

    /// `[a, b, ...]`
    List { items: Vec<Expression> },

    Function { declaration: FunctionDeclaration },

    /// Node kinds the parser produces but the engine does not model
    /// (error recovery, comments, ...)
    Unknown { kind: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapField {
    pub key: Expression,
    pub value: Expression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    /// `@expr`: take the callable itself instead of invoking it
    Reference,
    /// `new expr`
    New,
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Power,
    Equals,
    NotEquals,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    And,
    Or,
    Isa,
}

impl UnaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnaryOp::Reference => "@",
            UnaryOp::New => "new ",
            UnaryOp::Negate => "-",
            UnaryOp::Not => "not ",
        }
    }
}

impl BinaryOp {
    pub fn as_str(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
            BinaryOp::Power => "^",
            BinaryOp::Equals => "==",
            BinaryOp::NotEquals => "!=",
            BinaryOp::LessThan => "<",
            BinaryOp::LessThanOrEqual => "<=",
            BinaryOp::GreaterThan => ">",
            BinaryOp::GreaterThanOrEqual => ">=",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Isa => "isa",
        }
    }
}

impl Expression {
    pub fn new(kind: ExpressionKind, span: Span) -> Self {
        Self {
            kind,
            span,
            memo: NodeMemo::default(),
        }
    }

    /// Identifier name, if this is a plain identifier
    pub fn as_identifier(&self) -> Option<&str> {
        match &self.kind {
            ExpressionKind::Identifier { name } => Some(name),
            _ => None,
        }
    }

    /// Literal or collection constructor
    pub fn is_value(&self) -> bool {
        matches!(
            self.kind,
            ExpressionKind::Nil
                | ExpressionKind::String { .. }
                | ExpressionKind::Number { .. }
                | ExpressionKind::Boolean { .. }
                | ExpressionKind::Map { .. }
                | ExpressionKind::List { .. }
        )
    }

    /// Short name of the node kind, for diagnostics
    pub fn kind_name(&self) -> &str {
        match &self.kind {
            ExpressionKind::Nil => "Nil",
            ExpressionKind::String { .. } => "String",
            ExpressionKind::Number { .. } => "Number",
            ExpressionKind::Boolean { .. } => "Boolean",
            ExpressionKind::Identifier { .. } => "Identifier",
            ExpressionKind::Member { .. } => "Member",
            ExpressionKind::Index { .. } => "Index",
            ExpressionKind::Slice { .. } => "Slice",
            ExpressionKind::Call { .. } => "Call",
            ExpressionKind::Unary { .. } => "Unary",
            ExpressionKind::Binary { .. } => "Binary",
            ExpressionKind::Map { .. } => "Map",
            ExpressionKind::List { .. } => "List",
            ExpressionKind::Function { .. } => "Function",
            ExpressionKind::Unknown { kind } => kind,
        }
    }
}

impl Chunk {
    pub fn new(span: Span) -> Self {
        Self {
            body: Vec::new(),
            span,
        }
    }
}
