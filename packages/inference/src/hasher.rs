use miniscript_ast::{Expression, ExpressionKind, FunctionDeclaration, Parameter, Statement};
use std::cell::RefCell;
use tracing::warn;

use crate::cache::RecencyCache;

/// Node kind seeds, mixed in first so that different shapes over the same
/// children hash apart
mod seed {
    pub const NIL: u32 = 1;
    pub const STRING: u32 = 2;
    pub const NUMBER: u32 = 3;
    pub const BOOLEAN: u32 = 4;
    pub const IDENTIFIER: u32 = 5;
    pub const ROOT: u32 = 6;
    pub const MEMBER: u32 = 7;
    pub const INDEX: u32 = 8;
    pub const SLICE: u32 = 9;
    pub const CALL: u32 = 10;
    pub const UNARY: u32 = 11;
    pub const BINARY: u32 = 12;
    pub const MAP: u32 = 13;
    pub const LIST: u32 = 14;
    pub const FUNCTION: u32 = 15;
    pub const UNKNOWN: u32 = 16;
    pub const STATEMENT: u32 = 17;
    pub const ABSENT: u32 = 18;
}

const PSEUDO_ROOTS: [&str; 3] = ["locals", "outer", "globals"];

fn combine(hash: u32, value: u32) -> u32 {
    (hash << 5).wrapping_sub(hash).wrapping_add(value)
}

fn is_locals(expr: &Expression) -> bool {
    expr.as_identifier() == Some("locals")
}

fn string_literal(expr: &Expression) -> Option<&str> {
    match &expr.kind {
        ExpressionKind::String { value } => Some(value),
        _ => None,
    }
}

fn quote(value: &str) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| format!("\"{}\"", value))
}

/// Structural hashing of expression trees.
///
/// `hash` is a cheap 32-bit bucket key; `id` is the exact canonical form
/// used to confirm a bucket hit. Both are memoized on the node. Accesses
/// that mean the same binding normalize to the same value: `locals.x` and
/// `x`, `a["b"]` and `a.b`.
#[derive(Debug)]
pub struct StructuralHasher {
    strings: RefCell<RecencyCache<String, u32>>,
}

impl StructuralHasher {
    pub fn new(cache_capacity: usize) -> Self {
        Self {
            strings: RefCell::new(RecencyCache::new(cache_capacity)),
        }
    }

    pub fn hash(&self, expr: &Expression) -> u32 {
        expr.memo.hash_or_init(|| self.compute_hash(expr))
    }

    pub fn id<'e>(&self, expr: &'e Expression) -> &'e str {
        expr.memo.id_or_init(|| self.compute_id(expr))
    }

    /// CRC32 of a string, served from the recency cache when possible
    pub fn hash_string(&self, value: &str) -> u32 {
        if let Some(hash) = self.strings.borrow_mut().get(value) {
            return *hash;
        }
        let hash = crc32fast::hash(value.as_bytes());
        self.strings.borrow_mut().set(value.to_string(), hash);
        hash
    }

    pub fn cached_strings(&self) -> usize {
        self.strings.borrow().len()
    }

    fn identifier_hash(&self, name: &str) -> u32 {
        let seed = if PSEUDO_ROOTS.contains(&name) {
            seed::ROOT
        } else {
            seed::IDENTIFIER
        };
        combine(seed, self.hash_string(name))
    }

    fn member_hash(&self, base: &Expression, name: &str) -> u32 {
        if is_locals(base) {
            return self.identifier_hash(name);
        }
        combine(combine(seed::MEMBER, self.hash(base)), self.hash_string(name))
    }

    fn optional_hash(&self, expr: Option<&Expression>) -> u32 {
        expr.map_or(seed::ABSENT, |expr| self.hash(expr))
    }

    fn compute_hash(&self, expr: &Expression) -> u32 {
        match &expr.kind {
            ExpressionKind::Nil => seed::NIL,
            ExpressionKind::String { value } => combine(seed::STRING, self.hash_string(value)),
            ExpressionKind::Number { value } => {
                let bits = value.0.to_bits();
                combine(seed::NUMBER, (bits ^ (bits >> 32)) as u32)
            }
            ExpressionKind::Boolean { value } => combine(seed::BOOLEAN, u32::from(*value)),
            ExpressionKind::Identifier { name } => self.identifier_hash(name),
            ExpressionKind::Member { base, identifier } => self.member_hash(base, identifier),
            ExpressionKind::Index { base, index } => match string_literal(index) {
                Some(name) => self.member_hash(base, name),
                None => combine(combine(seed::INDEX, self.hash(base)), self.hash(index)),
            },
            ExpressionKind::Slice { base, left, right } => {
                let hash = combine(seed::SLICE, self.hash(base));
                let hash = combine(hash, self.optional_hash(left.as_deref()));
                combine(hash, self.optional_hash(right.as_deref()))
            }
            ExpressionKind::Call { base, arguments } => arguments
                .iter()
                .fold(combine(seed::CALL, self.hash(base)), |hash, argument| {
                    combine(hash, self.hash(argument))
                }),
            ExpressionKind::Unary { operator, argument } => {
                let hash = combine(seed::UNARY, self.hash_string(operator.as_str()));
                combine(hash, self.hash(argument))
            }
            ExpressionKind::Binary {
                left,
                operator,
                right,
            } => {
                let hash = combine(seed::BINARY, self.hash(left));
                let hash = combine(hash, self.hash_string(operator.as_str()));
                combine(hash, self.hash(right))
            }
            ExpressionKind::Map { fields } => fields.iter().fold(seed::MAP, |hash, field| {
                combine(combine(hash, self.hash(&field.key)), self.hash(&field.value))
            }),
            ExpressionKind::List { items } => items
                .iter()
                .fold(seed::LIST, |hash, item| combine(hash, self.hash(item))),
            ExpressionKind::Function { declaration } => self.function_hash(declaration),
            ExpressionKind::Unknown { kind } => {
                warn!(kind = %kind, "No structural hash rule for node kind, hashing by kind name");
                combine(seed::UNKNOWN, self.hash_string(kind))
            }
        }
    }

    fn function_hash(&self, declaration: &FunctionDeclaration) -> u32 {
        let hash = declaration
            .parameters
            .iter()
            .fold(seed::FUNCTION, |hash, parameter| {
                let hash = combine(hash, self.hash_string(parameter.name()));
                combine(hash, self.optional_hash(parameter.default_value()))
            });
        self.body_hash(hash, &declaration.body)
    }

    fn body_hash(&self, hash: u32, body: &[Statement]) -> u32 {
        body.iter()
            .fold(hash, |hash, statement| combine(hash, self.statement_hash(statement)))
    }

    fn statement_hash(&self, statement: &Statement) -> u32 {
        match statement {
            Statement::Assignment(assignment) => {
                let hash = combine(seed::STATEMENT, self.hash(&assignment.target));
                combine(hash, self.hash(&assignment.init))
            }
            Statement::Expression { expression } => {
                combine(seed::STATEMENT, self.hash(expression))
            }
            Statement::If {
                clauses, else_body, ..
            } => {
                let hash = clauses.iter().fold(
                    combine(seed::STATEMENT, self.hash_string("if")),
                    |hash, clause| {
                        self.body_hash(combine(hash, self.hash(&clause.condition)), &clause.body)
                    },
                );
                match else_body {
                    Some(body) => self.body_hash(combine(hash, self.hash_string("else")), body),
                    None => hash,
                }
            }
            Statement::While {
                condition, body, ..
            } => {
                let hash = combine(seed::STATEMENT, self.hash_string("while"));
                self.body_hash(combine(hash, self.hash(condition)), body)
            }
            Statement::For(for_loop) => {
                let hash = combine(seed::STATEMENT, self.hash_string("for"));
                let hash = combine(hash, self.hash(&for_loop.variable));
                self.body_hash(combine(hash, self.hash(&for_loop.iterator)), &for_loop.body)
            }
            Statement::Return { argument, .. } => {
                let hash = combine(seed::STATEMENT, self.hash_string("return"));
                combine(hash, self.optional_hash(argument.as_ref()))
            }
            Statement::Break { .. } => combine(seed::STATEMENT, self.hash_string("break")),
            Statement::Continue { .. } => combine(seed::STATEMENT, self.hash_string("continue")),
        }
    }

    fn member_id(&self, base: &Expression, name: &str) -> String {
        if is_locals(base) {
            return name.to_string();
        }
        format!("{}.{}", self.id(base), name)
    }

    fn join<'e>(&self, exprs: impl IntoIterator<Item = &'e Expression>) -> String {
        exprs
            .into_iter()
            .map(|expr| self.id(expr))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn compute_id(&self, expr: &Expression) -> String {
        match &expr.kind {
            ExpressionKind::Nil => "null".to_string(),
            ExpressionKind::String { value } => quote(value),
            ExpressionKind::Number { value } => value.0.to_string(),
            ExpressionKind::Boolean { value } => value.to_string(),
            ExpressionKind::Identifier { name } => name.clone(),
            ExpressionKind::Member { base, identifier } => self.member_id(base, identifier),
            ExpressionKind::Index { base, index } => match string_literal(index) {
                Some(name) => self.member_id(base, name),
                None => format!("{}[{}]", self.id(base), self.id(index)),
            },
            ExpressionKind::Slice { base, left, right } => format!(
                "{}[{}:{}]",
                self.id(base),
                left.as_deref().map(|left| self.id(left)).unwrap_or_default(),
                right.as_deref().map(|right| self.id(right)).unwrap_or_default()
            ),
            ExpressionKind::Call { base, arguments } => {
                format!("{}({})", self.id(base), self.join(arguments))
            }
            ExpressionKind::Unary { operator, argument } => {
                format!("{}{}", operator.as_str(), self.id(argument))
            }
            ExpressionKind::Binary {
                left,
                operator,
                right,
            } => format!("({} {} {})", self.id(left), operator.as_str(), self.id(right)),
            ExpressionKind::Map { fields } => {
                let fields = fields
                    .iter()
                    .map(|field| format!("{}:{}", self.id(&field.key), self.id(&field.value)))
                    .collect::<Vec<_>>();
                format!("{{{}}}", fields.join(","))
            }
            ExpressionKind::List { items } => format!("[{}]", self.join(items)),
            ExpressionKind::Function { declaration } => self.function_id(declaration),
            ExpressionKind::Unknown { kind } => {
                warn!(kind = %kind, "No canonical form for node kind, using kind name");
                format!("<{}>", kind)
            }
        }
    }

    fn function_id(&self, declaration: &FunctionDeclaration) -> String {
        let parameters = declaration
            .parameters
            .iter()
            .map(|parameter| match parameter {
                Parameter::Identifier { name, .. } => name.clone(),
                Parameter::Default { name, default, .. } => format!("{}={}", name, self.id(default)),
            })
            .collect::<Vec<_>>();
        format!(
            "function({}){{{}}}",
            parameters.join(","),
            self.body_id(&declaration.body)
        )
    }

    fn body_id(&self, body: &[Statement]) -> String {
        body.iter()
            .map(|statement| self.statement_id(statement))
            .collect::<Vec<_>>()
            .join(";")
    }

    fn statement_id(&self, statement: &Statement) -> String {
        match statement {
            Statement::Assignment(assignment) => {
                format!("{}={}", self.id(&assignment.target), self.id(&assignment.init))
            }
            Statement::Expression { expression } => self.id(expression).to_string(),
            Statement::If {
                clauses, else_body, ..
            } => {
                let mut id = clauses
                    .iter()
                    .map(|clause| {
                        format!("if {} then {}", self.id(&clause.condition), self.body_id(&clause.body))
                    })
                    .collect::<Vec<_>>()
                    .join(" else ");
                if let Some(body) = else_body {
                    id.push_str(&format!(" else {}", self.body_id(body)));
                }
                id.push_str(" end");
                id
            }
            Statement::While {
                condition, body, ..
            } => format!("while {} {} end", self.id(condition), self.body_id(body)),
            Statement::For(for_loop) => format!(
                "for {} in {} {} end",
                self.id(&for_loop.variable),
                self.id(&for_loop.iterator),
                self.body_id(&for_loop.body)
            ),
            Statement::Return { argument, .. } => match argument {
                Some(argument) => format!("return {}", self.id(argument)),
                None => "return".to_string(),
            },
            Statement::Break { .. } => "break".to_string(),
            Statement::Continue { .. } => "continue".to_string(),
        }
    }
}

impl Default for StructuralHasher {
    fn default() -> Self {
        Self::new(crate::cache::DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miniscript_ast::AstBuilder;

    #[test]
    fn test_member_paths_differ() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let a_b = ast.path("a.b");
        let a_c = ast.path("a.c");

        assert_ne!(hasher.hash(&a_b), hasher.hash(&a_c));
        assert_ne!(hasher.id(&a_b), hasher.id(&a_c));
        assert_eq!(hasher.id(&a_b), "a.b");
    }

    #[test]
    fn test_identical_structure_hashes_equal() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let first = ast.path("a.b.c");
        let second = ast.path("a.b.c");

        assert_eq!(hasher.hash(&first), hasher.hash(&second));
        assert_eq!(hasher.id(&first), hasher.id(&second));
    }

    #[test]
    fn test_locals_prefix_normalizes() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let plain = ast.identifier("x");
        let prefixed = ast.path("locals.x");

        assert_eq!(hasher.hash(&plain), hasher.hash(&prefixed));
        assert_eq!(hasher.id(&prefixed), "x");
    }

    #[test]
    fn test_string_index_normalizes_to_member() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let dotted = ast.path("a.b");
        let base = ast.identifier("a");
        let key = ast.string("b");
        let indexed = ast.index(base, key);

        assert_eq!(hasher.hash(&dotted), hasher.hash(&indexed));
        assert_eq!(hasher.id(&indexed), "a.b");
    }

    #[test]
    fn test_globals_root_is_distinct() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let plain = ast.identifier("x");
        let global = ast.path("globals.x");

        assert_ne!(hasher.hash(&plain), hasher.hash(&global));
        assert_eq!(hasher.id(&global), "globals.x");
    }

    #[test]
    fn test_canonical_forms() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let callee = ast.path("a.b");
        let one = ast.number(1.0);
        let text = ast.string("x\"y");
        let call = ast.call(callee, vec![one, text]);
        assert_eq!(hasher.id(&call), "a.b(1,\"x\\\"y\")");

        let base = ast.identifier("list");
        let index = ast.identifier("i");
        let indexed = ast.index(base, index);
        assert_eq!(hasher.id(&indexed), "list[i]");

        let target = ast.identifier("f");
        let reference = ast.reference(target);
        assert_eq!(hasher.id(&reference), "@f");
    }

    #[test]
    fn test_functions_hash_their_bodies() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");

        let x = ast.identifier("x");
        let one = ast.number(1.0);
        let first_body = ast.assign(x, one);
        let first = ast.function(vec![], vec![first_body]);

        let x = ast.identifier("x");
        let two = ast.number(2.0);
        let second_body = ast.assign(x, two);
        let second = ast.function(vec![], vec![second_body]);

        assert_ne!(hasher.hash(&first), hasher.hash(&second));
        assert_eq!(hasher.id(&first), "function(){x=1}");
    }

    #[test]
    fn test_unknown_kind_is_deterministic() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let first = ast.unknown("Comment");
        let second = ast.unknown("Comment");

        assert_eq!(hasher.hash(&first), hasher.hash(&second));
        assert_eq!(hasher.id(&first), "<Comment>");
    }

    #[test]
    fn test_results_are_memoized() {
        let hasher = StructuralHasher::default();
        let mut ast = AstBuilder::new("/test.src");
        let expr = ast.path("a.b");

        assert!(expr.memo.hash().is_none());
        let hash = hasher.hash(&expr);
        assert_eq!(expr.memo.hash(), Some(hash));
        assert!(hasher.cached_strings() > 0);
    }

    #[test]
    fn test_string_cache_is_bounded() {
        let hasher = StructuralHasher::new(2);
        hasher.hash_string("a");
        hasher.hash_string("b");
        hasher.hash_string("c");
        assert_eq!(hasher.cached_strings(), 2);
        assert_eq!(hasher.hash_string("a"), crc32fast::hash(b"a"));
    }
}
