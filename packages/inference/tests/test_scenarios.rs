/// End-to-end inference scenarios
///
/// Trees are built with the AST builder, analyzed through a `Document`,
/// and queried the way an editor would: resolve a name in a block, walk its
/// members, enumerate completions, jump to definitions.
use anyhow::Result;
use miniscript_ast::{AstBuilder, Chunk, ExpressionKind, Statement};
use miniscript_catalog::{tags, Container};
use miniscript_inference::{
    Document, Entity, EntityKind, InferenceOptions, Property, StructuralHasher, TypeManager,
};
use std::collections::BTreeSet;
use std::rc::Rc;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn types(tags: &[&str]) -> BTreeSet<String> {
    tags.iter().map(|tag| tag.to_string()).collect()
}

fn analyzed(chunk: &Chunk) -> Result<Document<'_>> {
    init_logging();
    let mut document = Document::with_intrinsics(chunk, InferenceOptions::default())?;
    document.analyze()?;
    Ok(document)
}

fn function_block(statement: &Statement) -> String {
    match statement {
        Statement::Assignment(assignment) => match &assignment.init.kind {
            ExpressionKind::Function { declaration } => declaration.span.id.clone(),
            other => panic!("Expected a function initializer, got {:?}", other),
        },
        other => panic!("Expected an assignment, got {:?}", other),
    }
}

#[test]
fn test_string_assignment() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("test");
    let init = ast.string("123");
    let statement = ast.assign(target, init);
    let chunk = ast.chunk(vec![statement]);

    let document = analyzed(&chunk)?;
    let test = document.resolve(document.root_id(), "test")?;
    assert_eq!(test.types(), types(&["string"]));
    Ok(())
}

#[test]
fn test_member_assignment_on_map() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("test");
    let init = ast.map(vec![]);
    let create = ast.assign(target, init);
    let target = ast.path("test.foo");
    let init = ast.number(123.0);
    let assign = ast.assign(target, init);
    let chunk = ast.chunk(vec![create, assign]);

    let document = analyzed(&chunk)?;
    let test = document.resolve(document.root_id(), "test")?;
    assert_eq!(test.types(), types(&["map"]));

    let foo = test.resolve_property(&Property::Identifier("foo"), false, document.type_manager());
    assert_eq!(foo.types(), types(&["number"]));
    Ok(())
}

#[test]
fn test_index_assignment_on_map() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("test");
    let init = ast.map(vec![]);
    let create = ast.assign(target, init);
    let base = ast.identifier("test");
    let key = ast.number(222.0);
    let target = ast.index(base, key);
    let init = ast.string("hello");
    let assign = ast.assign(target, init);
    let chunk = ast.chunk(vec![create, assign]);

    let document = analyzed(&chunk)?;
    let test = document.resolve(document.root_id(), "test")?;
    let key = Entity::of_type(EntityKind::Literal, tags::NUMBER);
    let value = test.resolve_property(&Property::Value(&key), false, document.type_manager());
    assert_eq!(value.types(), types(&["string"]));
    Ok(())
}

#[test]
fn test_universal_definition_beats_single_type_match() -> Result<()> {
    let container = Container::from_json(
        r#"{
            "general": { "definitions": {
                "describe": { "type": "function", "returns": ["string"] }
            } },
            "number": { "definitions": {} },
            "string": { "definitions": {
                "describe": { "type": "function", "returns": ["list"] }
            } }
        }"#,
    )?;
    let manager = TypeManager::new(Rc::new(container));

    let found = manager
        .get_definition(&types(&["number", "string"]), "describe", false)
        .expect("describe resolves");
    assert_eq!(found.types(), types(&["string"]));

    // The same rule applies to values inferred from source
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("x");
    let init = ast.number(1.0);
    let first = ast.assign(target, init);
    let target = ast.identifier("x");
    let init = ast.string("a");
    let second = ast.assign(target, init);
    let target = ast.identifier("d");
    let base = ast.identifier("x");
    let describe = ast.member(base, "describe");
    let third = ast.assign(target, describe);
    let chunk = ast.chunk(vec![first, second, third]);

    let mut document = Document::new(&chunk, manager, InferenceOptions::default());
    document.analyze()?;
    let d = document.resolve(document.root_id(), "d")?;
    assert_eq!(d.types(), types(&["string"]));
    Ok(())
}

#[test]
fn test_aliases_observe_mutation() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("a");
    let init = ast.map(vec![]);
    let create = ast.assign(target, init);
    let target = ast.identifier("b");
    let init = ast.identifier("a");
    let alias = ast.assign(target, init);
    let target = ast.path("b.count");
    let init = ast.number(0.0);
    let mutate = ast.assign(target, init);
    let chunk = ast.chunk(vec![create, alias, mutate]);

    let document = analyzed(&chunk)?;
    let root = document.root_id();
    let a = document.resolve(root, "a")?;
    assert!(a.ptr_eq(&document.resolve(root, "b")?));

    let query = ast.path("a.count");
    assert!(document.resolve_expression(root, &query)?.has_type(tags::NUMBER));
    Ok(())
}

#[test]
fn test_prototype_members_and_methods() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("Animal");
    let key = ast.string("sound");
    let value = ast.string("...");
    let init = ast.map(vec![(key, value)]);
    let class = ast.assign(target, init);

    let target = ast.identifier("s");
    let init = ast.path("self.sound");
    let body = ast.assign(target, init);
    let method = ast.function(vec![], vec![body]);
    let target = ast.path("Animal.speak");
    let speak = ast.assign(target, method);
    let method_block = function_block(&speak);

    let target = ast.identifier("dog");
    let prototype = ast.identifier("Animal");
    let init = ast.new_instance(prototype);
    let instance = ast.assign(target, init);
    let chunk = ast.chunk(vec![class, speak, instance]);

    let document = analyzed(&chunk)?;
    let root = document.root_id();

    let sound = ast.path("dog.sound");
    assert!(document.resolve_expression(root, &sound)?.has_type(tags::STRING));

    let speak = ast.path("dog.speak");
    let reference = ast.reference(speak);
    assert!(document.resolve_expression(root, &reference)?.is_callable());

    assert!(document.resolve(&method_block, "s")?.has_type(tags::STRING));
    Ok(())
}

#[test]
fn test_loops_and_completions() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let one = ast.number(1.0);
    let two = ast.number(2.0);
    let init = ast.list(vec![one, two]);
    let target = ast.identifier("values");
    let create = ast.assign(target, init);

    let target = ast.identifier("total");
    let init = ast.identifier("value");
    let body = ast.assign(target, init);
    let iterator = ast.identifier("values");
    let for_loop = ast.for_loop("value", iterator, vec![body]);
    let chunk = ast.chunk(vec![create, for_loop]);

    let document = analyzed(&chunk)?;
    let root = document.root_id();
    assert!(document.resolve(root, "value")?.has_type(tags::NUMBER));
    assert!(document.resolve(root, "total")?.has_type(tags::NUMBER));
    assert!(document.resolve(root, "__value_idx")?.has_type(tags::NUMBER));

    let identifiers = document.get_all_identifiers(root)?;
    for name in ["values", "value", "total", "print"] {
        assert!(identifiers.contains_key(name), "missing completion {}", name);
    }
    Ok(())
}

#[test]
fn test_minimal_options_skip_loop_index() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let iterator = ast.string("abc");
    let for_loop = ast.for_loop("ch", iterator, vec![]);
    let chunk = ast.chunk(vec![for_loop]);

    let mut document = Document::with_intrinsics(&chunk, InferenceOptions::minimal())?;
    document.analyze()?;
    let root = document.root_id();
    assert!(document.resolve(root, "ch")?.has_type(tags::STRING));
    assert!(!document.globals().has_property(&Property::Identifier("__ch_idx")));
    Ok(())
}

#[test]
fn test_definitions_by_structure() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("config");
    let init = ast.map(vec![]);
    let create = ast.assign(target, init);
    let target = ast.path("config.path");
    let init = ast.string("/tmp");
    let assign = ast.assign(target, init);
    let chunk = ast.chunk(vec![create, assign]);

    let document = analyzed(&chunk)?;
    let root = document.root_id();

    let base = ast.identifier("config");
    let key = ast.string("path");
    let indexed = ast.index(base, key);
    let found = document.find_definitions(root, &indexed)?;
    assert_eq!(found.len(), 1);

    let other = ast.path("config.name");
    assert!(document.find_definitions(root, &other)?.is_empty());
    Ok(())
}

#[test]
fn test_structural_ids_are_stable_across_parses() {
    let hasher = StructuralHasher::default();
    let mut first = AstBuilder::new("/one.src");
    let mut second = AstBuilder::new("/two.src");

    let left = first.path("a.b");
    let right = second.path("a.b");
    assert_eq!(hasher.hash(&left), hasher.hash(&right));
    assert_eq!(hasher.id(&left), hasher.id(&right));

    let different = second.path("a.c");
    assert_ne!(hasher.id(&left), hasher.id(&different));
    assert_ne!(hasher.hash(&left), hasher.hash(&different));
}

#[test]
fn test_unresolvable_expressions_degrade_to_any() -> Result<()> {
    let mut ast = AstBuilder::new("/scenario.src");
    let target = ast.identifier("x");
    let init = ast.unknown("ErrorNode");
    let statement = ast.assign(target, init);
    let chunk = ast.chunk(vec![statement]);

    let document = analyzed(&chunk)?;
    let root = document.root_id();
    assert!(document.resolve(root, "x")?.has_type(tags::ANY));
    assert!(document.resolve(root, "never_defined")?.has_type(tags::ANY));

    let missing = ast.path("x.y.z");
    assert!(document.resolve_expression(root, &missing)?.has_type(tags::ANY));
    Ok(())
}
