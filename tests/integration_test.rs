use std::{cell::RefCell, rc::Rc};

use meat::{
    ast::SyntaxTree,
    builtins::Builtins,
    config::Config,
    interpreter::{ExecutionErrorKind, Interpreter},
    ledger::Ledger,
    parser::Parser,
};
use pretty_assertions::assert_eq;

fn run(source: &str) -> Result<String, String> {
    let builtins = Builtins::standard();
    let ledger =
        Ledger::parse(source, &builtins, &Config::default()).map_err(|e| e.to_string())?;
    let output = Rc::new(RefCell::new(Vec::new()));
    let mut interpreter = Interpreter::new(&ledger, &builtins, output.clone());
    interpreter.interpret().map_err(|e| e.to_string())?;
    Ok(String::from_utf8(output.take()).expect("Output should be valid UTF-8"))
}

fn test_valid_program(source: &str, expected_output: &str) {
    let output = run(source).expect("Interpret should work on valid program");
    assert_eq!(output, expected_output);
}

#[test]
fn test_arithmetic_program() {
    let source = r#"
    // precedence and associativity
    2 + 3 * 4;
    2 ^ 3 ^ 2;
    (2 + 3) * 4;
    "#;
    let expected_output = "(2 + (3 * 4)) = 14\n(2 ^ (3 ^ 2)) = 512\n(((2 + 3)) * 4) = 20\n";
    test_valid_program(source, expected_output);
}

#[test]
fn test_declarations_and_assertions() {
    let source = r#"
    f(a, b) = a*b + 1;
    x = 5;
    2x;
    ASSERT 10;
    f(2, 3);
    ASSERT 7;
    4!;
    ASSERT 24;
    "#;
    let expected_output = "(2 * x) = 10\n\
        ASSERT 10 passed (10)\n\
        f(2, 3) = 7\n\
        ASSERT 7 passed (7)\n\
        (4!) = 24\n\
        ASSERT 24 passed (24)\n";
    test_valid_program(source, expected_output);
}

#[test]
fn test_variables_are_silent() {
    test_valid_program("r = 2; area = pi r^2; /* comment */ r;", "r = 2\n");
}

#[test]
fn test_failed_assertion_reports_values() {
    let err = run("2+2; ASSERT 5;").unwrap_err();
    assert!(err.contains("expected 5, found 4"), "{err}");
}

#[test]
fn test_circular_definition_is_an_error() {
    let builtins = Builtins::standard();
    let ledger = Ledger::parse("x = x + 1;", &builtins, &Config::default()).unwrap();
    let output = Rc::new(RefCell::new(Vec::<u8>::new()));
    let mut interpreter = Interpreter::new(&ledger, &builtins, output);
    let err = interpreter.interpret().unwrap_err();
    assert!(matches!(
        err.kind(),
        ExecutionErrorKind::CircularDefinition { name, .. } if name == "x"
    ));
}

#[test]
fn test_errors_stop_the_run() {
    let err = run("1 + 1; 2 3;").unwrap_err();
    assert!(err.contains("Unexpected \"number\""), "{err}");
}

#[test]
fn test_tolerance_is_configurable() {
    let builtins = Builtins::standard();
    let config = Config {
        tolerance: 0.01,
        ..Config::default()
    };
    let ledger = Ledger::parse("pi; ASSERT 3.14;", &builtins, &config).unwrap();
    let output = Rc::new(RefCell::new(Vec::<u8>::new()));
    let mut interpreter = Interpreter::new(&ledger, &builtins, output).with_config(config);
    assert!(interpreter.interpret().is_ok());
}

#[test]
fn test_reserialized_tree_evaluates_the_same() {
    let sources = [
        "2+3*4;",
        "2^3^2;",
        "-2^2 + 3!;",
        "x = 3; 2x(4) - x/2;",
        "f(a, b) = a - b; f(5, 2)f(1, 3);",
        "8 - (4 - 2) - 1;",
        "sin(pi/6) + max(2, 3);",
        "x = 2; x + 1; x * 3; ASSERT 6; 2x^2 - x; -x!;",
    ];
    let values = |output: &str| -> Vec<String> {
        output
            .lines()
            .map(|line| line.rsplit(" = ").next().unwrap_or(line).to_string())
            .collect()
    };

    for source in sources {
        let expected = run(source).expect("program should run");

        let mut tree = SyntaxTree::new();
        let mut parser = Parser::new(source, &mut tree);
        let mut roots = Vec::new();
        while let Some(root) = parser.statement().expect("program should parse") {
            roots.push(root);
        }
        let reserialized: String = roots
            .iter()
            .map(|root| format!("{};\n", tree.infix(*root)))
            .collect();

        let output = run(&reserialized).expect("reserialized program should run");
        assert_eq!(values(&output), values(&expected), "{reserialized}");
        assert_eq!(output.lines().count(), roots.len() - source.matches(" = ").count());
    }
}
