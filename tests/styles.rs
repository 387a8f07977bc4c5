//! Scalar style selection for rendered strings.

use libyaml_safer::{EventData, Parser, ScalarStyle};
use pretty_assertions::assert_eq;
use ylt::{Executor, evaluate_str_with};

/// Evaluate `! <expression>` and return the (value, style) of the single
/// scalar in the output.
fn rendered_scalar(expression: &str) -> (String, ScalarStyle) {
    let mut executor = Executor::new().unwrap();
    let input = format!("! {expression}\n");
    let output = evaluate_str_with(&mut executor, &input).unwrap();

    let mut bytes = output.as_bytes();
    let mut parser = Parser::new();
    parser.set_input_string(&mut bytes);
    loop {
        let event = parser.parse().unwrap();
        match event.data {
            EventData::Scalar { value, style, .. } => return (value, style),
            EventData::StreamEnd => panic!("no scalar in output {output:?}"),
            _ => continue,
        }
    }
}

#[test]
fn plain_strings_stay_plain() {
    let (value, style) = rendered_scalar("'hello world'");
    assert_eq!(value, "hello world");
    assert_eq!(style, ScalarStyle::Plain);
}

#[test]
fn boolean_lookalikes_are_double_quoted() {
    let (value, style) = rendered_scalar("'true'");
    assert_eq!(value, "true");
    assert_eq!(style, ScalarStyle::DoubleQuoted);

    let (value, style) = rendered_scalar("'false'");
    assert_eq!(value, "false");
    assert_eq!(style, ScalarStyle::DoubleQuoted);
}

#[test]
fn newlines_force_literal_style() {
    // YAML double-quoting turns the escape into a real newline; the bare
    // tag then pushes those bytes as a string.
    let (value, style) = rendered_scalar("\"line one\\nline two\"");
    assert_eq!(value, "line one\nline two");
    assert_eq!(style, ScalarStyle::Literal);
}

#[test]
fn long_strings_fold() {
    let (value, style) = rendered_scalar("string.rep('x', 120)");
    assert_eq!(value.len(), 120);
    assert_eq!(style, ScalarStyle::Folded);
}

#[test]
fn leading_digits_are_double_quoted() {
    let (value, style) = rendered_scalar("'1 potato'");
    assert_eq!(value, "1 potato");
    assert_eq!(style, ScalarStyle::DoubleQuoted);

    let (value, style) = rendered_scalar("'.5 step'");
    assert_eq!(value, ".5 step");
    assert_eq!(style, ScalarStyle::DoubleQuoted);
}

#[test]
fn actual_booleans_and_numbers_stay_plain() {
    for expression in ["true", "false", "42", "-1", "1.5"] {
        let (_, style) = rendered_scalar(expression);
        assert_eq!(style, ScalarStyle::Plain, "for {expression}");
    }
}
