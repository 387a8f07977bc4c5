//! Test mode end to end: alternating (input, expected) pairs.

use indoc::indoc;
use pretty_assertions::assert_eq;
use ylt::{
    DiscardConsumer, Error, ErrorKind, EventRecord, ParserProducer, RecordConsumer, TestRunner,
};

fn run_pairs(definitions: &str, input: &str) -> Result<(), Error> {
    let mut runner = TestRunner::new()?;
    if !definitions.is_empty() {
        runner.executor().engine().exec(definitions)?;
    }
    let mut bytes = input.as_bytes();
    let mut producer = ParserProducer::from_slice(&mut bytes);
    let mut discard = DiscardConsumer;
    runner.run(&mut producer, &mut discard)
}

#[test]
fn matching_pairs_pass() {
    run_pairs(
        "function double(x) return x * 2 end",
        indoc! {"
            !double 21
            ---
            42
            ---
            !double 2
            ---
            4
        "},
    )
    .unwrap();
}

#[test]
fn expected_documents_are_not_evaluated() {
    // `!double 21` in the expected position is compared literally, so
    // a rendered `42` does not match it.
    let err = run_pairs(
        "function double(x) return x * 2 end",
        indoc! {"
            !double 21
            ---
            !double 21
        "},
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Assertion);
}

#[test]
fn mismatches_point_at_the_input_document() {
    let err = run_pairs(
        "",
        indoc! {"
            ok: 1
            ---
            ok: 1
            ---
            ! 2 + 2
            ---
            5
        "},
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Assertion);
    // The third document starts at the `---` on line 4.
    assert_eq!(err.location.line, 4);
    assert!(err.message.contains("actual document differs"));
}

#[test]
fn evaluated_documents_are_forwarded_downstream() {
    let mut runner = TestRunner::new().unwrap();
    runner
        .executor()
        .engine()
        .exec("function double(x) return x * 2 end")
        .unwrap();
    let input = "!double 21\n---\n42\n";
    let mut bytes = input.as_bytes();
    let mut producer = ParserProducer::from_slice(&mut bytes);
    let mut record = EventRecord::new();
    {
        let mut downstream = RecordConsumer::new(&mut record);
        runner.run(&mut producer, &mut downstream).unwrap();
    }
    // Stream markers, then both documents' events (3 each: start,
    // scalar, end).
    assert_eq!(record.len(), 2 + 2 * 3);
}

#[test]
fn testcase_bindings_apply_per_pair() {
    run_pairs(
        "",
        indoc! {"
            !testcases
            - greeting: hello
            - greeting: goodbye
            ---
            message: ! greeting
            ---
            message: hello
            ---
            message: ! greeting
            ---
            message: goodbye
        "},
    )
    .unwrap();
}

#[test]
fn binding_arity_mismatches_fail() {
    let err = run_pairs(
        "",
        indoc! {"
            !testcases
            - x: 1
            - x: 2
            ---
            ! x
            ---
            1
        "},
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Assertion);
}

#[test]
fn non_mapping_bindings_are_type_errors() {
    let err = run_pairs(
        "",
        indoc! {"
            !testcases
            - 42
            ---
            ! 1
            ---
            1
        "},
    )
    .unwrap_err();
    assert_eq!(err.kind, ErrorKind::Type);
    assert!(err.message.contains("must be a mapping"));
}

#[test]
fn trailing_unpaired_documents_fail() {
    let err = run_pairs("", "ok: 1\n").unwrap_err();
    assert_eq!(err.kind, ErrorKind::Assertion);
    assert!(err.message.contains("no expected document"));
}
