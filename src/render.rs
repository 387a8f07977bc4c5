//! Renderer: serialize a Lua value back into YAML events.
//!
//! The converse of the tree builder. The driver node's anchor is
//! inherited by the root event of the rendering; positions on the
//! synthesized events stay at their defaults because they have no source
//! to point at (errors still carry the driver's position).

use libyaml_safer::{Event, MappingStyle, ScalarStyle, SequenceStyle};
use mlua::{Table, Value};

use crate::engine::{Shape, is_void, sorted_keys, table_shape};
use crate::error::{Error, ErrorKind};
use crate::location::Location;

pub(crate) type EventSink<'a> = dyn FnMut(Event) -> Result<(), Error> + 'a;

/// Emit the event representation of `value` into `sink`.
pub(crate) fn render_value(
    value: &Value,
    anchor: Option<&str>,
    location: Location,
    sink: &mut EventSink<'_>,
) -> Result<(), Error> {
    match value {
        Value::Nil => scalar(sink, anchor, "~", ScalarStyle::Plain),
        Value::Boolean(true) => scalar(sink, anchor, "true", ScalarStyle::Plain),
        Value::Boolean(false) => scalar(sink, anchor, "false", ScalarStyle::Plain),
        Value::Integer(integer) => {
            let mut digits = itoa::Buffer::new();
            scalar(sink, anchor, digits.format(*integer), ScalarStyle::Plain)
        }
        Value::Number(number) => {
            let mut digits = ryu::Buffer::new();
            let text = digits.format(*number);
            // Keep finite floats reading back as floats.
            if number.is_finite() && !text.contains('.') && !text.contains('e') {
                let mut text = text.to_owned();
                text.push_str(".0");
                scalar(sink, anchor, &text, ScalarStyle::Plain)
            } else {
                scalar(sink, anchor, text, ScalarStyle::Plain)
            }
        }
        Value::String(string) => {
            let bytes = string.as_bytes();
            let text = String::from_utf8_lossy(&bytes);
            scalar(sink, anchor, &text, string_style(&text))
        }
        Value::Table(table) => render_table(table, anchor, location, sink),
        other if is_void(other) => Err(Error::new(
            ErrorKind::Render,
            "expression returned no value",
        )
        .with_location(location)),
        other => Err(Error::new(ErrorKind::Type, other.type_name())
            .with_location(location)
            .with_context("While rendering a value, got unexpected type")),
    }
}

/// Style selection for rendered strings: a pure function of the bytes.
/// First match wins.
fn string_style(text: &str) -> ScalarStyle {
    let bytes = text.as_bytes();
    if text.contains('\n') {
        ScalarStyle::Literal
    } else if text == "true" || text == "false" {
        ScalarStyle::DoubleQuoted
    } else if bytes.len() > 100 {
        ScalarStyle::Folded
    } else if bytes.first().is_some_and(u8::is_ascii_digit) {
        ScalarStyle::DoubleQuoted
    } else if bytes.len() > 1 && bytes[0] == b'.' && bytes[1].is_ascii_digit() {
        ScalarStyle::DoubleQuoted
    } else {
        ScalarStyle::Plain
    }
}

fn scalar(
    sink: &mut EventSink<'_>,
    anchor: Option<&str>,
    value: &str,
    style: ScalarStyle,
) -> Result<(), Error> {
    sink(Event::scalar(anchor, None, value, true, true, style))
}

fn render_table(
    table: &Table,
    anchor: Option<&str>,
    location: Location,
    sink: &mut EventSink<'_>,
) -> Result<(), Error> {
    match table_shape(table).map_err(|err| err.with_location(location))? {
        Shape::Sequence(length) => {
            sink(Event::sequence_start(
                anchor,
                None,
                true,
                SequenceStyle::Block,
            ))?;
            for index in 1..=length {
                let element: Value = table.get(index).map_err(|err| {
                    Error::from(err)
                        .with_location(location)
                        .with_context("While rendering a sequence")
                })?;
                render_value(&element, None, location, sink)?;
            }
            sink(Event::sequence_end())
        }
        Shape::Mapping => {
            sink(Event::mapping_start(
                anchor,
                None,
                true,
                MappingStyle::Block,
            ))?;
            let keys = sorted_keys(table).map_err(|err| {
                err.with_location(location)
                    .with_context("While rendering a mapping")
            })?;
            for key in keys {
                render_value(&key, None, location, sink)?;
                let entry: Value = table.get(key).map_err(|err| {
                    Error::from(err)
                        .with_location(location)
                        .with_context("While rendering a mapping")
                })?;
                render_value(&entry, None, location, sink)?;
            }
            sink(Event::mapping_end())
        }
    }
}

#[cfg(test)]
mod tests {
    use libyaml_safer::EventData;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::engine::{Engine, void};

    fn render_to_events(value: &Value, anchor: Option<&str>) -> Vec<Event> {
        let mut events = Vec::new();
        render_value(value, anchor, Location::UNKNOWN, &mut |event| {
            events.push(event);
            Ok(())
        })
        .unwrap();
        events
    }

    fn scalar_parts(event: &Event) -> (String, ScalarStyle) {
        match &event.data {
            EventData::Scalar { value, style, .. } => (value.clone(), *style),
            other => panic!("expected a scalar, got {other:?}"),
        }
    }

    #[test]
    fn scalars_render_plain() {
        let engine = Engine::new().unwrap();
        for (expr, expected) in [
            ("nil", "~"),
            ("true", "true"),
            ("42", "42"),
            ("-1", "-1"),
        ] {
            let value = engine.eval(expr, Location::UNKNOWN).unwrap();
            let events = render_to_events(&value, None);
            assert_eq!(events.len(), 1);
            let (text, style) = scalar_parts(&events[0]);
            assert_eq!(text, expected);
            assert_eq!(style, ScalarStyle::Plain);
        }
    }

    #[test]
    fn floats_always_read_back_as_floats() {
        let events = render_to_events(&Value::Number(42.0), None);
        assert_eq!(scalar_parts(&events[0]).0, "42.0");
        let events = render_to_events(&Value::Number(0.25), None);
        assert_eq!(scalar_parts(&events[0]).0, "0.25");
    }

    #[test]
    fn string_styles_follow_the_rules() {
        assert_eq!(string_style("plain text"), ScalarStyle::Plain);
        assert_eq!(string_style("two\nlines"), ScalarStyle::Literal);
        assert_eq!(string_style("true"), ScalarStyle::DoubleQuoted);
        assert_eq!(string_style("false"), ScalarStyle::DoubleQuoted);
        assert_eq!(string_style(&"x".repeat(120)), ScalarStyle::Folded);
        assert_eq!(string_style("1 potato"), ScalarStyle::DoubleQuoted);
        assert_eq!(string_style(".5 step"), ScalarStyle::DoubleQuoted);
        assert_eq!(string_style("."), ScalarStyle::Plain);
        assert_eq!(string_style(""), ScalarStyle::Plain);
    }

    #[test]
    fn sequences_inherit_the_anchor_at_the_root_only() {
        let engine = Engine::new().unwrap();
        let value = engine.eval("{1, {2}}", Location::UNKNOWN).unwrap();
        let events = render_to_events(&value, Some("root"));
        match &events[0].data {
            EventData::SequenceStart { anchor, .. } => {
                assert_eq!(anchor.as_deref(), Some("root"));
            }
            other => panic!("expected a sequence start, got {other:?}"),
        }
        match &events[2].data {
            EventData::SequenceStart { anchor, .. } => assert!(anchor.is_none()),
            other => panic!("expected a nested sequence start, got {other:?}"),
        }
    }

    #[test]
    fn mappings_render_keys_in_sorted_order() {
        let engine = Engine::new().unwrap();
        let value = engine
            .eval("{ b = 1, a = 2, [10] = 3, [2] = 4 }", Location::UNKNOWN)
            .unwrap();
        let events = render_to_events(&value, None);
        let keys: Vec<String> = events
            .iter()
            .filter_map(|event| match &event.data {
                EventData::Scalar { value, .. } => Some(value.clone()),
                _ => None,
            })
            .step_by(2)
            .collect();
        assert_eq!(keys, ["2", "10", "a", "b"]);
    }

    #[test]
    fn void_and_functions_do_not_render() {
        let err = render_to_events_err(&void());
        assert_eq!(err.kind, ErrorKind::Render);

        let engine = Engine::new().unwrap();
        let function = engine
            .eval("function() return 1 end", Location::UNKNOWN)
            .unwrap();
        let err = render_to_events_err(&function);
        assert_eq!(err.kind, ErrorKind::Type);
        assert_eq!(err.message, "function");
    }

    fn render_to_events_err(value: &Value) -> Error {
        render_value(value, None, Location::new(1, 1), &mut |_event| Ok(()))
            .unwrap_err()
    }
}
