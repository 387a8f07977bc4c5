//! The producer/consumer seam around the evaluator.
//!
//! Events enter through a [`Producer`] and leave through a [`Consumer`].
//! A consumer may also be handed an expression result to interpret in
//! place of the event; the event then only contributes its anchor and
//! position. This replaces the function-pointer-plus-data convention of
//! classic libyaml callbacks with two small traits.

use std::io::{BufRead, Write};

use libyaml_safer::{Emitter, Event, EventData, Parser};
use mlua::Value;

use crate::error::{Error, ErrorKind};
use crate::event::{anchor_of, event_name, location_of};
use crate::record::EventRecord;
use crate::render::render_value;

/// Source of parsed events. On success the caller owns the event.
pub trait Producer {
    fn produce(&mut self) -> Result<Event, Error>;
}

/// Destination for events and rendered expression results. On return the
/// event is considered consumed.
pub trait Consumer {
    fn consume(&mut self, event: Event, value: Option<&Value>) -> Result<(), Error>;
}

/// Producer backed by the YAML parser.
pub struct ParserProducer<'r> {
    parser: Parser<'r>,
}

impl<'r> ParserProducer<'r> {
    pub fn new(input: &'r mut dyn BufRead) -> Self {
        let mut parser = Parser::new();
        parser.set_input(input);
        Self { parser }
    }

    pub fn from_slice(input: &'r mut &[u8]) -> Self {
        let mut parser = Parser::new();
        parser.set_input_string(input);
        Self { parser }
    }
}

impl Producer for ParserProducer<'_> {
    fn produce(&mut self) -> Result<Event, Error> {
        self.parser
            .parse()
            .map_err(|err| Error::from(err).with_context("While parsing the input stream"))
    }
}

/// One-event pushback over another producer.
pub struct Lookahead<'a> {
    inner: &'a mut dyn Producer,
    pending: Option<Event>,
}

impl<'a> Lookahead<'a> {
    pub fn new(inner: &'a mut dyn Producer) -> Self {
        Self {
            inner,
            pending: None,
        }
    }

    /// Return an event so the next [`produce`](Producer::produce) yields
    /// it again.
    pub fn push_back(&mut self, event: Event) {
        debug_assert!(self.pending.is_none());
        self.pending = Some(event);
    }
}

impl Producer for Lookahead<'_> {
    fn produce(&mut self) -> Result<Event, Error> {
        match self.pending.take() {
            Some(event) => Ok(event),
            None => self.inner.produce(),
        }
    }
}

/// Consumer backed by the YAML emitter.
pub struct EmitterConsumer<'w> {
    emitter: Emitter<'w>,
}

impl<'w> EmitterConsumer<'w> {
    pub fn new(output: &'w mut dyn Write) -> Self {
        let mut emitter = Emitter::new();
        emitter.set_output(output);
        emitter.set_unicode(true);
        Self { emitter }
    }

    /// Flush buffered output. Call after the stream has ended.
    pub fn finish(&mut self) -> Result<(), Error> {
        self.emitter
            .flush()
            .map_err(|err| Error::new(ErrorKind::Writer, err.to_string()))
    }
}

impl Consumer for EmitterConsumer<'_> {
    fn consume(&mut self, event: Event, value: Option<&Value>) -> Result<(), Error> {
        let location = location_of(&event);
        match value {
            None => {
                let name = event_name(&event);
                self.emitter.emit(event).map_err(|err| {
                    Error::from(err)
                        .with_location(location)
                        .with_context(format!("While emitting {name}"))
                })
            }
            Some(value) => {
                let anchor = anchor_of(&event).map(str::to_owned);
                let emitter = &mut self.emitter;
                render_value(value, anchor.as_deref(), location, &mut |rendered| {
                    let name = event_name(&rendered);
                    emitter.emit(rendered).map_err(|err| {
                        Error::from(err)
                            .with_location(location)
                            .with_context(format!("While emitting {name}"))
                    })
                })
            }
        }
    }
}

/// Consumer that accumulates events into an [`EventRecord`].
pub struct RecordConsumer<'a> {
    record: &'a mut EventRecord,
}

impl<'a> RecordConsumer<'a> {
    pub fn new(record: &'a mut EventRecord) -> Self {
        Self { record }
    }
}

impl Consumer for RecordConsumer<'_> {
    fn consume(&mut self, event: Event, value: Option<&Value>) -> Result<(), Error> {
        match value {
            None => {
                self.record.append(event);
                Ok(())
            }
            Some(value) => {
                let location = location_of(&event);
                let anchor = anchor_of(&event).map(str::to_owned);
                let record = &mut *self.record;
                render_value(value, anchor.as_deref(), location, &mut |rendered| {
                    record.append(rendered);
                    Ok(())
                })
            }
        }
    }
}

/// Consumer that dumps events and values as text for inspection.
pub struct DebugConsumer<'w> {
    output: &'w mut dyn Write,
}

impl<'w> DebugConsumer<'w> {
    pub fn new(output: &'w mut dyn Write) -> Self {
        Self { output }
    }

    fn describe_value(value: &Value) -> String {
        match value {
            Value::String(text) => match text.to_str() {
                Ok(text) => format!("string {:?}", &*text),
                Err(_) => "string <non-utf8>".to_owned(),
            },
            other => format!("{} {other:?}", other.type_name()),
        }
    }
}

impl Consumer for DebugConsumer<'_> {
    fn consume(&mut self, event: Event, value: Option<&Value>) -> Result<(), Error> {
        let location = location_of(&event);
        let fail = |err: std::io::Error| {
            Error::new(ErrorKind::Writer, err.to_string()).with_location(location)
        };
        writeln!(self.output, "{location}: {}", event_name(&event)).map_err(fail)?;
        match &event.data {
            EventData::Scalar {
                anchor,
                tag,
                value,
                style,
                ..
            } => {
                if let Some(anchor) = anchor {
                    writeln!(self.output, "  ANCHOR: {anchor}").map_err(fail)?;
                }
                if let Some(tag) = tag {
                    writeln!(self.output, "  TAG: {tag}").map_err(fail)?;
                }
                writeln!(self.output, "  VALUE: {value:?} ({style:?})").map_err(fail)?;
            }
            EventData::SequenceStart { anchor, tag, .. }
            | EventData::MappingStart { anchor, tag, .. } => {
                if let Some(anchor) = anchor {
                    writeln!(self.output, "  ANCHOR: {anchor}").map_err(fail)?;
                }
                if let Some(tag) = tag {
                    writeln!(self.output, "  TAG: {tag}").map_err(fail)?;
                }
            }
            EventData::Alias { anchor } => {
                writeln!(self.output, "  ANCHOR: {anchor}").map_err(fail)?;
            }
            _ => {}
        }
        if let Some(value) = value {
            writeln!(self.output, "  RESULT: {}", Self::describe_value(value)).map_err(fail)?;
        }
        Ok(())
    }
}

/// Consumer that drops everything.
pub struct DiscardConsumer;

impl Consumer for DiscardConsumer {
    fn consume(&mut self, _event: Event, _value: Option<&Value>) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use libyaml_safer::ScalarStyle;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn parser_producer_yields_the_event_stream() {
        let mut input: &[u8] = b"a: 1\n";
        let mut producer = ParserProducer::from_slice(&mut input);
        let mut names = Vec::new();
        loop {
            let event = producer.produce().unwrap();
            let done = matches!(event.data, EventData::StreamEnd);
            names.push(event_name(&event));
            if done {
                break;
            }
        }
        assert_eq!(
            names,
            [
                "STREAM_START_EVENT",
                "DOCUMENT_START_EVENT",
                "MAPPING_START_EVENT",
                "SCALAR_EVENT",
                "SCALAR_EVENT",
                "MAPPING_END_EVENT",
                "DOCUMENT_END_EVENT",
                "STREAM_END_EVENT",
            ]
        );
    }

    #[test]
    fn parse_failures_carry_positions() {
        let mut input: &[u8] = b"a: [1\nb: 2\n";
        let mut producer = ParserProducer::from_slice(&mut input);
        let err = loop {
            match producer.produce() {
                Ok(event) if matches!(event.data, EventData::StreamEnd) => {
                    panic!("expected a parse failure")
                }
                Ok(_) => continue,
                Err(err) => break err,
            }
        };
        assert!(err.location.is_known());
    }

    #[test]
    fn lookahead_replays_pushed_back_events() {
        let mut input: &[u8] = b"x\n";
        let mut producer = ParserProducer::from_slice(&mut input);
        let mut lookahead = Lookahead::new(&mut producer);
        let first = lookahead.produce().unwrap();
        let name = event_name(&first);
        lookahead.push_back(first);
        let again = lookahead.produce().unwrap();
        assert_eq!(event_name(&again), name);
    }

    #[test]
    fn record_consumer_renders_values() {
        let mut record = EventRecord::new();
        let mut consumer = RecordConsumer::new(&mut record);
        let driver = Event::scalar(Some("a"), None, "ignored", true, true, ScalarStyle::Plain);
        consumer
            .consume(driver, Some(&Value::Integer(42)))
            .unwrap();
        assert_eq!(record.len(), 1);
        match &record.events()[0].data {
            EventData::Scalar { anchor, value, .. } => {
                assert_eq!(anchor.as_deref(), Some("a"));
                assert_eq!(value, "42");
            }
            other => panic!("expected a scalar, got {other:?}"),
        }
    }
}
