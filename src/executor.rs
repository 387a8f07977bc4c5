//! The evaluator: a recursive state machine over the YAML event stream.
//!
//! Each nesting level (stream, document, sequence, mapping, scalar) is a
//! function that pulls events from the producer and decides, per node:
//! pass it through, hold it in the buffer, build it into a Lua value, or
//! evaluate it. Where events go is the current [`OutputMode`]:
//!
//! - `Emit` delivers straight to the consumer;
//! - `Buffer` appends to the shared holding buffer (document starts wait
//!   there until the root is known; mapping entries wait there until
//!   neither side turned out void);
//! - `Build` feeds the tree builder inside a tagged aggregate;
//! - `Discard` drops.
//!
//! Evaluating a tagged node yields a `(driver, value)` pair: the original
//! event stripped of its tag (supplying anchor and position) plus the
//! expression result. The pair is then rendered into whatever the
//! restored mode dictates, or suppressed when the value is void.

use libyaml_safer::{Event, EventData, ScalarStyle};
use mlua::Value;

use crate::builder::TreeBuilder;
use crate::engine::{Engine, is_void};
use crate::error::{Error, ErrorKind};
use crate::event::{anchor_of, clear_tag, event_name, invocation_tag, location_of};
use crate::record::EventRecord;
use crate::render::render_value;
use crate::stream::{Consumer, Producer};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputMode {
    Emit,
    Buffer,
    Build,
    Discard,
}

/// The evaluation engine: expression runtime, holding buffer, tree
/// builder stack and the current output mode.
pub struct Executor {
    engine: Engine,
    buffer: EventRecord,
    builder: TreeBuilder,
    mode: OutputMode,
}

fn unexpected_event(event: &Event, context: &'static str) -> Error {
    Error::new(ErrorKind::Execution, event_name(event))
        .with_location(location_of(event))
        .with_context(context)
}

impl Executor {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            engine: Engine::new()?,
            buffer: EventRecord::new(),
            builder: TreeBuilder::new(),
            mode: OutputMode::Emit,
        })
    }

    /// The expression runtime, e.g. for predefining globals.
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    /// Evaluate a whole stream: STREAM-START, documents, STREAM-END.
    pub fn execute_stream(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
    ) -> Result<(), Error> {
        let base = self.buffer.len();
        let saved = self.mode;
        let result = self.stream_loop(producer, consumer);
        if result.is_err() {
            self.recover(base, saved);
        }
        result
    }

    fn stream_loop(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
    ) -> Result<(), Error> {
        let event = producer.produce()?;
        match &event.data {
            EventData::StreamStart { .. } => self.emit_event(consumer, event)?,
            _ => {
                return Err(unexpected_event(
                    &event,
                    "While executing a stream, expected STREAM_START_EVENT",
                ));
            }
        }
        loop {
            let event = producer.produce()?;
            match &event.data {
                EventData::DocumentStart { .. } => {
                    self.execute_document(producer, consumer, event)?;
                }
                EventData::StreamEnd => {
                    self.emit_event(consumer, event)?;
                    return Ok(());
                }
                _ => {
                    return Err(unexpected_event(
                        &event,
                        "While executing a stream, got unexpected event",
                    ));
                }
            }
        }
    }

    /// Evaluate one document, `start` being its DOCUMENT-START event.
    ///
    /// The start event waits in the buffer: if the document root is an
    /// invocation returning void, the whole document (start and end
    /// events included) is suppressed.
    pub fn execute_document(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
    ) -> Result<(), Error> {
        let base = self.buffer.len();
        let saved = self.mode;
        let result = self.document_body(producer, consumer, start, base);
        if result.is_err() {
            self.recover(base, saved);
        }
        result
    }

    fn document_body(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
        base: usize,
    ) -> Result<(), Error> {
        log::trace!("document at {}", location_of(&start));
        self.buffer.append(start);

        let root = producer.produce()?;
        if matches!(root.data, EventData::DocumentEnd { .. }) {
            self.flush_buffer(consumer, base)?;
            return self.emit_event(consumer, root);
        }

        if invocation_tag(&root).is_some() {
            let (driver, value) = match self.execute_node(
                producer,
                consumer,
                root,
                "While executing a document, got unexpected event",
            )? {
                Some(outcome) => outcome,
                None => {
                    return Err(Error::new(
                        ErrorKind::Execution,
                        "tagged document root produced no value",
                    )
                    .with_context("While executing a document"));
                }
            };
            let end = producer.produce()?;
            if !matches!(end.data, EventData::DocumentEnd { .. }) {
                return Err(unexpected_event(
                    &end,
                    "While executing a document, expected DOCUMENT_END_EVENT",
                ));
            }
            if is_void(&value) {
                // The document produces nothing: drop the buffered start
                // and swallow the end.
                self.buffer.truncate(base);
                return Ok(());
            }
            self.flush_buffer(consumer, base)?;
            self.emit_value(consumer, driver, &value)?;
            self.emit_event(consumer, end)
        } else {
            self.flush_buffer(consumer, base)?;
            if let Some((driver, value)) = self.execute_node(
                producer,
                consumer,
                root,
                "While executing a document, got unexpected event",
            )? {
                self.emit_value(consumer, driver, &value)?;
            }
            let end = producer.produce()?;
            if !matches!(end.data, EventData::DocumentEnd { .. }) {
                return Err(unexpected_event(
                    &end,
                    "While executing a document, expected DOCUMENT_END_EVENT",
                ));
            }
            self.emit_event(consumer, end)
        }
    }

    /// Build a tagged aggregate subtree into a Lua value without calling
    /// anything on it. Returns the de-tagged start event (the driver) and
    /// the aggregate.
    pub(crate) fn build_aggregate(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
    ) -> Result<(Event, Value), Error> {
        let saved = self.mode;
        let mut driver = start;
        clear_tag(&mut driver);
        match &driver.data {
            EventData::SequenceStart { .. } => self.builder.open_sequence(&self.engine)?,
            EventData::MappingStart { .. } => self.builder.open_mapping(&self.engine)?,
            _ => {
                return Err(unexpected_event(
                    &driver,
                    "While building a value, expected a collection start",
                ));
            }
        }
        self.mode = OutputMode::Build;
        loop {
            let next = producer.produce()?;
            match &next.data {
                // Nested containers are consumed whole by execute_node,
                // so an end event seen here closes the frame we opened.
                EventData::SequenceEnd | EventData::MappingEnd => {
                    let aggregate = self.builder.close_frame(location_of(&next))?;
                    self.mode = saved;
                    return Ok((driver, aggregate));
                }
                _ => {
                    if let Some((child, value)) = self.execute_node(
                        producer,
                        consumer,
                        next,
                        "While building a value, got unexpected event",
                    )? {
                        self.builder.feed_value(value, location_of(&child))?;
                    }
                }
            }
        }
    }

    /// Evaluate one node event. `Ok(None)` means the node was routed to
    /// the current mode's destination; `Ok(Some((driver, value)))` means
    /// the node was an invocation and the caller decides what the value
    /// becomes.
    fn execute_node(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        event: Event,
        context: &'static str,
    ) -> Result<Option<(Event, Value)>, Error> {
        match &event.data {
            EventData::Scalar { .. } => {
                if invocation_tag(&event).is_some() {
                    self.evaluate_scalar(event).map(Some)
                } else {
                    self.emit_event(consumer, event)?;
                    Ok(None)
                }
            }
            EventData::SequenceStart { .. } => {
                if invocation_tag(&event).is_some() {
                    self.evaluate_collection(producer, consumer, event).map(Some)
                } else {
                    self.execute_sequence(producer, consumer, event)?;
                    Ok(None)
                }
            }
            EventData::MappingStart { .. } => {
                if invocation_tag(&event).is_some() {
                    self.evaluate_collection(producer, consumer, event).map(Some)
                } else {
                    self.execute_mapping(producer, consumer, event)?;
                    Ok(None)
                }
            }
            EventData::Alias { .. } => {
                self.emit_event(consumer, event)?;
                Ok(None)
            }
            _ => Err(unexpected_event(&event, context)),
        }
    }

    /// Tagged sequence/mapping: build the subtree, then invoke the tag's
    /// function on the aggregate.
    fn evaluate_collection(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
    ) -> Result<(Event, Value), Error> {
        let location = location_of(&start);
        let name = invocation_tag(&start).unwrap_or_default().to_owned();
        let (driver, aggregate) = self.build_aggregate(producer, consumer, start)?;
        let result = self
            .engine
            .call(&name, vec![aggregate], location)
            .map_err(|err| err.with_context("While executing a collection, encountered an error"))?;
        Ok((driver, result))
    }

    /// Tagged scalar: bare `!` evaluates the value as an expression
    /// (unless quoted, which pushes the bytes as a string); `!name`
    /// invokes `name` on the coerced scalar value.
    fn evaluate_scalar(&mut self, mut event: Event) -> Result<(Event, Value), Error> {
        let location = location_of(&event);
        let name = invocation_tag(&event).unwrap_or_default().to_owned();
        let EventData::Scalar { value, style, .. } = &event.data else {
            return Err(unexpected_event(
                &event,
                "While executing a scalar, got unexpected event",
            ));
        };
        let text = value.clone();
        let style = *style;

        let result = if name.is_empty() {
            match style {
                ScalarStyle::SingleQuoted | ScalarStyle::DoubleQuoted => {
                    self.engine.string_value(&text)?
                }
                _ => self.engine.eval(&text, location).map_err(|err| {
                    err.with_context("While executing a scalar, encountered an error")
                })?,
            }
        } else {
            let argument = self
                .engine
                .scalar_value(style, &text)
                .map_err(|err| err.with_location(location))?;
            self.engine
                .call(&name, vec![argument], location)
                .map_err(|err| {
                    err.with_context("While executing a scalar, encountered an error")
                })?
        };

        clear_tag(&mut event);
        Ok((event, result))
    }

    /// Untagged sequence: children evaluate in the current mode; a tagged
    /// child's value renders in place. Void here has no meaning and is
    /// rejected.
    fn execute_sequence(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
    ) -> Result<(), Error> {
        self.emit_event(consumer, start)?;
        loop {
            let event = producer.produce()?;
            match &event.data {
                EventData::SequenceEnd => {
                    return self.emit_event(consumer, event);
                }
                _ => {
                    if let Some((driver, value)) = self.execute_node(
                        producer,
                        consumer,
                        event,
                        "While executing a sequence, got unexpected event",
                    )? {
                        if self.mode != OutputMode::Build && is_void(&value) {
                            return Err(Error::new(
                                ErrorKind::Runtime,
                                "expression returned no value inside a sequence",
                            )
                            .with_location(location_of(&driver))
                            .with_context("While executing a sequence"));
                        }
                        self.emit_value(consumer, driver, &value)?;
                    }
                }
            }
        }
    }

    /// Untagged mapping. Outside Build mode every entry is held in the
    /// buffer until both its key and value are known: if either side of
    /// the entry evaluates to void, the entry's events are truncated away
    /// instead of replayed.
    fn execute_mapping(
        &mut self,
        producer: &mut dyn Producer,
        consumer: &mut dyn Consumer,
        start: Event,
    ) -> Result<(), Error> {
        self.emit_event(consumer, start)?;

        if self.mode == OutputMode::Build {
            // The builder pairs keys with values and applies entry
            // suppression itself.
            loop {
                let event = producer.produce()?;
                match &event.data {
                    EventData::MappingEnd => return self.emit_event(consumer, event),
                    _ => {
                        if let Some((driver, value)) = self.execute_node(
                            producer,
                            consumer,
                            event,
                            "While executing a mapping, got unexpected event",
                        )? {
                            self.emit_value(consumer, driver, &value)?;
                        }
                    }
                }
            }
        }

        loop {
            let key_event = producer.produce()?;
            if matches!(key_event.data, EventData::MappingEnd) {
                return self.emit_event(consumer, key_event);
            }

            let saved = self.mode;
            let base = self.buffer.len();
            let mut suppressed = false;
            self.mode = OutputMode::Buffer;

            if let Some((driver, value)) = self.execute_node(
                producer,
                consumer,
                key_event,
                "While executing a mapping, got unexpected event",
            )? {
                if is_void(&value) {
                    suppressed = true;
                } else {
                    self.emit_value(consumer, driver, &value)?;
                }
            }

            let value_event = producer.produce()?;
            if let Some((driver, value)) = self.execute_node(
                producer,
                consumer,
                value_event,
                "While executing a mapping, got unexpected event",
            )? {
                if is_void(&value) {
                    suppressed = true;
                } else {
                    self.emit_value(consumer, driver, &value)?;
                }
            }

            self.mode = saved;
            if suppressed {
                self.buffer.truncate(base);
            } else {
                self.flush_buffer(consumer, base)?;
            }
        }
    }

    /// Route an event to the current mode's destination.
    fn emit_event(&mut self, consumer: &mut dyn Consumer, event: Event) -> Result<(), Error> {
        match self.mode {
            OutputMode::Emit => consumer.consume(event, None),
            OutputMode::Buffer => {
                self.buffer.append(event);
                Ok(())
            }
            OutputMode::Build => self.builder.feed_event(&self.engine, &event),
            OutputMode::Discard => Ok(()),
        }
    }

    /// Route an expression result to the current mode's destination,
    /// driven by the de-tagged event that produced it.
    fn emit_value(
        &mut self,
        consumer: &mut dyn Consumer,
        driver: Event,
        value: &Value,
    ) -> Result<(), Error> {
        match self.mode {
            OutputMode::Emit => consumer.consume(driver, Some(value)),
            OutputMode::Buffer => {
                let location = location_of(&driver);
                let anchor = anchor_of(&driver).map(str::to_owned);
                let buffer = &mut self.buffer;
                render_value(value, anchor.as_deref(), location, &mut |event| {
                    buffer.append(event);
                    Ok(())
                })
            }
            OutputMode::Build => {
                let location = location_of(&driver);
                self.builder.feed_value(value.clone(), location)
            }
            OutputMode::Discard => Ok(()),
        }
    }

    /// Replay the buffer tail from `base` into the current mode's
    /// destination and drop it from the buffer. In Buffer mode the tail
    /// stays where it is: it already sits in the right place for the
    /// enclosing scope.
    fn flush_buffer(&mut self, consumer: &mut dyn Consumer, base: usize) -> Result<(), Error> {
        if self.mode == OutputMode::Buffer {
            return Ok(());
        }
        let mut replayed = Vec::with_capacity(self.buffer.len().saturating_sub(base));
        let mut index = base;
        while let Some(copy) = self.buffer.copy_at(index) {
            replayed.push(copy);
            index += 1;
        }
        self.buffer.truncate(base);
        for event in replayed {
            self.emit_event(consumer, event)?;
        }
        Ok(())
    }

    fn recover(&mut self, base: usize, mode: OutputMode) {
        self.buffer.truncate(base);
        self.builder.clear();
        self.mode = mode;
    }

    /// Drop all intermediate state (error recovery for embedding layers
    /// that drive [`build_aggregate`](Self::build_aggregate) or the
    /// document entry points directly).
    pub(crate) fn reset(&mut self) {
        self.recover(0, OutputMode::Emit);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::stream::{ParserProducer, RecordConsumer};

    fn run(executor: &mut Executor, input: &str) -> Result<EventRecord, Error> {
        let mut bytes = input.as_bytes();
        let mut producer = ParserProducer::from_slice(&mut bytes);
        let mut record = EventRecord::new();
        let mut consumer = RecordConsumer::new(&mut record);
        executor.execute_stream(&mut producer, &mut consumer)?;
        Ok(record)
    }

    #[test]
    fn untagged_streams_pass_through() {
        let mut executor = Executor::new().unwrap();
        let record = run(&mut executor, "- 1\n- two\n- true\n").unwrap();
        let names: Vec<&str> = record.events().iter().map(event_name).collect();
        assert_eq!(
            names,
            [
                "STREAM_START_EVENT",
                "DOCUMENT_START_EVENT",
                "SEQUENCE_START_EVENT",
                "SCALAR_EVENT",
                "SCALAR_EVENT",
                "SCALAR_EVENT",
                "SEQUENCE_END_EVENT",
                "DOCUMENT_END_EVENT",
                "STREAM_END_EVENT",
            ]
        );
    }

    #[test]
    fn void_mapping_entries_leave_no_events() {
        let mut executor = Executor::new().unwrap();
        executor
            .engine()
            .exec("function skip() return void end")
            .unwrap();
        let record = run(&mut executor, "kept: 1\ngone: !skip ~\n").unwrap();
        let scalars: Vec<String> = record
            .events()
            .iter()
            .filter_map(|event| match &event.data {
                EventData::Scalar { value, .. } => Some(value.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(scalars, ["kept", "1"]);
    }

    #[test]
    fn failures_leave_the_buffer_clean() {
        let mut executor = Executor::new().unwrap();
        let err = run(&mut executor, "a: !undefined_function 1\n").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Runtime);
        assert!(executor.buffer.is_empty());
        assert_eq!(executor.builder.depth(), 0);
        assert_eq!(executor.mode, OutputMode::Emit);
    }
}
