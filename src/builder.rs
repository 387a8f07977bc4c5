//! Tree builder: turns a tagged YAML subtree into a Lua value.
//!
//! While the evaluator is inside a tagged aggregate it routes everything
//! here instead of to the consumer. The builder keeps an explicit stack
//! of frames, one per open aggregate: sequence frames append at the next
//! integer index, mapping frames pair each key with the value that
//! follows it. Values produced by nested invocations enter through
//! [`TreeBuilder::feed_value`] exactly like ordinary children.

use libyaml_safer::{Event, EventData};
use mlua::{Table, Value};

use crate::engine::{Engine, is_void};
use crate::error::{Error, ErrorKind};
use crate::event::{event_name, location_of};
use crate::location::Location;

enum Frame {
    Sequence { items: Table, next: i64 },
    Mapping { entries: Table, pending_key: Option<Value> },
}

#[derive(Default)]
pub(crate) struct TreeBuilder {
    frames: Vec<Frame>,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Start a sequence aggregate.
    pub fn open_sequence(&mut self, engine: &Engine) -> Result<(), Error> {
        let items = engine.create_table()?;
        self.frames.push(Frame::Sequence { items, next: 1 });
        Ok(())
    }

    /// Start a mapping aggregate.
    pub fn open_mapping(&mut self, engine: &Engine) -> Result<(), Error> {
        let entries = engine.create_table()?;
        self.frames.push(Frame::Mapping {
            entries,
            pending_key: None,
        });
        Ok(())
    }

    /// Close the innermost aggregate and hand it back without feeding it
    /// anywhere; the evaluator passes it to the invoked function.
    pub fn close_frame(&mut self, location: Location) -> Result<Value, Error> {
        match self.frames.pop() {
            Some(Frame::Sequence { items, .. }) => Ok(Value::Table(items)),
            Some(Frame::Mapping { entries, .. }) => Ok(Value::Table(entries)),
            None => Err(Error::new(
                ErrorKind::Execution,
                "no value under construction",
            )
            .with_location(location)),
        }
    }

    /// Route one event of an untagged child into the current aggregate.
    pub fn feed_event(&mut self, engine: &Engine, event: &Event) -> Result<(), Error> {
        let location = location_of(event);
        match &event.data {
            EventData::Scalar { value, style, .. } => {
                let scalar = engine.scalar_value(*style, value).map_err(|err| {
                    err.with_location(location)
                        .with_context("While building a value from a scalar")
                })?;
                self.feed_value(scalar, location)
            }
            EventData::SequenceStart { .. } => self.open_sequence(engine),
            EventData::MappingStart { .. } => self.open_mapping(engine),
            EventData::SequenceEnd | EventData::MappingEnd => {
                let finished = self.close_frame(location)?;
                self.feed_value(finished, location)
            }
            _ => Err(Error::new(
                ErrorKind::Execution,
                event_name(event),
            )
            .with_location(location)
            .with_context("While building a value, got unexpected event")),
        }
    }

    /// Add a finished value to the innermost aggregate.
    ///
    /// Void is a runtime error inside a sequence; in a mapping it marks
    /// the entry (key or value) suppressed. A void key still consumes the
    /// value that follows it.
    pub fn feed_value(&mut self, value: Value, location: Location) -> Result<(), Error> {
        match self.frames.last_mut() {
            None => Err(Error::new(
                ErrorKind::Execution,
                "no value under construction",
            )
            .with_location(location)),
            Some(Frame::Sequence { items, next }) => {
                if is_void(&value) {
                    return Err(Error::new(
                        ErrorKind::Runtime,
                        "expression returned no value inside a sequence",
                    )
                    .with_location(location)
                    .with_context("While building a sequence value"));
                }
                items.raw_set(*next, value).map_err(|err| {
                    Error::from(err)
                        .with_location(location)
                        .with_context("While building a sequence value")
                })?;
                *next += 1;
                Ok(())
            }
            Some(Frame::Mapping {
                entries,
                pending_key,
            }) => {
                match pending_key.take() {
                    None => {
                        *pending_key = Some(value);
                    }
                    Some(key) => {
                        if !is_void(&key) && !is_void(&value) {
                            entries.raw_set(key, value).map_err(|err| {
                                Error::from(err)
                                    .with_location(location)
                                    .with_context("While building a mapping value")
                            })?;
                        }
                    }
                }
                Ok(())
            }
        }
    }

    /// Drop every open frame (error recovery).
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}
