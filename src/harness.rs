//! Test mode: record-and-compare over alternating document pairs.
//!
//! A stream in test mode is read as (input document, expected document)
//! pairs. The input document is fully evaluated into an event record;
//! the expected document is recorded verbatim. Both records re-serialize
//! through a fresh emitter and the two strings must match byte for byte.
//! Both records are also forwarded to the downstream consumer so the
//! user sees what was compared.
//!
//! An optional preamble document (a sequence tagged `!testcases` as the
//! stream's first document) parameterizes the pairs: element `i` is a
//! mapping of global bindings installed before pair `i` is evaluated,
//! and the number of elements must equal the number of pairs.

use libyaml_safer::{Event, EventData};
use mlua::{Table, Value};

use crate::engine::table_shape;
use crate::error::{Error, ErrorKind};
use crate::event::{event_name, location_of};
use crate::executor::Executor;
use crate::location::Location;
use crate::record::EventRecord;
use crate::stream::{Consumer, DiscardConsumer, Lookahead, Producer, RecordConsumer};

/// Alternating record-and-compare driver layered on the evaluator.
pub struct TestRunner {
    executor: Executor,
}

fn is_testcases_preamble(event: &Event) -> bool {
    matches!(
        &event.data,
        EventData::SequenceStart { tag: Some(tag), .. } if tag.as_str() == "!testcases"
    )
}

impl TestRunner {
    pub fn new() -> Result<Self, Error> {
        Ok(Self {
            executor: Executor::new()?,
        })
    }

    pub fn with_executor(executor: Executor) -> Self {
        Self { executor }
    }

    pub fn executor(&self) -> &Executor {
        &self.executor
    }

    /// Drive a whole stream of test pairs.
    pub fn run(
        &mut self,
        producer: &mut dyn Producer,
        downstream: &mut dyn Consumer,
    ) -> Result<(), Error> {
        let result = self.run_inner(producer, downstream);
        if result.is_err() {
            self.executor.reset();
        }
        result
    }

    fn run_inner(
        &mut self,
        producer: &mut dyn Producer,
        downstream: &mut dyn Consumer,
    ) -> Result<(), Error> {
        let mut producer = Lookahead::new(producer);

        let event = producer.produce()?;
        if !matches!(event.data, EventData::StreamStart { .. }) {
            return Err(Error::new(ErrorKind::Execution, event_name(&event))
                .with_location(location_of(&event))
                .with_context("While testing a stream, expected STREAM_START_EVENT"));
        }
        downstream.consume(event, None)?;

        let mut bindings: Option<Vec<Table>> = None;
        let mut pairs_run = 0usize;
        let mut first_document = true;
        // The evaluated input document, waiting for its expected twin.
        let mut pending: Option<(EventRecord, Location)> = None;

        loop {
            let event = producer.produce()?;
            match &event.data {
                EventData::StreamEnd => {
                    if let Some((_, location)) = &pending {
                        return Err(Error::new(
                            ErrorKind::Assertion,
                            "input document has no expected document to compare against",
                        )
                        .with_location(*location)
                        .with_context("While testing a stream"));
                    }
                    if let Some(sets) = &bindings {
                        if pairs_run != sets.len() {
                            return Err(Error::new(
                                ErrorKind::Assertion,
                                format!(
                                    "{} binding set(s) but {} document pair(s)",
                                    sets.len(),
                                    pairs_run
                                ),
                            )
                            .with_location(location_of(&event))
                            .with_context("While testing a stream"));
                        }
                    }
                    return downstream.consume(event, None);
                }
                EventData::DocumentStart { .. } => match pending.take() {
                    None => {
                        let root = producer.produce()?;
                        if is_testcases_preamble(&root) {
                            if !first_document {
                                return Err(Error::new(
                                    ErrorKind::Execution,
                                    "a `!testcases` preamble after the first document \
                                     is not implemented",
                                )
                                .with_location(location_of(&root))
                                .with_context("While testing a stream"));
                            }
                            bindings = Some(self.load_testcases(&mut producer, root)?);
                            first_document = false;
                            continue;
                        }
                        producer.push_back(root);
                        first_document = false;

                        let location = location_of(&event);
                        if let Some(sets) = &bindings {
                            if pairs_run >= sets.len() {
                                return Err(Error::new(
                                    ErrorKind::Assertion,
                                    "more document pairs than binding sets",
                                )
                                .with_location(location)
                                .with_context("While testing a stream"));
                            }
                            self.apply_bindings(&sets[pairs_run])?;
                        }

                        let mut actual = EventRecord::new();
                        {
                            let mut recorder = RecordConsumer::new(&mut actual);
                            self.executor
                                .execute_document(&mut producer, &mut recorder, event)?;
                        }
                        pending = Some((actual, location));
                    }
                    Some((actual, location)) => {
                        // The expected document is recorded verbatim, no
                        // evaluation.
                        let mut expected = EventRecord::new();
                        expected.append(event);
                        loop {
                            let next = producer.produce()?;
                            let done = matches!(next.data, EventData::DocumentEnd { .. });
                            expected.append(next);
                            if done {
                                break;
                            }
                        }

                        let actual_text = actual.serialize()?;
                        let expected_text = expected.serialize()?;

                        forward(&actual, downstream)?;
                        forward(&expected, downstream)?;

                        if actual_text != expected_text {
                            return Err(Error::new(
                                ErrorKind::Assertion,
                                format!(
                                    "actual document differs from expected document\n\
                                     --- actual ---\n{actual_text}\
                                     --- expected ---\n{expected_text}"
                                ),
                            )
                            .with_location(location)
                            .with_context("While comparing rendered documents"));
                        }
                        pairs_run += 1;
                    }
                },
                _ => {
                    return Err(Error::new(ErrorKind::Execution, event_name(&event))
                        .with_location(location_of(&event))
                        .with_context("While testing a stream, got unexpected event"));
                }
            }
        }
    }

    /// Build the `!testcases` preamble into binding sets.
    fn load_testcases(
        &mut self,
        producer: &mut Lookahead<'_>,
        root: Event,
    ) -> Result<Vec<Table>, Error> {
        let location = location_of(&root);
        let mut discard = DiscardConsumer;
        let (_, value) = self
            .executor
            .build_aggregate(producer, &mut discard, root)?;

        let end = producer.produce()?;
        if !matches!(end.data, EventData::DocumentEnd { .. }) {
            return Err(Error::new(ErrorKind::Execution, event_name(&end))
                .with_location(location_of(&end))
                .with_context("While reading the testcases preamble, expected DOCUMENT_END_EVENT"));
        }

        let Value::Table(sequence) = value else {
            return Err(Error::new(
                ErrorKind::Type,
                "testcases preamble must be a sequence of mappings",
            )
            .with_location(location));
        };
        let length = match table_shape(&sequence)? {
            crate::engine::Shape::Sequence(length) => length,
            crate::engine::Shape::Mapping => {
                return Err(Error::new(
                    ErrorKind::Type,
                    "testcases preamble must be a sequence of mappings",
                )
                .with_location(location));
            }
        };

        let mut sets = Vec::with_capacity(length.max(0) as usize);
        for index in 1..=length {
            let element: Value = sequence.raw_get(index).map_err(Error::from)?;
            match element {
                Value::Table(entry) => sets.push(entry),
                other => {
                    return Err(Error::new(
                        ErrorKind::Type,
                        format!(
                            "testcases entry {index} must be a mapping, instead got {}",
                            other.type_name()
                        ),
                    )
                    .with_location(location));
                }
            }
        }
        log::debug!("loaded {} testcase binding set(s)", sets.len());
        Ok(sets)
    }

    /// Install one binding set as globals before a pair runs.
    fn apply_bindings(&self, bindings: &Table) -> Result<(), Error> {
        for pair in bindings.clone().pairs::<Value, Value>() {
            let (key, value) = pair.map_err(Error::from)?;
            self.executor.engine().set_global(key, value)?;
        }
        Ok(())
    }
}

fn forward(record: &EventRecord, downstream: &mut dyn Consumer) -> Result<(), Error> {
    for index in 0..record.len() {
        if let Some(copy) = record.copy_at(index) {
            downstream.consume(copy, None)?;
        }
    }
    Ok(())
}
