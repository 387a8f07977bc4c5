//! Append-only, replayable record of parsed events.
//!
//! The evaluator keeps one shared record as its holding buffer: document
//! starts wait in it until the document root is known, mapping entries
//! wait in it until the key and value are known not to be suppressed.
//! Each scope remembers the length at entry and either replays the tail
//! (copying events out in order) or truncates it away.

use libyaml_safer::{Emitter, Encoding, Event, EventData};

use crate::error::{Error, ErrorKind};
use crate::event::{copy_event, event_name, location_of};
use crate::location::Location;

/// Ordered sequence of fully-owned events.
#[derive(Default, Debug)]
pub struct EventRecord {
    events: Vec<Event>,
}

impl EventRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Take ownership of an event.
    pub fn append(&mut self, event: Event) {
        self.events.push(event);
    }

    /// Drop every event at index `since` and later.
    pub fn truncate(&mut self, since: usize) {
        self.events.truncate(since);
    }

    /// Deep copy of the event at `index`.
    ///
    /// Replay order is the append order; callers iterate indices from
    /// their remembered base.
    pub fn copy_at(&self, index: usize) -> Option<Event> {
        self.events.get(index).map(copy_event)
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// Re-serialize the recorded events through a fresh emitter into a
    /// string, wrapped in a synthetic stream.
    ///
    /// Document start/end events are normalized to implicit so the text
    /// does not depend on whether the source introduced the document with
    /// an explicit `---`. Test mode compares these strings byte for byte.
    pub fn serialize(&self) -> Result<String, Error> {
        let position = self
            .events
            .first()
            .map(location_of)
            .unwrap_or(Location::UNKNOWN);
        let fail = |err: Error| {
            err.with_location(position)
                .with_context("While rendering an event record")
        };

        let mut output = Vec::new();
        let mut emitter: Emitter<'_> = Emitter::new();
        emitter.set_output_string(&mut output);
        emitter.set_unicode(true);

        emitter
            .emit(Event::stream_start(Encoding::Utf8))
            .map_err(|err| fail(err.into()))?;
        for event in &self.events {
            let mut copy = copy_event(event);
            match &mut copy.data {
                EventData::DocumentStart { implicit, .. }
                | EventData::DocumentEnd { implicit } => *implicit = true,
                _ => {}
            }
            let name = event_name(&copy);
            emitter.emit(copy).map_err(|err| {
                fail(Error::from(err).with_context(format!(
                    "While rendering an event record, failed to emit {name}"
                )))
            })?;
        }
        emitter
            .emit(Event::stream_end())
            .map_err(|err| fail(err.into()))?;
        drop(emitter);

        String::from_utf8(output)
            .map_err(|_| fail(Error::new(ErrorKind::Emitter, "emitter produced invalid UTF-8")))
    }
}

#[cfg(test)]
mod tests {
    use libyaml_safer::ScalarStyle;
    use pretty_assertions::assert_eq;

    use super::*;

    fn plain(value: &str) -> Event {
        Event::scalar(None, None, value, true, true, ScalarStyle::Plain)
    }

    fn document(body: Event) -> Vec<Event> {
        vec![
            Event::document_start(None, &[], false),
            body,
            Event::document_end(true),
        ]
    }

    #[test]
    fn append_then_truncate_drops_the_tail() {
        let mut record = EventRecord::new();
        record.append(plain("a"));
        let base = record.len();
        record.append(plain("b"));
        record.append(plain("c"));
        record.truncate(base);
        assert_eq!(record.len(), 1);
    }

    #[test]
    fn replay_copies_are_equal_to_the_originals() {
        let mut record = EventRecord::new();
        record.append(plain("a"));
        let copy = record.copy_at(0).unwrap();
        assert_eq!(copy.data, record.events()[0].data);
        assert!(record.copy_at(1).is_none());
    }

    #[test]
    fn serialize_wraps_events_in_a_stream() {
        let mut record = EventRecord::new();
        for event in document(plain("hello")) {
            record.append(event);
        }
        assert_eq!(record.serialize().unwrap(), "hello\n");
    }

    #[test]
    fn serialize_ignores_explicit_document_markers() {
        let mut explicit = EventRecord::new();
        for event in document(plain("x")) {
            explicit.append(event);
        }
        let mut implicit = EventRecord::new();
        implicit.append(Event::document_start(None, &[], true));
        implicit.append(plain("x"));
        implicit.append(Event::document_end(true));
        assert_eq!(explicit.serialize().unwrap(), implicit.serialize().unwrap());
    }
}
