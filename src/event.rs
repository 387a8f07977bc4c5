//! Helpers over [`libyaml_safer::Event`].
//!
//! The upstream event type owns its strings and moves by value, which
//! already gives us the ownership discipline the engine needs; what it
//! does not give us is a deep copy (no `Clone`), stable names for
//! diagnostics, or the local-tag classification that decides whether a
//! node is an invocation. Those live here.

use libyaml_safer::{Event, EventData};

use crate::location::Location;

/// Stable uppercase event names for diagnostics.
pub(crate) fn event_name(event: &Event) -> &'static str {
    match &event.data {
        EventData::StreamStart { .. } => "STREAM_START_EVENT",
        EventData::StreamEnd => "STREAM_END_EVENT",
        EventData::DocumentStart { .. } => "DOCUMENT_START_EVENT",
        EventData::DocumentEnd { .. } => "DOCUMENT_END_EVENT",
        EventData::Alias { .. } => "ALIAS_EVENT",
        EventData::Scalar { .. } => "SCALAR_EVENT",
        EventData::SequenceStart { .. } => "SEQUENCE_START_EVENT",
        EventData::SequenceEnd => "SEQUENCE_END_EVENT",
        EventData::MappingStart { .. } => "MAPPING_START_EVENT",
        EventData::MappingEnd => "MAPPING_END_EVENT",
    }
}

/// Position of the event's first character, 1-indexed.
pub(crate) fn location_of(event: &Event) -> Location {
    event.start_mark.into()
}

/// Deep copy, marks included. Buffered events are replayed through this.
pub(crate) fn copy_event(event: &Event) -> Event {
    let mut copy = match &event.data {
        EventData::StreamStart { encoding } => Event::stream_start(*encoding),
        EventData::StreamEnd => Event::stream_end(),
        EventData::DocumentStart {
            version_directive,
            tag_directives,
            implicit,
        } => Event::document_start(*version_directive, tag_directives, *implicit),
        EventData::DocumentEnd { implicit } => Event::document_end(*implicit),
        EventData::Alias { anchor } => Event::alias(anchor),
        EventData::Scalar {
            anchor,
            tag,
            value,
            plain_implicit,
            quoted_implicit,
            style,
        } => Event::scalar(
            anchor.as_deref(),
            tag.as_deref(),
            value,
            *plain_implicit,
            *quoted_implicit,
            *style,
        ),
        EventData::SequenceStart {
            anchor,
            tag,
            implicit,
            style,
        } => Event::sequence_start(anchor.as_deref(), tag.as_deref(), *implicit, *style),
        EventData::SequenceEnd => Event::sequence_end(),
        EventData::MappingStart {
            anchor,
            tag,
            implicit,
            style,
        } => Event::mapping_start(anchor.as_deref(), tag.as_deref(), *implicit, *style),
        EventData::MappingEnd => Event::mapping_end(),
    };
    copy.start_mark = event.start_mark;
    copy.end_mark = event.end_mark;
    copy
}

/// Anchor of a node event, if any.
pub(crate) fn anchor_of(event: &Event) -> Option<&str> {
    match &event.data {
        EventData::Scalar { anchor, .. }
        | EventData::SequenceStart { anchor, .. }
        | EventData::MappingStart { anchor, .. } => anchor.as_deref(),
        _ => None,
    }
}

fn tag_of(event: &Event) -> Option<&str> {
    match &event.data {
        EventData::Scalar { tag, .. }
        | EventData::SequenceStart { tag, .. }
        | EventData::MappingStart { tag, .. } => tag.as_deref(),
        _ => None,
    }
}

/// Function name of a node carrying a local tag.
///
/// A node is an invocation iff its tag begins with `!` and the second
/// byte is not `!` (which would be the YAML `!!` family). The name is the
/// tag without the leading `!`; a bare `!` yields the empty name, which
/// on scalars means "evaluate the value as an expression".
pub(crate) fn invocation_tag(event: &Event) -> Option<&str> {
    let tag = tag_of(event)?;
    let name = tag.strip_prefix('!')?;
    if name.starts_with('!') {
        return None;
    }
    Some(name)
}

/// Strip the tag from an evaluated node so the result re-emits without
/// it, letting the emitter treat the replacement as an ordinary node.
pub(crate) fn clear_tag(event: &mut Event) {
    match &mut event.data {
        EventData::Scalar {
            tag,
            plain_implicit,
            quoted_implicit,
            ..
        } => {
            *tag = None;
            *plain_implicit = true;
            *quoted_implicit = true;
        }
        EventData::SequenceStart { tag, implicit, .. }
        | EventData::MappingStart { tag, implicit, .. } => {
            *tag = None;
            *implicit = true;
        }
        _ => {}
    }
}
