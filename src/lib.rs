//! Streaming YAML template processor.
//!
//! The engine reads a YAML stream event by event. Nodes carrying a
//! *local tag* are evaluated in an embedded Lua runtime and replaced by
//! the YAML rendering of the result; everything else passes through
//! unchanged:
//!
//! - `!name node` builds `node` into a Lua value and calls `name` on it;
//! - `! expr` (bare tag on a scalar) evaluates `expr` as a Lua
//!   expression;
//! - a result of the global `void` produces no output at all: a void
//!   mapping entry disappears, a void document is suppressed including
//!   its document markers.
//!
//! ```
//! # fn main() -> Result<(), ylt::Error> {
//! let mut executor = ylt::Executor::new()?;
//! executor
//!     .engine()
//!     .exec("function double(x) return x * 2 end")?;
//! let output = ylt::evaluate_str_with(&mut executor, "!double 21\n")?;
//! assert_eq!(output, "42\n");
//! # Ok(())
//! # }
//! ```
//!
//! Events come from a [`Producer`] and leave through a [`Consumer`];
//! the bundled implementations cover the YAML parser and emitter, event
//! records (used by the test harness), a debug dump and a sink that
//! discards. [`TestRunner`] interprets a stream as alternating
//! (input, expected) document pairs and verifies that evaluating the
//! input reproduces the expected output byte for byte.

mod builder;
mod engine;
mod error;
mod event;
mod executor;
mod harness;
mod location;
mod record;
mod render;
mod stream;

pub use crate::engine::{Engine, is_void, void};
pub use crate::error::{Error, ErrorKind};
pub use crate::executor::Executor;
pub use crate::harness::TestRunner;
pub use crate::location::Location;
pub use crate::record::EventRecord;
pub use crate::stream::{
    Consumer, DebugConsumer, DiscardConsumer, EmitterConsumer, Lookahead, ParserProducer,
    Producer, RecordConsumer,
};

/// Evaluate a stream with a fresh engine, wiring an arbitrary producer
/// to an arbitrary consumer.
pub fn evaluate(
    producer: &mut dyn Producer,
    consumer: &mut dyn Consumer,
) -> Result<(), Error> {
    Executor::new()?.execute_stream(producer, consumer)
}

/// Evaluate a YAML string with a fresh engine and return the emitted
/// YAML.
pub fn evaluate_str(input: &str) -> Result<String, Error> {
    let mut executor = Executor::new()?;
    evaluate_str_with(&mut executor, input)
}

/// Evaluate a YAML string with an existing [`Executor`], so globals
/// defined on its engine are visible to the templates.
pub fn evaluate_str_with(executor: &mut Executor, input: &str) -> Result<String, Error> {
    let mut bytes = input.as_bytes();
    let mut producer = ParserProducer::from_slice(&mut bytes);
    let mut output = Vec::new();
    {
        let mut consumer = EmitterConsumer::new(&mut output);
        executor.execute_stream(&mut producer, &mut consumer)?;
        consumer.finish()?;
    }
    String::from_utf8(output)
        .map_err(|_| Error::new(ErrorKind::Emitter, "emitter produced invalid UTF-8"))
}
