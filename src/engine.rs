//! Embedded Lua expression engine.
//!
//! One [`Engine`] wraps one `mlua::Lua`; the handle is created here and
//! never shared across engine instances. The runtime is initialized with
//! read/compute libraries only (`table`, `string`, `math`, `utf8`, and
//! the base library minus `dofile`/`load`/`loadfile`/`require`), so
//! templates cannot reach the filesystem or load foreign code.
//!
//! The engine also owns the two value-protocol pieces the evaluator and
//! renderer rely on: the plain-scalar coercion that turns YAML scalar
//! bytes into Lua values, and the table shape/ordering protocol that
//! decides whether a table is rendered as a sequence or a mapping.

use std::cmp::Ordering;
use std::ffi::c_void;

use libyaml_safer::ScalarStyle;
use mlua::{LightUserData, Lua, LuaOptions, MultiValue, StdLib, Table, Value};

use crate::error::{Error, ErrorKind};
use crate::location::Location;

/// The distinguished "produce no output" value, exposed to templates as
/// the global `void`. A private static gives it an address no other
/// value can have, so reference equality separates it from `nil`.
static VOID_MARKER: u8 = 0;

fn void_pointer() -> *mut c_void {
    std::ptr::from_ref(&VOID_MARKER).cast_mut().cast()
}

/// The void sentinel value.
pub fn void() -> Value {
    Value::LightUserData(LightUserData(void_pointer()))
}

/// Whether `value` is the void sentinel.
pub fn is_void(value: &Value) -> bool {
    matches!(value, Value::LightUserData(ptr) if ptr.0 == void_pointer())
}

/// How a table renders back to YAML.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Shape {
    /// Ordered values at integer indices `1..=len`.
    Sequence(i64),
    /// Keyed entries, rendered in sorted key order.
    Mapping,
}

/// The expression runtime.
pub struct Engine {
    lua: Lua,
}

impl Engine {
    /// Initialize a fresh runtime with the safe library set and the
    /// `void` global installed.
    pub fn new() -> Result<Self, Error> {
        let lua = Lua::new_with(
            StdLib::TABLE | StdLib::STRING | StdLib::MATH | StdLib::UTF8,
            LuaOptions::default(),
        )
        .map_err(|err| {
            Error::from(err).with_context("While initializing the expression runtime")
        })?;

        {
            let globals = lua.globals();
            // The base library ships a few loaders we do not want
            // reachable from templates.
            for unsafe_global in ["dofile", "load", "loadfile", "require"] {
                globals
                    .raw_set(unsafe_global, Value::Nil)
                    .map_err(Error::from)?;
            }
            globals.raw_set("void", void()).map_err(Error::from)?;
        }

        Ok(Self { lua })
    }

    /// Compile `expr` as a single expression and evaluate it to one value.
    pub fn eval(&self, expr: &str, location: Location) -> Result<Value, Error> {
        log::trace!("evaluating expression at {location}");
        let chunk = format!("return {expr};");
        self.lua
            .load(chunk)
            .set_name(expr)
            .eval::<Value>()
            .map_err(|err| Error::from(err).with_location(location))
    }

    /// Run a chunk of statements (used to predefine globals, e.g. in
    /// tests and embedding code; templates themselves only evaluate
    /// expressions).
    pub fn exec(&self, source: &str) -> Result<(), Error> {
        self.lua.load(source).exec().map_err(Error::from)
    }

    /// Invoke the function named by a tag.
    ///
    /// `name` resolves as a global first; if that is nil, it is compiled
    /// as an expression whose result must be a function. One result is
    /// kept.
    pub fn call(&self, name: &str, args: Vec<Value>, location: Location) -> Result<Value, Error> {
        log::debug!("invoking `{name}` with {} argument(s)", args.len());
        let resolved = self
            .lua
            .globals()
            .get::<Value>(name)
            .map_err(|err| Error::from(err).with_location(location))?;
        let resolved = if resolved.is_nil() {
            self.eval(name, location)?
        } else {
            resolved
        };
        let function = match resolved {
            Value::Function(function) => function,
            other => {
                return Err(Error::new(
                    ErrorKind::Runtime,
                    format!(
                        "expected `{name}` to be a function, instead got {}",
                        other.type_name()
                    ),
                )
                .with_location(location));
            }
        };
        function
            .call::<Value>(MultiValue::from_vec(args))
            .map_err(|err| Error::from(err).with_location(location))
    }

    /// Convert YAML scalar bytes to a value. Plain scalars go through the
    /// coercion ladder; any quoted or block style is a string verbatim.
    pub(crate) fn scalar_value(&self, style: ScalarStyle, text: &str) -> Result<Value, Error> {
        match style {
            ScalarStyle::Plain | ScalarStyle::Any => self.plain_scalar_value(text),
            _ => self.string_value(text),
        }
    }

    /// The YAML-1.1-lite coercion, applied in this exact order:
    /// null, boolean, base-aware integer, float, string.
    fn plain_scalar_value(&self, text: &str) -> Result<Value, Error> {
        match text {
            "" | "~" | "null" => return Ok(Value::Nil),
            "true" => return Ok(Value::Boolean(true)),
            "false" => return Ok(Value::Boolean(false)),
            _ => {}
        }
        if let Some(integer) = parse_plain_integer(text) {
            return Ok(Value::Integer(integer));
        }
        if let Ok(number) = text.parse::<f64>() {
            return Ok(Value::Number(number));
        }
        self.string_value(text)
    }

    pub(crate) fn string_value(&self, text: &str) -> Result<Value, Error> {
        Ok(Value::String(
            self.lua.create_string(text).map_err(Error::from)?,
        ))
    }

    pub(crate) fn create_table(&self) -> Result<Table, Error> {
        self.lua.create_table().map_err(Error::from)
    }

    /// Install a global binding (test-mode parameterization).
    pub fn set_global(&self, key: Value, value: Value) -> Result<(), Error> {
        self.lua.globals().set(key, value).map_err(Error::from)
    }
}

/// Base-aware integer recognition: optional sign, then `0x`/`0X` hex,
/// `0o`/`0O` octal, or decimal digits. The whole input must be consumed
/// and the value must fit an `i64`; anything else is not an integer.
pub(crate) fn parse_plain_integer(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let (negative, rest) = match bytes.first()? {
        b'+' => (false, &bytes[1..]),
        b'-' => (true, &bytes[1..]),
        _ => (false, bytes),
    };
    let (radix, digits) = match rest {
        [b'0', b'x' | b'X', digits @ ..] => (16u32, digits),
        [b'0', b'o' | b'O', digits @ ..] => (8u32, digits),
        _ => (10u32, rest),
    };
    if digits.is_empty() {
        return None;
    }
    let mut magnitude: u128 = 0;
    for &byte in digits {
        let digit = (byte as char).to_digit(radix)? as u128;
        magnitude = magnitude.checked_mul(radix as u128)?.checked_add(digit)?;
        if magnitude > i64::MAX as u128 + 1 {
            return None;
        }
    }
    if negative {
        if magnitude > i64::MAX as u128 + 1 {
            None
        } else {
            Some((-(magnitude as i128)) as i64)
        }
    } else if magnitude > i64::MAX as u128 {
        None
    } else {
        Some(magnitude as i64)
    }
}

/// Decide whether `table` is a sequence or a mapping.
///
/// A `__len` metamethod wins; without a metatable an integer `n` field
/// wins; then the presence of index 1; a fully empty table is an empty
/// sequence.
pub(crate) fn table_shape(table: &Table) -> Result<Shape, Error> {
    if let Some(metatable) = table.metatable() {
        let len_handler: Value = metatable.raw_get("__len")?;
        if len_handler.is_nil() {
            return Ok(Shape::Mapping);
        }
        let length = table
            .len()
            .map_err(|err| Error::new(ErrorKind::Type, err.to_string()))?;
        return Ok(Shape::Sequence(length));
    }
    if let Value::Integer(n) = table.raw_get::<Value>("n")? {
        return Ok(Shape::Sequence(n));
    }
    let first: Value = table.raw_get(1)?;
    if !first.is_nil() {
        return Ok(Shape::Sequence(table.raw_len() as i64));
    }
    if table.clone().pairs::<Value, Value>().next().is_none() {
        Ok(Shape::Sequence(0))
    } else {
        Ok(Shape::Mapping)
    }
}

/// All keys of `table`, in the total cross-kind order: same kinds compare
/// with the runtime's less-than, different kinds by the Lua type tag.
/// The order is stable across runs.
pub(crate) fn sorted_keys(table: &Table) -> Result<Vec<Value>, Error> {
    let mut keys = Vec::new();
    for pair in table.clone().pairs::<Value, Value>() {
        let (key, _value) = pair.map_err(Error::from)?;
        keys.push(key);
    }
    let mut first_error: Option<Error> = None;
    keys.sort_by(|left, right| match compare_values(left, right) {
        Ok(ordering) => ordering,
        Err(err) => {
            if first_error.is_none() {
                first_error = Some(err);
            }
            Ordering::Equal
        }
    });
    match first_error {
        Some(err) => Err(err),
        None => Ok(keys),
    }
}

/// Lua type tag numbering (nil, boolean, lightuserdata, number, string,
/// table, function, userdata, thread). Integers and floats share the
/// number tag.
fn type_tag(value: &Value) -> u8 {
    match value {
        Value::Nil => 0,
        Value::Boolean(_) => 1,
        Value::LightUserData(_) => 2,
        Value::Integer(_) | Value::Number(_) => 3,
        Value::String(_) => 4,
        Value::Table(_) => 5,
        Value::Function(_) => 6,
        Value::UserData(_) => 7,
        Value::Thread(_) => 8,
        _ => 9,
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::Integer(integer) => *integer as f64,
        Value::Number(number) => *number,
        _ => 0.0,
    }
}

/// `__lt` metamethod of `left`, applied to `(left, right)`. `None` when
/// there is no metamethod to consult.
fn metamethod_lt(left: &Table, right: &Table) -> Result<Option<bool>, Error> {
    let Some(metatable) = left.metatable() else {
        return Ok(None);
    };
    let handler: Value = metatable.raw_get("__lt")?;
    let Value::Function(function) = handler else {
        return Ok(None);
    };
    let result: Value = function
        .call((Value::Table(left.clone()), Value::Table(right.clone())))
        .map_err(Error::from)?;
    Ok(Some(!matches!(result, Value::Nil | Value::Boolean(false))))
}

fn compare_values(left: &Value, right: &Value) -> Result<Ordering, Error> {
    let left_tag = type_tag(left);
    let right_tag = type_tag(right);
    if left_tag != right_tag {
        return Ok(left_tag.cmp(&right_tag));
    }
    match (left, right) {
        (Value::Integer(x), Value::Integer(y)) => Ok(x.cmp(y)),
        (Value::Integer(_) | Value::Number(_), Value::Integer(_) | Value::Number(_)) => Ok(as_f64(
            left,
        )
        .partial_cmp(&as_f64(right))
        .unwrap_or(Ordering::Equal)),
        (Value::String(x), Value::String(y)) => {
            let x_bytes = x.as_bytes();
            let y_bytes = y.as_bytes();
            Ok((*x_bytes).cmp(&*y_bytes))
        }
        (Value::Boolean(x), Value::Boolean(y)) => Ok(x.cmp(y)),
        (Value::Table(x), Value::Table(y)) => match metamethod_lt(x, y)? {
            None => Err(Error::new(
                ErrorKind::Runtime,
                "attempt to compare two table values",
            )),
            Some(true) => Ok(Ordering::Less),
            Some(false) => {
                if metamethod_lt(y, x)? == Some(true) {
                    Ok(Ordering::Greater)
                } else {
                    Ok(Ordering::Equal)
                }
            }
        },
        (Value::LightUserData(x), Value::LightUserData(y)) => {
            if x.0 == y.0 {
                Ok(Ordering::Equal)
            } else {
                Err(Error::new(
                    ErrorKind::Runtime,
                    "attempt to compare two userdata values",
                ))
            }
        }
        _ => Err(Error::new(
            ErrorKind::Runtime,
            format!("attempt to compare two {} values", left.type_name()),
        )),
    }
}
