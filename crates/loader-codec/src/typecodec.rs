//! Cell-to-[`Value`] conversion (both inference and enforced coercion) and
//! the binary record encoder.
//!
//! Inference and coercion are kept as separate entry points
//! ([`infer_cell`] and [`coerce_cell`]) because they answer different
//! questions: inference guesses a type from the text alone, while
//! coercion is told the type up front and only validates/parses against
//! it. Both bottom out in the same array grammar ([`parse_array`]).

use loader_core::{LoaderError, TypeTag, Value};

/// Tag bytes written immediately before a value's payload. These describe
/// the *runtime* type of the value (which is always one of the five
/// `Value` variants), not the column's declared `TypeTag` — an `INT` and a
/// `LONG` column both produce a `TAG_INT64` payload.
pub const TAG_NULL: u8 = 0;
pub const TAG_BOOL: u8 = 1;
pub const TAG_INT64: u8 = 2;
pub const TAG_DOUBLE: u8 = 3;
pub const TAG_STRING: u8 = 4;
pub const TAG_ARRAY: u8 = 5;

/// Infers a [`Value`] from a raw CSV cell under inferred (schemaless) mode.
///
/// Rules are tried in order and the first match wins:
/// 1. empty string -> `Null`
/// 2. `true`/`false` (case-insensitive) -> `Bool`
/// 3. parses as `i64` -> `Int64`
/// 4. parses as `f64` -> `Double`
/// 5. starts with `[` and ends with `]` -> `Array` (recursively inferred)
/// 6. otherwise -> `String`, taken verbatim
pub fn infer_cell(cell: &str) -> Result<Value, LoaderError> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    if let Some(b) = parse_bool(cell) {
        return Ok(Value::Bool(b));
    }
    if let Ok(i) = cell.parse::<i64>() {
        return Ok(Value::Int64(i));
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Ok(Value::Double(f));
    }
    let trimmed = cell.trim();
    if trimmed.starts_with('[') && trimmed.ends_with(']') {
        return parse_array(trimmed, infer_cell).map(Value::Array);
    }
    Ok(Value::String(cell.to_string()))
}

fn parse_bool(cell: &str) -> Option<bool> {
    if cell.eq_ignore_ascii_case("true") {
        Some(true)
    } else if cell.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Coerces a raw CSV cell into a [`Value`] under an explicitly declared
/// column type (enforced-schema mode).
///
/// `Id`/`StartId`/`EndId`/`Ignore` are not handled here — those columns
/// never become properties, so the caller (schema resolution / the
/// identifier path) deals with their raw text directly.
pub fn coerce_cell(cell: &str, tag: TypeTag) -> Result<Value, LoaderError> {
    if cell.is_empty() {
        return Ok(Value::Null);
    }
    match tag {
        TypeTag::String => Ok(Value::String(cell.to_string())),
        TypeTag::Int | TypeTag::Long => cell
            .parse::<i64>()
            .map(Value::Int64)
            .map_err(|_| LoaderError::schema_error(cell)),
        TypeTag::Float | TypeTag::Double => cell
            .parse::<f64>()
            .map(Value::Double)
            .map_err(|_| LoaderError::schema_error(cell)),
        TypeTag::Boolean => parse_bool(cell)
            .map(Value::Bool)
            .ok_or_else(|| LoaderError::schema_error(cell)),
        TypeTag::Array => {
            let trimmed = cell.trim();
            if !(trimmed.starts_with('[') && trimmed.ends_with(']')) {
                return Err(LoaderError::schema_error_array(cell));
            }
            parse_array(trimmed, infer_cell)
                .map(Value::Array)
                .map_err(|_| LoaderError::schema_error_array(cell))
        }
        TypeTag::Id | TypeTag::StartId | TypeTag::EndId | TypeTag::Ignore => {
            unreachable!("identifier/ignore columns never reach coerce_cell")
        }
    }
}

/// Parses a bracketed array literal such as `[1, 2, "three", [4, 5]]`.
///
/// `elem` parses a single bare (unquoted, unbracketed) element's text;
/// quoted elements become `Value::String` directly and nested `[...]`
/// elements recurse through this same function, so `elem` is only ever
/// asked to classify scalars.
pub fn parse_array(
    literal: &str,
    elem: impl Fn(&str) -> Result<Value, LoaderError> + Copy,
) -> Result<Vec<Value>, LoaderError> {
    let mut parser = ArrayParser {
        bytes: literal.as_bytes(),
        pos: 0,
    };
    parser.expect(b'[')?;
    let values = parser.parse_elements(elem)?;
    parser.skip_ws();
    parser.expect(b']')?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(LoaderError::schema_error_array(literal));
    }
    Ok(values)
}

struct ArrayParser<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> ArrayParser<'a> {
    fn skip_ws(&mut self) {
        while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn expect(&mut self, b: u8) -> Result<(), LoaderError> {
        self.skip_ws();
        if self.peek() == Some(b) {
            self.pos += 1;
            Ok(())
        } else {
            Err(LoaderError::schema_error_array(self.remaining()))
        }
    }

    fn remaining(&self) -> String {
        String::from_utf8_lossy(&self.bytes[self.pos..]).into_owned()
    }

    fn parse_elements(
        &mut self,
        elem: impl Fn(&str) -> Result<Value, LoaderError> + Copy,
    ) -> Result<Vec<Value>, LoaderError> {
        let mut out = Vec::new();
        self.skip_ws();
        if self.peek() == Some(b']') {
            return Ok(out);
        }
        loop {
            out.push(self.parse_one(elem)?);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ws();
                }
                _ => break,
            }
        }
        Ok(out)
    }

    fn parse_one(
        &mut self,
        elem: impl Fn(&str) -> Result<Value, LoaderError> + Copy,
    ) -> Result<Value, LoaderError> {
        self.skip_ws();
        match self.peek() {
            Some(b'[') => {
                let start = self.pos;
                self.skip_bracketed()?;
                let slice = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| LoaderError::schema_error_array(self.remaining()))?;
                parse_array(slice, elem).map(Value::Array)
            }
            Some(q @ (b'"' | b'\'')) => {
                self.pos += 1;
                let s = self.read_quoted(q)?;
                Ok(Value::String(s))
            }
            Some(_) => {
                let start = self.pos;
                while let Some(b) = self.peek() {
                    if b == b',' || b == b']' {
                        break;
                    }
                    self.pos += 1;
                }
                let token = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| LoaderError::schema_error_array(self.remaining()))?
                    .trim();
                elem(token)
            }
            None => Err(LoaderError::schema_error_array(self.remaining())),
        }
    }

    fn skip_bracketed(&mut self) -> Result<(), LoaderError> {
        let mut depth = 0i32;
        let mut in_quote: Option<u8> = None;
        loop {
            let b = self
                .peek()
                .ok_or_else(|| LoaderError::schema_error_array(self.remaining()))?;
            match in_quote {
                Some(q) => {
                    if b == q {
                        in_quote = None;
                    }
                    self.pos += 1;
                }
                None => match b {
                    b'"' | b'\'' => {
                        in_quote = Some(b);
                        self.pos += 1;
                    }
                    b'[' => {
                        depth += 1;
                        self.pos += 1;
                    }
                    b']' => {
                        depth -= 1;
                        self.pos += 1;
                        if depth == 0 {
                            return Ok(());
                        }
                    }
                    _ => self.pos += 1,
                },
            }
        }
    }

    fn read_quoted(&mut self, quote: u8) -> Result<String, LoaderError> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            if b == quote {
                let s = std::str::from_utf8(&self.bytes[start..self.pos])
                    .map_err(|_| LoaderError::schema_error_array(self.remaining()))?
                    .to_string();
                self.pos += 1;
                return Ok(s);
            }
            self.pos += 1;
        }
        Err(LoaderError::schema_error_array(self.remaining()))
    }
}

/// Writes one value's tag byte and payload to `buf`.
///
/// Used both for a record's top-level properties (preceded by a key
/// index, see [`crate::batch`]) and for array elements (which are
/// untagged by key since arrays are positional).
pub fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<(), LoaderError> {
    match value {
        Value::Null => buf.push(TAG_NULL),
        Value::Bool(b) => {
            buf.push(TAG_BOOL);
            buf.push(*b as u8);
        }
        Value::Int64(n) => {
            buf.push(TAG_INT64);
            buf.extend_from_slice(&n.to_le_bytes());
        }
        Value::Double(d) => {
            buf.push(TAG_DOUBLE);
            buf.extend_from_slice(&d.to_le_bytes());
        }
        Value::String(s) => {
            if s.as_bytes().contains(&0) {
                return Err(LoaderError::EmbeddedNul);
            }
            buf.push(TAG_STRING);
            buf.extend_from_slice(s.as_bytes());
            buf.push(0);
        }
        Value::Array(items) => {
            buf.push(TAG_ARRAY);
            buf.extend_from_slice(&(items.len() as u32).to_le_bytes());
            for item in items {
                encode_value(buf, item)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infers_scalars_in_priority_order() {
        assert_eq!(infer_cell("").unwrap(), Value::Null);
        assert_eq!(infer_cell("true").unwrap(), Value::Bool(true));
        assert_eq!(infer_cell("FALSE").unwrap(), Value::Bool(false));
        assert_eq!(infer_cell("42").unwrap(), Value::Int64(42));
        assert_eq!(infer_cell("-7").unwrap(), Value::Int64(-7));
        assert_eq!(infer_cell("3.5").unwrap(), Value::Double(3.5));
        assert_eq!(infer_cell("hello").unwrap(), Value::String("hello".into()));
    }

    #[test]
    fn infers_nested_arrays() {
        let v = infer_cell("[1, [2, 3], \"four\"]").unwrap();
        assert_eq!(
            v,
            Value::Array(vec![
                Value::Int64(1),
                Value::Array(vec![Value::Int64(2), Value::Int64(3)]),
                Value::String("four".into()),
            ])
        );
    }

    #[test]
    fn coerce_rejects_unparseable_int() {
        let err = coerce_cell("notanumber", TypeTag::Int).unwrap_err();
        assert!(err.to_string().contains("Could not parse 'notanumber'"));
        assert!(!err.to_string().contains("array"));
    }

    #[test]
    fn coerce_array_failure_names_array_in_message() {
        let err = coerce_cell("strval", TypeTag::Array).unwrap_err();
        assert!(err
            .to_string()
            .contains("Could not parse 'strval' as an array"));
    }

    #[test]
    fn empty_cell_coerces_to_null_regardless_of_declared_type() {
        assert_eq!(coerce_cell("", TypeTag::Int).unwrap(), Value::Null);
        assert_eq!(coerce_cell("", TypeTag::Array).unwrap(), Value::Null);
    }

    #[test]
    fn encode_value_rejects_embedded_nul() {
        let mut buf = Vec::new();
        let err = encode_value(&mut buf, &Value::String("a\0b".into())).unwrap_err();
        assert!(matches!(err, LoaderError::EmbeddedNul));
    }
}
