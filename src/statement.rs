//! Binds parameter tuples from a message onto a prepared statement and
//! streams result rows back into a message — the core of the adapter.

use crate::byteutil::{align_up, WORD};
use crate::engine::{ColumnValue, PreparedStatement, StepOutcome};
use crate::error::{Error, ErrorKind, Result};
use crate::message::{Message, DEFAULT_SOFT_CAP};
use crate::types::{classify_column, parse_param_tag, validate_iso8601, ParamTag};

/// Tunable knobs for the adapter. The soft cap governs the `Row`/`Done`
/// decision in [`query`]: a default of twice the inline buffer capacity
/// guarantees at least one row spills into the overflow buffer before
/// the adapter gives up and asks the caller to re-issue.
#[derive(Debug, Clone, Copy)]
pub struct AdapterConfig {
    pub soft_cap: usize,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            soft_cap: DEFAULT_SOFT_CAP,
        }
    }
}

/// Outcome of a `query` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOutcome {
    /// The engine is exhausted and every row it yielded fit in the
    /// message.
    Done,
    /// The buffer filled before exhaustion; the frame is valid and the
    /// caller should re-issue `query` to continue.
    Row,
}

#[cfg(feature = "log")]
fn log_failure(op: &str, err: &Error) {
    log::warn!("{op} failed: {err}");
}

#[cfg(not(feature = "log"))]
fn log_failure(_op: &str, _err: &Error) {}

/// Consume parameters from `message` and apply them to `stmt`. If the
/// message carries no body, succeeds with no bindings applied.
pub fn bind<S: PreparedStatement>(stmt: &mut S, message: &mut Message) -> Result<()> {
    bind_inner(stmt, message).inspect_err(|e| log_failure("bind", e))
}

fn bind_inner<S: PreparedStatement>(stmt: &mut S, message: &mut Message) -> Result<()> {
    if message.at_end() {
        return Ok(());
    }

    let header_word = message.body_get_raw(WORD)?;
    let n = header_word[0] as usize;

    let mut tag_bytes: Vec<u8> = Vec::with_capacity(n);
    let first_batch = n.min(7);
    tag_bytes.extend_from_slice(&header_word[1..1 + first_batch]);

    let mut remaining = n.saturating_sub(7);
    while remaining > 0 {
        if message.at_end() {
            return Err(Error::new(ErrorKind::Error, "incomplete param types"));
        }
        let word = message
            .body_get_raw(WORD)
            .map_err(|_| Error::new(ErrorKind::Error, "incomplete param types"))?;
        let take = remaining.min(8);
        tag_bytes.extend_from_slice(&word[..take]);
        remaining -= take;
    }

    let tags: Vec<ParamTag> = tag_bytes
        .iter()
        .enumerate()
        .map(|(i, &b)| parse_param_tag(b, i + 1))
        .collect::<Result<Vec<_>>>()?;

    for (i, tag) in tags.into_iter().enumerate() {
        let index = i + 1;
        match tag {
            ParamTag::Integer => {
                let v = read_value(message.body_get_int64())?;
                stmt.bind_int64(index, v)?;
            }
            ParamTag::Float => {
                let v = read_value(message.body_get_float64())?;
                stmt.bind_float64(index, v)?;
            }
            ParamTag::Text => {
                let v = read_value(message.body_get_text())?;
                stmt.bind_text(index, &v)?;
            }
            ParamTag::Blob => {
                let v = read_value(message.body_get_blob())?;
                stmt.bind_blob(index, &v)?;
            }
            ParamTag::Null => {
                read_value(message.body_get_uint64())?;
                stmt.bind_null(index)?;
            }
            ParamTag::Unixtime => {
                let v = read_value(message.body_get_int64())?;
                stmt.bind_int64(index, v)?;
            }
            ParamTag::Iso8601 => {
                let v = read_value(message.body_get_text())?;
                validate_iso8601(&v).map_err(|e| e.context(format!("param {index}")))?;
                stmt.bind_text(index, &v)?;
            }
            ParamTag::Boolean => {
                let v = read_value(message.body_get_int64())?;
                stmt.bind_int64(index, v)?;
            }
        }
    }

    Ok(())
}

/// Remap an end-of-message failure while reading a parameter value into
/// the contractual "incomplete param values" message; pass other error
/// kinds (e.g. malformed text) through unchanged.
fn read_value<T>(result: Result<T>) -> Result<T> {
    result.map_err(|e| {
        if e.kind() == ErrorKind::Eom {
            Error::new(ErrorKind::Error, "incomplete param values")
        } else {
            e
        }
    })
}

/// Execute `stmt`, streaming its columns and rows into `message` until
/// either exhaustion or the configured soft cap is reached.
pub fn query<S: PreparedStatement>(
    stmt: &mut S,
    message: &mut Message,
    config: &AdapterConfig,
) -> Result<QueryOutcome> {
    query_inner(stmt, message, config).inspect_err(|e| log_failure("query", e))
}

fn query_inner<S: PreparedStatement>(
    stmt: &mut S,
    message: &mut Message,
    config: &AdapterConfig,
) -> Result<QueryOutcome> {
    let col_count = stmt.column_count();
    if col_count == 0 {
        return Err(Error::new(ErrorKind::Error, "stmt doesn't yield any column"));
    }

    message.body_put_uint64(col_count as u64)?;
    for i in 0..col_count {
        message.body_put_text(stmt.column_name(i))?;
    }

    loop {
        if message.written_len() >= config.soft_cap {
            return Ok(QueryOutcome::Row);
        }
        match stmt.step()? {
            StepOutcome::Done => return Ok(QueryOutcome::Done),
            StepOutcome::Row => encode_row(stmt, message, col_count)?,
        }
    }
}

fn encode_row<S: PreparedStatement>(
    stmt: &S,
    message: &mut Message,
    col_count: usize,
) -> Result<()> {
    let mut tags = Vec::with_capacity(col_count);
    let mut values = Vec::with_capacity(col_count);
    for i in 0..col_count {
        let value = stmt.column_value(i);
        let tag = classify_column(stmt.column_decltype(i), value.storage_type());
        tags.push(tag);
        values.push(value);
    }

    let header_len = col_count.div_ceil(2);
    let padded_header_len = align_up(header_len);
    let mut header = vec![0u8; padded_header_len];
    for (i, tag) in tags.iter().enumerate() {
        let nibble = tag.as_byte() & 0x0F;
        if i % 2 == 0 {
            header[i / 2] |= nibble;
        } else {
            header[i / 2] |= nibble << 4;
        }
    }
    message.body_put_raw(&header)?;

    for (tag, value) in tags.iter().zip(values.iter()) {
        encode_value(message, *tag, value)?;
    }
    Ok(())
}

fn encode_value(message: &mut Message, tag: ParamTag, value: &ColumnValue) -> Result<()> {
    match tag {
        ParamTag::Integer | ParamTag::Unixtime | ParamTag::Boolean => {
            let v = match value {
                ColumnValue::Integer(v) => *v,
                ColumnValue::Float(v) => *v as i64,
                _ => 0,
            };
            message.body_put_int64(v)
        }
        ParamTag::Float => {
            let v = match value {
                ColumnValue::Float(v) => *v,
                ColumnValue::Integer(v) => *v as f64,
                _ => 0.0,
            };
            message.body_put_float64(v)
        }
        ParamTag::Text | ParamTag::Iso8601 => {
            let s = match value {
                ColumnValue::Text(s) => s.as_str(),
                _ => "",
            };
            message.body_put_text(s)
        }
        ParamTag::Blob => {
            let b: &[u8] = match value {
                ColumnValue::Blob(b) => b.as_slice(),
                _ => &[],
            };
            message.body_put_blob(b)
        }
        ParamTag::Null => message.body_put_uint64(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::sqlite::SqliteEngine;
    use crate::engine::Engine;

    #[test]
    fn bind_empty_message_is_a_no_op() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT 1").unwrap();
        let mut message = Message::with_header(0, 0, 0);
        bind(&mut stmt, &mut message).unwrap();
        assert_eq!(stmt.step().unwrap(), StepOutcome::Row);
    }

    #[test]
    fn bind_incomplete_tags_reports_contractual_message() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT ?").unwrap();
        let mut message = Message::with_header(0, 0, 1);
        message.poke_body1(0, &[8, 0, 0, 0, 0, 0, 0, 0]);
        let err = bind(&mut stmt, &mut message).unwrap_err();
        assert_eq!(err.message(), "incomplete param types");
    }

    #[test]
    fn bind_incomplete_values_reports_contractual_message() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT ?").unwrap();
        let mut message = Message::with_header(0, 0, 1);
        message.poke_body1(0, &[1, ParamTag::Integer.as_byte(), 0, 0, 0, 0, 0, 0]);
        let err = bind(&mut stmt, &mut message).unwrap_err();
        assert_eq!(err.message(), "incomplete param values");
    }

    #[test]
    fn bind_unknown_tag_reports_index_and_value() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT ?").unwrap();
        let mut message = Message::with_header(0, 0, 1);
        message.poke_body1(0, &[1, 127, 0, 0, 0, 0, 0, 0]);
        let err = bind(&mut stmt, &mut message).unwrap_err();
        assert_eq!(err.message(), "invalid param 1: unknown type 127");
    }

    #[test]
    fn bind_range_error_surfaces_from_engine() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        // Zero bind parameters declared; the message still offers one.
        let (mut stmt, _) = engine.prepare("SELECT 1").unwrap();
        let mut message = Message::with_header(0, 0, 2);
        message.poke_body1(0, &[1, ParamTag::Integer.as_byte(), 0, 0, 0, 0, 0, 0]);
        message.poke_body1(8, &42i64.to_be_bytes());
        let err = bind(&mut stmt, &mut message).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Range);
        assert_eq!(err.message(), "column index out of range");
    }

    #[test]
    fn bind_integer_round_trips_through_engine() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT ?").unwrap();
        let mut fixture = Message::with_header(0, 0, 2);
        fixture.poke_body1(0, &[1, ParamTag::Integer.as_byte(), 0, 0, 0, 0, 0, 0]);
        fixture.poke_body1(8, &(-666i64).to_be_bytes());

        bind(&mut stmt, &mut fixture).unwrap();
        assert_eq!(stmt.step().unwrap(), StepOutcome::Row);
        assert_eq!(stmt.column_value(0), ColumnValue::Integer(-666));
    }

    #[test]
    fn bind_float_round_trips_bit_identical() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine.prepare("SELECT ?").unwrap();
        let mut fixture = Message::with_header(0, 0, 2);
        fixture.poke_body1(0, &[1, ParamTag::Float.as_byte(), 0, 0, 0, 0, 0, 0]);
        fixture.poke_body1(8, &3.1415f64.to_bits().to_be_bytes());

        bind(&mut stmt, &mut fixture).unwrap();
        assert_eq!(stmt.step().unwrap(), StepOutcome::Row);
        assert_eq!(stmt.column_value(0), ColumnValue::Float(3.1415));
    }

    #[test]
    fn query_empty_table_returns_done_with_column_header_only() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        engine
            .prepare("CREATE TABLE empty_master (name TEXT)")
            .unwrap()
            .0
            .step()
            .unwrap();
        let (mut stmt, _) = engine.prepare("SELECT name FROM empty_master").unwrap();
        let mut message = Message::new();
        let outcome = query(&mut stmt, &mut message, &AdapterConfig::default()).unwrap();
        assert_eq!(outcome, QueryOutcome::Done);
        assert_eq!(message.offset1(), 16);
    }

    #[test]
    fn query_one_integer_row() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        engine.prepare("CREATE TABLE t (n)").unwrap().0.step().unwrap();
        engine
            .prepare("INSERT INTO t VALUES (-123)")
            .unwrap()
            .0
            .step()
            .unwrap();
        let (mut stmt, _) = engine.prepare("SELECT n FROM t").unwrap();
        let mut message = Message::new();
        let outcome = query(&mut stmt, &mut message, &AdapterConfig::default()).unwrap();
        assert_eq!(outcome, QueryOutcome::Done);
        // header(16) + row header word(8) + value word(8)
        assert_eq!(message.offset1(), 32);
    }

    #[test]
    fn query_packed_header_for_three_columns() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        let (mut stmt, _) = engine
            .prepare("SELECT 1 AS i, 'hi' AS t, 3.1415 AS f")
            .unwrap();
        let mut message = Message::new();
        query(&mut stmt, &mut message, &AdapterConfig::default()).unwrap();

        let bytes = message.encoded_body();
        let mut reader = Message::decode(0, 0, message.words(), &bytes).unwrap();
        assert_eq!(reader.body_get_uint64().unwrap(), 3);
        assert_eq!(reader.body_get_text().unwrap(), "i");
        assert_eq!(reader.body_get_text().unwrap(), "t");
        assert_eq!(reader.body_get_text().unwrap(), "f");
        let header = reader.body_get_raw(8).unwrap();
        assert_eq!(header[0] & 0x0F, ParamTag::Integer.as_byte());
        assert_eq!((header[0] >> 4) & 0x0F, ParamTag::Text.as_byte());
        assert_eq!(header[1] & 0x0F, ParamTag::Float.as_byte());
    }

    #[test]
    fn query_overflow_spills_into_body2() {
        let engine = SqliteEngine::open(":memory:").unwrap();
        engine.prepare("CREATE TABLE t (n)").unwrap().0.step().unwrap();
        for i in 0..600 {
            let (mut ins, _) = engine
                .prepare(&format!("INSERT INTO t VALUES ({})", i))
                .unwrap();
            ins.step().unwrap();
        }
        let (mut stmt, _) = engine.prepare("SELECT n FROM t").unwrap();
        let mut message = Message::new();
        let outcome = query(&mut stmt, &mut message, &AdapterConfig::default()).unwrap();
        assert_eq!(outcome, QueryOutcome::Row);
        assert_eq!(message.offset1(), crate::message::BODY1_CAP);
        assert!(message.body2().is_some());
    }
}
