//! Extended query protocol messages.

use crate::connection::ResourceKind;
use crate::error::{Error, Result};
use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, UNSPECIFIED_OID};
use crate::value::Value;

/// Write a Parse message to create a named prepared statement.
///
/// Every parameter is declared with OID 0 so the server infers its type from
/// context (or from an explicit `$n::type` cast in the query).
///
/// Nothing is written when `param_count` does not fit the message.
pub fn write_parse(buf: &mut Vec<u8>, name: &str, query: &str, param_count: usize) -> Result<()> {
    let count = param_count_field(param_count)?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr(name);
    msg.write_cstr(query);
    msg.write_u16(count);
    for _ in 0..count {
        msg.write_i32(UNSPECIFIED_OID as i32);
    }
    msg.finish();
    Ok(())
}

/// Write a Bind message to create a portal from a prepared statement.
///
/// Parameters are sent in text format, in positional order. Results are
/// requested in text format as well.
///
/// Nothing is written when there are more parameters than the message can
/// count.
pub fn write_bind(buf: &mut Vec<u8>, portal: &str, statement: &str, params: &[Value]) -> Result<()> {
    let count = param_count_field(params.len())?;
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr(portal);
    msg.write_cstr(statement);

    // A single format code applies to every parameter
    msg.write_i16(1);
    msg.write_i16(FormatCode::Text as i16);

    msg.write_u16(count);
    let mut text = String::new();
    for value in params {
        text.clear();
        if value.write_text(&mut text) {
            msg.write_i32(text.len() as i32);
            msg.write_bytes(text.as_bytes());
        } else {
            msg.write_i32(-1);
        }
    }

    msg.write_i16(1);
    msg.write_i16(FormatCode::Text as i16);
    msg.finish();
    Ok(())
}

/// The server reads parameter counts as 16-bit unsigned integers.
fn param_count_field(count: usize) -> Result<u16> {
    u16::try_from(count).map_err(|e| {
        Error::InvalidUsage(format!(
            "{count} parameters exceed the protocol limit of {}: {e}",
            u16::MAX
        ))
    })
}

/// Write an Execute message to run a portal.
///
/// `max_rows` of 0 means no limit; otherwise the server suspends the portal
/// after that many rows.
pub fn write_execute(buf: &mut Vec<u8>, portal: &str, max_rows: u32) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr(portal);
    msg.write_i32(max_rows as i32);
    msg.finish();
}

/// Write a Describe message for a portal.
pub fn write_describe_portal(buf: &mut Vec<u8>, portal: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(b'P');
    msg.write_cstr(portal);
    msg.finish();
}

/// Write a Close message releasing a named statement or portal.
pub fn write_close(buf: &mut Vec<u8>, kind: ResourceKind, name: &str) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::CLOSE);
    msg.write_u8(kind.as_byte());
    msg.write_cstr(name);
    msg.finish();
}

/// Write a Sync message.
///
/// Ends the implicit transaction (closing any named portal opened in it) and
/// makes the server answer with ReadyForQuery.
pub fn write_sync(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::SYNC).finish();
}

/// Write a Flush message.
///
/// Asks the server to deliver pending responses without ending the implicit
/// transaction, so a suspended portal survives until the next Execute.
pub fn write_flush(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::FLUSH).finish();
}

/// Write a Terminate message.
pub fn write_terminate(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::TERMINATE).finish();
}
