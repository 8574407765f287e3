//! State machine running a statement's portal.
//!
//! One execution is pipelined into a single write:
//!
//! ```text
//! [Parse] Close(P) Bind Describe(P) Execute(n) Sync|Flush
//! ```
//!
//! Parse is left out once the statement exists on the connection. The portal
//! is closed before every Bind because a portal left over inside an explicit
//! transaction block cannot be redefined. With a row limit the batch ends in
//! Flush, which keeps the implicit transaction (and the portal) alive until the
//! rows are exhausted; Sync is sent as soon as the portal completes or fails.

use crate::buffer_set::BufferSet;
use crate::connection::ResourceKind;
use crate::error::{Error, Result};
use crate::protocol::backend::{
    CommandComplete, DataRow, ErrorResponse, RawMessage, ReadyForQuery, RowDescription, msg_type,
};
use crate::protocol::frontend::{
    write_bind, write_close, write_describe_portal, write_execute, write_flush, write_parse,
    write_sync,
};
use crate::protocol::types::TransactionStatus;
use crate::result_set::ResultBuffer;
use crate::row::Column;
use crate::statement::Statement;

use super::action::{Action, AsyncMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingParse,
    WaitingClose,
    WaitingBind,
    WaitingDescribe,
    ProcessingRows,
    WaitingReady,
    Finished,
}

/// Portal state machine for execute and fetch.
pub struct PortalStateMachine<'a> {
    state: State,
    first: State,
    rows: &'a mut ResultBuffer,
    sync_sent: bool,
    parsed: bool,
    pending_error: Option<Error>,
    transaction_status: Option<TransactionStatus>,
}

impl<'a> PortalStateMachine<'a> {
    /// Bind the statement's current parameter values to its portal and run it.
    ///
    /// `parse` must be true when the statement does not yet exist on the
    /// connection. A `fetch_size` of 0 fetches every row in one round trip.
    pub fn execute(
        buffer_set: &mut BufferSet,
        statement: &Statement,
        parse: bool,
        fetch_size: u32,
        rows: &'a mut ResultBuffer,
    ) -> Result<Self> {
        let buf = &mut buffer_set.write_buffer;
        let portal = statement.portal_name();
        buf.clear();

        if parse {
            write_parse(
                buf,
                statement.name(),
                statement.actual_command(),
                statement.parameters().len(),
            )?;
        }
        write_close(buf, ResourceKind::Portal, portal);
        write_bind(buf, portal, statement.name(), &statement.param_values())?;
        write_describe_portal(buf, portal);
        write_execute(buf, portal, fetch_size);

        let sync_sent = fetch_size == 0;
        if sync_sent {
            write_sync(buf);
        } else {
            write_flush(buf);
        }

        Ok(Self::new(
            if parse { State::WaitingParse } else { State::WaitingClose },
            sync_sent,
            rows,
        ))
    }

    /// Pull the next `fetch_size` rows from a suspended portal.
    pub fn fetch(
        buffer_set: &mut BufferSet,
        portal: &str,
        fetch_size: u32,
        rows: &'a mut ResultBuffer,
    ) -> Self {
        let buf = &mut buffer_set.write_buffer;
        buf.clear();
        write_execute(buf, portal, fetch_size);
        write_flush(buf);

        Self::new(State::ProcessingRows, false, rows)
    }

    fn new(first: State, sync_sent: bool, rows: &'a mut ResultBuffer) -> Self {
        Self {
            state: State::Initial,
            first,
            rows,
            sync_sent,
            parsed: false,
            pending_error: None,
            transaction_status: None,
        }
    }

    /// Returns true if the server acknowledged the Parse message.
    pub fn parsed(&self) -> bool {
        self.parsed
    }

    /// Transaction status from ReadyForQuery, if one was received.
    ///
    /// A suspended portal finishes without one.
    pub fn transaction_status(&self) -> Option<TransactionStatus> {
        self.transaction_status
    }

    /// Process input and return the next action.
    pub fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if self.state == State::Initial {
            self.state = self.first;
            return Ok(Action::WriteAndReadMessage);
        }

        let type_byte = buffer_set.type_byte;
        let payload = buffer_set.read_buffer.as_slice();

        if RawMessage::is_async_type(type_byte) {
            let msg = AsyncMessage::parse(type_byte, payload)?;
            return Ok(Action::HandleAsyncMessageAndReadMessage(msg));
        }

        if type_byte == msg_type::ERROR_RESPONSE {
            let error = ErrorResponse::parse(payload)?.into_error();
            return self.fail(buffer_set, error);
        }

        match (self.state, type_byte) {
            (State::WaitingParse, msg_type::PARSE_COMPLETE) => {
                self.parsed = true;
                self.state = State::WaitingClose;
                Ok(Action::ReadMessage)
            }
            (State::WaitingClose, msg_type::CLOSE_COMPLETE) => {
                self.state = State::WaitingBind;
                Ok(Action::ReadMessage)
            }
            (State::WaitingBind, msg_type::BIND_COMPLETE) => {
                self.state = State::WaitingDescribe;
                Ok(Action::ReadMessage)
            }
            (State::WaitingDescribe, msg_type::ROW_DESCRIPTION) => {
                let desc = RowDescription::parse(payload)?;
                self.rows
                    .set_columns(desc.fields().iter().map(Column::from).collect());
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            (State::WaitingDescribe, msg_type::NO_DATA) => {
                self.state = State::ProcessingRows;
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::DATA_ROW) => {
                let row = DataRow::parse(payload)?;
                self.rows.push_row(row.to_values()?);
                Ok(Action::ReadMessage)
            }
            (State::ProcessingRows, msg_type::COMMAND_COMPLETE) => {
                let complete = CommandComplete::parse(payload)?;
                self.rows.finish(Some(complete.tag));
                Ok(self.complete(buffer_set))
            }
            (State::ProcessingRows, msg_type::EMPTY_QUERY_RESPONSE) => {
                self.rows.finish(None);
                Ok(self.complete(buffer_set))
            }
            (State::ProcessingRows, msg_type::PORTAL_SUSPENDED) => {
                self.rows.suspend();
                self.state = State::Finished;
                Ok(Action::Finished)
            }
            (State::WaitingReady, msg_type::READY_FOR_QUERY) => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = Some(ready.transaction_status().unwrap_or_default());
                self.state = State::Finished;
                match self.pending_error.take() {
                    Some(error) => Err(error),
                    None => Ok(Action::Finished),
                }
            }
            (state, _) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in portal state {:?}",
                type_byte as char, state
            ))),
        }
    }

    /// The portal ran to completion; end the implicit transaction.
    fn complete(&mut self, buffer_set: &mut BufferSet) -> Action {
        self.state = State::WaitingReady;
        self.sync(buffer_set)
    }

    /// The server skips everything up to Sync after an error; drain to
    /// ReadyForQuery so the connection stays usable, then report the error.
    fn fail(&mut self, buffer_set: &mut BufferSet, error: Error) -> Result<Action> {
        if error.is_connection_broken() {
            self.state = State::Finished;
            return Err(error);
        }
        self.pending_error.get_or_insert(error);
        self.state = State::WaitingReady;
        Ok(self.sync(buffer_set))
    }

    fn sync(&mut self, buffer_set: &mut BufferSet) -> Action {
        if self.sync_sent {
            return Action::ReadMessage;
        }
        buffer_set.write_buffer.clear();
        write_sync(&mut buffer_set.write_buffer);
        self.sync_sent = true;
        Action::WriteAndReadMessage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::parameter::Parameter;

    struct Names(u64);

    impl Connection for Names {
        fn next_statement_id(&mut self) -> u64 {
            self.0
        }
        fn next_portal_id(&mut self) -> u64 {
            self.0
        }
        fn execute(&mut self, _: &Statement, _: &mut ResultBuffer) -> Result<()> {
            unreachable!()
        }
        fn fetch(&mut self, _: &str, _: &mut ResultBuffer) -> Result<()> {
            unreachable!()
        }
        fn close_resource(&mut self, _: ResourceKind, _: &str) -> Result<()> {
            Ok(())
        }
    }

    fn statement(sql: &str, params: &[Parameter]) -> Statement {
        let mut conn = Names(0);
        let mut stmt = Statement::new(&mut conn, sql, params).unwrap();
        // the machine does not look at the closed flag
        stmt.close(&mut conn).unwrap();
        stmt
    }

    fn message_types(buf: &[u8]) -> Vec<u8> {
        let mut types = Vec::new();
        let mut rest = buf;
        while !rest.is_empty() {
            types.push(rest[0]);
            let len = u32::from_be_bytes([rest[1], rest[2], rest[3], rest[4]]) as usize;
            rest = &rest[1 + len..];
        }
        types
    }

    fn row_description() -> Vec<u8> {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(b"n\0");
        payload.extend_from_slice(&0_u32.to_be_bytes());
        payload.extend_from_slice(&0_i16.to_be_bytes());
        payload.extend_from_slice(&23_u32.to_be_bytes());
        payload.extend_from_slice(&4_i16.to_be_bytes());
        payload.extend_from_slice(&(-1_i32).to_be_bytes());
        payload.extend_from_slice(&0_u16.to_be_bytes());
        payload
    }

    fn data_row(value: &[u8]) -> Vec<u8> {
        let mut payload = 1_u16.to_be_bytes().to_vec();
        payload.extend_from_slice(&(value.len() as i32).to_be_bytes());
        payload.extend_from_slice(value);
        payload
    }

    fn feed(
        sm: &mut PortalStateMachine<'_>,
        bs: &mut BufferSet,
        type_byte: u8,
        payload: &[u8],
    ) -> Result<Action> {
        bs.set_message(type_byte, payload);
        sm.step(bs)
    }

    #[test]
    fn test_first_execution_parses() {
        let stmt = statement("select :a", &[Parameter::new(":a", 1)]);
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::execute(&mut bs, &stmt, true, 0, &mut rows).unwrap();

        assert_eq!(message_types(&bs.write_buffer), b"PCBDES".to_vec());
        assert!(matches!(sm.step(&mut bs).unwrap(), Action::WriteAndReadMessage));
        assert!(matches!(feed(&mut sm, &mut bs, b'1', b"").unwrap(), Action::ReadMessage));
        assert!(matches!(feed(&mut sm, &mut bs, b'3', b"").unwrap(), Action::ReadMessage));
        assert!(matches!(feed(&mut sm, &mut bs, b'2', b"").unwrap(), Action::ReadMessage));
        feed(&mut sm, &mut bs, b'T', &row_description()).unwrap();
        feed(&mut sm, &mut bs, b'D', &data_row(b"1")).unwrap();
        assert!(matches!(
            feed(&mut sm, &mut bs, b'C', b"SELECT 1\0").unwrap(),
            Action::ReadMessage
        ));
        assert!(matches!(feed(&mut sm, &mut bs, b'Z', b"I").unwrap(), Action::Finished));

        assert!(sm.parsed());
        assert_eq!(sm.transaction_status(), Some(TransactionStatus::Idle));
        assert_eq!(rows.buffered(), 1);
        assert_eq!(rows.rows_affected(), Some(1));
        assert_eq!(rows.columns()[0].name, "n");
    }

    #[test]
    fn test_row_limit_suspends_without_sync() {
        let stmt = statement("select n from t", &[]);
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::execute(&mut bs, &stmt, false, 2, &mut rows).unwrap();

        assert_eq!(message_types(&bs.write_buffer), b"CBDEH".to_vec());
        sm.step(&mut bs).unwrap();
        feed(&mut sm, &mut bs, b'3', b"").unwrap();
        feed(&mut sm, &mut bs, b'2', b"").unwrap();
        feed(&mut sm, &mut bs, b'T', &row_description()).unwrap();
        feed(&mut sm, &mut bs, b'D', &data_row(b"1")).unwrap();
        feed(&mut sm, &mut bs, b'D', &data_row(b"2")).unwrap();
        assert!(matches!(feed(&mut sm, &mut bs, b's', b"").unwrap(), Action::Finished));

        assert!(!sm.parsed());
        assert_eq!(sm.transaction_status(), None);
        assert!(rows.is_suspended());
        assert_eq!(rows.buffered(), 2);
    }

    #[test]
    fn test_fetch_completion_sends_sync() {
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::fetch(&mut bs, "prtl0", 2, &mut rows);

        assert_eq!(message_types(&bs.write_buffer), b"EH".to_vec());
        sm.step(&mut bs).unwrap();
        feed(&mut sm, &mut bs, b'D', &data_row(b"3")).unwrap();
        assert!(matches!(
            feed(&mut sm, &mut bs, b'C', b"SELECT 3\0").unwrap(),
            Action::WriteAndReadMessage
        ));
        assert_eq!(message_types(&bs.write_buffer), b"S".to_vec());
        assert!(matches!(feed(&mut sm, &mut bs, b'Z', b"T").unwrap(), Action::Finished));
        assert_eq!(sm.transaction_status(), Some(TransactionStatus::InTransaction));
        assert!(rows.is_complete());
    }

    #[test]
    fn test_error_drains_to_ready() {
        let stmt = statement("select nope", &[]);
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::execute(&mut bs, &stmt, true, 10, &mut rows).unwrap();

        sm.step(&mut bs).unwrap();
        let action = feed(&mut sm, &mut bs, b'E', b"SERROR\0C42703\0Mno column\0\0").unwrap();
        assert!(matches!(action, Action::WriteAndReadMessage));
        assert_eq!(message_types(&bs.write_buffer), b"S".to_vec());

        let err = feed(&mut sm, &mut bs, b'Z', b"I").unwrap_err();
        assert_eq!(err.sqlstate(), Some("42703"));
        assert!(!sm.parsed());
    }

    #[test]
    fn test_error_after_sync_only_reads() {
        let stmt = statement("select 1/0", &[]);
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::execute(&mut bs, &stmt, false, 0, &mut rows).unwrap();

        sm.step(&mut bs).unwrap();
        feed(&mut sm, &mut bs, b'3', b"").unwrap();
        feed(&mut sm, &mut bs, b'2', b"").unwrap();
        feed(&mut sm, &mut bs, b'T', &row_description()).unwrap();
        let action = feed(&mut sm, &mut bs, b'E', b"SERROR\0C22012\0Mdivision by zero\0\0").unwrap();
        assert!(matches!(action, Action::ReadMessage));
        assert_eq!(feed(&mut sm, &mut bs, b'Z', b"I").unwrap_err().sqlstate(), Some("22012"));
    }

    #[test]
    fn test_fatal_error_returned_at_once() {
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::fetch(&mut bs, "prtl0", 1, &mut rows);

        sm.step(&mut bs).unwrap();
        let err = feed(&mut sm, &mut bs, b'E', b"SFATAL\0C57P01\0Mshutdown\0\0").unwrap_err();
        assert!(err.is_connection_broken());
    }

    #[test]
    fn test_async_and_unexpected_messages() {
        let mut bs = BufferSet::new();
        let mut rows = ResultBuffer::new();
        let mut sm = PortalStateMachine::fetch(&mut bs, "prtl0", 1, &mut rows);

        sm.step(&mut bs).unwrap();
        assert!(matches!(
            feed(&mut sm, &mut bs, b'N', b"SNOTICE\0Mhi\0\0").unwrap(),
            Action::HandleAsyncMessageAndReadMessage(AsyncMessage::Notice(_))
        ));
        assert!(matches!(
            feed(&mut sm, &mut bs, b'1', b""),
            Err(Error::Protocol(_))
        ));
    }
}
