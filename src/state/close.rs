//! State machine releasing a named statement or portal: `Close Sync`.

use crate::buffer_set::BufferSet;
use crate::connection::ResourceKind;
use crate::error::{Error, Result};
use crate::protocol::backend::{ErrorResponse, RawMessage, ReadyForQuery, msg_type};
use crate::protocol::frontend::{write_close, write_sync};
use crate::protocol::types::TransactionStatus;

use super::action::{Action, AsyncMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Initial,
    WaitingClose,
    WaitingReady,
    Finished,
}

/// Close state machine.
pub struct CloseStateMachine {
    state: State,
    pending_error: Option<Error>,
    transaction_status: TransactionStatus,
}

impl CloseStateMachine {
    /// Write Close + Sync for `name` to the buffer.
    pub fn new(buffer_set: &mut BufferSet, kind: ResourceKind, name: &str) -> Self {
        buffer_set.write_buffer.clear();
        write_close(&mut buffer_set.write_buffer, kind, name);
        write_sync(&mut buffer_set.write_buffer);

        Self {
            state: State::Initial,
            pending_error: None,
            transaction_status: TransactionStatus::Idle,
        }
    }

    /// Get the transaction status after completion.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Process input and return the next action.
    pub fn step(&mut self, buffer_set: &mut BufferSet) -> Result<Action> {
        if self.state == State::Initial {
            self.state = State::WaitingClose;
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
            if error.is_connection_broken() {
                self.state = State::Finished;
                return Err(error);
            }
            // Sync is already on the wire
            self.pending_error.get_or_insert(error);
            self.state = State::WaitingReady;
            return Ok(Action::ReadMessage);
        }

        match (self.state, type_byte) {
            (State::WaitingClose, msg_type::CLOSE_COMPLETE) => {
                self.state = State::WaitingReady;
                Ok(Action::ReadMessage)
            }
            (State::WaitingReady, msg_type::READY_FOR_QUERY) => {
                let ready = ReadyForQuery::parse(payload)?;
                self.transaction_status = ready.transaction_status().unwrap_or_default();
                self.state = State::Finished;
                match self.pending_error.take() {
                    Some(error) => Err(error),
                    None => Ok(Action::Finished),
                }
            }
            (state, _) => Err(Error::Protocol(format!(
                "Unexpected message '{}' in close state {:?}",
                type_byte as char, state
            ))),
        }
    }
}
