//! Action types for state machine I/O requests.

use crate::error::{ErrorFields, Result};
use crate::protocol::backend::{NoticeResponse, NotificationResponse, ParameterStatus, msg_type};

/// Action requested by a state machine.
///
/// The caller performs the requested I/O and then calls `step()` again.
#[derive(Debug)]
pub enum Action {
    /// Read a PostgreSQL message from the server.
    ///
    /// The caller should:
    /// 1. Read the message type byte (1 byte)
    /// 2. Read the length (4 bytes, big-endian i32)
    /// 3. Read (length - 4) bytes of payload into the buffer set
    /// 4. Call the state machine's `step()` method again
    ReadMessage,

    /// Write `buffer_set.write_buffer` to the server, flush, then read a message.
    WriteAndReadMessage,

    /// An asynchronous message was received.
    ///
    /// The caller should handle the message, read the next message,
    /// then call `step()` again.
    HandleAsyncMessageAndReadMessage(AsyncMessage),

    /// The state machine has finished successfully.
    Finished,
}

/// Asynchronous message from the server.
///
/// These can arrive at any time during query execution.
#[derive(Debug, Clone)]
pub enum AsyncMessage {
    /// Notification from LISTEN/NOTIFY.
    Notification {
        /// PID of the notifying backend process
        pid: u32,
        /// Channel name
        channel: String,
        /// Notification payload
        payload: String,
    },

    /// Non-fatal notice/warning from server.
    Notice(ErrorFields),

    /// Server parameter value changed.
    ParameterChanged {
        /// Parameter name
        name: String,
        /// New value
        value: String,
    },
}

impl AsyncMessage {
    /// Decode a message for which [`RawMessage::is_async_type`] holds.
    ///
    /// [`RawMessage::is_async_type`]: crate::protocol::backend::RawMessage::is_async_type
    pub fn parse(type_byte: u8, payload: &[u8]) -> Result<Self> {
        Ok(match type_byte {
            msg_type::NOTICE_RESPONSE => AsyncMessage::Notice(NoticeResponse::parse(payload)?.fields),
            msg_type::NOTIFICATION_RESPONSE => {
                let n = NotificationResponse::parse(payload)?;
                AsyncMessage::Notification {
                    pid: n.pid,
                    channel: n.channel.to_string(),
                    payload: n.payload.to_string(),
                }
            }
            _ => {
                let p = ParameterStatus::parse(payload)?;
                AsyncMessage::ParameterChanged {
                    name: p.name.to_string(),
                    value: p.value.to_string(),
                }
            }
        })
    }
}
