//! Synchronous connection over an established session stream.

use std::collections::HashSet;
use std::io::{Read, Write};

use crate::buffer_set::BufferSet;
use crate::connection::{Connection, ResourceKind};
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::parameter::Parameter;
use crate::protocol::frontend::write_terminate;
use crate::protocol::types::TransactionStatus;
use crate::result_set::ResultBuffer;
use crate::state::action::{Action, AsyncMessage};
use crate::state::{CloseStateMachine, PortalStateMachine};
use crate::statement::Statement;

use super::stream::Stream;

/// Synchronous PostgreSQL connection.
///
/// Wraps a stream whose startup and authentication already happened and
/// runs prepared statements over it with the extended query protocol.
///
/// # Example
///
/// ```ignore
/// let tcp = authenticate(TcpStream::connect("localhost:5432")?)?;
/// let mut conn = Conn::from_stream(tcp, Opts::try_from("postgres://localhost/app?fetch_size=500")?);
///
/// let id = Parameter::new(":id", 1);
/// let mut stmt = conn.prepare("delete from jobs where id = :id", &[id.clone()])?;
/// for n in [4, 8, 15] {
///     id.set_value(n);
///     stmt.execute(&mut conn)?;
/// }
/// stmt.close(&mut conn)?;
/// conn.close()?;
/// ```
pub struct Conn<S: Read + Write> {
    stream: Stream<S>,
    buffer_set: BufferSet,
    opts: Opts,
    next_statement_id: u64,
    next_portal_id: u64,
    parsed: HashSet<String>,
    transaction_status: TransactionStatus,
    is_broken: bool,
    terminated: bool,
}

impl<S: Read + Write> Conn<S> {
    /// Use an already authenticated stream.
    pub fn from_stream(stream: S, opts: Opts) -> Self {
        Self {
            stream: Stream::new(stream),
            buffer_set: BufferSet::new(),
            opts,
            next_statement_id: 0,
            next_portal_id: 0,
            parsed: HashSet::new(),
            transaction_status: TransactionStatus::Idle,
            is_broken: false,
            terminated: false,
        }
    }

    /// Create a statement on this connection.
    pub fn prepare(&mut self, command: &str, params: &[Parameter]) -> Result<Statement> {
        Statement::new(self, command, params)
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Get the underlying stream.
    pub fn get_ref(&self) -> &S {
        self.stream.get_ref()
    }

    /// Get the current transaction status.
    pub fn transaction_status(&self) -> TransactionStatus {
        self.transaction_status
    }

    /// Check if currently in a transaction.
    pub fn in_transaction(&self) -> bool {
        self.transaction_status.in_transaction()
    }

    /// Check if the connection is broken.
    pub fn is_broken(&self) -> bool {
        self.is_broken
    }

    /// Returns true if `statement` already exists on the server.
    pub fn is_parsed(&self, statement: &str) -> bool {
        self.parsed.contains(statement)
    }

    /// Send Terminate and drop the connection.
    pub fn close(mut self) -> Result<()> {
        self.terminated = true;
        self.terminate()
    }

    fn terminate(&mut self) -> Result<()> {
        self.buffer_set.write_buffer.clear();
        write_terminate(&mut self.buffer_set.write_buffer);
        self.stream.write_all(&self.buffer_set.write_buffer)?;
        self.stream.flush()?;
        Ok(())
    }

    fn track<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(ref e) = result {
            if e.is_connection_broken() {
                self.is_broken = true;
            }
        }
        result
    }

    fn ensure_usable(&self) -> Result<()> {
        if self.is_broken {
            return Err(Error::InvalidUsage("connection is broken".into()));
        }
        Ok(())
    }

    fn drive<F>(&mut self, mut step: F) -> Result<()>
    where
        F: FnMut(&mut BufferSet) -> Result<Action>,
    {
        loop {
            match step(&mut self.buffer_set)? {
                Action::ReadMessage => {
                    self.stream.read_message(&mut self.buffer_set)?;
                }
                Action::WriteAndReadMessage => {
                    self.stream.write_all(&self.buffer_set.write_buffer)?;
                    self.stream.flush()?;
                    self.stream.read_message(&mut self.buffer_set)?;
                }
                Action::HandleAsyncMessageAndReadMessage(msg) => {
                    log_async_message(&msg);
                    self.stream.read_message(&mut self.buffer_set)?;
                }
                Action::Finished => return Ok(()),
            }
        }
    }

    fn execute_inner(&mut self, statement: &Statement, rows: &mut ResultBuffer) -> Result<()> {
        self.ensure_usable()?;
        let parse = !self.parsed.contains(statement.name());
        if parse {
            tracing::debug!(statement = %statement.name(), "parsing statement");
        }

        let fetch_size = self.opts.fetch_size;
        let mut state_machine =
            PortalStateMachine::execute(&mut self.buffer_set, statement, parse, fetch_size, rows)?;
        let result = self.drive(|buffer_set| state_machine.step(buffer_set));

        if state_machine.parsed() {
            self.parsed.insert(statement.name().to_string());
        }
        if let Some(status) = state_machine.transaction_status() {
            self.transaction_status = status;
        }
        result
    }

    fn fetch_inner(&mut self, portal: &str, rows: &mut ResultBuffer) -> Result<()> {
        self.ensure_usable()?;
        let fetch_size = self.opts.fetch_size;
        let mut state_machine =
            PortalStateMachine::fetch(&mut self.buffer_set, portal, fetch_size, rows);
        let result = self.drive(|buffer_set| state_machine.step(buffer_set));

        if let Some(status) = state_machine.transaction_status() {
            self.transaction_status = status;
        }
        result
    }

    fn close_inner(&mut self, kind: ResourceKind, name: &str) -> Result<()> {
        self.ensure_usable()?;
        let mut state_machine = CloseStateMachine::new(&mut self.buffer_set, kind, name);
        self.drive(|buffer_set| state_machine.step(buffer_set))?;

        self.transaction_status = state_machine.transaction_status();
        if kind == ResourceKind::Statement {
            self.parsed.remove(name);
        }
        Ok(())
    }
}

impl<S: Read + Write> Connection for Conn<S> {
    fn next_statement_id(&mut self) -> u64 {
        let id = self.next_statement_id;
        self.next_statement_id += 1;
        id
    }

    fn next_portal_id(&mut self) -> u64 {
        let id = self.next_portal_id;
        self.next_portal_id += 1;
        id
    }

    fn execute(&mut self, statement: &Statement, rows: &mut ResultBuffer) -> Result<()> {
        let result = self.execute_inner(statement, rows);
        self.track(result)
    }

    fn fetch(&mut self, portal: &str, rows: &mut ResultBuffer) -> Result<()> {
        let result = self.fetch_inner(portal, rows);
        self.track(result)
    }

    fn close_resource(&mut self, kind: ResourceKind, name: &str) -> Result<()> {
        let result = self.close_inner(kind, name);
        self.track(result)
    }
}

impl<S: Read + Write> Drop for Conn<S> {
    fn drop(&mut self) {
        if self.terminated || self.is_broken {
            return;
        }
        // Best effort
        let _ = self.terminate();
    }
}

fn log_async_message(msg: &AsyncMessage) {
    match msg {
        AsyncMessage::Notice(fields) => tracing::info!("server notice: {}", fields),
        AsyncMessage::Notification {
            pid,
            channel,
            payload,
        } => tracing::debug!(pid, channel = %channel, payload = %payload, "notification"),
        AsyncMessage::ParameterChanged { name, value } => {
            tracing::debug!(name = %name, value = %value, "server parameter changed")
        }
    }
}
