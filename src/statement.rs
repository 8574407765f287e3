//! Prepared statements with named parameters.

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::connection::{Connection, ResourceKind};
use crate::conversion::FromRow;
use crate::error::{Error, Result};
use crate::parameter::Parameter;
use crate::result_set::ResultSet;
use crate::rewrite::rewrite;
use crate::value::Value;

/// A command prepared once and executed any number of times with the current
/// values of its [`Parameter`]s.
///
/// The statement owns a server-side prepared statement (`stmt<N>`) and a
/// portal (`prtl<N>`) on the connection that created it. Every lifecycle call
/// takes that connection; passing a different one is not detected.
///
/// ```ignore
/// let id = Parameter::new(":id", 1);
/// let mut stmt = Statement::new(&mut conn, "select name from users where id = :id", &[id.clone()])?;
///
/// let mut name = (String::new(),);
/// for n in 1..=3 {
///     id.set_value(n);
///     if stmt.scan(&mut conn, &mut name)? {
///         println!("{n}: {}", name.0);
///     }
/// }
/// stmt.close(&mut conn)?;
/// ```
pub struct Statement {
    name: String,
    portal_name: String,
    command: String,
    actual_command: String,
    params: Vec<Parameter>,
    name2param: HashMap<String, Parameter>,
    closed: bool,
}

impl Statement {
    /// Prepare `command` on `conn` with the given parameters.
    ///
    /// Each parameter becomes the position of its index in `params` (1-based)
    /// and is bound to this statement for good. Fails with
    /// [`Error::ParameterAlreadyBound`] when a parameter already belongs to a
    /// statement or is listed twice; nothing is allocated or bound then, even
    /// when another thread claims the same parameter concurrently.
    ///
    /// No round trip happens here: the server sees the statement on its first
    /// execution.
    pub fn new<C: Connection + ?Sized>(
        conn: &mut C,
        command: &str,
        params: &[Parameter],
    ) -> Result<Self> {
        // A handle listed twice fails its second claim.
        for (idx, param) in params.iter().enumerate() {
            if let Err(e) = param.claim() {
                params[..idx].iter().for_each(Parameter::release);
                return Err(e);
            }
        }

        let name = format!("stmt{}", conn.next_statement_id());
        let portal_name = format!("prtl{}", conn.next_portal_id());

        let mut name2param = HashMap::with_capacity(params.len());
        for param in params {
            param.bind(&name);
            name2param.insert(param.name().to_string(), param.clone());
        }

        let actual_command = rewrite(command, params);
        tracing::debug!(statement = %name, portal = %portal_name, "statement prepared");

        Ok(Self {
            name,
            portal_name,
            command: command.to_string(),
            actual_command,
            params: params.to_vec(),
            name2param,
            closed: false,
        })
    }

    /// Parameter with the given name, exactly as it was created (`":id"`).
    pub fn parameter(&self, name: &str) -> Option<Parameter> {
        self.name2param.get(name).cloned()
    }

    /// The parameters in positional order.
    ///
    /// The returned vector is a copy; its handles still share values with the
    /// statement.
    pub fn parameters(&self) -> Vec<Parameter> {
        self.params.clone()
    }

    /// Command text as given.
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Command text sent to the server, with positional placeholders.
    ///
    /// Error positions reported by the server refer to this text.
    pub fn actual_command(&self) -> &str {
        &self.actual_command
    }

    /// Server-side prepared statement name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side portal name.
    pub fn portal_name(&self) -> &str {
        &self.portal_name
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current parameter values in positional order.
    pub fn param_values(&self) -> Vec<Value> {
        self.params.iter().map(Parameter::value).collect()
    }

    /// Execute and return a cursor over the rows.
    ///
    /// The result set holds `conn` until it is closed or dropped.
    pub fn query<'c, C: Connection + ?Sized>(&self, conn: &'c mut C) -> Result<ResultSet<'c, C>> {
        self.ensure_open()?;
        tracing::debug!(statement = %self.name, "query");
        self.log_command();

        let mut rs = ResultSet::new(conn, &self.portal_name);
        rs.start(self)?;
        Ok(rs)
    }

    /// Execute and return the number of rows affected.
    ///
    /// Rows the command returns are read and discarded. Commands whose tag
    /// carries no count report 0.
    pub fn execute<C: Connection + ?Sized>(&self, conn: &mut C) -> Result<u64> {
        tracing::debug!(statement = %self.name, "execute");
        let mut rs = self.query(conn)?;
        while rs.next_row()?.is_some() {}
        rs.close()?;
        Ok(rs.rows_affected().unwrap_or(0))
    }

    /// Execute and decode the first row into `out`.
    ///
    /// Returns `Ok(false)` and leaves `out` untouched when the command
    /// returned no rows. The result set is closed on every path; an error
    /// from reading the row wins over one from closing.
    pub fn scan<C, T>(&self, conn: &mut C, out: &mut T) -> Result<bool>
    where
        C: Connection + ?Sized,
        T: for<'a> FromRow<'a>,
    {
        tracing::debug!(statement = %self.name, "scan");
        let mut rs = self.query(conn)?;
        let found = rs.scan_next(out);
        let closed = rs.close();
        let found = found?;
        closed?;
        Ok(found)
    }

    /// Release the prepared statement on the server.
    ///
    /// Closing a closed statement does nothing. On failure the statement
    /// stays open.
    pub fn close<C: Connection + ?Sized>(&mut self, conn: &mut C) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        tracing::debug!(statement = %self.name, "close");
        conn.close_resource(ResourceKind::Statement, &self.name)?;
        self.closed = true;
        Ok(())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::StatementClosed {
                name: self.name.clone(),
            });
        }
        Ok(())
    }

    fn log_command(&self) {
        if !tracing::enabled!(tracing::Level::TRACE) {
            return;
        }
        let mut dump = String::new();
        let _ = writeln!(dump, "actual command:\n{}", self.actual_command);
        for (idx, param) in self.params.iter().enumerate() {
            let _ = writeln!(dump, "${} ({}) = '{}'", idx + 1, param.name(), param.value());
        }
        tracing::trace!(statement = %self.name, "{dump}");
    }
}

impl std::fmt::Debug for Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Statement")
            .field("name", &self.name)
            .field("portal_name", &self.portal_name)
            .field("actual_command", &self.actual_command)
            .field("params", &self.params)
            .field("closed", &self.closed)
            .finish()
    }
}

impl Drop for Statement {
    fn drop(&mut self) {
        if !self.closed {
            tracing::warn!(statement = %self.name, "statement dropped without close");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::result_set::ResultBuffer;
    use crate::row::Column;

    /// Answers every execution with the same canned result.
    #[derive(Default)]
    struct Canned {
        statements: u64,
        portals: u64,
        rows: Vec<Vec<Option<Vec<u8>>>>,
        tag: Option<&'static str>,
        executed: Vec<(String, Vec<Value>)>,
        closed: Vec<(ResourceKind, String)>,
        fail_close: bool,
    }

    impl Connection for Canned {
        fn next_statement_id(&mut self) -> u64 {
            self.statements += 1;
            self.statements - 1
        }

        fn next_portal_id(&mut self) -> u64 {
            self.portals += 1;
            self.portals - 1
        }

        fn execute(&mut self, statement: &Statement, rows: &mut ResultBuffer) -> Result<()> {
            self.executed
                .push((statement.actual_command().to_string(), statement.param_values()));
            if !self.rows.is_empty() {
                rows.set_columns(vec![Column::new("a", 23), Column::new("b", 25)]);
            }
            for row in &self.rows {
                rows.push_row(row.clone());
            }
            rows.finish(self.tag);
            Ok(())
        }

        fn fetch(&mut self, _portal: &str, _rows: &mut ResultBuffer) -> Result<()> {
            Err(Error::Protocol("portal is not suspended".into()))
        }

        fn close_resource(&mut self, kind: ResourceKind, name: &str) -> Result<()> {
            if self.fail_close {
                return Err(Error::Io(std::io::ErrorKind::BrokenPipe.into()));
            }
            self.closed.push((kind, name.to_string()));
            Ok(())
        }
    }

    #[test]
    fn test_construct_allocates_names_and_rewrites() {
        let mut conn = Canned::default();
        let id = Parameter::with_type(":id", "int8", 7_i64);
        let mut stmt = Statement::new(
            &mut conn,
            "select * from t where id = :id or ':id' = @id",
            &[id.clone()],
        )
        .unwrap();

        assert_eq!(stmt.name(), "stmt0");
        assert_eq!(stmt.portal_name(), "prtl0");
        assert_eq!(stmt.actual_command(), "select * from t where id = $1::int8 or ':id' = $1::int8");
        assert_eq!(stmt.command(), "select * from t where id = :id or ':id' = @id");
        assert_eq!(id.statement_name().as_deref(), Some("stmt0"));
        assert!(stmt.parameter(":id").unwrap().ptr_eq(&id));
        assert!(stmt.parameter(":missing").is_none());
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_rejected_construction_has_no_side_effects() {
        let mut conn = Canned::default();
        let fresh = Parameter::new(":a", 1);
        let dup = Parameter::new(":b", 2);

        let err = Statement::new(
            &mut conn,
            "select :a, :b",
            &[fresh.clone(), dup.clone(), dup.clone()],
        )
        .unwrap_err();
        assert!(matches!(err, Error::ParameterAlreadyBound { ref name } if name == ":b"));
        assert!(!fresh.is_bound());
        assert!(!dup.is_bound());
        assert_eq!(conn.statements, 0);
        assert_eq!(conn.portals, 0);

        let mut stmt = Statement::new(&mut conn, "select :a, :b", &[fresh, dup]).unwrap();
        assert_eq!(stmt.name(), "stmt0");
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_concurrent_construction_has_one_owner() {
        let shared = Parameter::new(":shared", 1);
        let results: Vec<(Result<Statement>, Canned, Parameter)> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let shared = shared.clone();
                    s.spawn(move || {
                        let mut conn = Canned::default();
                        let own = Parameter::new(":own", 2);
                        let stmt = Statement::new(
                            &mut conn,
                            "select :own, :shared",
                            &[own.clone(), shared],
                        );
                        (stmt, conn, own)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let mut winners = 0;
        for (stmt, mut conn, own) in results {
            match stmt {
                Ok(mut stmt) => {
                    winners += 1;
                    assert_eq!(own.statement_name().as_deref(), Some("stmt0"));
                    stmt.close(&mut conn).unwrap();
                }
                Err(err) => {
                    assert!(err.is_usage_fault());
                    assert!(!own.is_bound());
                    assert_eq!((conn.statements, conn.portals), (0, 0));
                }
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(shared.statement_name().as_deref(), Some("stmt0"));
    }

    #[test]
    fn test_duplicate_names_later_wins_lookup() {
        let mut conn = Canned::default();
        let first = Parameter::new(":n", 1);
        let second = Parameter::new(":n", 2);
        let mut stmt =
            Statement::new(&mut conn, "select :n", &[first.clone(), second.clone()]).unwrap();

        assert_eq!(stmt.actual_command(), "select $1");
        assert!(stmt.parameter(":n").unwrap().ptr_eq(&second));
        assert_eq!(stmt.parameters().len(), 2);
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_execute_uses_current_values_and_tag_count() {
        let mut conn = Canned {
            tag: Some("UPDATE 3"),
            ..Default::default()
        };
        let v = Parameter::new(":v", "x");
        let mut stmt = Statement::new(&mut conn, "update t set v = :v", &[v.clone()]).unwrap();

        assert_eq!(stmt.execute(&mut conn).unwrap(), 3);
        v.set_value(None::<&str>);
        assert_eq!(stmt.execute(&mut conn).unwrap(), 3);

        assert_eq!(conn.executed[0].1, vec![Value::Text("x".into())]);
        assert_eq!(conn.executed[1].1, vec![Value::Null]);
        assert_eq!(conn.executed[1].0, "update t set v = $1");
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_execute_without_count_is_zero() {
        let mut conn = Canned {
            tag: Some("CREATE TABLE"),
            ..Default::default()
        };
        let mut stmt = Statement::new(&mut conn, "create table t (a int)", &[]).unwrap();
        assert_eq!(stmt.execute(&mut conn).unwrap(), 0);
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_scan_first_row() {
        let mut conn = Canned {
            rows: vec![
                vec![Some(b"1".to_vec()), Some(b"one".to_vec())],
                vec![Some(b"2".to_vec()), None],
            ],
            tag: Some("SELECT 2"),
            ..Default::default()
        };
        let mut stmt = Statement::new(&mut conn, "select a, b from t", &[]).unwrap();

        let mut out = (0_i32, String::new());
        assert!(stmt.scan(&mut conn, &mut out).unwrap());
        assert_eq!(out, (1, "one".to_string()));
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_scan_zero_rows_leaves_output() {
        let mut conn = Canned {
            tag: Some("SELECT 0"),
            ..Default::default()
        };
        let mut stmt = Statement::new(&mut conn, "select a, b from t", &[]).unwrap();

        let mut out = (42_i32, String::from("untouched"));
        assert!(!stmt.scan(&mut conn, &mut out).unwrap());
        assert_eq!(out, (42, "untouched".to_string()));
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_close_twice_then_execute_fails() {
        let mut conn = Canned::default();
        let mut stmt = Statement::new(&mut conn, "select 1", &[]).unwrap();

        stmt.close(&mut conn).unwrap();
        stmt.close(&mut conn).unwrap();
        assert_eq!(conn.closed, vec![(ResourceKind::Statement, "stmt0".to_string())]);
        assert!(stmt.is_closed());

        let err = stmt.query(&mut conn).err().unwrap();
        assert!(matches!(err, Error::StatementClosed { ref name } if name == "stmt0"));
        assert!(stmt.execute(&mut conn).unwrap_err().is_usage_fault());
        let mut out = (0_i32,);
        assert!(stmt.scan(&mut conn, &mut out).is_err());
        assert!(conn.executed.is_empty());
    }

    #[test]
    fn test_failed_close_keeps_statement_open() {
        let mut conn = Canned {
            fail_close: true,
            ..Default::default()
        };
        let mut stmt = Statement::new(&mut conn, "select 1", &[]).unwrap();

        assert!(matches!(stmt.close(&mut conn), Err(Error::Io(_))));
        assert!(!stmt.is_closed());
        conn.fail_close = false;
        stmt.close(&mut conn).unwrap();
    }

    #[test]
    fn test_names_strictly_increase() {
        let mut conn = Canned::default();
        let mut a = Statement::new(&mut conn, "select 1", &[]).unwrap();
        let mut b = Statement::new(&mut conn, "select 2", &[]).unwrap();
        assert_eq!((a.name(), a.portal_name()), ("stmt0", "prtl0"));
        assert_eq!((b.name(), b.portal_name()), ("stmt1", "prtl1"));
        a.close(&mut conn).unwrap();
        b.close(&mut conn).unwrap();
    }
}
