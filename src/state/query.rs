//! Query correlation: matches the single in-flight query to its result.
//!
//! [`QueryCorrelator`] is generic over the reply handle `R` so the async
//! driver can store a oneshot sender while tests store plain values.

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::protocol::backend::{FieldDescription, RawValue, rows_affected};
use crate::types::{Value, ValueDecoderTable};

use super::action::QueryMessage;

/// One result row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Arc<[FieldDescription]>,
    values: Vec<Option<RawValue>>,
}

impl Row {
    /// Number of columns.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True if the row has no columns.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Text value of column `index`.
    ///
    /// `None` for NULL, for binary values and for out-of-range indices.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.raw(index).and_then(RawValue::as_str)
    }

    /// Text value of the first column named `name`.
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        let index = self.fields.iter().position(|f| f.name == name)?;
        self.get(index)
    }

    /// Raw value of column `index`, `None` for NULL.
    pub fn raw(&self, index: usize) -> Option<&RawValue> {
        self.values.get(index).and_then(Option::as_ref)
    }

    /// True if column `index` is SQL NULL.
    pub fn is_null(&self, index: usize) -> bool {
        matches!(self.values.get(index), Some(None))
    }

    /// All raw values in column order.
    pub fn values(&self) -> &[Option<RawValue>] {
        &self.values
    }

    /// Column metadata from the RowDescription this row belongs to.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Convert column `index` with the decoder registered for its type.
    pub fn decode(&self, index: usize, table: &ValueDecoderTable) -> Result<Value> {
        let value = self
            .values
            .get(index)
            .ok_or_else(|| Error::InvalidUsage(format!("column index {} out of range", index)))?;
        let type_oid = self.fields.get(index).map_or(0, |f| f.type_oid);
        table.decode(type_oid, value.as_ref())
    }

    /// Convert every column.
    pub fn decode_all(&self, table: &ValueDecoderTable) -> Result<Vec<Value>> {
        (0..self.values.len())
            .map(|i| self.decode(i, table))
            .collect()
    }
}

/// Completed result of a simple query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    fields: Arc<[FieldDescription]>,
    rows: Vec<Row>,
    tag: String,
}

impl QueryResult {
    fn empty() -> Self {
        Self {
            fields: Arc::new([]),
            rows: Vec::new(),
            tag: String::new(),
        }
    }

    /// Column metadata, empty for statements that return no rows.
    pub fn fields(&self) -> &[FieldDescription] {
        &self.fields
    }

    /// Rows in arrival order.
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Take ownership of the rows.
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Command tag from CommandComplete, e.g. `"SELECT 1"`. Empty for an empty query.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// First word of the command tag.
    pub fn command(&self) -> Option<&str> {
        self.tag.split_whitespace().next()
    }

    /// Row count reported in the command tag.
    pub fn rows_affected(&self) -> Option<u64> {
        rows_affected(&self.tag)
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// True if no rows were returned.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convert every row with the value decoder table.
    pub fn decoded_rows(&self, table: &ValueDecoderTable) -> Result<Vec<Vec<Value>>> {
        self.rows.iter().map(|row| row.decode_all(table)).collect()
    }
}

/// A submitted query waiting for its CommandComplete.
struct PendingQuery<R> {
    result: QueryResult,
    reply: R,
}

enum QuerySlot<R> {
    /// No query cycle open
    Idle,
    /// Query sent, result not yet resolved
    Busy(PendingQuery<R>),
    /// Result resolved, waiting for ReadyForQuery
    Settling,
}

/// Outcome of [`QueryCorrelator::submit`].
pub enum Submit<R> {
    /// Write this query to the server now.
    Send(String),
    /// Query stored until the current cycle's ReadyForQuery.
    Held,
    /// Another query is still unresolved.
    Rejected(R, Error),
}

/// Work for the caller after handling a query message.
pub enum QueryAction<R> {
    /// Complete the reply handle with this result.
    Resolve(R, Result<QueryResult>),
    /// Write this held query to the server now.
    Send(String),
}

/// Tracks the at-most-one in-flight query of a connection.
pub struct QueryCorrelator<R> {
    slot: QuerySlot<R>,
    held: Option<(String, R)>,
}

impl<R> Default for QueryCorrelator<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> QueryCorrelator<R> {
    /// Create an idle correlator.
    pub fn new() -> Self {
        Self {
            slot: QuerySlot::Idle,
            held: None,
        }
    }

    /// True if a submitted query has not been resolved yet.
    pub fn has_unresolved(&self) -> bool {
        matches!(self.slot, QuerySlot::Busy(_)) || self.held.is_some()
    }

    /// True if no query cycle is open and nothing is held.
    pub fn is_idle(&self) -> bool {
        matches!(self.slot, QuerySlot::Idle) && self.held.is_none()
    }

    /// Submit a query.
    pub fn submit(&mut self, sql: String, reply: R) -> Submit<R> {
        if self.has_unresolved() {
            return Submit::Rejected(reply, Error::Busy);
        }
        match self.slot {
            QuerySlot::Idle => {
                self.slot = QuerySlot::Busy(PendingQuery {
                    result: QueryResult::empty(),
                    reply,
                });
                Submit::Send(sql)
            }
            QuerySlot::Settling => {
                self.held = Some((sql, reply));
                Submit::Held
            }
            QuerySlot::Busy(_) => Submit::Rejected(reply, Error::Busy),
        }
    }

    /// Route one query-phase message.
    ///
    /// Returns an error for messages that cannot belong to any query: result
    /// messages with no open cycle, or an ErrorResponse nobody is waiting for.
    /// The latter includes errors from later statements of a query that has
    /// already resolved.
    pub fn handle(&mut self, message: QueryMessage) -> Result<Option<QueryAction<R>>> {
        match &mut self.slot {
            QuerySlot::Busy(pending) => match message {
                QueryMessage::RowDescription(desc) => {
                    pending.result.fields = desc.fields.into();
                    Ok(None)
                }
                QueryMessage::DataRow(row) => {
                    let fields = Arc::clone(&pending.result.fields);
                    pending.result.rows.push(Row {
                        fields,
                        values: row.values,
                    });
                    Ok(None)
                }
                QueryMessage::CommandComplete(complete) => Ok(self.resolve(|mut result| {
                    result.tag = complete.tag;
                    Ok(result)
                })),
                QueryMessage::EmptyQueryResponse => Ok(self.resolve(|_| Ok(QueryResult::empty()))),
                QueryMessage::ErrorResponse(fields) => {
                    Ok(self.resolve(|_| Err(Error::Server(fields))))
                }
                QueryMessage::ReadyForQuery(_) => {
                    let action = self.resolve(|_| {
                        Err(Error::Protocol(
                            "ReadyForQuery arrived before the query completed".into(),
                        ))
                    });
                    self.slot = QuerySlot::Idle;
                    Ok(action)
                }
            },

            QuerySlot::Settling => match message {
                QueryMessage::ReadyForQuery(_) => match self.held.take() {
                    Some((sql, reply)) => {
                        self.slot = QuerySlot::Busy(PendingQuery {
                            result: QueryResult::empty(),
                            reply,
                        });
                        Ok(Some(QueryAction::Send(sql)))
                    }
                    None => {
                        self.slot = QuerySlot::Idle;
                        Ok(None)
                    }
                },
                // The query already resolved, so the caller never sees this
                // error through its reply. Surface it to the driver instead.
                QueryMessage::ErrorResponse(fields) => Err(Error::Server(fields)),
                other => {
                    tracing::warn!(msg = ?other, "discarding result of a later statement");
                    Ok(None)
                }
            },

            QuerySlot::Idle => match message {
                QueryMessage::ReadyForQuery(_) => Ok(None),
                QueryMessage::ErrorResponse(fields) => Err(Error::Server(fields)),
                other => Err(Error::Protocol(format!(
                    "Received {:?} with no active query",
                    other
                ))),
            },
        }
    }

    /// Take every unresolved reply handle, in-flight first, leaving the correlator idle.
    ///
    /// Used when the connection fails or ends so no caller waits forever.
    pub fn drain(&mut self) -> Vec<R> {
        let mut replies = Vec::new();
        if let QuerySlot::Busy(pending) = std::mem::replace(&mut self.slot, QuerySlot::Idle) {
            replies.push(pending.reply);
        }
        if let Some((_, reply)) = self.held.take() {
            replies.push(reply);
        }
        replies
    }

    fn resolve(
        &mut self,
        finish: impl FnOnce(QueryResult) -> Result<QueryResult>,
    ) -> Option<QueryAction<R>> {
        match std::mem::replace(&mut self.slot, QuerySlot::Settling) {
            QuerySlot::Busy(pending) => {
                Some(QueryAction::Resolve(pending.reply, finish(pending.result)))
            }
            other => {
                self.slot = other;
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorFields;
    use crate::protocol::backend::{CommandComplete, DataRow, RowDescription};
    use crate::protocol::types::{FormatCode, TransactionStatus};

    fn field(name: &str, type_oid: u32) -> FieldDescription {
        FieldDescription {
            name: name.into(),
            table_oid: 0,
            column_id: 0,
            type_oid,
            type_size: -1,
            type_modifier: -1,
            format: FormatCode::Text,
        }
    }

    fn row_description(fields: Vec<FieldDescription>) -> QueryMessage {
        QueryMessage::RowDescription(RowDescription { fields })
    }

    fn data_row(values: &[Option<&str>]) -> QueryMessage {
        QueryMessage::DataRow(DataRow {
            values: values
                .iter()
                .map(|v| v.map(|s| RawValue::Text(s.to_string())))
                .collect(),
        })
    }

    fn complete(tag: &str) -> QueryMessage {
        QueryMessage::CommandComplete(CommandComplete { tag: tag.into() })
    }

    fn ready() -> QueryMessage {
        QueryMessage::ReadyForQuery(TransactionStatus::Idle)
    }

    fn expect_send(submit: Submit<u32>) -> String {
        match submit {
            Submit::Send(sql) => sql,
            _ => panic!("expected Send"),
        }
    }

    fn expect_resolve(action: Option<QueryAction<u32>>) -> (u32, Result<QueryResult>) {
        match action {
            Some(QueryAction::Resolve(reply, result)) => (reply, result),
            _ => panic!("expected Resolve"),
        }
    }

    #[test]
    fn test_select_one() {
        let mut q = QueryCorrelator::new();
        assert_eq!(expect_send(q.submit("SELECT 1".into(), 1)), "SELECT 1");

        assert!(q.handle(row_description(vec![field("?column?", 23)])).unwrap().is_none());
        assert!(q.handle(data_row(&[Some("1")])).unwrap().is_none());
        let (reply, result) = expect_resolve(q.handle(complete("SELECT 1")).unwrap());
        assert_eq!(reply, 1);

        let result = result.unwrap();
        assert_eq!(result.tag(), "SELECT 1");
        assert_eq!(result.len(), 1);
        assert_eq!(result.rows()[0].get(0), Some("1"));
        assert_eq!(result.rows()[0].get_by_name("?column?"), Some("1"));
        assert_eq!(result.rows_affected(), Some(1));

        assert!(!q.is_idle());
        assert!(q.handle(ready()).unwrap().is_none());
        assert!(q.is_idle());
    }

    #[test]
    fn test_rows_and_nulls() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT a, b FROM t".into(), 7));
        q.handle(row_description(vec![field("a", 23), field("b", 25)])).unwrap();
        q.handle(data_row(&[Some("1"), None])).unwrap();
        q.handle(data_row(&[None, Some("x")])).unwrap();
        let (_, result) = expect_resolve(q.handle(complete("SELECT 2")).unwrap());

        let rows = result.unwrap().into_rows();
        assert_eq!(rows.len(), 2);
        assert!(rows[0].is_null(1));
        assert!(!rows[0].is_null(0));
        assert_eq!(rows[1].get_by_name("b"), Some("x"));
        assert_eq!(rows[1].get(5), None);
        assert!(!rows[1].is_null(5));
    }

    #[test]
    fn test_error_rejects_query() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELEC 1".into(), 3));

        let fields = ErrorFields {
            severity: Some("ERROR".into()),
            code: Some("42601".into()),
            message: Some("syntax error".into()),
            ..Default::default()
        };
        let (reply, result) =
            expect_resolve(q.handle(QueryMessage::ErrorResponse(fields)).unwrap());
        assert_eq!(reply, 3);
        let err = result.unwrap_err();
        assert_eq!(err.sqlstate(), Some("42601"));
        assert_eq!(err.server_fields().map(ErrorFields::message), Some("syntax error"));

        q.handle(ready()).unwrap();
        assert!(q.is_idle());
        expect_send(q.submit("SELECT 1".into(), 4));
    }

    #[test]
    fn test_busy_rejection_keeps_first_query() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT pg_sleep(1)".into(), 1));

        match q.submit("SELECT 2".into(), 2) {
            Submit::Rejected(reply, Error::Busy) => assert_eq!(reply, 2),
            _ => panic!("expected Busy rejection"),
        }

        q.handle(row_description(vec![field("pg_sleep", 2278)])).unwrap();
        q.handle(data_row(&[Some("")])).unwrap();
        let (reply, result) = expect_resolve(q.handle(complete("SELECT 1")).unwrap());
        assert_eq!(reply, 1);
        assert_eq!(result.unwrap().len(), 1);
    }

    #[test]
    fn test_query_held_until_ready() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT 1".into(), 1));
        q.handle(complete("SELECT 0")).unwrap();

        assert!(matches!(q.submit("SELECT 2".into(), 2), Submit::Held));
        assert!(matches!(
            q.submit("SELECT 3".into(), 3),
            Submit::Rejected(3, Error::Busy)
        ));

        match q.handle(ready()).unwrap() {
            Some(QueryAction::Send(sql)) => assert_eq!(sql, "SELECT 2"),
            _ => panic!("expected held query to be sent"),
        }
        let (reply, _) = expect_resolve(q.handle(complete("SELECT 0")).unwrap());
        assert_eq!(reply, 2);
    }

    #[test]
    fn test_later_statements_are_discarded() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT 1; SELECT 2".into(), 1));
        q.handle(row_description(vec![field("a", 23)])).unwrap();
        q.handle(data_row(&[Some("1")])).unwrap();
        let (_, result) = expect_resolve(q.handle(complete("SELECT 1")).unwrap());
        assert_eq!(result.unwrap().rows()[0].get(0), Some("1"));

        assert!(q.handle(row_description(vec![field("b", 23)])).unwrap().is_none());
        assert!(q.handle(data_row(&[Some("2")])).unwrap().is_none());
        assert!(q.handle(complete("SELECT 1")).unwrap().is_none());
        assert!(q.handle(ready()).unwrap().is_none());
        assert!(q.is_idle());
    }

    #[test]
    fn test_later_statement_error_is_surfaced() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("BEGIN; INSERT INTO t VALUES (1)".into(), 1));
        let (_, result) = expect_resolve(q.handle(complete("BEGIN")).unwrap());
        assert_eq!(result.unwrap().tag(), "BEGIN");

        let fields = ErrorFields {
            code: Some("23505".into()),
            ..Default::default()
        };
        match q.handle(QueryMessage::ErrorResponse(fields)) {
            Err(Error::Server(fields)) => assert_eq!(fields.code(), Some("23505")),
            _ => panic!("expected server error"),
        }

        // The cycle still settles normally.
        assert!(q.handle(ready()).unwrap().is_none());
        assert!(q.is_idle());
    }

    #[test]
    fn test_empty_query() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit(String::new(), 1));
        let (_, result) = expect_resolve(q.handle(QueryMessage::EmptyQueryResponse).unwrap());
        let result = result.unwrap();
        assert!(result.is_empty());
        assert_eq!(result.tag(), "");
    }

    #[test]
    fn test_unsolicited_messages() {
        let mut q: QueryCorrelator<u32> = QueryCorrelator::new();
        assert!(q.handle(ready()).unwrap().is_none());
        assert!(matches!(q.handle(data_row(&[Some("1")])), Err(Error::Protocol(_))));
        assert!(matches!(
            q.handle(QueryMessage::ErrorResponse(ErrorFields::default())),
            Err(Error::Server(_))
        ));
    }

    #[test]
    fn test_drain() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT 1".into(), 1));
        assert_eq!(q.drain(), vec![1]);
        assert!(q.is_idle());

        expect_send(q.submit("SELECT 1".into(), 2));
        q.handle(complete("SELECT 1")).unwrap();
        assert!(matches!(q.submit("SELECT 2".into(), 3), Submit::Held));
        assert_eq!(q.drain(), vec![3]);
    }

    #[test]
    fn test_ready_before_complete() {
        let mut q = QueryCorrelator::new();
        expect_send(q.submit("SELECT 1".into(), 1));
        let (_, result) = expect_resolve(q.handle(ready()).unwrap());
        assert!(matches!(result, Err(Error::Protocol(_))));
        assert!(q.is_idle());
    }
}
