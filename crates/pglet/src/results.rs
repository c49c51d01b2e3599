//! Structured results reconstructed from the wire protocol.

use pglet_protocol::{BackendMessage, CallOutcome, ErrorFields, FieldDescription};

/// One row of a query result, text-format values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    values: Vec<Option<String>>,
}

impl Row {
    /// All values in this row; `None` entries are SQL NULL.
    #[must_use]
    pub fn values(&self) -> &[Option<String>] {
        &self.values
    }

    /// Value at `idx`; `None` for NULL or out of range.
    #[must_use]
    pub fn get(&self, idx: usize) -> Option<&str> {
        self.values.get(idx).and_then(|v| v.as_deref())
    }

    /// Whether the value at `idx` is SQL NULL.
    #[must_use]
    pub fn is_null(&self, idx: usize) -> bool {
        matches!(self.values.get(idx), Some(None))
    }
}

/// A reconstructed query result.
#[derive(Debug, Clone, Default)]
pub struct QueryResult {
    /// Column descriptions, when the statement returned rows.
    pub fields: Vec<FieldDescription>,
    /// The rows, in stream order.
    pub rows: Vec<Row>,
    /// The last command tag of the call.
    pub command_tag: Option<String>,
    /// Notices emitted during the call.
    pub notices: Vec<ErrorFields>,
}

impl QueryResult {
    /// Rebuild a structured result from one call's classified messages.
    #[must_use]
    pub fn from_outcome(outcome: &CallOutcome) -> Self {
        let mut result = Self {
            notices: outcome.notices.clone(),
            ..Self::default()
        };
        for msg in &outcome.messages {
            match msg {
                BackendMessage::RowDescription(fields) => {
                    result.fields = fields.clone();
                }
                BackendMessage::DataRow(values) => {
                    result.rows.push(Row {
                        values: values
                            .iter()
                            .map(|v| {
                                v.as_ref()
                                    .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
                            })
                            .collect(),
                    });
                }
                BackendMessage::CommandComplete(tag) => {
                    result.command_tag = Some(tag.clone());
                }
                _ => {}
            }
        }
        result
    }
}

/// Summary of a statement that returns no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecSummary {
    /// The raw command tag (e.g. `INSERT 0 5`).
    pub command_tag: String,
    /// Row count parsed from the tag's trailing token; zero when absent.
    pub rows_affected: u64,
}

impl ExecSummary {
    /// Summarize a call from its classified messages, keeping the last
    /// command tag.
    #[must_use]
    pub fn from_outcome(outcome: &CallOutcome) -> Self {
        let tag = outcome
            .messages
            .iter()
            .rev()
            .find_map(|msg| match msg {
                BackendMessage::CommandComplete(tag) => Some(tag.as_str()),
                _ => None,
            })
            .unwrap_or("");
        Self::from_tag(tag)
    }

    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        let rows_affected = tag
            .rsplit(' ')
            .next()
            .and_then(|tok| tok.parse().ok())
            .unwrap_or(0);
        Self {
            command_tag: tag.to_owned(),
            rows_affected,
        }
    }
}
