//! Helpers shared by the backends' sandboxed units of work.

use sqlx::{Column, Connection};
use tracing::debug;

use super::decode::{column_labels, decode_record, DecodeRow};
use super::types::RowSet;

/// Message carried by a unit that stopped waiting because its caller gave up.
pub(crate) const ABANDONED: &str = "Unit of work abandoned after deadline";

/// Converts fetched driver rows into a [`RowSet`].
///
/// Column labels come from the first row; when there are no rows the
/// `described` labels (from the prepared statement) are used instead.
pub fn materialize<R: DecodeRow>(rows: &[R], described: Vec<String>) -> RowSet {
    let columns = rows.first().map(column_labels).unwrap_or(described);
    RowSet::new(columns, rows.iter().map(decode_record).collect())
}

/// Output column labels of a described statement.
pub fn column_names<C: Column>(columns: &[C]) -> Vec<String> {
    columns.iter().map(|col| col.name().to_string()).collect()
}

/// Closes a connection that was detached from its pool.
///
/// Resolves only once the connection is really gone, which for a busy
/// connection means after the statement it was running has stopped.
pub async fn close_detached<C: Connection>(conn: C) {
    match conn.close().await {
        Ok(()) => debug!("Detached connection closed"),
        Err(e) => debug!("Detached connection closed with error: {e}"),
    }
}
