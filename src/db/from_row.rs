//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::{AuditRequest, AuditStatus, SocialHandles};

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub const AUDIT_REQUEST_COLS: &str =
    "id, email, company_name, social_handles, status, stripe_payment_id, created_at, updated_at";

impl FromRow for AuditRequest {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        let handles_json: String = row.get(3)?;
        let social_handles: SocialHandles =
            serde_json::from_str(&handles_json).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    3,
                    "social_handles".to_string(),
                    rusqlite::types::Type::Text,
                )
            })?;
        let status: AuditStatus = parse_enum(row, 4, "status")?;
        Ok(AuditRequest {
            id: row.get(0)?,
            email: row.get(1)?,
            company_name: row.get(2)?,
            social_handles,
            status,
            stripe_payment_id: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }
}
