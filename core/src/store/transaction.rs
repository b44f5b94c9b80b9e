use super::{hundredths_at, not_found_as, to_hundredths, Ledger};
use crate::{
    error::{LedgerError, LedgerResult},
    transaction::{Transaction, TransactionKind, TransactionStatus},
};
use rusqlite::{
    params, params_from_iter,
    types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Value, ValueRef},
    OptionalExtension, Row, ToSql,
};

impl ToSql for TransactionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown transaction kind '{s}'").into()))
    }
}

impl ToSql for TransactionStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for TransactionStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        Self::parse(s)
            .ok_or_else(|| FromSqlError::Other(format!("unknown transaction status '{s}'").into()))
    }
}

/// Narrowing for history queries. Defaults return everything, newest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionFilter {
    pub venue_id: Option<String>,
    pub kind:     Option<TransactionKind>,
    pub limit:    Option<u32>,
    pub offset:   u32,
}

impl TransactionFilter {
    pub fn at_venue(mut self, venue_id: impl Into<String>) -> Self {
        self.venue_id = Some(venue_id.into());
        self
    }

    pub fn of_kind(mut self, kind: TransactionKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn page(mut self, limit: u32, offset: u32) -> Self {
        self.limit = Some(limit);
        self.offset = offset;
        self
    }
}

const TXN_COLUMNS: &str = "transaction_id, user_id, venue_id, kind, status,
     amount_total, amount_cash, amount_points, points_earned, points_spent,
     payment_method, line_items, referral_level, original_transaction_id,
     idempotency_key, description, created_at, completed_at, refunded_at";

fn txn_from_row(row: &Row<'_>) -> rusqlite::Result<Transaction> {
    let items_json: String = row.get(11)?;
    let line_items = serde_json::from_str(&items_json).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(11, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(Transaction {
        transaction_id:          row.get(0)?,
        user_id:                 row.get(1)?,
        venue_id:                row.get(2)?,
        kind:                    row.get(3)?,
        status:                  row.get(4)?,
        amount_total:            hundredths_at(row, 5)?,
        amount_cash:             hundredths_at(row, 6)?,
        amount_points:           hundredths_at(row, 7)?,
        points_earned:           hundredths_at(row, 8)?,
        points_spent:            hundredths_at(row, 9)?,
        payment_method:          row.get(10)?,
        line_items,
        referral_level:          row.get::<_, Option<i64>>(12)?.map(|l| l as u8),
        original_transaction_id: row.get(13)?,
        idempotency_key:         row.get(14)?,
        description:             row.get(15)?,
        created_at:              row.get(16)?,
        completed_at:            row.get(17)?,
        refunded_at:             row.get(18)?,
    })
}

impl Ledger<'_> {
    pub fn insert_transaction(&self, txn: &Transaction) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO ledger_transaction (
                transaction_id, user_id, venue_id, kind, status,
                amount_total, amount_cash, amount_points, points_earned, points_spent,
                payment_method, line_items, referral_level, original_transaction_id,
                idempotency_key, description, created_at, completed_at, refunded_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
            params![
                txn.transaction_id,
                txn.user_id,
                txn.venue_id,
                txn.kind,
                txn.status,
                to_hundredths(txn.amount_total)?,
                to_hundredths(txn.amount_cash)?,
                to_hundredths(txn.amount_points)?,
                to_hundredths(txn.points_earned)?,
                to_hundredths(txn.points_spent)?,
                txn.payment_method,
                serde_json::to_string(&txn.line_items)?,
                txn.referral_level.map(i64::from),
                txn.original_transaction_id,
                txn.idempotency_key,
                txn.description,
                txn.created_at,
                txn.completed_at,
                txn.refunded_at,
            ],
        )?;
        Ok(())
    }

    pub fn transaction(&self, transaction_id: &str) -> LedgerResult<Option<Transaction>> {
        let txn = self
            .conn
            .query_row(
                &format!("SELECT {TXN_COLUMNS} FROM ledger_transaction WHERE transaction_id = ?1"),
                params![transaction_id],
                txn_from_row,
            )
            .optional()?;
        Ok(txn)
    }

    pub fn require_transaction(&self, transaction_id: &str) -> LedgerResult<Transaction> {
        not_found_as(
            self.conn.query_row(
                &format!("SELECT {TXN_COLUMNS} FROM ledger_transaction WHERE transaction_id = ?1"),
                params![transaction_id],
                txn_from_row,
            ),
            || LedgerError::TransactionNotFound { transaction_id: transaction_id.to_string() },
        )
    }

    /// Persist a status change made through `Transaction::transition`.
    /// Only the lifecycle columns move; amounts are immutable once written.
    pub fn update_transaction_status(&self, txn: &Transaction) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE ledger_transaction
             SET status = ?1, completed_at = ?2, refunded_at = ?3
             WHERE transaction_id = ?4",
            params![txn.status, txn.completed_at, txn.refunded_at, txn.transaction_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::TransactionNotFound {
                transaction_id: txn.transaction_id.clone(),
            });
        }
        Ok(())
    }

    pub fn find_by_idempotency_key(
        &self,
        user_id: &str,
        key: &str,
    ) -> LedgerResult<Option<Transaction>> {
        let txn = self
            .conn
            .query_row(
                &format!(
                    "SELECT {TXN_COLUMNS} FROM ledger_transaction
                     WHERE user_id = ?1 AND idempotency_key = ?2"
                ),
                params![user_id, key],
                txn_from_row,
            )
            .optional()?;
        Ok(txn)
    }

    /// Bonus records pointing back at `origin_id`, in the order written.
    pub fn transactions_referencing(
        &self,
        origin_id: &str,
        kind: TransactionKind,
    ) -> LedgerResult<Vec<Transaction>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM ledger_transaction
             WHERE original_transaction_id = ?1 AND kind = ?2
             ORDER BY rowid ASC"
        ))?;
        let rows = stmt
            .query_map(params![origin_id, kind], txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// A page of the user's history, newest first, and the unpaged total.
    pub fn transactions_for_user(
        &self,
        user_id: &str,
        filter: &TransactionFilter,
    ) -> LedgerResult<(Vec<Transaction>, u64)> {
        let mut clause = String::from("user_id = ?");
        let mut args: Vec<Value> = vec![Value::Text(user_id.to_string())];
        if let Some(venue_id) = &filter.venue_id {
            clause.push_str(" AND venue_id = ?");
            args.push(Value::Text(venue_id.clone()));
        }
        if let Some(kind) = filter.kind {
            clause.push_str(" AND kind = ?");
            args.push(Value::Text(kind.as_str().to_string()));
        }

        let total: i64 = self.conn.query_row(
            &format!("SELECT COUNT(*) FROM ledger_transaction WHERE {clause}"),
            params_from_iter(args.iter()),
            |row| row.get(0),
        )?;

        // LIMIT -1 is "no limit" in SQLite.
        let limit = filter.limit.map_or(-1, i64::from);
        args.push(Value::Integer(limit));
        args.push(Value::Integer(i64::from(filter.offset)));
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {TXN_COLUMNS} FROM ledger_transaction WHERE {clause}
             ORDER BY created_at DESC, rowid DESC
             LIMIT ? OFFSET ?"
        ))?;
        let rows = stmt
            .query_map(params_from_iter(args.iter()), txn_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total as u64))
    }

    pub fn transaction_count(&self, kind: TransactionKind) -> LedgerResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ledger_transaction WHERE kind = ?1",
            params![kind],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
