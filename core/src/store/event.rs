use super::Ledger;
use crate::{
    error::LedgerResult,
    event::{EventLogEntry, LedgerEvent},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<EventLogEntry> {
    Ok(EventLogEntry {
        id:             Some(row.get(0)?),
        transaction_id: row.get(1)?,
        event_type:     row.get(2)?,
        payload:        row.get(3)?,
        created_at:     row.get(4)?,
    })
}

impl Ledger<'_> {
    pub fn append_event(&self, entry: &EventLogEntry) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO event_log (transaction_id, event_type, payload, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![entry.transaction_id, entry.event_type, entry.payload, entry.created_at],
        )?;
        Ok(())
    }

    pub fn append_events(&self, events: &[LedgerEvent], now: DateTime<Utc>) -> LedgerResult<()> {
        for event in events {
            self.append_event(&EventLogEntry::new(event, now)?)?;
        }
        Ok(())
    }

    pub fn events_for_transaction(&self, transaction_id: &str) -> LedgerResult<Vec<EventLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, transaction_id, event_type, payload, created_at
             FROM event_log WHERE transaction_id = ?1
             ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![transaction_id], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn event_count(&self, event_type: &str) -> LedgerResult<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM event_log WHERE event_type = ?1",
            params![event_type],
            |row| row.get(0),
        )?;
        Ok(n as u64)
    }
}
