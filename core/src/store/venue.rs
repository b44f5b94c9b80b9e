use super::{
    decimal_at, hundredths_at, not_found_as, opt_decimal_at, opt_decimal_text, to_hundredths,
    Ledger,
};
use crate::{
    error::{LedgerError, LedgerResult},
    types::{Money, Points},
    venue::Venue,
};
use rusqlite::{params, OptionalExtension, Row};

const VENUE_COLUMNS: &str = "venue_id, name, is_active, food_margin, beverage_margin, default_margin,
     points_multiplier, total_revenue, total_points_issued";

fn venue_from_row(row: &Row<'_>) -> rusqlite::Result<Venue> {
    Ok(Venue {
        venue_id:            row.get(0)?,
        name:                row.get(1)?,
        is_active:           row.get::<_, i64>(2)? != 0,
        food_margin:         opt_decimal_at(row, 3)?,
        beverage_margin:     opt_decimal_at(row, 4)?,
        default_margin:      opt_decimal_at(row, 5)?,
        points_multiplier:   decimal_at(row, 6)?,
        total_revenue:       hundredths_at(row, 7)?,
        total_points_issued: hundredths_at(row, 8)?,
    })
}

impl Ledger<'_> {
    pub fn insert_venue(&self, venue: &Venue) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO venue (
                venue_id, name, is_active, food_margin, beverage_margin, default_margin,
                points_multiplier, total_revenue, total_points_issued
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                venue.venue_id,
                venue.name,
                if venue.is_active { 1i64 } else { 0i64 },
                opt_decimal_text(venue.food_margin),
                opt_decimal_text(venue.beverage_margin),
                opt_decimal_text(venue.default_margin),
                venue.points_multiplier.normalize().to_string(),
                to_hundredths(venue.total_revenue)?,
                to_hundredths(venue.total_points_issued)?,
            ],
        )?;
        Ok(())
    }

    pub fn venue(&self, venue_id: &str) -> LedgerResult<Option<Venue>> {
        let venue = self
            .conn
            .query_row(
                &format!("SELECT {VENUE_COLUMNS} FROM venue WHERE venue_id = ?1"),
                params![venue_id],
                venue_from_row,
            )
            .optional()?;
        Ok(venue)
    }

    pub fn require_venue(&self, venue_id: &str) -> LedgerResult<Venue> {
        not_found_as(
            self.conn.query_row(
                &format!("SELECT {VENUE_COLUMNS} FROM venue WHERE venue_id = ?1"),
                params![venue_id],
                venue_from_row,
            ),
            || LedgerError::VenueNotFound { venue_id: venue_id.to_string() },
        )
    }

    /// Persist owner-managed configuration. Aggregates are left alone; they only
    /// move through `add_venue_stats`.
    pub fn save_venue(&self, venue: &Venue) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE venue
             SET name = ?1, is_active = ?2, food_margin = ?3, beverage_margin = ?4,
                 default_margin = ?5, points_multiplier = ?6
             WHERE venue_id = ?7",
            params![
                venue.name,
                if venue.is_active { 1i64 } else { 0i64 },
                opt_decimal_text(venue.food_margin),
                opt_decimal_text(venue.beverage_margin),
                opt_decimal_text(venue.default_margin),
                venue.points_multiplier.normalize().to_string(),
                venue.venue_id,
            ],
        )?;
        if updated == 0 {
            return Err(LedgerError::VenueNotFound { venue_id: venue.venue_id.clone() });
        }
        Ok(())
    }

    /// Bump (or, with negative deltas, roll back) revenue and points issued.
    pub fn add_venue_stats(
        &self,
        venue_id: &str,
        revenue: Money,
        points: Points,
    ) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE venue
             SET total_revenue = total_revenue + ?1,
                 total_points_issued = total_points_issued + ?2
             WHERE venue_id = ?3",
            params![to_hundredths(revenue)?, to_hundredths(points)?, venue_id],
        )?;
        if updated == 0 {
            return Err(LedgerError::VenueNotFound { venue_id: venue_id.to_string() });
        }
        Ok(())
    }

    pub fn venues(&self) -> LedgerResult<Vec<Venue>> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {VENUE_COLUMNS} FROM venue ORDER BY venue_id"))?;
        let venues = stmt
            .query_map([], venue_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(venues)
    }
}
