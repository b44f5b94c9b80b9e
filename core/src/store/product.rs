use super::{decimal_at, hundredths_at, to_hundredths, Ledger};
use crate::{
    error::{LedgerError, LedgerResult},
    product::{Product, ProductBonus},
};
use rusqlite::{params, OptionalExtension, Row};

const PRODUCT_COLUMNS: &str = "product_id, venue_id, name, category, price, is_available,
     bonus_active, bonus_multiplier, bonus_start, bonus_end, bonus_reason";

fn product_from_row(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        product_id:   row.get(0)?,
        venue_id:     row.get(1)?,
        name:         row.get(2)?,
        category:     row.get(3)?,
        price:        hundredths_at(row, 4)?,
        is_available: row.get::<_, i64>(5)? != 0,
        bonus: ProductBonus {
            active:     row.get::<_, i64>(6)? != 0,
            multiplier: decimal_at(row, 7)?,
            start_date: row.get(8)?,
            end_date:   row.get(9)?,
            reason:     row.get(10)?,
        },
    })
}

impl Ledger<'_> {
    pub fn insert_product(&self, product: &Product) -> LedgerResult<()> {
        self.conn.execute(
            "INSERT INTO product (
                product_id, venue_id, name, category, price, is_available,
                bonus_active, bonus_multiplier, bonus_start, bonus_end, bonus_reason
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                product.product_id,
                product.venue_id,
                product.name,
                product.category,
                to_hundredths(product.price)?,
                if product.is_available { 1i64 } else { 0i64 },
                if product.bonus.active { 1i64 } else { 0i64 },
                product.bonus.multiplier.normalize().to_string(),
                product.bonus.start_date,
                product.bonus.end_date,
                product.bonus.reason,
            ],
        )?;
        Ok(())
    }

    pub fn product(&self, product_id: &str) -> LedgerResult<Option<Product>> {
        let product = self
            .conn
            .query_row(
                &format!("SELECT {PRODUCT_COLUMNS} FROM product WHERE product_id = ?1"),
                params![product_id],
                product_from_row,
            )
            .optional()?;
        Ok(product)
    }

    /// The product, provided it is sold at `venue_id`.
    pub fn product_at_venue(&self, venue_id: &str, product_id: &str) -> LedgerResult<Product> {
        match self.product(product_id)? {
            Some(p) if p.venue_id == venue_id => Ok(p),
            _ => Err(LedgerError::ProductNotFound {
                venue_id: venue_id.to_string(),
                product_id: product_id.to_string(),
            }),
        }
    }

    pub fn save_product(&self, product: &Product) -> LedgerResult<()> {
        let updated = self.conn.execute(
            "UPDATE product
             SET name = ?1, category = ?2, price = ?3, is_available = ?4,
                 bonus_active = ?5, bonus_multiplier = ?6, bonus_start = ?7,
                 bonus_end = ?8, bonus_reason = ?9
             WHERE product_id = ?10",
            params![
                product.name,
                product.category,
                to_hundredths(product.price)?,
                if product.is_available { 1i64 } else { 0i64 },
                if product.bonus.active { 1i64 } else { 0i64 },
                product.bonus.multiplier.normalize().to_string(),
                product.bonus.start_date,
                product.bonus.end_date,
                product.bonus.reason,
                product.product_id,
            ],
        )?;
        if updated == 0 {
            return Err(LedgerError::ProductNotFound {
                venue_id: product.venue_id.clone(),
                product_id: product.product_id.clone(),
            });
        }
        Ok(())
    }

    pub fn products_for_venue(&self, venue_id: &str) -> LedgerResult<Vec<Product>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM product WHERE venue_id = ?1 ORDER BY name"
        ))?;
        let products = stmt
            .query_map(params![venue_id], product_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(products)
    }
}
