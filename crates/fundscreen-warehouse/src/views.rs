//! Read-side views over the screen tables.

use ::duckdb::Connection;

/// `v_screen` pairs every metrics row with its highlight labels; rows that
/// were never classified carry NULL labels.
pub fn create_views(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r"
CREATE OR REPLACE VIEW v_screen AS
SELECT
    m.*,
    h.symbol AS highlight_symbol,
    h.sector AS highlight_sector,
    h.* EXCLUDE (symbol, sector)
FROM metrics m
LEFT JOIN highlights h ON h.symbol = m.symbol;
",
    )?;

    Ok(())
}
