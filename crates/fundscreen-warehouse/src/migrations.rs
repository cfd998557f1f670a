use ::duckdb::Connection;

struct Migration {
    version: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: "0001_screen_tables",
        sql: r#"
CREATE TABLE IF NOT EXISTS metrics (
    symbol TEXT NOT NULL,
    sector TEXT,
    industry TEXT,
    market_cap DOUBLE,
    pe_ratio DOUBLE,
    forward_pe DOUBLE,
    ps_ratio DOUBLE,
    pb_ratio DOUBLE,
    dividend_yield DOUBLE,
    current_ratio DOUBLE,
    debt_to_equity DOUBLE,
    revenue_growth_4y DOUBLE,
    eps_growth_4y DOUBLE,
    forward_eps_growth DOUBLE,
    eps DOUBLE,
    peg_ratio DOUBLE,
    roe DOUBLE,
    roa DOUBLE,
    roic DOUBLE,
    profit_margin DOUBLE,
    gross_margin DOUBLE,
    fcf_yield DOUBLE,
    fcf_ev DOUBLE,
    ev_to_ebitda DOUBLE,
    recent_52_week_high BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE IF NOT EXISTS highlights (
    symbol TEXT NOT NULL,
    sector TEXT NOT NULL,
    market_cap_highlight TEXT NOT NULL,
    pe_ratio_highlight TEXT NOT NULL,
    forward_pe_highlight TEXT NOT NULL,
    ps_ratio_highlight TEXT NOT NULL,
    pb_ratio_highlight TEXT NOT NULL,
    dividend_yield_highlight TEXT NOT NULL,
    current_ratio_highlight TEXT NOT NULL,
    debt_to_equity_highlight TEXT NOT NULL,
    revenue_growth_4y_highlight TEXT NOT NULL,
    eps_growth_4y_highlight TEXT NOT NULL,
    forward_eps_growth_highlight TEXT NOT NULL,
    eps_highlight TEXT NOT NULL,
    peg_ratio_highlight TEXT NOT NULL,
    roe_highlight TEXT NOT NULL,
    roa_highlight TEXT NOT NULL,
    roic_highlight TEXT NOT NULL,
    profit_margin_highlight TEXT NOT NULL,
    gross_margin_highlight TEXT NOT NULL,
    fcf_yield_highlight TEXT NOT NULL,
    fcf_ev_highlight TEXT NOT NULL,
    ev_to_ebitda_highlight TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS sector_baselines (
    sector TEXT NOT NULL,
    field TEXT NOT NULL,
    value DOUBLE
);

CREATE TABLE IF NOT EXISTS run_log (
    run_id TEXT PRIMARY KEY,
    provider TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT NOT NULL,
    requested BIGINT NOT NULL,
    produced BIGINT NOT NULL,
    skipped BIGINT NOT NULL,
    not_started BIGINT NOT NULL,
    cancelled BOOLEAN NOT NULL
);
"#,
    },
    Migration {
        version: "0002_indexes",
        sql: r#"
CREATE INDEX IF NOT EXISTS idx_metrics_symbol ON metrics(symbol);
CREATE INDEX IF NOT EXISTS idx_highlights_symbol ON highlights(symbol);
CREATE INDEX IF NOT EXISTS idx_metrics_sector ON metrics(sector);
CREATE INDEX IF NOT EXISTS idx_metrics_industry ON metrics(industry);
CREATE INDEX IF NOT EXISTS idx_run_log_started_at ON run_log(started_at);
"#,
    },
];

/// Applies every migration not yet recorded in `schema_migrations`.
pub fn apply_migrations(connection: &Connection) -> Result<(), ::duckdb::Error> {
    connection.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS schema_migrations (
    version TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
"#,
    )?;

    for migration in MIGRATIONS {
        let applied: i64 = connection.query_row(
            "SELECT COUNT(*) FROM schema_migrations WHERE version = ?",
            [migration.version],
            |row| row.get(0),
        )?;
        if applied > 0 {
            continue;
        }

        connection.execute_batch(migration.sql)?;
        connection.execute(
            "INSERT INTO schema_migrations (version) VALUES (?)",
            [migration.version],
        )?;
        tracing::debug!(version = migration.version, "applied warehouse migration");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrations_apply_once() {
        let connection = Connection::open_in_memory().expect("in-memory db");

        apply_migrations(&connection).expect("first pass");
        apply_migrations(&connection).expect("second pass");

        let applied: i64 = connection
            .query_row("SELECT COUNT(*) FROM schema_migrations", [], |row| row.get(0))
            .expect("count");
        assert_eq!(applied, MIGRATIONS.len() as i64);
    }
}
