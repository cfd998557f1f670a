//! Universe files: the list of identifiers a fetch run covers.
//!
//! Two layouts are accepted. A plain list holds one ticker per line. A CSV
//! file must carry a `Ticker` header column; other columns are ignored.
//! Blank lines and lines starting with `#` are skipped in both.

use std::collections::HashSet;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{CoreError, Symbol, ValidationError};

const TICKER_COLUMN: &str = "Ticker";

/// Listing venue of a screener listing. Provider symbols for Canadian
/// venues carry a suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Exchange {
    Tsx,
    TsxVenture,
    Nasdaq,
    Nyse,
}

impl Exchange {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Tsx => "tsx",
            Self::TsxVenture => "tsxv",
            Self::Nasdaq => "nasdaq",
            Self::Nyse => "nyse",
        }
    }

    pub const fn suffix(self) -> &'static str {
        match self {
            Self::Tsx => ".TO",
            Self::TsxVenture => ".V",
            Self::Nasdaq | Self::Nyse => "",
        }
    }

    /// Converts a listing-site ticker (`BRK.B`) to provider form (`BRK-B`),
    /// adding the venue suffix.
    pub fn provider_symbol(self, listing: &str) -> Result<Symbol, ValidationError> {
        let converted = format!("{}{}", listing.trim().replace('.', "-"), self.suffix());
        Symbol::parse(&converted)
    }
}

impl Display for Exchange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Exchange {
    type Err = ValidationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tsx" => Ok(Self::Tsx),
            "tsxv" | "tsx-venture" | "tsx_venture" => Ok(Self::TsxVenture),
            "nasdaq" => Ok(Self::Nasdaq),
            "nyse" => Ok(Self::Nyse),
            _ => Err(ValidationError::InvalidExchange {
                value: value.to_owned(),
            }),
        }
    }
}

/// A universe entry that could not become a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectedEntry {
    pub raw: String,
    pub reason: String,
}

/// Parsed universe.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniverseLoad {
    /// Distinct symbols in first-seen order.
    pub symbols: Vec<Symbol>,
    pub rejected: Vec<RejectedEntry>,
}

/// Reads and parses a universe file.
///
/// # Errors
///
/// Fails when the file cannot be read, or when a CSV file has no `Ticker`
/// column. Individual bad entries are reported in
/// [`UniverseLoad::rejected`] instead.
pub fn load_universe(path: &Path, exchange: Option<Exchange>) -> Result<UniverseLoad, CoreError> {
    let text = std::fs::read_to_string(path)?;
    parse_universe(&text, exchange)
}

pub fn parse_universe(text: &str, exchange: Option<Exchange>) -> Result<UniverseLoad, CoreError> {
    let first = text
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('#'));

    let entries = match first {
        None => Vec::new(),
        Some(line) if line.contains(',') || line.eq_ignore_ascii_case(TICKER_COLUMN) => {
            csv_entries(text)?
        }
        Some(_) => text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(str::to_owned)
            .collect(),
    };

    let mut load = UniverseLoad::default();
    let mut seen = HashSet::new();
    for raw in entries {
        let parsed = match exchange {
            Some(exchange) => exchange.provider_symbol(&raw),
            None => Symbol::parse(&raw),
        };
        match parsed {
            Ok(symbol) => {
                if seen.insert(symbol.clone()) {
                    load.symbols.push(symbol);
                }
            }
            Err(error) => load.rejected.push(RejectedEntry {
                raw,
                reason: error.to_string(),
            }),
        }
    }
    Ok(load)
}

fn csv_entries(text: &str) -> Result<Vec<String>, CoreError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let column = reader
        .headers()?
        .iter()
        .position(|header| header.eq_ignore_ascii_case(TICKER_COLUMN))
        .ok_or(CoreError::MissingColumn {
            column: TICKER_COLUMN,
        })?;

    let mut entries = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(value) = record.get(column).filter(|value| !value.is_empty()) {
            entries.push(value.to_owned());
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn symbols(load: &UniverseLoad) -> Vec<&str> {
        load.symbols.iter().map(Symbol::as_str).collect()
    }

    #[test]
    fn plain_list_skips_comments_and_duplicates() {
        let load = parse_universe("# watchlist\nAAPL\n\nmsft\nAAPL\n", None).expect("parses");

        assert_eq!(symbols(&load), vec!["AAPL", "MSFT"]);
        assert!(load.rejected.is_empty());
    }

    #[test]
    fn csv_uses_ticker_column_and_exchange_suffix() {
        let text = "Name,Ticker,Price\nShopify,SHOP,100\nBrookfield,BN.A,50\nBlank,,1\n";

        let load = parse_universe(text, Some(Exchange::Tsx)).expect("parses");

        assert_eq!(symbols(&load), vec!["SHOP.TO", "BN-A.TO"]);
    }

    #[test]
    fn csv_without_ticker_column_fails() {
        let error = parse_universe("Name,Price\nShopify,100\n", None).expect_err("no ticker");
        assert!(matches!(error, CoreError::MissingColumn { column: "Ticker" }));
    }

    #[test]
    fn invalid_entries_are_rejected_not_fatal() {
        let load = parse_universe("AAPL\n$$$\n", None).expect("parses");

        assert_eq!(symbols(&load), vec!["AAPL"]);
        assert_eq!(load.rejected.len(), 1);
        assert_eq!(load.rejected[0].raw, "$$$");
    }

    #[test]
    fn empty_universe_is_not_an_error() {
        let load = parse_universe("\n# nothing yet\n", None).expect("parses");
        assert!(load.symbols.is_empty());
    }

    #[test]
    fn exchange_names_parse() {
        assert_eq!("TSXV".parse::<Exchange>(), Ok(Exchange::TsxVenture));
        assert_eq!(Exchange::Nasdaq.suffix(), "");
        assert!("lse".parse::<Exchange>().is_err());
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("universe.txt");
        std::fs::write(&path, "RY\nTD\n").expect("write universe");

        let load = load_universe(&path, Some(Exchange::Tsx)).expect("loads");
        assert_eq!(symbols(&load), vec!["RY.TO", "TD.TO"]);
    }
}
