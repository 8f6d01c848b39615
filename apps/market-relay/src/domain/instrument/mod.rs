//! Instruments and Symbol Tables
//!
//! An instrument is a (product, base) currency pair named by logical currency
//! names (`bitcoin`, `ethereum`, ...). Each exchange spells currencies with its
//! own wire symbols, resolved through a per-exchange override table that falls
//! back to the global table.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::Serialize;

// =============================================================================
// Currency
// =============================================================================

/// Logical currency name, stored trimmed and lowercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    /// Create a currency from its logical name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    /// Logical name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Currency {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

// =============================================================================
// Instrument
// =============================================================================

/// A product quoted in a base currency.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Instrument {
    /// Traded currency.
    pub product: Currency,
    /// Quote currency.
    pub base: Currency,
}

impl Instrument {
    /// Create a new instrument.
    #[must_use]
    pub const fn new(product: Currency, base: Currency) -> Self {
        Self { product, base }
    }

    /// A pair of a currency with itself carries no price.
    #[must_use]
    pub fn is_self_pair(&self) -> bool {
        self.product == self.base
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.product, self.base)
    }
}

// =============================================================================
// Symbol Table
// =============================================================================

/// Map from logical currency to wire symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolTable {
    entries: HashMap<Currency, String>,
}

static GLOBAL_SYMBOLS: LazyLock<SymbolTable> = LazyLock::new(|| {
    SymbolTable::new()
        .with("bitcoin", "BTC")
        .with("ethereum", "ETH")
        .with("tether", "USDT")
        .with("litecoin", "LTC")
        .with("ripple", "XRP")
        .with("bitcoin-cash", "BCH")
        .with("binance-coin", "BNB")
        .with("eos", "EOS")
        .with("cardano", "ADA")
        .with("stellar", "XLM")
        .with("tron", "TRX")
        .with("monero", "XMR")
        .with("dash", "DASH")
        .with("zcash", "ZEC")
});

impl SymbolTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Table shared by all exchanges when they have no override.
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL_SYMBOLS
    }

    /// Add an entry, returning the table.
    #[must_use]
    pub fn with(mut self, currency: &str, symbol: &str) -> Self {
        self.entries
            .insert(Currency::new(currency), symbol.trim().to_string());
        self
    }

    /// Look up the wire symbol for a currency.
    #[must_use]
    pub fn get(&self, currency: &Currency) -> Option<&str> {
        self.entries.get(currency).map(String::as_str)
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` over `self`; entries in `other` win.
    #[must_use]
    pub fn overlay(mut self, other: &Self) -> Self {
        for (currency, symbol) in &other.entries {
            self.entries.insert(currency.clone(), symbol.clone());
        }
        self
    }

    /// Parse `currency=SYMBOL` pairs separated by commas.
    ///
    /// # Errors
    ///
    /// Returns `SymbolTableError::MalformedEntry` for an entry without `=` or
    /// with an empty side.
    pub fn parse(spec: &str) -> Result<Self, SymbolTableError> {
        let mut table = Self::new();
        for entry in spec.split(',').map(str::trim).filter(|e| !e.is_empty()) {
            let (currency, symbol) = entry
                .split_once('=')
                .ok_or_else(|| SymbolTableError::MalformedEntry(entry.to_string()))?;
            if currency.trim().is_empty() || symbol.trim().is_empty() {
                return Err(SymbolTableError::MalformedEntry(entry.to_string()));
            }
            table = table.with(currency, symbol);
        }
        Ok(table)
    }
}

/// Resolves wire symbols through an exchange table, then a fallback table.
#[derive(Debug, Clone, Copy)]
pub struct SymbolResolver<'a> {
    overrides: &'a SymbolTable,
    fallback: &'a SymbolTable,
}

impl<'a> SymbolResolver<'a> {
    /// Resolver over an exchange's overrides and the global table.
    #[must_use]
    pub fn new(overrides: &'a SymbolTable) -> Self {
        Self {
            overrides,
            fallback: SymbolTable::global(),
        }
    }

    /// Resolver with an explicit fallback table.
    #[must_use]
    pub const fn with_fallback(overrides: &'a SymbolTable, fallback: &'a SymbolTable) -> Self {
        Self {
            overrides,
            fallback,
        }
    }

    /// Wire symbol for a currency, if either table knows it.
    #[must_use]
    pub fn resolve(&self, currency: &Currency) -> Option<&'a str> {
        self.overrides
            .get(currency)
            .or_else(|| self.fallback.get(currency))
    }
}

/// Symbol table parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolTableError {
    /// Entry is not of the form `currency=SYMBOL`.
    #[error("malformed symbol entry: {0:?}")]
    MalformedEntry(String),
}
