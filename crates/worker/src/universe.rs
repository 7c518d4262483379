use anyhow::Context;
use lens_core::refresh::Universe;
use std::path::{Path, PathBuf};

const DEFAULT_SYMBOL_SUFFIX: &str = ".NS";

// NIFTY 100 constituents.
const NIFTY_100: &[&str] = &[
    "ABB", "ADANIENSOL", "ADANIENT", "ADANIGREEN", "ADANIPORTS", "ADANIPOWER",
    "AMBUJACEM", "APOLLOHOSP", "ASIANPAINT", "AXISBANK", "BAJAJ-AUTO", "BAJAJFINSV",
    "BAJAJHFL", "BAJAJHLDNG", "BAJFINANCE", "BANKBARODA", "BEL", "BHARTIARTL",
    "BOSCHLTD", "BPCL", "BRITANNIA", "CANBK", "CGPOWER", "CHOLAFIN", "CIPLA", "COALINDIA",
    "DABUR", "DIVISLAB", "DLF", "DMART", "DRREDDY", "EICHERMOT", "GAIL", "GODREJCP",
    "GRASIM", "HAL", "HAVELLS", "HCLTECH", "HDFCBANK", "HDFCLIFE", "HEROMOTOCO", "HINDALCO",
    "HINDUNILVR", "HYUNDAI", "ICICIBANK", "ICICIGI", "ICICIPRULI", "INDHOTEL", "INDIGO",
    "INDUSINDBK", "INFY", "IOC", "IRFC", "ITC", "JINDALSTEL", "JIOFIN", "JSWENERGY",
    "JSWSTEEL", "KOTAKBANK", "LICI", "LODHA", "LT", "LTIM", "M&M", "MARUTI", "MOTHERSON",
    "NAUKRI", "NESTLEIND", "NTPC", "ONGC", "PFC", "PIDILITIND", "PNB", "POWERGRID", "RECLTD",
    "RELIANCE", "SBILIFE", "SBIN", "SHREECEM", "SHRIRAMFIN", "SIEMENS", "SUNPHARMA",
    "SWIGGY", "TATACONSUM", "TATAMOTORS", "TATAPOWER", "TATASTEEL", "TCS", "TECHM", "TITAN",
    "TORNTPHARM", "TRENT", "TVSMOTOR", "ULTRACEMCO", "UNITDSPR", "VBL", "VEDL", "WIPRO",
    "ETERNAL", "ZYDUSLIFE",
];

#[derive(Debug, Clone, Default)]
pub struct UniverseOptions {
    /// Comma-separated override (`UNIVERSE_SYMBOLS`). Takes precedence over the file.
    pub symbols: Option<String>,

    /// One symbol per line, `#` starts a comment (`UNIVERSE_FILE`).
    pub file: Option<PathBuf>,

    pub symbol_suffix: Option<String>,
}

impl UniverseOptions {
    pub fn from_env() -> Self {
        Self {
            symbols: std::env::var("UNIVERSE_SYMBOLS").ok().filter(|s| !s.trim().is_empty()),
            file: std::env::var("UNIVERSE_FILE").ok().map(PathBuf::from),
            symbol_suffix: std::env::var("UNIVERSE_SYMBOL_SUFFIX").ok(),
        }
    }

    pub fn build(&self) -> anyhow::Result<Universe> {
        let suffix = self
            .symbol_suffix
            .as_deref()
            .unwrap_or(DEFAULT_SYMBOL_SUFFIX);

        if let Some(list) = self.symbols.as_deref() {
            return Universe::new(list.split(','), suffix).context("invalid UNIVERSE_SYMBOLS");
        }

        if let Some(path) = self.file.as_deref() {
            let symbols = read_symbol_file(path)?;
            return Universe::new(symbols, suffix)
                .with_context(|| format!("invalid UNIVERSE_FILE {}", path.display()));
        }

        Universe::new(NIFTY_100.iter().copied(), suffix)
    }
}

fn read_symbol_file(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read universe file {}", path.display()))?;
    Ok(parse_symbol_lines(&text))
}

fn parse_symbol_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| line.split('#').next().unwrap_or_default().trim())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_nifty_100() {
        let u = UniverseOptions::default().build().unwrap();
        assert_eq!(u.len(), 100);
        assert_eq!(u.provider_symbol("RELIANCE"), "RELIANCE.NS");
        assert!(u.symbols().iter().any(|s| s == "M&M"));
    }

    #[test]
    fn env_list_overrides_default() {
        let opts = UniverseOptions {
            symbols: Some("infy, tcs,,ITC".to_string()),
            file: Some(PathBuf::from("/does/not/exist")),
            symbol_suffix: Some(".BO".to_string()),
        };
        let u = opts.build().unwrap();
        assert_eq!(u.symbols(), ["INFY", "TCS", "ITC"]);
        assert_eq!(u.provider_symbol("INFY"), "INFY.BO");
    }

    #[test]
    fn missing_file_is_an_error() {
        let opts = UniverseOptions {
            file: Some(PathBuf::from("/does/not/exist/universe.txt")),
            ..Default::default()
        };
        assert!(opts.build().is_err());
    }

    #[test]
    fn parses_symbol_file_with_comments() {
        let text = "# banks\nHDFCBANK\nSBIN  # state-owned\n\n  ICICIBANK\n";
        assert_eq!(parse_symbol_lines(text), vec!["HDFCBANK", "SBIN", "ICICIBANK"]);
    }
}
