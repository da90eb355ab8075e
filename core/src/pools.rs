// Mining pool identification from coinbase text.

pub const UNKNOWN_POOL: &str = "unknown";

/// Signature substring (lowercase) and the pool name it resolves to.
/// Earlier entries win when a coinbase carries several signatures.
pub const KNOWN_POOLS: &[(&str, &str)] = &[
    ("foundry", "Foundry USA"),
    ("viabtc", "ViaBTC"),
    ("antpool", "AntPool"),
    ("f2pool", "F2Pool"),
    ("binance", "Binance Pool"),
    ("luxor", "Luxor"),
];

/// Pools whose motive is read from fee conditions rather than defaulted.
/// Matched against the whole lowercased pool name, so "Foundry USA" and
/// "Binance Pool" are not major.
pub const MAJOR_POOLS: &[&str] = &["antpool", "foundry", "binance", "f2pool"];

/// Coinbase bytes as text with invalid UTF-8 sequences dropped.
pub fn coinbase_text(script: &[u8]) -> String {
    String::from_utf8_lossy(script)
        .chars()
        .filter(|c| *c != char::REPLACEMENT_CHARACTER)
        .collect()
}

pub fn resolve_pool(coinbase_script: &[u8]) -> Option<&'static str> {
    let text = coinbase_text(coinbase_script).to_lowercase();
    KNOWN_POOLS
        .iter()
        .find(|(signature, _)| text.contains(signature))
        .map(|(_, name)| *name)
}

/// Keeps a known hint, otherwise tries the coinbase again.
pub fn refine_pool_hint(pool_hint: &str, coinbase_script: &[u8]) -> String {
    if pool_hint.is_empty() || pool_hint == UNKNOWN_POOL {
        return resolve_pool(coinbase_script)
            .unwrap_or(UNKNOWN_POOL)
            .to_string();
    }
    pool_hint.to_string()
}

pub fn is_major_pool(pool: &str) -> bool {
    let pool = pool.to_lowercase();
    MAJOR_POOLS.contains(&pool.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_pool_case_insensitive() {
        assert_eq!(resolve_pool(b"\x03\x10\x27\x0c/FOUNDRY USA Pool/"), Some("Foundry USA"));
        assert_eq!(resolve_pool(b"Mined by AntPool"), Some("AntPool"));
        assert_eq!(resolve_pool(b"/ViaBTC/Mined by x/"), Some("ViaBTC"));
        assert_eq!(resolve_pool(b"\xff\xfe binance/"), Some("Binance Pool"));
        assert_eq!(resolve_pool(b"random miner"), None);
        assert_eq!(resolve_pool(b""), None);
    }

    #[test]
    fn test_coinbase_text_drops_invalid_utf8() {
        assert_eq!(coinbase_text(b"\xffpool\xfe"), "pool");
    }

    #[test]
    fn test_refine_pool_hint() {
        assert_eq!(refine_pool_hint("unknown", b"/luxor/"), "Luxor");
        assert_eq!(refine_pool_hint("", b"nothing"), "unknown");
        assert_eq!(refine_pool_hint("ViaBTC", b"/luxor/"), "ViaBTC");
    }

    #[test]
    fn test_major_pools() {
        assert!(is_major_pool("AntPool"));
        assert!(is_major_pool("F2POOL"));
        assert!(is_major_pool("foundry"));
        assert!(!is_major_pool("Foundry USA"));
        assert!(!is_major_pool("Binance Pool"));
        assert!(!is_major_pool("ViaBTC"));
        assert!(!is_major_pool("unknown"));
    }
}
