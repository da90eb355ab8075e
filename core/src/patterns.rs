use serde::{Deserialize, Serialize};

const ART_CHARS: &str = "!@#$%^&*()_+-=[]{}|;:,.<>?";
const VERSION_MARKERS: [&str; 3] = ["/segwit", "/taproot", "/bip"];
const POOL_MESSAGE_MARKERS: [&str; 4] = ["mempool", "block", "hash", "pool"];
const HEX_DENSITY_THRESHOLD: f64 = 0.6;

/// Which coinbase text heuristics fired.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScriptPatterns {
    pub has_pattern: bool,
    pub ascii_art: bool,
    pub version_signaling: bool,
    pub pool_message: bool,
    pub technical_data: bool,
}

impl ScriptPatterns {
    /// Runs every heuristic over decoded coinbase text.
    pub fn analyze(text: &str) -> Self {
        let lower = text.to_lowercase();

        let ascii_art = ART_CHARS.chars().any(|c| {
            let run: String = std::iter::repeat(c).take(3).collect();
            text.contains(&run)
        });
        let version_signaling = VERSION_MARKERS.iter().any(|m| lower.contains(m));
        let pool_message = POOL_MESSAGE_MARKERS.iter().any(|m| lower.contains(m));
        let technical_data = hex_density(text) > HEX_DENSITY_THRESHOLD;

        ScriptPatterns {
            has_pattern: ascii_art || version_signaling || pool_message || technical_data,
            ascii_art,
            version_signaling,
            pool_message,
            technical_data,
        }
    }
}

/// Share of characters that are hex digits; 0 for empty text.
fn hex_density(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    let hex = text.chars().filter(char::is_ascii_hexdigit).count();
    hex as f64 / total as f64
}
