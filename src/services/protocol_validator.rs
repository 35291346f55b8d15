use std::collections::BTreeMap;

use regex::Regex;
use serde::Serialize;

pub const DEFAULT_PROTOCOLS: [&str; 6] = [
    "Aave V3",
    "Lido",
    "EigenLayer",
    "Ethena",
    "Pendle Finance",
    "Uniswap V4",
];

/// Extra spellings for well-known protocol families, keyed by a fragment of the canonical name
const ALIASES: &[(&str, &[&str])] = &[
    ("aave", &["aave v3", "aave v2", "aave-v3", "aave-v2"]),
    ("uniswap", &["uniswap v3", "uniswap v4", "uni", "univ3", "univ4"]),
    ("compound", &["comp", "compound v3"]),
    ("makerdao", &["maker", "dai", "mkr"]),
    ("yearn", &["yearn finance", "yfv"]),
    ("curve", &["curve finance", "crv"]),
    ("lido", &["steth", "wsteth"]),
    ("rocket pool", &["rocketpool", "rpl", "reth"]),
    ("convex", &["cvx"]),
    ("frax", &["frax finance", "fxs"]),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProtocolInfo {
    pub supported: bool,
    pub normalized_name: Option<String>,
    pub original_input: String,
    pub suggestions: Vec<String>,
}

/// Matches free-form protocol names against the supported list
pub struct ProtocolValidator {
    supported: Vec<String>,
    mapping: BTreeMap<String, String>,
}

impl Default for ProtocolValidator {
    fn default() -> Self {
        Self::new(DEFAULT_PROTOCOLS.iter().map(|p| p.to_string()).collect())
    }
}

impl ProtocolValidator {
    pub fn new(supported: Vec<String>) -> Self {
        let suffixes = Regex::new(r" (v[234]|finance|protocol)\b").ok();
        let mut mapping = BTreeMap::new();

        for protocol in &supported {
            let name_lower = protocol.trim().to_lowercase();
            mapping.insert(name_lower.clone(), protocol.clone());

            let base = match &suffixes {
                Some(re) => re.replace_all(&name_lower, "").to_string(),
                None => name_lower.clone(),
            };
            let mut variations = vec![
                base.clone(),
                base.replace(' ', ""),
                base.replace(' ', "-"),
                name_lower.replace(' ', ""),
                name_lower.replace(' ', "-"),
            ];
            for (fragment, aliases) in ALIASES {
                if name_lower.contains(fragment) {
                    variations.extend(aliases.iter().map(|a| a.to_string()));
                }
            }
            for variation in variations {
                mapping.entry(variation).or_insert_with(|| protocol.clone());
            }
        }

        Self { supported, mapping }
    }

    pub fn supported_protocols(&self) -> &[String] {
        &self.supported
    }

    pub fn is_supported(&self, name: &str) -> bool {
        self.normalize_name(name).is_some()
    }

    /// Canonical name for `name`: exact match, then alias table, then partial match
    pub fn normalize_name(&self, name: &str) -> Option<String> {
        let clean = name.trim();
        if clean.is_empty() {
            return None;
        }
        if let Some(exact) = self.supported.iter().find(|p| p.as_str() == clean) {
            return Some(exact.clone());
        }

        let key = clean.to_lowercase();
        if let Some(mapped) = self.mapping.get(&key) {
            return Some(mapped.clone());
        }

        self.supported
            .iter()
            .find(|p| {
                let lower = p.to_lowercase();
                lower.contains(&key) || key.contains(&lower)
            })
            .cloned()
    }

    pub fn protocol_info(&self, name: &str) -> ProtocolInfo {
        match self.normalize_name(name) {
            Some(normalized) => ProtocolInfo {
                supported: true,
                normalized_name: Some(normalized),
                original_input: name.to_string(),
                suggestions: Vec::new(),
            },
            None => ProtocolInfo {
                supported: false,
                normalized_name: None,
                original_input: name.to_string(),
                suggestions: self.suggestions(name, 3),
            },
        }
    }

    pub fn suggestions(&self, name: &str, limit: usize) -> Vec<String> {
        let input = name.trim().to_lowercase();
        if input.is_empty() {
            return Vec::new();
        }
        self.supported
            .iter()
            .filter(|p| {
                let lower = p.to_lowercase();
                input.contains(&lower) || lower.contains(&input) || shares_trigram(&input, &lower)
            })
            .take(limit)
            .cloned()
            .collect()
    }
}

fn shares_trigram(a: &str, b: &str) -> bool {
    let chars: Vec<char> = a.chars().collect();
    if chars.len() < 3 || b.chars().count() < 3 {
        return false;
    }
    chars.windows(3).any(|window| {
        let trigram: String = window.iter().collect();
        b.contains(&trigram)
    })
}
