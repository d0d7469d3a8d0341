//! Disguised company names shown to players instead of the real ticker.

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashSet;

const MAX_ATTEMPTS: usize = 100;

const SECTOR_PREFIXES: &[(&str, &[&str])] = &[
    ("Technology", &["Tech", "Digital", "Cyber", "Cloud", "Data", "Logic", "Sync", "Net"]),
    ("Healthcare", &["Med", "Health", "Bio", "Pharma", "Care", "Vital", "Life", "Cure"]),
    ("Consumer Discretionary", &["Retail", "Consumer", "Lifestyle", "Brand", "Choice", "Style"]),
    ("Financials", &["Capital", "Finance", "Asset", "Trust", "Wealth", "Fund", "Equity"]),
    ("Energy", &["Power", "Energy", "Fuel", "Resource", "Solar", "Grid", "Volt"]),
    ("Industrials", &["Industrial", "Manufacturing", "Engineering", "Build", "Steel", "Forge"]),
    ("Materials", &["Material", "Chemical", "Mining", "Alloy", "Mineral", "Element"]),
    ("Utilities", &["Utility", "Grid", "Service", "Power", "Supply", "Electric"]),
    ("Real Estate", &["Property", "Realty", "Estate", "Land", "Space", "Tower"]),
    ("Communication Services", &["Media", "Telecom", "Network", "Stream", "Connect", "Signal"]),
    ("Consumer Staples", &["Staple", "Essential", "Daily", "Basic", "Home", "Fresh"]),
];

const DEFAULT_PREFIXES: &[&str] = &["Company", "Business", "Enterprise"];

const SUFFIXES: &[&str] = &[
    "Alpha", "Beta", "Delta", "Gamma", "Omega", "Prime", "Core", "One", "X", "Plus", "Pro",
    "Max", "Global", "United", "First", "Pacific", "Atlantic", "Apex", "Nova",
];

const GENERIC: &[&str] = &[
    "Corp", "Co", "Inc", "Group", "Holdings", "Enterprises", "Industries", "Solutions",
];

pub trait NameGenerator: Send + Sync {
    /// Returns a name not contained in `used`.
    fn generate(&self, sector: Option<&str>, used: &HashSet<String>) -> String;
}

/// Combines a sector-flavoured prefix with a suffix and a corporate noun.
pub struct SectorNameGenerator {
    rng: Mutex<StdRng>,
}

impl Default for SectorNameGenerator {
    fn default() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }
}

impl SectorNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn prefixes(sector: Option<&str>) -> &'static [&'static str] {
        sector
            .and_then(|s| {
                SECTOR_PREFIXES
                    .iter()
                    .find(|(name, _)| *name == s)
                    .map(|(_, p)| *p)
            })
            .unwrap_or(DEFAULT_PREFIXES)
    }

    fn candidate(rng: &mut StdRng, prefixes: &[&str]) -> String {
        let prefix = prefixes.choose(rng).copied().unwrap_or("Company");
        let suffix = SUFFIXES.choose(rng).copied().unwrap_or("One");
        let generic = GENERIC.choose(rng).copied().unwrap_or("Corp");

        match rng.gen_range(0..6) {
            0 => format!("{prefix} {suffix}"),
            1 => format!("{prefix} {suffix} {generic}"),
            2 => format!("The {prefix} {generic}"),
            3 => format!("{suffix} {prefix}"),
            4 => format!("{prefix}{suffix}"),
            _ => format!("{suffix} {generic}"),
        }
    }
}

impl NameGenerator for SectorNameGenerator {
    fn generate(&self, sector: Option<&str>, used: &HashSet<String>) -> String {
        let prefixes = Self::prefixes(sector);
        let mut rng = self.rng.lock();

        for _ in 0..MAX_ATTEMPTS {
            let name = Self::candidate(&mut rng, prefixes);
            if !used.contains(&name) {
                return name;
            }
        }

        loop {
            let tag = uuid::Uuid::new_v4().simple().to_string();
            let name = format!("Company {}", tag[..4].to_ascii_uppercase());
            if !used.contains(&name) {
                return name;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_unique_against_used_set() {
        let generator = SectorNameGenerator::seeded(7);
        let mut used = HashSet::new();
        for _ in 0..200 {
            let name = generator.generate(Some("Technology"), &used);
            assert!(!name.is_empty());
            assert!(used.insert(name));
        }
    }

    #[test]
    fn unknown_sector_uses_default_prefixes() {
        assert_eq!(SectorNameGenerator::prefixes(Some("Crypto")), DEFAULT_PREFIXES);
        assert_eq!(SectorNameGenerator::prefixes(None), DEFAULT_PREFIXES);
        assert_eq!(SectorNameGenerator::prefixes(Some("Energy"))[0], "Power");
    }

    #[test]
    fn falls_back_to_tagged_name_when_space_is_exhausted() {
        let generator = SectorNameGenerator::seeded(1);
        let mut used = HashSet::new();
        let prefixes = DEFAULT_PREFIXES;
        for p in prefixes {
            for s in SUFFIXES {
                for g in GENERIC {
                    used.insert(format!("{p} {s}"));
                    used.insert(format!("{p} {s} {g}"));
                    used.insert(format!("The {p} {g}"));
                    used.insert(format!("{s} {p}"));
                    used.insert(format!("{p}{s}"));
                    used.insert(format!("{s} {g}"));
                }
            }
        }
        let name = generator.generate(None, &used);
        assert!(name.starts_with("Company "), "{name}");
        assert_eq!(name.len(), "Company ".len() + 4);
    }

    #[test]
    fn same_seed_same_sequence() {
        let a = SectorNameGenerator::seeded(42);
        let b = SectorNameGenerator::seeded(42);
        let used = HashSet::new();
        assert_eq!(a.generate(Some("Energy"), &used), b.generate(Some("Energy"), &used));
    }
}
