//! Viewer identity and the pluggable rule-check contract.
//!
//! The effective point of view for a render is one of: anonymous, a concrete
//! character, or the all-seeing loremaster. Which identities count as
//! loremasters is decided by configuration at the edge (see
//! [`Viewer::resolve`]), never inside the render core.

use std::collections::BTreeMap;

/// The effective identity a page is rendered for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Viewer {
    Anonymous,
    /// A specific character, by its stable identity string.
    Character(String),
    /// Omniscient game-master view; knows every secret.
    Loremaster,
}

impl Viewer {
    /// Map a raw identity string to a viewer, honoring the configured
    /// loremaster id list.
    pub fn resolve(id: &str, loremaster_ids: &[String]) -> Viewer {
        if loremaster_ids.iter().any(|l| l == id) {
            Viewer::Loremaster
        } else {
            Viewer::Character(id.to_string())
        }
    }

    #[inline]
    pub fn is_loremaster(&self) -> bool {
        matches!(self, Viewer::Loremaster)
    }

    /// The storable identity key for this viewer, if it has one.
    ///
    /// Anonymous and loremaster short-circuit secret membership tests and are
    /// never written into a knower set.
    pub fn identity(&self) -> Option<&str> {
        match self {
            Viewer::Character(id) => Some(id),
            Viewer::Anonymous | Viewer::Loremaster => None,
        }
    }
}

/// A character's stat sheet, as handed over by the identity provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CharacterStats(pub BTreeMap<String, i64>);

impl CharacterStats {
    pub fn get(&self, name: &str) -> Option<i64> {
        self.0.get(name).copied()
    }
}

/// An explicit on-demand reveal attempt for one secret.
#[derive(Debug, Clone)]
pub struct RevealRequest {
    pub codename: String,
    pub stats: CharacterStats,
}

/// Game-system plugin contract: decide whether a conditions string passes
/// against a character's stat sheet.
pub trait RuleCheck {
    fn check(&self, conditions: &str, stats: &CharacterStats) -> bool;
}

/// Grants every reveal attempt. Used when a wiki runs without a game system.
pub struct AlwaysPass;

impl RuleCheck for AlwaysPass {
    fn check(&self, _conditions: &str, _stats: &CharacterStats) -> bool {
        true
    }
}

/// Stat-threshold rule system.
///
/// Conditions look like `lore>=14` or `perception>11`; several clauses may be
/// joined with `&&`, all of which must pass. An empty conditions string
/// passes. Anything unparsable fails closed.
pub struct ThresholdCheck;

impl RuleCheck for ThresholdCheck {
    fn check(&self, conditions: &str, stats: &CharacterStats) -> bool {
        let conditions = conditions.trim();
        if conditions.is_empty() {
            return true;
        }
        conditions
            .split("&&")
            .all(|clause| check_clause(clause.trim(), stats))
    }
}

fn check_clause(clause: &str, stats: &CharacterStats) -> bool {
    // ordering matters: ">=" must be tried before ">".
    for (op, cmp) in [
        (">=", i64::ge as fn(&i64, &i64) -> bool),
        ("<=", i64::le),
        (">", i64::gt),
        ("<", i64::lt),
        ("=", i64::eq),
    ] {
        if let Some((name, value)) = clause.split_once(op) {
            let Ok(threshold) = value.trim().parse::<i64>() else {
                return false;
            };
            let Some(actual) = stats.get(name.trim()) else {
                return false;
            };
            return cmp(&actual, &threshold);
        }
    }
    false
}

/// Look up the rule system named in configuration.
pub fn rule_check_for(name: &str) -> Box<dyn RuleCheck> {
    match name {
        "threshold" => Box::new(ThresholdCheck),
        _ => Box::new(AlwaysPass),
    }
}
