//! Enrichment merge policy.
//!
//! Every write to `tracks` and `artists` goes through the same rule: a field
//! is either overwritten by the latest non-null value, or filled only while the
//! stored value is still null. A null (or empty) incoming value never replaces
//! anything. The same rule is available in memory (`fill_missing`, used by the
//! in-batch artist dedup) and as SQL assignments (`set_clause`).

/// How one column combines a stored value with an incoming one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeRule {
    /// Latest non-null value wins.
    Overwrite,
    /// First non-null value wins; later values only fill a null.
    FillMissing,
}

/// Where the incoming value lives in the generated SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Incoming {
    /// `excluded.<column>` inside `ON CONFLICT ... DO UPDATE`.
    Excluded,
    /// Named parameter `:<column>` inside a plain `UPDATE`.
    Named,
}

/// In-place `FillMissing` merge.
pub fn fill_missing<T>(stored: &mut Option<T>, incoming: Option<T>) {
    if stored.is_none() {
        *stored = incoming;
    }
}

/// SQL assignment for one column, e.g.
/// `album_name = COALESCE(tracks.album_name, excluded.album_name)`.
pub fn assignment(table: &str, column: &str, rule: MergeRule, incoming: Incoming) -> String {
    let incoming_expr = match incoming {
        Incoming::Excluded => format!("excluded.{}", column),
        Incoming::Named => format!(":{}", column),
    };
    let stored_expr = format!("{}.{}", table, column);
    match rule {
        MergeRule::Overwrite => format!("{} = COALESCE({}, {})", column, incoming_expr, stored_expr),
        MergeRule::FillMissing => {
            format!("{} = COALESCE({}, {})", column, stored_expr, incoming_expr)
        }
    }
}

/// Comma-separated assignments for every `(column, rule)` pair.
pub fn set_clause(table: &str, fields: &[(&str, MergeRule)], incoming: Incoming) -> String {
    fields
        .iter()
        .map(|(column, rule)| assignment(table, column, *rule, incoming))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Encode a list column. Empty lists are stored as NULL so they never
/// count as "already enriched".
pub fn list_value(values: &[String]) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        serde_json::to_string(values).ok()
    }
}

/// Decode a list column written by `list_value`.
pub fn parse_list(raw: Option<String>) -> Option<Vec<String>> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}
