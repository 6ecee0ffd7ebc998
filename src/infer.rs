//! Per-cell and per-column type inference over the lattice
//! `null ⊑ bool ⊑ int64 ⊑ float64 ⊑ string` (§4.5).

use std::collections::HashSet;

/// A node in the closed type lattice. Ordering matches the lattice order
/// so `max` performs the join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogicalType {
    Null,
    Bool,
    Int64,
    Float64,
    String,
}

impl LogicalType {
    /// The lattice join of `self` and `other` (§3).
    pub fn join(self, other: LogicalType) -> LogicalType {
        self.max(other)
    }
}

/// The set of byte strings treated as NULL on read (§3).
#[derive(Debug, Clone)]
pub struct NullTokenSet {
    tokens: HashSet<String>,
}

impl Default for NullTokenSet {
    fn default() -> Self {
        NullTokenSet::new(
            ["", "NA", "N/A", "null", "NULL"]
                .iter()
                .map(|s| s.to_string()),
            true,
        )
    }
}

impl NullTokenSet {
    pub fn new(tokens: impl IntoIterator<Item = String>, empty_is_null: bool) -> Self {
        let mut tokens: HashSet<String> = tokens.into_iter().collect();
        if empty_is_null {
            tokens.insert(String::new());
        } else {
            tokens.remove("");
        }
        NullTokenSet { tokens }
    }

    pub fn is_null(&self, s: &str) -> bool {
        self.tokens.contains(s)
    }
}

/// Classifies a boolean token per the grammar in §4.5.
pub fn classify_bool(s: &str) -> Option<bool> {
    match s {
        "true" | "TRUE" | "True" => Some(true),
        "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Parses `s` as a C-locale 64-bit signed integer: `-?[0-9]+`, range
/// checked.
pub fn parse_int64(s: &str) -> Option<i64> {
    let bytes = s.as_bytes();
    if bytes.is_empty() {
        return None;
    }
    let (neg, digits) = match bytes[0] {
        b'-' => (true, &bytes[1..]),
        b'0'..=b'9' => (false, bytes),
        _ => return None,
    };
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse::<i64>().ok().map(|v| if neg && v == 0 { 0 } else { v })
}

/// Parses `s` as a finite C-locale 64-bit IEEE double.
pub fn parse_float64(s: &str) -> Option<f64> {
    if s.is_empty() {
        return None;
    }
    // Reject the inf/nan spellings Rust's FromStr otherwise accepts;
    // CSV numeric tokens are digits, sign, dot, exponent only.
    if !s
        .bytes()
        .all(|b| matches!(b, b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E'))
    {
        return None;
    }
    let v: f64 = s.parse().ok()?;
    v.is_finite().then_some(v)
}

/// Classifies a single decoded cell (§4.5 step 1-5).
pub fn classify_cell(s: &str, nulls: &NullTokenSet) -> LogicalType {
    if nulls.is_null(s) {
        LogicalType::Null
    } else if classify_bool(s).is_some() {
        LogicalType::Bool
    } else if parse_int64(s).is_some() {
        LogicalType::Int64
    } else if parse_float64(s).is_some() {
        LogicalType::Float64
    } else {
        LogicalType::String
    }
}

/// Accumulates the lattice join of sampled cells for one column.
#[derive(Debug, Clone, Copy, Default)]
pub struct TypeInferer {
    joined: Option<LogicalType>,
}

impl TypeInferer {
    pub fn new() -> Self {
        TypeInferer { joined: None }
    }

    pub fn observe(&mut self, ty: LogicalType) {
        self.joined = Some(match self.joined {
            Some(existing) => existing.join(ty),
            None => ty,
        });
    }

    /// The inferred column type. An all-null (or empty) sample infers to
    /// `Null` (§4.6: an Arrow null-typed column), which widens like any
    /// other type the moment a later cell disagrees.
    pub fn finish(self) -> LogicalType {
        self.joined.unwrap_or(LogicalType::Null)
    }
}
