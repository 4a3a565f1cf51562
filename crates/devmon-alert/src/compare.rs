use std::str::FromStr;

/// Comparison operator stored as the second params field of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparator {
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    LessEqual,
    Less,
}

impl FromStr for Comparator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            ">" => Ok(Self::Greater),
            ">=" => Ok(Self::GreaterEqual),
            "=" => Ok(Self::Equal),
            "!=" => Ok(Self::NotEqual),
            "<=" => Ok(Self::LessEqual),
            "<" => Ok(Self::Less),
            _ => Err(format!("unknown compare operator: {s}")),
        }
    }
}

impl std::fmt::Display for Comparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::Greater => ">",
            Self::GreaterEqual => ">=",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::LessEqual => "<=",
            Self::Less => "<",
        })
    }
}

impl Comparator {
    /// Numeric "when" codes used by rule editors: `0..=5` map to
    /// `>`, `>=`, `=`, `!=`, `<=`, `<`.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Greater),
            1 => Some(Self::GreaterEqual),
            2 => Some(Self::Equal),
            3 => Some(Self::NotEqual),
            4 => Some(Self::LessEqual),
            5 => Some(Self::Less),
            _ => None,
        }
    }

    /// Whether a value that is `equal` to / `less` than the threshold breaches.
    pub fn fires(&self, equal: bool, less: bool) -> bool {
        let above = !less && !equal;
        match self {
            Self::Greater => above,
            Self::GreaterEqual => above || equal,
            Self::Equal => equal,
            Self::NotEqual => !equal,
            Self::LessEqual => less || equal,
            Self::Less => less,
        }
    }
}

/// Applies a textual operator. Unknown operators never fire.
pub fn apply_rule(op: &str, equal: bool, less: bool) -> bool {
    op.parse::<Comparator>()
        .map(|c| c.fires(equal, less))
        .unwrap_or(false)
}
