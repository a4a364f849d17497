//! Table naming convention
//!
//! Models without an explicit table name get `prefix + snake_case(NAME)`.
//! Names stay singular: `UserAccount` maps to `user_account`.

/// Derives physical table names from model names
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamingStrategy {
    /// Prepended verbatim to every derived name
    pub table_prefix: String,
}

impl NamingStrategy {
    pub fn new(table_prefix: impl Into<String>) -> Self {
        Self {
            table_prefix: table_prefix.into(),
        }
    }

    /// Table name for a model named `model_name`
    pub fn table_name(&self, model_name: &str) -> String {
        format!("{}{}", self.table_prefix, snake_case(model_name))
    }
}

/// Convert a CamelCase identifier to snake_case
///
/// Runs of capitals are treated as one word, so `HTTPServer` becomes
/// `http_server` and `UserID` becomes `user_id`.
pub fn snake_case(name: &str) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut out = String::with_capacity(name.len() + 4);

    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let starts_word = match prev {
                None => false,
                Some(p) if p == '_' => false,
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                Some(_) => false,
            };
            if starts_word {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }

    out
}
