#[derive(Clone, Debug, PartialEq, Eq)]
pub enum QueryDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String },
}

/// Keywords that can change data or connection state in SQLite.
pub const BLOCKED_KEYWORDS: &[&str] = &[
    "insert", "update", "delete", "drop", "alter", "create", "replace", "truncate", "attach",
    "pragma",
];

/// Gate in front of the read-only query passthrough. Keywords are matched
/// as whole words so column names like `created_at` stay usable. String
/// literals, quoted identifiers and comments are masked first, so neither a
/// `;` nor a keyword inside them counts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryGuard {
    pub allow_multiple_statements: bool,
}

impl QueryGuard {
    pub fn evaluate(&self, sql: &str) -> QueryDecision {
        let masked = mask_quoted(sql);
        let statement = masked.trim().trim_end_matches(';').trim();
        if statement.is_empty() {
            return QueryDecision::Deny {
                reason_code: "empty_query",
                user_message: "The query is empty. Provide a single SELECT statement.".to_string(),
            };
        }

        if !self.allow_multiple_statements && statement.contains(';') {
            return QueryDecision::Deny {
                reason_code: "multiple_statements",
                user_message: "Only one statement can be run at a time.".to_string(),
            };
        }

        let lowered = statement.to_ascii_lowercase();
        let words: Vec<&str> = lowered
            .split(|ch: char| !(ch.is_ascii_alphanumeric() || ch == '_'))
            .filter(|word| !word.is_empty())
            .collect();

        if let Some(keyword) = words.iter().find(|word| BLOCKED_KEYWORDS.contains(*word)) {
            return QueryDecision::Deny {
                reason_code: "mutation_keyword",
                user_message: format!(
                    "You are not allowed to modify existing data (found `{keyword}`). \
                     Only read queries are permitted; time entries are created with bookTimeEntry."
                ),
            };
        }

        match words.first().copied() {
            Some("select") | Some("with") => QueryDecision::Allow,
            _ => QueryDecision::Deny {
                reason_code: "not_a_select",
                user_message: "Only SELECT queries are permitted.".to_string(),
            },
        }
    }
}

/// Replaces quoted spans and comments with spaces. A doubled quote inside a
/// span is an escaped quote. An unterminated span runs to the end.
fn mask_quoted(sql: &str) -> String {
    let mut masked = String::with_capacity(sql.len());
    let mut chars = sql.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\'' | '"' | '`' => {
                masked.push(' ');
                while let Some(inner) = chars.next() {
                    masked.push(' ');
                    if inner == ch {
                        if chars.peek() == Some(&ch) {
                            chars.next();
                            masked.push(' ');
                        } else {
                            break;
                        }
                    }
                }
            }
            '-' if chars.peek() == Some(&'-') => {
                for inner in chars.by_ref() {
                    if inner == '\n' {
                        masked.push('\n');
                        break;
                    }
                    masked.push(' ');
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                masked.push_str("  ");
                let mut previous = ' ';
                for inner in chars.by_ref() {
                    masked.push(' ');
                    if previous == '*' && inner == '/' {
                        break;
                    }
                    previous = inner;
                }
            }
            other => masked.push(other),
        }
    }

    masked
}
