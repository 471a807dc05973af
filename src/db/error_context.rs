//! Rich error context for MySQL/MariaDB errors raised while running update statements.

use sqlx::mysql::MySqlDatabaseError;

/// Error context extracted from a MySQL server error
#[derive(Debug, Clone)]
pub struct SqlErrorContext {
    /// The primary error message
    pub message: String,
    /// Line within the statement, when the server reports one ("... at line 3")
    pub line_number: Option<usize>,
    /// Server error number (e.g. 1146 for a missing table)
    pub number: Option<u16>,
    /// SQLSTATE code (e.g. "42S02")
    pub code: Option<String>,
}

impl SqlErrorContext {
    /// Extract error context from a sqlx error
    pub fn from_sqlx_error(error: &sqlx::Error) -> Self {
        if let Some(db_error) = error.as_database_error()
            && let Some(mysql_error) = db_error.try_downcast_ref::<MySqlDatabaseError>()
        {
            let message = mysql_error.message().to_string();
            return Self {
                line_number: reported_line(&message),
                number: Some(mysql_error.number()),
                code: mysql_error.code().map(|c| c.to_string()),
                message,
            };
        }

        // Fallback for connection and protocol errors
        Self {
            message: error.to_string(),
            line_number: None,
            number: None,
            code: None,
        }
    }

    /// Format the error together with the statement that raised it
    pub fn format(&self, statement: &str) -> String {
        let mut msg = String::from("SQL error");

        if let Some(number) = self.number {
            msg.push_str(&format!(" {}", number));
            if let Some(code) = &self.code {
                msg.push_str(&format!(" ({})", code));
            }
        }
        if let Some(line) = self.line_number {
            msg.push_str(&format!(" at line {}", line));
        }
        msg.push_str(&format!(": {}", self.message));

        match self.line_number {
            Some(line) if statement.lines().count() > 1 => {
                msg.push_str(&format!("\n\n{}", format_line_context(statement, line)));
            }
            _ => msg.push_str(&format!("\n  Statement: {}", statement.trim())),
        }

        msg
    }
}

/// MySQL appends "at line N" to syntax errors
fn reported_line(message: &str) -> Option<usize> {
    let (_, tail) = message.rsplit_once(" at line ")?;
    tail.trim().parse().ok()
}

/// Format SQL content showing context around the error line
pub fn format_line_context(content: &str, error_line: usize) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let total_lines = lines.len();
    const CONTEXT_LINES: usize = 3;

    let error_idx = error_line.saturating_sub(1).min(total_lines.saturating_sub(1));
    let start_idx = error_idx.saturating_sub(CONTEXT_LINES);
    let end_idx = (error_idx + CONTEXT_LINES + 1).min(total_lines);

    let mut result = String::new();

    if start_idx > 0 {
        result.push_str(&format!("  ... [{} lines above]\n", start_idx));
    }

    for (idx, line) in lines[start_idx..end_idx].iter().enumerate() {
        let line_num = start_idx + idx + 1;
        let marker = if line_num == error_line { ">" } else { " " };
        result.push_str(&format!("  {} {:4} | {}\n", marker, line_num, line));
    }

    if end_idx < total_lines {
        result.push_str(&format!("  ... [{} lines below]", total_lines - end_idx));
    }

    result
}
