pub const ENGINE_SCHEMA_SQL: &str = include_str!("../../sql/engine_schema.sql");

pub const SCHEMA_VERSION: &str = "1";

/// Splits a script on top-level `;`, ignoring separators inside quotes.
/// Line comments are dropped from each statement.
pub fn split_sql_statements(sql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;

    for ch in sql.chars() {
        match ch {
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            ';' if !in_single_quote && !in_double_quote => {
                push_statement(&mut statements, &current);
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    push_statement(&mut statements, &current);

    statements
}

fn push_statement(statements: &mut Vec<String>, raw: &str) {
    let stmt = raw
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");
    let stmt = stmt.trim();
    if !stmt.is_empty() {
        statements.push(stmt.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_top_level_semicolons_only() {
        let sql = "-- header\nCREATE TABLE \"a;b\" (x TEXT);\nINSERT INTO t VALUES ('x;y');\n\n";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0], "CREATE TABLE \"a;b\" (x TEXT)");
        assert_eq!(statements[1], "INSERT INTO t VALUES ('x;y')");
    }

    #[test]
    fn bundled_schema_has_every_table() {
        let statements = split_sql_statements(ENGINE_SCHEMA_SQL);
        for table in ["_db_metadata", "performance_profiles", "review_items"] {
            assert!(
                statements.iter().any(|s| s.contains(&format!("\"{table}\""))),
                "missing {table}"
            );
        }
        assert!(statements.iter().all(|s| !s.starts_with("--")));
    }
}
