//! System prompt for the query agent.

use crate::models::DatabaseType;

const SYSTEM_PROMPT_TEMPLATE: &str = "You are an agent designed to interact with a SQL database.
Given an input question, create a syntactically correct {dialect} query to run, then look at the results of the query and return the answer.
Do not provide results in any dialect other then {dialect} and do not provide advice on how to make the statements work on other dialects.
Make sure to fully qualify any tables in your query that do not use the default schema ({default_schema}).
Unless the user specifies a specific number of examples they wish to obtain, always limit your query to at most {top_k} results using the {limit_clause} clause.
You can order the results by a relevant column to return the most interesting examples in the database.
Never query for all the columns from a specific table, only ask for a the few relevant columns given the question.
You have access to tools for interacting with the database.
Only use the below tools. Only use the information returned by the below tools to construct your final answer.
You MUST double check your query before executing it. If you get an error while executing a query, rewrite the query and try again.

DO NOT make any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.

If there is an answer please INCLUDE THE ANSWER DATA and PROVIDE THE SQL QUERY that was generated to gather the result in your response.

If the question does not seem related to the database, just return \"I don't know\" as the answer.";

/// Fill the system prompt for `dialect`.
pub fn system_prompt(dialect: DatabaseType, top_k: u32) -> String {
    let (default_schema, limit_clause) = match dialect {
        DatabaseType::MsSql => ("typically dbo", "TOP"),
        DatabaseType::SQLite => ("main", "LIMIT"),
    };

    SYSTEM_PROMPT_TEMPLATE
        .replace("{dialect}", dialect.dialect_name())
        .replace("{default_schema}", default_schema)
        .replace("{top_k}", &top_k.to_string())
        .replace("{limit_clause}", limit_clause)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mssql_prompt() {
        let prompt = system_prompt(DatabaseType::MsSql, 10);
        assert!(prompt.contains("syntactically correct mssql query"));
        assert!(prompt.contains("at most 10 results using the TOP clause"));
        assert!(prompt.contains("default schema (typically dbo)"));
        assert!(prompt.ends_with("just return \"I don't know\" as the answer."));
        assert!(!prompt.contains('{'));
    }

    #[test]
    fn test_sqlite_prompt_uses_limit() {
        let prompt = system_prompt(DatabaseType::SQLite, 5);
        assert!(prompt.contains("at most 5 results using the LIMIT clause"));
    }
}
