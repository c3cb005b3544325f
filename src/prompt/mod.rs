
use crate::retrieval::Example;

/// Everything needed to render the SQL-generation prompt. Assembled per
/// question, never retained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptContext {
    pub dialect: String,
    pub top_k: u32,
    pub table_schema: String,
    pub examples: Vec<Example>,
    pub question: String,
}

/// Pure assembly; identical inputs produce an identical context and
/// therefore identical prompt text.
#[inline]
pub fn build(
    question: &str,
    dialect: &str,
    top_k: u32,
    table_schema: &str,
    examples: Vec<Example>,
) -> PromptContext {
    PromptContext {
        dialect: dialect.to_string(),
        top_k,
        table_schema: table_schema.to_string(),
        examples,
        question: question.to_string(),
    }
}

impl PromptContext {
    /// System prompt: role, dialect, row-limit policy, safety rules, table
    /// info, and the retrieved examples. The safety policy here is
    /// instruction-only; the mechanical SELECT guard lives at the
    /// execution boundary.
    #[inline]
    pub fn render_system(&self) -> String {
        let mut prompt = format!(
            "You are an agent designed to interact with a SQL database.\n\
             Given an input question, create a syntactically correct {dialect} query to run.\n\
             Return ONLY the SQL query, the response should start with SELECT.\n\
             Unless otherwise specified, do not return more than {top_k} rows.\n\n\
             Here is the relevant table info:\n{schema}\n\n\
             You can order the results by a relevant column to return the most interesting examples in the database.\n\
             Never query for all the columns from a specific table, only ask for the relevant columns given the question.\n\
             You MUST double check your query before returning it. If you get an error while executing a query, rewrite the query and try again.\n\n\
             DO NOT make or run any DML statements (INSERT, UPDATE, DELETE, DROP etc.) to the database.\n\n\
             DO NOT use LIMIT for any queries relating to data visualisation such as a bar graph, line graph or table.\n\n\
             Here are some examples of user inputs and their corresponding SQL queries:",
            dialect = self.dialect,
            top_k = self.top_k,
            schema = self.table_schema,
        );

        for example in &self.examples {
            prompt.push_str("\n\nUser input: ");
            prompt.push_str(&example.question);
            prompt.push_str("\nSQL query: ");
            prompt.push_str(&example.sql);
        }

        prompt
    }

    /// User message completing the few-shot pattern.
    #[inline]
    pub fn render_user(&self) -> String {
        format!("User input: {}\nSQL query: ", self.question)
    }
}
