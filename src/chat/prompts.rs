//! Prompt assembly for retrieval-augmented answers.

/// Renders the grounding prompt: retrieved context first, then the query,
/// with an instruction to answer from the context alone.
pub fn context_prompt(context: &str, query: &str) -> String {
    format!(
        "context information is below.\n\
         ---------------------\n\
         {context}\n\
         ---------------------\n\
         \n\
         Given the context information and not prior knowledge, \
         answer the following query, only use the relevant context information.\n\
         ---------------------\n\
         {query}\n\
         ---------------------\n"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_contains_context_before_query() {
        let prompt = context_prompt("first passage\n\nsecond passage", "how do I reset?");

        let ctx_pos = prompt.find("first passage").unwrap();
        let query_pos = prompt.find("how do I reset?").unwrap();
        assert!(ctx_pos < query_pos);
        assert!(prompt.contains("not prior knowledge"));
    }
}
