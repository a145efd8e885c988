use crate::db::search::SearchResult;

const PREAMBLE: &str = "You are a helpful assistant answering questions about a PDF document. \
Answer the question using only the context below. \
If the context does not contain the answer, say that you don't know instead of guessing. \
Cite the page numbers of the sources you used, for example (Page 3).";

const SEPARATOR: &str = "\n\n";

/// A prompt ready to send, plus how many results made it into the context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledPrompt {
    pub prompt: String,
    /// Number of leading results included.
    pub used: usize,
}

fn source_block(result: &SearchResult) -> String {
    format!("[Source: Page {}]\n{}", result.page_number, result.text)
}

/// Lay out the retrieved chunks as a tagged context block followed by the question.
///
/// Results keep their retrieval order. When the context would exceed
/// `max_context_chars` characters, the lowest-ranked results are left out;
/// a chunk is never cut.
pub fn build_prompt(
    query: &str,
    results: &[SearchResult],
    max_context_chars: usize,
) -> AssembledPrompt {
    let mut blocks: Vec<String> = Vec::with_capacity(results.len());
    let mut context_chars = 0;

    for result in results {
        let block = source_block(result);
        let separator = if blocks.is_empty() { 0 } else { SEPARATOR.len() };
        let added = separator + block.chars().count();
        if context_chars + added > max_context_chars {
            break;
        }
        context_chars += added;
        blocks.push(block);
    }

    let used = blocks.len();
    let prompt = format!(
        "{PREAMBLE}\n\nContext:\n{}\n\nQuestion: {query}\n\nAnswer:",
        blocks.join(SEPARATOR)
    );
    AssembledPrompt { prompt, used }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(page: u32, text: &str) -> SearchResult {
        SearchResult {
            chunk_id: i64::from(page),
            text: text.to_string(),
            page_number: page,
            chunk_index: 0,
            similarity_score: 0.9,
            distance: 0.1,
        }
    }

    #[test]
    fn test_blocks_in_order_with_page_tags() {
        let results = [
            result(7, "Refunds are accepted within 30 days."),
            result(2, "Contact support to start a return."),
        ];
        let assembled = build_prompt("How do refunds work?", &results, 10_000);

        assert_eq!(assembled.used, 2);
        let p = &assembled.prompt;
        let first = p.find("[Source: Page 7]\nRefunds are accepted").unwrap();
        let second = p.find("[Source: Page 2]\nContact support").unwrap();
        assert!(first < second);
        assert!(p.contains("Refunds are accepted within 30 days.\n\n[Source: Page 2]"));
        assert!(p.contains("Question: How do refunds work?"));
        assert!(p.trim_end().ends_with("Answer:"));
        assert!(p.starts_with(PREAMBLE));
    }

    #[test]
    fn test_drops_lowest_ranked_to_fit() {
        let long = "x".repeat(400);
        let results = [result(1, &long), result(2, &long), result(3, &long)];
        // Each block is 17 + 400 chars; two blocks plus separator are 836.
        let assembled = build_prompt("q", &results, 900);

        assert_eq!(assembled.used, 2);
        assert!(assembled.prompt.contains("[Source: Page 1]"));
        assert!(assembled.prompt.contains("[Source: Page 2]"));
        assert!(!assembled.prompt.contains("[Source: Page 3]"));
        // Included chunks are whole.
        assert_eq!(assembled.prompt.matches(&long).count(), 2);
    }

    #[test]
    fn test_nothing_fits() {
        let results = [result(1, &"y".repeat(200))];
        let assembled = build_prompt("q", &results, 50);
        assert_eq!(assembled.used, 0);
        assert!(!assembled.prompt.contains("[Source:"));
    }

    #[test]
    fn test_question_is_literal() {
        let question = "What about {braces} and \"quotes\"?";
        let assembled = build_prompt(question, &[result(1, "ctx")], 1000);
        assert!(assembled.prompt.contains(question));
    }
}
