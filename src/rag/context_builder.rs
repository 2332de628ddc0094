//! Formats retrieved documents into the context block of an answer prompt.

use super::store::ScoredDocument;

pub struct ContextBuilder {
    max_context_chars: usize,
}

impl ContextBuilder {
    pub fn new(max_context_chars: usize) -> Self {
        Self { max_context_chars }
    }

    /// Numbered, source-cited passages in retrieval order. Stops before the
    /// passage that would exceed the character budget; the first passage is
    /// always kept, cut to the budget if necessary.
    pub fn build(&self, documents: &[ScoredDocument]) -> String {
        let mut context = String::new();

        for (i, hit) in documents.iter().enumerate() {
            let passage = format!(
                "[{}] (Source: {})\n{}\n\n",
                i + 1,
                hit.document.source,
                hit.document.content
            );
            let used = context.chars().count();
            let len = passage.chars().count();
            if used + len > self.max_context_chars {
                if i == 0 {
                    context.extend(passage.chars().take(self.max_context_chars));
                }
                break;
            }
            context.push_str(&passage);
        }

        context.trim().to_string()
    }

    /// Distinct sources cited in a built context, sorted.
    pub fn sources(context: &str) -> Vec<String> {
        let mut sources: Vec<String> = context
            .lines()
            .filter_map(|line| {
                let rest = line.split_once("(Source: ")?.1;
                rest.strip_suffix(')').map(str::to_string)
            })
            .collect();
        sources.sort();
        sources.dedup();
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rag::store::Document;
    use chrono::Utc;
    use uuid::Uuid;

    fn hit(source: &str, content: &str) -> ScoredDocument {
        ScoredDocument {
            document: Document {
                id: Uuid::new_v4(),
                content: content.to_string(),
                source: source.to_string(),
                chunk_index: 0,
                embedding: None,
                ingested_at: Utc::now(),
            },
            score: 0.5,
        }
    }

    #[test]
    fn passages_are_numbered_with_sources() {
        let context = ContextBuilder::new(1000).build(&[
            hit("doc1.txt", "The sky is blue."),
            hit("doc2.pdf", "The ocean is deep."),
        ]);

        assert_eq!(
            context,
            "[1] (Source: doc1.txt)\nThe sky is blue.\n\n[2] (Source: doc2.pdf)\nThe ocean is deep."
        );
        assert_eq!(
            ContextBuilder::sources(&context),
            vec!["doc1.txt".to_string(), "doc2.pdf".to_string()]
        );
    }

    #[test]
    fn budget_drops_trailing_passages() {
        let context = ContextBuilder::new(40).build(&[
            hit("a.txt", "short"),
            hit("b.txt", "this passage will not fit in the budget"),
        ]);

        assert!(context.contains("short"));
        assert!(!context.contains("b.txt"));
    }

    #[test]
    fn oversized_first_passage_is_truncated_not_dropped() {
        let context = ContextBuilder::new(30).build(&[hit("a.txt", &"x".repeat(100))]);
        assert!(context.starts_with("[1] (Source: a.txt)"));
        assert!(context.chars().count() <= 30);
    }

    #[test]
    fn no_documents_give_empty_context() {
        assert!(ContextBuilder::new(100).build(&[]).is_empty());
    }
}
