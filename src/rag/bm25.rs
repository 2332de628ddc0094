//! Keyword retrieval over stored chunks, backed by the `bm25` crate.

use bm25::{EmbedderBuilder, Scorer, Tokenizer};
use uuid::Uuid;

const STOPWORDS: [&str; 24] = [
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "in", "is", "it", "of", "on",
    "or", "that", "the", "this", "to", "was", "what", "with", "about",
];

/// Lowercased alphanumeric words minus a small English stopword list.
#[derive(Default, Clone)]
pub struct WordTokenizer;

impl WordTokenizer {
    fn words(text: &str) -> Vec<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|word| !word.is_empty())
            .map(str::to_lowercase)
            .filter(|word| !STOPWORDS.contains(&word.as_str()))
            .collect()
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, input_text: &str) -> Vec<String> {
        Self::words(input_text)
    }
}

/// In-memory BM25 index. Rebuilt from the full corpus so the average document
/// length stays exact as documents arrive.
pub struct Bm25Index {
    embedder: bm25::Embedder<u32, WordTokenizer>,
    scorer: Scorer<Uuid, u32>,
    len: usize,
}

impl Bm25Index {
    pub fn from_corpus<'a, I>(corpus: I) -> Self
    where
        I: IntoIterator<Item = (Uuid, &'a str)>,
    {
        let docs: Vec<(Uuid, &str)> = corpus.into_iter().collect();
        let total_tokens: usize = docs
            .iter()
            .map(|(_, text)| WordTokenizer::words(text).len())
            .sum();
        let avgdl = if docs.is_empty() {
            1.0
        } else {
            (total_tokens as f32 / docs.len() as f32).max(1.0)
        };

        let embedder = EmbedderBuilder::<u32, WordTokenizer>::with_avgdl(avgdl).build();
        let mut scorer = Scorer::<Uuid, u32>::new();
        for (id, text) in &docs {
            scorer.upsert(id, embedder.embed(text));
        }

        Self {
            embedder,
            scorer,
            len: docs.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Best `top_k` matches, highest score first. Documents sharing no term
    /// with the query are not returned.
    pub fn search(&self, query: &str, top_k: usize) -> Vec<(Uuid, f32)> {
        if self.is_empty() {
            return Vec::new();
        }
        let query_embedding = self.embedder.embed(query);
        self.scorer
            .matches(&query_embedding)
            .into_iter()
            .filter(|scored| scored.score > 0.0)
            .take(top_k)
            .map(|scored| (scored.id, scored.score))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizer_drops_stopwords_and_punctuation() {
        assert_eq!(
            WordTokenizer.tokenize("What is the Rust borrow-checker?"),
            vec!["rust", "borrow", "checker"]
        );
    }

    #[test]
    fn search_ranks_keyword_matches_first() {
        let rust = Uuid::new_v4();
        let cooking = Uuid::new_v4();
        let mixed = Uuid::new_v4();
        let index = Bm25Index::from_corpus(vec![
            (rust, "Rust ownership and borrowing rules keep memory safe."),
            (cooking, "Simmer the tomato sauce for twenty minutes."),
            (mixed, "Ownership of the kitchen rota rotates weekly."),
        ]);

        let results = index.search("rust borrowing", 5);

        assert_eq!(results.first().map(|(id, _)| *id), Some(rust));
        assert!(results.iter().all(|(id, _)| *id != cooking));
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = Bm25Index::from_corpus(Vec::<(Uuid, &str)>::new());
        assert!(index.is_empty());
        assert!(index.search("anything", 3).is_empty());
    }

    #[test]
    fn top_k_limits_results() {
        let docs: Vec<(Uuid, String)> = (0..6)
            .map(|i| (Uuid::new_v4(), format!("report number {}", i)))
            .collect();
        let index = Bm25Index::from_corpus(docs.iter().map(|(id, text)| (*id, text.as_str())));

        assert_eq!(index.search("report", 2).len(), 2);
    }
}
