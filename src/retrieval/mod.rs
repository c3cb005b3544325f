
use tracing::debug;

use crate::Result;
use crate::embeddings::EmbeddingClient;

/// One question/SQL pair from the few-shot corpus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Example {
    pub question: String,
    pub sql: String,
}

impl Example {
    #[inline]
    pub fn new(question: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            sql: sql.into(),
        }
    }
}

#[derive(Debug, Clone)]
struct EmbeddedExample {
    example: Example,
    embedding: Vec<f32>,
}

/// In-memory nearest-neighbor index over the example corpus. Built once at
/// startup, read-only afterward; the corpus is small enough that a linear
/// scan beats any index structure.
#[derive(Debug, Clone)]
pub struct ExampleStore {
    examples: Vec<EmbeddedExample>,
}

impl ExampleStore {
    /// Embed every corpus question. Fails if the embedding backend is
    /// unreachable.
    #[inline]
    pub fn load(client: &EmbeddingClient, examples: Vec<Example>) -> Result<Self> {
        let questions: Vec<String> = examples.iter().map(|e| e.question.clone()).collect();
        let embeddings = client.embed_batch(&questions)?;

        let examples = examples
            .into_iter()
            .zip(embeddings)
            .map(|(example, embedding)| EmbeddedExample { example, embedding })
            .collect::<Vec<_>>();

        debug!("Example store loaded with {} entries", examples.len());
        Ok(Self { examples })
    }

    /// The `k` most similar examples to `question`, nearest first. Ties
    /// keep corpus order. Returns fewer than `k` when the corpus is
    /// smaller.
    #[inline]
    pub fn retrieve(
        &self,
        client: &EmbeddingClient,
        question: &str,
        k: usize,
    ) -> Result<Vec<Example>> {
        if self.examples.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = client.embed(question)?;
        Ok(self.rank(&query_embedding, k))
    }

    /// Ranking against a precomputed query embedding.
    #[inline]
    pub fn rank(&self, query_embedding: &[f32], k: usize) -> Vec<Example> {
        let mut scored: Vec<(f32, &Example)> = self
            .examples
            .iter()
            .map(|e| (cosine_similarity(query_embedding, &e.embedding), &e.example))
            .collect();

        // Stable sort keeps corpus order among equal scores.
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored
            .into_iter()
            .take(k)
            .map(|(_, example)| example.clone())
            .collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.examples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.examples.is_empty()
    }
}

/// Cosine similarity between two embeddings.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        0.0
    } else {
        dot_product / (magnitude_a * magnitude_b)
    }
}

/// The built-in question/SQL corpus for the exercise log.
#[inline]
pub fn default_corpus() -> Vec<Example> {
    vec![
        Example::new("List all exercise entries.", "SELECT * FROM physio_table;"),
        Example::new(
            "Find all exercise entries on '2024-05-02'.",
            "SELECT * FROM physio_table WHERE DATE(Datetime) = '2024-05-02';",
        ),
        Example::new(
            "List all entries where the exercise count is more than 50.",
            "SELECT * FROM physio_table WHERE Count > 50;",
        ),
        Example::new(
            "Find the total number of exercises performed on '2024-05-01'.",
            "SELECT SUM(Count) FROM physio_table WHERE DATE(Datetime) = '2024-05-01';",
        ),
        Example::new(
            "List all exercise entries where the type is 'Squat'.",
            "SELECT * FROM physio_table WHERE Physio_Type = 'Squat';",
        ),
        Example::new(
            "How many exercise entries are there in total?",
            "SELECT COUNT(*) FROM physio_table;",
        ),
        Example::new(
            "Find the entry with the highest number of exercises recorded.",
            "SELECT * FROM physio_table ORDER BY Count DESC LIMIT 1;",
        ),
        Example::new(
            "List all exercise entries from March 2024.",
            "SELECT * FROM physio_table WHERE strftime('%Y-%m', Datetime) = '2024-03';",
        ),
        Example::new(
            "Find the average number of exercises performed across all entries.",
            "SELECT AVG(Count) FROM physio_table;",
        ),
        Example::new(
            "How many unique exercise types are recorded?",
            "SELECT COUNT(DISTINCT Physio_Type) FROM physio_table;",
        ),
        Example::new(
            "Find the earliest recorded exercise entry.",
            "SELECT * FROM physio_table ORDER BY Datetime ASC LIMIT 1;",
        ),
        Example::new(
            "List all exercise entries on '2024-03-05' where more than 40 reps were performed.",
            "SELECT * FROM physio_table WHERE DATE(Datetime) = '2024-03-05' AND Count > 40;",
        ),
        Example::new(
            "How many times did I do push-ups in 2024?",
            "SELECT COUNT(*) FROM physio_table WHERE Physio_Type = 'Push Up' AND strftime('%Y', Datetime) = '2024';",
        ),
        Example::new(
            "Can you create a bar chart of the total exercises performed per day for May 2024?",
            "SELECT DATE(Datetime) AS date, SUM(Count) AS total_exercises FROM physio_table WHERE strftime('%Y-%m', Datetime) = '2024-05' GROUP BY DATE(Datetime) ORDER BY DATE(Datetime);",
        ),
    ]
}
