use crate::model::{Comment, Movie};
use crate::tokens::words_iter;
use serde::Serialize;
use std::collections::HashMap;

const STOPWORDS: &[&str] = &[
    "about", "after", "all", "also", "an", "and", "are", "as", "at", "be", "been", "but", "by",
    "can", "could", "did", "do", "does", "for", "from", "had", "has", "have", "he", "her",
    "him", "his", "how", "if", "in", "into", "is", "it", "its", "just", "me", "more", "my",
    "no", "not", "of", "on", "one", "or", "our", "she", "so", "some", "than", "that", "the",
    "their", "them", "then", "there", "these", "they", "this", "to", "too", "up", "very",
    "was", "we", "were", "what", "when", "which", "who", "will", "with", "would", "you",
    "your",
];

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: String,
    pub count: usize,
}

/// Counts occurrences, largest count first and ties by label.
pub fn value_counts<I, S>(values: I) -> Vec<Bucket>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut counts: HashMap<String, usize> = HashMap::new();
    for value in values {
        *counts.entry(value.into()).or_insert(0) += 1;
    }
    let mut buckets: Vec<Bucket> = counts
        .into_iter()
        .map(|(label, count)| Bucket { label, count })
        .collect();
    buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    buckets
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct Analysis {
    pub total: usize,
    pub by_year: Vec<Bucket>,
    pub by_genre: Vec<Bucket>,
    pub by_rating: Vec<Bucket>,
    pub by_country: Vec<Bucket>,
}

impl Analysis {
    pub fn from_movies(movies: &[Movie]) -> Self {
        Analysis {
            total: movies.len(),
            by_year: value_counts(movies.iter().map(|m| m.year.to_string())),
            by_genre: value_counts(movies.iter().flat_map(Movie::genre_tags)),
            by_rating: value_counts(
                movies
                    .iter()
                    .filter_map(|m| m.rating)
                    .map(|r| format!("{:.1}", r)),
            ),
            by_country: value_counts(
                movies
                    .iter()
                    .filter_map(|m| m.country.as_deref())
                    .map(str::trim)
                    .filter(|c| !c.is_empty()),
            ),
        }
    }
}

pub fn sentiment_distribution(comments: &[Comment]) -> Vec<Bucket> {
    value_counts(comments.iter().map(|c| c.sentiment.as_str()))
}

/// Most frequent words across all comment texts, lower-cased, stopwords skipped.
pub fn keyword_frequencies(comments: &[Comment], limit: usize) -> Vec<Bucket> {
    let lowered: Vec<String> = comments.iter().map(|c| c.comment.to_lowercase()).collect();
    let mut buckets = value_counts(
        lowered
            .iter()
            .flat_map(|text| words_iter(text))
            .filter(|word| !STOPWORDS.contains(word)),
    );
    buckets.truncate(limit);
    buckets
}
