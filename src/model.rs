use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub username: String,
    pub password_hash: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Movie {
    pub id: u64,
    pub title: String,
    pub year: i32,
    /// Slash-delimited genre tags, e.g. `"Drama/Crime"`.
    pub genre: String,
    #[serde(default)]
    pub rating: Option<f32>,
    #[serde(default)]
    pub country: Option<String>,
}

impl Movie {
    pub fn genre_tags(&self) -> impl Iterator<Item = &str> {
        self.genre.split('/').map(str::trim).filter(|t| !t.is_empty())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Comment {
    pub movie_id: u64,
    pub comment: String,
    pub sentiment: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub username: String,
    /// Unix timestamp (seconds) after which the session is invalid.
    pub expires_at: i64,
}
