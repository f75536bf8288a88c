use crate::model::*;
use serde::de::DeserializeOwned;
use sled::transaction::{TransactionError, Transactional};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("malformed record: {0}")]
    Codec(#[from] bincode::Error),
    #[error("comment refers to unknown movie {0}")]
    UnknownMovie(u64),
}

pub type StoreResult<T> = Result<T, StoreError>;

// Ids are stored big-endian so that tree iteration follows id order.
fn serialize_id(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

fn comment_key(movie_id: u64, seq: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&serialize_id(movie_id));
    key[8..].copy_from_slice(&seq.to_be_bytes());
    key
}

fn decode<T: DeserializeOwned, V: AsRef<[u8]>>(data: V) -> StoreResult<T> {
    Ok(bincode::deserialize(data.as_ref())?)
}

pub trait UserDb {
    type Error;
    /// Inserts `user` unless the username is taken. Returns `false` on a duplicate.
    fn add_user(&self, user: &User) -> Result<bool, Self::Error>;
    fn get_user(&self, username: &str) -> Result<Option<User>, Self::Error>;
}

pub trait MovieDb {
    type Error;
    /// Writes all movies and comments in one transaction. A comment whose
    /// movie is neither stored nor part of `movies` aborts the whole write.
    fn import_dataset(&self, movies: &[Movie], comments: &[Comment]) -> Result<(), Self::Error>;
    fn has_movies(&self) -> Result<bool, Self::Error>;
    /// Case-insensitive substring match on the title, ordered by id.
    /// An empty keyword matches every movie.
    fn find_movies(&self, keyword: &str) -> Result<Vec<Movie>, Self::Error>;
    fn list_all_movies(&self) -> Result<Vec<Movie>, Self::Error>;
    /// Comments of one movie in insertion order.
    fn find_comments(&self, movie_id: u64) -> Result<Vec<Comment>, Self::Error>;
}

pub trait SessionDb {
    type Error;
    fn insert_session(&self, token: &str, record: &SessionRecord) -> Result<(), Self::Error>;
    fn get_session(&self, token: &str) -> Result<Option<SessionRecord>, Self::Error>;
    fn remove_session(&self, token: &str) -> Result<(), Self::Error>;
    /// Removes every session that expired at or before `now`, returning how many.
    fn purge_sessions(&self, now: i64) -> Result<usize, Self::Error>;
}

const USERS: &'static [u8] = b"users";
const MOVIES: &'static [u8] = b"movies";
const COMMENTS: &'static [u8] = b"comments";
const SESSIONS: &'static [u8] = b"sessions";

impl UserDb for sled::Db {
    type Error = StoreError;

    fn add_user(&self, user: &User) -> StoreResult<bool> {
        let users = self.open_tree(USERS)?;
        let data = bincode::serialize(user)?;
        let swapped =
            users.compare_and_swap(user.username.as_bytes(), None as Option<&[u8]>, Some(data))?;
        Ok(swapped.is_ok())
    }

    fn get_user(&self, username: &str) -> StoreResult<Option<User>> {
        let users = self.open_tree(USERS)?;
        users.get(username.as_bytes())?.map(decode).transpose()
    }
}

impl MovieDb for sled::Db {
    type Error = StoreError;

    fn import_dataset(&self, movies: &[Movie], comments: &[Comment]) -> StoreResult<()> {
        let movies_tree = self.open_tree(MOVIES)?;
        let comments_tree = self.open_tree(COMMENTS)?;
        let movie_rows = movies
            .iter()
            .map(|movie| Ok((serialize_id(movie.id), bincode::serialize(movie)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        let comment_rows = comments
            .iter()
            .map(|comment| Ok((comment.movie_id, bincode::serialize(comment)?)))
            .collect::<StoreResult<Vec<_>>>()?;
        (&movies_tree, &comments_tree)
            .transaction(|(movies, comments)| {
                for (key, data) in &movie_rows {
                    movies.insert(&key[..], data.as_slice())?;
                }
                for (movie_id, data) in &comment_rows {
                    if movies.get(serialize_id(*movie_id))?.is_none() {
                        return sled::transaction::abort(*movie_id);
                    }
                    let seq = comments.generate_id()?;
                    comments.insert(&comment_key(*movie_id, seq)[..], data.as_slice())?;
                }
                Ok(())
            })
            .map_err(|err: TransactionError<u64>| match err {
                TransactionError::Storage(e) => StoreError::Storage(e),
                TransactionError::Abort(movie_id) => StoreError::UnknownMovie(movie_id),
            })
    }

    fn has_movies(&self) -> StoreResult<bool> {
        let movies = self.open_tree(MOVIES)?;
        Ok(!movies.is_empty())
    }

    fn find_movies(&self, keyword: &str) -> StoreResult<Vec<Movie>> {
        let keyword = keyword.to_lowercase();
        Ok(self
            .list_all_movies()?
            .into_iter()
            .filter(|movie| movie.title.to_lowercase().contains(&keyword))
            .collect())
    }

    fn list_all_movies(&self) -> StoreResult<Vec<Movie>> {
        let movies = self.open_tree(MOVIES)?;
        movies
            .iter()
            .values()
            .map(|data| decode(data?))
            .collect()
    }

    fn find_comments(&self, movie_id: u64) -> StoreResult<Vec<Comment>> {
        let comments = self.open_tree(COMMENTS)?;
        comments
            .scan_prefix(serialize_id(movie_id))
            .values()
            .map(|data| decode(data?))
            .collect()
    }
}

impl SessionDb for sled::Db {
    type Error = StoreError;

    fn insert_session(&self, token: &str, record: &SessionRecord) -> StoreResult<()> {
        let sessions = self.open_tree(SESSIONS)?;
        sessions.insert(token.as_bytes(), bincode::serialize(record)?)?;
        Ok(())
    }

    fn get_session(&self, token: &str) -> StoreResult<Option<SessionRecord>> {
        let sessions = self.open_tree(SESSIONS)?;
        sessions.get(token.as_bytes())?.map(decode).transpose()
    }

    fn remove_session(&self, token: &str) -> StoreResult<()> {
        let sessions = self.open_tree(SESSIONS)?;
        sessions.remove(token.as_bytes())?;
        Ok(())
    }

    fn purge_sessions(&self, now: i64) -> StoreResult<usize> {
        let sessions = self.open_tree(SESSIONS)?;
        let mut purged = 0;
        for entry in sessions.iter() {
            let (token, data) = entry?;
            let record: SessionRecord = decode(&data)?;
            if record.expires_at <= now {
                sessions.remove(token)?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}
