use crate::database::{MovieDb, StoreError};
use crate::model::{Comment, Movie};
use log::info;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("cannot read dataset: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse dataset: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Deserialize, Debug, Default)]
pub struct Dataset {
    pub movies: Vec<Movie>,
    #[serde(default)]
    pub comments: Vec<Comment>,
}

impl Dataset {
    pub fn from_json(data: &[u8]) -> Result<Self, DatasetError> {
        Ok(serde_json::from_slice(data)?)
    }

    pub fn import<D>(&self, db: &D) -> Result<(), DatasetError>
    where
        D: MovieDb<Error = StoreError>,
    {
        db.import_dataset(&self.movies, &self.comments)?;
        Ok(())
    }
}

/// Imports the dataset at `path` unless the store already holds movies.
/// Returns whether anything was imported.
pub fn import_if_empty<D, P>(db: &D, path: P) -> Result<bool, DatasetError>
where
    D: MovieDb<Error = StoreError>,
    P: AsRef<Path>,
{
    if db.has_movies()? {
        info!("movie store already populated, skipping import");
        return Ok(false);
    }
    let dataset = Dataset::from_json(&std::fs::read(path.as_ref())?)?;
    dataset.import(db)?;
    info!(
        "imported {} movies and {} comments from {}",
        dataset.movies.len(),
        dataset.comments.len(),
        path.as_ref().display()
    );
    Ok(true)
}
