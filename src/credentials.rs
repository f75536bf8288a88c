use crate::database::{StoreError, UserDb};
use crate::model::User;
use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("username is already taken")]
    UsernameTaken,
    #[error(transparent)]
    Storage(#[from] StoreError),
}

/// Unsalted hex SHA-256, so equal passwords share a hash.
pub fn hash_password(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn register<D>(db: &D, username: &str, password: &str) -> Result<(), CredentialError>
where
    D: UserDb<Error = StoreError>,
{
    let user = User {
        username: username.to_owned(),
        password_hash: hash_password(password),
    };
    if db.add_user(&user)? {
        Ok(())
    } else {
        Err(CredentialError::UsernameTaken)
    }
}

pub fn authenticate<D>(db: &D, username: &str, password: &str) -> Result<bool, CredentialError>
where
    D: UserDb<Error = StoreError>,
{
    let password_hash = hash_password(password);
    Ok(db
        .get_user(username)?
        .map_or(false, |user| user.password_hash == password_hash))
}
