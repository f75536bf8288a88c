use crate::database::{SessionDb, StoreError, StoreResult};
use crate::model::SessionRecord;
use rand::RngCore;

/// Authentication state of a single request.
///
/// The cookie only carries an opaque token; the username and the expiry live
/// in the `sessions` tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    token: Option<String>,
    username: Option<String>,
}

pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

impl Session {
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// Looks up `token`. Expired records are deleted and yield an anonymous session.
    pub fn resolve<D>(db: &D, token: Option<String>, now: i64) -> StoreResult<Self>
    where
        D: SessionDb<Error = StoreError>,
    {
        let token = match token {
            Some(token) => token,
            None => return Ok(Self::anonymous()),
        };
        match db.get_session(&token)? {
            Some(record) if record.expires_at > now => Ok(Session {
                token: Some(token),
                username: Some(record.username),
            }),
            Some(_) => {
                log::debug!("session expired");
                db.remove_session(&token)?;
                Ok(Self::anonymous())
            }
            None => Ok(Self::anonymous()),
        }
    }

    /// Creates a session for `username` valid for `ttl` seconds.
    pub fn start<D>(db: &D, username: &str, ttl: i64, now: i64) -> StoreResult<Self>
    where
        D: SessionDb<Error = StoreError>,
    {
        let token = new_token();
        db.insert_session(
            &token,
            &SessionRecord {
                username: username.to_owned(),
                expires_at: now + ttl,
            },
        )?;
        Ok(Session {
            token: Some(token),
            username: Some(username.to_owned()),
        })
    }

    pub fn end<D>(self, db: &D) -> StoreResult<()>
    where
        D: SessionDb<Error = StoreError>,
    {
        if let Some(token) = self.token {
            db.remove_session(&token)?;
        }
        Ok(())
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.username.is_some()
    }
}
