// Accounts stored in a credentials file, rewritten on every change.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::{DateTime, Duration, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use snafu::{prelude::*, Snafu};
use tempfile::NamedTempFile;

use crate::cm::write_lock::{self, LockState, WriteLockGuard, LOCK_WAIT_TIMEOUT};

/// The users who can author surveys and see the dashboard, unless configured otherwise.
pub const DEFAULT_ADMINS: [&str; 2] = ["mrabeman", "ttissot"];

#[derive(Debug, Snafu)]
pub enum IdentityError {
    #[snafu(display("Username/password is incorrect"))]
    IncorrectCredentials {},
    #[snafu(display("The session of {username} has expired"))]
    SessionExpired { username: String },
    #[snafu(display("Unknown user {username}"))]
    UnknownUser { username: String },
    #[snafu(display("Username {username} is already taken"))]
    UsernameTaken { username: String },
    #[snafu(display("Passwords do not match"))]
    PasswordMismatch {},
    #[snafu(display("{field} cannot be empty"))]
    EmptyField { field: String },
    #[snafu(display("E-mail {email} is not valid"))]
    InvalidEmail { email: String },
    #[snafu(display("E-mail {email} is not pre-authorized to register"))]
    NotPreAuthorized { email: String },
    #[snafu(display("New and current values are the same"))]
    UnchangedValue {},

    #[snafu(display("Error reading credentials file {path}"))]
    ReadingStore {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error parsing credentials file {path}"))]
    ParsingStore {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Error writing credentials file {path}"))]
    WritingStore {
        source: std::io::Error,
        path: String,
    },
    #[snafu(display("Error serializing credentials file {path}"))]
    SerializingStore {
        source: serde_json::Error,
        path: String,
    },
    #[snafu(display("Credentials file {path} is locked by process {pid}"))]
    StoreLocked { path: String, pid: i32 },
    #[snafu(display("Could not lock credentials file {path}"))]
    LockUnavailable { path: String },
    #[snafu(display("Password hashing failed: {message}"))]
    Hashing { message: String },
    #[snafu(display("Invalid cookie expiry of {days} days in credentials file {path}"))]
    InvalidExpiry { path: String, days: f64 },
}

/// Whether the caller can fix the problem by changing its input.
#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum ErrorKind {
    Validation,
    Store,
}

impl IdentityError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IdentityError::IncorrectCredentials {}
            | IdentityError::SessionExpired { .. }
            | IdentityError::UnknownUser { .. }
            | IdentityError::UsernameTaken { .. }
            | IdentityError::PasswordMismatch {}
            | IdentityError::EmptyField { .. }
            | IdentityError::InvalidEmail { .. }
            | IdentityError::NotPreAuthorized { .. }
            | IdentityError::UnchangedValue {} => ErrorKind::Validation,
            IdentityError::ReadingStore { .. }
            | IdentityError::ParsingStore { .. }
            | IdentityError::WritingStore { .. }
            | IdentityError::SerializingStore { .. }
            | IdentityError::StoreLocked { .. }
            | IdentityError::LockUnavailable { .. }
            | IdentityError::Hashing { .. }
            | IdentityError::InvalidExpiry { .. } => ErrorKind::Store,
        }
    }
}

pub type IdentityResult<T> = Result<T, IdentityError>;

// ********* Credentials file *********

#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub name: String,
    pub email: String,
    /// An argon2 hash. Plain text passwords are hashed when the file is opened.
    pub password: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub usernames: BTreeMap<String, UserRecord>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CookieSettings {
    pub name: String,
    pub key: String,
    pub expiry_days: f64,
}

#[derive(Eq, PartialEq, Debug, Clone, Default, Serialize, Deserialize)]
pub struct PreAuthorized {
    #[serde(default)]
    pub emails: Vec<String>,
}

#[derive(PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub credentials: Credentials,
    pub cookie: CookieSettings,
    #[serde(default, alias = "pre-authorized")]
    pub preauthorized: PreAuthorized,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy, Serialize, Deserialize)]
pub enum Role {
    Admin,
    Respondent,
}

/// An authenticated user.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub name: String,
    pub role: Role,
    pub expires_at: DateTime<Utc>,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn is_expired(&self, now: &DateTime<Utc>) -> bool {
        *now >= self.expires_at
    }
}

/// The content of the sign-up form.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
pub struct Registration {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub repeat_password: String,
}

#[derive(Eq, PartialEq, Debug, Clone, Copy)]
pub enum UserField {
    Name,
    Email,
}

pub struct IdentityStore {
    path: PathBuf,
    config: CredentialConfig,
    admins: Vec<String>,
}

impl IdentityStore {
    /// Reads the credentials file. Plain text passwords are hashed and the
    /// file is rewritten if any was found.
    pub fn open(path: &Path, admins: &[String]) -> IdentityResult<IdentityStore> {
        let mut store = IdentityStore {
            path: path.to_path_buf(),
            config: read_store(path)?,
            admins: admins.to_vec(),
        };

        let has_plain_passwords = store
            .config
            .credentials
            .usernames
            .values()
            .any(|r| PasswordHash::new(&r.password).is_err());
        if has_plain_passwords {
            store.modify(|config| {
                let mut num_hashed = 0;
                for (username, record) in config.credentials.usernames.iter_mut() {
                    if PasswordHash::new(&record.password).is_err() {
                        debug!("open: hashing the password of {:?}", username);
                        record.password = hash_password(&record.password)?;
                        num_hashed += 1;
                    }
                }
                info!("Hashed {} plain text passwords", num_hashed);
                Ok(())
            })?;
        }
        Ok(store)
    }

    /// The user as of the last time this store read the file.
    pub fn user(&self, username: &str) -> Option<&UserRecord> {
        self.config.credentials.usernames.get(username)
    }

    /// Checks the password against the file as currently stored.
    pub fn login(
        &self,
        username: &str,
        password: &str,
        now: &DateTime<Utc>,
    ) -> IdentityResult<Session> {
        let config = read_store(&self.path)?;
        let record = config
            .credentials
            .usernames
            .get(username)
            .context(IncorrectCredentialsSnafu {})?;
        ensure!(
            verify_password(password, &record.password)?,
            IncorrectCredentialsSnafu {}
        );
        let days = config.cookie.expiry_days;
        let expires_at = Some(days * 86400.0)
            .filter(|secs| secs.is_finite())
            .and_then(|secs| Duration::try_seconds(secs as i64))
            .and_then(|expiry| now.checked_add_signed(expiry))
            .context(InvalidExpirySnafu {
                path: self.path.display().to_string(),
                days,
            })?;
        let role = if self.admins.iter().any(|a| a == username) {
            Role::Admin
        } else {
            Role::Respondent
        };
        info!("User {} logged in ({:?})", username, role);
        Ok(Session {
            username: username.to_string(),
            name: record.name.clone(),
            role,
            expires_at,
        })
    }

    pub fn logout(&self, session: Session) -> IdentityResult<()> {
        ensure!(
            self.user(&session.username).is_some(),
            UnknownUserSnafu {
                username: session.username.clone()
            }
        );
        info!("User {} logged out", session.username);
        Ok(())
    }

    /// Adds a new user. With `preauthorization`, the e-mail must be in the
    /// pre-authorized list and is removed from it.
    pub fn register(&mut self, form: &Registration, preauthorization: bool) -> IdentityResult<()> {
        ensure_not_empty("Username", &form.username)?;
        ensure_not_empty("Name", &form.name)?;
        ensure_not_empty("Password", &form.password)?;
        ensure_valid_email(&form.email)?;
        ensure!(
            form.password == form.repeat_password,
            PasswordMismatchSnafu {}
        );
        let password = hash_password(&form.password)?;
        self.modify(|config| {
            let usernames = &mut config.credentials.usernames;
            ensure!(
                !usernames.contains_key(&form.username),
                UsernameTakenSnafu {
                    username: form.username.clone()
                }
            );
            if preauthorization {
                let emails = &mut config.preauthorized.emails;
                let pos = emails
                    .iter()
                    .position(|e| e == &form.email)
                    .context(NotPreAuthorizedSnafu {
                        email: form.email.clone(),
                    })?;
                emails.remove(pos);
            }
            let record = UserRecord {
                name: form.name.clone(),
                email: form.email.clone(),
                password,
            };
            config
                .credentials
                .usernames
                .insert(form.username.clone(), record);
            Ok(())
        })?;
        info!("Registered user {}", form.username);
        Ok(())
    }

    pub fn reset_password(
        &mut self,
        session: &Session,
        current: &str,
        new_password: &str,
        repeat_password: &str,
        now: &DateTime<Utc>,
    ) -> IdentityResult<()> {
        self.ensure_active(session, now)?;
        ensure_not_empty("New password", new_password)?;
        ensure!(new_password == repeat_password, PasswordMismatchSnafu {});
        ensure!(new_password != current, UnchangedValueSnafu {});
        let hashed = hash_password(new_password)?;
        self.modify(|config| {
            let record = config
                .credentials
                .usernames
                .get_mut(&session.username)
                .context(UnknownUserSnafu {
                    username: session.username.clone(),
                })?;
            ensure!(
                verify_password(current, &record.password)?,
                IncorrectCredentialsSnafu {}
            );
            record.password = hashed;
            Ok(())
        })?;
        info!("Password of {} was reset", session.username);
        Ok(())
    }

    pub fn update_user_details(
        &mut self,
        session: &Session,
        field: UserField,
        value: &str,
        now: &DateTime<Utc>,
    ) -> IdentityResult<()> {
        self.ensure_active(session, now)?;
        match field {
            UserField::Name => ensure_not_empty("Name", value)?,
            UserField::Email => ensure_valid_email(value)?,
        }
        self.modify(|config| {
            let record = config
                .credentials
                .usernames
                .get_mut(&session.username)
                .context(UnknownUserSnafu {
                    username: session.username.clone(),
                })?;
            let target = match field {
                UserField::Name => &mut record.name,
                UserField::Email => &mut record.email,
            };
            ensure!(target.as_str() != value, UnchangedValueSnafu {});
            *target = value.to_string();
            Ok(())
        })?;
        info!("Updated {:?} of {}", field, session.username);
        Ok(())
    }

    fn ensure_active(&self, session: &Session, now: &DateTime<Utc>) -> IdentityResult<()> {
        ensure!(
            !session.is_expired(now),
            SessionExpiredSnafu {
                username: session.username.clone()
            }
        );
        Ok(())
    }

    /// Applies a change to the credentials file under the write lock.
    ///
    /// The file is read again once the lock is held and the change applies to
    /// that copy, so that the changes made through other stores are kept.
    /// Nothing is written if the change fails.
    fn modify<F>(&mut self, change: F) -> IdentityResult<()>
    where
        F: FnOnce(&mut CredentialConfig) -> IdentityResult<()>,
    {
        let guard = self.lock()?;
        debug!("modify: holding {:?}", guard.path());
        let mut config = read_store(&self.path)?;
        change(&mut config)?;
        self.write(&config)?;
        self.config = config;
        Ok(())
    }

    fn lock(&self) -> IdentityResult<WriteLockGuard> {
        let p = self.path.display().to_string();
        let lock_path = write_lock::lock_path_for(&self.path);
        match write_lock::acquire(&lock_path, LOCK_WAIT_TIMEOUT) {
            Ok(guard) => Ok(guard),
            Err(LockState::HeldBy(pid)) => StoreLockedSnafu { path: p, pid }.fail(),
            Err(state) => {
                warn!("lock: {:?} unavailable: {:?}", lock_path, state);
                LockUnavailableSnafu { path: p }.fail()
            }
        }
    }

    /// Rewrites the whole file through a temporary file in the same directory.
    fn write(&self, config: &CredentialConfig) -> IdentityResult<()> {
        let p = self.path.display().to_string();
        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = NamedTempFile::new_in(&dir).context(WritingStoreSnafu { path: p.clone() })?;
        serde_json::to_writer_pretty(&mut tmp, config)
            .context(SerializingStoreSnafu { path: p.clone() })?;
        tmp.write_all(b"\n")
            .context(WritingStoreSnafu { path: p.clone() })?;
        tmp.persist(&self.path)
            .map_err(|e| e.error)
            .context(WritingStoreSnafu { path: p })?;
        Ok(())
    }
}

fn read_store(path: &Path) -> IdentityResult<CredentialConfig> {
    let p = path.display().to_string();
    let contents = fs::read_to_string(path).context(ReadingStoreSnafu { path: p.clone() })?;
    serde_json::from_str(&contents).context(ParsingStoreSnafu { path: p })
}

fn ensure_not_empty(field: &str, value: &str) -> IdentityResult<()> {
    ensure!(!value.trim().is_empty(), EmptyFieldSnafu { field });
    Ok(())
}

fn ensure_valid_email(email: &str) -> IdentityResult<()> {
    ensure_not_empty("E-mail", email)?;
    let valid = match email.split_once('@') {
        Some((user, domain)) => !user.is_empty() && domain.contains('.'),
        None => false,
    };
    ensure!(valid, InvalidEmailSnafu { email });
    Ok(())
}

fn hash_password(password: &str) -> IdentityResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = Argon2::default();
    match argon2.hash_password(password.as_bytes(), &salt) {
        Ok(hash) => Ok(hash.to_string()),
        Err(e) => HashingSnafu {
            message: e.to_string(),
        }
        .fail(),
    }
}

fn verify_password(password: &str, hash: &str) -> IdentityResult<bool> {
    let parsed_hash = match PasswordHash::new(hash) {
        Ok(hash) => hash,
        Err(e) => {
            return HashingSnafu {
                message: e.to_string(),
            }
            .fail()
        }
    };
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok())
}
