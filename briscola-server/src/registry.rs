use std::collections::BTreeMap;
use std::fmt;
use std::io::{self, BufRead, Write};

use crate::errors::{DuplicateUser, InvalidCredentials, LoadError, RemoveError};

/// Username length limit.
pub const MAX_NAME: usize = 20;
/// Password length limit.
pub const MAX_PASSWORD: usize = 8;

/// Identifier of a live session, recorded in a user's registry entry while
/// the user is waiting or playing.
pub type SessionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Disconnected,
    Waiting,
    Playing,
}

/// A `name:password` pair, validated against the length limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    name: String,
    password: String,
}

impl Credentials {
    pub fn new(name: impl Into<String>, password: impl Into<String>) -> Result<Self, InvalidCredentials> {
        let name = name.into();
        let password = password.into();
        if name.is_empty() || name.len() > MAX_NAME || name.contains(':') {
            return Err(InvalidCredentials);
        }
        if password.is_empty() || password.len() > MAX_PASSWORD {
            return Err(InvalidCredentials);
        }
        Ok(Credentials { name, password })
    }

    /// Parse the external `name:password` form. The name ends at the first
    /// colon; the password is everything after it.
    pub fn parse(text: &str) -> Result<Self, InvalidCredentials> {
        let (name, password) = text.split_once(':').ok_or(InvalidCredentials)?;
        Credentials::new(name, password)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.password)
    }
}

#[derive(Debug, Clone)]
struct Entry {
    password: String,
    status: Status,
    channel: Option<SessionId>,
}

/// The registered users, ordered by name. Every operation is a short
/// critical section over the whole structure; the server serializes access
/// with a single lock.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    users: BTreeMap<String, Entry>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Insert a new user, initially disconnected.
    pub fn add(&mut self, credentials: Credentials) -> Result<(), DuplicateUser> {
        if self.users.contains_key(&credentials.name) {
            return Err(DuplicateUser);
        }
        self.users.insert(
            credentials.name,
            Entry {
                password: credentials.password,
                status: Status::Disconnected,
                channel: None,
            },
        );
        Ok(())
    }

    /// Remove a user after checking the password.
    pub fn remove(&mut self, credentials: &Credentials) -> Result<(), RemoveError> {
        let entry = self
            .users
            .get(&credentials.name)
            .ok_or(RemoveError::UnknownUser)?;
        if entry.password != credentials.password {
            return Err(RemoveError::WrongPassword);
        }
        self.users.remove(&credentials.name);
        Ok(())
    }

    pub fn check_password(&self, credentials: &Credentials) -> bool {
        self.users
            .get(&credentials.name)
            .is_some_and(|entry| entry.password == credentials.password)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.users.contains_key(name)
    }

    pub fn status(&self, name: &str) -> Option<Status> {
        self.users.get(name).map(|entry| entry.status)
    }

    pub fn channel(&self, name: &str) -> Option<SessionId> {
        self.users.get(name).and_then(|entry| entry.channel)
    }

    /// Returns false when no such user exists.
    pub fn set_status(&mut self, name: &str, status: Status) -> bool {
        match self.users.get_mut(name) {
            Some(entry) => {
                entry.status = status;
                true
            }
            None => false,
        }
    }

    /// Returns false when no such user exists.
    pub fn set_channel(&mut self, name: &str, channel: Option<SessionId>) -> bool {
        match self.users.get_mut(name) {
            Some(entry) => {
                entry.channel = channel;
                true
            }
            None => false,
        }
    }

    /// Put a user back to disconnected with no session attached.
    pub fn disconnect(&mut self, name: &str) -> bool {
        match self.users.get_mut(name) {
            Some(entry) => {
                entry.status = Status::Disconnected;
                entry.channel = None;
                true
            }
            None => false,
        }
    }

    /// Names of the users in `status`, colon-joined in ascending order, or
    /// `None` when nobody matches.
    pub fn list(&self, status: Status) -> Option<String> {
        let mut names = self
            .users
            .iter()
            .filter(|(_, entry)| entry.status == status)
            .map(|(name, _)| name.as_str());
        let first = names.next()?;
        let mut joined = first.to_owned();
        for name in names {
            joined.push(':');
            joined.push_str(name);
        }
        Some(joined)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Read `name:password` lines. Every line must be newline-terminated;
    /// duplicates are skipped. Returns the number of users inserted.
    pub fn load<R: BufRead>(&mut self, mut reader: R) -> Result<usize, LoadError> {
        let mut inserted = 0;
        let mut line = String::new();
        for number in 1.. {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            let record = line
                .strip_suffix('\n')
                .ok_or(LoadError::UnterminatedLine(number))?;
            let credentials = Credentials::parse(record)
                .map_err(|err| LoadError::BadCredentials(number, err))?;
            if self.add(credentials).is_ok() {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Write `name:password` lines in ascending name order. Returns the
    /// number of users written.
    pub fn store<W: Write>(&self, mut writer: W) -> io::Result<usize> {
        for (name, entry) in &self.users {
            writeln!(writer, "{}:{}", name, entry.password)?;
        }
        Ok(self.users.len())
    }
}
