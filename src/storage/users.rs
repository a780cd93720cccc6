use redb::{ReadableTable, WriteTransaction};

use super::db::{email_key, Database, DatabaseError};
use super::models::User;
use super::tables::*;

impl Database {
    // ========================================================================
    // User operations
    // ========================================================================

    /// Insert or replace a user, keeping the email index unique
    pub fn put_user(&self, user: &User) -> Result<(), DatabaseError> {
        let write_txn = self.begin_write()?;
        write_user(&write_txn, user)?;
        write_txn.commit()?;
        Ok(())
    }

    /// Apply `update` to a user inside one write transaction. Returns the
    /// updated user, or `None` if there is no such user.
    pub fn update_user<F>(&self, id: &str, update: F) -> Result<Option<User>, DatabaseError>
    where
        F: FnOnce(&mut User) -> Result<(), DatabaseError>,
    {
        let write_txn = self.begin_write()?;
        let current: Option<User> = {
            let table = write_txn.open_table(USERS)?;
            let result = table
                .get(id)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;
            result
        };

        let Some(mut user) = current else {
            return Ok(None);
        };
        update(&mut user)?;
        write_user(&write_txn, &user)?;
        write_txn.commit()?;
        Ok(Some(user))
    }

    /// Get a user by id
    pub fn get_user(&self, id: &str) -> Result<Option<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(id)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    /// Resolve a user through the email index
    pub fn find_user_by_email(&self, email: &str) -> Result<Option<User>, DatabaseError> {
        let id = {
            let read_txn = self.begin_read()?;
            let table = read_txn.open_table(USER_EMAILS)?;
            let result = table
                .get(email_key(email).as_str())?
                .map(|v| v.value().to_string());
            result
        };

        match id {
            Some(id) => self.get_user(&id),
            None => Ok(None),
        }
    }

    /// Delete a user and its index entry
    pub fn delete_user(&self, id: &str) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(USERS)?;
            let removed: Option<User> = match table.remove(id)? {
                Some(data) => Some(rmp_serde::from_slice(data.value())?),
                None => None,
            };

            match removed {
                Some(user) => {
                    let mut email_table = write_txn.open_table(USER_EMAILS)?;
                    email_table.remove(email_key(&user.email).as_str())?;
                    true
                }
                None => false,
            }
        };
        write_txn.commit()?;
        Ok(deleted)
    }

    /// All users, newest first
    pub fn list_users(&self) -> Result<Vec<User>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        let mut users = Vec::new();
        for result in table.iter()? {
            let (_, value) = result?;
            let user: User = rmp_serde::from_slice(value.value())?;
            users.push(user);
        }

        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(users)
    }
}

fn write_user(write_txn: &WriteTransaction, user: &User) -> Result<(), DatabaseError> {
    debug_assert!(!user.id.is_empty(), "user id must not be empty");

    let email = email_key(&user.email);
    let mut email_table = write_txn.open_table(USER_EMAILS)?;
    let owner = email_table
        .get(email.as_str())?
        .map(|v| v.value().to_string());
    if let Some(owner) = owner {
        if owner != user.id {
            return Err(DatabaseError::Conflict(format!(
                "email {} already in use",
                user.email
            )));
        }
    }

    let mut table = write_txn.open_table(USERS)?;
    let previous: Option<User> = table
        .get(user.id.as_str())?
        .map(|v| rmp_serde::from_slice(v.value()))
        .transpose()?;

    // Email changed: drop the stale index entry
    if let Some(previous) = previous {
        let previous_email = email_key(&previous.email);
        if previous_email != email {
            email_table.remove(previous_email.as_str())?;
        }
    }

    let data = rmp_serde::to_vec_named(user)?;
    table.insert(user.id.as_str(), data.as_slice())?;
    email_table.insert(email.as_str(), user.id.as_str())?;
    Ok(())
}
