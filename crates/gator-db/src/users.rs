use gator_core::{Timestamp, UserId};
use tracing::info;

use crate::{
    Database, DbResult, IdSequence, LOG_TARGET, UserExistsSnafu, UserRecord,
};
use crate::tables::{id_sequences, users, users_by_name};

impl Database {
    /// Register a new user; names are unique
    pub async fn create_user(&self, name: &str) -> DbResult<UserRecord> {
        self.write_with(|tx| {
            let mut users_table = tx.open_table(&users::TABLE)?;
            let mut users_by_name_table = tx.open_table(&users_by_name::TABLE)?;
            let mut id_sequences_table = tx.open_table(&id_sequences::TABLE)?;

            let name = name.to_owned();
            if users_by_name_table.get(&name)?.is_some() {
                return UserExistsSnafu { name }.fail();
            }

            let id = UserId::new(Self::next_id_tx(
                IdSequence::User,
                &mut id_sequences_table,
            )?);
            let now = Timestamp::now();
            let record = UserRecord {
                id,
                name,
                created_at: now,
                updated_at: now,
            };

            users_table.insert(&id, &record)?;
            users_by_name_table.insert(&record.name, &id)?;

            info!(target: LOG_TARGET, user_id = %id, name = %record.name, "Created user");
            Ok(record)
        })
        .await
    }

    pub async fn get_user(&self, id: UserId) -> DbResult<Option<UserRecord>> {
        self.read_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            Ok(users_table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    pub async fn get_user_by_name(&self, name: &str) -> DbResult<Option<UserRecord>> {
        let name = name.to_owned();
        self.read_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            let users_by_name_table = tx.open_table(&users_by_name::TABLE)?;

            let Some(id) = users_by_name_table.get(&name)?.map(|g| g.value()) else {
                return Ok(None);
            };
            Ok(users_table.get(&id)?.map(|g| g.value()))
        })
        .await
    }

    /// All users, in registration order
    pub async fn list_users(&self) -> DbResult<Vec<UserRecord>> {
        self.read_with(|tx| {
            let users_table = tx.open_table(&users::TABLE)?;
            let mut users = Vec::new();

            for result in users_table.range(..)? {
                let (_key, value) = result?;
                users.push(value.value());
            }

            users.sort_by_key(|u| u.id);
            Ok(users)
        })
        .await
    }
}
