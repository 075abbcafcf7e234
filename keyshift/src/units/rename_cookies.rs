use async_trait::async_trait;

use crate::{
    errors::UnitError,
    keys::KeySpace,
    migration::{Migration, Write},
    record::{Record, RecordExt},
    store::StoreRead,
};

pub const ID: &str = "20201210-rename-cookies";

/// Renames the `UserCookies` field of every user to `Cookies`.
pub struct RenameCookies {
    keys: KeySpace,
}

impl RenameCookies {
    pub fn new(keys: KeySpace) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Migration for RenameCookies {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Rename the UserCookies field to Cookies"
    }

    fn key_prefix(&self) -> String {
        self.keys.user_prefix()
    }

    async fn apply(&self, _store: &dyn StoreRead, key: &str, record: Option<Record>) -> Result<Vec<Write>, UnitError> {
        let mut user = record.ok_or_else(|| UnitError::MissingRecord { key: key.to_string() })?;
        let cookies = user.take_field("UserCookies")?;
        user.set_field("Cookies", cookies)?;
        Ok(vec![Write::update(key, user)])
    }
}
