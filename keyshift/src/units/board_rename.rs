use async_trait::async_trait;

use crate::{
    errors::UnitError,
    keys::{KeySpace, key_id},
    migration::{Migration, Write},
    record::Record,
    store::StoreRead,
};

pub const ID: &str = "20201006-board-rename";

/// Moves every board into the Messaging key space, value untouched.
pub struct BoardRename {
    keys: KeySpace,
}

impl BoardRename {
    pub fn new(keys: KeySpace) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Migration for BoardRename {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Rename boards into the Messaging key space"
    }

    fn key_prefix(&self) -> String {
        self.keys.prefix("Board")
    }

    fn loads_record(&self) -> bool {
        false
    }

    async fn apply(&self, _store: &dyn StoreRead, key: &str, _record: Option<Record>) -> Result<Vec<Write>, UnitError> {
        let storage_key = key_id(key).ok_or_else(|| UnitError::Other {
            message: format!("board key '{key}' has no storage id"),
        })?;
        Ok(vec![Write::rename(key, self.keys.key("Messaging.Board", storage_key))])
    }
}
