use async_trait::async_trait;

use crate::{
    errors::UnitError,
    keys::{KeySpace, key_id},
    migration::{Migration, Write},
    record::{Record, RecordExt},
    store::StoreRead,
};

pub const ID: &str = "20200930-mailbox-uuid";

/// Re-keys mailboxes from `<ns>.Mailbox:<username>` to
/// `<ns>.Messaging.Mailbox:<user uuid>`.
pub struct MailboxUuid {
    keys: KeySpace,
}

impl MailboxUuid {
    pub fn new(keys: KeySpace) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Migration for MailboxUuid {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Key mailboxes by their owner's uuid in the Messaging key space"
    }

    fn key_prefix(&self) -> String {
        self.keys.prefix("Mailbox")
    }

    fn loads_record(&self) -> bool {
        false
    }

    async fn apply(&self, store: &dyn StoreRead, key: &str, _record: Option<Record>) -> Result<Vec<Write>, UnitError> {
        let username = key_id(key).ok_or_else(|| UnitError::Other {
            message: format!("mailbox key '{key}' has no username"),
        })?;
        let user_key = self.keys.user(username);
        let user = store
            .get(&user_key)
            .await?
            .ok_or_else(|| UnitError::MissingRecord { key: user_key.clone() })?;
        let uuid = user.str_field("Uuid")?;

        Ok(vec![Write::rename(key, self.keys.key("Messaging.Mailbox", uuid))])
    }
}
