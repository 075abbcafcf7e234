use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::{
    errors::UnitError,
    keys::KeySpace,
    migration::{Migration, Write},
    record::{Record, RecordExt},
    store::StoreRead,
};

pub const ID: &str = "20200929-authinfo";

/// Login fields copied verbatim into the AuthInfo record.
const LOGIN_FIELDS: &[&str] = &[
    "LastLogin",
    "LastLogoff",
    "LastLoginFailure",
    "LastLoginFrom",
    "LoginFailureCount",
    "CreatedTime",
    "FirstLogin",
];

/// Password fields, renamed on the way.
const PASSWORD_FIELDS: &[(&str, &str)] = &[
    ("LastChanged", "LastPasswordChange"),
    ("LastChangedFrom", "LastPasswordChangeFrom"),
    ("Hash", "PasswordHash"),
];

/// Splits login and password state out of every user into `<ns>.AuthInfo:<uuid>`.
pub struct AuthInfoSplit {
    keys: KeySpace,
}

impl AuthInfoSplit {
    pub fn new(keys: KeySpace) -> Self {
        Self { keys }
    }
}

#[async_trait]
impl Migration for AuthInfoSplit {
    fn id(&self) -> &str {
        ID
    }

    fn description(&self) -> &str {
        "Move user login and password state into a separate AuthInfo record"
    }

    fn key_prefix(&self) -> String {
        self.keys.user_prefix()
    }

    async fn apply(&self, _store: &dyn StoreRead, key: &str, record: Option<Record>) -> Result<Vec<Write>, UnitError> {
        let mut user = record.ok_or_else(|| UnitError::MissingRecord { key: key.to_string() })?;
        let uuid = user.str_field("Uuid")?.to_string();

        let mut authinfo = Map::new();
        for field in LOGIN_FIELDS {
            let value = user.field(&format!("Login.{field}"))?;
            authinfo.insert((*field).to_string(), value.clone());
        }
        for (from, to) in PASSWORD_FIELDS {
            let value = user.field(&format!("Password.{from}"))?;
            authinfo.insert((*to).to_string(), value.clone());
        }
        authinfo.insert("UserUuid".to_string(), Value::String(uuid.clone()));

        user.take_field("Password")?;
        user.take_field("Login")?;

        Ok(vec![
            Write::update(self.keys.key("AuthInfo", &uuid), Value::Object(authinfo)),
            Write::update(key, user),
        ])
    }
}
