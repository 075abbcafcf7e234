//! Built-in migration units for the Hybrasyl key layout.

pub mod authinfo;
pub mod board_rename;
pub mod mailbox_uuid;
pub mod rename_cookies;

pub use authinfo::AuthInfoSplit;
pub use board_rename::BoardRename;
pub use mailbox_uuid::MailboxUuid;
pub use rename_cookies::RenameCookies;

use crate::{keys::KeySpace, migration::Migration};

/// Built-in units in application order.
pub fn builtin(keys: &KeySpace) -> Vec<Box<dyn Migration>> {
    vec![
        Box::new(AuthInfoSplit::new(keys.clone())),
        Box::new(MailboxUuid::new(keys.clone())),
        Box::new(BoardRename::new(keys.clone())),
        Box::new(RenameCookies::new(keys.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_units_are_in_id_order() {
        let units = builtin(&KeySpace::default());
        let ids: Vec<&str> = units.iter().map(|unit| unit.id()).collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids, sorted);
        assert_eq!(
            ids,
            vec![authinfo::ID, mailbox_uuid::ID, board_rename::ID, rename_cookies::ID]
        );
    }
}
