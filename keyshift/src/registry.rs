//! Link-time migration registration via the inventory crate.
//!
//! Application crates register their own units next to the code that owns the
//! records they reshape:
//!
//! ```ignore
//! fn build(keys: &KeySpace) -> Box<dyn Migration> {
//!     Box::new(SplitInventory::new(keys.clone()))
//! }
//!
//! keyshift::inventory::submit! {
//!     keyshift::MigrationRegistration { id: "20210301-split-inventory", build }
//! }
//! ```

use crate::{
    errors::MigrationError,
    keys::KeySpace,
    migration::{Migration, MigrationSet},
    units,
};

/// A unit submitted to the inventory.
pub struct MigrationRegistration {
    /// Unit id; must match what `build` returns
    pub id: &'static str,
    /// Construct the unit for a key space
    pub build: fn(&KeySpace) -> Box<dyn Migration>,
}

inventory::collect!(MigrationRegistration);

/// Every registered unit.
pub fn registered_migrations() -> impl Iterator<Item = &'static MigrationRegistration> {
    inventory::iter::<MigrationRegistration>()
}

/// Built-in units plus registered ones, ordered by id.
///
/// A registered id that collides with another unit is an invalid plan.
pub fn catalog(keys: &KeySpace) -> Result<MigrationSet, MigrationError> {
    let mut units = units::builtin(keys);
    for registration in registered_migrations() {
        let unit = (registration.build)(keys);
        if unit.id() != registration.id {
            return Err(MigrationError::InvalidPlan {
                message: format!(
                    "registration '{}' built a unit with id '{}'",
                    registration.id,
                    unit.id()
                ),
            });
        }
        units.push(unit);
    }
    MigrationSet::sorted(units)
}
