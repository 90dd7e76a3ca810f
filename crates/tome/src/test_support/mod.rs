//! Shared fixtures for unit tests.

pub(crate) mod kinds;

pub(crate) use kinds::*;

use crate::{
    db::{BackendConfig, Database, InMemoryBackend, PackConfig},
    document::ownership::{User, UserRole},
};

/// Pack every fixture database registers.
pub(crate) const MONSTER_PACK: &str = "world.monsters";

pub(crate) fn gm() -> User {
    User::new("gm0000000000001", "Gamemaster", UserRole::Gamemaster)
}

pub(crate) fn assistant() -> User {
    User::new("assistant000001", "Assistant", UserRole::Assistant)
}

pub(crate) fn player(id: &str) -> User {
    User::new(id, format!("Player {id}"), UserRole::Player)
}

pub(crate) fn banned() -> User {
    User::new("banned000000001", "Banned", UserRole::None)
}

pub(crate) fn backend_config() -> BackendConfig {
    BackendConfig::default()
        .with_flag_scope("tome")
        .with_pack(PackConfig::new(MONSTER_PACK, "Actor"))
}

pub(crate) fn database() -> Database {
    Database::new(InMemoryBackend::new(backend_config()))
}
