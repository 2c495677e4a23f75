//! Dialect stores

mod conf;
mod defaults;
mod lines;
mod profiles;
mod tagconf;

pub use conf::ConfStore;
pub use defaults::DefaultsStore;
pub use profiles::ProfilesStore;
pub use tagconf::TagConfStore;
