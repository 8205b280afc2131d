mod moderator;
mod preferences;
mod schema;
mod types;

pub use moderator::Moderator;
pub use schema::Database;
pub use types::DatabaseError;
