pub mod boxes;
pub mod database;
pub mod error;
pub mod row_helpers;
pub mod schema;
pub mod token;
pub mod users;

pub use boxes::BoxRepo;
pub use database::Database;
pub use error::StoreError;
pub use users::{UserRepo, UserRow};
