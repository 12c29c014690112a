//! checkpoint operations
//!
//! every operation takes an [`ObjectStore`](crate::store::ObjectStore) and
//! the repository [`Config`](crate::Config). none of them lock; callers
//! serialize mutations with [`Repo::lock`](crate::Repo::lock).

mod cleanup;
mod create;
mod list;
mod restore;

pub use cleanup::{cleanup, delete};
pub use create::{create, create_automatic};
pub use list::{get, list};
pub use restore::restore;
