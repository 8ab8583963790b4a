pub mod follow_directory;
pub mod post_store;
pub mod user_directory;

pub use follow_directory::{FollowDirectory, PgFollowDirectory};
pub use post_store::{PgPostStore, PostStore};
pub use user_directory::{PgUserDirectory, UserDirectory};
