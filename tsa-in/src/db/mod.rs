//! Raw post persistence

pub mod posts;

pub use posts::{count_posts, get_post, insert_posts};
