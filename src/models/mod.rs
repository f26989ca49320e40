mod follower;
mod post;
mod verdict;

pub use follower::{normalize_handle, Follower};
pub use post::{CachedPost, PostState, RawPost};
pub use verdict::Verdict;
