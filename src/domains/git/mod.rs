pub mod branches;
pub mod repository;
pub mod worktrees;

pub use branches::*;
pub use repository::*;
pub use worktrees::*;
