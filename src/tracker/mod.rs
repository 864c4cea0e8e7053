mod git;

pub use git::GitTracker;
