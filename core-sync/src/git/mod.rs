//! # Git Object Builder
//!
//! Turns the staged directory into remote objects.
//!
//! - **Blob Creator** (`blob`): classifies each file as text or binary and creates its blob
//! - **Tree Builder** (`tree`): one tree per directory, innermost first, returning the root sha
//! - **Branch Manager** (`branch`): resolves the branch tip and moves the ref as the last step
//!
//! Nothing created here is visible on the remote until the branch ref moves.

pub mod blob;
pub mod branch;
pub mod tree;

pub use blob::{is_binary, BlobCreator, CreatedBlob};
pub use branch::{BranchManager, BranchTip};
pub use tree::{TreeBuildOutcome, TreeBuilder};
