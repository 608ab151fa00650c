#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
//! Tree materialization for self-referencing collections.
//!
//! Children are obtained through a [`ChildSource`], which distinguishes
//! "children not loaded yet" from "no children". A node whose children are not
//! resident triggers exactly one on-demand fetch before traversal continues,
//! which is how the storage layer plugs its lazy loading in.
//!
//! Parent/child edges must be acyclic. Cycles are not detected and make every
//! traversal here run forever.
//!
//! ```
//! use rowscope_tree::{ResidentChildren, TreeBuilder};
//!
//! # tokio_test_block(async {
//! let source = ResidentChildren::new(|n: &u32| if *n < 3 { vec![n + 1] } else { vec![] });
//! let flat = TreeBuilder::new(&source).flatten_with_level(vec![1]).await.unwrap();
//! assert_eq!(flat, vec![(1, 0), (2, 1), (3, 2)]);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().build().unwrap().block_on(f)
//! # }
//! ```

pub mod ancestry;
pub mod builder;
pub mod forest;
pub mod source;

pub use ancestry::{ancestor_depth, flatten, is_in_parent};
pub use builder::{FlatChild, FlatTreeNode, TreeBuilder};
pub use forest::{Forest, NodeId, NodeRef};
pub use source::{ChildSource, ResidentChildren};
