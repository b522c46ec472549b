//! Shared conformance tests for TreeStore implementations

pub mod tree_tests;

use estate_store_traits::StorePath;

pub fn path(raw: &str) -> StorePath {
    StorePath::parse(raw).expect("valid test path")
}
