use std::env;

use log::debug;

use super::BTreeIndex;
use crate::{
    btree::page::{BTreePage, BTreePageID, PageCategory},
    key::IndexKey,
    utils::{lock_state, HandyRwLock},
};

/// Structural diagnostics. Both entry points assume a quiescent tree
/// (no concurrent operations) and are meant for tests; production
/// code never calls them on the hot path.
impl<K: IndexKey> BTreeIndex<K> {
    /// Checks the integrity of the tree:
    /// - size bounds of every non-root page.
    /// - key order within each page.
    /// - separator keys correctly partitioning the children.
    /// - parent pointers.
    /// - uniform leaf depth.
    /// - no leaked pins in the buffer pool.
    ///
    /// panic on any error found.
    pub fn check_integrity(&self, check_occupancy: bool) {
        assert!(
            self.buffer_pool.check_all_unpinned(),
            "pins leaked before the integrity check"
        );

        if let Some(root_pid) = self.get_root_pid() {
            self.check_sub_tree(
                &root_pid,
                None,
                None,
                None,
                check_occupancy,
                0,
            );
        }

        assert!(
            self.buffer_pool.check_all_unpinned(),
            "the integrity check leaked pins"
        );
    }

    /// Returns the depth of the leaves under `pid`.
    fn check_sub_tree(
        &self,
        pid: &BTreePageID,
        parent_pid: Option<&BTreePageID>,
        lower_bound: Option<&K>,
        upper_bound: Option<&K>,
        check_occupancy: bool,
        depth: usize,
    ) -> usize {
        match pid.category {
            PageCategory::Leaf => {
                let page_pod = self.buffer_pool.fetch_leaf_page(pid).unwrap();
                page_pod.rl().check_integrity(
                    parent_pid,
                    lower_bound,
                    upper_bound,
                    check_occupancy,
                );
                self.buffer_pool.unpin_page(pid, false).unwrap();
                depth
            }
            PageCategory::Internal => {
                let page_pod =
                    self.buffer_pool.fetch_internal_page(pid).unwrap();

                let (keys, children) = {
                    let page = page_pod.rl();
                    page.check_integrity(
                        parent_pid,
                        lower_bound,
                        upper_bound,
                        check_occupancy,
                    );

                    let mut keys = Vec::new();
                    let mut children = Vec::new();
                    for i in 0..page.get_size() {
                        keys.push(page.key_at(i));
                        children.push(page.value_at(i));
                    }
                    (keys, children)
                };
                self.buffer_pool.unpin_page(pid, false).unwrap();

                let mut leaf_depth = None;
                for (i, child_pid) in children.iter().enumerate() {
                    let child_lower = if i == 0 {
                        lower_bound
                    } else {
                        Some(&keys[i])
                    };
                    let child_upper = if i == children.len() - 1 {
                        upper_bound
                    } else {
                        Some(&keys[i + 1])
                    };

                    let child_depth = self.check_sub_tree(
                        child_pid,
                        Some(pid),
                        child_lower,
                        child_upper,
                        check_occupancy,
                        depth + 1,
                    );

                    match leaf_depth {
                        None => leaf_depth = Some(child_depth),
                        Some(expected) => assert_eq!(
                            expected, child_depth,
                            "the tree is unbalanced under {}",
                            pid,
                        ),
                    }
                }
                leaf_depth.unwrap()
            }
            PageCategory::Header => {
                panic!("the header page is not part of the tree");
            }
        }
    }

    /// Print the tree structure at debug level.
    ///
    /// # Arguments
    ///
    /// - `max_level` - the max level of the print
    ///     - 0: print the root page only
    ///     - -1: print all pages
    pub fn draw_tree(&self, max_level: i32) {
        // return if the log level is not debug
        if env::var("RUST_LOG").unwrap_or_default() != "debug" {
            return;
        }

        let mut depiction = "".to_string();
        depiction.push_str("\n\n----- PRINT TREE STRUCTURE START -----\n\n");

        match self.get_root_pid() {
            Some(root_pid) => {
                depiction.push_str(&format!("root: {}\n", root_pid));
                depiction.push_str(&self.draw_subtree(&root_pid, 0, max_level));
            }
            None => {
                depiction.push_str("empty tree\n");
            }
        }

        depiction.push_str("\n----- PRINT TREE STRUCTURE END   -----\n\n");
        debug!("{}", depiction);
    }

    fn draw_subtree(
        &self,
        pid: &BTreePageID,
        level: usize,
        max_level: i32,
    ) -> String {
        let mut depiction = "".to_string();
        let prefix = "│   ".repeat(level);

        match pid.category {
            PageCategory::Leaf => {
                let page_pod = self.buffer_pool.fetch_leaf_page(pid).unwrap();
                let latch_state = lock_state(page_pod.clone());
                {
                    let page = page_pod.rl();
                    let first = if page.get_size() > 0 {
                        format!("{:?}", page.key_at(0))
                    } else {
                        "-".to_string()
                    };
                    let last = if page.get_size() > 0 {
                        format!("{:?}", page.key_at(page.get_size() - 1))
                    } else {
                        "-".to_string()
                    };
                    depiction.push_str(&format!(
                        "{}├── leaf: {} ({}/{} entries) [{} .. {}] (lock state: {})\n",
                        prefix,
                        page.get_pid(),
                        page.get_size(),
                        page.get_max_size(),
                        first,
                        last,
                        latch_state,
                    ));
                }
                self.buffer_pool.unpin_page(pid, false).unwrap();
            }
            PageCategory::Internal => {
                let page_pod =
                    self.buffer_pool.fetch_internal_page(pid).unwrap();
                let (size, max_size, keys, children) = {
                    let page = page_pod.rl();
                    let mut keys = Vec::new();
                    let mut children = Vec::new();
                    for i in 0..page.get_size() {
                        keys.push(page.key_at(i));
                        children.push(page.value_at(i));
                    }
                    (page.get_size(), page.get_max_size(), keys, children)
                };
                self.buffer_pool.unpin_page(pid, false).unwrap();

                depiction.push_str(&format!(
                    "{}├── internal: {} ({}/{} children)\n",
                    prefix, pid, size, max_size,
                ));
                if max_level != -1 && level as i32 == max_level {
                    return depiction;
                }

                for (i, child_pid) in children.iter().enumerate() {
                    if i > 0 {
                        depiction.push_str(&format!(
                            "{}├── key: {:?}\n",
                            "│   ".repeat(level + 1),
                            keys[i],
                        ));
                    }
                    depiction.push_str(&self.draw_subtree(
                        child_pid,
                        level + 1,
                        max_level,
                    ));
                }
            }
            PageCategory::Header => {}
        }

        depiction
    }
}
