use std::collections::{HashMap, HashSet};

use crate::model::{ProcessTreeNode, ProcessView, StoredProcess};

/// Parent/child index over the process rows of one snapshot.
///
/// `parent_pid` is the only persisted edge. The index is built once per read so that both
/// directions can be resolved without rescanning the rows for every node.
#[derive(Debug, Clone, Default)]
pub struct ProcessForest {
    /// Sorted by pid
    processes: Vec<StoredProcess>,
    /// Map of pid to index in `processes`
    by_pid: HashMap<i64, usize>,
    /// Map of parent pid to the indexes of its children, in ascending pid order
    children: HashMap<i64, Vec<usize>>,
}

impl ProcessForest {
    pub fn new(mut processes: Vec<StoredProcess>) -> Self {
        processes.sort_by_key(|process| process.pid);

        let by_pid = processes
            .iter()
            .enumerate()
            .map(|(index, process)| (process.pid, index))
            .collect();

        let mut children: HashMap<i64, Vec<usize>> = HashMap::new();
        for (index, process) in processes.iter().enumerate() {
            // A process listing itself as its parent is not its own child
            if let Some(parent_pid) = process.parent_pid.filter(|&ppid| ppid != process.pid) {
                children.entry(parent_pid).or_default().push(index);
            }
        }

        Self {
            processes,
            by_pid,
            children,
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    pub fn processes(&self) -> &[StoredProcess] {
        &self.processes
    }

    pub fn get(&self, pid: i64) -> Option<&StoredProcess> {
        self.by_pid.get(&pid).map(|&index| &self.processes[index])
    }

    pub fn children(&self, pid: i64) -> impl Iterator<Item = &StoredProcess> + '_ {
        self.children
            .get(&pid)
            .into_iter()
            .flatten()
            .map(|&index| &self.processes[index])
    }

    pub fn has_children(&self, pid: i64) -> bool {
        self.children.contains_key(&pid)
    }

    /// The parent row of `pid`, if it is part of the same snapshot
    pub fn parent(&self, pid: i64) -> Option<&StoredProcess> {
        let process = self.get(pid)?;
        let parent_pid = process
            .parent_pid
            .filter(|&ppid| ppid != 0 && ppid != pid)?;
        self.get(parent_pid)
    }

    /// Processes without a parent (`parent_pid` null or 0)
    pub fn roots(&self) -> impl Iterator<Item = &StoredProcess> + '_ {
        self.processes.iter().filter(|process| process.is_root())
    }

    /// Processes referencing a parent that is not part of the snapshot.
    ///
    /// They are kept as is: an orphan is never promoted to a root.
    pub fn orphans(&self) -> impl Iterator<Item = &StoredProcess> + '_ {
        self.processes
            .iter()
            .filter(|process| !process.is_root() && self.parent(process.pid).is_none())
    }

    /// Flat list of every process, in ascending pid order, with its derived relations
    pub fn views(&self) -> Vec<ProcessView> {
        self.processes
            .iter()
            .map(|process| ProcessView {
                process: process.clone(),
                has_children: self.has_children(process.pid),
                children: self.children(process.pid).map(|child| child.pid).collect(),
            })
            .collect()
    }

    /// Reconstruct the process trees: one per root, then one per orphan.
    ///
    /// Every process appears exactly once. Rows only reachable through a `parent_pid` cycle are
    /// appended as extra trees.
    pub fn tree(&self) -> Vec<ProcessTreeNode> {
        let mut visited = HashSet::with_capacity(self.processes.len());
        let mut trees = Vec::new();

        let roots = self.roots().chain(self.orphans());
        let tops: Vec<usize> = roots
            .map(|process| self.by_pid[&process.pid])
            .chain(0..self.processes.len())
            .collect();

        for index in tops {
            if visited.insert(self.processes[index].pid) {
                trees.push(self.subtree(index, &mut visited));
            }
        }

        trees
    }

    fn leaf(&self, index: usize) -> ProcessTreeNode {
        let process = &self.processes[index];
        ProcessTreeNode {
            pid: process.pid,
            name: process.name.clone(),
            cpu_percent: process.cpu_percent,
            memory_mb: process.memory_mb,
            children: Vec::new(),
        }
    }

    /// Build the subtree under `root` with an explicit stack
    fn subtree(&self, root: usize, visited: &mut HashSet<i64>) -> ProcessTreeNode {
        // Pre-order walk, remembering the slot of each node's parent
        let mut order: Vec<(usize, Option<usize>)> = Vec::new();
        let mut stack = vec![(root, None)];
        while let Some((index, parent_slot)) = stack.pop() {
            let slot = order.len();
            order.push((index, parent_slot));

            let pid = self.processes[index].pid;
            for &child in self.children.get(&pid).into_iter().flatten().rev() {
                if visited.insert(self.processes[child].pid) {
                    stack.push((child, Some(slot)));
                }
            }
        }

        // Descendants always have a higher slot than their parent, assemble bottom-up
        let mut nodes: Vec<Option<ProcessTreeNode>> =
            order.iter().map(|&(index, _)| Some(self.leaf(index))).collect();
        for slot in (1..order.len()).rev() {
            let Some(mut node) = nodes[slot].take() else {
                continue;
            };
            node.children.reverse();
            if let Some(parent) = order[slot].1.and_then(|parent| nodes[parent].as_mut()) {
                parent.children.push(node);
            }
        }

        let mut root_node = nodes
            .into_iter()
            .next()
            .flatten()
            .unwrap_or_else(|| self.leaf(root));
        root_node.children.reverse();
        root_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn process(pid: i64, parent_pid: Option<i64>) -> StoredProcess {
        StoredProcess {
            id: pid,
            pid,
            name: format!("proc-{pid}"),
            cpu_percent: 1.0,
            memory_mb: 2.0,
            parent_pid,
            command_line: String::new(),
            status: "running".into(),
            create_time: None,
        }
    }

    fn pids<'a>(processes: impl Iterator<Item = &'a StoredProcess>) -> Vec<i64> {
        processes.map(|process| process.pid).collect()
    }

    #[test]
    fn test_relations() {
        let forest = ProcessForest::new(vec![
            process(3, Some(99)),
            process(2, Some(1)),
            process(1, None),
            process(4, Some(1)),
            process(5, Some(0)),
        ]);

        assert_eq!(forest.len(), 5);
        assert_eq!(pids(forest.children(1)), vec![2, 4]);
        assert!(forest.has_children(1));
        assert!(!forest.has_children(2));
        assert_eq!(forest.parent(2).map(|p| p.pid), Some(1));
        assert_eq!(forest.parent(1), None);
        assert_eq!(forest.parent(3), None);
        assert_eq!(pids(forest.roots()), vec![1, 5]);
        assert_eq!(pids(forest.orphans()), vec![3]);
    }

    #[test]
    fn test_views() {
        let forest = ProcessForest::new(vec![process(2, Some(1)), process(1, None)]);
        let views = forest.views();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].process.pid, 1);
        assert!(views[0].has_children);
        assert_eq!(views[0].children, vec![2]);
        assert!(!views[1].has_children);
        assert!(views[1].children.is_empty());
    }

    #[test]
    fn test_tree_keeps_orphans_detached() {
        let forest = ProcessForest::new(vec![
            process(1, None),
            process(2, Some(1)),
            process(3, Some(2)),
            process(4, Some(1)),
            process(7, Some(99)),
            process(8, Some(7)),
        ]);
        let tree = forest.tree();

        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].pid, 1);
        assert_eq!(
            tree[0].children.iter().map(|c| c.pid).collect::<Vec<_>>(),
            vec![2, 4]
        );
        assert_eq!(tree[0].children[0].children[0].pid, 3);
        assert_eq!(tree[1].pid, 7);
        assert_eq!(tree[1].children[0].pid, 8);
        assert_eq!(tree.iter().map(|t| t.subtree_size()).sum::<usize>(), 6);
    }

    #[test]
    fn test_tree_survives_cycles() {
        let forest = ProcessForest::new(vec![
            process(0, Some(0)),
            process(1, Some(0)),
            process(10, Some(11)),
            process(11, Some(10)),
        ]);

        assert_eq!(pids(forest.children(11)), vec![10]);
        assert_eq!(forest.children(0).count(), 1);

        let tree = forest.tree();
        assert_eq!(tree.iter().map(|t| t.subtree_size()).sum::<usize>(), 4);
        assert_eq!(tree[0].pid, 0);
        assert_eq!(tree[0].children[0].pid, 1);
    }

    #[test]
    fn test_deep_chain() {
        let depth = 2_000;
        let processes = (1..=depth)
            .map(|pid| process(pid, if pid == 1 { None } else { Some(pid - 1) }))
            .collect();
        let forest = ProcessForest::new(processes);

        let tree = forest.tree();
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].subtree_size(), depth as usize);
    }
}
