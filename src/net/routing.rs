//! 路由表（按最短跳数，含 ECMP 候选）
//!
//! 每个节点持有一张自己的路由表：目的节点 -> 所有位于最短路径上的下一跳。
//! 路由是静态的：拓扑构建完成后一次性计算，仿真过程中只读。

use std::collections::{BTreeMap, HashMap, VecDeque};

use super::id::NodeId;

/// 到某个目的节点的所有等价最短路径。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PossiblePaths {
    /// 最短路径的跳数
    pub num_of_hops: u32,
    /// 最短路径上的下一跳（按 id 升序，无重复）
    pub next_hops: Vec<NodeId>,
}

#[derive(Debug, Clone)]
pub struct RoutingTable {
    owner: NodeId,
    entries: HashMap<NodeId, PossiblePaths>,
}

impl RoutingTable {
    pub fn new(owner: NodeId) -> Self {
        Self {
            owner,
            entries: HashMap::new(),
        }
    }

    pub fn owner(&self) -> NodeId {
        self.owner
    }

    /// 到 `dest` 的等价最短路径下一跳；不可达（或 `dest` 就是自身）时返回空切片。
    pub fn possible_paths_to(&self, dest: NodeId) -> &[NodeId] {
        self.entries
            .get(&dest)
            .map(|p| p.next_hops.as_slice())
            .unwrap_or(&[])
    }

    /// 到 `dest` 的最短跳数；不可达时为 `None`。
    pub fn hops_to(&self, dest: NodeId) -> Option<u32> {
        if dest == self.owner {
            return Some(0);
        }
        self.entries.get(&dest).map(|p| p.num_of_hops)
    }

    pub fn entry(&self, dest: NodeId) -> Option<&PossiblePaths> {
        self.entries.get(&dest)
    }

    pub fn num_destinations(&self) -> usize {
        self.entries.len()
    }

    /// 为拓扑中每个节点计算路由表。
    ///
    /// `adj[from]` 为从 `from` 出发的所有出边邻居（允许重复，代表并行链路）。
    pub fn build_all(adj: &BTreeMap<NodeId, Vec<NodeId>>) -> BTreeMap<NodeId, RoutingTable> {
        let mut rev_adj: BTreeMap<NodeId, Vec<NodeId>> =
            adj.keys().map(|&id| (id, Vec::new())).collect();
        for (&from, nbrs) in adj {
            for &to in nbrs {
                rev_adj.entry(to).or_default().push(from);
            }
        }

        let mut tables: BTreeMap<NodeId, RoutingTable> =
            adj.keys().map(|&id| (id, RoutingTable::new(id))).collect();

        // 对每个 dst 在反向图上做 BFS，得到到 dst 的最短跳数 dist[*]。
        // 然后对每个 from，选出所有满足 dist[next] = dist[from] - 1 的 next 作为 ECMP 候选。
        let mut dist: HashMap<NodeId, u32> = HashMap::with_capacity(adj.len());
        let mut q: VecDeque<NodeId> = VecDeque::new();

        for &dst in adj.keys() {
            dist.clear();
            q.clear();
            dist.insert(dst, 0);
            q.push_back(dst);

            while let Some(v) = q.pop_front() {
                let dv = dist[&v];
                for &pred in rev_adj.get(&v).map(Vec::as_slice).unwrap_or(&[]) {
                    if !dist.contains_key(&pred) {
                        dist.insert(pred, dv + 1);
                        q.push_back(pred);
                    }
                }
            }

            for (&from, nbrs) in adj {
                if from == dst {
                    continue;
                }
                let Some(&df) = dist.get(&from) else {
                    continue; // unreachable
                };
                let mut cands: Vec<NodeId> = nbrs
                    .iter()
                    .copied()
                    .filter(|nh| dist.get(nh).is_some_and(|&d| d + 1 == df))
                    .collect();
                cands.sort();
                cands.dedup();
                if cands.is_empty() {
                    continue;
                }
                if let Some(table) = tables.get_mut(&from) {
                    table.entries.insert(
                        dst,
                        PossiblePaths {
                            num_of_hops: df,
                            next_hops: cands,
                        },
                    );
                }
            }
        }

        tables
    }
}
