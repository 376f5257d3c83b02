//! アリーナ方式のオープニングツリー。
//!
//! ノードは `Vec` に格納し、[`NodeId`] で参照する。各ノードは親の ID と
//! 自分に至った指し手を保持するので、ルートからの手順は親を辿るだけで
//! 復元できる（親の子マップを走査する必要はない）。
//! ノードは削除されない。枝刈りは出力時の派生ビューとしてのみ行う。

use std::collections::HashMap;

use crate::config::TreeConfig;
use crate::stats::NodeStats;
use crate::types::Color;

/// アリーナ内のノード位置。アリーナの添字そのものなので、ノード数に上限はない。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub const ROOT: NodeId = NodeId(0);

    #[inline]
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct Node<S> {
    pub side_to_move: Color,
    /// このノードを通過した対局数
    pub count: u64,
    pub stats: S,
    children: HashMap<String, NodeId>,
    parent: Option<NodeId>,
    move_key: Option<String>,
    depth: u32,
}

impl<S: NodeStats> Node<S> {
    fn new(
        side_to_move: Color,
        parent: Option<NodeId>,
        move_key: Option<String>,
        depth: u32,
    ) -> Self {
        Self {
            side_to_move,
            count: 0,
            stats: S::default(),
            children: HashMap::new(),
            parent,
            move_key,
            depth,
        }
    }

    #[inline]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    #[inline]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// このノードに至った指し手。ルートは `None`。
    #[inline]
    pub fn move_key(&self) -> Option<&str> {
        self.move_key.as_deref()
    }

    /// ルートからの手数（ルートは 0）
    #[inline]
    pub fn depth(&self) -> u32 {
        self.depth
    }
}

#[derive(Debug, Clone)]
pub struct OpeningTree<S> {
    nodes: Vec<Node<S>>,
    config: TreeConfig,
}

impl<S: NodeStats> OpeningTree<S> {
    /// 設定の `initial_side` を手番とするルートだけのツリーを作る。
    pub fn new(config: TreeConfig) -> Self {
        let root = Node::new(config.initial_side, None, None, 0);
        Self {
            nodes: vec![root],
            config,
        }
    }

    #[inline]
    pub fn config(&self) -> &TreeConfig {
        &self.config
    }

    #[inline]
    pub fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    #[inline]
    pub fn node(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id.index()]
    }

    #[inline]
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node<S> {
        &mut self.nodes[id.index()]
    }

    /// ツリー全体のノード数
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// 全ノードの ID（生成順）
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).map(NodeId)
    }

    /// 子ノードを指し手順に並べて返す。出力やタイブレークを HashMap の順序に依存させないため。
    pub fn children(&self, id: NodeId) -> Vec<(&str, NodeId)> {
        let mut children: Vec<(&str, NodeId)> =
            self.node(id).children.iter().map(|(k, &c)| (k.as_str(), c)).collect();
        children.sort_unstable_by(|a, b| a.0.cmp(b.0));
        children
    }

    pub fn child(&self, id: NodeId, key: &str) -> Option<NodeId> {
        self.node(id).children.get(key).copied()
    }

    /// 指し手列を辿ってノードを探す。
    pub fn find<M: AsRef<str>>(&self, moves: &[M]) -> Option<NodeId> {
        moves.iter().try_fold(self.root(), |id, mv| self.child(id, mv.as_ref()))
    }

    /// 1局分の指し手列をルートから挿入する。
    pub fn insert_game<M: AsRef<str>>(&mut self, result: i32, moves: &[M]) {
        self.insert(self.root(), result, moves, 1);
    }

    /// `id` から指し手列を挿入する。`depth` は `moves[0]` で作られる子の手数。
    ///
    /// 通過した各ノードの対局数を 1 つ増やし、結果を統計に加える。
    /// `depth` が `max_depth` を超えるか指し手が尽きたら、そのノードで止まる。
    pub fn insert<M: AsRef<str>>(&mut self, id: NodeId, result: i32, moves: &[M], depth: u32) {
        let mut id = id;
        let mut depth = depth;
        let mut rest = moves;
        loop {
            let node = self.node_mut(id);
            node.count += 1;
            node.stats.accumulate(result);

            let Some((next, tail)) = rest.split_first() else {
                return;
            };
            if depth > self.config.max_depth {
                return;
            }
            id = self.child_or_insert(id, next.as_ref());
            rest = tail;
            depth += 1;
        }
    }

    fn child_or_insert(&mut self, parent: NodeId, key: &str) -> NodeId {
        if let Some(id) = self.child(parent, key) {
            return id;
        }
        let (side, depth) = {
            let p = self.node(parent);
            (p.side_to_move.opponent(), p.depth + 1)
        };
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(side, Some(parent), Some(key.to_string()), depth));
        self.node_mut(parent).children.insert(key.to_string(), id);
        id
    }

    /// ルートからこのノードまでの指し手列を復元する。
    pub fn path_from_root(&self, id: NodeId) -> Vec<String> {
        let mut path = Vec::with_capacity(self.node(id).depth as usize);
        let mut current = id;
        while let Some(parent) = self.node(current).parent {
            if let Some(key) = self.node(current).move_key() {
                path.push(key.to_string());
            }
            current = parent;
        }
        path.reverse();
        path
    }

    /// 存在するノードの最大手数
    pub fn max_depth_present(&self) -> u32 {
        self.nodes.iter().map(|n| n.depth).max().unwrap_or(0)
    }
}
