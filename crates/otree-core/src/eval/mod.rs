//! エンジン評価。
//!
//! 1. [`OpeningTree::frontier`] で評価対象ノード（フロンティア）を列挙する
//! 2. [`evaluate`] でワーカープールに配り、全ワーカーの終了後にまとめて書き戻す
//! 3. [`merge_previous`] で前回の出力を読み込み、評価済みのノードを再利用する

mod scheduler;

use std::time::Duration;

use serde_json::Value;

use crate::error::EvalResult;
use crate::serialize::BEST_KEY;
use crate::stats::{EngineStats, NodeStats};
use crate::tree::{NodeId, OpeningTree};

pub use crate::stats::EvalState;
pub use scheduler::{EvalFailure, EvalOptions, EvalProgress, EvalReport, ProgressCallback, evaluate};

/// 局面評価器。ルートからの指し手列と思考時間を受け取り、推奨手を返す。
///
/// インスタンスはワーカーごとに1つ作られ、ワーカースレッド内でのみ使われる。
pub trait Evaluator {
    fn best_move(&mut self, moves: &[String], time_ms: u64) -> EvalResult<String>;
}

/// ワーカー番号を受け取り評価器を作るファクトリ。
pub type EvaluatorFactory<'a> = dyn Fn(usize) -> EvalResult<Box<dyn Evaluator>> + Sync + 'a;

impl<S: NodeStats> OpeningTree<S> {
    /// `engine_cut_off` を超えるノードの数。評価状態には依存しない。
    pub fn cut_size(&self) -> usize {
        let cut_off = self.config().engine_cut_off;
        let mut size = 0;
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            if self.node(id).count <= cut_off {
                continue;
            }
            size += 1;
            stack.extend(self.children(id).into_iter().map(|(_, child)| child));
        }
        size
    }

    /// `nodes` 個のノードを評価するのに必要な時間の見積もり。
    pub fn estimate_for(&self, nodes: usize) -> Duration {
        let cfg = self.config();
        let total = Duration::from_millis(cfg.time_per_node_ms.saturating_mul(nodes as u64));
        total / u32::try_from(cfg.concurrency).unwrap_or(u32::MAX).max(1)
    }
}

impl OpeningTree<EngineStats> {
    /// 評価対象のノードを深さ優先で列挙する。
    ///
    /// 対局数が `engine_cut_off` 以下のノードは子孫ごと対象外。超えるノードは
    /// 子のフロンティアを先に並べ、自身が未評価なら最後に加える。
    pub fn frontier(&self) -> Vec<NodeId> {
        let mut out = Vec::new();
        self.collect_frontier(self.root(), &mut out);
        out
    }

    fn collect_frontier(&self, id: NodeId, out: &mut Vec<NodeId>) {
        let node = self.node(id);
        if node.count <= self.config().engine_cut_off {
            return;
        }
        for (_, child) in self.children(id) {
            self.collect_frontier(child, out);
        }
        if !node.stats.is_evaluated() {
            out.push(id);
        }
    }

    /// 未評価のフロンティアノード数
    pub fn eval_size(&self) -> usize {
        self.frontier().len()
    }

    /// 残りの評価にかかる時間の見積もり
    pub fn estimate(&self) -> Duration {
        self.estimate_for(self.eval_size())
    }

    pub fn eval_state(&self, id: NodeId) -> EvalState {
        self.node(id).stats.state()
    }
}

/// 前回の出力（一部だけ評価済みでもよい）から `"best"` を読み込み、未評価ノードに書き込む。
///
/// ツリーと前回の出力の両方に存在する指し手だけを辿る。書き込んだノード数を返す。
pub fn merge_previous(tree: &mut OpeningTree<EngineStats>, prior: &Value) -> usize {
    let mut filled = 0;
    let mut stack = vec![(tree.root(), prior)];
    while let Some((id, value)) = stack.pop() {
        let Some(map) = value.as_object() else {
            continue;
        };
        if let Some(best) = map.get(BEST_KEY).and_then(Value::as_str) {
            if tree.node_mut(id).stats.set_evaluation(best.to_string()) {
                filled += 1;
            }
        }
        for (key, child) in tree.children(id) {
            if let Some(sub) = map.get(key) {
                stack.push((child, sub));
            }
        }
    }
    filled
}
