//! ノードごとの統計ポリシー。
//!
//! ツリー構築時にどちらか一方を型パラメータとして選ぶ。
//! - [`ScoreStats`]: 対局結果の合計から平均スコアを求め、子の中から best を選ぶ
//! - [`EngineStats`]: 外部エンジンが返した指し手をそのまま best とする

use serde_json::{Map, Value};

use crate::tree::{NodeId, OpeningTree};

pub trait NodeStats: Default + Sized {
    /// 1局分の結果（+1 / 0 / -1）を加える。
    fn accumulate(&mut self, result: i32);

    /// ノードの `"best"` を決める。
    fn best_move(tree: &OpeningTree<Self>, id: NodeId) -> Option<String>;

    /// best が決まらないノードを出力から除外するか。
    fn omit_without_best() -> bool;

    /// 参加カットオフに関係なく出力に残すべきノードか。
    fn keep_in_output(&self) -> bool {
        false
    }

    /// debug 出力用のフィールドを書き足す。
    fn write_debug(&self, count: u64, out: &mut Map<String, Value>);
}

/// 勝敗集計ポリシー
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreStats {
    /// 白勝ち +1 / 黒勝ち -1 の合計。絶対値は常に count 以下。
    pub score_sum: i64,
}

impl ScoreStats {
    /// 平均スコア。対局がなければ 0。
    pub fn average(&self, count: u64) -> f64 {
        if count == 0 {
            0.0
        } else {
            self.score_sum as f64 / count as f64
        }
    }
}

impl NodeStats for ScoreStats {
    fn accumulate(&mut self, result: i32) {
        self.score_sum += i64::from(result.signum());
    }

    /// `eval_cut_off` を超える子の中から、手番が初期手番なら最大、そうでなければ最小の
    /// 平均スコアを持つ指し手を選ぶ。同値なら指し手の辞書順で先のもの。
    fn best_move(tree: &OpeningTree<Self>, id: NodeId) -> Option<String> {
        let cut_off = tree.config().eval_cut_off;
        let maximize = tree.node(id).side_to_move == tree.config().initial_side;

        let mut best: Option<(&str, f64)> = None;
        for (key, child) in tree.children(id) {
            let child = tree.node(child);
            if child.count <= cut_off {
                continue;
            }
            let value = child.stats.average(child.count);
            let better = match best {
                None => true,
                Some((_, current)) if maximize => value > current,
                Some((_, current)) => value < current,
            };
            if better {
                best = Some((key, value));
            }
        }
        best.map(|(key, _)| key.to_string())
    }

    fn omit_without_best() -> bool {
        true
    }

    fn write_debug(&self, count: u64, out: &mut Map<String, Value>) {
        out.insert("score".to_string(), Value::from(self.score_sum));
        out.insert("eval".to_string(), Value::from(self.average(count)));
    }
}

/// エンジン評価のライフサイクル。
///
/// `Unevaluated → Scheduled → Evaluated`。再開マージは `Unevaluated → Evaluated` に直接遷移する。
/// 評価に失敗したノードは `Unevaluated` に戻り、次の評価パスで再びフロンティアになる。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EvalState {
    #[default]
    Unevaluated,
    Scheduled,
    Evaluated,
}

/// エンジン評価ポリシー
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineStats {
    evaluation: Option<String>,
    scheduled: bool,
}

impl EngineStats {
    pub fn evaluation(&self) -> Option<&str> {
        self.evaluation.as_deref()
    }

    #[inline]
    pub fn is_evaluated(&self) -> bool {
        self.evaluation.is_some()
    }

    pub fn state(&self) -> EvalState {
        if self.evaluation.is_some() {
            EvalState::Evaluated
        } else if self.scheduled {
            EvalState::Scheduled
        } else {
            EvalState::Unevaluated
        }
    }

    pub(crate) fn mark_scheduled(&mut self) {
        debug_assert!(self.evaluation.is_none(), "evaluated node must not be scheduled");
        self.scheduled = true;
    }

    pub(crate) fn clear_scheduled(&mut self) {
        self.scheduled = false;
    }

    /// 評価結果を書き込む。書き込みは1回限りで、既に値があれば何もせず `false` を返す。
    pub fn set_evaluation(&mut self, best: String) -> bool {
        if self.evaluation.is_some() {
            return false;
        }
        self.evaluation = Some(best);
        self.scheduled = false;
        true
    }
}

impl NodeStats for EngineStats {
    fn accumulate(&mut self, _result: i32) {}

    fn best_move(tree: &OpeningTree<Self>, id: NodeId) -> Option<String> {
        tree.node(id).stats.evaluation.clone()
    }

    fn omit_without_best() -> bool {
        false
    }

    // --resume は出力から評価を読み戻すので、評価済みノードはカットオフ未満でも落とさない
    fn keep_in_output(&self) -> bool {
        self.is_evaluated()
    }

    fn write_debug(&self, _count: u64, out: &mut Map<String, Value>) {
        out.insert("evaluated".to_string(), Value::Bool(self.is_evaluated()));
    }
}
