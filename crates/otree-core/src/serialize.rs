//! ツリーの JSON 出力。
//!
//! 2種類のカットオフを独立に適用する。
//! - 参加カットオフ (`node_cut_off`): 子を持ち、対局数がこれを超える子だけを再帰出力する
//! - 選択カットオフ: best の候補を決める（[`NodeStats::best_move`] 側で適用）
//!
//! 出力形式は `{"best": <指し手>, <子の指し手>: {...}, ...}`。

use serde_json::{Map, Value};

use crate::stats::NodeStats;
use crate::tree::{NodeId, OpeningTree};

pub const BEST_KEY: &str = "best";
pub const COUNT_KEY: &str = "count";

impl<S: NodeStats> OpeningTree<S> {
    /// ルートから出力する。勝敗集計ツリーでルートに best がなければ `None`。
    pub fn to_json(&self) -> Option<Map<String, Value>> {
        self.serialize_node(self.root())
    }

    /// 子ノードが再帰出力の対象になるか。
    pub fn participates(&self, id: NodeId) -> bool {
        let node = self.node(id);
        if node.stats.keep_in_output() {
            return true;
        }
        node.has_children() && node.count > self.config().node_cut_off
    }

    pub fn serialize_node(&self, id: NodeId) -> Option<Map<String, Value>> {
        let node = self.node(id);
        let best = S::best_move(self, id);
        if best.is_none() && S::omit_without_best() {
            return None;
        }

        let mut out = Map::new();
        if let Some(best) = best {
            out.insert(BEST_KEY.to_string(), Value::String(best));
        }
        if self.config().debug {
            out.insert(COUNT_KEY.to_string(), Value::from(node.count));
            node.stats.write_debug(node.count, &mut out);
        }

        for (key, child) in self.children(id) {
            if !self.participates(child) {
                continue;
            }
            // best が決まらない子は参加カットオフに落ちたものとして扱う
            if let Some(sub) = self.serialize_node(child) {
                out.insert(key.to_string(), Value::Object(sub));
            }
        }
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::config::TreeConfig;
    use crate::stats::{EngineStats, ScoreStats};
    use crate::tree::OpeningTree;

    fn sample(node_cut_off: u64, eval_cut_off: u64, debug: bool) -> OpeningTree<ScoreStats> {
        let mut tree = OpeningTree::new(TreeConfig {
            max_depth: 2,
            node_cut_off,
            eval_cut_off,
            debug,
            ..TreeConfig::default()
        });
        tree.insert_game(1, &["e2e4", "e7e5"]);
        tree.insert_game(0, &["e2e4", "e7e5"]);
        tree.insert_game(-1, &["d2d4"]);
        tree
    }

    #[test]
    fn three_game_scenario() {
        let tree = sample(0, 0, false);
        let root = tree.node(tree.root());
        assert_eq!(root.count, 3);

        let e4 = tree.node(tree.child(tree.root(), "e2e4").unwrap());
        assert_eq!((e4.count, e4.stats.score_sum), (2, 1));
        let d4 = tree.node(tree.child(tree.root(), "d2d4").unwrap());
        assert_eq!((d4.count, d4.stats.score_sum), (1, -1));

        // d2d4 は子を持たないので再帰出力されないが、best の候補にはなる
        let out = tree.to_json().unwrap();
        assert_eq!(
            serde_json::Value::Object(out),
            json!({"best": "e2e4", "e2e4": {"best": "e7e5"}})
        );
    }

    #[test]
    fn debug_fields_are_gated() {
        let out = sample(0, 0, true).to_json().unwrap();
        assert_eq!(out["count"], json!(3));
        assert_eq!(out["score"], json!(0));
        assert_eq!(out["e2e4"]["count"], json!(2));
        assert_eq!(out["e2e4"]["eval"], json!(0.5));

        let out = sample(0, 0, false).to_json().unwrap();
        assert!(!out.contains_key("count"));
    }

    #[test]
    fn root_without_candidates_is_absent() {
        assert!(sample(0, 2, false).to_json().is_none());
        let out = sample(0, 1, false).to_json().unwrap();
        assert_eq!(out["best"], json!("e2e4"));
    }

    #[test]
    fn child_without_candidates_is_dropped_even_if_participating() {
        let out = sample(0, 1, false).to_json().unwrap();
        assert_eq!(out["e2e4"], json!({"best": "e7e5"}));

        let mut tree = OpeningTree::<ScoreStats>::new(TreeConfig {
            max_depth: 2,
            node_cut_off: 0,
            eval_cut_off: 1,
            ..TreeConfig::default()
        });
        tree.insert_game(1, &["e2e4", "e7e5"]);
        tree.insert_game(1, &["e2e4", "c7c5"]);
        // e2e4 は参加カットオフを通るが、その子はどちらも count=1 で best が決まらない
        let out = tree.to_json().unwrap();
        assert_eq!(out["best"], json!("e2e4"));
        assert!(!out.contains_key("e2e4"));
    }

    #[test]
    fn participation_cut_off_is_strict() {
        // e2e4 の count は 2
        let out = sample(1, 0, false).to_json().unwrap();
        assert!(out.contains_key("e2e4"));
        let out = sample(2, 0, false).to_json().unwrap();
        assert!(!out.contains_key("e2e4"));
        assert_eq!(out["best"], json!("e2e4"));
    }

    #[test]
    fn engine_tree_keeps_evaluated_nodes() {
        let mut tree = OpeningTree::<EngineStats>::new(TreeConfig {
            max_depth: 2,
            node_cut_off: 100,
            ..TreeConfig::default()
        });
        tree.insert_game(0, &["e2e4", "e7e5"]);
        tree.insert_game(0, &["d2d4"]);
        let root = tree.root();
        tree.node_mut(root).stats.set_evaluation("e2e4".to_string());
        let d4 = tree.child(root, "d2d4").unwrap();
        tree.node_mut(d4).stats.set_evaluation("d7d5".to_string());

        let out = tree.to_json().unwrap();
        assert_eq!(
            serde_json::Value::Object(out),
            json!({"best": "e2e4", "d2d4": {"best": "d7d5"}})
        );
    }
}
