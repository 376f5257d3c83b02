//! 棋譜集合からオープニングツリーを構築するコアライブラリ。
//!
//! - [`tree`]: アリーナ方式のツリーと挿入処理
//! - [`stats`]: ノードごとの統計ポリシー（勝敗集計 / エンジン評価）
//! - [`serialize`]: カットオフ付きの JSON 出力
//! - [`eval`]: エンジン評価のフロンティア選択・並列実行・再開マージ

pub mod config;
pub mod error;
pub mod eval;
pub mod serialize;
pub mod stats;
pub mod tree;
pub mod types;

pub use config::TreeConfig;
pub use error::{ConfigError, EvalError};
pub use eval::{
    EvalFailure, EvalOptions, EvalProgress, EvalReport, EvalState, Evaluator, EvaluatorFactory,
    ProgressCallback, evaluate, merge_previous,
};
pub use stats::{EngineStats, NodeStats, ScoreStats};
pub use tree::{Node, NodeId, OpeningTree};
pub use types::{Color, parse_result};
