//! ツリー構築・出力・評価の設定。
//!
//! 値はツリーが1つだけ所有し、全ノードから読み取り専用で参照される。
//! 出力アーティファクトの `"values"` にもそのまま書き出される。

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::types::Color;

pub const DEFAULT_MAX_DEPTH: u32 = 5;
pub const DEFAULT_NODE_CUT_OFF: u64 = 500;
pub const DEFAULT_EVAL_CUT_OFF: u64 = 10;
pub const DEFAULT_ENGINE_CUT_OFF: u64 = 10;
pub const DEFAULT_TIME_PER_NODE_MS: u64 = 5_000;
pub const DEFAULT_CONCURRENCY: usize = 10;
pub const DEFAULT_ENGINE_THREADS: usize = 1;
pub const DEFAULT_ENGINE_HASH_MB: u32 = 16;
pub const DEFAULT_TIMEOUT_MARGIN_MS: u64 = 1_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TreeConfig {
    /// 挿入する最大手数（ルート直下が深さ1）
    pub max_depth: u32,
    /// 出力に含めるノードの最小対局数（これを超える必要がある）
    pub node_cut_off: u64,
    /// 勝率による best 選択の候補となる最小対局数
    pub eval_cut_off: u64,
    /// エンジン評価の対象となる最小対局数
    pub engine_cut_off: u64,
    /// 1ノードあたりの思考時間（ミリ秒）
    pub time_per_node_ms: u64,
    /// 並列ワーカー数
    pub concurrency: usize,
    /// UCI エンジンのパス。指定時はエンジン評価モードになる
    #[serde(skip_serializing_if = "Option::is_none")]
    pub engine: Option<PathBuf>,
    /// エンジン起動時のコマンドライン引数
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub engine_args: Vec<String>,
    pub engine_threads: usize,
    pub engine_hash_mb: u32,
    /// 追加の UCI オプション (Name=Value 形式)
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub engine_options: Vec<String>,
    /// 思考時間を超えてから stop / 失敗判定までの猶予
    pub timeout_margin_ms: u64,
    /// 診断用フィールドを出力する
    pub debug: bool,
    /// ルートの手番。この手番のノードでは最大値を best とする
    pub initial_side: Color,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            node_cut_off: DEFAULT_NODE_CUT_OFF,
            eval_cut_off: DEFAULT_EVAL_CUT_OFF,
            engine_cut_off: DEFAULT_ENGINE_CUT_OFF,
            time_per_node_ms: DEFAULT_TIME_PER_NODE_MS,
            concurrency: DEFAULT_CONCURRENCY,
            engine: None,
            engine_args: Vec::new(),
            engine_threads: DEFAULT_ENGINE_THREADS,
            engine_hash_mb: DEFAULT_ENGINE_HASH_MB,
            engine_options: Vec::new(),
            timeout_margin_ms: DEFAULT_TIMEOUT_MARGIN_MS,
            debug: false,
            initial_side: Color::White,
        }
    }
}

impl TreeConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid {
                option: "max-depth",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.concurrency == 0 {
            return Err(ConfigError::Invalid {
                option: "concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.engine_threads == 0 {
            return Err(ConfigError::Invalid {
                option: "engine-threads",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// エンジン評価に必要なパスを返す。未指定なら設定エラー。
    pub fn require_engine(&self) -> ConfigResult<&PathBuf> {
        self.engine.as_ref().ok_or(ConfigError::Missing { option: "engine" })
    }

    pub fn time_per_node(&self) -> Duration {
        Duration::from_millis(self.time_per_node_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = TreeConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.concurrency, 10);
        assert_eq!(cfg.node_cut_off, 500);
        assert!(matches!(cfg.require_engine(), Err(ConfigError::Missing { option: "engine" })));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let cfg = TreeConfig {
            concurrency: 0,
            ..TreeConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("--concurrency"));
    }

    #[test]
    fn partial_config_fills_defaults() {
        let cfg: TreeConfig = serde_json::from_str(r#"{"max_depth": 3, "debug": true}"#).unwrap();
        assert_eq!(cfg.max_depth, 3);
        assert!(cfg.debug);
        assert_eq!(cfg.eval_cut_off, DEFAULT_EVAL_CUT_OFF);
        assert_eq!(cfg.initial_side, Color::White);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        assert!(serde_json::from_str::<TreeConfig>(r#"{"max_dept": 3}"#).is_err());
    }
}
