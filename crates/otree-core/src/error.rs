//! エラー型

/// 設定エラー。起動時に検出され、実行途中の失敗とは別の終了コードで報告される。
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// 必須オプションが指定されていない
    #[error("missing required option: --{option}")]
    Missing { option: &'static str },

    /// オプションの値が不正
    #[error("invalid value for --{option}: {reason}")]
    Invalid { option: &'static str, reason: String },
}

/// 1ノード分のエンジン評価の失敗。
///
/// いずれもそのノードを未評価のまま残すだけで、評価パス全体は継続する。
#[derive(thiserror::Error, Debug)]
pub enum EvalError {
    /// エンジンの起動・初期化に失敗
    #[error("failed to start evaluator: {0}")]
    Spawn(String),

    /// 時間予算を超えても bestmove が返らなかった
    #[error("evaluator timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// エンジンプロセスが終了した
    #[error("evaluator exited unexpectedly")]
    Disconnected,

    /// 応答が不正
    #[error("malformed evaluator response: {0}")]
    Protocol(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl EvalError {
    /// このエラーの後に評価器を作り直すべきか。
    pub fn needs_restart(&self) -> bool {
        matches!(self, EvalError::Timeout { .. } | EvalError::Disconnected | EvalError::Io(_))
    }
}

pub type ConfigResult<T> = Result<T, ConfigError>;
pub type EvalResult<T> = Result<T, EvalError>;
