//! 設定の読み込み。
//!
//! 優先順位は 組み込みデフォルト < TOML 設定ファイル < コマンドライン。

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use otree_core::TreeConfig;

/// TOML 設定ファイルを読み込む。書かれていない項目はデフォルト値になる。
pub fn load_config_file(path: &Path) -> Result<TreeConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let cfg: TreeConfig =
        toml::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))?;
    log::info!("loaded config from {}", path.display());
    Ok(cfg)
}

/// コマンドラインから上書きできる設定項目
#[derive(clap::Args, Debug, Default, Clone)]
pub struct ConfigOverrides {
    /// Maximum number of plies inserted per game
    #[arg(long)]
    pub max_depth: Option<u32>,

    /// A node is written only if more than this many games reached it
    #[arg(long)]
    pub node_cut_off: Option<u64>,

    /// A move is a "best" candidate only if more than this many games played it
    #[arg(long)]
    pub eval_cut_off: Option<u64>,

    /// A node is sent to the engine only if more than this many games reached it
    #[arg(long)]
    pub engine_cut_off: Option<u64>,

    /// Engine thinking time per node in milliseconds
    #[arg(long = "time-per-node")]
    pub time_per_node_ms: Option<u64>,

    /// Number of engine processes running in parallel
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// UCI engine binary; enables engine evaluation
    #[arg(long)]
    pub engine: Option<PathBuf>,

    /// Extra command-line argument passed to the engine (can be repeated)
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Option<Vec<String>>,

    /// Threads per engine
    #[arg(long)]
    pub engine_threads: Option<usize>,

    /// Hash size (MiB) per engine
    #[arg(long)]
    pub engine_hash_mb: Option<u32>,

    /// Additional UCI options (format: "Name=Value", can be repeated)
    #[arg(long = "engine-option")]
    pub engine_options: Option<Vec<String>>,

    /// Grace period after the thinking time before a node is given up (ms)
    #[arg(long)]
    pub timeout_margin_ms: Option<u64>,

    /// Write count/score diagnostics into every node
    #[arg(long)]
    pub debug: bool,
}

impl ConfigOverrides {
    pub fn apply(&self, cfg: &mut TreeConfig) {
        if let Some(v) = self.max_depth {
            cfg.max_depth = v;
        }
        if let Some(v) = self.node_cut_off {
            cfg.node_cut_off = v;
        }
        if let Some(v) = self.eval_cut_off {
            cfg.eval_cut_off = v;
        }
        if let Some(v) = self.engine_cut_off {
            cfg.engine_cut_off = v;
        }
        if let Some(v) = self.time_per_node_ms {
            cfg.time_per_node_ms = v;
        }
        if let Some(v) = self.concurrency {
            cfg.concurrency = v;
        }
        if let Some(v) = &self.engine {
            cfg.engine = Some(v.clone());
        }
        if let Some(v) = &self.engine_args {
            cfg.engine_args = v.clone();
        }
        if let Some(v) = self.engine_threads {
            cfg.engine_threads = v;
        }
        if let Some(v) = self.engine_hash_mb {
            cfg.engine_hash_mb = v;
        }
        if let Some(v) = &self.engine_options {
            cfg.engine_options = v.clone();
        }
        if let Some(v) = self.timeout_margin_ms {
            cfg.timeout_margin_ms = v;
        }
        if self.debug {
            cfg.debug = true;
        }
    }
}

/// デフォルト、設定ファイル、コマンドラインの順に重ねた設定を検証して返す。
pub fn resolve_config(file: Option<&Path>, overrides: &ConfigOverrides) -> Result<TreeConfig> {
    let mut cfg = match file {
        Some(path) => load_config_file(path)?,
        None => TreeConfig::default(),
    };
    overrides.apply(&mut cfg);
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use otree_core::{Color, ConfigError};

    #[test]
    fn command_line_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.toml");
        std::fs::write(
            &path,
            concat!(
                "max_depth = 8\n",
                "node_cut_off = 50\n",
                "initial_side = \"black\"\n",
                "engine_options = [\"Skill Level=10\"]\n",
            ),
        )
        .unwrap();

        let overrides = ConfigOverrides {
            node_cut_off: Some(7),
            ..ConfigOverrides::default()
        };
        let cfg = resolve_config(Some(&path), &overrides).unwrap();
        assert_eq!(cfg.max_depth, 8);
        assert_eq!(cfg.node_cut_off, 7);
        assert_eq!(cfg.initial_side, Color::Black);
        assert_eq!(cfg.engine_options, vec!["Skill Level=10".to_string()]);
        assert_eq!(cfg.eval_cut_off, TreeConfig::default().eval_cut_off);
    }

    #[test]
    fn invalid_values_surface_as_config_error() {
        let overrides = ConfigOverrides {
            concurrency: Some(0),
            ..ConfigOverrides::default()
        };
        let err = resolve_config(None, &overrides).unwrap_err();
        assert!(err.downcast_ref::<ConfigError>().is_some());
    }
}
