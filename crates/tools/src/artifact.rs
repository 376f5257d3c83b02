//! 出力ファイル。
//!
//! ルートのシリアライズ結果に `"values"`（実行時の設定と入力 PGN のパス）を加えた
//! 1つの JSON オブジェクト。`--resume` ではこれをそのまま読み戻す。

use std::path::Path;

use anyhow::{Context, Result};
use otree_core::{NodeStats, OpeningTree};
use serde_json::{Map, Value};

use crate::common::io::{read_json, write_json};

pub const VALUES_KEY: &str = "values";
pub const PGN_KEY: &str = "pgn";

pub fn build_artifact<S: NodeStats>(
    tree: &OpeningTree<S>,
    pgn: &Path,
) -> Result<Map<String, Value>> {
    let mut artifact = tree.to_json().unwrap_or_default();
    let config = serde_json::to_value(tree.config()).context("failed to serialize config")?;
    let mut values = match config {
        Value::Object(map) => map,
        other => anyhow::bail!("config serialized to a non-object: {other}"),
    };
    values.insert(PGN_KEY.to_string(), Value::String(pgn.display().to_string()));
    artifact.insert(VALUES_KEY.to_string(), Value::Object(values));
    Ok(artifact)
}

pub fn write_artifact<S: NodeStats>(tree: &OpeningTree<S>, pgn: &Path, out: &Path) -> Result<()> {
    let artifact = build_artifact(tree, pgn)?;
    write_json(out, &artifact)?;
    log::info!("wrote {}", out.display());
    Ok(())
}

/// 前回の出力を読み込む。トップレベルがオブジェクトでなければエラー。
pub fn read_artifact(path: &Path) -> Result<Value> {
    let value = read_json(path)?;
    if !value.is_object() {
        anyhow::bail!("{} is not an opening tree artifact", path.display());
    }
    Ok(value)
}
