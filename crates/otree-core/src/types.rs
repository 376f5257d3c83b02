//! 手番と対局結果

use serde::{Deserialize, Serialize};

/// 手番（白/黒）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Color {
    #[default]
    White,
    Black,
}

impl Color {
    /// 相手番を返す
    #[inline]
    pub const fn opponent(self) -> Color {
        match self {
            Color::White => Color::Black,
            Color::Black => Color::White,
        }
    }
}

impl std::ops::Not for Color {
    type Output = Color;

    #[inline]
    fn not(self) -> Color {
        self.opponent()
    }
}

/// PGN の Result ラベルを符号付きの結果に変換する。
///
/// 白勝ち `+1`、黒勝ち `-1`。引き分け・未決着・不正なラベルはすべて `0`。
pub fn parse_result(label: &str) -> i32 {
    match label.trim() {
        "1-0" => 1,
        "0-1" => -1,
        _ => 0,
    }
}
