//! PGN 読み込み、UCI エンジン駆動、出力ファイルの読み書き。
//!
//! コアのツリー処理は `otree_core` にあり、この crate は外部とのやり取りだけを受け持つ。

pub mod artifact;
pub mod common;
pub mod pgn;
pub mod uci;
