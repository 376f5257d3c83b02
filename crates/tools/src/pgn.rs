//! PGN 棋譜の逐次読み込み。
//!
//! 1局ずつヘッダと指し手列を取り出す。手数番号・コメント・変化手順・NAG・
//! 注記記号・終局記号を取り除いたあと、初期局面から指し手を再生して
//! UCI 形式（`e2e4`、`e7e8q`）に揃える。ツリーのキーもエンジンに送る手順も
//! この形式になる。

use std::collections::BTreeMap;
use std::io::{BufRead, Lines};
use std::str::FromStr;

use anyhow::Result;
use chess::{Board, ChessMove};
use otree_core::{NodeStats, OpeningTree, parse_result};

const RESULT_TOKENS: [&str; 4] = ["1-0", "0-1", "1/2-1/2", "*"];

/// 1局分の棋譜
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PgnGame {
    pub headers: BTreeMap<String, String>,
    /// UCI 形式の指し手。`invalid` のときは再生できた所までの手順。
    pub moves: Vec<String>,
    /// 初期局面から再生できなかった理由
    pub invalid: Option<String>,
}

impl PgnGame {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// 白勝ち `+1`、黒勝ち `-1`、それ以外 `0`
    pub fn result(&self) -> i32 {
        self.header("Result").map_or(0, parse_result)
    }

    /// `TimeControl` ヘッダの持ち時間（秒）。`"600+5"` なら 600。
    pub fn base_time_secs(&self) -> Option<u64> {
        let tc = self.header("TimeControl")?;
        let base = tc.split(['+', ':']).next()?.trim();
        base.parse().ok()
    }
}

/// 読み込み対象の絞り込み条件
#[derive(Debug, Clone, Copy, Default)]
pub struct GameFilter {
    /// 持ち時間の下限（秒）。指定時は持ち時間が読めない対局も除外する。
    pub min_base_time: Option<u64>,
}

impl GameFilter {
    pub fn accepts(&self, game: &PgnGame) -> bool {
        match self.min_base_time {
            None => true,
            Some(min) => game.base_time_secs().is_some_and(|base| base >= min),
        }
    }
}

/// 指し手部分の字句解析。コメントと変化手順は行をまたいで続くので状態を持つ。
#[derive(Debug, Default)]
struct MovetextLexer {
    in_comment: bool,
    variation_depth: usize,
    token: String,
}

impl MovetextLexer {
    fn at_top_level(&self) -> bool {
        !self.in_comment && self.variation_depth == 0
    }

    /// 1行を処理して指し手を `moves` に追加する。終局記号に達したら true。
    fn feed(&mut self, line: &str, moves: &mut Vec<String>) -> bool {
        let mut terminated = false;
        for c in line.chars() {
            if self.in_comment {
                if c == '}' {
                    self.in_comment = false;
                }
                continue;
            }
            match c {
                '{' => {
                    terminated |= self.flush(moves);
                    self.in_comment = true;
                }
                ';' => {
                    terminated |= self.flush(moves);
                    break;
                }
                '(' => {
                    terminated |= self.flush(moves);
                    self.variation_depth += 1;
                }
                ')' => {
                    terminated |= self.flush(moves);
                    self.variation_depth = self.variation_depth.saturating_sub(1);
                }
                c if c.is_whitespace() => terminated |= self.flush(moves),
                c => self.token.push(c),
            }
            if terminated {
                return true;
            }
        }
        self.flush(moves)
    }

    fn flush(&mut self, moves: &mut Vec<String>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        let raw = std::mem::take(&mut self.token);
        if self.variation_depth > 0 {
            return false;
        }
        if RESULT_TOKENS.contains(&raw.as_str()) {
            return true;
        }
        if let Some(mv) = strip_move(&raw) {
            moves.push(mv.to_string());
        }
        false
    }
}

/// 手数番号と注記記号を除いた指し手部分を返す。指し手が残らなければ None。
fn strip_move(token: &str) -> Option<&str> {
    if token.starts_with('$') {
        return None;
    }
    let rest = token.trim_start_matches(|c: char| c.is_ascii_digit());
    let rest = if rest.len() < token.len() && rest.starts_with('.') {
        rest.trim_start_matches('.')
    } else {
        token
    };
    let mv = rest.trim_end_matches(['!', '?']);
    (!mv.is_empty()).then_some(mv)
}

/// SAN (`Nf3`, `exd5`, `O-O`, `e8=Q+`) と UCI (`g1f3`) のどちらも受け付け、合法手に限る。
fn parse_move(board: &Board, token: &str) -> Option<ChessMove> {
    if let Some(mv) = ChessMove::from_str(token).ok().filter(|mv| board.legal(*mv)) {
        return Some(mv);
    }
    let san = match token.trim_end_matches(['+', '#']) {
        "0-0" => "O-O",
        "0-0-0" => "O-O-O",
        san => san,
    };
    ChessMove::from_san(board, san).ok().filter(|mv| board.legal(*mv))
}

/// 初期局面から指し手を再生して UCI 形式に変換する。
/// 非合法手に当たったらそこで止め、変換済みの手順と理由を返す。
fn to_uci_moves(tokens: &[String]) -> (Vec<String>, Option<String>) {
    let mut board = Board::default();
    let mut moves = Vec::with_capacity(tokens.len());
    for (ply, token) in tokens.iter().enumerate() {
        let Some(mv) = parse_move(&board, token) else {
            return (moves, Some(format!("illegal move {token} at ply {}", ply + 1)));
        };
        moves.push(mv.to_string());
        board = board.make_move_new(mv);
    }
    (moves, None)
}

/// `[Key "Value"]` 形式のヘッダ行を分解する。
fn parse_header(line: &str) -> Option<(String, String)> {
    let inner = line.strip_prefix('[')?.trim_end().strip_suffix(']')?;
    let (key, value) = inner.split_once(char::is_whitespace)?;
    let value = value.trim().strip_prefix('"')?.strip_suffix('"')?;
    Some((key.to_string(), value.replace("\\\"", "\"").replace("\\\\", "\\")))
}

/// PGN ストリームから1局ずつ取り出すイテレータ
pub struct PgnReader<R> {
    lines: Lines<R>,
    line_no: usize,
    headers: BTreeMap<String, String>,
    moves: Vec<String>,
    lexer: MovetextLexer,
}

impl<R: BufRead> PgnReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line_no: 0,
            headers: BTreeMap::new(),
            moves: Vec::new(),
            lexer: MovetextLexer::default(),
        }
    }

    fn take_game(&mut self) -> PgnGame {
        self.lexer = MovetextLexer::default();
        let headers = std::mem::take(&mut self.headers);
        let tokens = std::mem::take(&mut self.moves);
        // ツリーは初期局面から始まるので、途中局面からの対局は使えない
        if headers.contains_key("FEN") {
            return PgnGame {
                headers,
                moves: Vec::new(),
                invalid: Some("game does not start from the initial position".to_string()),
            };
        }
        let (moves, invalid) = to_uci_moves(&tokens);
        PgnGame {
            headers,
            moves,
            invalid,
        }
    }

    fn add_header(&mut self, line: &str) {
        match parse_header(line) {
            Some((key, value)) => {
                self.headers.insert(key, value);
            }
            None => log::warn!("line {}: malformed header ignored: {line}", self.line_no),
        }
    }
}

impl<R: BufRead> Iterator for PgnReader<R> {
    type Item = Result<PgnGame>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    let err = anyhow::Error::new(e).context(format!("line {}", self.line_no + 1));
                    return Some(Err(err));
                }
                None => {
                    if self.headers.is_empty() && self.moves.is_empty() {
                        return None;
                    }
                    return Some(Ok(self.take_game()));
                }
            };
            self.line_no += 1;
            let trimmed = line.trim().trim_start_matches('\u{feff}');

            if self.lexer.at_top_level() && trimmed.starts_with('[') {
                // 終局記号が無いまま次の対局のヘッダが来た
                if !self.moves.is_empty() {
                    let game = self.take_game();
                    self.add_header(trimmed);
                    return Some(Ok(game));
                }
                self.add_header(trimmed);
                continue;
            }
            if self.lexer.feed(trimmed, &mut self.moves) {
                return Some(Ok(self.take_game()));
            }
        }
    }
}

/// 読み込み件数の集計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub read: u64,
    pub inserted: u64,
    pub skipped_empty: u64,
    pub filtered: u64,
    /// 非合法手を含む、または初期局面から始まらない対局
    pub invalid: u64,
}

/// 棋譜をすべてツリーに挿入する。
pub fn insert_games<R: BufRead, S: NodeStats>(
    reader: PgnReader<R>,
    filter: &GameFilter,
    tree: &mut OpeningTree<S>,
) -> Result<LoadStats> {
    let mut stats = LoadStats::default();
    for game in reader {
        let game = game?;
        stats.read += 1;
        if let Some(reason) = &game.invalid {
            log::warn!("game {}: {reason}, skipped", stats.read);
            stats.invalid += 1;
            continue;
        }
        if game.moves.is_empty() {
            stats.skipped_empty += 1;
            continue;
        }
        if !filter.accepts(&game) {
            stats.filtered += 1;
            continue;
        }
        tree.insert_game(game.result(), &game.moves);
        stats.inserted += 1;
        if stats.inserted % 100_000 == 0 {
            log::info!("{} games inserted, {} nodes", stats.inserted, tree.len());
        }
    }
    log::debug!("{stats:?}");
    Ok(stats)
}
