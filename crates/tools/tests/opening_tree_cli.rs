use assert_cmd::prelude::*;
use serde_json::{Value, json};
use std::fs;
use std::path::Path;
use std::process::Command;

const GAMES: &str = r#"[Event "A"]
[Result "1-0"]
1. e2e4 e7e5 2. g1f3 1-0

[Event "B"]
[Result "1-0"]
1. e2e4 e7e5 2. f1c4 1-0

[Event "C"]
[Result "1/2-1/2"]
1. e2e4 c7c5 1/2-1/2

[Event "D"]
[Result "0-1"]
1. d2d4 d7d5 0-1
"#;

fn write_games(dir: &Path) -> std::path::PathBuf {
    let pgn = dir.join("games.pgn");
    fs::write(&pgn, GAMES).unwrap();
    pgn
}

fn read_output(path: &Path) -> Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn builds_score_tree() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_games(dir.path());
    let out = dir.path().join("tree.json");

    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .args(["--max-depth", "2", "--node-cut-off", "0", "--eval-cut-off", "0"])
        .arg(&out)
        .assert()
        .success();

    let mut tree = read_output(&out);
    let values = tree.as_object_mut().unwrap().remove("values").unwrap();
    assert_eq!(values["pgn"], json!(pgn.display().to_string()));
    assert_eq!(values["max_depth"], json!(2));
    // 白番は平均最大 (e2e4: +2/3)、黒番は平均最小 (c7c5: 0 < e7e5: +1)
    assert_eq!(
        tree,
        json!({
            "best": "e2e4",
            "e2e4": {"best": "c7c5"},
            "d2d4": {"best": "d7d5"}
        })
    );
}

#[test]
fn config_file_is_layered_under_flags() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_games(dir.path());
    let config = dir.path().join("tree.toml");
    fs::write(
        &config,
        "max_depth = 1\nnode_cut_off = 0\neval_cut_off = 0\ndebug = true\n",
    )
    .unwrap();
    let out = dir.path().join("tree.json.gz");

    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .arg("--config")
        .arg(&config)
        .args(["--eval-cut-off", "1"])
        .arg(&out)
        .assert()
        .success();

    let decoder = flate2::read::GzDecoder::new(fs::File::open(&out).unwrap());
    let tree: Value = serde_json::from_reader(decoder).unwrap();
    assert_eq!(tree["best"], json!("e2e4"));
    assert_eq!(tree["count"], json!(4));
    assert_eq!(tree["values"]["max_depth"], json!(1));
    assert_eq!(tree["values"]["eval_cut_off"], json!(1));
    assert_eq!(tree["values"]["debug"], json!(true));
}

#[test]
fn missing_pgn_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg(dir.path().join("tree.json"))
        .assert()
        .code(3);
}

#[test]
fn evaluate_without_engine_is_a_config_error() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_games(dir.path());
    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .arg("--evaluate")
        .arg(dir.path().join("tree.json"))
        .assert()
        .code(3);
}

#[test]
fn unreadable_pgn_is_a_runtime_error() {
    let dir = tempfile::tempdir().unwrap();
    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(dir.path().join("missing.pgn"))
        .arg(dir.path().join("tree.json"))
        .assert()
        .code(1);
}

#[test]
fn engine_in_config_file_enables_evaluation() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_games(dir.path());
    let config = dir.path().join("tree.toml");
    fs::write(&config, "engine = \"/nonexistent/engine\"\nengine_cut_off = 0\n").unwrap();
    let out = dir.path().join("tree.json");

    // 評価モードに入り、エンジンを起動できずに失敗する
    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .arg("--config")
        .arg(&config)
        .arg("--quiet")
        .arg(&out)
        .assert()
        .code(1);

    // 評価に入る前の見積もりだけなら成功し、何も書き出さない
    let estimate_out = dir.path().join("estimate.json");
    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .arg("--config")
        .arg(&config)
        .arg("--estimate-only")
        .arg(&estimate_out)
        .assert()
        .success();
    assert!(!estimate_out.exists());
}

#[test]
fn illegal_games_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = dir.path().join("games.pgn");
    fs::write(&pgn, "1. e4 e5 1-0\n\n1. e4 Ke7 0-1\n").unwrap();
    let out = dir.path().join("tree.json");

    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .args(["--node-cut-off", "0", "--eval-cut-off", "0"])
        .arg(&out)
        .assert()
        .success();

    let mut tree = read_output(&out);
    tree.as_object_mut().unwrap().remove("values");
    assert_eq!(tree, json!({"best": "e2e4", "e2e4": {"best": "e7e5"}}));
}

#[cfg(unix)]
const FAKE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name fake"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "position startpos") reply="e2e4" ;;
    position*) reply="a7a6" ;;
    go*) echo "bestmove $reply" ;;
    quit) exit 0 ;;
  esac
done
"#;

#[cfg(unix)]
#[test]
fn evaluates_and_resumes_with_engine() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = write_games(dir.path());
    let script = dir.path().join("engine.sh");
    fs::write(&script, FAKE_ENGINE).unwrap();
    let out = dir.path().join("tree.json");

    let run = |resume: bool| {
        let mut cmd = Command::cargo_bin("opening_tree").unwrap();
        cmd.arg("--pgn")
            .arg(&pgn)
            .args(["--engine", "/bin/sh", "--engine-arg"])
            .arg(&script)
            .args(["--max-depth", "2", "--node-cut-off", "0", "--engine-cut-off", "1"])
            .args(["--time-per-node", "10", "--concurrency", "2", "--quiet"]);
        if resume {
            cmd.arg("--resume").arg(&out);
        }
        cmd.arg(&out).assert().success();
        read_output(&out)
    };

    // engine-cut-off 1: root(4), e2e4(3), e2e4 e7e5(2) が評価対象。
    // d2d4 は未評価だが子を持つので best なしで出力される
    let mut first = run(false);
    first.as_object_mut().unwrap().remove("values");
    assert_eq!(
        first,
        json!({
            "best": "e2e4",
            "e2e4": {
                "best": "a7a6",
                "e7e5": {"best": "a7a6"}
            },
            "d2d4": {}
        })
    );

    let mut second = run(true);
    second.as_object_mut().unwrap().remove("values");
    assert_eq!(second, first);
}

/// 初期局面からの手順に応じて主手順 e2e4 e7e5 g1f3 を返し、想定外の局面では 0000
#[cfg(unix)]
const MAIN_LINE_ENGINE: &str = r#"
while read -r line; do
  case "$line" in
    uci) echo "id name fake"; echo "uciok" ;;
    isready) echo "readyok" ;;
    "position startpos") reply="e2e4" ;;
    "position startpos moves e2e4") reply="e7e5" ;;
    "position startpos moves e2e4 e7e5") reply="g1f3" ;;
    position*) reply="0000" ;;
    go*) echo "bestmove $reply" ;;
    quit) exit 0 ;;
  esac
done
"#;

#[cfg(unix)]
#[test]
fn san_games_reach_the_engine_as_uci() {
    let dir = tempfile::tempdir().unwrap();
    let pgn = dir.path().join("games.pgn");
    fs::write(
        &pgn,
        "[Result \"1-0\"]\n1. e4 e5 2. Nf3 Nc6 1-0\n\n[Result \"0-1\"]\n1. e4 e5 2. Bc4 0-1\n",
    )
    .unwrap();
    let script = dir.path().join("engine.sh");
    fs::write(&script, MAIN_LINE_ENGINE).unwrap();
    let out = dir.path().join("tree.json");

    Command::cargo_bin("opening_tree")
        .unwrap()
        .arg("--pgn")
        .arg(&pgn)
        .args(["--engine", "/bin/sh", "--engine-arg"])
        .arg(&script)
        .args(["--max-depth", "2", "--node-cut-off", "0", "--engine-cut-off", "1"])
        .args(["--time-per-node", "10", "--quiet"])
        .arg(&out)
        .assert()
        .success();

    let mut tree = read_output(&out);
    tree.as_object_mut().unwrap().remove("values");
    assert_eq!(
        tree,
        json!({
            "best": "e2e4",
            "e2e4": {
                "best": "e7e5",
                "e7e5": {"best": "g1f3"}
            }
        })
    );
}
