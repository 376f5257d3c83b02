use std::collections::HashSet;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::{Duration, Instant};

use otree_core::error::{ConfigResult, EvalResult};
use otree_core::{EvalError, Evaluator, TreeConfig};

pub const ENGINE_READY_TIMEOUT: Duration = Duration::from_secs(30);
pub const ENGINE_QUIT_TIMEOUT: Duration = Duration::from_millis(300);
pub const ENGINE_QUIT_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// エンジンプロセス起動時の設定。
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub path: PathBuf,
    pub args: Vec<String>,
    pub threads: usize,
    pub hash_mb: u32,
    /// 追加のUCIオプション (Name=Value 形式)
    pub uci_options: Vec<String>,
    /// 思考時間を超えてから stop を送るまでの猶予（ミリ秒）
    pub timeout_margin_ms: u64,
}

impl EngineConfig {
    pub fn from_tree_config(cfg: &TreeConfig) -> ConfigResult<Self> {
        Ok(Self {
            path: cfg.require_engine()?.clone(),
            args: cfg.engine_args.clone(),
            threads: cfg.engine_threads,
            hash_mb: cfg.engine_hash_mb,
            uci_options: cfg.engine_options.clone(),
            timeout_margin_ms: cfg.timeout_margin_ms,
        })
    }
}

/// 1本のエンジンに対する入出力をカプセル化する。
pub struct EngineProcess {
    child: Child,
    stdin: BufWriter<ChildStdin>,
    rx: Receiver<String>,
    opt_names: HashSet<String>,
    timeout_margin: Duration,
    pub label: String,
}

impl EngineProcess {
    /// エンジンを起動し、`uciok` と `readyok` を待つ。失敗はすべて [`EvalError::Spawn`]。
    pub fn spawn(cfg: &EngineConfig, label: String) -> EvalResult<Self> {
        let mut child = Command::new(&cfg.path)
            .args(&cfg.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(|e| {
                EvalError::Spawn(format!("failed to spawn engine at {}: {e}", cfg.path.display()))
            })?;
        let stdin = child.stdin.take().ok_or_else(|| EvalError::Spawn("no stdin".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| EvalError::Spawn("no stdout".to_string()))?;
        let (tx, rx) = mpsc::channel::<String>();
        std::thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        let mut proc = Self {
            child,
            stdin: BufWriter::new(stdin),
            rx,
            opt_names: HashSet::new(),
            timeout_margin: Duration::from_millis(cfg.timeout_margin_ms),
            label,
        };
        proc.initialize(cfg)
            .map_err(|e| EvalError::Spawn(format!("{}: handshake failed: {e}", proc.label)))?;
        log::debug!("{}: started {}", proc.label, cfg.path.display());
        Ok(proc)
    }

    fn initialize(&mut self, cfg: &EngineConfig) -> EvalResult<()> {
        self.write_line("uci")?;
        loop {
            let line = self.recv_line(ENGINE_READY_TIMEOUT)?;
            if let Some(rest) = line.strip_prefix("option ") {
                if let Some(name) = parse_option_name(rest) {
                    self.opt_names.insert(name);
                }
            } else if line == "uciok" {
                break;
            }
        }
        self.set_option_if_available("Threads", &cfg.threads.to_string())?;
        self.set_option_if_available("Hash", &cfg.hash_mb.to_string())?;
        for opt in &cfg.uci_options {
            if let Some((name, value)) = opt.split_once('=') {
                self.set_option_if_available(name.trim(), value.trim())?;
            } else {
                // "=" がない場合はボタン型オプションとみなし、値なしで送る
                self.write_line(&format!("setoption name {}", opt.trim()))?;
            }
        }
        self.sync_ready()?;
        self.write_line("ucinewgame")?;
        Ok(())
    }

    /// 初期局面から `moves` を指した局面を `movetime_ms` だけ考えさせ、最善手を返す。
    pub fn search(&mut self, moves: &[String], movetime_ms: u64) -> EvalResult<String> {
        self.sync_ready()?;
        self.write_line(&position_command(moves))?;
        self.write_line(&format!("go movetime {movetime_ms}"))?;

        let start = Instant::now();
        let soft_limit = Duration::from_millis(movetime_ms) + self.timeout_margin;
        let hard_limit = soft_limit + self.timeout_margin;
        let mut stop_sent = false;

        loop {
            let elapsed = start.elapsed();
            let deadline = if stop_sent { hard_limit } else { soft_limit };
            if elapsed >= deadline {
                if !stop_sent {
                    log::debug!("{}: no bestmove after {elapsed:?}, sending stop", self.label);
                    self.write_line("stop")?;
                    stop_sent = true;
                    continue;
                }
                return Err(EvalError::Timeout {
                    elapsed_ms: duration_to_millis(elapsed),
                });
            }

            match self.rx.recv_timeout(deadline - elapsed) {
                Ok(line) => {
                    if let Some(rest) = line.strip_prefix("bestmove") {
                        return parse_bestmove(rest);
                    }
                    log::trace!("{}: {line}", self.label);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => return Err(EvalError::Disconnected),
            }
        }
    }

    pub fn sync_ready(&mut self) -> EvalResult<()> {
        self.write_line("isready")?;
        loop {
            if self.recv_line(ENGINE_READY_TIMEOUT)? == "readyok" {
                return Ok(());
            }
        }
    }

    pub fn recv_line(&self, timeout: Duration) -> EvalResult<String> {
        self.rx.recv_timeout(timeout).map_err(|e| match e {
            RecvTimeoutError::Timeout => EvalError::Timeout {
                elapsed_ms: duration_to_millis(timeout),
            },
            RecvTimeoutError::Disconnected => EvalError::Disconnected,
        })
    }

    pub fn set_option_if_available(&mut self, name: &str, value: &str) -> EvalResult<()> {
        if self.opt_names.is_empty() || self.opt_names.contains(name) {
            self.write_line(&format!("setoption name {name} value {value}"))?;
        } else {
            log::debug!("{}: option {name} not supported, skipped", self.label);
        }
        Ok(())
    }

    pub fn write_line(&mut self, msg: &str) -> EvalResult<()> {
        self.stdin.write_all(msg.as_bytes())?;
        self.stdin.write_all(b"\n")?;
        self.stdin.flush()?;
        Ok(())
    }
}

impl Evaluator for EngineProcess {
    fn best_move(&mut self, moves: &[String], time_ms: u64) -> EvalResult<String> {
        self.search(moves, time_ms)
    }
}

impl Drop for EngineProcess {
    fn drop(&mut self) {
        let _ = self.write_line("quit");
        let deadline = Instant::now() + ENGINE_QUIT_TIMEOUT;
        while Instant::now() < deadline {
            if let Ok(Some(_)) = self.child.try_wait() {
                return;
            }
            std::thread::sleep(ENGINE_QUIT_POLL_INTERVAL);
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// ワーカーごとにエンジンを1本起動するファクトリ。
pub fn engine_factory(
    cfg: &EngineConfig,
) -> impl Fn(usize) -> EvalResult<Box<dyn Evaluator>> + Sync + '_ {
    move |index| {
        let engine = EngineProcess::spawn(cfg, format!("engine#{index}"))?;
        Ok(Box::new(engine) as Box<dyn Evaluator>)
    }
}

fn position_command(moves: &[String]) -> String {
    if moves.is_empty() {
        "position startpos".to_string()
    } else {
        format!("position startpos moves {}", moves.join(" "))
    }
}

fn parse_bestmove(rest: &str) -> EvalResult<String> {
    match rest.split_whitespace().next() {
        None => Err(EvalError::Protocol("empty bestmove".to_string())),
        Some(mv @ ("(none)" | "0000")) => Err(EvalError::Protocol(format!("no legal move: {mv}"))),
        Some(mv) => Ok(mv.to_string()),
    }
}

pub fn parse_option_name(line: &str) -> Option<String> {
    let parts: Vec<&str> = line
        .split_whitespace()
        .skip_while(|tok| *tok != "name")
        .skip(1)
        .take_while(|tok| *tok != "type")
        .collect();
    (!parts.is_empty()).then(|| parts.join(" "))
}

fn duration_to_millis(d: Duration) -> u64 {
    d.as_millis().try_into().unwrap_or(u64::MAX)
}
