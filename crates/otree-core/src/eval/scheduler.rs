//! フロンティアノードをワーカープールで評価する。
//!
//! コーディネータがタスク（ノード ID とルートからの手順）をキューに積み、
//! `concurrency` 本のワーカーがそれぞれ自分専用の評価器で処理する。
//! 結果はコーディネータがバッファし、全ワーカーの join 後に単一スレッドでツリーへ書き戻す。

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbeam_channel as chan;

use super::{Evaluator, EvaluatorFactory};
use crate::error::{EvalError, EvalResult};
use crate::stats::EngineStats;
use crate::tree::{NodeId, OpeningTree};

#[derive(Default, Clone)]
pub struct EvalOptions {
    /// セットされるとワーカーは新しいタスクを取らずに終了する
    pub shutdown: Option<Arc<AtomicBool>>,
}

/// 評価に失敗したノード。ノードは未評価のまま残る。
#[derive(Debug)]
pub struct EvalFailure {
    pub path: Vec<String>,
    pub error: EvalError,
}

#[derive(Debug, Default)]
pub struct EvalReport {
    /// フロンティアとして投入したノード数
    pub scheduled: usize,
    /// 評価が書き込まれたノード数
    pub evaluated: usize,
    /// シャットダウンにより処理されなかったノード数
    pub skipped: usize,
    pub failures: Vec<EvalFailure>,
}

impl EvalReport {
    pub fn is_complete(&self) -> bool {
        self.evaluated == self.scheduled
    }
}

/// タスク1件の完了通知。コーディネータスレッドで呼ばれる。
pub struct EvalProgress<'a> {
    pub done: usize,
    pub total: usize,
    pub path: &'a [String],
    pub result: &'a EvalResult<String>,
}

pub type ProgressCallback<'a> = dyn FnMut(&EvalProgress<'_>) + 'a;

struct Task {
    id: NodeId,
    path: Vec<String>,
}

struct TaskResult {
    task: Task,
    result: EvalResult<String>,
}

/// フロンティア全体を評価してツリーに書き戻す。
///
/// 1ノードの失敗はそのノードを未評価のまま残して [`EvalReport::failures`] に記録する。
pub fn evaluate(
    tree: &mut OpeningTree<EngineStats>,
    factory: &EvaluatorFactory<'_>,
    options: &EvalOptions,
    progress: Option<&mut ProgressCallback<'_>>,
) -> EvalReport {
    let frontier = tree.frontier();
    let mut report = EvalReport {
        scheduled: frontier.len(),
        ..EvalReport::default()
    };
    if frontier.is_empty() {
        return report;
    }

    let time_ms = tree.config().time_per_node_ms;
    let workers = tree.config().concurrency.clamp(1, frontier.len());
    let total = frontier.len();

    // タスクを全件積んでから送信側を閉じる。空になったキューは recv が Err を返す
    let (task_tx, task_rx) = chan::unbounded::<Task>();
    for id in frontier {
        tree.node_mut(id).stats.mark_scheduled();
        let path = tree.path_from_root(id);
        let _ = task_tx.send(Task { id, path });
    }
    drop(task_tx);

    log::info!("evaluating {total} nodes with {workers} workers ({time_ms}ms per node)");

    let (result_tx, result_rx) = chan::unbounded::<TaskResult>();
    let mut results: Vec<TaskResult> = Vec::with_capacity(total);
    let mut progress = progress;

    thread::scope(|scope| {
        for index in 0..workers {
            let rx = task_rx.clone();
            let tx = result_tx.clone();
            let shutdown = options.shutdown.clone();
            scope.spawn(move || worker_main(index, factory, time_ms, rx, tx, shutdown));
        }
        // コーディネータは result_tx を持たないので drop
        drop(result_tx);

        for result in result_rx.iter() {
            if let Some(cb) = progress.as_mut() {
                cb(&EvalProgress {
                    done: results.len() + 1,
                    total,
                    path: &result.task.path,
                    result: &result.result,
                });
            }
            results.push(result);
        }
    });

    // 全ワーカー終了後に書き戻す
    for TaskResult { task, result } in results {
        match result {
            Ok(best) => {
                let applied = tree.node_mut(task.id).stats.set_evaluation(best);
                debug_assert!(applied, "frontier node evaluated twice");
                report.evaluated += 1;
            }
            Err(error) => {
                log::warn!("evaluation failed at [{}]: {error}", task.path.join(" "));
                tree.node_mut(task.id).stats.clear_scheduled();
                report.failures.push(EvalFailure {
                    path: task.path,
                    error,
                });
            }
        }
    }

    // キューに残ったタスク: シャットダウン、または評価器を1つも起動できなかった
    let stopped = options.shutdown.as_ref().is_some_and(|s| s.load(Ordering::Relaxed));
    for task in task_rx.try_iter() {
        tree.node_mut(task.id).stats.clear_scheduled();
        if stopped {
            report.skipped += 1;
        } else {
            report.failures.push(EvalFailure {
                path: task.path,
                error: EvalError::Spawn("no evaluator could be started".to_string()),
            });
        }
    }

    log::info!(
        "evaluation finished: {} evaluated, {} failed, {} skipped",
        report.evaluated,
        report.failures.len(),
        report.skipped
    );
    report
}

fn worker_main(
    index: usize,
    factory: &EvaluatorFactory<'_>,
    time_ms: u64,
    rx: chan::Receiver<Task>,
    tx: chan::Sender<TaskResult>,
    shutdown: Option<Arc<AtomicBool>>,
) {
    let mut evaluator: Box<dyn Evaluator> = match factory(index) {
        Ok(evaluator) => evaluator,
        Err(e) => {
            log::warn!("worker {index}: {e}");
            return;
        }
    };

    loop {
        if shutdown.as_ref().is_some_and(|s| s.load(Ordering::Relaxed)) {
            break;
        }
        let Ok(task) = rx.recv() else {
            break;
        };
        let result = evaluator.best_move(&task.path, time_ms);
        let restart = result.as_ref().is_err_and(EvalError::needs_restart);
        if tx.send(TaskResult { task, result }).is_err() {
            break;
        }
        if restart {
            log::debug!("worker {index}: restarting evaluator");
            // 古いプロセスを先に終了させてから作り直す
            drop(evaluator);
            evaluator = match factory(index) {
                Ok(evaluator) => evaluator,
                Err(e) => {
                    log::warn!("worker {index}: {e}");
                    return;
                }
            };
        }
    }
}
