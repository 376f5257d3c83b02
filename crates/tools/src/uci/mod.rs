//! UCI エンジンを子プロセスとして動かし、局面の最善手を求める。

mod engine;

pub use engine::{EngineConfig, EngineProcess, engine_factory, parse_option_name};
