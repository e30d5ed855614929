//! bznet 学習ドライバ
//!
//! JSONL の教師データを読み込み、エポックごとにサンプルを選んで
//! [`bznet::Network`] を学習する。
//!
//! # 構成
//! - `config`: 学習設定（既定値・設定ファイル・CLI のマージ）
//! - `dataset`: 教師データの読み込み
//! - `sampler`: エポックごとのサンプル選択
//! - `trainer`: 学習ループ（逐次 / rayon 並列）

pub mod config;
pub mod dataset;
pub mod sampler;
pub mod trainer;

pub use config::{ConfigError, ConfigOverrides, TrainConfig};
pub use dataset::{Dataset, DatasetError, LoadStats, Sample};
pub use trainer::{EpochReport, Trainer};
