//! 学習ループ
//!
//! エポックごとにサンプルを選び、バッチ単位で勾配を累積してから適用する。
//! 複数スレッドの場合は各ワーカーが自分の [`Workspace`] に累積し、
//! バッチ末尾で順番にネットワークへ反映する。

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};
use bznet::{CostFunction, Network, Workspace};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::config::TrainConfig;
use crate::dataset::Dataset;
use crate::sampler::{epoch_sample_size, select_epoch_sample};

/// 中断時に保存するファイル名
pub const INTERRUPTED_FILE: &str = "interrupted.nnue";

/// 1エポックの結果
#[derive(Debug, Clone, PartialEq)]
pub struct EpochReport {
    pub epoch: usize,
    /// 学習に使ったサンプル数
    pub samples: usize,
    /// validation cost の合計
    pub total_cost: f64,
    /// validation cost の平均
    pub mean_cost: f64,
    pub elapsed: Duration,
    /// 保存したネットワークのパス
    pub checkpoint: PathBuf,
    /// 途中で中断されたか
    pub interrupted: bool,
}

/// トレーナー
pub struct Trainer {
    config: TrainConfig,
    network: Network,
    cost: CostFunction,
    rng: ChaCha8Rng,
    interrupted: Arc<AtomicBool>,
    workers: Vec<Workspace>,
    pool: Option<rayon::ThreadPool>,
}

impl Trainer {
    /// 設定からランダム初期化したネットワークで作成
    pub fn new(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        let mut rng = seeded_rng(config.seed);
        let network = Network::new(config.topology()?, config.network_id, &mut rng);
        Self::build(config, network, rng)
    }

    /// 既存ネットワークから再開する。トポロジーはネットワーク側を優先する。
    pub fn with_network(config: TrainConfig, network: Network) -> Result<Self> {
        config.validate()?;
        if config.topology()? != *network.topology() {
            warn!(
                "Config topology {} ignored; resuming with {}",
                config.topology()?,
                network.topology()
            );
        }
        let rng = seeded_rng(config.seed);
        Self::build(config, network, rng)
    }

    fn build(config: TrainConfig, network: Network, rng: ChaCha8Rng) -> Result<Self> {
        if network.topology().outputs() != 1 {
            bail!("training needs a single output, got {}", network.topology().outputs());
        }
        let network = network.with_learning_rate(config.learning_rate)?;
        let cost = config.cost()?;

        let (workers, pool) = if config.threads > 1 {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(config.threads)
                .build()
                .context("Failed to build worker pool")?;
            let workers = (0..config.threads).map(|_| network.workspace()).collect();
            (workers, Some(pool))
        } else {
            (Vec::new(), None)
        };

        Ok(Self {
            config,
            network,
            cost,
            rng,
            interrupted: Arc::new(AtomicBool::new(false)),
            workers,
            pool,
        })
    }

    /// 中断フラグを取得
    pub fn interrupted(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupted)
    }

    /// Ctrl-C で中断フラグを立てるハンドラを登録する。
    ///
    /// 登録に失敗した場合（既に別のハンドラがある等）は警告を出して `false` を返す。
    pub fn install_interrupt_handler(&self) -> bool {
        let interrupted = self.interrupted();
        match ctrlc::set_handler(move || {
            eprintln!("\nInterrupted, saving after the current batch...");
            interrupted.store(true, Ordering::SeqCst);
        }) {
            Ok(()) => true,
            Err(e) => {
                warn!("Ctrl-C handler not installed, interruption disabled: {e}");
                false
            }
        }
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn into_network(self) -> Network {
        self.network
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    /// エポック `epoch` のチェックポイントのパス
    pub fn checkpoint_path(&self, epoch: usize) -> PathBuf {
        self.config.output_dir.join(format!("epoch-{epoch}.nnue"))
    }

    /// 学習を実行
    pub fn run(&mut self, dataset: &Dataset) -> Result<Vec<EpochReport>> {
        let per_epoch = epoch_sample_size(dataset.len(), self.config.epochs);
        if per_epoch == 0 {
            bail!(
                "dataset has {} samples, fewer than the {} epochs requested",
                dataset.len(),
                self.config.epochs
            );
        }
        if let Some(&bad) = dataset
            .samples()
            .iter()
            .flat_map(|s| s.features.iter())
            .find(|&&f| u32::from(f) >= self.network.topology().inputs())
        {
            bail!("feature index {bad} exceeds network input width {}", self.network.topology().inputs());
        }
        std::fs::create_dir_all(&self.config.output_dir).with_context(|| {
            format!("Failed to create output directory {}", self.config.output_dir.display())
        })?;

        info!("Training network {} ({})", self.network.id(), self.network.topology());
        info!("  Samples: {} ({per_epoch} per epoch)", dataset.len());
        info!("  Epochs: {}", self.config.epochs);
        info!("  Batch size: {}", self.config.batch_size.unwrap_or(per_epoch));
        info!("  Threads: {}", self.config.threads);
        info!("  Learning rate: {}", self.network.learning_rate());

        let mut reports = Vec::with_capacity(self.config.epochs);
        for epoch in 0..self.config.epochs {
            if self.interrupted.load(Ordering::SeqCst) {
                self.save_snapshot(self.config.output_dir.join(INTERRUPTED_FILE))?;
                break;
            }
            info!("Starting epoch {epoch} at {}", Utc::now().to_rfc3339());
            let report = self.train_epoch(dataset, epoch)?;
            info!(
                "Epoch {}/{}: total_cost={:.6}, mean_cost={:.6}, samples={}, elapsed={:.1}s",
                epoch + 1,
                self.config.epochs,
                report.total_cost,
                report.mean_cost,
                report.samples,
                report.elapsed.as_secs_f64()
            );
            let stop = report.interrupted;
            reports.push(report);
            if stop {
                break;
            }
        }
        Ok(reports)
    }

    /// 1エポックの学習
    fn train_epoch(&mut self, dataset: &Dataset, epoch: usize) -> Result<EpochReport> {
        let started = Instant::now();
        let indices = select_epoch_sample(dataset.len(), self.config.epochs, &mut self.rng);
        let batch_size = self.config.batch_size.unwrap_or(indices.len()).max(1);
        let num_batches = indices.len().div_ceil(batch_size);

        let progress = ProgressBar::new(num_batches as u64);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} cost:{msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );

        let mut total_cost = 0.0f64;
        let mut samples = 0usize;
        let mut interrupted = false;

        for batch in indices.chunks(batch_size) {
            if self.interrupted.load(Ordering::SeqCst) {
                interrupted = true;
                break;
            }
            total_cost += self.train_batch(dataset, batch);
            samples += batch.len();
            progress.set_message(format!("{:.6}", total_cost / samples as f64));
            progress.inc(1);
        }
        progress.finish();

        let checkpoint = if interrupted {
            warn!("Interrupted during epoch {epoch}");
            self.save_snapshot(self.config.output_dir.join(INTERRUPTED_FILE))?
        } else {
            self.save_snapshot(self.checkpoint_path(epoch))?
        };

        Ok(EpochReport {
            epoch,
            samples,
            total_cost,
            mean_cost: if samples > 0 { total_cost / samples as f64 } else { 0.0 },
            elapsed: started.elapsed(),
            checkpoint,
            interrupted,
        })
    }

    fn save_snapshot(&self, path: PathBuf) -> Result<PathBuf> {
        self.network
            .save_to_file(&path)
            .with_context(|| format!("Failed to save {}", path.display()))?;
        info!("Saved {}", path.display());
        Ok(path)
    }

    /// バッチを学習して勾配を適用する。validation cost の合計を返す。
    fn train_batch(&mut self, dataset: &Dataset, batch: &[usize]) -> f64 {
        let Some(pool) = self.pool.as_ref() else {
            let mut total = 0.0f64;
            for &i in batch {
                let s = dataset.get(i);
                total += f64::from(self.network.train(&s.features, s.eval, s.wdl, &self.cost));
            }
            self.network.apply_gradients();
            return total;
        };

        let chunk = batch.len().div_ceil(self.workers.len()).max(1);
        let params = self.network.parameters();
        let cost = &self.cost;
        let workers = &mut self.workers;

        let total = pool.install(|| {
            workers
                .par_iter_mut()
                .zip(batch.par_chunks(chunk))
                .map(|(ws, part)| {
                    part.iter()
                        .map(|&i| {
                            let s = dataset.get(i);
                            f64::from(ws.train(params, &s.features, s.eval, s.wdl, cost))
                        })
                        .sum::<f64>()
                })
                .sum::<f64>()
        });

        // 適用は逐次
        for ws in &mut self.workers {
            self.network.apply_workspace_gradients(ws);
        }
        total
    }
}

fn seeded_rng(seed: Option<u64>) -> ChaCha8Rng {
    match seed {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_os_rng(),
    }
}
