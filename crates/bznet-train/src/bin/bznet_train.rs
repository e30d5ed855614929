//! bznet 学習ツール
//!
//! - `train`: JSONL の教師データから学習し、エポックごとに `.nnue` を保存する
//! - `inspect`: ネットワークファイルのヘッダを表示する
//! - `eval`: 特徴量リストに対する予測値を表示する

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use bznet::Network;
use bznet::codec::{file_size, read_header};
use bznet_train::config::{ConfigOverrides, TrainConfig, load_config_file};
use bznet_train::dataset::Dataset;
use bznet_train::trainer::Trainer;
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "bznet_train", version)]
#[command(about = "Train and inspect bznet evaluator networks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 教師データから学習する
    Train(TrainArgs),
    /// ネットワークファイルのヘッダを表示する
    Inspect {
        /// ネットワークファイル
        network: PathBuf,
    },
    /// 特徴量リストを評価する
    Eval {
        /// ネットワークファイル
        network: PathBuf,
        /// アクティブな特徴量（カンマ区切り）
        #[arg(long, value_delimiter = ',', num_args = 0..)]
        features: Vec<u16>,
    },
}

#[derive(Args, Debug)]
struct TrainArgs {
    /// 教師データ（JSONL、gzip 可）
    #[arg(short, long)]
    input: PathBuf,

    /// 出力ディレクトリ
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// 設定ファイル（JSON/YAML）。CLI 引数が優先される
    #[arg(long)]
    config: Option<PathBuf>,

    /// 既存ネットワークから再開
    #[arg(long)]
    resume: Option<PathBuf>,

    /// 入力次元
    #[arg(long)]
    inputs: Option<u32>,

    /// 出力次元
    #[arg(long)]
    outputs: Option<u32>,

    /// 隠れ層の幅（カンマ区切り）
    #[arg(long, value_delimiter = ',')]
    hidden: Option<Vec<u32>>,

    /// ネットワークID
    #[arg(long)]
    id: Option<u32>,

    #[arg(long)]
    epochs: Option<usize>,

    #[arg(long)]
    batch_size: Option<usize>,

    #[arg(long)]
    threads: Option<usize>,

    /// 学習率
    #[arg(long)]
    lr: Option<f32>,

    /// 勝敗ラベルの重み（0..=1）
    #[arg(long)]
    wdl_weight: Option<f32>,

    /// 評価値→勝率変換のスケール
    #[arg(long)]
    sigmoid_scale: Option<f32>,

    #[arg(long)]
    seed: Option<u64>,
}

impl TrainArgs {
    fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            inputs: self.inputs,
            outputs: self.outputs,
            hidden: self.hidden.clone(),
            network_id: self.id,
            epochs: self.epochs,
            batch_size: self.batch_size,
            threads: self.threads,
            learning_rate: self.lr,
            sigmoid_scale: self.sigmoid_scale,
            wdl_weight: self.wdl_weight,
            seed: self.seed,
            output_dir: self.output_dir.clone(),
        }
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();

    match Cli::parse().command {
        Command::Train(args) => train(args),
        Command::Inspect { network } => inspect(&network),
        Command::Eval { network, features } => eval(&network, &features),
    }
}

fn train(args: TrainArgs) -> Result<()> {
    let mut config = TrainConfig::default();
    if let Some(path) = &args.config {
        config.merge(load_config_file(path)?);
    }
    config.merge(args.overrides());
    config.validate()?;

    let mut trainer = match &args.resume {
        Some(path) => {
            info!("Resuming from {}", path.display());
            let network = Network::load_from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            Trainer::with_network(config, network)?
        }
        None => Trainer::new(config)?,
    };

    let inputs = trainer.network().topology().inputs();
    let (dataset, stats) = Dataset::load(&args.input, inputs)?;
    info!("Loaded {} samples from {}", stats.loaded, args.input.display());
    if stats.skipped > 0 {
        warn!("Skipped {} malformed lines", stats.skipped);
    }
    if dataset.is_empty() {
        bail!("no usable samples in {}", args.input.display());
    }

    trainer.install_interrupt_handler();

    let reports = trainer.run(&dataset)?;
    if let Some(last) = reports.last() {
        info!("Final network: {}", last.checkpoint.display());
    }
    Ok(())
}

fn inspect(path: &Path) -> Result<()> {
    let mut file = std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let (id, topology) = read_header(&mut file)?;
    let actual = file.metadata()?.len();

    println!("id:         {id}");
    println!("topology:   {topology}");
    println!("layers:     {}", topology.layer_count());
    match topology.parameter_count() {
        Some(n) => println!("parameters: {n}"),
        None => println!("parameters: overflow"),
    }
    match file_size(&topology) {
        Some(expected) if expected == actual => println!("file size:  {actual} bytes"),
        Some(expected) => println!("file size:  {actual} bytes (expected {expected})"),
        None => println!("file size:  {actual} bytes"),
    }
    Ok(())
}

fn eval(path: &Path, features: &[u16]) -> Result<()> {
    let mut network =
        Network::load_from_file(path).with_context(|| format!("Failed to load {}", path.display()))?;
    let topology = network.topology();
    if topology.outputs() != 1 {
        bail!("eval needs a single-output network, got {}", topology.outputs());
    }
    if let Some(&bad) = features.iter().find(|&&f| u32::from(f) >= topology.inputs()) {
        bail!("feature index {bad} exceeds network input width {}", topology.inputs());
    }
    println!("{:.6}", network.predict(features));
    Ok(())
}
