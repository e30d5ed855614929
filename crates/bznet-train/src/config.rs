//! 学習設定
//!
//! 既定値 → 設定ファイル（JSON/YAML）→ CLI 引数の順に上書きする。

use std::path::{Path, PathBuf};

use bznet::cost::{DEFAULT_SIGMOID_SCALE, DEFAULT_WDL_WEIGHT};
use bznet::{CostFunction, DEFAULT_LEARNING_RATE, NetworkError, Topology};
use serde::{Deserialize, Serialize};

/// 設定の読み込み・検証エラー
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error(transparent)]
    Network(#[from] NetworkError),
}

/// 学習設定
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainConfig {
    /// 入力特徴量の次元数
    pub inputs: u32,
    /// 出力次元（評価値1つ）
    pub outputs: u32,
    /// 隠れ層の幅
    pub hidden: Vec<u32>,
    /// ネットワークID（ファイルに記録される）
    pub network_id: u32,
    /// エポック数
    pub epochs: usize,
    /// バッチサイズ（None ならエポック全体で1バッチ）
    pub batch_size: Option<usize>,
    /// ワーカースレッド数
    pub threads: usize,
    /// 学習率
    pub learning_rate: f32,
    /// 評価値→勝率変換のスケール
    pub sigmoid_scale: f32,
    /// 勝敗ラベルの重み
    pub wdl_weight: f32,
    /// シード値（None なら OS 乱数）
    pub seed: Option<u64>,
    /// 出力ディレクトリ
    pub output_dir: PathBuf,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            inputs: 768,
            outputs: 1,
            hidden: vec![256],
            network_id: 1,
            epochs: 10,
            batch_size: None,
            threads: 1,
            learning_rate: DEFAULT_LEARNING_RATE,
            sigmoid_scale: DEFAULT_SIGMOID_SCALE,
            wdl_weight: DEFAULT_WDL_WEIGHT,
            seed: None,
            output_dir: PathBuf::from("."),
        }
    }
}

/// 部分的な上書き値（設定ファイル・CLI 共通）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub inputs: Option<u32>,
    #[serde(default)]
    pub outputs: Option<u32>,
    #[serde(default)]
    pub hidden: Option<Vec<u32>>,
    #[serde(default)]
    pub network_id: Option<u32>,
    #[serde(default)]
    pub epochs: Option<usize>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub threads: Option<usize>,
    #[serde(default)]
    pub learning_rate: Option<f32>,
    #[serde(default)]
    pub sigmoid_scale: Option<f32>,
    #[serde(default)]
    pub wdl_weight: Option<f32>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

/// 拡張子で JSON / YAML を判定して読み込む。不明な拡張子は両方試す。
pub fn load_config_file<P: AsRef<Path>>(path: P) -> Result<ConfigOverrides, ConfigError> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let parse_err = |message: String| ConfigError::Parse {
        path: path.to_path_buf(),
        message,
    };

    let ext = path.extension().and_then(|s| s.to_str()).map(|s| s.to_ascii_lowercase());
    match ext.as_deref() {
        Some("yaml") | Some("yml") => serde_yaml::from_str(&data).map_err(|e| parse_err(e.to_string())),
        Some("json") => serde_json::from_str(&data).map_err(|e| parse_err(e.to_string())),
        _ => serde_json::from_str(&data)
            .or_else(|_| serde_yaml::from_str(&data))
            .map_err(|e| parse_err(e.to_string())),
    }
}

impl TrainConfig {
    /// `Some` の値だけを上書きする。
    pub fn merge(&mut self, o: ConfigOverrides) {
        macro_rules! take {
            ($name:ident) => {
                if let Some(v) = o.$name {
                    self.$name = v;
                }
            };
        }
        take!(inputs);
        take!(outputs);
        take!(hidden);
        take!(network_id);
        take!(epochs);
        take!(threads);
        take!(learning_rate);
        take!(sigmoid_scale);
        take!(wdl_weight);
        take!(output_dir);
        if o.batch_size.is_some() {
            self.batch_size = o.batch_size;
        }
        if o.seed.is_some() {
            self.seed = o.seed;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.epochs == 0 {
            return Err(ConfigError::Invalid("epochs must be > 0".to_owned()));
        }
        if self.threads == 0 {
            return Err(ConfigError::Invalid("threads must be > 0".to_owned()));
        }
        if self.batch_size == Some(0) {
            return Err(ConfigError::Invalid("batch size must be > 0".to_owned()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "learning rate must be finite and > 0, got {}",
                self.learning_rate
            )));
        }
        self.topology()?;
        self.cost()?;
        Ok(())
    }

    pub fn topology(&self) -> Result<Topology, ConfigError> {
        Ok(Topology::new(self.inputs, self.outputs, self.hidden.clone())?)
    }

    pub fn cost(&self) -> Result<CostFunction, ConfigError> {
        Ok(CostFunction::new(self.sigmoid_scale, self.wdl_weight)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_default_is_valid() {
        TrainConfig::default().validate().unwrap();
    }

    #[test]
    fn test_merge_only_overrides_some() {
        let mut config = TrainConfig::default();
        config.merge(ConfigOverrides {
            hidden: Some(vec![32, 32]),
            seed: Some(7),
            ..Default::default()
        });
        assert_eq!(config.hidden, vec![32, 32]);
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.epochs, 10);
        assert_eq!(config.inputs, 768);
    }

    #[test]
    fn test_cli_wins_over_file() {
        let mut config = TrainConfig::default();
        config.merge(ConfigOverrides {
            epochs: Some(3),
            learning_rate: Some(0.1),
            ..Default::default()
        });
        config.merge(ConfigOverrides {
            epochs: Some(5),
            ..Default::default()
        });
        assert_eq!(config.epochs, 5);
        assert_eq!(config.learning_rate, 0.1);
    }

    #[test]
    fn test_load_yaml_and_json() {
        let td = tempdir().unwrap();
        let yaml = td.path().join("train.yaml");
        fs::write(&yaml, "epochs: 4\nhidden: [64, 8]\nwdl_weight: 0.25\n").unwrap();
        let o = load_config_file(&yaml).unwrap();
        assert_eq!(o.epochs, Some(4));
        assert_eq!(o.hidden, Some(vec![64, 8]));
        assert_eq!(o.wdl_weight, Some(0.25));

        let json = td.path().join("train.json");
        fs::write(&json, r#"{"threads": 4, "batch_size": 1024}"#).unwrap();
        let o = load_config_file(&json).unwrap();
        assert_eq!(o.threads, Some(4));
        assert_eq!(o.batch_size, Some(1024));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let td = tempdir().unwrap();
        let path = td.path().join("bad.json");
        fs::write(&path, r#"{"epoch": 4}"#).unwrap();
        assert!(matches!(load_config_file(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = TrainConfig { epochs: 0, ..Default::default() };
        assert!(config.validate().is_err());

        config.epochs = 1;
        config.hidden = vec![0];
        assert!(matches!(config.validate(), Err(ConfigError::Network(_))));

        config.hidden = vec![];
        config.wdl_weight = 2.0;
        assert!(config.validate().is_err());

        config.wdl_weight = 0.5;
        config.batch_size = Some(0);
        assert!(config.validate().is_err());
    }
}
