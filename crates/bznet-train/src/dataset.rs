//! 教師データの読み込み
//!
//! 1行1サンプルの JSONL:
//!
//! ```text
//! {"features": [12, 407, 711], "eval": 35.0, "wdl": 1.0}
//! ```
//!
//! gzip 圧縮は先頭バイトまたは `.gz` 拡張子で判定する。

use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

const BUF_BYTES: usize = 4 * 1024 * 1024;
/// 個別に警告を出す不正行の上限
const MAX_REPORTED_LINES: usize = 5;

/// データセット読み込みエラー
#[derive(thiserror::Error, Debug)]
pub enum DatasetError {
    #[error("Failed to open dataset {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// 学習サンプル
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    /// アクティブな特徴量のインデックス
    pub features: Vec<u16>,
    /// 探索評価値（センチポーン）
    pub eval: f32,
    /// 対局結果（1=勝ち, 0.5=引き分け, 0=負け）
    pub wdl: f32,
}

impl Sample {
    fn is_valid(&self, input_width: u32) -> bool {
        self.eval.is_finite()
            && (0.0..=1.0).contains(&self.wdl)
            && self.features.iter().all(|&f| u32::from(f) < input_width)
    }
}

/// 読み込み統計
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loaded: usize,
    pub skipped: usize,
}

/// メモリ上の教師データ
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    samples: Vec<Sample>,
}

impl Dataset {
    pub fn new(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[inline]
    pub fn get(&self, index: usize) -> &Sample {
        &self.samples[index]
    }

    #[inline]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// ファイルから読み込む（gzip 自動判定）
    pub fn load<P: AsRef<Path>>(path: P, input_width: u32) -> Result<(Self, LoadStats), DatasetError> {
        let path = path.as_ref();
        let reader = open_maybe_compressed_reader(path).map_err(|source| DatasetError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        let (dataset, stats) = Self::from_reader(reader, input_width)?;
        debug!(
            "{}: loaded {} samples, skipped {}",
            path.display(),
            stats.loaded,
            stats.skipped
        );
        Ok((dataset, stats))
    }

    /// JSONL を読み込む。不正な行・範囲外の特徴量を含む行はスキップする。
    pub fn from_reader<R: BufRead>(mut reader: R, input_width: u32) -> Result<(Self, LoadStats), DatasetError> {
        let mut samples = Vec::new();
        let mut stats = LoadStats::default();
        let mut line = String::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;
            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<Sample>(&line) {
                Ok(sample) if sample.is_valid(input_width) => {
                    samples.push(sample);
                    stats.loaded += 1;
                }
                Ok(_) => {
                    stats.skipped += 1;
                    if stats.skipped <= MAX_REPORTED_LINES {
                        warn!("line {line_no}: sample out of range, skipped");
                    }
                }
                Err(e) => {
                    stats.skipped += 1;
                    if stats.skipped <= MAX_REPORTED_LINES {
                        warn!("line {line_no}: {e}, skipped");
                    }
                }
            }
        }

        if stats.skipped > MAX_REPORTED_LINES {
            warn!("{} malformed lines skipped in total", stats.skipped);
        }
        Ok((Self { samples }, stats))
    }
}

fn is_gzip(path: &Path) -> io::Result<bool> {
    let mut f = File::open(path)?;
    let mut magic = [0u8; 2];
    let n = f.read(&mut magic)?;
    if n == 2 && magic == [0x1F, 0x8B] {
        return Ok(true);
    }
    Ok(path.extension().is_some_and(|ext| ext == "gz"))
}

/// プレーンテキストまたは gzip のリーダーを開く
pub fn open_maybe_compressed_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let gzip = is_gzip(path)?;
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if gzip {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::with_capacity(BUF_BYTES, reader)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::{Cursor, Write};
    use tempfile::tempdir;

    const LINES: &str = r#"{"features":[0,5,9],"eval":120.0,"wdl":1.0}

{"features":[3],"eval":-40.5,"wdl":0.5}
not json
{"features":[10],"eval":0.0,"wdl":0.0}
{"features":[1],"eval":0.0,"wdl":3.0}
"#;

    #[test]
    fn test_from_reader_skips_malformed() {
        let (ds, stats) = Dataset::from_reader(Cursor::new(LINES), 10).unwrap();
        assert_eq!(stats, LoadStats { loaded: 2, skipped: 3 });
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(0).features, vec![0, 5, 9]);
        assert_eq!(ds.get(1).eval, -40.5);
        assert_eq!(ds.get(1).wdl, 0.5);
    }

    #[test]
    fn test_load_plain_and_gzip() {
        let td = tempdir().unwrap();

        let plain = td.path().join("data.jsonl");
        std::fs::write(&plain, LINES).unwrap();
        let (ds, _) = Dataset::load(&plain, 10).unwrap();
        assert_eq!(ds.len(), 2);

        // 拡張子なしでもマジックで gzip を判定する
        let gz = td.path().join("data.bin");
        let mut enc = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        enc.write_all(LINES.as_bytes()).unwrap();
        enc.finish().unwrap();
        let (ds_gz, stats) = Dataset::load(&gz, 10).unwrap();
        assert_eq!(stats.loaded, 2);
        assert_eq!(ds_gz.samples(), ds.samples());
    }

    #[test]
    fn test_missing_file() {
        let td = tempdir().unwrap();
        let err = Dataset::load(td.path().join("none.jsonl"), 10).unwrap_err();
        assert!(matches!(err, DatasetError::Open { .. }));
    }
}
