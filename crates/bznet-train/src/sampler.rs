//! エポックごとのサンプル選択
//!
//! 各エポックはデータセットから `floor(len / epochs)` 件を非復元で一様に選ぶ。

use rand::Rng;
use rand::seq::index;

/// 1エポックあたりのサンプル数
///
/// Panics if `epochs == 0`.
#[inline]
pub fn epoch_sample_size(dataset_len: usize, epochs: usize) -> usize {
    assert!(epochs > 0, "epochs must be > 0");
    dataset_len / epochs
}

/// 重複なしのインデックス列を返す
pub fn select_epoch_sample<R: Rng + ?Sized>(dataset_len: usize, epochs: usize, rng: &mut R) -> Vec<usize> {
    let amount = epoch_sample_size(dataset_len, epochs);
    index::sample(rng, dataset_len, amount).into_vec()
}
