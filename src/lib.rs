//! MNISTデータの取得・前処理・推論用読み込み
//!
//! - 学習・検証データ: ダウンロード → 前処理 → 切り詰め ([`MnistDataModule`])
//! - 推論データ: フォルダ内の画像ファイル ([`InferenceMnist`], [`MnistPredictLoader`])
//! - サンプル生成: テストデータをJPGとして書き出し ([`generate_jpg_sample`])

pub mod config;
pub mod error;
pub mod inference;
pub mod mnist;
pub mod monitor;
pub mod provider;
pub mod transform;

#[cfg(feature = "ml")]
pub mod batch;

pub use config::{DataConfig, MnistDataSettings, PredictSettings, SampleSettings};
pub use error::{DataError, DataResult};
pub use inference::{generate_jpg_sample, InferenceItem, InferenceMnist, DEFAULT_FORMAT};
pub use mnist::{ArchiveFetcher, HttpFetcher, MnistItem, MnistRawDataset, MnistSplit};
pub use monitor::{ExecutionRecord, Monitored};
pub use provider::{
    DataProvider, MnistDataModule, MnistPredictLoader, MnistSplitDataset, MnistSplits,
};
pub use transform::{ImageTensor, TransformPipeline, MNIST_MEAN, MNIST_STD};

#[cfg(feature = "ml")]
pub use batch::{InferenceBatch, InferenceBatcher, MnistBatch, MnistBatcher};
