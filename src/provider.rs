//! データプロバイダ
//!
//! 設定構造体を受け取り `execute()` でデータセットを返します。
//! ログ出力・時間計測は [`crate::monitor::Monitored`] で外側から付与します。

use burn::data::dataset::transform::{MapperDataset, PartialDataset};
use burn::data::dataset::Dataset;
use std::path::Path;

use crate::config::{MnistDataSettings, PredictSettings};
use crate::error::DataResult;
use crate::inference::InferenceMnist;
use crate::mnist::{
    ArchiveFetcher, HttpFetcher, MnistItem, MnistRawDataset, MnistRawItem, MnistSplit,
    MnistTransform,
};
use crate::transform::TransformPipeline;

/// 前処理付き・切り詰め済みの分割データ
pub type MnistSplitDataset =
    PartialDataset<MapperDataset<MnistRawDataset, MnistTransform, MnistRawItem>, MnistItem>;

/// データセットを生成するプロバイダ
pub trait DataProvider {
    type Output;

    /// ログ表示用の名前
    fn name(&self) -> &str;

    /// 実験記録用のパラメータスナップショット
    fn params(&self) -> serde_json::Value;

    fn execute(&self) -> DataResult<Self::Output>;
}

/// `execute()` の結果
pub struct MnistSplits {
    pub train: MnistSplitDataset,
    pub validation: MnistSplitDataset,
    /// 他のプロバイダとの互換用。常に None
    pub test: Option<MnistSplitDataset>,
}

/// 先頭 `max_size` 件に切り詰める
///
/// None と 0 は「制限なし」。データ件数を超える値は件数に丸めます。
pub fn truncate<D, I>(dataset: D, max_size: Option<usize>, split_name: &str) -> PartialDataset<D, I>
where
    D: Dataset<I>,
{
    let len = dataset.len();
    let end = match max_size {
        Some(n) if n > 0 => {
            if n > len {
                log::warn!(
                    "{}: 最大件数 {} がデータ件数 {} を超えています。{} 件に丸めます",
                    split_name,
                    n,
                    len,
                    len
                );
            }
            n.min(len)
        }
        _ => len,
    };
    PartialDataset::new(dataset, 0, end)
}

/// MNISTの学習・検証データを用意するプロバイダ
pub struct MnistDataModule {
    settings: MnistDataSettings,
    fetcher: Box<dyn ArchiveFetcher>,
}

impl MnistDataModule {
    pub fn new(settings: MnistDataSettings) -> Self {
        Self::with_fetcher(settings, HttpFetcher::default())
    }

    pub fn with_fetcher(settings: MnistDataSettings, fetcher: impl ArchiveFetcher + 'static) -> Self {
        Self {
            settings,
            fetcher: Box::new(fetcher),
        }
    }

    pub fn settings(&self) -> &MnistDataSettings {
        &self.settings
    }

    /// 学習時の前処理パイプライン
    pub fn pipeline(&self) -> TransformPipeline {
        TransformPipeline::mnist(self.settings.resize)
    }

    fn load_split(
        &self,
        split: MnistSplit,
        pipeline: &TransformPipeline,
    ) -> DataResult<MapperDataset<MnistRawDataset, MnistTransform, MnistRawItem>> {
        let raw = MnistRawDataset::load(&self.settings.save_path, split, self.fetcher.as_ref())?;
        Ok(MapperDataset::new(raw, MnistTransform::new(pipeline.clone())))
    }
}

impl DataProvider for MnistDataModule {
    type Output = MnistSplits;

    fn name(&self) -> &str {
        "MnistDataModule"
    }

    fn params(&self) -> serde_json::Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }

    fn execute(&self) -> DataResult<MnistSplits> {
        let pipeline = self.pipeline();
        log::debug!("前処理: {}", pipeline.describe());

        let train = self.load_split(MnistSplit::Train, &pipeline)?;
        let validation = self.load_split(MnistSplit::Test, &pipeline)?;
        log::info!("Train and validation datasets loaded.");

        let train: MnistSplitDataset = truncate(train, self.settings.max_train_size, "train");
        let validation: MnistSplitDataset =
            truncate(validation, self.settings.max_valid_size, "validation");
        log::info!("学習データ: {} 件, 検証データ: {} 件", train.len(), validation.len());

        Ok(MnistSplits {
            train,
            validation,
            test: None,
        })
    }
}

/// 推論用データを用意するプロバイダ
///
/// 学習時と同じ正規化を適用しますがリサイズは行いません。
/// `InferenceBatcher` でまとめる場合は画像サイズを揃えてください。
pub struct MnistPredictLoader {
    settings: PredictSettings,
}

impl MnistPredictLoader {
    pub fn new(settings: PredictSettings) -> Self {
        Self { settings }
    }

    pub fn from_path(test_data_path: impl AsRef<Path>) -> Self {
        Self::new(PredictSettings {
            test_data_path: test_data_path.as_ref().to_path_buf(),
        })
    }
}

impl DataProvider for MnistPredictLoader {
    type Output = InferenceMnist;

    fn name(&self) -> &str {
        "MnistPredictLoader"
    }

    fn params(&self) -> serde_json::Value {
        serde_json::to_value(&self.settings).unwrap_or_default()
    }

    fn execute(&self) -> DataResult<InferenceMnist> {
        InferenceMnist::with_default_format(
            &self.settings.test_data_path,
            Some(TransformPipeline::mnist(None)),
        )
    }
}
