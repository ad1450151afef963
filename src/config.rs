//! データ取得設定管理モジュール
//!
//! 各プロバイダの設定をJSON形式で保存・読み込みします。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DataError, DataResult};
use crate::inference::DEFAULT_SAMPLE_ITEMS;

/// 学習・検証データの設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MnistDataSettings {
    /// ダウンロードしたデータのキャッシュ先
    pub save_path: PathBuf,
    /// リサイズ後のサイズ（短辺）。None ならリサイズしない
    pub resize: Option<u32>,
    /// 学習データの最大件数
    pub max_train_size: Option<usize>,
    /// 検証データの最大件数
    pub max_valid_size: Option<usize>,
}

impl Default for MnistDataSettings {
    fn default() -> Self {
        Self {
            save_path: PathBuf::from(".tmp/"),
            resize: None,
            max_train_size: None,
            max_valid_size: None,
        }
    }
}

/// 推論データの設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PredictSettings {
    /// 推論対象の画像フォルダ
    pub test_data_path: PathBuf,
}

impl Default for PredictSettings {
    fn default() -> Self {
        Self {
            test_data_path: PathBuf::from("mnist-sample-data"),
        }
    }
}

/// サンプル画像生成の設定
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SampleSettings {
    /// 出力先フォルダ（実行時に削除して作り直す）
    pub root: PathBuf,
    /// 生成する最大枚数
    pub max_items: usize,
    /// テストデータのキャッシュ先
    pub cache_root: PathBuf,
}

impl Default for SampleSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("mnist-sample-data"),
            max_items: DEFAULT_SAMPLE_ITEMS,
            cache_root: PathBuf::from(".tmp"),
        }
    }
}

/// 設定全体
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DataConfig {
    pub mnist: MnistDataSettings,
    pub predict: PredictSettings,
    pub sample: SampleSettings,
}

impl DataConfig {
    /// 設定ファイルのデフォルトパス
    pub fn default_path() -> PathBuf {
        PathBuf::from("mnist_data.json")
    }

    /// 設定を読み込む
    pub fn load<P: AsRef<Path>>(path: P) -> DataResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| DataError::io(path, e))?;
        serde_json::from_str(&content).map_err(|source| DataError::Json {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 指定パスから読み込む。存在しない・読めない場合はデフォルト設定を返す
    pub fn load_or_default_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            log::info!("設定ファイルが存在しません。デフォルト設定を使用します");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => {
                log::info!("設定ファイルを読み込みました: {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("設定ファイルの読み込みに失敗しました: {}", e);
                log::warn!("デフォルト設定を使用します");
                Self::default()
            }
        }
    }

    /// デフォルトパスから設定を読み込む
    pub fn load_or_default() -> Self {
        Self::load_or_default_from(Self::default_path())
    }

    /// 設定を保存する
    pub fn save<P: AsRef<Path>>(&self, path: P) -> DataResult<()> {
        let path = path.as_ref();
        let content = serde_json::to_string_pretty(self).map_err(|source| DataError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|e| DataError::io(path, e))?;
        log::info!("設定ファイルを保存しました: {}", path.display());
        Ok(())
    }
}
