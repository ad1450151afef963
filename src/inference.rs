//! 推論用データセット
//!
//! フォルダ内の画像ファイル（既定は `.jpg`）を読み込み、
//! (ファイル名, 画像) の組としてインデックスで取得できるようにします。

use burn::data::dataset::Dataset;
use image::{GrayImage, ImageReader};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{DataError, DataResult};
use crate::mnist::{ArchiveFetcher, MnistRawDataset, MnistSplit};
use crate::transform::{ImageTensor, TransformPipeline};

/// 既定の拡張子フィルタ
pub const DEFAULT_FORMAT: &str = ".jpg";
/// サンプル生成の既定枚数
pub const DEFAULT_SAMPLE_ITEMS: usize = 100;

/// 推論用アイテム
#[derive(Clone, Debug, PartialEq)]
pub struct InferenceItem {
    /// 画像の識別子（ファイル名）
    pub id: String,
    pub image: ImageTensor,
}

/// フォルダ内の画像を保持する推論用データセット
#[derive(Debug)]
pub struct InferenceMnist {
    root: PathBuf,
    transform: Option<TransformPipeline>,
    supported_format: String,
    data: Vec<(String, GrayImage)>,
}

impl InferenceMnist {
    /// フォルダを走査して画像を読み込む
    ///
    /// 拡張子の一致は大文字小文字を区別しません。1枚でも読み込めない画像があれば
    /// 全体を失敗とします。並び順はファイル名順です。
    pub fn new(
        root: impl AsRef<Path>,
        transform: Option<TransformPipeline>,
        supported_format: &str,
    ) -> DataResult<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_dir() {
            return Err(DataError::MissingDirectory(root));
        }

        let suffix = supported_format.to_lowercase();
        let mut files = Vec::new();
        for entry in fs::read_dir(&root).map_err(|e| DataError::io(&root, e))? {
            let entry = entry.map_err(|e| DataError::io(&root, e))?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
                continue;
            };
            if name.to_lowercase().ends_with(&suffix) {
                files.push((name, path));
            }
        }
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut data = Vec::with_capacity(files.len());
        for (name, path) in files {
            // 拡張子ではなく内容から形式を判定する
            let img = ImageReader::open(&path)
                .and_then(|reader| reader.with_guessed_format())
                .map_err(|e| DataError::io(&path, e))?
                .decode()
                .map_err(|e| DataError::image(&path, e))?
                .to_luma8();
            log::debug!("読み込み: {} ({}x{})", name, img.width(), img.height());
            data.push((name, img));
        }

        log::info!("推論用画像を {} 枚読み込みました: {}", data.len(), root.display());
        Ok(Self {
            root,
            transform,
            supported_format: supported_format.to_string(),
            data,
        })
    }

    /// 既定の拡張子 (`.jpg`) で読み込む
    pub fn with_default_format(
        root: impl AsRef<Path>,
        transform: Option<TransformPipeline>,
    ) -> DataResult<Self> {
        Self::new(root, transform, DEFAULT_FORMAT)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn supported_format(&self) -> &str {
        &self.supported_format
    }

    pub fn transform(&self) -> Option<&TransformPipeline> {
        self.transform.as_ref()
    }

    /// 識別子一覧（インデックス順）
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.data.iter().map(|(id, _)| id.as_str())
    }

    /// インデックスで取得。範囲外はエラー
    ///
    /// 前処理が指定されていない場合は正規化なしのテンソル（0..1）を返します。
    pub fn get_item(&self, index: usize) -> DataResult<InferenceItem> {
        let (id, img) = self.data.get(index).ok_or(DataError::IndexOutOfBounds {
            index,
            len: self.data.len(),
        })?;
        let image = match &self.transform {
            Some(pipeline) => pipeline.apply(img),
            None => ImageTensor::from_gray(img),
        };
        Ok(InferenceItem {
            id: id.clone(),
            image,
        })
    }
}

impl Dataset<InferenceItem> for InferenceMnist {
    fn get(&self, index: usize) -> Option<InferenceItem> {
        self.get_item(index).ok()
    }

    fn len(&self) -> usize {
        self.data.len()
    }
}

/// テスト用データセットからJPGサンプルを生成
///
/// `root` を削除して作り直し、MNISTテストデータの先頭 `max_items` 枚を
/// `digit_0.jpg`, `digit_1.jpg`, ... として保存します。
pub fn generate_jpg_sample(
    root: impl AsRef<Path>,
    max_items: usize,
    cache_root: impl AsRef<Path>,
    fetcher: &dyn ArchiveFetcher,
) -> DataResult<Vec<PathBuf>> {
    let root = root.as_ref();
    if root.exists() {
        fs::remove_dir_all(root).map_err(|e| DataError::io(root, e))?;
    }
    fs::create_dir_all(root).map_err(|e| DataError::io(root, e))?;

    let test_data = MnistRawDataset::load(cache_root.as_ref(), MnistSplit::Test, fetcher)?;

    let mut written = Vec::new();
    for (idx, img) in test_data.images(max_items).iter().enumerate() {
        let save_path = root.join(format!("digit_{}.jpg", idx));
        img.save(&save_path)
            .map_err(|e| DataError::image(&save_path, e))?;
        written.push(save_path);
    }

    log::info!("サンプル画像を {} 枚生成しました: {}", written.len(), root.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn write_digit(dir: &Path, name: &str, value: u8) {
        GrayImage::from_pixel(28, 28, Luma([value]))
            .save_with_format(dir.join(name), image::ImageFormat::Png)
            .unwrap();
    }

    #[test]
    fn test_extension_filter_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        write_digit(tmp.path(), "a.jpg", 10);
        write_digit(tmp.path(), "b.JPG", 20);
        write_digit(tmp.path(), "c.png", 30);

        let ds = InferenceMnist::with_default_format(tmp.path(), None).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.ids().collect::<Vec<_>>(), vec!["a.jpg", "b.JPG"]);
    }

    #[test]
    fn test_out_of_bounds() {
        let tmp = tempfile::tempdir().unwrap();
        write_digit(tmp.path(), "only.jpg", 0);
        let ds = InferenceMnist::with_default_format(tmp.path(), None).unwrap();

        let err = ds.get_item(1).unwrap_err();
        assert!(matches!(err, DataError::IndexOutOfBounds { index: 1, len: 1 }));
        assert!(ds.get(1).is_none());
    }

    #[test]
    fn test_transform_applied_on_access() {
        let tmp = tempfile::tempdir().unwrap();
        write_digit(tmp.path(), "zero.jpg", 0);

        let raw = InferenceMnist::with_default_format(tmp.path(), None).unwrap();
        assert_eq!(raw.get_item(0).unwrap().image.data[0], 0.0);

        let normalized =
            InferenceMnist::with_default_format(tmp.path(), Some(TransformPipeline::mnist(None)))
                .unwrap();
        let item = normalized.get_item(0).unwrap();
        assert_eq!(item.id, "zero.jpg");
        assert_eq!(item.image.shape, [1, 28, 28]);
        assert!((item.image.data[0] + 0.1307 / 0.3081).abs() < 1e-6);
    }

    #[test]
    fn test_undecodable_file_aborts_load() {
        let tmp = tempfile::tempdir().unwrap();
        write_digit(tmp.path(), "good.jpg", 0);
        fs::write(tmp.path().join("bad.jpg"), b"not an image").unwrap();

        let err = InferenceMnist::with_default_format(tmp.path(), None).unwrap_err();
        assert!(matches!(err, DataError::Image { ref path, .. } if path.ends_with("bad.jpg")));
    }

    #[test]
    fn test_missing_directory() {
        let tmp = tempfile::tempdir().unwrap();
        let err = InferenceMnist::with_default_format(tmp.path().join("nope"), None).unwrap_err();
        assert!(matches!(err, DataError::MissingDirectory(_)));
    }
}
