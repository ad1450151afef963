//! MNISTデータセットの取得とIDX形式の読み込み
//!
//! キャッシュ構成（標準の配布形式に合わせる）:
//! - `<root>/MNIST/raw/train-images-idx3-ubyte(.gz)`
//! - `<root>/MNIST/raw/train-labels-idx1-ubyte(.gz)`
//! - `<root>/MNIST/raw/t10k-images-idx3-ubyte(.gz)`
//! - `<root>/MNIST/raw/t10k-labels-idx1-ubyte(.gz)`
//!
//! IDX形式（すべてビッグエンディアン）:
//! - 画像: magic(2051) | count | rows | cols | pixels...
//! - ラベル: magic(2049) | count | labels...

use burn::data::dataset::{transform::Mapper, Dataset};
use burn::data::network::downloader;
use flate2::read::GzDecoder;
use image::GrayImage;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use crate::error::{DataError, DataResult};
use crate::transform::{ImageTensor, TransformPipeline};

/// 公開ミラー
pub const MIRROR_URL: &str = "https://ossci-datasets.s3.amazonaws.com/mnist/";

const IMAGES_MAGIC: u32 = 2051;
const LABELS_MAGIC: u32 = 2049;

/// データセットの分割
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MnistSplit {
    /// 学習用（60,000枚）
    Train,
    /// テスト用（10,000枚）。検証データとして使用
    Test,
}

impl MnistSplit {
    /// (画像ファイル名, ラベルファイル名)
    pub fn file_stems(&self) -> (&'static str, &'static str) {
        match self {
            MnistSplit::Train => ("train-images-idx3-ubyte", "train-labels-idx1-ubyte"),
            MnistSplit::Test => ("t10k-images-idx3-ubyte", "t10k-labels-idx1-ubyte"),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MnistSplit::Train => "train",
            MnistSplit::Test => "test",
        }
    }
}

/// アーカイブ（`.gz`）のバイト列を取得する
pub trait ArchiveFetcher: Send + Sync {
    fn fetch(&self, file_name: &str) -> DataResult<Vec<u8>>;
}

/// HTTPでミラーからダウンロード
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    base_url: String,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(MIRROR_URL)
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, file_name: &str) -> DataResult<Vec<u8>> {
        let url = format!("{}{}", self.base_url, file_name);
        log::info!("ダウンロード中: {}", url);
        // ネットワークエラー時は downloader 内部で panic する
        Ok(downloader::download_file_as_bytes(&url, file_name))
    }
}

/// 展開済みファイルの格納先
pub fn raw_dir(root: &Path) -> PathBuf {
    root.join("MNIST").join("raw")
}

/// 指定分割のファイルをキャッシュに用意し、(画像パス, ラベルパス) を返す
///
/// 展開済みファイルが両方そろっていれば何もしません。
pub fn ensure_split(
    root: &Path,
    split: MnistSplit,
    fetcher: &dyn ArchiveFetcher,
) -> DataResult<(PathBuf, PathBuf)> {
    let raw = raw_dir(root);
    let (images_stem, labels_stem) = split.file_stems();
    let images_path = raw.join(images_stem);
    let labels_path = raw.join(labels_stem);

    if images_path.is_file() && labels_path.is_file() {
        log::debug!("キャッシュ済み ({}): {}", split.name(), raw.display());
        return Ok((images_path, labels_path));
    }

    fs::create_dir_all(&raw).map_err(|e| DataError::io(&raw, e))?;
    extract_archive(&raw, images_stem, fetcher)?;
    extract_archive(&raw, labels_stem, fetcher)?;
    Ok((images_path, labels_path))
}

fn extract_archive(raw: &Path, stem: &str, fetcher: &dyn ArchiveFetcher) -> DataResult<()> {
    let target = raw.join(stem);
    if target.is_file() {
        return Ok(());
    }

    let archive_name = format!("{}.gz", stem);
    let archive_path = raw.join(&archive_name);
    let mut cached = None;
    if archive_path.is_file() {
        let bytes = fs::read(&archive_path).map_err(|e| DataError::io(&archive_path, e))?;
        match gunzip(&bytes) {
            Ok(decoded) => cached = Some(decoded),
            Err(e) => {
                log::warn!(
                    "破損したアーカイブを削除して再取得します: {} ({})",
                    archive_path.display(),
                    e
                );
                fs::remove_file(&archive_path).map_err(|e| DataError::io(&archive_path, e))?;
            }
        }
    }

    let decoded = match cached {
        Some(decoded) => decoded,
        None => {
            let bytes = fetcher.fetch(&archive_name)?;
            let decoded = gunzip(&bytes).map_err(|e| DataError::io(&archive_path, e))?;
            // 展開できたアーカイブだけをキャッシュに残す
            write_atomic(&archive_path, &bytes)?;
            decoded
        }
    };

    write_atomic(&target, &decoded)?;
    log::debug!("展開完了: {} ({} バイト)", target.display(), decoded.len());
    Ok(())
}

fn gunzip(compressed: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoded = Vec::new();
    GzDecoder::new(compressed).read_to_end(&mut decoded)?;
    Ok(decoded)
}

/// `.part` に書いてから rename で配置する
fn write_atomic(path: &Path, bytes: &[u8]) -> DataResult<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);
    fs::write(&partial, bytes).map_err(|e| DataError::io(&partial, e))?;
    fs::rename(&partial, path).map_err(|e| DataError::io(path, e))
}

fn read_u32_be(data: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([data[off], data[off + 1], data[off + 2], data[off + 3]])
}

fn check_len(path: &Path, data: &[u8], expected: usize) -> DataResult<()> {
    if data.len() < expected {
        return Err(DataError::Truncated {
            path: path.to_path_buf(),
            expected,
            got: data.len(),
        });
    }
    Ok(())
}

fn check_magic(path: &Path, data: &[u8], expected: u32) -> DataResult<()> {
    let got = read_u32_be(data, 0);
    if got != expected {
        return Err(DataError::InvalidMagic {
            path: path.to_path_buf(),
            expected,
            got,
        });
    }
    Ok(())
}

/// IDX画像ファイルを解析（`path` はエラー表示用）
pub fn parse_idx_images(path: &Path, data: &[u8]) -> DataResult<Vec<GrayImage>> {
    check_len(path, data, 16)?;
    check_magic(path, data, IMAGES_MAGIC)?;

    let count = read_u32_be(data, 4) as usize;
    let rows = read_u32_be(data, 8);
    let cols = read_u32_be(data, 12);
    let pixels = (rows as usize)
        .checked_mul(cols as usize)
        .ok_or_else(|| header_overflow(path, data))?;
    let end = count
        .checked_mul(pixels)
        .and_then(|n| n.checked_add(16))
        .ok_or_else(|| header_overflow(path, data))?;
    check_len(path, data, end)?;

    data[16..end]
        .chunks_exact(pixels.max(1))
        .take(count)
        .map(|chunk| {
            GrayImage::from_raw(cols, rows, chunk.to_vec()).ok_or_else(|| DataError::Truncated {
                path: path.to_path_buf(),
                expected: pixels,
                got: chunk.len(),
            })
        })
        .collect()
}

/// ヘッダの値が usize に収まらない場合
fn header_overflow(path: &Path, data: &[u8]) -> DataError {
    DataError::Truncated {
        path: path.to_path_buf(),
        expected: usize::MAX,
        got: data.len(),
    }
}

/// IDXラベルファイルを解析
pub fn parse_idx_labels(path: &Path, data: &[u8]) -> DataResult<Vec<u8>> {
    check_len(path, data, 8)?;
    check_magic(path, data, LABELS_MAGIC)?;

    let count = read_u32_be(data, 4) as usize;
    let end = count
        .checked_add(8)
        .ok_or_else(|| header_overflow(path, data))?;
    check_len(path, data, end)?;
    Ok(data[8..end].to_vec())
}

/// IDX画像バイト列を生成（テスト・フィクスチャ用）
pub fn build_idx_images(images: &[GrayImage]) -> Vec<u8> {
    let (cols, rows) = images.first().map(|img| img.dimensions()).unwrap_or((28, 28));
    let mut buf = Vec::with_capacity(16 + images.len() * (rows * cols) as usize);
    buf.extend_from_slice(&IMAGES_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(images.len() as u32).to_be_bytes());
    buf.extend_from_slice(&rows.to_be_bytes());
    buf.extend_from_slice(&cols.to_be_bytes());
    for img in images {
        buf.extend_from_slice(img.as_raw());
    }
    buf
}

/// IDXラベルバイト列を生成（テスト・フィクスチャ用）
pub fn build_idx_labels(labels: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + labels.len());
    buf.extend_from_slice(&LABELS_MAGIC.to_be_bytes());
    buf.extend_from_slice(&(labels.len() as u32).to_be_bytes());
    buf.extend_from_slice(labels);
    buf
}

/// 前処理前のアイテム
#[derive(Clone, Debug)]
pub struct MnistRawItem {
    pub image: GrayImage,
    pub label: u8,
}

/// 前処理済みアイテム
#[derive(Clone, Debug, PartialEq)]
pub struct MnistItem {
    pub image: ImageTensor,
    pub label: u8,
}

/// IDXファイルから読み込んだ1分割分のデータ
#[derive(Debug)]
pub struct MnistRawDataset {
    images: Vec<GrayImage>,
    labels: Vec<u8>,
    split: MnistSplit,
}

impl MnistRawDataset {
    /// キャッシュを用意（必要ならダウンロード）して読み込む
    pub fn load(root: &Path, split: MnistSplit, fetcher: &dyn ArchiveFetcher) -> DataResult<Self> {
        let (images_path, labels_path) = ensure_split(root, split, fetcher)?;

        let image_bytes = fs::read(&images_path).map_err(|e| DataError::io(&images_path, e))?;
        let label_bytes = fs::read(&labels_path).map_err(|e| DataError::io(&labels_path, e))?;

        let images = parse_idx_images(&images_path, &image_bytes)?;
        let labels = parse_idx_labels(&labels_path, &label_bytes)?;
        Self::from_parts(images, labels, split)
    }

    pub fn from_parts(images: Vec<GrayImage>, labels: Vec<u8>, split: MnistSplit) -> DataResult<Self> {
        if images.len() != labels.len() {
            return Err(DataError::CountMismatch {
                images: images.len(),
                labels: labels.len(),
            });
        }
        Ok(Self {
            images,
            labels,
            split,
        })
    }

    pub fn split(&self) -> MnistSplit {
        self.split
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// 先頭 `max_items` 枚の画像
    pub fn images(&self, max_items: usize) -> &[GrayImage] {
        &self.images[..max_items.min(self.images.len())]
    }
}

impl Dataset<MnistRawItem> for MnistRawDataset {
    fn get(&self, index: usize) -> Option<MnistRawItem> {
        let image = self.images.get(index)?;
        Some(MnistRawItem {
            image: image.clone(),
            label: self.labels[index],
        })
    }

    fn len(&self) -> usize {
        self.images.len()
    }
}

/// 取得時に前処理パイプラインを適用するマッパー
#[derive(Debug, Clone)]
pub struct MnistTransform {
    pipeline: TransformPipeline,
}

impl MnistTransform {
    pub fn new(pipeline: TransformPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &TransformPipeline {
        &self.pipeline
    }
}

impl Mapper<MnistRawItem, MnistItem> for MnistTransform {
    fn map(&self, item: &MnistRawItem) -> MnistItem {
        MnistItem {
            image: self.pipeline.apply(&item.image),
            label: item.label,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn digit(value: u8) -> GrayImage {
        GrayImage::from_pixel(2, 3, Luma([value]))
    }

    #[test]
    fn test_parse_idx_roundtrip() {
        let bytes = build_idx_images(&[digit(0), digit(255)]);
        let images = parse_idx_images(Path::new("images"), &bytes).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].dimensions(), (2, 3));
        assert_eq!(images[1].get_pixel(1, 2)[0], 255);

        let labels = parse_idx_labels(Path::new("labels"), &build_idx_labels(&[3, 9])).unwrap();
        assert_eq!(labels, vec![3, 9]);
    }

    #[test]
    fn test_invalid_magic() {
        let mut bytes = build_idx_labels(&[1]);
        bytes[3] = 99;
        let err = parse_idx_labels(Path::new("labels"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::InvalidMagic { expected: 2049, .. }));

        // 画像ファイルにラベルを渡した場合
        let err = parse_idx_images(Path::new("x"), &build_idx_labels(&[0; 16])).unwrap_err();
        assert!(matches!(err, DataError::InvalidMagic { expected: 2051, got: 2049, .. }));
    }

    #[test]
    fn test_truncated_images() {
        let mut bytes = build_idx_images(&[digit(1), digit(2)]);
        bytes.truncate(bytes.len() - 1);
        let err = parse_idx_images(Path::new("images"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::Truncated { expected: 28, got: 27, .. }));
    }

    #[test]
    fn test_oversized_header_is_truncated_error() {
        let mut bytes = IMAGES_MAGIC.to_be_bytes().to_vec();
        for _ in 0..3 {
            bytes.extend_from_slice(&u32::MAX.to_be_bytes());
        }
        bytes.extend_from_slice(&[0; 8]);

        let err = parse_idx_images(Path::new("images"), &bytes).unwrap_err();
        assert!(matches!(err, DataError::Truncated { got: 24, .. }));
    }

    #[test]
    fn test_corrupt_cached_archive_is_refetched() {
        struct Gz(Vec<u8>);
        impl ArchiveFetcher for Gz {
            fn fetch(&self, _file_name: &str) -> DataResult<Vec<u8>> {
                let mut encoder =
                    flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::fast());
                std::io::Write::write_all(&mut encoder, &self.0).unwrap();
                Ok(encoder.finish().unwrap())
            }
        }

        let tmp = tempfile::tempdir().unwrap();
        let archive = tmp.path().join("t10k-labels-idx1-ubyte.gz");
        fs::write(&archive, b"partial download").unwrap();

        let labels = build_idx_labels(&[1, 2, 3]);
        extract_archive(tmp.path(), "t10k-labels-idx1-ubyte", &Gz(labels.clone())).unwrap();

        assert_eq!(fs::read(tmp.path().join("t10k-labels-idx1-ubyte")).unwrap(), labels);
        assert_eq!(gunzip(&fs::read(&archive).unwrap()).unwrap(), labels);
        assert!(!tmp.path().join("t10k-labels-idx1-ubyte.gz.part").exists());
    }

    #[test]
    fn test_count_mismatch() {
        let err = MnistRawDataset::from_parts(vec![digit(0)], vec![1, 2], MnistSplit::Train)
            .unwrap_err();
        assert!(matches!(err, DataError::CountMismatch { images: 1, labels: 2 }));
    }

    #[test]
    fn test_raw_dataset_get() {
        let ds = MnistRawDataset::from_parts(vec![digit(10), digit(20)], vec![4, 7], MnistSplit::Test)
            .unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.get(1).unwrap().label, 7);
        assert!(ds.get(2).is_none());
        assert_eq!(ds.images(10).len(), 2);
    }

    #[test]
    fn test_mapper_applies_pipeline() {
        let mapper = MnistTransform::new(TransformPipeline::mnist(None));
        let item = mapper.map(&MnistRawItem {
            image: digit(0),
            label: 5,
        });
        assert_eq!(item.label, 5);
        assert_eq!(item.image.shape, [1, 3, 2]);
        assert!((item.image.data[0] + 0.1307 / 0.3081).abs() < 1e-6);
    }

    #[test]
    fn test_file_stems() {
        assert_eq!(MnistSplit::Train.file_stems().0, "train-images-idx3-ubyte");
        assert_eq!(MnistSplit::Test.file_stems().1, "t10k-labels-idx1-ubyte");
        assert_eq!(raw_dir(Path::new(".tmp")), Path::new(".tmp/MNIST/raw"));
    }
}
