//! 統合テスト用のフィクスチャ

#![allow(dead_code)]

use flate2::{write::GzEncoder, Compression};
use image::{GrayImage, Luma};
use mnist_data_lib::mnist::{build_idx_images, build_idx_labels};
use mnist_data_lib::{ArchiveFetcher, DataError, DataResult};
use std::io::Write;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// 合成したIDXファイルをgzip圧縮して返すフェッチャー
pub struct FixtureFetcher {
    train: usize,
    test: usize,
    side: u32,
    calls: Arc<AtomicUsize>,
}

impl FixtureFetcher {
    pub fn new(train: usize, test: usize, side: u32) -> Self {
        Self {
            train,
            test,
            side,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// 呼び出し回数のカウンタ（プロバイダに所有権を渡した後も参照できる）
    pub fn calls(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

pub fn synthetic_image(index: usize, side: u32) -> GrayImage {
    GrayImage::from_fn(side, side, |x, y| {
        Luma([((index * 31 + x as usize * 7 + y as usize * 3) % 256) as u8])
    })
}

pub fn synthetic_label(index: usize) -> u8 {
    (index % 10) as u8
}

fn gzip(bytes: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
    encoder.write_all(bytes).unwrap();
    encoder.finish().unwrap()
}

impl ArchiveFetcher for FixtureFetcher {
    fn fetch(&self, file_name: &str) -> DataResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let (count, is_images) = match file_name {
            "train-images-idx3-ubyte.gz" => (self.train, true),
            "train-labels-idx1-ubyte.gz" => (self.train, false),
            "t10k-images-idx3-ubyte.gz" => (self.test, true),
            "t10k-labels-idx1-ubyte.gz" => (self.test, false),
            _ => {
                return Err(DataError::Io {
                    path: PathBuf::from(file_name),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "unknown archive"),
                })
            }
        };

        let raw = if is_images {
            let images: Vec<GrayImage> =
                (0..count).map(|i| synthetic_image(i, self.side)).collect();
            build_idx_images(&images)
        } else {
            let labels: Vec<u8> = (0..count).map(synthetic_label).collect();
            build_idx_labels(&labels)
        };
        Ok(gzip(&raw))
    }
}

/// gzipではないバイト列を返すフェッチャー
pub struct CorruptFetcher;

impl ArchiveFetcher for CorruptFetcher {
    fn fetch(&self, _file_name: &str) -> DataResult<Vec<u8>> {
        Ok(b"definitely not gzip".to_vec())
    }
}
