//! 画像前処理パイプライン
//!
//! 画像段の処理（リサイズ） → テンソル変換（0..255 → 0..1） → テンソル段の処理（正規化）
//! の順で適用します。パイプラインは構築時に一度だけ組み立て、各アイテム取得時に適用します。

use image::{imageops::FilterType, GrayImage};
use std::borrow::Cow;

/// MNISTの平均値
pub const MNIST_MEAN: f32 = 0.1307;
/// MNISTの標準偏差
pub const MNIST_STD: f32 = 0.3081;

/// 正規化済み画像データ (C, H, W) の順で平坦化
#[derive(Debug, Clone, PartialEq)]
pub struct ImageTensor {
    pub data: Vec<f32>,
    /// [チャネル数, 高さ, 幅]
    pub shape: [usize; 3],
}

impl ImageTensor {
    /// グレースケール画像をテンソルに変換（各画素を 255 で割る）
    pub fn from_gray(img: &GrayImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img.as_raw().iter().map(|&p| p as f32 / 255.0).collect();
        Self {
            data,
            shape: [1, height as usize, width as usize],
        }
    }

    pub fn channels(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn num_elements(&self) -> usize {
        self.data.len()
    }
}

/// テンソル変換前に画像へ適用する処理
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ImageOp {
    /// 短辺をこのサイズに合わせてリサイズ（アスペクト比維持、バイリニア）
    Resize(u32),
}

impl ImageOp {
    fn apply<'a>(&self, img: Cow<'a, GrayImage>) -> Cow<'a, GrayImage> {
        match *self {
            ImageOp::Resize(size) => {
                let (width, height) = img.dimensions();
                let (new_w, new_h) = shorter_side_dims(width, height, size);
                if (new_w, new_h) == (width, height) {
                    return img;
                }
                Cow::Owned(image::imageops::resize(
                    img.as_ref(),
                    new_w,
                    new_h,
                    FilterType::Triangle,
                ))
            }
        }
    }
}

/// テンソル変換後に適用する処理
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TensorOp {
    /// (x - mean) / std
    Normalize { mean: f32, std: f32 },
}

impl TensorOp {
    fn apply(&self, tensor: &mut ImageTensor) {
        match *self {
            TensorOp::Normalize { mean, std } => {
                for v in tensor.data.iter_mut() {
                    *v = (*v - mean) / std;
                }
            }
        }
    }
}

/// 短辺を `size` に合わせた場合の (幅, 高さ)
fn shorter_side_dims(width: u32, height: u32, size: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    if width <= height {
        let long = (size as u64 * height as u64 / width as u64) as u32;
        (size, long)
    } else {
        let long = (size as u64 * width as u64 / height as u64) as u32;
        (long, size)
    }
}

/// 前処理パイプライン
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransformPipeline {
    image_ops: Vec<ImageOp>,
    tensor_ops: Vec<TensorOp>,
}

impl TransformPipeline {
    pub fn builder() -> TransformPipelineBuilder {
        TransformPipelineBuilder::default()
    }

    /// 学習・推論共通のMNIST用パイプライン
    ///
    /// `resize` が指定された場合のみ先頭にリサイズを追加し、
    /// 常にテンソル変換と固定値 (0.1307, 0.3081) での正規化を行います。
    /// `Some(0)` は未指定として扱います。
    pub fn mnist(resize: Option<u32>) -> Self {
        let mut builder = Self::builder();
        if let Some(size) = resize.filter(|&size| size > 0) {
            builder = builder.resize(size);
        }
        builder.normalize(MNIST_MEAN, MNIST_STD).build()
    }

    pub fn apply(&self, img: &GrayImage) -> ImageTensor {
        let mut current = Cow::Borrowed(img);
        for op in &self.image_ops {
            current = op.apply(current);
        }
        let mut tensor = ImageTensor::from_gray(current.as_ref());
        for op in &self.tensor_ops {
            op.apply(&mut tensor);
        }
        tensor
    }

    /// 入力サイズ (幅, 高さ) に対する出力の形状 [C, H, W]
    pub fn output_shape(&self, width: u32, height: u32) -> [usize; 3] {
        let (mut w, mut h) = (width, height);
        for op in &self.image_ops {
            match *op {
                ImageOp::Resize(size) => (w, h) = shorter_side_dims(w, h, size),
            }
        }
        [1, h as usize, w as usize]
    }

    pub fn image_ops(&self) -> &[ImageOp] {
        &self.image_ops
    }

    pub fn tensor_ops(&self) -> &[TensorOp] {
        &self.tensor_ops
    }

    pub fn describe(&self) -> String {
        let mut parts: Vec<String> = self
            .image_ops
            .iter()
            .map(|op| match op {
                ImageOp::Resize(size) => format!("Resize({})", size),
            })
            .collect();
        parts.push("ToTensor".to_string());
        parts.extend(self.tensor_ops.iter().map(|op| match op {
            TensorOp::Normalize { mean, std } => format!("Normalize(mean={}, std={})", mean, std),
        }));
        parts.join(" -> ")
    }
}

#[derive(Debug, Clone, Default)]
pub struct TransformPipelineBuilder {
    inner: TransformPipeline,
}

impl TransformPipelineBuilder {
    pub fn resize(mut self, size: u32) -> Self {
        self.inner.image_ops.push(ImageOp::Resize(size));
        self
    }

    pub fn normalize(mut self, mean: f32, std: f32) -> Self {
        self.inner.tensor_ops.push(TensorOp::Normalize { mean, std });
        self
    }

    pub fn build(self) -> TransformPipeline {
        self.inner
    }
}
