//! Burn用バッチャー
//!
//! 前処理済みアイテムをまとめて [N, C, H, W] のテンソルに変換します。
//! 同一バッチ内の画像はすべて同じ形状である必要があります。

use burn::data::dataloader::batcher::Batcher;
use burn::tensor::{backend::Backend, Int, Tensor};

use crate::inference::InferenceItem;
use crate::mnist::MnistItem;
use crate::transform::ImageTensor;

/// 学習・検証用バッチ
#[derive(Clone, Debug)]
pub struct MnistBatch<B: Backend> {
    pub images: Tensor<B, 4>,
    pub targets: Tensor<B, 1, Int>,
}

/// 推論用バッチ
#[derive(Clone, Debug)]
pub struct InferenceBatch<B: Backend> {
    pub ids: Vec<String>,
    pub images: Tensor<B, 4>,
}

fn stack_images<'a, B: Backend>(
    images: impl ExactSizeIterator<Item = &'a ImageTensor>,
    device: &B::Device,
) -> Tensor<B, 4> {
    let batch_size = images.len();
    let mut shape = None;
    let mut all_pixels = Vec::new();
    for image in images {
        let expected = *shape.get_or_insert(image.shape);
        assert_eq!(
            image.shape, expected,
            "バッチ内の画像形状が一致しません: {:?} != {:?}",
            image.shape, expected
        );
        all_pixels.extend_from_slice(&image.data);
    }
    let [c, h, w] = shape.unwrap_or([1, 0, 0]);

    Tensor::<B, 1>::from_floats(all_pixels.as_slice(), device).reshape([batch_size, c, h, w])
}

/// # Panics
///
/// バッチ内に形状の異なる画像が含まれる場合
#[derive(Clone, Debug, Default)]
pub struct MnistBatcher;

impl<B: Backend> Batcher<B, MnistItem, MnistBatch<B>> for MnistBatcher {
    fn batch(&self, items: Vec<MnistItem>, device: &B::Device) -> MnistBatch<B> {
        let images = stack_images::<B>(items.iter().map(|item| &item.image), device);
        let targets_vec: Vec<i64> = items.iter().map(|item| item.label as i64).collect();
        let targets = Tensor::<B, 1, Int>::from_ints(targets_vec.as_slice(), device);

        MnistBatch { images, targets }
    }
}

/// 推論用画像はリサイズされないため、フォルダ内の画像サイズは揃えておくこと
///
/// # Panics
///
/// バッチ内に形状の異なる画像が含まれる場合
#[derive(Clone, Debug, Default)]
pub struct InferenceBatcher;

impl<B: Backend> Batcher<B, InferenceItem, InferenceBatch<B>> for InferenceBatcher {
    fn batch(&self, items: Vec<InferenceItem>, device: &B::Device) -> InferenceBatch<B> {
        let images = stack_images::<B>(items.iter().map(|item| &item.image), device);
        let ids = items.into_iter().map(|item| item.id).collect();

        InferenceBatch { ids, images }
    }
}
