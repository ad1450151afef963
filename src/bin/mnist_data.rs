//! MNISTデータ準備ツール

use anyhow::Context;
use burn::data::dataset::Dataset;
use clap::{Parser, Subcommand};
use mnist_data_lib::{
    generate_jpg_sample, DataConfig, DataProvider, HttpFetcher, MnistDataModule,
    MnistPredictLoader, Monitored,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mnist_data", about = "Download, transform and inspect MNIST datasets")]
struct Args {
    /// 設定ファイル（JSON）。未指定時は mnist_data.json を探す
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 学習・検証データをダウンロードして前処理を確認する
    Prepare {
        #[arg(long)]
        save_path: Option<PathBuf>,
        #[arg(long)]
        resize: Option<u32>,
        #[arg(long)]
        max_train_size: Option<usize>,
        #[arg(long)]
        max_valid_size: Option<usize>,
    },
    /// テストデータからJPGサンプルを生成する
    Sample {
        #[arg(long)]
        root: Option<PathBuf>,
        #[arg(long)]
        max_items: Option<usize>,
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// 推論用フォルダを読み込んで一覧を表示する
    Predict {
        #[arg(long)]
        path: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => DataConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => DataConfig::load_or_default(),
    };

    match args.command {
        Command::Prepare {
            save_path,
            resize,
            max_train_size,
            max_valid_size,
        } => {
            let mut settings = config.mnist;
            if let Some(path) = save_path {
                settings.save_path = path;
            }
            settings.resize = resize.or(settings.resize);
            settings.max_train_size = max_train_size.or(settings.max_train_size);
            settings.max_valid_size = max_valid_size.or(settings.max_valid_size);

            let provider = Monitored::new(MnistDataModule::new(settings));
            let splits = provider.execute().context("Failed to prepare MNIST")?;

            println!("学習データ: {} 件", splits.train.len());
            println!("検証データ: {} 件", splits.validation.len());
            if let Some(item) = splits.train.get(0) {
                println!("画像形状: {:?}, ラベル: {}", item.image.shape, item.label);
            }
            #[cfg(feature = "ml")]
            print_first_batch(&splits.train);
            if let Some(record) = provider.last_record() {
                println!("{}", serde_json::to_string_pretty(&record)?);
            }
        }
        Command::Sample {
            root,
            max_items,
            cache,
        } => {
            let sample = config.sample;
            let root = root.unwrap_or(sample.root);
            let cache = cache.unwrap_or(sample.cache_root);
            let written = generate_jpg_sample(
                &root,
                max_items.unwrap_or(sample.max_items),
                &cache,
                &HttpFetcher::default(),
            )
            .with_context(|| format!("Failed to generate samples in {}", root.display()))?;
            println!("{} 枚を {} に保存しました", written.len(), root.display());
        }
        Command::Predict { path } => {
            let path = path.unwrap_or(config.predict.test_data_path);
            let provider = Monitored::new(MnistPredictLoader::from_path(&path));
            let dataset = provider
                .execute()
                .with_context(|| format!("Failed to load images from {}", path.display()))?;

            println!("推論用画像: {} 枚", dataset.len());
            for id in dataset.ids() {
                println!("  {}", id);
            }
        }
    }

    Ok(())
}

#[cfg(feature = "ml")]
fn print_first_batch(dataset: &mnist_data_lib::MnistSplitDataset) {
    use burn::data::dataloader::batcher::Batcher;
    use mnist_data_lib::{MnistBatch, MnistBatcher};

    type CpuBackend = burn_ndarray::NdArray<f32>;

    let device = Default::default();
    let items: Vec<_> = dataset.iter().take(8).collect();
    if items.is_empty() {
        return;
    }
    let batch: MnistBatch<CpuBackend> = MnistBatcher.batch(items, &device);
    println!("先頭バッチ: images={:?}", batch.images.dims());
}
