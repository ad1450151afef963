//! プロバイダ実行の監視
//!
//! 任意の [`DataProvider`] を包み、実行前にパラメータを記録し、
//! 実行時間と成否をログに出力します。

use serde::Serialize;
use std::sync::Mutex;
use std::time::Instant;

use crate::error::DataResult;
use crate::provider::DataProvider;

/// 1回分の実行記録
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub provider: String,
    pub params: serde_json::Value,
    /// 開始時刻 (RFC3339)
    pub started_at: String,
    pub elapsed_ms: u128,
    pub success: bool,
    pub error: Option<String>,
}

/// 実行監視ラッパー
pub struct Monitored<P> {
    inner: P,
    last_record: Mutex<Option<ExecutionRecord>>,
}

impl<P: DataProvider> Monitored<P> {
    pub fn new(inner: P) -> Self {
        Self {
            inner,
            last_record: Mutex::new(None),
        }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }

    /// 直近の実行記録
    pub fn last_record(&self) -> Option<ExecutionRecord> {
        self.last_record.lock().ok().and_then(|guard| guard.clone())
    }
}

impl<P: DataProvider> DataProvider for Monitored<P> {
    type Output = P::Output;

    fn name(&self) -> &str {
        self.inner.name()
    }

    fn params(&self) -> serde_json::Value {
        self.inner.params()
    }

    fn execute(&self) -> DataResult<P::Output> {
        let name = self.inner.name().to_string();
        let params = self.inner.params();
        log::info!("[{}] 開始 params={}", name, params);

        let started_at = chrono::Local::now().to_rfc3339();
        let start = Instant::now();
        let result = self.inner.execute();
        let elapsed = start.elapsed();

        match &result {
            Ok(_) => log::info!("[{}] 完了 ({:.3}秒)", name, elapsed.as_secs_f64()),
            Err(e) => log::error!("[{}] 失敗 ({:.3}秒): {}", name, elapsed.as_secs_f64(), e),
        }

        let record = ExecutionRecord {
            provider: name,
            params,
            started_at,
            elapsed_ms: elapsed.as_millis(),
            success: result.is_ok(),
            error: result.as_ref().err().map(|e| e.to_string()),
        };
        if let Ok(mut guard) = self.last_record.lock() {
            *guard = Some(record);
        }

        result
    }
}
