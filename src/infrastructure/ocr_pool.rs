//! OCR 引擎池 - 基础设施层
//!
//! 持有固定数量的识别引擎，只向上暴露 submit() 能力

use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};
use tracing::warn;

use crate::error::EngineError;
use crate::models::RecognizeResult;

/// 识别引擎
///
/// 一次完整的识别是 CPU 密集操作，引擎池会把它放到阻塞线程上执行。
/// 引擎句柄不要求线程安全：池保证同一句柄不会被两个调用者同时使用。
pub trait RecognitionEngine: Send + 'static {
    /// 对一段图像字节执行识别
    fn recognize(&mut self, image: &[u8]) -> Result<RecognizeResult, EngineError>;
}

/// OCR 引擎池
///
/// 池大小在构造时固定，是并发识别数的硬上限：调用方（OCR 队列的
/// 工作者）在没有空闲引擎时挂起在池内排队，而不是在队列里并发执行。
///
/// 空闲引擎通过通道流转：submit 取走一个引擎，识别完成后归还。
pub struct OcrPool {
    idle_tx: mpsc::UnboundedSender<Box<dyn RecognitionEngine>>,
    idle_rx: Arc<Mutex<mpsc::UnboundedReceiver<Box<dyn RecognitionEngine>>>>,
    size: usize,
}

impl OcrPool {
    /// 用一组引擎创建池
    pub fn new(engines: Vec<Box<dyn RecognitionEngine>>) -> Self {
        let size = engines.len();
        let (idle_tx, idle_rx) = mpsc::unbounded_channel();
        for engine in engines {
            // 通道由自己持有，初始灌入不会失败
            let _ = idle_tx.send(engine);
        }
        Self {
            idle_tx,
            idle_rx: Arc::new(Mutex::new(idle_rx)),
            size,
        }
    }

    /// 池中的引擎数量
    pub fn size(&self) -> usize {
        self.size
    }

    /// 提交一段图像执行识别
    ///
    /// 调用方会一直挂起到有空闲引擎且识别返回为止。识别失败原样向上
    /// 传播，池内不做任何重试。
    pub async fn submit(&self, image: Vec<u8>) -> Result<RecognizeResult, EngineError> {
        let mut engine = {
            let mut idle = self.idle_rx.lock().await;
            idle.recv().await.ok_or(EngineError::PoolClosed)?
        };

        let outcome = tokio::task::spawn_blocking(move || {
            let result = engine.recognize(&image);
            (engine, result)
        })
        .await;

        match outcome {
            Ok((engine, result)) => {
                // 归还引擎；池被丢弃时发送失败，忽略即可
                let _ = self.idle_tx.send(engine);
                result
            }
            Err(e) => {
                // 识别任务 panic，引擎随之丢失，池容量永久减一
                warn!("识别任务异常中止，引擎已丢失: {}", e);
                Err(EngineError::PassAborted {
                    source: Box::new(e),
                })
            }
        }
    }
}
