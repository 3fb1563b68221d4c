//! Tesseract 进程适配器 - 基础设施层
//!
//! 通过 `tesseract` 命令行执行识别并解析它的 TSV 输出。识别本身完全
//! 由外部程序完成，这里只负责进程交互和结果转换。

use std::io::Write;
use std::process::{Command, Stdio};

use crate::error::EngineError;
use crate::infrastructure::ocr_pool::RecognitionEngine;
use crate::models::{Bbox, Block, RecognizeResult, Word};

/// Tesseract 引擎句柄
///
/// 每次识别启动一个子进程，图像从标准输入写入，TSV 从标准输出读取。
pub struct TesseractEngine {
    command: String,
    language: String,
}

impl TesseractEngine {
    /// 创建新的引擎句柄
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            command: "tesseract".to_string(),
            language: language.into(),
        }
    }

    /// 使用非默认的可执行文件路径
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = command.into();
        self
    }
}

impl RecognitionEngine for TesseractEngine {
    fn recognize(&mut self, image: &[u8]) -> Result<RecognizeResult, EngineError> {
        let mut child = Command::new(&self.command)
            .args(["stdin", "stdout", "-l", &self.language, "tsv"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| EngineError::SpawnFailed {
                command: self.command.clone(),
                source: Box::new(e),
            })?;

        // tesseract 读完整个输入之后才开始产出结果，先写后收不会互相阻塞
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(image)
                .map_err(|e| EngineError::RecognitionFailed {
                    message: format!("写入图像数据失败: {}", e),
                })?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| EngineError::RecognitionFailed {
                message: format!("等待识别进程失败: {}", e),
            })?;

        if !output.status.success() {
            return Err(EngineError::RecognitionFailed {
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        parse_tsv(&String::from_utf8_lossy(&output.stdout))
    }
}

/// TSV 解析过程中的文本块累加器
struct BlockAcc {
    bbox: Bbox,
    words: Vec<Word>,
    conf_sum: f64,
}

impl BlockAcc {
    fn new(bbox: Bbox) -> Self {
        Self {
            bbox,
            words: Vec::new(),
            conf_sum: 0.0,
        }
    }
}

/// 解析 tesseract 的 TSV 输出
///
/// 列依次为 level / page / block / par / line / word / left / top /
/// width / height / conf / text。level 2 开启一个文本块，level 5 是
/// 单词；块置信度取块内单词的平均值，整体置信度取全部单词的平均值。
/// 没有任何单词的块会被丢弃。
pub(crate) fn parse_tsv(tsv: &str) -> Result<RecognizeResult, EngineError> {
    let mut accs: Vec<BlockAcc> = Vec::new();
    let mut total_conf = 0.0f64;
    let mut total_words = 0usize;
    let mut data_lines = 0usize;
    let mut parsed_rows = 0usize;

    for line in tsv.lines() {
        if line.trim().is_empty() || line.starts_with("level") {
            continue;
        }
        data_lines += 1;

        let cols: Vec<&str> = line.split('\t').collect();
        if cols.len() < 12 {
            continue;
        }
        let level: u32 = match cols[0].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        let bbox = match bbox_from_cols(&cols) {
            Some(b) => b,
            None => continue,
        };
        parsed_rows += 1;

        match level {
            2 => accs.push(BlockAcc::new(bbox)),
            5 => {
                let text = cols[11].trim();
                let conf: f64 = cols[10].parse().unwrap_or(-1.0);
                if text.is_empty() || conf < 0.0 {
                    continue;
                }
                // 单词出现在任何块之前时，用单词自身的包围盒补一个块
                if accs.is_empty() {
                    accs.push(BlockAcc::new(bbox));
                }
                if let Some(acc) = accs.last_mut() {
                    acc.words.push(Word {
                        text: text.to_string(),
                    });
                    acc.conf_sum += conf;
                }
                total_conf += conf;
                total_words += 1;
            }
            _ => {}
        }
    }

    if data_lines > 0 && parsed_rows == 0 {
        return Err(EngineError::OutputParseFailed {
            message: "输出中没有可解析的 TSV 行".to_string(),
        });
    }

    let blocks = accs
        .into_iter()
        .filter(|acc| !acc.words.is_empty())
        .map(|acc| {
            let text = acc
                .words
                .iter()
                .map(|w| w.text.as_str())
                .collect::<Vec<_>>()
                .join(" ");
            let confidence = (acc.conf_sum / acc.words.len() as f64) as f32;
            Block {
                text,
                confidence,
                words: acc.words,
                polygon: None,
                bbox: Some(acc.bbox),
            }
        })
        .collect();

    let confidence = if total_words > 0 {
        (total_conf / total_words as f64) as f32
    } else {
        0.0
    };

    Ok(RecognizeResult { blocks, confidence })
}

fn bbox_from_cols(cols: &[&str]) -> Option<Bbox> {
    let left: f64 = cols[6].parse().ok()?;
    let top: f64 = cols[7].parse().ok()?;
    let width: f64 = cols[8].parse().ok()?;
    let height: f64 = cols[9].parse().ok()?;
    Some(Bbox {
        x0: left,
        y0: top,
        x1: left + width,
        y1: top + height,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_TSV: &str = "\
level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext
1\t1\t0\t0\t0\t0\t0\t0\t200\t100\t-1\t
2\t1\t1\t0\t0\t0\t10\t10\t100\t30\t-1\t
3\t1\t1\t1\t0\t0\t10\t10\t100\t30\t-1\t
4\t1\t1\t1\t1\t0\t10\t10\t100\t30\t-1\t
5\t1\t1\t1\t1\t1\t10\t10\t40\t30\t91.5\thello
5\t1\t1\t1\t1\t2\t60\t10\t50\t30\t88.5\tworld
2\t1\t2\t0\t0\t0\t10\t60\t80\t20\t-1\t
5\t1\t2\t1\t1\t1\t10\t60\t80\t20\t50\tnoise
";

    #[test]
    fn test_parse_blocks_and_words() {
        let result = parse_tsv(SAMPLE_TSV).unwrap();

        assert_eq!(result.blocks.len(), 2);

        let first = &result.blocks[0];
        assert_eq!(first.text, "hello world");
        assert_eq!(first.words.len(), 2);
        assert!((first.confidence - 90.0).abs() < 0.01);
        let bbox = first.bbox.expect("块应当带包围盒");
        assert_eq!(bbox.x0, 10.0);
        assert_eq!(bbox.y0, 10.0);
        assert_eq!(bbox.x1, 110.0);
        assert_eq!(bbox.y1, 40.0);

        let second = &result.blocks[1];
        assert_eq!(second.text, "noise");
        assert!((second.confidence - 50.0).abs() < 0.01);

        // 整体置信度 = 全部单词的平均
        assert!((result.confidence - (91.5 + 88.5 + 50.0) as f32 / 3.0).abs() < 0.01);
    }

    #[test]
    fn test_empty_output_is_empty_result() {
        let result = parse_tsv("").unwrap();
        assert!(result.blocks.is_empty());
        assert_eq!(result.confidence, 0.0);

        // 只有表头也算空结果
        let result = parse_tsv("level\tpage_num\n").unwrap();
        assert!(result.blocks.is_empty());
    }

    #[test]
    fn test_garbage_output_is_rejected() {
        let err = parse_tsv("not a tsv at all\njust some text\n").expect_err("应当解析失败");
        assert!(matches!(err, EngineError::OutputParseFailed { .. }));
    }

    #[test]
    fn test_blocks_without_words_are_dropped() {
        let tsv = "\
2\t1\t1\t0\t0\t0\t10\t10\t100\t30\t-1\t
";
        let result = parse_tsv(tsv).unwrap();
        assert!(result.blocks.is_empty());
    }
}
