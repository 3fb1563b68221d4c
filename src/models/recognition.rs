use crate::models::post::Coordinate;

/// 识别出的单词
#[derive(Debug, Clone)]
pub struct Word {
    pub text: String,
}

/// 文本块的像素包围盒
#[derive(Debug, Clone, Copy, Default)]
pub struct Bbox {
    pub x0: f64,
    pub y0: f64,
    pub x1: f64,
    pub y1: f64,
}

/// 识别出的文本块
///
/// `polygon`/`bbox` 均为像素坐标；转换为帖子注释时再按画布尺寸归一化。
/// 优先使用 polygon，缺失时退回 bbox 的四个角。
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub text: String,
    pub confidence: f32,
    pub words: Vec<Word>,
    pub polygon: Option<Vec<Coordinate>>,
    pub bbox: Option<Bbox>,
}

/// 一次识别的完整结果
#[derive(Debug, Clone, Default)]
pub struct RecognizeResult {
    pub blocks: Vec<Block>,
    /// 整体置信度（所有单词的平均）
    pub confidence: f32,
}
