//! 注释提取 - 业务能力层
//!
//! 把一次 OCR 结果按提取策略转换为帖子补丁：
//! 1. 先按帖子已有内容判定两个类别是否可处理
//! 2. 达到阈值的文本块转为空间注释（坐标归一化到 0-1）
//! 3. 整体置信度达标时逐词匹配 Tag 索引，命中则连同一阶蕴含一起加入
//! 4. 只有产生了新注释或新 Tag 才会生成补丁
//!
//! 本模块是纯逻辑，不做任何 I/O。

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ExtractBehavior, ExtractPolicy};
use crate::models::{Block, Coordinate, MicroTag, Note, Post, PostPatch, RecognizeResult, Tag};
use crate::services::tag_index::TagIndex;
use crate::utils::logging::truncate_text;

/// 单个帖子的可处理性判定结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allowance {
    pub any: bool,
    pub notes: bool,
    pub tags: bool,
}

/// 补丁组装过程中的 Tag 引用
///
/// 帖子快照里只有精简 Tag，索引匹配到的是完整 Tag（带蕴含关系），
/// 两种形式在去重时等价，展开名称时只有完整 Tag 会带出蕴含。
#[derive(Debug, Clone)]
pub enum TagRef {
    Existing(MicroTag),
    Matched(Tag),
}

impl TagRef {
    fn names(&self) -> &[String] {
        match self {
            TagRef::Existing(tag) => &tag.names,
            TagRef::Matched(tag) => &tag.names,
        }
    }
}

/// 注释提取器
///
/// 策略与 Tag 索引在整次运行中不可变，可被所有更新工作者共享。
pub struct AnnotationExtractor {
    policy: ExtractPolicy,
    threshold: f32,
    tag_index: Arc<TagIndex>,
}

impl AnnotationExtractor {
    /// 创建新的注释提取器
    pub fn new(policy: ExtractPolicy, threshold: f32, tag_index: Arc<TagIndex>) -> Self {
        Self {
            policy,
            threshold,
            tag_index,
        }
    }

    /// 本次运行生效的提取策略
    pub fn policy(&self) -> &ExtractPolicy {
        &self.policy
    }

    /// 判定一个帖子的两个类别是否可处理
    ///
    /// 已经带有某类别内容的帖子，只有该类别行为不是 skip-if-present
    /// 时才会继续处理。
    pub fn allowance(&self, post: &Post) -> Allowance {
        let tags = self.policy.tags.enable
            && (post.tags.is_empty() || self.policy.tags.behavior != ExtractBehavior::SkipIfPresent);
        let notes = self.policy.notes.enable
            && (post.notes.is_empty()
                || self.policy.notes.behavior != ExtractBehavior::SkipIfPresent);

        Allowance {
            any: tags || notes,
            notes,
            tags,
        }
    }

    /// 把识别结果转换为帖子补丁
    ///
    /// 没有产生任何新注释或新 Tag 时返回 None，调用方不应发起更新。
    pub fn build_patch(&self, post: &Post, result: &RecognizeResult) -> Option<PostPatch> {
        let allowance = self.allowance(post);

        // 起始集合：add 行为在已有内容上追加，其余行为从空集重建
        let mut notes: Option<Vec<Note>> = allowance.notes.then(|| {
            if self.policy.notes.behavior == ExtractBehavior::Add {
                post.notes.clone()
            } else {
                Vec::new()
            }
        });
        let mut tags: Option<Vec<TagRef>> = allowance.tags.then(|| {
            if self.policy.tags.behavior == ExtractBehavior::Add {
                post.tags.iter().cloned().map(TagRef::Existing).collect()
            } else {
                Vec::new()
            }
        });

        let mut new_notes = false;
        let mut new_tags = false;

        for block in &result.blocks {
            if block.confidence < self.threshold {
                debug!(
                    "[帖子 {}] 文本块置信度 {:.1} 低于阈值 {:.1}，跳过",
                    post.id, block.confidence, self.threshold
                );
                continue;
            }

            debug!(
                "[帖子 {}] 发现文本块 => {}",
                post.id,
                truncate_text(&block.text, 80)
            );

            if let Some(notes) = notes.as_mut() {
                match polygon_from_block(post, block) {
                    None => {
                        warn!("[帖子 {}] 无法确定该文本块的多边形区域", post.id);
                    }
                    Some(polygon) => {
                        // 已存在相同文本的注释时不再添加
                        if notes.iter().any(|n| n.text == block.text) {
                            debug!("[帖子 {}] 已存在相同文本的注释，不再添加", post.id);
                        } else {
                            info!("[帖子 {}] 添加注释", post.id);
                            new_notes = true;
                            notes.push(Note {
                                polygon,
                                text: block.text.clone(),
                            });
                        }
                    }
                }
            }

            // Tag 匹配额外要求整体置信度超过阈值
            if result.confidence > self.threshold {
                if let Some(tags) = tags.as_mut() {
                    for word in &block.words {
                        let lookup = word.text.trim().to_lowercase();
                        if lookup.is_empty() {
                            continue;
                        }

                        let exists = tags
                            .iter()
                            .any(|t| t.names().iter().any(|n| n.to_lowercase() == lookup));
                        if exists {
                            debug!(
                                "[帖子 {}] Tag '{}' 已存在于该帖子，跳过",
                                post.id, word.text
                            );
                            continue;
                        }

                        if let Some(tag) = self.tag_index.find_by_name(&lookup) {
                            info!(
                                "[帖子 {}] 添加匹配到的 Tag '{}'",
                                post.id,
                                tag.primary_name().unwrap_or(&word.text)
                            );
                            new_tags = true;
                            tags.push(TagRef::Matched(tag.clone()));
                        }
                    }
                }
            }
        }

        let notes_payload = match notes {
            Some(list) if new_notes && !list.is_empty() => Some(list),
            _ => None,
        };
        let tags_payload = match tags {
            Some(list) if new_tags && !list.is_empty() => Some(flatten_tag_names(&list)),
            _ => None,
        };

        if notes_payload.is_none() && tags_payload.is_none() {
            return None;
        }

        Some(PostPatch {
            tags: tags_payload,
            notes: notes_payload,
        })
    }
}

/// 把文本块的像素区域归一化为帖子坐标（0-1）
///
/// 优先使用多边形，缺失时退回包围盒的四个角；两者都没有或画布尺寸
/// 非法时返回 None。
pub fn polygon_from_block(post: &Post, block: &Block) -> Option<Vec<Coordinate>> {
    let width = post.canvas_width as f64;
    let height = post.canvas_height as f64;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }

    if let Some(polygon) = &block.polygon {
        if !polygon.is_empty() {
            return Some(
                polygon
                    .iter()
                    .map(|[x, y]| [x / width, y / height])
                    .collect(),
            );
        }
    }

    block.bbox.as_ref().map(|bbox| {
        vec![
            [bbox.x0 / width, bbox.y0 / height],
            [bbox.x1 / width, bbox.y0 / height],
            [bbox.x1 / width, bbox.y1 / height],
            [bbox.x0 / width, bbox.y1 / height],
        ]
    })
}

/// 把 Tag 引用展开为补丁里的名称列表
///
/// 匹配到的完整 Tag 先展开一阶蕴含的主名称，再放自己的主名称。
fn flatten_tag_names(tags: &[TagRef]) -> Vec<String> {
    let mut names = Vec::new();
    for tag in tags {
        if let TagRef::Matched(full) = tag {
            for implication in &full.implications {
                if let Some(name) = implication.primary_name() {
                    names.push(name.to_string());
                }
            }
        }
        if let Some(name) = tag.names().first() {
            names.push(name.clone());
        }
    }
    names
}
