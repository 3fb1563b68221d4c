use std::collections::HashMap;

use crate::models::Tag;

/// Tag 名称索引
///
/// 运行开始前一次性构建，之后只读，因此可以被所有更新工作者无锁共享。
/// 名称匹配不区分大小写，一个 Tag 的所有别名都会进入索引。
#[derive(Debug, Default)]
pub struct TagIndex {
    map: HashMap<String, Tag>,
}

impl TagIndex {
    /// 创建空索引（Tag 提取被禁用时使用）
    pub fn new() -> Self {
        Self::default()
    }

    /// 从完整 Tag 列表构建索引
    pub fn from_tags(tags: Vec<Tag>) -> Self {
        let mut map = HashMap::new();
        for tag in tags {
            for name in &tag.names {
                map.insert(name.to_lowercase(), tag.clone());
            }
        }
        Self { map }
    }

    /// 按名称查找 Tag（不区分大小写）
    pub fn find_by_name(&self, name: &str) -> Option<&Tag> {
        self.map.get(&name.to_lowercase())
    }

    /// 索引中的名称数量
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
