use serde::{Deserialize, Serialize};

/// 归一化坐标（0-1 区间，相对于帖子画布）
pub type Coordinate = [f64; 2];

/// 精简 Tag（帖子快照中携带的形式）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MicroTag {
    pub names: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub usages: u64,
}

impl MicroTag {
    /// 获取主名称（names 的第一项）
    pub fn primary_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// 完整 Tag（Tag 列表接口返回的形式，带蕴含关系）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub names: Vec<String>,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub usages: u64,
    #[serde(default)]
    pub version: u32,
    #[serde(default)]
    pub implications: Vec<MicroTag>,
    #[serde(default)]
    pub suggestions: Vec<MicroTag>,
    #[serde(default)]
    pub description: Option<String>,
}

impl Tag {
    /// 获取主名称（names 的第一项）
    pub fn primary_name(&self) -> Option<&str> {
        self.names.first().map(String::as_str)
    }
}

/// 帖子上的空间注释
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub polygon: Vec<Coordinate>,
    pub text: String,
}

/// 帖子快照
///
/// 帖子归远端目录所有，流水线只持有只读快照；`version` 是任务创建时刻的
/// 版本号，更新时用于冲突检测。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: u64,
    pub version: u32,
    #[serde(default)]
    pub safety: String,
    #[serde(default, rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub mime_type: String,
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub content_url: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub creation_time: String,
    #[serde(default)]
    pub tags: Vec<MicroTag>,
    #[serde(default)]
    pub notes: Vec<Note>,
}

/// 分页搜索结果
#[derive(Debug, Clone, Deserialize)]
pub struct PagedSearchResult<T> {
    #[serde(default)]
    pub query: String,
    pub offset: usize,
    pub limit: usize,
    pub total: usize,
    pub results: Vec<T>,
}

/// 帖子更新补丁
///
/// 只携带发生变化的集合；两个字段都为 None 的补丁不应该被提交。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PostPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<Vec<Note>>,
}

impl PostPatch {
    /// 补丁是否为空（没有任何变化）
    pub fn is_empty(&self) -> bool {
        self.tags.is_none() && self.notes.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_post_deserializes_from_api_shape() {
        let value = json!({
            "id": 42,
            "version": 7,
            "safety": "safe",
            "type": "image",
            "mimeType": "image/png",
            "canvasWidth": 800,
            "canvasHeight": 600,
            "contentUrl": "posts/42.png",
            "thumbnailUrl": "thumbs/42.jpg",
            "creationTime": "2024-01-01T00:00:00Z",
            "tags": [{"names": ["cat", "neko"], "category": "default", "usages": 3}],
            "notes": [{"polygon": [[0.1, 0.2], [0.3, 0.2]], "text": "hi"}],
            "score": 5,
            "flags": []
        });

        let post: Post = serde_json::from_value(value).unwrap();
        assert_eq!(post.id, 42);
        assert_eq!(post.version, 7);
        assert_eq!(post.kind, "image");
        assert_eq!(post.canvas_width, 800);
        assert_eq!(post.content_url, "posts/42.png");
        assert_eq!(post.tags[0].primary_name(), Some("cat"));
        assert_eq!(post.notes[0].text, "hi");
    }

    #[test]
    fn test_post_tolerates_missing_optional_fields() {
        let value = json!({
            "id": 1,
            "version": 1,
            "canvasWidth": 10,
            "canvasHeight": 10,
            "contentUrl": "posts/1.png"
        });

        let post: Post = serde_json::from_value(value).unwrap();
        assert!(post.tags.is_empty());
        assert!(post.notes.is_empty());
    }

    #[test]
    fn test_patch_serializes_only_changed_collections() {
        let patch = PostPatch {
            tags: Some(vec!["cat".to_string()]),
            notes: None,
        };
        let value = serde_json::to_value(&patch).unwrap();

        assert_eq!(value, json!({"tags": ["cat"]}));
        // None 的集合不出现在请求体里
        assert!(value.get("notes").is_none());
    }
}
