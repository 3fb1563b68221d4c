use async_trait::async_trait;

use crate::error::{DiscoveryError, FetchError, UpdateError};
use crate::models::{PagedSearchResult, Post, PostPatch, Tag};

pub mod szuru_client;

pub use szuru_client::SzuruClient;

/// 远端目录客户端
///
/// 流水线消费的全部远端能力都收拢在这个接口上：
/// - 分页列出帖子（发现阶段）
/// - 下载帖子资源（下载阶段）
/// - 条件更新帖子（更新阶段，携带版本号做冲突检测）
/// - 列出全部 Tag（运行前构建 Tag 索引用）
#[async_trait]
pub trait CatalogClient: Send + Sync {
    /// 分页列出帖子
    async fn list_posts(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<PagedSearchResult<Post>, DiscoveryError>;

    /// 下载帖子的资源内容
    async fn fetch_resource(&self, content_url: &str) -> Result<Vec<u8>, FetchError>;

    /// 更新帖子，`version` 不匹配时返回 [`UpdateError::Conflict`]
    async fn update_post(
        &self,
        post_id: u64,
        version: u32,
        patch: &PostPatch,
    ) -> Result<(), UpdateError>;

    /// 列出目录中的全部 Tag
    async fn list_all_tags(&self) -> Result<Vec<Tag>, DiscoveryError>;
}
