/// Szurubooru API 客户端
///
/// 封装所有与 Szurubooru 后端相关的调用逻辑
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::Serialize;
use tracing::debug;

use crate::clients::CatalogClient;
use crate::config::Config;
use crate::error::{DiscoveryError, FetchError, UpdateError};
use crate::models::{PagedSearchResult, Post, PostPatch, Tag};

/// Szurubooru API 客户端
pub struct SzuruClient {
    http: reqwest::Client,
    /// 后端 API 地址
    api_url: String,
    /// 前端地址，帖子资源相对于它定位
    front_url: String,
    /// `Token base64(user:token)` 形式的认证头
    auth: String,
    /// 附加在帖子搜索上的查询串
    query: Option<String>,
}

/// 更新请求体：版本号 + 变化的集合
#[derive(Serialize)]
struct UpdateBody<'a> {
    version: u32,
    #[serde(flatten)]
    patch: &'a PostPatch,
}

impl SzuruClient {
    /// 创建新的 Szurubooru 客户端
    pub fn new(config: &Config) -> Self {
        let credentials = format!("{}:{}", config.szuru.user, config.szuru.token);
        Self {
            http: reqwest::Client::new(),
            api_url: config.szuru.endpoints.back.trim_end_matches('/').to_string(),
            front_url: config.szuru.endpoints.front.trim_end_matches('/').to_string(),
            auth: format!("Token {}", STANDARD.encode(credentials)),
            query: config.szuru.query.clone(),
        }
    }

    fn api_endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_url, path)
    }

    async fn get_tags_page(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<PagedSearchResult<Tag>, DiscoveryError> {
        let endpoint = self.api_endpoint("tags");
        let response = self
            .http
            .get(&endpoint)
            .header("Authorization", &self.auth)
            .header("Accept", "application/json")
            .query(&[("offset", offset.to_string()), ("limit", limit.to_string())])
            .send()
            .await
            .map_err(|e| DiscoveryError::request_failed(endpoint.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::BadStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DiscoveryError::JsonParseFailed { source: Box::new(e) })
    }
}

#[async_trait]
impl CatalogClient for SzuruClient {
    async fn list_posts(
        &self,
        offset: usize,
        limit: usize,
    ) -> Result<PagedSearchResult<Post>, DiscoveryError> {
        let endpoint = self.api_endpoint("posts");

        let mut params = vec![
            ("offset".to_string(), offset.to_string()),
            ("limit".to_string(), limit.to_string()),
        ];
        if let Some(query) = &self.query {
            params.push(("query".to_string(), query.clone()));
        }

        let response = self
            .http
            .get(&endpoint)
            .header("Authorization", &self.auth)
            .header("Accept", "application/json")
            .query(&params)
            .send()
            .await
            .map_err(|e| DiscoveryError::request_failed(endpoint.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::BadStatus {
                endpoint,
                status: status.as_u16(),
            });
        }

        response
            .json()
            .await
            .map_err(|e| DiscoveryError::JsonParseFailed { source: Box::new(e) })
    }

    async fn fetch_resource(&self, content_url: &str) -> Result<Vec<u8>, FetchError> {
        let url = format!("{}/{}", self.front_url, content_url.trim_start_matches('/'));
        debug!("正在下载 {}", url);

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| FetchError::request_failed(url.clone(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::BadStatus {
                url,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| FetchError::request_failed(url, e))?;
        Ok(bytes.to_vec())
    }

    async fn update_post(
        &self,
        post_id: u64,
        version: u32,
        patch: &PostPatch,
    ) -> Result<(), UpdateError> {
        let endpoint = self.api_endpoint(&format!("post/{}", post_id));

        let response = self
            .http
            .put(&endpoint)
            .header("Authorization", &self.auth)
            .header("Accept", "application/json")
            .json(&UpdateBody { version, patch })
            .send()
            .await
            .map_err(|e| UpdateError::RequestFailed {
                post_id,
                source: Box::new(e),
            })?;

        let status = response.status();
        if status.as_u16() == 409 {
            return Err(UpdateError::Conflict { post_id, version });
        }
        if !status.is_success() {
            // 错误响应里通常带有 description，记下来便于排查
            if let Ok(body) = response.json::<serde_json::Value>().await {
                if let Some(description) = body.get("description").and_then(|v| v.as_str()) {
                    debug!("更新帖子 {} 的错误响应: {}", post_id, description);
                }
            }
            return Err(UpdateError::BadStatus {
                post_id,
                status: status.as_u16(),
            });
        }

        Ok(())
    }

    async fn list_all_tags(&self) -> Result<Vec<Tag>, DiscoveryError> {
        debug!("正在获取全部 Tag...");

        let mut tags: Vec<Tag> = Vec::new();
        let mut offset = 0;
        let mut total = 1;
        let limit = 100;

        while tags.len() < total {
            let page = self.get_tags_page(offset, limit).await?;
            if page.total == 0 {
                break;
            }
            total = page.total;
            if page.results.is_empty() {
                // 服务端声称还有更多却返回空页，停止翻页以免死循环
                break;
            }
            tags.extend(page.results);
            debug!("已获取 {}/{} 个 Tag...", tags.len(), total);
            offset += limit;
        }

        Ok(tags)
    }
}
