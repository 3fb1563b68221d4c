use std::fmt;

/// 应用程序错误类型
#[derive(Debug)]
pub enum AppError {
    /// 配置错误
    Config(ConfigError),
    /// 帖子分页发现错误（致命，终止整次运行）
    Discovery(DiscoveryError),
    /// 资源下载错误（任务被丢弃）
    Fetch(FetchError),
    /// OCR 引擎错误（任务被丢弃）
    Engine(EngineError),
    /// 帖子更新错误（任务被丢弃）
    Update(UpdateError),
    /// 检查点读写错误（致命，终止整次运行）
    Checkpoint(CheckpointError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(e) => write!(f, "配置错误: {}", e),
            AppError::Discovery(e) => write!(f, "发现错误: {}", e),
            AppError::Fetch(e) => write!(f, "下载错误: {}", e),
            AppError::Engine(e) => write!(f, "OCR错误: {}", e),
            AppError::Update(e) => write!(f, "更新错误: {}", e),
            AppError::Checkpoint(e) => write!(f, "检查点错误: {}", e),
        }
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            AppError::Config(e) => Some(e),
            AppError::Discovery(e) => Some(e),
            AppError::Fetch(e) => Some(e),
            AppError::Engine(e) => Some(e),
            AppError::Update(e) => Some(e),
            AppError::Checkpoint(e) => Some(e),
        }
    }
}

/// 配置错误
#[derive(Debug)]
pub enum ConfigError {
    /// 读取配置文件失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// TOML 解析失败
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 配置内容不合法
    Invalid { message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::ReadFailed { path, source } => {
                write!(f, "读取配置文件失败 ({}): {}", path, source)
            }
            ConfigError::ParseFailed { path, source } => {
                write!(f, "TOML解析失败 ({}): {}", path, source)
            }
            ConfigError::Invalid { message } => write!(f, "配置不合法: {}", message),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::ReadFailed { source, .. } | ConfigError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            ConfigError::Invalid { .. } => None,
        }
    }
}

/// 帖子分页发现错误
///
/// 分页调用失败后控制器无法安全判断完成条件，因此一律视为致命错误。
#[derive(Debug)]
pub enum DiscoveryError {
    /// 网络请求失败
    RequestFailed {
        endpoint: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误状态码
    BadStatus { endpoint: String, status: u16 },
    /// JSON 解析失败
    JsonParseFailed {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscoveryError::RequestFailed { endpoint, source } => {
                write!(f, "分页请求失败 ({}): {}", endpoint, source)
            }
            DiscoveryError::BadStatus { endpoint, status } => {
                write!(f, "分页请求返回错误状态 ({}): HTTP {}", endpoint, status)
            }
            DiscoveryError::JsonParseFailed { source } => {
                write!(f, "JSON解析失败: {}", source)
            }
        }
    }
}

impl std::error::Error for DiscoveryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DiscoveryError::RequestFailed { source, .. }
            | DiscoveryError::JsonParseFailed { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            DiscoveryError::BadStatus { .. } => None,
        }
    }
}

/// 资源下载错误
#[derive(Debug)]
pub enum FetchError {
    /// 网络请求失败
    RequestFailed {
        url: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 资源返回错误状态码
    BadStatus { url: String, status: u16 },
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::RequestFailed { url, source } => {
                write!(f, "资源下载失败 ({}): {}", url, source)
            }
            FetchError::BadStatus { url, status } => {
                write!(f, "资源不可用 ({}): HTTP {}", url, status)
            }
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            FetchError::BadStatus { .. } => None,
        }
    }
}

/// OCR 引擎错误
#[derive(Debug)]
pub enum EngineError {
    /// 启动识别进程失败
    SpawnFailed {
        command: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 识别过程失败
    RecognitionFailed { message: String },
    /// 识别输出无法解析
    OutputParseFailed { message: String },
    /// 识别任务异常中止（引擎随任务一起丢失）
    PassAborted {
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 引擎池已关闭
    PoolClosed,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::SpawnFailed { command, source } => {
                write!(f, "无法启动识别进程 ({}): {}", command, source)
            }
            EngineError::RecognitionFailed { message } => {
                write!(f, "识别失败: {}", message)
            }
            EngineError::OutputParseFailed { message } => {
                write!(f, "识别输出解析失败: {}", message)
            }
            EngineError::PassAborted { source } => {
                write!(f, "识别任务异常中止: {}", source)
            }
            EngineError::PoolClosed => write!(f, "引擎池已关闭"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::SpawnFailed { source, .. } | EngineError::PassAborted { source } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 帖子更新错误
#[derive(Debug)]
pub enum UpdateError {
    /// 版本冲突（帖子在发现之后被他人修改过）
    Conflict { post_id: u64, version: u32 },
    /// 网络请求失败
    RequestFailed {
        post_id: u64,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// API 返回错误状态码
    BadStatus { post_id: u64, status: u16 },
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateError::Conflict { post_id, version } => {
                write!(f, "帖子 {} 版本冲突 (本地版本: {})", post_id, version)
            }
            UpdateError::RequestFailed { post_id, source } => {
                write!(f, "更新帖子 {} 失败: {}", post_id, source)
            }
            UpdateError::BadStatus { post_id, status } => {
                write!(f, "更新帖子 {} 返回错误状态: HTTP {}", post_id, status)
            }
        }
    }
}

impl std::error::Error for UpdateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            UpdateError::RequestFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
            _ => None,
        }
    }
}

/// 检查点读写错误
#[derive(Debug)]
pub enum CheckpointError {
    /// 读取检查点失败
    ReadFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 写入检查点失败
    WriteFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
    /// 检查点所在文档无法解析
    ParseFailed {
        path: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl fmt::Display for CheckpointError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckpointError::ReadFailed { path, source } => {
                write!(f, "读取检查点失败 ({}): {}", path, source)
            }
            CheckpointError::WriteFailed { path, source } => {
                write!(f, "写入检查点失败 ({}): {}", path, source)
            }
            CheckpointError::ParseFailed { path, source } => {
                write!(f, "检查点文档解析失败 ({}): {}", path, source)
            }
        }
    }
}

impl std::error::Error for CheckpointError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CheckpointError::ReadFailed { source, .. }
            | CheckpointError::WriteFailed { source, .. }
            | CheckpointError::ParseFailed { source, .. } => {
                Some(source.as_ref() as &(dyn std::error::Error + 'static))
            }
        }
    }
}

// ========== 从分类错误转换 ==========

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<DiscoveryError> for AppError {
    fn from(err: DiscoveryError) -> Self {
        AppError::Discovery(err)
    }
}

impl From<FetchError> for AppError {
    fn from(err: FetchError) -> Self {
        AppError::Fetch(err)
    }
}

impl From<EngineError> for AppError {
    fn from(err: EngineError) -> Self {
        AppError::Engine(err)
    }
}

impl From<UpdateError> for AppError {
    fn from(err: UpdateError) -> Self {
        AppError::Update(err)
    }
}

impl From<CheckpointError> for AppError {
    fn from(err: CheckpointError) -> Self {
        AppError::Checkpoint(err)
    }
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建配置不合法错误
    pub fn config_invalid(message: impl Into<String>) -> Self {
        AppError::Config(ConfigError::Invalid {
            message: message.into(),
        })
    }
}

impl ConfigError {
    /// 创建配置读取错误
    pub fn read_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConfigError::ReadFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }

    /// 创建配置解析错误
    pub fn parse_failed(
        path: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        ConfigError::ParseFailed {
            path: path.into(),
            source: Box::new(source),
        }
    }
}

impl DiscoveryError {
    /// 创建分页请求失败错误
    pub fn request_failed(
        endpoint: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DiscoveryError::RequestFailed {
            endpoint: endpoint.into(),
            source: Box::new(source),
        }
    }
}

impl FetchError {
    /// 创建资源请求失败错误
    pub fn request_failed(
        url: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        FetchError::RequestFailed {
            url: url.into(),
            source: Box::new(source),
        }
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type Result<T> = std::result::Result<T, AppError>;
