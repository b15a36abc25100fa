use std::fmt;

#[derive(Debug, Clone)]
pub enum RegistryStatsError {
    DatabaseConfig(String),
    DatabaseConnection(String),
    DatabaseOperation(String),
    Validation(String),
    UnknownPeriodType(String),
    DurationParse(String),
}

impl RegistryStatsError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            RegistryStatsError::DatabaseConfig(_) => "E001",
            RegistryStatsError::DatabaseConnection(_) => "E002",
            RegistryStatsError::DatabaseOperation(_) => "E003",
            RegistryStatsError::Validation(_) => "E004",
            RegistryStatsError::UnknownPeriodType(_) => "E005",
            RegistryStatsError::DurationParse(_) => "E006",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            RegistryStatsError::DatabaseConfig(_) => "Database Configuration Error",
            RegistryStatsError::DatabaseConnection(_) => "Database Connection Error",
            RegistryStatsError::DatabaseOperation(_) => "Database Operation Error",
            RegistryStatsError::Validation(_) => "Validation Error",
            RegistryStatsError::UnknownPeriodType(_) => "Unknown Period Type",
            RegistryStatsError::DurationParse(_) => "Duration Parse Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            RegistryStatsError::DatabaseConfig(msg) => msg,
            RegistryStatsError::DatabaseConnection(msg) => msg,
            RegistryStatsError::DatabaseOperation(msg) => msg,
            RegistryStatsError::Validation(msg) => msg,
            RegistryStatsError::UnknownPeriodType(msg) => msg,
            RegistryStatsError::DurationParse(msg) => msg,
        }
    }
}

impl fmt::Display for RegistryStatsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.error_type(), self.message())
    }
}

impl std::error::Error for RegistryStatsError {}

// 便捷的构造函数
impl RegistryStatsError {
    pub fn database_config<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::DatabaseConfig(msg.into())
    }

    pub fn database_connection<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::DatabaseConnection(msg.into())
    }

    pub fn database_operation<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::DatabaseOperation(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::Validation(msg.into())
    }

    pub fn unknown_period_type<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::UnknownPeriodType(msg.into())
    }

    pub fn duration_parse<T: Into<String>>(msg: T) -> Self {
        RegistryStatsError::DurationParse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, RegistryStatsError>;
