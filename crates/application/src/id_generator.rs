//! 全局唯一、可按字典序排序的字符串标识符

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to generate id: {0}")]
pub struct IdGenerationError(pub String);

#[cfg_attr(test, mockall::automock)]
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Result<String, IdGenerationError>;
}

/// 基于 UUIDv7 的生成器。
///
/// UUIDv7 的高位是毫秒时间戳，不同毫秒生成的 ID 字符串按字典序递增。
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn generate(&self) -> Result<String, IdGenerationError> {
        Ok(Uuid::now_v7().to_string())
    }
}
