use crate::errors::DomainError;
use crate::value_objects::RoomId;

const MAX_NAME_LEN: usize = 60;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ChatRoom {
    pub id: RoomId,
    pub name: String,
}

impl ChatRoom {
    pub fn new(id: RoomId, name: impl Into<String>) -> Result<Self, DomainError> {
        let name = Self::validate_name(name.into())?;
        Ok(Self { id, name })
    }

    fn validate_name(name: String) -> Result<String, DomainError> {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            return Err(DomainError::invalid_argument("name", "cannot be empty"));
        }
        if trimmed.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::invalid_argument("name", "too long"));
        }
        Ok(trimmed.to_owned())
    }
}
