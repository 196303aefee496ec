use crate::value_objects::{MessageId, MessageText, RoomId, Timestamp};

/// 一条聊天消息。持久化时分配 ID 和发送时间，之后不再修改。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub room_id: RoomId,
    pub text: MessageText,
    #[serde(with = "time::serde::rfc3339")]
    pub sent_at: Timestamp,
}

impl Message {
    pub fn new(id: MessageId, room_id: RoomId, text: MessageText, sent_at: Timestamp) -> Self {
        Self {
            id,
            room_id,
            text,
            sent_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn serializes_flat_fields_with_rfc3339_time() {
        let message = Message::new(
            MessageId::new("m1"),
            RoomId::new("general"),
            MessageText::new("hi").unwrap(),
            datetime!(2024-05-01 12:00:00 UTC),
        );

        let json = serde_json::to_value(&message).unwrap();
        assert_eq!(json["room_id"], "general");
        assert_eq!(json["text"], "hi");
        assert_eq!(json["sent_at"], "2024-05-01T12:00:00Z");
    }
}
