//! 基于有界 mpsc 通道的推送句柄。
//!
//! 接收端交给传输层（例如 SSE 响应体），接收端被丢弃后推送返回 [`SinkError::Closed`]。

use application::{MessageSink, SinkError};
use async_trait::async_trait;
use domain::Message;
use tokio::sync::mpsc;

#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::Sender<Message>,
}

impl ChannelSink {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Message>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl MessageSink for ChannelSink {
    async fn push(&self, message: &Message) -> Result<(), SinkError> {
        self.sender
            .send(message.clone())
            .await
            .map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use domain::{MessageId, MessageText, RoomId};

    use super::*;

    fn message() -> Message {
        Message::new(
            MessageId::new("m1"),
            RoomId::new("r1"),
            MessageText::new("hi").unwrap(),
            time::OffsetDateTime::now_utc(),
        )
    }

    #[tokio::test]
    async fn delivers_to_receiver() {
        let (sink, mut receiver) = ChannelSink::channel(4);
        sink.push(&message()).await.unwrap();
        assert_eq!(receiver.recv().await.unwrap().id, MessageId::new("m1"));
    }

    #[tokio::test]
    async fn dropped_receiver_reports_closed() {
        let (sink, receiver) = ChannelSink::channel(4);
        drop(receiver);
        assert_eq!(sink.push(&message()).await, Err(SinkError::Closed));
    }
}
