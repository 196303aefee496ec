use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use application::ChatService;
use domain::RoomId;
use infrastructure::{Infrastructure, InfrastructureConfig};
use serde_json::Value;
use tokio::{net::TcpListener, sync::oneshot};
use tokio_util::sync::CancellationToken;
use web_api::{router, AppState, StreamSettings};

/// 监听随机端口的测试服务
pub struct TestApp {
    pub base: String,
    pub client: reqwest::Client,
    pub service: Arc<ChatService>,
    /// 与服务共享的关闭令牌
    pub stopping: CancellationToken,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestApp {
    pub async fn spawn() -> Self {
        let infra = Infrastructure::build(InfrastructureConfig::default());
        let service = Arc::new(infra.chat_service());
        let state = AppState::new(
            Arc::clone(&service),
            StreamSettings {
                sink_capacity: 16,
                keep_alive: Duration::from_secs(1),
            },
        );
        let stopping = state.shutdown_token();

        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr: SocketAddr = listener.local_addr().expect("addr");
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router(state).into_make_service())
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        Self {
            base: format!("http://{}", addr),
            client: reqwest::Client::new(),
            service,
            stopping,
            shutdown: Some(shutdown_tx),
        }
    }

    pub async fn call(&self, method: &str, body: Value) -> reqwest::Response {
        self.client
            .post(format!("{}/api.ChatService/{}", self.base, method))
            .json(&body)
            .send()
            .await
            .expect("request")
    }

    pub async fn call_ok(&self, method: &str, body: Value) -> Value {
        let response = self.call(method, body).await;
        assert!(
            response.status().is_success(),
            "{} returned {}",
            method,
            response.status()
        );
        response.json().await.expect("json body")
    }

    pub async fn wait_for_streams(&self, room_id: &str, expected: usize) {
        let room_id = RoomId::new(room_id);
        tokio::time::timeout(Duration::from_secs(5), async {
            while self.service.streams().active_streams(&room_id) != expected {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("streams did not reach expected count");
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

/// 从 SSE 响应体里逐个读取 `data:` 事件
pub struct EventReader {
    response: reqwest::Response,
    buffer: String,
}

impl EventReader {
    pub fn new(response: reqwest::Response) -> Self {
        Self {
            response,
            buffer: String::new(),
        }
    }

    /// 下一条事件的 JSON 数据，流结束时返回 `None`
    pub async fn next(&mut self) -> Option<Value> {
        loop {
            while let Some(end) = self.buffer.find("\n\n") {
                let frame: String = self.buffer.drain(..end + 2).collect();
                let data: Vec<&str> = frame
                    .lines()
                    .filter_map(|line| line.strip_prefix("data:"))
                    .map(str::trim_start)
                    .collect();
                if !data.is_empty() {
                    return Some(serde_json::from_str(&data.join("\n")).expect("event json"));
                }
            }

            let chunk = tokio::time::timeout(Duration::from_secs(5), self.response.chunk())
                .await
                .expect("timed out waiting for event")
                .expect("body chunk")?;
            self.buffer.push_str(&String::from_utf8_lossy(&chunk));
        }
    }
}
