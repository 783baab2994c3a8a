use std::collections::HashSet;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use application::services::SendMessageRequest;
use application::{ApplicationError, ConnectionId, ServerEvent};
use domain::{ChatId, DomainError, UserProfile};

use crate::state::AppState;

/// 客户端通过 WebSocket 发来的事件。
///
/// 和服务端事件一样，事件名放在 `event` 字段里，未知事件
/// 在反序列化阶段直接失败。
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
enum ClientEvent {
    JoinChat { chat_id: Uuid },
    LeaveChat { chat_id: Uuid },
    SendMessage { chat_id: Uuid, text: String },
    Typing { chat_id: Uuid },
    StopTyping { chat_id: Uuid },
}

/// 单个已认证 WebSocket 连接。
///
/// 连接持有自己加入过的房间集合；断开时据此清理登记表，
/// 不需要全表扫描。客户端事件严格按到达顺序逐个处理，
/// 同一连接先 join 后 send 的效果是确定的。
pub struct ChatSocket {
    state: AppState,
    identity: UserProfile,
    connection_id: ConnectionId,
    joined: HashSet<ChatId>,
}

impl ChatSocket {
    pub fn new(state: AppState, identity: UserProfile) -> Self {
        Self {
            state,
            identity,
            connection_id: ConnectionId::random(),
            joined: HashSet::new(),
        }
    }

    /// 连接主循环。
    ///
    /// 出站走一条无界 channel：登记表广播和本连接的错误事件
    /// 共用同一个发送任务，慢客户端只会堆积自己的队列，
    /// 不会阻塞任何房间广播。
    pub async fn run(mut self, socket: WebSocket) {
        let (mut sink, mut incoming) = socket.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<ServerEvent>();

        let send_task = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let payload = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        tracing::warn!(error = %err, "failed to serialize websocket payload");
                        continue;
                    }
                };
                if sink.send(WsMessage::Text(payload.into())).await.is_err() {
                    break;
                }
            }
        });

        tracing::info!(user_id = %self.identity.id, connection_id = %self.connection_id, "websocket connected");

        while let Some(Ok(message)) = incoming.next().await {
            match message {
                WsMessage::Text(text) => {
                    self.handle_text(text.as_str(), &tx).await;
                }
                WsMessage::Close(_) => break,
                // axum 自动回复 ping，其余帧忽略
                WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Binary(_) => {}
            }
        }

        // 断开即离开所有房间；之后的广播不再包含这条连接
        self.state
            .registry
            .leave_all(self.connection_id, self.joined.drain());
        send_task.abort();

        tracing::info!(user_id = %self.identity.id, connection_id = %self.connection_id, "websocket disconnected");
    }

    async fn handle_text(&mut self, text: &str, tx: &mpsc::UnboundedSender<ServerEvent>) {
        let event: ClientEvent = match serde_json::from_str(text) {
            Ok(event) => event,
            Err(err) => {
                tracing::debug!(error = %err, "unparseable client event");
                Self::send_error(tx, "Unrecognized event");
                return;
            }
        };

        match event {
            ClientEvent::JoinChat { chat_id } => self.handle_join(chat_id, tx).await,
            ClientEvent::LeaveChat { chat_id } => self.handle_leave(chat_id),
            ClientEvent::SendMessage { chat_id, text } => {
                self.handle_send_message(chat_id, text, tx).await;
            }
            ClientEvent::Typing { chat_id } => self.handle_typing(chat_id, true),
            ClientEvent::StopTyping { chat_id } => self.handle_typing(chat_id, false),
        }
    }

    /// 加入房间前重新校验成员身份。校验失败只通知本连接，
    /// 登记表不变。
    async fn handle_join(&mut self, chat_id: Uuid, tx: &mpsc::UnboundedSender<ServerEvent>) {
        match self
            .state
            .chat_service
            .ensure_participant(chat_id, self.identity.id.into())
            .await
        {
            Ok(()) => {
                let chat_id = ChatId::from(chat_id);
                self.state
                    .registry
                    .join(chat_id, self.connection_id, tx.clone());
                self.joined.insert(chat_id);
                tracing::debug!(user_id = %self.identity.id, %chat_id, "joined chat room");
            }
            Err(ApplicationError::Domain(DomainError::ChatNotFound)) => {
                Self::send_error(tx, "Chat not found");
            }
            Err(ApplicationError::Domain(DomainError::NotAParticipant)) => {
                Self::send_error(tx, "You are not a participant of this chat");
            }
            Err(err) => {
                tracing::error!(error = %err, "join validation failed");
                Self::send_error(tx, "Failed to join chat");
            }
        }
    }

    fn handle_leave(&mut self, chat_id: Uuid) {
        let chat_id = ChatId::from(chat_id);
        // 没加入过也安全：登记表的 leave 是无副作用的空操作
        self.state.registry.leave(chat_id, self.connection_id);
        self.joined.remove(&chat_id);
    }

    /// 持久化并广播都在服务层完成；这里只负责把失败
    /// 回报给发送者自己的连接。
    async fn handle_send_message(
        &self,
        chat_id: Uuid,
        text: String,
        tx: &mpsc::UnboundedSender<ServerEvent>,
    ) {
        let result = self
            .state
            .chat_service
            .send_message(SendMessageRequest {
                chat_id,
                sender_id: self.identity.id.into(),
                text,
            })
            .await;

        if let Err(err) = result {
            let message = match &err {
                ApplicationError::Domain(DomainError::ChatNotFound) => "Chat not found",
                ApplicationError::Domain(DomainError::NotAParticipant) => {
                    "You are not a participant of this chat"
                }
                ApplicationError::Domain(DomainError::InvalidArgument { .. }) => {
                    "Message text must not be empty"
                }
                _ => {
                    tracing::error!(error = %err, "send message failed");
                    "Failed to send message"
                }
            };
            Self::send_error(tx, message);
        }
    }

    /// 输入状态只发给房间里除自己以外的连接。没有 join 过的
    /// 房间广播不到任何人，静默忽略即可。
    fn handle_typing(&self, chat_id: Uuid, started: bool) {
        let chat_id = ChatId::from(chat_id);
        let event = if started {
            ServerEvent::Typing {
                chat_id: chat_id.0,
                user_id: self.identity.id.into(),
                user_name: self.identity.name.clone(),
            }
        } else {
            ServerEvent::StopTyping {
                chat_id: chat_id.0,
                user_id: self.identity.id.into(),
                user_name: self.identity.name.clone(),
            }
        };
        self.state
            .registry
            .broadcast_except(chat_id, self.connection_id, &event);
    }

    fn send_error(tx: &mpsc::UnboundedSender<ServerEvent>, message: &str) {
        let _ = tx.send(ServerEvent::Error {
            message: message.to_string(),
        });
    }
}
