use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dto::MessageDto;

/// 服务端推送给客户端的实时事件。
///
/// 每个事件是一个固定 schema 的标签变体，事件名放在 `event` 字段里。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// 新消息，广播给房间内所有连接（含发送者自己的连接）。
    Message { message: MessageDto },
    /// 正在输入提示，广播给房间内除发送者外的连接。
    Typing {
        chat_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },
    /// 停止输入提示。
    StopTyping {
        chat_id: Uuid,
        user_id: Uuid,
        user_name: String,
    },
    /// 仅发给出错连接本身的错误事件，房间内其他连接不受影响。
    Error { message: String },
}
