//! 房间成员表。
//!
//! 显式维护 "房间 id → 当前加入的活动连接" 的并发映射，
//! 广播时直接枚举这份表。加入、离开、广播都走同一把读写锁；
//! 发送端是无界 mpsc，慢连接不会阻塞对其他连接的投递。

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use domain::ChatId;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::events::ServerEvent;

/// 单个活动连接的标识，与用户 id 无关：同一用户可以有多个连接。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

type EventSender = mpsc::UnboundedSender<ServerEvent>;

#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<ChatId, HashMap<ConnectionId, EventSender>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 把连接加入房间。重复加入会覆盖旧的发送端，是幂等操作。
    pub fn join(&self, chat_id: ChatId, connection_id: ConnectionId, sender: EventSender) {
        let mut rooms = self.rooms.write().expect("room registry lock poisoned");
        rooms
            .entry(chat_id)
            .or_default()
            .insert(connection_id, sender);
    }

    /// 把连接从房间移除。未加入时是 no-op。
    pub fn leave(&self, chat_id: ChatId, connection_id: ConnectionId) {
        let mut rooms = self.rooms.write().expect("room registry lock poisoned");
        if let Some(members) = rooms.get_mut(&chat_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(&chat_id);
            }
        }
    }

    /// 断开时清理该连接加入过的所有房间。
    pub fn leave_all<I>(&self, connection_id: ConnectionId, joined: I)
    where
        I: IntoIterator<Item = ChatId>,
    {
        let mut rooms = self.rooms.write().expect("room registry lock poisoned");
        for chat_id in joined {
            if let Some(members) = rooms.get_mut(&chat_id) {
                members.remove(&connection_id);
                if members.is_empty() {
                    rooms.remove(&chat_id);
                }
            }
        }
    }

    /// 广播给房间内所有连接（含发送者），返回投递数。
    ///
    /// 在读锁下取得成员快照后再发送：与广播并发加入的连接
    /// 可能收不到这一条，但一定能收到之后的每一条。
    pub fn broadcast(&self, chat_id: ChatId, event: &ServerEvent) -> usize {
        self.fan_out(chat_id, None, event)
    }

    /// 广播给房间内除指定连接外的其他连接。
    pub fn broadcast_except(
        &self,
        chat_id: ChatId,
        except: ConnectionId,
        event: &ServerEvent,
    ) -> usize {
        self.fan_out(chat_id, Some(except), event)
    }

    fn fan_out(
        &self,
        chat_id: ChatId,
        except: Option<ConnectionId>,
        event: &ServerEvent,
    ) -> usize {
        let snapshot: Vec<EventSender> = {
            let rooms = self.rooms.read().expect("room registry lock poisoned");
            match rooms.get(&chat_id) {
                Some(members) => members
                    .iter()
                    .filter(|(id, _)| Some(**id) != except)
                    .map(|(_, sender)| sender.clone())
                    .collect(),
                None => return 0,
            }
        };

        let mut delivered = 0;
        for sender in snapshot {
            // 接收端已随连接一起销毁时发送失败，忽略即可
            if sender.send(event.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    #[cfg(test)]
    fn room_size(&self, chat_id: ChatId) -> usize {
        self.rooms
            .read()
            .expect("room registry lock poisoned")
            .get(&chat_id)
            .map(|members| members.len())
            .unwrap_or(0)
    }
}
