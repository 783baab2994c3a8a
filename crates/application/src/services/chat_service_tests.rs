//! 会话服务单元测试
//!
//! 覆盖会话目录（查找或创建、列表）、消息发送与广播、
//! 历史分页和已读追踪。

#[cfg(test)]
mod chat_service_tests {
    use std::sync::{Arc, Mutex};

    use chrono::{Duration, TimeZone, Utc};
    use domain::{DomainError, PasswordHash, Timestamp, User, UserEmail, UserId, UserName};
    use uuid::Uuid;

    use crate::{
        clock::Clock,
        error::ApplicationError,
        events::ServerEvent,
        registry::{ConnectionId, RoomRegistry},
        repository::memory::{
            InMemoryChatRepository, InMemoryMessageRepository, InMemoryUserRepository,
        },
        repository::{MessageRepository, UserRepository},
        services::{ChatService, ChatServiceDependencies, CreateChatRequest, SendMessageRequest},
    };

    /// 每次读取前进一秒的时钟，让排序断言是确定性的。
    struct StepClock {
        current: Mutex<Timestamp>,
    }

    impl StepClock {
        fn new() -> Self {
            Self {
                current: Mutex::new(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            }
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> Timestamp {
            let mut current = self.current.lock().unwrap();
            *current += Duration::seconds(1);
            *current
        }
    }

    struct TestContext {
        service: ChatService,
        users: Arc<InMemoryUserRepository>,
        messages: Arc<InMemoryMessageRepository>,
        registry: Arc<RoomRegistry>,
    }

    fn context() -> TestContext {
        let users = Arc::new(InMemoryUserRepository::new());
        let chats = Arc::new(InMemoryChatRepository::new());
        let messages = Arc::new(InMemoryMessageRepository::new());
        let registry = Arc::new(RoomRegistry::new());

        let service = ChatService::new(ChatServiceDependencies {
            chat_repository: chats,
            message_repository: messages.clone(),
            user_repository: users.clone(),
            clock: Arc::new(StepClock::new()),
            registry: registry.clone(),
        });

        TestContext {
            service,
            users,
            messages,
            registry,
        }
    }

    async fn seed_user(ctx: &TestContext, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        let user = User::new(
            UserId::from(id),
            UserName::parse(name).unwrap(),
            UserEmail::parse(format!("{name}@example.com")).unwrap(),
            PasswordHash::new("hashed").unwrap(),
            Utc::now(),
        );
        ctx.users.create(user).await.unwrap();
        id
    }

    #[tokio::test]
    async fn create_or_get_is_idempotent_across_order_and_duplicates() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;
        let carol = seed_user(&ctx, "carol").await;

        let first = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob, carol, bob],
            })
            .await
            .unwrap();
        assert!(first.created);
        assert_eq!(first.chat.participants.len(), 3);

        // 同一批人换个顺序、由另一个人发起，都解析到同一个会话
        let second = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: carol,
                participants: vec![alice, bob],
            })
            .await
            .unwrap();
        assert!(!second.created);
        assert_eq!(second.chat.id, first.chat.id);
    }

    #[tokio::test]
    async fn second_identical_call_returns_the_same_chat() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;

        let request = CreateChatRequest {
            requester_id: alice,
            participants: vec![bob],
        };

        let first = ctx.service.create_or_get_chat(request.clone()).await.unwrap();
        let second = ctx.service.create_or_get_chat(request).await.unwrap();

        assert!(first.created);
        assert!(!second.created);
        assert_eq!(first.chat.id, second.chat.id);

        let ids: Vec<Uuid> = first.chat.participants.iter().map(|p| p.id).collect();
        assert!(ids.contains(&alice));
        assert!(ids.contains(&bob));
    }

    #[tokio::test]
    async fn create_chat_rejects_missing_or_self_only_participants() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;

        let empty = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![],
            })
            .await;
        assert!(matches!(
            empty,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));

        let self_only = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![alice],
            })
            .await;
        assert!(matches!(
            self_only,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));
    }

    #[tokio::test]
    async fn create_chat_rejects_unknown_participants() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;

        let result = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![Uuid::new_v4()],
            })
            .await;
        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::UserNotFound))
        ));
    }

    #[tokio::test]
    async fn send_message_persists_updates_chat_and_broadcasts() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        // 模拟一个已加入该房间的连接
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ctx.registry
            .join(domain::ChatId::from(chat.id), ConnectionId::random(), tx);

        let sent = ctx
            .service
            .send_message(SendMessageRequest {
                chat_id: chat.id,
                sender_id: alice,
                text: "hi".to_owned(),
            })
            .await
            .unwrap();

        assert_eq!(sent.sender.id, alice);
        assert_eq!(sent.text, "hi");
        assert_eq!(sent.read_by, vec![alice]);

        match rx.try_recv().unwrap() {
            ServerEvent::Message { message } => assert_eq!(message.id, sent.id),
            other => panic!("expected message event, got {other:?}"),
        }

        // 会话的 lastMessage 跟着刷新，列表也按活跃时间排序
        let chats = ctx.service.list_chats_for(bob).await.unwrap();
        assert_eq!(chats.len(), 1);
        let last = chats[0].last_message.as_ref().unwrap();
        assert_eq!(last.id, sent.id);
    }

    #[tokio::test]
    async fn send_message_from_non_participant_is_rejected_without_side_effects() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;
        let mallory = seed_user(&ctx, "mallory").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        ctx.registry
            .join(domain::ChatId::from(chat.id), ConnectionId::random(), tx);

        let result = ctx
            .service
            .send_message(SendMessageRequest {
                chat_id: chat.id,
                sender_id: mallory,
                text: "let me in".to_owned(),
            })
            .await;

        assert!(matches!(
            result,
            Err(ApplicationError::Domain(DomainError::NotAParticipant))
        ));
        // 没有持久化，也没有广播
        let count = ctx
            .messages
            .count_for_chat(domain::ChatId::from(chat.id))
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn send_message_rejects_empty_text_and_unknown_chat() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        let empty = ctx
            .service
            .send_message(SendMessageRequest {
                chat_id: chat.id,
                sender_id: alice,
                text: "   ".to_owned(),
            })
            .await;
        assert!(matches!(
            empty,
            Err(ApplicationError::Domain(DomainError::InvalidArgument { .. }))
        ));

        let missing = ctx
            .service
            .send_message(SendMessageRequest {
                chat_id: Uuid::new_v4(),
                sender_id: alice,
                text: "hello".to_owned(),
            })
            .await;
        assert!(matches!(
            missing,
            Err(ApplicationError::Domain(DomainError::ChatNotFound))
        ));
    }

    #[tokio::test]
    async fn history_pages_are_disjoint_contiguous_and_newest_first() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        for i in 0..45 {
            ctx.service
                .send_message(SendMessageRequest {
                    chat_id: chat.id,
                    sender_id: alice,
                    text: format!("message {i}"),
                })
                .await
                .unwrap();
        }

        let page1 = ctx
            .service
            .chat_history(chat.id, alice, 1, 20)
            .await
            .unwrap();
        let page2 = ctx
            .service
            .chat_history(chat.id, alice, 2, 20)
            .await
            .unwrap();
        let page3 = ctx
            .service
            .chat_history(chat.id, alice, 3, 20)
            .await
            .unwrap();

        assert_eq!(page1.messages.len(), 20);
        assert_eq!(page2.messages.len(), 20);
        assert_eq!(page3.messages.len(), 5);
        assert_eq!(page1.total_messages, 45);
        assert_eq!(page1.total_pages, 3);
        assert_eq!(page1.messages[0].text, "message 44");
        assert_eq!(page2.messages[0].text, "message 24");
        assert_eq!(page3.messages[4].text, "message 0");

        // 两页之间没有重叠，时间上连续递减
        let all: Vec<&str> = page1
            .messages
            .iter()
            .chain(page2.messages.iter())
            .chain(page3.messages.iter())
            .map(|m| m.text.as_str())
            .collect();
        let expected: Vec<String> = (0..45).rev().map(|i| format!("message {i}")).collect();
        assert_eq!(all, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn viewing_history_marks_messages_read_idempotently() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        ctx.service
            .send_message(SendMessageRequest {
                chat_id: chat.id,
                sender_id: alice,
                text: "unread".to_owned(),
            })
            .await
            .unwrap();

        // 第一次拉取返回的是标记前的快照
        let first = ctx
            .service
            .chat_history(chat.id, bob, 1, 20)
            .await
            .unwrap();
        assert_eq!(first.messages[0].read_by, vec![alice]);

        // 第二次能看到自己已读，且不会重复追加
        let second = ctx
            .service
            .chat_history(chat.id, bob, 1, 20)
            .await
            .unwrap();
        assert_eq!(second.messages[0].read_by, vec![alice, bob]);

        let third = ctx
            .service
            .chat_history(chat.id, bob, 1, 20)
            .await
            .unwrap();
        assert_eq!(third.messages[0].read_by, vec![alice, bob]);
    }

    #[tokio::test]
    async fn history_requires_membership_and_an_existing_chat() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;
        let mallory = seed_user(&ctx, "mallory").await;

        let chat = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;

        let forbidden = ctx.service.chat_history(chat.id, mallory, 1, 20).await;
        assert!(matches!(
            forbidden,
            Err(ApplicationError::Domain(DomainError::NotAParticipant))
        ));

        let missing = ctx
            .service
            .chat_history(Uuid::new_v4(), alice, 1, 20)
            .await;
        assert!(matches!(
            missing,
            Err(ApplicationError::Domain(DomainError::ChatNotFound))
        ));
    }

    #[tokio::test]
    async fn chats_are_listed_most_recently_active_first() {
        let ctx = context();
        let alice = seed_user(&ctx, "alice").await;
        let bob = seed_user(&ctx, "bob").await;
        let carol = seed_user(&ctx, "carol").await;

        let with_bob = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![bob],
            })
            .await
            .unwrap()
            .chat;
        let with_carol = ctx
            .service
            .create_or_get_chat(CreateChatRequest {
                requester_id: alice,
                participants: vec![carol],
            })
            .await
            .unwrap()
            .chat;

        // 新创建的会话排在前面
        let chats = ctx.service.list_chats_for(alice).await.unwrap();
        assert_eq!(chats[0].id, with_carol.id);

        // 给旧会话发消息后它重新回到最前
        ctx.service
            .send_message(SendMessageRequest {
                chat_id: with_bob.id,
                sender_id: alice,
                text: "ping".to_owned(),
            })
            .await
            .unwrap();

        let chats = ctx.service.list_chats_for(alice).await.unwrap();
        assert_eq!(chats[0].id, with_bob.id);
        assert_eq!(chats[1].id, with_carol.id);
    }
}
