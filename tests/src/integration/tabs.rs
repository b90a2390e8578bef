//! # Content Scripts
//!
//! Content scripts all share the port name `"content"` and are told apart
//! by tab handle.

#[cfg(test)]
mod tests {
    use futures::StreamExt;
    use serde_json::{json, Value};
    use switchboard::{
        BusError, ListenerError, MessageListener, MessageSender, SendOptions, TargetId,
    };

    use crate::integration::fixtures::{name, seen, within, Contexts, Seen};

    fn recording(log: &Seen<(MessageSender, Value)>) -> MessageListener {
        let log = log.clone();
        MessageListener::plain(move |payload, sender| {
            log.lock().push((sender, payload));
            Ok(())
        })
    }

    #[tokio::test]
    async fn test_content_script_is_keyed_by_tab() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let content = contexts.tab(7);

        let log = seen();
        background.scope("root").on(&recording(&log), None);

        within(content.scope("root").send(json!("from tab"), SendOptions::to("background")))
            .await
            .unwrap();

        assert!(background.ports().has(&TargetId::Tab(7)));
        assert!(content.ports().has(&name("background")));

        let log = log.lock();
        assert_eq!(log.len(), 1);
        let (sender, payload) = &log[0];
        assert_eq!(sender.tab_id(), Some(7));
        assert_eq!(sender.origin, Some(name("content")));
        assert_eq!(payload, &json!("from tab"));
    }

    #[tokio::test]
    async fn test_send_to_tab_reaches_only_that_tab() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let first = contexts.tab(7);
        let second = contexts.tab(8);

        let at_first = seen();
        let at_second = seen();
        first.scope("root").on(&recording(&at_first), None);
        second.scope("root").on(&recording(&at_second), None);

        let root = background.scope("root");
        within(root.send(json!("seven"), SendOptions::to_tab(7))).await.unwrap();
        within(root.send(json!("eight"), SendOptions::to_tab(8))).await.unwrap();

        let payloads = |log: &Seen<(MessageSender, Value)>| -> Vec<Value> {
            log.lock().iter().map(|(_, payload)| payload.clone()).collect()
        };
        assert_eq!(payloads(&at_first), vec![json!("seven")]);
        assert_eq!(payloads(&at_second), vec![json!("eight")]);
        assert_eq!(at_first.lock()[0].0.port, name("background"));
    }

    #[tokio::test]
    async fn test_named_tab_message_matches_content_listeners() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let content = contexts.tab(3);

        let log = seen();
        content.scope("root").on(&recording(&log), None);

        let options = SendOptions {
            target: Some("content".into()),
            ..SendOptions::to_tab(3)
        };
        within(background.scope("root").send(json!("named"), options)).await.unwrap();
        assert_eq!(log.lock().len(), 1);
    }

    #[tokio::test]
    async fn test_request_to_tab() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let content = contexts.tab(5);

        content.scope("dom").on(
            &MessageListener::replying(|payload: Value, _sender| async move {
                let selector = payload.as_str().unwrap_or_default().to_owned();
                Ok::<Value, ListenerError>(json!({ "selector": selector, "count": 2 }))
            }),
            None,
        );

        let reply = within(background.scope("dom").request(json!("li"), SendOptions::to_tab(5)))
            .await
            .unwrap();
        assert_eq!(reply, json!({ "selector": "li", "count": 2 }));
    }

    #[tokio::test]
    async fn test_closed_tab_is_unreachable() {
        let contexts = Contexts::new();
        let background = contexts.named("background");

        let outcome = within(background.scope("root").send(json!(1), SendOptions::to_tab(99))).await;
        match outcome {
            Err(BusError::UnreachableTarget { target }) => assert_eq!(target, TargetId::Tab(99).to_string()),
            other => panic!("expected UnreachableTarget, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_bare_greeting_reaches_tab_line() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let content = contexts.tab(7);

        let wire = seen();
        content.scope("page").on(&recording(&wire), None);
        let refresh = content.scope("page").line::<()>("refresh").unwrap();
        let mut refreshes = refresh.stream();

        let trigger = background.scope("page").line::<()>("refresh").unwrap();
        within(trigger.to_tab(7)).await.unwrap();

        let ((), sender) = within(refreshes.next()).await.unwrap();
        assert_eq!(sender.origin, Some(name("background")));
        assert_eq!(wire.lock()[0].1, json!({ "greeting": "refresh" }));
    }
}
