//! # Message Streams
//!
//! Scoped streams as an alternative to callback listeners.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::StreamExt;
    use serde_json::{json, Value};
    use switchboard::{BusError, Incoming, SendOptions, StreamFilter};

    use crate::integration::fixtures::{from, within, Contexts};

    #[tokio::test]
    async fn test_stream_yields_notifications_and_requests() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let mut stream = options.scope("root").stream();

        let root = background.scope("root");
        within(root.send(json!("note"), SendOptions::to("options"))).await.unwrap();
        let request = tokio::spawn({
            let root = root.clone();
            async move { root.request(json!("question"), SendOptions::to("options")).await }
        });

        match within(stream.recv()).await.unwrap() {
            Incoming::Notify { payload, sender } => {
                assert_eq!(payload, json!("note"));
                assert_eq!(sender, from("background"));
            }
            other => panic!("expected notification, got {other:?}"),
        }

        let asked = within(stream.recv()).await.unwrap();
        assert_eq!(asked.payload(), &json!("question"));
        asked.responder().unwrap().respond("answer").unwrap();

        assert_eq!(within(request).await.unwrap().unwrap(), json!("answer"));
    }

    #[tokio::test]
    async fn test_notification_stream_does_not_answer_requests() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let mut stream = options.scope("root").stream_with(StreamFilter::Notifications, None);
        assert_eq!(stream.kind_filter(), StreamFilter::Notifications);

        let outcome = within(background.scope("root").request(
            json!("unheard"),
            SendOptions::to("options").with_timeout(Duration::from_millis(20)),
        ))
        .await;
        assert!(matches!(outcome, Err(BusError::Timeout { .. })));
        assert!(stream.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_stream_combinators() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let stream = options.scope("counter").stream_with(StreamFilter::Notifications, None);

        let counter = background.scope("counter");
        for n in 1..=5 {
            within(counter.send(json!(n), SendOptions::to("options"))).await.unwrap();
        }

        let evens: Vec<Value> = within(
            stream
                .filter_map(|incoming| async move {
                    let payload = incoming.payload().clone();
                    (payload.as_i64()? % 2 == 0).then_some(payload)
                })
                .take(2)
                .collect(),
        )
        .await;
        assert_eq!(evens, vec![json!(2), json!(4)]);
    }

    #[tokio::test]
    async fn test_named_stream_sees_only_its_name() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let mut as_popup = options
            .scope("root")
            .stream_with(StreamFilter::Notifications, Some("popup"));
        background.connect(&switchboard::TargetId::name("options")).unwrap();

        let root = background.scope("root");
        within(root.send(json!("for options"), SendOptions::to("options"))).await.unwrap();
        within(root.send(json!("for everyone"), SendOptions::broadcast())).await.unwrap();

        let seen = within(as_popup.recv()).await.unwrap();
        assert_eq!(seen.payload(), &json!("for everyone"));
        assert!(as_popup.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_ends_streams() {
        let contexts = Contexts::new();
        let options = contexts.named("options");
        let mut stream = options.scope("root").stream();

        options.shutdown();
        assert!(within(stream.recv()).await.is_none());
    }
}
