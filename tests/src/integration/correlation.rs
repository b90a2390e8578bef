//! # Reply Correlation
//!
//! Replies are matched to requests by id, never by arrival order, and each
//! request settles at most once.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use switchboard::{
        BusError, Incoming, ListenerError, MessageListener, Responder, ResponseEnvelope, SendOptions,
        StreamFilter,
    };

    use crate::integration::fixtures::{name, settle, within, Contexts};

    /// Two overlapping requests to the same target, answered R2 first.
    #[tokio::test]
    async fn test_out_of_order_replies_reach_their_own_request() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let mut incoming = options.scope("root").stream_with(StreamFilter::Requests, None);

        let root = background.scope("root");
        let r1 = tokio::spawn({
            let root = root.clone();
            async move { root.request(json!("R1"), SendOptions::to("options")).await }
        });
        let r2 = tokio::spawn({
            let root = root.clone();
            async move { root.request(json!("R2"), SendOptions::to("options")).await }
        });

        let mut held: Vec<Incoming> = Vec::new();
        for _ in 0..2 {
            held.push(within(incoming.recv()).await.unwrap());
        }
        held.sort_by_key(|message| message.payload().to_string());
        assert_eq!(background.correlator().pending_count(), 2);

        for message in held.iter().rev() {
            let responder = message.responder().unwrap();
            let tag = message.payload().as_str().unwrap();
            responder.respond(json!({ "answer": tag })).unwrap();
        }

        assert_eq!(within(r1).await.unwrap().unwrap(), json!({ "answer": "R1" }));
        assert_eq!(within(r2).await.unwrap().unwrap(), json!({ "answer": "R2" }));
        assert_eq!(background.correlator().pending_count(), 0);
    }

    /// options reconnects to background while holding a request; the reply
    /// still reaches the caller over the new link.
    #[tokio::test]
    async fn test_reply_crosses_reconnect() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let mut incoming = options.scope("root").stream_with(StreamFilter::Requests, None);

        let root = background.scope("root");
        let pending = tokio::spawn(async move { root.request(json!("question"), SendOptions::to("options")).await });
        let held = within(incoming.recv()).await.unwrap();

        let first = options.ports().get(&name("background")).unwrap();
        let replacement = options.connect(&name("background")).unwrap();
        assert!(!first.is_current());
        assert!(!replacement.same_connection(&first));
        assert_eq!(background.ports().len(), 1);
        assert_eq!(options.ports().len(), 1);

        held.responder().unwrap().respond("answer").unwrap();

        assert_eq!(within(pending).await.unwrap().unwrap(), json!("answer"));
        assert_eq!(background.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_second_reply_is_ignored() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");

        options.scope("root").on(
            &MessageListener::respondable(|_payload, _sender, responder: Responder| async move {
                responder.respond("first")?;
                responder.respond("second")?;
                responder.reject("third")?;
                Ok::<(), ListenerError>(())
            }),
            None,
        );

        let reply = within(background.scope("root").request(json!(null), SendOptions::to("options")))
            .await
            .unwrap();
        assert_eq!(reply, json!("first"));
    }

    #[tokio::test]
    async fn test_forged_reply_for_unknown_id_is_dropped() {
        let contexts = Contexts::new();
        let background = contexts.named("background");

        let stray = ResponseEnvelope::success(switchboard::RequestId::new(), json!("stray"));
        assert!(!background.correlator().settle(&stray));
        assert_eq!(background.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_request_settles_on_first_reply() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let popup = contexts.named("popup");

        for context in [&options, &popup] {
            let own = context.own_name().unwrap_or_default().to_owned();
            context.scope("root").on(
                &MessageListener::respondable(move |_payload, _sender, responder: Responder| {
                    let own = own.clone();
                    async move {
                        responder.respond(own)?;
                        Ok::<(), ListenerError>(())
                    }
                }),
                None,
            );
        }
        background.connect(&name("options")).unwrap();
        background.connect(&name("popup")).unwrap();

        let reply: Value = within(background.scope("root").request(json!("who"), SendOptions::broadcast()))
            .await
            .unwrap();
        assert!(reply == json!("options") || reply == json!("popup"));

        settle().await;
        assert_eq!(background.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_request_with_no_ports_fails_fast() {
        let contexts = Contexts::new();
        let background = contexts.named("background");

        let outcome = background.scope("root").request(json!(1), SendOptions::broadcast()).await;
        assert!(matches!(outcome, Err(BusError::UnreachableTarget { .. })));
        assert_eq!(background.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_request_leaves_no_entry() {
        let contexts = Contexts::new();
        let background = contexts.named("background");
        let options = contexts.named("options");
        let _incoming = options.scope("root").stream_with(StreamFilter::Requests, None);

        let root = background.scope("root");
        let pending = tokio::spawn(async move { root.request(json!(1), SendOptions::to("options")).await });
        settle().await;
        assert_eq!(background.correlator().pending_count(), 1);

        pending.abort();
        assert!(pending.await.unwrap_err().is_cancelled());
        assert_eq!(background.correlator().pending_count(), 0);
    }
}
