//! Dispatcher - inbound envelope の decode と配送
//!
//! # フロー
//! 1. frame bytes → Envelope（FrameError なら破棄）
//! 2. CodecRegistry で decode（UnknownTag / MalformedBody なら破棄）
//! 3. HandlerRegistry の snapshot を取得
//! 4. 登録順に handler を 1 つずつ実行（失敗しても次へ進む）
//!
//! Nothing is retried: the same bytes would fail the same way. Every drop
//! and every handler failure is logged and counted, never returned as an
//! error.

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::task::AbortHandle;

use crate::config::CommyConfig;
use crate::domain::{CodecError, Envelope, FrameError, FrameLimits, HandlerError, SubscriptionId, Tag};
use crate::observability::{DispatchCounts, DispatchStats};
use crate::typed::{AnyMessage, CodecRegistry, Delivery, HandlerRegistry, Subscriber};

/// Why an inbound envelope was discarded before reaching any handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    Frame(FrameError),
    UnknownTag(Tag),
    MalformedBody { tag: Tag, len: usize },
}

/// Outcome of one dispatch. Informational only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchReport {
    Delivered {
        tag: Tag,
        handlers: usize,
        failures: Vec<(SubscriptionId, HandlerError)>,
    },
    NoSubscribers {
        tag: Tag,
    },
    Dropped(DropReason),
}

impl DispatchReport {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchReport::Delivered { .. })
    }

    pub fn is_dropped(&self) -> bool {
        matches!(self, DispatchReport::Dropped(_))
    }

    pub fn failures(&self) -> &[(SubscriptionId, HandlerError)] {
        match self {
            DispatchReport::Delivered { failures, .. } => failures,
            _ => &[],
        }
    }
}

pub struct Dispatcher {
    codecs: Arc<CodecRegistry>,
    handlers: Arc<HandlerRegistry>,
    limits: FrameLimits,
    isolate_panics: bool,
    stats: DispatchStats,
}

impl Dispatcher {
    pub fn new(codecs: Arc<CodecRegistry>, handlers: Arc<HandlerRegistry>, config: &CommyConfig) -> Self {
        Self {
            codecs,
            handlers,
            limits: config.frame,
            isolate_panics: config.isolate_panics,
            stats: DispatchStats::default(),
        }
    }

    /// Dispatch an already parsed envelope.
    ///
    /// Dropping the returned future (e.g. under a `timeout`) aborts the
    /// handler that is currently running and skips the remaining ones.
    pub async fn dispatch(&self, envelope: Envelope) -> DispatchReport {
        self.stats.record_received();
        self.deliver(envelope, None).await
    }

    /// Parse raw frame bytes and dispatch them.
    pub async fn dispatch_bytes(&self, raw: &[u8]) -> DispatchReport {
        self.dispatch_from(None, raw).await
    }

    /// Like [`Dispatcher::dispatch_bytes`], remembering which peer sent the frame.
    pub async fn dispatch_from(&self, origin: Option<Arc<str>>, raw: &[u8]) -> DispatchReport {
        self.stats.record_received();
        match Envelope::from_frame(raw, &self.limits) {
            Ok(envelope) => self.deliver(envelope, origin).await,
            Err(error) => {
                tracing::warn!(len = raw.len(), origin = ?origin, %error, "dropping unparseable frame");
                self.stats.record_dropped_frame();
                DispatchReport::Dropped(DropReason::Frame(error))
            }
        }
    }

    pub fn counts(&self) -> DispatchCounts {
        self.stats.snapshot()
    }

    async fn deliver(&self, envelope: Envelope, origin: Option<Arc<str>>) -> DispatchReport {
        let decoded = match self.codecs.decode(&envelope) {
            Ok(decoded) => decoded,
            Err(CodecError::UnknownTag(tag)) => {
                tracing::warn!(tag = %tag, len = envelope.body().len(), origin = ?origin, "dropping envelope with unknown tag");
                self.stats.record_unknown_tag();
                return DispatchReport::Dropped(DropReason::UnknownTag(tag));
            }
            Err(error) => {
                let tag = envelope.tag().clone();
                let len = envelope.body().len();
                tracing::warn!(tag = %tag, len, origin = ?origin, %error, "dropping envelope with malformed body");
                self.stats.record_malformed();
                return DispatchReport::Dropped(DropReason::MalformedBody { tag, len });
            }
        };

        let tag = decoded.tag().clone();
        let subscribers = self.handlers.snapshot(tag.as_str());
        if subscribers.is_empty() {
            tracing::debug!(tag = %tag, "no subscribers, envelope consumed");
            self.stats.record_no_subscribers();
            return DispatchReport::NoSubscribers { tag };
        }

        let mut failures = Vec::new();
        for subscriber in &subscribers {
            let delivery = Delivery::new(tag.clone(), origin.clone(), subscriber.id());
            let message = Arc::clone(decoded.payload());
            if let Err(error) = self.invoke(subscriber, message, delivery).await {
                tracing::error!(tag = %tag, subscription = %subscriber.id(), %error, "handler failed");
                failures.push((subscriber.id(), error));
            }
        }

        tracing::debug!(tag = %tag, handlers = subscribers.len(), failures = failures.len(), "envelope delivered");
        self.stats.record_delivered(failures.len());
        DispatchReport::Delivered {
            tag,
            handlers: subscribers.len(),
            failures,
        }
    }

    async fn invoke(
        &self,
        subscriber: &Subscriber,
        message: AnyMessage,
        delivery: Delivery,
    ) -> Result<(), HandlerError> {
        let handler = Arc::clone(subscriber.handler());
        if !self.isolate_panics {
            // 同じタスクで実行する。panic はここで捕まえて次の handler へ進む
            return match AssertUnwindSafe(handler.handle_dyn(message, delivery))
                .catch_unwind()
                .await
            {
                Ok(result) => result,
                Err(payload) => Err(HandlerError::Panicked(panic_message(payload))),
            };
        }

        // 別タスクで実行し、panic を JoinError として受け取る（await するので順序は保たれる）
        let task = tokio::spawn(async move { handler.handle_dyn(message, delivery).await });
        let _abort = AbortOnDrop(task.abort_handle());
        match task.await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                Err(HandlerError::Panicked(panic_message(join_error.into_panic())))
            }
            Err(join_error) => Err(HandlerError::Failed(join_error.to_string())),
        }
    }
}

/// Aborts a spawned handler when the dispatch awaiting it is dropped.
struct AbortOnDrop(AbortHandle);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        // no-op once the task has finished
        self.0.abort();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::TagError;
    use crate::typed::{Handler, TestMessage};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    struct Fixture {
        dispatcher: Dispatcher,
        codecs: Arc<CodecRegistry>,
        handlers: Arc<HandlerRegistry>,
        log: Arc<Mutex<Vec<String>>>,
    }

    fn fixture() -> Fixture {
        let mut codecs = CodecRegistry::new();
        codecs.register::<TestMessage>().unwrap();
        let codecs = Arc::new(codecs);
        let handlers = Arc::new(HandlerRegistry::new());
        let dispatcher = Dispatcher::new(codecs.clone(), handlers.clone(), &CommyConfig::default());
        Fixture {
            dispatcher,
            codecs,
            handlers,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    impl Fixture {
        fn record(&self, label: &'static str) -> SubscriptionId {
            let log = self.log.clone();
            self.handlers
                .subscribe_fn::<TestMessage, _>(move |m, _| {
                    log.lock().unwrap().push(format!("{label}:{}", m.name));
                    Ok(())
                })
                .unwrap()
        }

        fn frame(&self, msg: &TestMessage) -> Vec<u8> {
            self.codecs.encode(msg).unwrap().to_frame()
        }

        fn log(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }
    }

    #[tokio::test]
    async fn fan_out_in_subscription_order_exactly_once() {
        let fx = fixture();
        fx.record("first");
        fx.record("second");
        fx.record("third");

        let report = fx.dispatcher.dispatch_bytes(&fx.frame(&TestMessage::new("alpha", 7))).await;

        assert!(report.is_delivered());
        assert!(report.failures().is_empty());
        assert_eq!(fx.log(), vec!["first:alpha", "second:alpha", "third:alpha"]);
    }

    #[tokio::test]
    async fn failing_first_handler_does_not_stop_the_rest() {
        let fx = fixture();
        let failing = fx
            .handlers
            .subscribe_fn::<TestMessage, _>(|_, _| Err(HandlerError::failed("boom")))
            .unwrap();
        fx.record("second");
        fx.record("third");

        let report = fx.dispatcher.dispatch(fx.codecs.encode(&TestMessage::new("alpha", 7)).unwrap()).await;

        assert_eq!(fx.log(), vec!["second:alpha", "third:alpha"]);
        assert_eq!(report.failures(), &[(failing, HandlerError::failed("boom"))]);
        assert_eq!(fx.dispatcher.counts().handler_failures, 1);
    }

    #[tokio::test]
    async fn panicking_handler_is_isolated() {
        let fx = fixture();
        let panicking = fx
            .handlers
            .subscribe_fn::<TestMessage, _>(|_, _| panic!("handler exploded"))
            .unwrap();
        fx.record("second");
        fx.record("third");

        let report = fx.dispatcher.dispatch_bytes(&fx.frame(&TestMessage::new("alpha", 7))).await;

        assert_eq!(fx.log(), vec!["second:alpha", "third:alpha"]);
        assert_eq!(
            report.failures(),
            &[(panicking, HandlerError::Panicked("handler exploded".into()))]
        );
    }

    #[tokio::test]
    async fn unknown_tag_is_dropped_without_invoking_handlers() {
        let fx = fixture();
        fx.record("only");

        let envelope = Envelope::new(Tag::parse("never_registered").unwrap(), b"{}".to_vec());
        let report = fx.dispatcher.dispatch_bytes(&envelope.to_frame()).await;

        assert_eq!(
            report,
            DispatchReport::Dropped(DropReason::UnknownTag(Tag::parse("never_registered").unwrap()))
        );
        assert!(fx.log().is_empty());
        assert_eq!(fx.dispatcher.counts().dropped_unknown_tag, 1);
    }

    #[tokio::test]
    async fn malformed_body_is_dropped() {
        let fx = fixture();
        fx.record("only");

        let envelope = Envelope::new(Tag::parse("test_msg").unwrap(), b"{\"name\":".to_vec());
        let report = fx.dispatcher.dispatch(envelope).await;

        assert_eq!(
            report,
            DispatchReport::Dropped(DropReason::MalformedBody {
                tag: Tag::parse("test_msg").unwrap(),
                len: 8,
            })
        );
        assert!(fx.log().is_empty());
        assert_eq!(fx.dispatcher.counts().dropped_malformed, 1);
    }

    #[tokio::test]
    async fn broken_frames_are_dropped() {
        let fx = fixture();
        fx.record("only");

        let mut frame = fx.frame(&TestMessage::new("alpha", 7));
        frame.truncate(frame.len() - 1);
        assert!(matches!(
            fx.dispatcher.dispatch_bytes(&frame).await,
            DispatchReport::Dropped(DropReason::Frame(FrameError::Truncated { .. }))
        ));

        let report = fx.dispatcher.dispatch_bytes(&[0, 0, 0, 0, 0, 0]).await;
        assert_eq!(
            report,
            DispatchReport::Dropped(DropReason::Frame(FrameError::InvalidTag(TagError::Empty)))
        );

        assert!(fx.log().is_empty());
        assert_eq!(fx.dispatcher.counts().dropped_frame, 2);
    }

    #[tokio::test]
    async fn known_tag_without_subscribers_is_consumed() {
        let fx = fixture();
        let report = fx.dispatcher.dispatch_bytes(&fx.frame(&TestMessage::new("alpha", 7))).await;

        assert_eq!(
            report,
            DispatchReport::NoSubscribers {
                tag: Tag::parse("test_msg").unwrap()
            }
        );
        assert_eq!(fx.dispatcher.counts().no_subscribers, 1);
    }

    #[tokio::test]
    async fn per_tag_order_follows_dispatch_order() {
        let fx = fixture();
        fx.record("h");

        for name in ["a", "b", "c", "d"] {
            fx.dispatcher.dispatch_bytes(&fx.frame(&TestMessage::new(name, 1))).await;
        }

        assert_eq!(fx.log(), vec!["h:a", "h:b", "h:c", "h:d"]);
        let counts = fx.dispatcher.counts();
        assert_eq!(counts.received, 4);
        assert_eq!(counts.delivered, 4);
    }

    #[tokio::test]
    async fn origin_reaches_the_handler() {
        let fx = fixture();
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        fx.handlers
            .subscribe_fn::<TestMessage, _>(move |_, delivery| {
                *sink.lock().unwrap() = delivery.origin().map(str::to_string);
                Ok(())
            })
            .unwrap();

        fx.dispatcher
            .dispatch_from(Some(Arc::from("lobby-1")), &fx.frame(&TestMessage::new("alpha", 7)))
            .await;

        assert_eq!(seen.lock().unwrap().as_deref(), Some("lobby-1"));
    }

    #[tokio::test]
    async fn inline_mode_reports_errors_too() {
        let mut codecs = CodecRegistry::new();
        codecs.register::<TestMessage>().unwrap();
        let codecs = Arc::new(codecs);
        let handlers = Arc::new(HandlerRegistry::new());
        let config = CommyConfig {
            isolate_panics: false,
            ..CommyConfig::default()
        };
        let dispatcher = Dispatcher::new(codecs.clone(), handlers.clone(), &config);

        handlers
            .subscribe_fn::<TestMessage, _>(|_, _| Err(HandlerError::failed("nope")))
            .unwrap();
        let report = dispatcher.dispatch(codecs.encode(&TestMessage::new("alpha", 7)).unwrap()).await;
        assert_eq!(report.failures().len(), 1);
    }

    #[tokio::test]
    async fn inline_mode_catches_panics_and_keeps_going() {
        let mut codecs = CodecRegistry::new();
        codecs.register::<TestMessage>().unwrap();
        let codecs = Arc::new(codecs);
        let handlers = Arc::new(HandlerRegistry::new());
        let config = CommyConfig {
            isolate_panics: false,
            ..CommyConfig::default()
        };
        let dispatcher = Dispatcher::new(codecs.clone(), handlers.clone(), &config);

        let log = Arc::new(Mutex::new(Vec::new()));
        let panicking = handlers
            .subscribe_fn::<TestMessage, _>(|_, _| panic!("first fails"))
            .unwrap();
        for label in ["second", "third"] {
            let log = log.clone();
            handlers
                .subscribe_fn::<TestMessage, _>(move |_, _| {
                    log.lock().unwrap().push(label);
                    Ok(())
                })
                .unwrap();
        }

        let frame = codecs.encode(&TestMessage::new("alpha", 7)).unwrap().to_frame();
        let report = dispatcher.dispatch_bytes(&frame).await;

        assert_eq!(*log.lock().unwrap(), vec!["second", "third"]);
        assert_eq!(
            report.failures(),
            &[(panicking, HandlerError::Panicked("first fails".into()))]
        );
        assert_eq!(dispatcher.counts().handler_failures, 1);
    }

    struct Slow {
        finished: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Handler<TestMessage> for Slow {
        async fn handle(&self, _: &TestMessage, _: &Delivery) -> Result<(), HandlerError> {
            tokio::time::sleep(Duration::from_millis(200)).await;
            self.finished.store(true, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn dropped_dispatch_aborts_the_running_handler() {
        let fx = fixture();
        let finished = Arc::new(AtomicBool::new(false));
        fx.handlers
            .subscribe::<TestMessage, _>(Slow {
                finished: finished.clone(),
            })
            .unwrap();
        fx.record("after");

        let frame = fx.frame(&TestMessage::new("alpha", 7));
        let timed_out = tokio::time::timeout(Duration::from_millis(20), fx.dispatcher.dispatch_bytes(&frame)).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!finished.load(Ordering::SeqCst));
        assert!(fx.log().is_empty());
    }
}
