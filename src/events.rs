//! Session-scoped event bus.
//!
//! Decouples the parse pipeline from the interpreter and display
//! collaborators. Every topic is namespaced by session id, so concurrent
//! sessions never observe each other's events. Delivery uses std `mpsc`
//! channels: per-topic per-subscriber ordering follows publish order; no
//! ordering is promised across topics.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

use log::debug;

use crate::ast::TypedNode;
use crate::engine::ChangedRange;
use crate::value::NativeValue;

pub type SessionId = u64;

/// Fixed topic set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    ParseTree,
    ExecutableNode,
    RuntimeLifecycle,
    Output,
    ContextChange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LifecyclePhase {
    Started,
    Completed {
        exit_code: i32,
        duration_micros: u128,
    },
    Failed {
        error_kind: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContextChange {
    CwdChanged { cwd: PathBuf },
    VariableSet { name: String, value: NativeValue },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ParseTree {
        root: TypedNode,
        changed_ranges: Vec<ChangedRange>,
    },
    ExecutableNode {
        node: TypedNode,
        sequence: u64,
    },
    RuntimeLifecycle {
        phase: LifecyclePhase,
    },
    Output {
        stream: StreamKind,
        text: String,
    },
    ContextChange(ContextChange),
}

impl Event {
    pub fn topic(&self) -> Topic {
        match self {
            Event::ParseTree { .. } => Topic::ParseTree,
            Event::ExecutableNode { .. } => Topic::ExecutableNode,
            Event::RuntimeLifecycle { .. } => Topic::RuntimeLifecycle,
            Event::Output { .. } => Topic::Output,
            Event::ContextChange(_) => Topic::ContextChange,
        }
    }
}

/// In-process publish/subscribe channel, one per shell process.
#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<HashMap<(SessionId, Topic), Vec<Sender<Event>>>>,
}

impl EventBus {
    pub fn new() -> EventBus {
        EventBus::default()
    }

    /// Subscribe to a set of topics within one session. All matching events
    /// arrive on the returned receiver.
    pub fn subscribe(&self, session: SessionId, topics: &[Topic]) -> Receiver<Event> {
        let (tx, rx) = channel();
        let mut subscribers = self.subscribers.lock().unwrap();
        for &topic in topics {
            subscribers
                .entry((session, topic))
                .or_default()
                .push(tx.clone());
        }
        rx
    }

    /// Deliver an event to every live subscriber of its topic. Dropped
    /// receivers are pruned here.
    pub fn publish(&self, session: SessionId, event: Event) {
        let topic = event.topic();
        let mut subscribers = self.subscribers.lock().unwrap();
        if let Some(senders) = subscribers.get_mut(&(session, topic)) {
            senders.retain(|tx| tx.send(event.clone()).is_ok());
            if senders.is_empty() {
                subscribers.remove(&(session, topic));
            }
        } else {
            debug!("bus event=drop session={session} topic={topic:?}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn output(text: &str) -> Event {
        Event::Output {
            stream: StreamKind::Stdout,
            text: text.to_string(),
        }
    }

    #[test]
    fn delivery_preserves_publish_order_within_topic() {
        let bus = EventBus::new();
        let rx = bus.subscribe(1, &[Topic::Output]);
        bus.publish(1, output("a"));
        bus.publish(1, output("b"));
        bus.publish(1, output("c"));
        let texts: Vec<String> = rx
            .try_iter()
            .map(|e| match e {
                Event::Output { text, .. } => text,
                other => panic!("unexpected event {other:?}"),
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn sessions_are_isolated() {
        let bus = EventBus::new();
        let rx_one = bus.subscribe(1, &[Topic::Output]);
        let rx_two = bus.subscribe(2, &[Topic::Output]);
        bus.publish(1, output("only session one"));
        assert_eq!(rx_one.try_iter().count(), 1);
        assert_eq!(rx_two.try_iter().count(), 0);
    }

    #[test]
    fn topics_are_independent() {
        let bus = EventBus::new();
        let rx = bus.subscribe(1, &[Topic::RuntimeLifecycle]);
        bus.publish(1, output("not subscribed"));
        bus.publish(
            1,
            Event::RuntimeLifecycle {
                phase: LifecyclePhase::Started,
            },
        );
        let events: Vec<Event> = rx.try_iter().collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].topic(), Topic::RuntimeLifecycle);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let bus = EventBus::new();
        drop(bus.subscribe(1, &[Topic::Output]));
        bus.publish(1, output("nobody listening"));
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }
}
