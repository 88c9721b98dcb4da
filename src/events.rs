//! Shared notification channel.
//!
//! One `EventBus` is created per dashboard and handed to every component at
//! construction. `emit` only queues; `dispatch` delivers queued events in
//! FIFO order, each to every live listener in registration order. Events
//! emitted by a listener are appended to the queue and delivered by the same
//! `dispatch` call once the current event has reached all listeners.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};

use crate::nav::location::Parameters;

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// Navigate to a path (embedded link, favorite, restored history entry).
    PathSelect(String),
    /// The tree finished selecting a path.
    PathSelected(String),
    /// Restored auxiliary parameters for consumers such as the query console.
    QueryChange(Parameters),
    /// The query console ran a query; history records the parameters.
    QuerySubmitted(Parameters),
    /// The detail pane navigated to an external location.
    PageChanged(String),
    /// A pane received fresh HTML; widgets inside it should be attached.
    ContentLoaded { slot: String, html: Rc<str> },
    /// Show or hide a tool panel.
    ToolToggle(String),
    /// A tool panel finished loading (`Some(uri)`) or was closed.
    ToolShown(Option<String>),
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::PathSelect(_) => "path:select",
            Event::PathSelected(_) => "path:selected",
            Event::QueryChange(_) => "query:change",
            Event::QuerySubmitted(_) => "query:submitted",
            Event::PageChanged(_) => "page:changed",
            Event::ContentLoaded { .. } => "content:loaded",
            Event::ToolToggle(_) => "tool:toggle",
            Event::ToolShown(_) => "tool:shown",
        }
    }
}

pub trait Listener {
    fn on_event(&mut self, event: &Event);
}

#[derive(Default)]
pub struct EventBus {
    queue: RefCell<VecDeque<Event>>,
    listeners: RefCell<Vec<Weak<RefCell<dyn Listener>>>>,
    dispatching: Cell<bool>,
}

impl EventBus {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Register a listener. The bus keeps only a weak handle; dropping the
    /// component unsubscribes it.
    pub fn subscribe<L: Listener + 'static>(&self, listener: &Rc<RefCell<L>>) {
        let listener: Rc<RefCell<dyn Listener>> = listener.clone();
        self.listeners.borrow_mut().push(Rc::downgrade(&listener));
    }

    pub fn emit(&self, event: Event) {
        log::debug!("emit {}", event.name());
        self.queue.borrow_mut().push_back(event);
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Deliver everything queued, including events emitted on the way.
    /// Returns the number of events delivered. A nested call is a no-op.
    pub fn dispatch(&self) -> usize {
        if self.dispatching.replace(true) {
            return 0;
        }
        let mut delivered = 0;
        loop {
            let next = self.queue.borrow_mut().pop_front();
            let Some(event) = next else { break };
            let listeners: Vec<_> = {
                let mut all = self.listeners.borrow_mut();
                all.retain(|l| l.strong_count() > 0);
                all.clone()
            };
            for listener in listeners.iter().filter_map(Weak::upgrade) {
                match listener.try_borrow_mut() {
                    Ok(mut l) => l.on_event(&event),
                    Err(_) => log::warn!("listener busy, {} not delivered to it", event.name()),
                }
            }
            delivered += 1;
        }
        self.dispatching.set(false);
        delivered
    }
}

/// Listener that records everything it sees. Handy in tests and for
/// diagnostics.
#[derive(Default)]
pub struct Recorder {
    pub events: Vec<Event>,
}

impl Recorder {
    pub fn new() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self::default()))
    }

    pub fn selected_paths(&self) -> Vec<String> {
        self.events
            .iter()
            .filter_map(|e| match e {
                Event::PathSelected(p) => Some(p.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Listener for Recorder {
    fn on_event(&mut self, event: &Event) {
        self.events.push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo {
        bus: Rc<EventBus>,
        tag: &'static str,
        seen: Rc<RefCell<Vec<String>>>,
    }

    impl Listener for Echo {
        fn on_event(&mut self, event: &Event) {
            if let Event::PathSelect(p) = event {
                self.seen.borrow_mut().push(format!("{}:{}", self.tag, p));
                if self.tag == "first" {
                    self.bus.emit(Event::PathSelected(p.clone()));
                }
            }
        }
    }

    #[test]
    fn delivery_follows_registration_order() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let first = Rc::new(RefCell::new(Echo { bus: bus.clone(), tag: "first", seen: seen.clone() }));
        let second = Rc::new(RefCell::new(Echo { bus: bus.clone(), tag: "second", seen: seen.clone() }));
        bus.subscribe(&first);
        bus.subscribe(&second);

        bus.emit(Event::PathSelect("/a".into()));
        bus.emit(Event::PathSelect("/b".into()));
        bus.dispatch();

        assert_eq!(*seen.borrow(), vec!["first:/a", "second:/a", "first:/b", "second:/b"]);
    }

    #[test]
    fn nested_emits_are_delivered_in_the_same_dispatch() {
        let bus = EventBus::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let echo = Rc::new(RefCell::new(Echo { bus: bus.clone(), tag: "first", seen }));
        let recorder = Recorder::new();
        bus.subscribe(&echo);
        bus.subscribe(&recorder);

        bus.emit(Event::PathSelect("/x".into()));
        assert_eq!(bus.dispatch(), 2);
        assert_eq!(recorder.borrow().selected_paths(), vec!["/x".to_string()]);
        assert_eq!(bus.pending(), 0);
    }

    #[test]
    fn dropped_listeners_are_forgotten() {
        let bus = EventBus::new();
        let recorder = Recorder::new();
        bus.subscribe(&recorder);
        drop(recorder);
        bus.emit(Event::PathSelected("/".into()));
        assert_eq!(bus.dispatch(), 1);
        assert!(bus.listeners.borrow().is_empty());
    }
}
