use std::cell::RefCell;
use std::rc::Rc;

use super::{ElementData, Widget, WidgetContext, WidgetError};
use crate::events::{Event, Listener};

/// Mirrors the last selected path.
#[derive(Debug, Default)]
pub struct StatusLine {
    value: String,
}

pub(super) fn build(el: &ElementData, _ctx: &WidgetContext) -> Result<Widget, WidgetError> {
    let line = StatusLine {
        value: el.text.trim().to_string(),
    };
    Ok(Widget::StatusLine(Rc::new(RefCell::new(line))))
}

impl StatusLine {
    pub fn value(&self) -> &str {
        &self.value
    }
}

impl Listener for StatusLine {
    fn on_event(&mut self, event: &Event) {
        if let Event::PathSelected(path) = event {
            self.value.clone_from(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn follows_selection() {
        let mut line = StatusLine::default();
        line.on_event(&Event::PathSelect("/ignored".into()));
        assert_eq!(line.value(), "");
        line.on_event(&Event::PathSelected("/content".into()));
        assert_eq!(line.value(), "/content");
    }
}
