pub mod config;
pub mod dom;
pub mod events;
pub mod nav;
pub mod net;
pub mod prefs;

// Widgets and the page that hosts them
pub mod dashboard;
pub mod widgets;
