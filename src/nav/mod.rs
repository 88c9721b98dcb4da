pub mod history;
pub mod location;
pub mod node_id;

pub use history::{HistoryBridge, NavigationState, SessionHistory};
pub use location::{Location, Parameters};
pub use node_id::NodeId;
