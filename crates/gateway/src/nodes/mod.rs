pub mod correlator;
pub mod heartbeat;
pub mod index;
pub mod notifier;
pub mod registry;
pub mod router;
pub mod transport;
pub mod ws;

pub use correlator::{CallCorrelator, CallOutcome, CallResult, PendingCall, PendingInfo};
pub use heartbeat::HeartbeatMonitor;
pub use notifier::{ChangeNotifier, NodeEvent};
pub use registry::{Node, NodeRegistry, Registration, Route, ToolEntry};
pub use router::{InvokeOptions, Router, RouterStats};
pub use transport::{ConnectionHub, Transport, TransportError};
