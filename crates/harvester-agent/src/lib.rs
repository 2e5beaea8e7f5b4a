pub mod agent;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod sampler;
pub mod sink;

pub use agent::Agent;
pub use collector::Collector;
pub use config::{AgentArgs, AgentConfig};
pub use dispatcher::Dispatcher;
pub use sink::{HttpSink, Sink, Submission};
