mod controller;
mod executor;
mod selector;


pub use controller::{
    ChannelIncidentSink, IncidentChannel, LocalProcessController, LogIncidentChannel, ProcessController,
    ProcessScaler, Scaler,
};
pub use executor::{ExecutorStats, RecoveryActions, RecoveryExecutor, RecoveryTicket};
pub use selector::StrategySelector;
