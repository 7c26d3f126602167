/// Command client over the source server connection.
pub mod client;
/// Settings loading (file + environment).
pub mod config;
/// Tracing initialization (console and rolling file sinks).
pub mod logging;
/// Snapshot (RDB) decoding: lengths, strings, zip containers, rows.
pub mod rdb;
/// Wire protocol: command encoding, replies, replication stream.
pub mod resp;
/// Cutover orchestration: heartbeat, sentinel key, state machine.
pub mod transition;

// -----------------------------------------------------------------------------
//  Frequently used public types
// -----------------------------------------------------------------------------

pub use client::{Client, ConfigKey, Connection, TcpClient, TcpConnection};
pub use config::Settings;
pub use cutover_error::{CutoverResult, StackError};
pub use logging::{init_logging, LoggingConfig, LoggingHandle};
pub use rdb::{
    CollectSnapshotHandler, LogSnapshotHandler, Row, RowValue, SnapshotDecoder, SnapshotEvent,
    SnapshotHandler,
};
pub use resp::{
    ChannelCommandHandler, Cmd, CommandHandler, LogCommandHandler, Reply, StreamDecoder,
};
pub use transition::{GracefulTransition, TransitionConfig, TransitionState};
