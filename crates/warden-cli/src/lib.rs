//! Command-line entrypoint pieces for Warden: argument parsing, tracing setup
//! and the fixture replay runner.

pub mod bootstrap;
pub mod cli;
pub mod replay;

pub use bootstrap::{init_tracing, parse_log_level};
pub use cli::Cli;
pub use replay::{
    fixture_transport, load_replay_fixture, parse_replay_fixture, run_replay,
    validate_replay_fixture, ReplayEvent, ReplayFixture, ReplayLine,
    REPLAY_FIXTURE_SCHEMA_VERSION,
};
