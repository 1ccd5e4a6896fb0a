//! Desktop agent for matchlink.
//!
//! The agent never accepts connections. It polls the coordinator for
//! commands, drives the local game runtime for one match at a time, and
//! streams derived events and the final score back.

pub mod client;
pub mod match_file;
pub mod runner;
pub mod runtime;
pub mod sample;
pub mod state;

pub use client::{AgentError, CoordinatorApi, HttpCoordinator};
pub use runner::{Agent, MatchEnd, MatchReport, MatchRunner, Timings};
pub use runtime::{BridgeRuntime, GameRuntime, ScriptedRuntime};
