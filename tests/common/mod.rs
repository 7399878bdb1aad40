// Shared scaffolding for the integration tests: an `Environment` plus a
// connected client/server pair wired over the in-process loopback transport
// (the only `Transport` this crate ships, per src/transport/loopback.rs).

use std::sync::Arc;

use rpcio::channel::ChannelBuilder;
use rpcio::env::Environment;
use rpcio::server::ServerBuilder;
use rpcio::transport::loopback::LoopbackHub;
use rpcio::{Channel, Server};

pub struct Fixture {
    pub env: Arc<Environment>,
    pub server: Server,
    pub channel: Channel,
}

/// Spins up a two-completion-queue environment, binds a `Server` to one end
/// of a loopback hub and a `Channel` to the other, and starts the server's
/// accept loop. `authority` becomes every call's authority unless a test
/// overrides it.
pub fn setup(authority: &str) -> Fixture {
    // Several tests run in the same process; env_logger can only be
    // installed once, so swallow the "already initialized" error from every
    // call after the first. Run with RUST_LOG=rpcio=debug to see call
    // lifecycle logging while a test runs.
    let _ = env_logger::builder().is_test(true).try_init();

    let env = Arc::new(Environment::new(2));
    let hub = LoopbackHub::new(32);

    let server_transport = Arc::new(hub.server());
    let server = ServerBuilder::new(env.clone()).build(server_transport.clone(), server_transport);
    server.start();

    let channel = ChannelBuilder::new(env.clone())
        .default_authority(authority)
        .build(Arc::new(hub.client()));

    Fixture { env, server, channel }
}
