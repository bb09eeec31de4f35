//! Compiles the agent/server wire contract to Rust at build time.

fn main() {
    tonic_build::configure()
        .build_server(true)
        .build_client(true)
        .compile(&["proto/agent.proto"], &["proto"])
        .expect("could not compile proto/agent.proto");

    println!("cargo:rerun-if-changed=proto/agent.proto");
}
