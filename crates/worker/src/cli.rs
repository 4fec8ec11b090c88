use clap::Parser;

/// Streaming compute worker harness entry point.
///
/// Startup arguments name computation descriptors to pre-register before the
/// dispatch loop starts; everything else is a tunable with a sane default,
/// overridable by an optional config file, environment variables, or flags
/// (in increasing priority — see [`crate::config::load`]).
#[derive(Debug, Clone, Parser)]
#[command(name = "worker", version, about = "Streaming compute worker harness")]
pub struct Cli {
    /// Work service endpoint, `host:port`.
    #[arg(long = "hostport", env = "WINDMILL_HOSTPORT")]
    pub service_hostport: Option<String>,

    /// Status HTTP server port.
    #[arg(long = "status-port", env = "STATUS_PORT")]
    pub status_port: Option<u16>,

    /// Which `WorkService` implementation to construct, by string tag;
    /// `mock` is the only tag implemented here since the wire transport is
    /// out of scope.
    #[arg(long = "service-stub", env = "WINDMILL_SERVERCLASSNAME")]
    pub service_stub: Option<String>,

    /// Optional TOML config file layered beneath environment variables and
    /// flags.
    #[arg(long = "config")]
    pub config_file: Option<std::path::PathBuf>,

    /// One opaque `computation_id=base64(payload)` descriptor per
    /// pre-registered computation. A malformed descriptor here is a fatal
    /// bootstrap error: the process must not start serving a computation it
    /// cannot describe.
    #[arg(long = "computation", value_name = "ID=PAYLOAD")]
    pub computations: Vec<String>,
}
