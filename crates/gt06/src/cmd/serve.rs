use std::sync::Arc;
use std::time::Duration;

use gt06_frame::FrameConfig;
use gt06_server::{
    load_snapshot, save_snapshot, CommandScript, EventSink, FanoutSink, FrameCapture,
    JsonLinesSink, QueueConfig, Server, ServerConfig, ServerState,
};
use tracing::{info, warn};

use crate::cmd::{parse_duration, ServeArgs};
use crate::exit::{
    io_error, script_error, server_error, sink_error, snapshot_error, CliResult, SUCCESS,
};
use crate::operator;
use crate::output::{ConsoleSink, OutputFormat};

const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

pub fn run(args: ServeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = server_config(&args)?;

    let script = match &args.script {
        Some(path) => CommandScript::load(path).map_err(script_error)?,
        None => CommandScript::default(),
    };
    if !script.is_empty() {
        info!(commands = script.len(), "command script loaded");
    }

    let mut sink = FanoutSink::new().with(ConsoleSink::new(format));
    if let Some(path) = &args.events {
        let events = JsonLinesSink::open(path)
            .map_err(|err| sink_error(&format!("failed to open {}", path.display()), err))?;
        sink = sink.with(events);
    }
    let sink: Arc<dyn EventSink> = Arc::new(sink);

    let mut state = ServerState::new(config, script, sink);
    if let Some(path) = &args.capture {
        let capture = FrameCapture::open(path)
            .map_err(|err| sink_error(&format!("failed to open {}", path.display()), err))?;
        state = state.with_capture(capture);
    }
    let state = Arc::new(state);

    if let Some(path) = &args.snapshot {
        let snapshot = load_snapshot(path).map_err(snapshot_error)?;
        if !snapshot.is_empty() {
            let restored = state.restore(&snapshot);
            info!(restored, path = %path.display(), "queue progress restored");
        }
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start runtime", err))?;

    let served = runtime.block_on(serve(Arc::clone(&state), args.operator, format));
    // Stdin reads sit on a blocking thread that never finishes on its own.
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    served?;

    if let Some(path) = &args.snapshot {
        let snapshot = state.snapshot();
        save_snapshot(path, &snapshot).map_err(snapshot_error)?;
        info!(entries = snapshot.len(), path = %path.display(), "queue progress saved");
    }

    Ok(SUCCESS)
}

async fn serve(state: Arc<ServerState>, with_operator: bool, format: OutputFormat) -> CliResult<()> {
    let server = Server::bind(Arc::clone(&state)).await.map_err(server_error)?;
    if with_operator {
        tokio::spawn(operator::run(state, format));
    }
    server.run_until(shutdown_signal()).await.map_err(server_error)
}

fn server_config(args: &ServeArgs) -> CliResult<ServerConfig> {
    let idle_timeout = args
        .idle_timeout
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    Ok(ServerConfig {
        bind: args.bind,
        frame: FrameConfig {
            checksum: args.checksum.into(),
        },
        timestamps: args.timestamp_encoding.into(),
        queue: QueueConfig {
            ack_timeout: parse_duration(&args.ack_timeout)?,
            settle_delay: parse_duration(&args.settle)?,
            max_attempts: args.max_attempts,
        },
        sweep_interval: parse_duration(&args.sweep_interval)?,
        idle_timeout,
        auto_script: args.auto_script,
        ..ServerConfig::default()
    })
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(%err, "cannot listen for Ctrl-C, serving until killed");
        std::future::pending::<()>().await;
    }
}
