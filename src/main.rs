//! Measurement server: receives BASMI measurement requests over TCP, runs pose inference
//! through the configured backends and answers with a result envelope per request.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};

use basmi_measure::config::Config;
use basmi_measure::log;
use basmi_measure::logging::{open_log_file, LogFile};
use basmi_measure::pose::{BackendRegistry, LandmarkAdapter, RemoteBackend};
use basmi_measure::protocol::{self, MeasureRequest};
use basmi_measure::report::Envelope;
use basmi_measure::MeasurementService;

const CONFIG_PATH: &str = "basmi_measure.toml";

#[cfg(feature = "onnx")]
fn register_onnx(registry: &mut BackendRegistry, config: &Config, logfile: &LogFile) -> Result<()> {
    if let Some(model) = &config.inference.onnx_model {
        let detector = basmi_measure::pose::MoveNetDetector::new(model)
            .with_context(|| format!("failed to load {}", model))?;
        registry.register(Arc::new(detector));
        log!(logfile, "MoveNet loaded: {}", model);
    }
    Ok(())
}

#[cfg(not(feature = "onnx"))]
fn register_onnx(_registry: &mut BackendRegistry, config: &Config, logfile: &LogFile) -> Result<()> {
    if config.inference.onnx_model.is_some() {
        log!(logfile, "onnx_model ignored (built without feature \"onnx\")");
    }
    Ok(())
}

fn build_registry(config: &Config, logfile: &LogFile) -> Result<BackendRegistry> {
    let mut registry = BackendRegistry::new();
    // in-process model first so it wins over the sidecar for shared layers
    register_onnx(&mut registry, config, logfile)?;

    if !config.inference.addr.is_empty() {
        let remote = RemoteBackend::new(
            config.inference.addr.clone(),
            config.inference.layers.clone(),
            Duration::from_millis(config.inference.timeout_ms),
        );
        log!(logfile, "Inference server: {} {:?}", remote.addr(), config.inference.layers);
        registry.register(Arc::new(remote));
    }

    Ok(registry)
}

async fn serve_connection(
    tcp: TcpStream,
    service: Arc<MeasurementService>,
    logfile: LogFile,
    verbose: bool,
) -> Result<()> {
    let mut stream = protocol::message_stream(tcp);
    // requests on one connection are answered in order
    while let Some(frame) = protocol::recv_frame(&mut stream).await? {
        let started = Instant::now();
        let (metric, envelope) = match serde_json::from_slice::<MeasureRequest>(&frame) {
            Ok(req) => (req.metric().to_string(), service.handle(&req).await),
            Err(e) => ("?".to_string(), Envelope::error(format!("Invalid request: {}", e))),
        };

        if let Envelope::Error { message } = &envelope {
            log!(logfile, "[{}] error: {}", metric, message);
        }
        if verbose {
            log!(logfile, "[{}] {:.1}ms", metric, started.elapsed().as_secs_f64() * 1000.0);
        }
        protocol::send_message(&mut stream, &envelope).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load_or_default(CONFIG_PATH);
    let (logfile, _log_path) = open_log_file(&config.log_dir, "measure")?;

    log!(logfile, "BASMI Measure Server ({})", env!("GIT_VERSION"));
    log!(logfile, "Listen: {}", config.listen_addr);
    if config.verbose { log!(logfile, "Verbose mode: ON"); }

    let registry = build_registry(&config, &logfile)?;
    if registry.is_empty() {
        log!(logfile, "WARNING: no pose backend configured, every request will fail");
    } else {
        log!(logfile, "Backends: {:?}", registry.names());
    }
    let adapter = LandmarkAdapter::new(config.adapter.min_score);
    let service = Arc::new(MeasurementService::new(registry, adapter, config.routing.clone()));

    let bind_addr: std::net::SocketAddr = config.listen_addr.parse()
        .context("invalid listen_addr")?;
    let listener = TcpListener::bind(bind_addr).await?;
    log!(logfile, "Listening on {}", bind_addr);

    loop {
        let (tcp_stream, addr) = listener.accept().await?;
        tcp_stream.set_nodelay(true)?;
        log!(logfile, "Client connected: {}", addr);

        let service = Arc::clone(&service);
        let logfile = Arc::clone(&logfile);
        let verbose = config.verbose;
        tokio::spawn(async move {
            if let Err(e) = serve_connection(tcp_stream, service, Arc::clone(&logfile), verbose).await {
                log!(logfile, "Connection error ({}): {:#}", addr, e);
            }
            log!(logfile, "Client disconnected: {}", addr);
        });
    }
}
