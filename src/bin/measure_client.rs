//! Command line client: sends one measurement request and prints the JSON envelope.
//!
//! Usage:
//!   measure_client [--addr HOST:PORT] <metric> [--side left|right] [--wall-x PX]
//!                  [--shin-cm CM] [--intermalleolar-cm CM] <image> [image2]

use anyhow::{bail, Context, Result};
use tokio::net::TcpStream;

use basmi_measure::imaging::encode_base64;
use basmi_measure::pose::Side;
use basmi_measure::protocol::{self, MeasureRequest};
use basmi_measure::report::Envelope;

const DEFAULT_ADDR: &str = "127.0.0.1:8000";

#[derive(Debug, Default)]
struct Args {
    addr: Option<String>,
    metric: String,
    side: Option<Side>,
    wall_x: Option<f64>,
    shin_cm: Option<f64>,
    intermalleolar_cm: Option<f64>,
    images: Vec<String>,
}

fn parse_args<I: Iterator<Item = String>>(mut it: I) -> Result<Args> {
    let mut args = Args::default();
    while let Some(arg) = it.next() {
        let mut value = |name: &str| it.next().with_context(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--addr" => args.addr = Some(value("--addr")?),
            "--side" => {
                args.side = Some(match value("--side")?.as_str() {
                    "left" => Side::Left,
                    "right" => Side::Right,
                    other => bail!("unknown side: {}", other),
                })
            }
            "--wall-x" => args.wall_x = Some(value("--wall-x")?.parse()?),
            "--shin-cm" => args.shin_cm = Some(value("--shin-cm")?.parse()?),
            "--intermalleolar-cm" => {
                args.intermalleolar_cm = Some(value("--intermalleolar-cm")?.parse()?)
            }
            _ if args.metric.is_empty() => args.metric = arg,
            _ => args.images.push(arg),
        }
    }
    if args.metric.is_empty() {
        bail!("missing metric");
    }
    Ok(args)
}

fn read_image(path: Option<&String>) -> Result<Option<String>> {
    match path {
        Some(p) => {
            let bytes = std::fs::read(p).with_context(|| format!("failed to read {}", p))?;
            Ok(Some(encode_base64(&bytes)))
        }
        None => Ok(None),
    }
}

fn build_request(args: &Args) -> Result<MeasureRequest> {
    let side = || args.side.context("--side is required for this metric");
    let first = read_image(args.images.first())?;
    let second = read_image(args.images.get(1))?;

    Ok(match args.metric.as_str() {
        "tragus-to-wall" => MeasureRequest::TragusToWall {
            side: side()?,
            image: first,
            wall_x: args.wall_x,
        },
        "side-flexion" => MeasureRequest::SideFlexion {
            side: side()?,
            image1: first,
            image2: second,
        },
        "lumbar-flexion" => MeasureRequest::LumbarFlexion {
            image1: first,
            image2: second,
            shin_cm: args.shin_cm,
            intermalleolar_cm: args.intermalleolar_cm,
        },
        "cervical-rotation" => MeasureRequest::CervicalRotation {
            side: side()?,
            image1: first,
            image2: second,
        },
        "intermalleolar-distance" => MeasureRequest::IntermalleolarDistance {
            image: first,
            shin_cm: args.shin_cm,
        },
        other => bail!("unknown metric: {}", other),
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    let req = build_request(&args)?;
    let addr = args.addr.as_deref().unwrap_or(DEFAULT_ADDR);

    let tcp = TcpStream::connect(addr)
        .await
        .with_context(|| format!("failed to connect to {}", addr))?;
    let mut stream = protocol::message_stream(tcp);
    protocol::send_message(&mut stream, &req).await?;
    let envelope: Envelope = protocol::recv_message(&mut stream).await?;

    println!("{}", serde_json::to_string_pretty(&envelope)?);
    if !envelope.is_success() {
        std::process::exit(1);
    }
    Ok(())
}
