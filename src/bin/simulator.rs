use pus_housekeeping::config::BootConfig;
use pus_housekeeping::frame::{self, DownlinkFrame, ReportFrame, RequestAck};
use pus_housekeeping::{HousekeepingAgent, Message, NEVER};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{broadcast, Mutex};
use tokio::time;
use tracing::{debug, error, info, warn};

const REPORT_BROADCAST_BUFFER_SIZE: usize = 256;

type SharedAgent = Arc<Mutex<HousekeepingAgent>>;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    println!("🛰️  PUS Housekeeping Simulator");
    println!("==============================");

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!("Loading boot configuration from {}", path);
            BootConfig::load(&path)?
        }
        None => BootConfig::default(),
    };

    let agent = Arc::new(Mutex::new(HousekeepingAgent::from_config(&config)?));
    {
        let agent_guard = agent.lock().await;
        println!("   Parameters: {}", agent_guard.catalog().count());
        println!("   Structures: {}", agent_guard.service().registry().len());
    }

    let (report_tx, _) = broadcast::channel(REPORT_BROADCAST_BUFFER_SIZE);

    let tcp_agent = Arc::clone(&agent);
    let tcp_report_tx = report_tx.clone();
    let port = config.listen_port;
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = start_tcp_server(port, tcp_agent, tcp_report_tx).await {
            error!("TCP server error: {}", e);
        }
    });

    // Periodic driver: tick, publish, then sleep for the returned delay
    let start = Instant::now();
    let max_tick = Duration::from_millis(config.max_tick_ms.max(1));
    loop {
        let now = start.elapsed().as_millis() as u64;
        let (delay, reports) = {
            let mut agent_guard = agent.lock().await;
            let delay = agent_guard.tick(now);
            (delay, agent_guard.take_reports())
        };
        publish_reports(&report_tx, &reports);

        let sleep = if delay == NEVER {
            max_tick
        } else {
            Duration::from_millis(u64::from(delay)).min(max_tick)
        };
        // A zero delay would spin; wait at least a millisecond
        let sleep = sleep.max(Duration::from_millis(1));

        tokio::select! {
            _ = time::sleep(sleep) => {}
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tcp_server.abort();
    {
        let agent_guard = agent.lock().await;
        let stats = agent_guard.get_scheduler_stats();
        info!(
            ticks = stats.total_ticks,
            reports = stats.total_reports_triggered,
            late = stats.late_ticks,
            "scheduler statistics"
        );
    }
    println!("🛰️  Housekeeping Simulator stopped");

    Ok(())
}

fn publish_reports(report_tx: &broadcast::Sender<String>, reports: &[Message]) {
    for report in reports {
        let frame = DownlinkFrame::Report(ReportFrame::from(report));
        match frame::encode_downlink(&frame) {
            Ok(line) => {
                debug!("📡 REPORT: {}", line);
                // No subscribers is not an error
                let _ = report_tx.send(line.to_string());
            }
            Err(e) => warn!("Failed to encode report: {}", e),
        }
    }
}

async fn start_tcp_server(
    port: u16,
    agent: SharedAgent,
    report_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let listener = TcpListener::bind(format!("127.0.0.1:{}", port)).await?;
    info!("🌐 TCP server listening on port {}", port);

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("🔗 New client connected: {}", addr);
                let client_agent = Arc::clone(&agent);
                let client_report_tx = report_tx.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_client(stream, client_agent, client_report_tx).await {
                        warn!("Client {} error: {}", addr, e);
                    }
                    info!("🔌 Client {} disconnected", addr);
                });
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

/// Execute one request under the agent lock and collect what it produced.
async fn execute_request(agent: &SharedAgent, mut request: Message) -> (RequestAck, Vec<Message>) {
    let mut agent_guard = agent.lock().await;
    let before = agent_guard.errors().total_reported();

    let accepted = agent_guard.handle_request(&mut request).is_ok();

    let raised = agent_guard.errors().total_reported().wrapping_sub(before) as usize;
    let errors = agent_guard.errors().latest(raised).copied().collect();
    let reports = agent_guard.take_reports().into_iter().collect();

    (RequestAck { accepted, errors }, reports)
}

async fn handle_client(
    stream: TcpStream,
    agent: SharedAgent,
    report_tx: broadcast::Sender<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let (reader, writer) = stream.into_split();
    let mut buf_reader = BufReader::new(reader);
    let writer = Arc::new(Mutex::new(writer));

    // Stream every report to this client
    let mut report_rx = report_tx.subscribe();
    let report_writer = Arc::clone(&writer);
    let report_task = tokio::spawn(async move {
        loop {
            let line = match report_rx.recv().await {
                Ok(line) => line,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Client lagging, skipped {} reports", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };
            let mut writer_guard = report_writer.lock().await;
            if let Err(e) = writer_guard.write_all(line.as_bytes()).await {
                warn!("Failed to send report: {}", e);
                break;
            }
            if let Err(e) = writer_guard.write_all(b"\n").await {
                warn!("Failed to send report newline: {}", e);
                break;
            }
        }
    });

    let mut line = String::new();
    loop {
        line.clear();
        match buf_reader.read_line(&mut line).await {
            Ok(0) => break,
            Ok(_) => {
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }

                let ack = match frame::decode_request(trimmed) {
                    Ok(request) => {
                        info!(
                            "📨 Received TC[{},{}] ({} bytes)",
                            request.service_type,
                            request.message_type,
                            request.len()
                        );
                        let (ack, reports) = execute_request(&agent, request).await;
                        publish_reports(&report_tx, &reports);
                        ack
                    }
                    Err(e) => {
                        error!("Failed to parse request: {}", e);
                        RequestAck {
                            accepted: false,
                            errors: Vec::new(),
                        }
                    }
                };

                let response = match frame::encode_ack(&ack) {
                    Ok(line) => line.to_string(),
                    Err(e) => {
                        error!("Failed to encode ack: {}", e);
                        continue;
                    }
                };
                {
                    let mut writer_guard = writer.lock().await;
                    writer_guard.write_all(response.as_bytes()).await?;
                    writer_guard.write_all(b"\n").await?;
                }
                debug!("📤 Sent ack: {}", response);
            }
            Err(e) => {
                error!("Error reading from client: {}", e);
                break;
            }
        }
    }

    report_task.abort();
    Ok(())
}
