use clap::{App, AppSettings, Arg, ArgMatches, SubCommand};
use colored::*;
use pus_housekeeping::error::ErrorRecord;
use pus_housekeeping::frame::{self, DownlinkFrame, ReportFrame, RequestAck};
use pus_housekeeping::report::{ParametersReport, PeriodicPropertiesReport, StructureReport};
use pus_housekeeping::service::{HousekeepingMessageType, SERVICE_TYPE};
use pus_housekeeping::{Message, ServiceError};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: &str = "8080";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);
// Reports produced by a request may trail its acknowledgement
const REPORT_GRACE: Duration = Duration::from_millis(200);

type CliResult<T> = Result<T, Box<dyn std::error::Error>>;

fn id_list_arg(help: &'static str) -> Arg<'static, 'static> {
    Arg::with_name("ids")
        .help(help)
        .required(true)
        .multiple(true)
        .validator(|v| match v.parse::<u8>() {
            Ok(_) => Ok(()),
            Err(_) => Err("Structure IDs must be in 0-255".into()),
        })
}

fn parameter_list_arg() -> Arg<'static, 'static> {
    Arg::with_name("parameters")
        .help("Parameter IDs")
        .multiple(true)
        .validator(|v| match v.parse::<u16>() {
            Ok(_) => Ok(()),
            Err(_) => Err("Parameter IDs must be in 0-65535".into()),
        })
}

#[tokio::main]
async fn main() -> CliResult<()> {
    let matches = App::new("hkctl")
        .version("0.1.0")
        .author("Space Systems Engineering Team")
        .about("🛰️  Housekeeping control - ST[03] requests against the housekeeping simulator")
        .setting(AppSettings::SubcommandRequiredElseHelp)
        .arg(
            Arg::with_name("host")
                .short("h")
                .long("host")
                .value_name("HOST")
                .help("Simulator host address")
                .takes_value(true)
                .default_value(DEFAULT_HOST)
                .global(true),
        )
        .arg(
            Arg::with_name("port")
                .short("p")
                .long("port")
                .value_name("PORT")
                .help("Simulator port")
                .takes_value(true)
                .default_value(DEFAULT_PORT)
                .global(true),
        )
        .arg(
            Arg::with_name("format")
                .short("f")
                .long("format")
                .value_name("FORMAT")
                .help("Output format")
                .takes_value(true)
                .possible_values(&["json", "table"])
                .default_value("table")
                .global(true),
        )
        .subcommand(
            SubCommand::with_name("create")
                .about("🧱 Create a housekeeping report structure")
                .arg(Arg::with_name("id").help("Structure ID").required(true))
                .arg(
                    Arg::with_name("interval")
                        .help("Collection interval in milliseconds")
                        .required(true),
                )
                .arg(parameter_list_arg()),
        )
        .subcommand(SubCommand::with_name("delete").about("🗑️  Delete structures").arg(id_list_arg("Structure IDs")))
        .subcommand(
            SubCommand::with_name("enable")
                .about("▶️  Enable periodic generation")
                .arg(id_list_arg("Structure IDs")),
        )
        .subcommand(
            SubCommand::with_name("disable")
                .about("⏸️  Disable periodic generation")
                .arg(id_list_arg("Structure IDs")),
        )
        .subcommand(
            SubCommand::with_name("append")
                .about("➕ Append parameters to a disabled structure")
                .arg(Arg::with_name("id").help("Structure ID").required(true))
                .arg(parameter_list_arg().required(true)),
        )
        .subcommand(
            SubCommand::with_name("modify")
                .about("⏱️  Modify collection intervals")
                .arg(
                    Arg::with_name("pairs")
                        .help("ID:INTERVAL pairs, e.g. 1:1000")
                        .required(true)
                        .multiple(true),
                ),
        )
        .subcommand(
            SubCommand::with_name("report")
                .about("📋 Report structure definitions")
                .arg(id_list_arg("Structure IDs")),
        )
        .subcommand(
            SubCommand::with_name("one-shot")
                .about("📸 Generate one parameters report now")
                .arg(id_list_arg("Structure IDs")),
        )
        .subcommand(
            SubCommand::with_name("properties")
                .about("📊 Report periodic generation properties")
                .arg(id_list_arg("Structure IDs")),
        )
        .subcommand(SubCommand::with_name("monitor").about("📡 Stream every report from the simulator"))
        .get_matches();

    let host = matches.value_of("host").unwrap_or(DEFAULT_HOST);
    let port: u16 = matches.value_of("port").unwrap_or(DEFAULT_PORT).parse()?;
    let format = matches.value_of("format").unwrap_or("table");

    let request = match matches.subcommand() {
        ("create", Some(sub)) => create_request(sub)?,
        ("delete", Some(sub)) => id_list_request(HousekeepingMessageType::DeleteHousekeepingReportStructure, sub)?,
        ("enable", Some(sub)) => {
            id_list_request(HousekeepingMessageType::EnablePeriodicHousekeepingParametersReport, sub)?
        }
        ("disable", Some(sub)) => {
            id_list_request(HousekeepingMessageType::DisablePeriodicHousekeepingParametersReport, sub)?
        }
        ("append", Some(sub)) => append_request(sub)?,
        ("modify", Some(sub)) => modify_request(sub)?,
        ("report", Some(sub)) => id_list_request(HousekeepingMessageType::ReportHousekeepingStructures, sub)?,
        ("one-shot", Some(sub)) => {
            id_list_request(HousekeepingMessageType::GenerateOneShotHousekeepingReport, sub)?
        }
        ("properties", Some(sub)) => {
            id_list_request(HousekeepingMessageType::ReportHousekeepingPeriodicProperties, sub)?
        }
        ("monitor", _) => return monitor(host, port, format).await,
        _ => {
            println!("{}", "No command specified. Use --help for usage information.".yellow());
            return Ok(());
        }
    };

    let expected = expected_report(request.message_type);
    let (ack, reports) = send_request(host, port, &request, expected).await?;
    print_ack(&request, &ack, format)?;
    for report in reports {
        print_report(report, format)?;
    }

    Ok(())
}

fn telecommand(message_type: HousekeepingMessageType) -> Message {
    Message::telecommand(SERVICE_TYPE, message_type.into())
}

fn parse_ids(matches: &ArgMatches<'_>) -> CliResult<Vec<u8>> {
    let ids = matches
        .values_of("ids")
        .map(|values| values.map(str::parse).collect::<Result<Vec<u8>, _>>())
        .transpose()?
        .unwrap_or_default();
    if ids.len() > usize::from(u8::MAX) {
        return Err("At most 255 structure IDs per request".into());
    }
    Ok(ids)
}

fn parse_parameters(matches: &ArgMatches<'_>) -> CliResult<Vec<u16>> {
    Ok(matches
        .values_of("parameters")
        .map(|values| values.map(str::parse).collect::<Result<Vec<u16>, _>>())
        .transpose()?
        .unwrap_or_default())
}

fn id_list_request(message_type: HousekeepingMessageType, matches: &ArgMatches<'_>) -> CliResult<Message> {
    let ids = parse_ids(matches)?;
    let mut request = telecommand(message_type);
    request.append_u8(ids.len() as u8)?;
    for id in ids {
        request.append_u8(id)?;
    }
    Ok(request)
}

fn create_request(matches: &ArgMatches<'_>) -> CliResult<Message> {
    let id: u8 = matches.value_of("id").unwrap_or_default().parse()?;
    let interval: u32 = matches.value_of("interval").unwrap_or_default().parse()?;
    let parameters = parse_parameters(matches)?;

    let mut request = telecommand(HousekeepingMessageType::CreateHousekeepingReportStructure);
    request.append_u8(id)?;
    request.append_u32(interval)?;
    request.append_u16(parameters.len() as u16)?;
    for parameter in parameters {
        request.append_u16(parameter)?;
    }
    Ok(request)
}

fn append_request(matches: &ArgMatches<'_>) -> CliResult<Message> {
    let id: u8 = matches.value_of("id").unwrap_or_default().parse()?;
    let parameters = parse_parameters(matches)?;

    let mut request = telecommand(HousekeepingMessageType::AppendParametersToHousekeepingStructure);
    request.append_u8(id)?;
    request.append_u16(parameters.len() as u16)?;
    for parameter in parameters {
        request.append_u16(parameter)?;
    }
    Ok(request)
}

fn modify_request(matches: &ArgMatches<'_>) -> CliResult<Message> {
    let mut pairs = Vec::new();
    for pair in matches.values_of("pairs").into_iter().flatten() {
        let (id, interval) = pair
            .split_once(':')
            .ok_or_else(|| format!("Expected ID:INTERVAL, got '{}'", pair))?;
        pairs.push((id.parse::<u8>()?, interval.parse::<u32>()?));
    }
    if pairs.len() > usize::from(u8::MAX) {
        return Err("At most 255 pairs per request".into());
    }

    let mut request = telecommand(HousekeepingMessageType::ModifyCollectionIntervalOfStructures);
    request.append_u8(pairs.len() as u8)?;
    for (id, interval) in pairs {
        request.append_u8(id)?;
        request.append_u32(interval)?;
    }
    Ok(request)
}

/// Report type a request answers with, if any.
fn expected_report(message_type: u8) -> Option<u8> {
    use HousekeepingMessageType::*;
    let reply = match HousekeepingMessageType::try_from(message_type).ok()? {
        ReportHousekeepingStructures => HousekeepingStructuresReport,
        GenerateOneShotHousekeepingReport => HousekeepingParametersReport,
        ReportHousekeepingPeriodicProperties => HousekeepingPeriodicPropertiesReport,
        _ => return None,
    };
    Some(reply.into())
}

async fn connect(host: &str, port: u16) -> CliResult<TcpStream> {
    let addr = format!("{}:{}", host, port);
    match TcpStream::connect(&addr).await {
        Ok(stream) => Ok(stream),
        Err(e) => {
            eprintln!("{} Failed to connect to housekeeping simulator at {}", "❌".red(), addr.bright_white());
            if e.kind() == std::io::ErrorKind::ConnectionRefused {
                eprintln!("{} Server is not running. Start it with:", "💡".yellow());
                eprintln!("   {}", "cargo run --bin hk-simulator".bright_cyan());
            }
            Err(e.into())
        }
    }
}

async fn send_request(
    host: &str,
    port: u16,
    request: &Message,
    expected: Option<u8>,
) -> CliResult<(RequestAck, Vec<ReportFrame>)> {
    let stream = connect(host, port).await?;
    let (reader, mut writer) = stream.into_split();
    let mut lines = BufReader::new(reader).lines();

    let line = frame::encode_request(request)?;
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\n").await?;

    let mut reports = Vec::new();
    let keep = |report: &ReportFrame| expected == Some(report.message_type);

    let ack = match tokio::time::timeout(REQUEST_TIMEOUT, async {
        while let Some(line) = lines.next_line().await? {
            match frame::decode_downlink(&line) {
                Ok(DownlinkFrame::Ack(ack)) => return Ok(ack),
                Ok(DownlinkFrame::Report(report)) if keep(&report) => reports.push(report),
                Ok(DownlinkFrame::Report(_)) => {}
                Err(e) => eprintln!("{} Unreadable frame: {}", "⚠️".yellow(), e),
            }
        }
        Err::<RequestAck, Box<dyn std::error::Error>>("Server closed connection".into())
    })
    .await
    {
        Ok(result) => result?,
        Err(_) => {
            eprintln!("{} Request timed out after 5 seconds", "⏰".yellow());
            return Err("Request timeout".into());
        }
    };

    if expected.is_some() {
        // Timeout simply ends the grace window
        let _ = tokio::time::timeout(REPORT_GRACE, async {
            while let Ok(Some(line)) = lines.next_line().await {
                if let Ok(DownlinkFrame::Report(report)) = frame::decode_downlink(&line) {
                    if keep(&report) {
                        reports.push(report);
                    }
                }
            }
        })
        .await;
    }

    Ok((ack, reports))
}

fn describe_error(record: &ErrorRecord) -> String {
    match record.error {
        ServiceError::Acceptance(e) => format!("acceptance {} ({})", e.code(), e),
        ServiceError::ExecutionStart(e) => format!("execution start {} ({})", e.code(), e),
        ServiceError::Internal(e) => format!("internal {} ({})", e.code(), e),
    }
}

fn print_ack(request: &Message, ack: &RequestAck, format: &str) -> CliResult<()> {
    if format == "json" {
        println!("{}", serde_json::to_string(ack)?);
        return Ok(());
    }

    let label = format!("TC[{},{}]", request.service_type, request.message_type);
    if ack.accepted && ack.errors.is_empty() {
        println!("{} {} completed", "✅".green(), label.bright_white());
    } else if ack.accepted {
        println!("{} {} completed with {} failure(s)", "⚠️".yellow(), label.bright_white(), ack.errors.len());
    } else {
        println!("{} {} rejected", "❌".red(), label.bright_white());
    }
    for record in &ack.errors {
        println!("   {} {}", "•".bright_red(), describe_error(record).bright_red());
    }
    Ok(())
}

fn print_report(report: ReportFrame, format: &str) -> CliResult<()> {
    if format == "json" {
        println!("{}", serde_json::to_string(&report)?);
        return Ok(());
    }

    let message_type = report.message_type;
    let mut message = report.into_message()?;
    match HousekeepingMessageType::try_from(message_type) {
        Ok(HousekeepingMessageType::HousekeepingStructuresReport) => {
            let structure = StructureReport::decode(&mut message)?;
            println!(
                "{} structure {} {} every {} ms, parameters {:?}",
                "📋".bright_blue(),
                structure.id.to_string().bright_cyan(),
                enabled_label(structure.enabled),
                structure.collection_interval,
                structure.parameter_ids
            );
        }
        Ok(HousekeepingMessageType::HousekeepingParametersReport) => {
            let parameters = ParametersReport::decode(&mut message)?;
            println!(
                "{} structure {} values {}",
                "📸".bright_blue(),
                parameters.id.to_string().bright_cyan(),
                hex(&parameters.values).bright_white()
            );
        }
        Ok(HousekeepingMessageType::HousekeepingPeriodicPropertiesReport) => {
            let properties = PeriodicPropertiesReport::decode(&mut message)?;
            println!("{} {} structure(s)", "📊".bright_blue(), properties.structures.len());
            for entry in properties.structures {
                println!(
                    "   {:>3} {} {:>10} ms",
                    entry.id.to_string().bright_cyan(),
                    enabled_label(entry.enabled),
                    entry.collection_interval
                );
            }
        }
        _ => println!("{} TM[{},{}] {}", "❓".blue(), message.service_type, message_type, hex(message.data())),
    }
    Ok(())
}

fn enabled_label(enabled: bool) -> ColoredString {
    if enabled {
        "ENABLED ".bright_green()
    } else {
        "DISABLED".bright_red()
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(" ")
}

async fn monitor(host: &str, port: u16, format: &str) -> CliResult<()> {
    let stream = connect(host, port).await?;
    let mut lines = BufReader::new(stream).lines();

    println!("{}", "📡 HOUSEKEEPING REPORT MONITOR".bright_blue().bold());
    println!("{}", "══════════════════════════════".bright_blue());

    while let Some(line) = lines.next_line().await? {
        match frame::decode_downlink(&line) {
            Ok(DownlinkFrame::Report(report)) => print_report(report, format)?,
            Ok(DownlinkFrame::Ack(_)) => {}
            Err(e) => eprintln!("{} Unreadable frame: {}", "⚠️".yellow(), e),
        }
    }
    Ok(())
}
