/*!
 * Sibling IPC - Demo Entry Point
 *
 * `sibling-ipc master [--channel ID] [--count N]` creates the channel,
 * launches itself as a helper and reads N messages.
 * `sibling-ipc helper [--channel ID] [--count N]` attaches and sends N
 * messages. Both print their channel stats as JSON on exit.
 */

use miette::{miette, IntoDiagnostic, Result};
use sibling_ipc::support::{cleanup_temp_folder, init_process};
use sibling_ipc::{init_tracing, ChannelConfig, InitResult, IpcChannel};
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{info, warn};

const APP_ID: &str = "sibling-ipc-demo";
const APP_VERSION: u32 = 0x0001_0000;
const DEFAULT_CHANNEL: &str = "demo";
const DEFAULT_COUNT: u64 = 16;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Command id of every demo message
const CMD_PING: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Master,
    Helper,
}

#[derive(Debug)]
struct Args {
    mode: Mode,
    channel: String,
    count: u64,
}

fn usage() -> miette::Report {
    miette!("usage: sibling-ipc master|helper [--channel ID] [--count N]")
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let mode = match args.next().as_deref() {
        Some("master") => Mode::Master,
        Some("helper") => Mode::Helper,
        _ => return Err(usage()),
    };

    let mut parsed = Args {
        mode,
        channel: DEFAULT_CHANNEL.to_string(),
        count: DEFAULT_COUNT,
    };
    while let Some(flag) = args.next() {
        let value = args.next().ok_or_else(usage)?;
        match flag.as_str() {
            "--channel" => parsed.channel = value,
            "--count" => {
                parsed.count = value
                    .parse()
                    .map_err(|_| miette!("--count expects a number, got '{}'", value))?
            }
            _ => return Err(usage()),
        }
    }
    Ok(parsed)
}

fn main() -> Result<()> {
    init_tracing();
    let args = parse_args(std::env::args().skip(1))?;

    let channel =
        IpcChannel::with_config(APP_ID, APP_VERSION, &args.channel, ChannelConfig::from_env());
    let result = channel.try_initialize()?;
    info!(?result, channel = %args.channel, "channel ready");

    match args.mode {
        Mode::Master => run_master(&channel, &args, result)?,
        Mode::Helper => run_helper(&channel, &args)?,
    }

    let stats = serde_json::to_string(&channel.stats()).into_diagnostic()?;
    println!("{}", stats);
    Ok(())
}

fn run_master(channel: &IpcChannel, args: &Args, result: InitResult) -> Result<()> {
    if result != InitResult::SuccessMaster {
        warn!(?result, "channel objects already existed; attached as slave");
    }

    let mut helper = Command::new(std::env::current_exe().into_diagnostic()?);
    helper
        .arg("helper")
        .args(["--channel", &args.channel])
        .args(["--count", &args.count.to_string()])
        .stdout(Stdio::null());
    let working_dir = std::env::current_dir().into_diagnostic()?;
    init_process(&mut helper, &working_dir, true)?;
    let mut child = helper.spawn().into_diagnostic()?;

    let mut outcome = Ok(());
    for expected in 0..args.count {
        match channel.read_timeout(READ_TIMEOUT) {
            Ok(message) => info!(
                sequence = message.sequence,
                command = message.command,
                payload = %String::from_utf8_lossy(&message.payload),
                "received"
            ),
            Err(e) => {
                outcome = Err(miette!("message {} of {}: {}", expected + 1, args.count, e));
                break;
            }
        }
    }

    let status = child.wait().into_diagnostic()?;
    cleanup_temp_folder();
    if result == InitResult::SuccessMaster {
        IpcChannel::remove(channel.identity())?;
    }
    outcome?;
    if !status.success() {
        return Err(miette!("helper exited with {}", status));
    }
    Ok(())
}

fn run_helper(channel: &IpcChannel, args: &Args) -> Result<()> {
    for index in 0..args.count {
        let payload = format!("message {} from pid {}", index, std::process::id());
        channel.send(CMD_PING, 0, payload.as_bytes())?;
    }
    info!(count = args.count, "helper done");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_defaults() {
        let parsed = args(&["helper"]).unwrap();
        assert_eq!(parsed.mode, Mode::Helper);
        assert_eq!(parsed.channel, DEFAULT_CHANNEL);
        assert_eq!(parsed.count, DEFAULT_COUNT);
    }

    #[test]
    fn test_parse_flags() {
        let parsed = args(&["master", "--count", "3", "--channel", "abc"]).unwrap();
        assert_eq!(parsed.mode, Mode::Master);
        assert_eq!(parsed.channel, "abc");
        assert_eq!(parsed.count, 3);
    }

    #[test]
    fn test_parse_rejects_bad_input() {
        assert!(args(&[]).is_err());
        assert!(args(&["client"]).is_err());
        assert!(args(&["master", "--count"]).is_err());
        assert!(args(&["master", "--count", "many"]).is_err());
        assert!(args(&["master", "--verbose", "1"]).is_err());
    }
}
